//! Artifact dispatchers.

mod to_xml;

pub use to_xml::XmlDispatcher;

use crate::error::Result;
use crate::schema::Schema;
use crate::submission::Submission;

/// Writes a submission to an output artifact.
pub trait Dispatcher {
    /// Emit the whole submission. `table_names` restricts the emitted row
    /// blocks; the default is every table present in the submission.
    fn dispatch(
        &mut self,
        schema: &Schema,
        submission: &Submission,
        table_names: Option<&[String]>,
    ) -> Result<()>;
}
