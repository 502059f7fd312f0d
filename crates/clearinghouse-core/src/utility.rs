//! Small shared helpers: name mangling, ignore-pattern matching, XML tidy.

use glob::Pattern;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Convert an underscored column name to its camelCase XML element name.
pub fn camel_case_name(underscore_name: &str) -> String {
    let mut parts = underscore_name.split('_');
    let mut result = parts.next().unwrap_or_default().to_string();
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            result.push(first.to_ascii_uppercase());
            result.extend(chars);
        }
    }
    result
}

/// Compiled set of ignore-column glob patterns.
#[derive(Clone, Debug, Default)]
pub struct IgnorePatterns(Vec<Pattern>);

impl IgnorePatterns {
    pub fn compile(patterns: &[String]) -> Result<Self> {
        let compiled = patterns
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| Error::Config(format!("bad glob '{p}': {e}"))))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self(compiled))
    }

    pub fn is_ignored(&self, column_name: &str) -> bool {
        self.0.iter().any(|p| p.matches(column_name))
    }
}

/// Re-indent an XML document, replacing `<path>.xml` with `<path>_tidy.xml`.
///
/// Returns the path of the tidied document. The source file is removed when
/// `remove_source` is set.
pub fn tidy_xml(path: &Path, remove_source: bool) -> Result<PathBuf> {
    let tidy_path = path.with_file_name(format!(
        "{}_tidy.xml",
        path.file_stem().and_then(|s| s.to_str()).unwrap_or("out")
    ));

    let mut reader = Reader::from_reader(BufReader::new(File::open(path)?));
    reader.config_mut().trim_text(true);

    let out = File::create(&tidy_path)?;
    let mut writer = Writer::new_with_indent(BufWriter::new(out), b' ', 2);

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Eof => break,
            event => writer.write_event(event)?,
        }
        buf.clear();
    }
    writer.into_inner().flush()?;

    if remove_source {
        std::fs::remove_file(path)?;
    }
    Ok(tidy_path)
}
