//! Submission validity checks.
//!
//! Pure read-only checks over the post-policy submission, accumulating typed
//! diagnostic messages. Errors block dispatch; warnings and infos are
//! reported only.

use std::fmt;
use tracing::{error, info, warn};

use crate::error::{Error, Result};
use crate::schema::{Column, Schema};
use crate::submission::{DataTable, Dtype, Submission, Value};
use crate::utility::IgnorePatterns;

/// Accumulated diagnostics, grouped by severity.
#[derive(Clone, Debug, Default)]
pub struct Messages {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub infos: Vec<String>,
}

impl Messages {
    /// Deduplicate and sort each severity group.
    pub fn uniqify(&mut self) {
        for group in [&mut self.errors, &mut self.warnings, &mut self.infos] {
            group.sort_unstable();
            group.dedup();
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn info(&mut self, message: impl Into<String>) {
        self.infos.push(message.into());
    }
}

impl fmt::Display for Messages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.errors.len(),
            self.warnings.len()
        )
    }
}

/// Everything a check needs to look at.
struct CheckContext<'a> {
    schema: &'a Schema,
    submission: &'a Submission,
    ignore: &'a IgnorePatterns,
}

impl<'a> CheckContext<'a> {
    /// Non-ignored schema columns of a table, in ordinal order. Empty for
    /// tables unknown to the schema.
    fn columns(&self, table_name: &str) -> Vec<&'a Column> {
        self.schema
            .get(table_name)
            .map(|t| {
                t.columns
                    .values()
                    .filter(|c| !self.ignore.is_ignored(&c.column_name))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn data(&self, table_name: &str) -> Option<&'a DataTable> {
        self.submission.data_tables.get(table_name)
    }
}

/// A single validity check, run independently over each table.
trait Specification {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages);
}

fn registry() -> Vec<Box<dyn Specification>> {
    vec![
        Box::new(TableExists),
        Box::new(ColumnTypes),
        Box::new(NumericColumnsAreNumeric),
        Box::new(HasPrimaryKey),
        Box::new(HasSystemId),
        Box::new(IdColumnHasConstraint),
        Box::new(ForeignKeyColumnsHaveValues),
        Box::new(ForeignKeyTargetExists),
        Box::new(NoMissingColumn),
        Box::new(NonNullableColumnHasValue),
    ]
}

/// The specification engine: runs every check over every submission table.
pub struct SubmissionSpecification {
    ignore_columns: Vec<String>,
    raise_errors: bool,
}

impl SubmissionSpecification {
    pub fn new(ignore_columns: Vec<String>, raise_errors: bool) -> Self {
        Self {
            ignore_columns,
            raise_errors,
        }
    }

    /// Run every check and return the deduplicated, sorted diagnostics.
    pub fn evaluate(&self, schema: &Schema, submission: &Submission) -> Result<Messages> {
        let ignore = IgnorePatterns::compile(&self.ignore_columns)?;
        let ctx = CheckContext {
            schema,
            submission,
            ignore: &ignore,
        };

        let mut messages = Messages::default();
        for specification in registry() {
            for table_name in submission.data_tables.keys() {
                specification.check(&ctx, table_name, &mut messages);
            }
        }
        messages.uniqify();
        log_messages(&messages);
        Ok(messages)
    }

    /// Whether the submission passes with zero errors. Raises
    /// `SpecificationFailed` instead when configured to.
    pub fn is_satisfied_by(&self, schema: &Schema, submission: &Submission) -> Result<bool> {
        let messages = self.evaluate(schema, submission)?;
        let satisfied = messages.errors.is_empty();
        if self.raise_errors && !satisfied {
            return Err(Error::SpecificationFailed(messages));
        }
        Ok(satisfied)
    }
}

fn log_messages(messages: &Messages) {
    for message in &messages.errors {
        error!("{message}");
    }
    for message in &messages.warnings {
        warn!("{message}");
    }
    for message in &messages.infos {
        info!("{message}");
    }
}

/// Cap a diagnostic value list, staying on a character boundary.
fn truncate_values(mut values: String, max_len: usize) -> String {
    if values.len() > max_len {
        let mut end = max_len;
        while !values.is_char_boundary(end) {
            end -= 1;
        }
        values.truncate(end);
    }
    values
}

/// Schema type x inferred storage class compatibility. Unlisted pairs are
/// incompatible.
fn is_compatible(schema_type: &str, dtype: Dtype) -> bool {
    use Dtype::*;
    matches!(
        (schema_type, dtype),
        ("integer", Float64)
            | ("integer", Int64)
            | ("bigint", Int64)
            | ("smallint", Float64)
            | ("smallint", Int64)
            | ("numeric", Float64)
            | ("numeric", Int64)
            | ("text", Object)
            | ("character varying", Object)
            | ("date", Object)
            | ("date", Datetime64)
            | ("timestamp without time zone", Object)
            | ("timestamp with time zone", Object)
            | ("timestamp with time zone", Datetime64)
    )
}

/// The table must be known to the submission, by name or sheet alias.
struct TableExists;

impl Specification for TableExists {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        if !ctx.submission.contains(ctx.schema, table_name) {
            messages.error(format!("Table '{table_name}' not defined as submission table"));
        }
    }
}

/// Data columns must have a storage class compatible with the schema type.
struct ColumnTypes;

impl Specification for ColumnTypes {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        if data.is_empty() {
            // Cannot determine types in an empty table.
            return;
        }
        for column in ctx.columns(table_name) {
            if !data.has_column(&column.column_name) || data.all_null(&column.column_name) {
                continue;
            }
            let dtype = data.dtype(&column.column_name);
            if !is_compatible(&column.data_type, dtype) {
                messages.warn(format!(
                    "type clash: {table_name}.{} {}<=>{}",
                    column.column_name,
                    column.data_type,
                    dtype.name()
                ));
            }
        }
    }
}

/// Every non-null value of a numeric-typed column must be a real number.
struct NumericColumnsAreNumeric;

impl NumericColumnsAreNumeric {
    const NUMERIC_TYPES: [&'static str; 3] = ["numeric", "integer", "smallint"];
}

impl Specification for NumericColumnsAreNumeric {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        for column in ctx.columns(table_name) {
            if !Self::NUMERIC_TYPES.contains(&column.data_type.as_str()) {
                continue;
            }
            let Some(values) = data.column(&column.column_name) else {
                continue;
            };
            let mut bad: Vec<String> = values
                .iter()
                .filter(|v| !v.is_null() && !v.is_real_number())
                .map(|v| v.to_string())
                .collect();
            if !bad.is_empty() {
                bad.sort_unstable();
                bad.dedup();
                let error_values = truncate_values(bad.join(" "), 200);
                messages.error(format!(
                    "Column '{table_name}.{}' has non-numeric values: '{error_values}'",
                    column.column_name
                ));
            }
        }
    }
}

/// The PK column must be present and flagged in the schema.
struct HasPrimaryKey;

impl Specification for HasPrimaryKey {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(table) = ctx.schema.get(table_name) else {
            return;
        };
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        let pk_name = table.pk_name.as_deref().unwrap_or_default();
        if !data.has_column(pk_name) {
            messages.error(format!(
                "Primary key column '{table_name}.{pk_name}' (table metadata) not in data columns."
            ));
        }
        if !table.columns.values().any(|c| c.is_pk) {
            messages.error(format!("Table '{table_name}' has no column with PK constraint"));
        }
    }
}

/// `system_id` must be present, entirely non-null and unique.
struct HasSystemId;

impl Specification for HasSystemId {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        let Some(system_ids) = data.column("system_id") else {
            messages.error(format!("Table {table_name} has no system id data column"));
            return;
        };

        if system_ids.iter().any(Value::is_null) {
            messages.error(format!("Table {table_name} has missing system id values"));
        }

        let mut seen = std::collections::BTreeSet::new();
        let mut duplicates = std::collections::BTreeSet::new();
        for value in system_ids.iter().filter_map(Value::as_i64) {
            if !seen.insert(value) {
                duplicates.insert(value);
            }
        }
        if !duplicates.is_empty() {
            let error_values = truncate_values(
                duplicates
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join(" "),
                200,
            );
            messages.error(format!(
                "Table {table_name} has DUPLICATE system ids: {error_values}"
            ));
        }
    }
}

/// Columns named `*_id` are expected to carry a PK or FK constraint.
struct IdColumnHasConstraint;

impl Specification for IdColumnHasConstraint {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        for column in ctx.columns(table_name) {
            if column.column_name.ends_with("_id") && !(column.is_fk || column.is_pk) {
                messages.warn(format!(
                    "Column {table_name}.{}: ends with \"_id\" but NOT marked as PK/FK",
                    column.column_name
                ));
            }
        }
    }
}

/// Whether a lookup table without new rows may skip FK checks.
fn is_reference_only_lookup(ctx: &CheckContext<'_>, table_name: &str) -> bool {
    ctx.submission.is_lookup(ctx.schema, table_name)
        && !ctx
            .submission
            .has_new_rows(ctx.schema, table_name)
            .unwrap_or(true)
}

/// Foreign key columns must be present and non-nullable ones filled.
struct ForeignKeyColumnsHaveValues;

impl Specification for ForeignKeyColumnsHaveValues {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        if data.is_empty() || is_reference_only_lookup(ctx, table_name) {
            return;
        }

        for column in ctx.columns(table_name) {
            if !column.is_fk {
                continue;
            }
            let name = &column.column_name;
            if !data.has_column(name) {
                if column.is_nullable {
                    messages.warn(format!(
                        "Foreign key column '{table_name}.{name}' not in data (but is nullable)"
                    ));
                } else {
                    messages.error(format!("Foreign key column '{table_name}.{name}' not in data"));
                }
                continue;
            }
            if !column.is_nullable {
                if data.all_null(name) {
                    messages.error(format!(
                        "Foreign key column '{table_name}.{name}' has no values"
                    ));
                }
                if data.any_null(name) {
                    messages.error(format!(
                        "Non-nullable foreign key column '{table_name}.{name}' has missing values"
                    ));
                }
            }
        }
    }
}

/// FK columns with values must have their target table in the submission.
struct ForeignKeyTargetExists;

impl Specification for ForeignKeyTargetExists {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        if data.is_empty() || is_reference_only_lookup(ctx, table_name) {
            return;
        }

        for column in ctx.columns(table_name) {
            if !column.is_fk {
                continue;
            }
            let name = &column.column_name;
            if !data.has_column(name) {
                if column.is_nullable {
                    messages.warn(format!(
                        "Foreign key column '{table_name}.{name}' not in data (but is nullable)"
                    ));
                } else {
                    messages.error(format!("Foreign key column '{table_name}.{name}' not in data"));
                }
                continue;
            }
            let fk_has_data = !data.all_null(name);
            let Some(fk_table_name) = column.fk_table_name.as_deref() else {
                continue;
            };
            if !ctx.submission.data_tables.contains_key(fk_table_name) {
                let msg =
                    format!("Foreign key table '{fk_table_name}' referenced by '{table_name}'");
                if column.is_nullable && !fk_has_data {
                    messages.warn(format!("{msg} missing in data (but is nullable)"));
                } else if column.is_nullable {
                    messages.error(format!(
                        "{msg} FK has values but target table not found in submission"
                    ));
                } else {
                    messages.error(format!("{msg} missing in data and NOT nullable"));
                }
            }
        }
    }
}

/// Columns required by the schema must be present; unknown extras are noted.
struct NoMissingColumn;

impl Specification for NoMissingColumn {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(table) = ctx.schema.get(table_name) else {
            return;
        };
        let Some(data) = ctx.data(table_name) else {
            return;
        };

        let data_column_names: Vec<&str> = data.column_names().collect();
        let pk_name = table.pk_name.as_deref().unwrap_or_default();

        // A lookup table carrying only {system_id, pk} is reference-only.
        if data_column_names.len() == 2
            && data_column_names.contains(&"system_id")
            && data_column_names.contains(&pk_name)
        {
            return;
        }

        let missing: Vec<&str> = table
            .column_names(true)
            .into_iter()
            .filter(|c| !ctx.ignore.is_ignored(c) && !data_column_names.contains(c))
            .collect();
        if !missing.is_empty() {
            messages.error(format!(
                "Table {table_name} has MISSING NON-NULLABLE data columns: {}",
                missing.join(", ")
            ));
        }

        let missing_nullable: Vec<&str> = table
            .nullable_column_names()
            .into_iter()
            .filter(|c| !ctx.ignore.is_ignored(c) && !data_column_names.contains(c))
            .collect();
        if !missing_nullable.is_empty() {
            messages.warn(format!(
                "Table {table_name} has MISSING NULLABLE data columns: {}",
                missing_nullable.join(", ")
            ));
        }

        let mut extra: Vec<&str> = data_column_names
            .iter()
            .filter(|c| {
                !ctx.ignore.is_ignored(c) && **c != "system_id" && !table.has_column(c)
            })
            .copied()
            .collect();
        extra.sort_unstable();
        if !extra.is_empty() {
            messages.warn(format!(
                "Table {table_name} has EXTRA data columns: {}",
                extra.join(", ")
            ));
        }
    }
}

/// Non-nullable scalar columns must not contain nulls.
struct NonNullableColumnHasValue;

impl Specification for NonNullableColumnHasValue {
    fn check(&self, ctx: &CheckContext<'_>, table_name: &str, messages: &mut Messages) {
        let Some(data) = ctx.data(table_name) else {
            return;
        };
        for column in ctx.columns(table_name) {
            if column.is_nullable
                || column.is_pk
                || column.is_fk
                || column.column_name == "system_id"
                || !data.has_column(&column.column_name)
            {
                continue;
            }
            if data.any_null(&column.column_name) {
                messages.error(format!(
                    "Table {table_name} has NULL values in non-nullable column {}",
                    column.column_name
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use indexmap::IndexMap;
    use pretty_assertions::assert_eq;

    fn specification() -> SubmissionSpecification {
        SubmissionSpecification::new(
            vec!["date_updated".to_string(), "*_uuid".to_string()],
            false,
        )
    }

    #[test]
    fn test_valid_submission_is_satisfied() {
        let schema = fixtures::site_sample_schema();
        let submission = fixtures::site_sample_submission();
        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert_eq!(messages.errors, Vec::<String>::new());
        assert!(specification().is_satisfied_by(&schema, &submission).unwrap());
    }

    #[test]
    fn test_duplicate_system_id_is_an_error() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        let sites = fixtures::site_table(&[(10, Some(10), "A"), (10, Some(11), "B")]);
        submission.data_tables.insert("tbl_sites".to_string(), sites);

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(messages
            .errors
            .iter()
            .any(|m| m.contains("DUPLICATE system ids") && m.contains("10")));
        assert!(!specification().is_satisfied_by(&schema, &submission).unwrap());
    }

    #[test]
    fn test_missing_non_nullable_column_is_an_error() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .drop_column("site_name");

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(messages
            .errors
            .iter()
            .any(|m| m.contains("tbl_sites") && m.contains("MISSING NON-NULLABLE") && m.contains("site_name")));
    }

    #[test]
    fn test_null_in_non_nullable_fk_is_an_error() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_samples")
            .unwrap()
            .fill_column("site_id", Value::Null);

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(messages
            .errors
            .iter()
            .any(|m| m.contains("tbl_samples.site_id") && m.contains("has no values")));
    }

    #[test]
    fn test_missing_fk_target_table_is_an_error() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission.data_tables.shift_remove("tbl_sites");

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(messages
            .errors
            .iter()
            .any(|m| m.contains("Foreign key table 'tbl_sites'") && m.contains("NOT nullable")));
    }

    #[test]
    fn test_non_numeric_value_in_numeric_column() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .fill_column("site_id", Value::Text("ten".into()));

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(messages
            .errors
            .iter()
            .any(|m| m.contains("non-numeric values") && m.contains("ten")));
    }

    #[test]
    fn test_reference_only_lookup_is_accepted() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        let mut columns = IndexMap::new();
        columns.insert("system_id".to_string(), vec![Value::BigInt(5)]);
        columns.insert("location_id".to_string(), vec![Value::BigInt(5)]);
        submission.data_tables.insert(
            "tbl_locations".to_string(),
            crate::submission::DataTable::from_columns("tbl_locations", columns).unwrap(),
        );

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(
            !messages
                .errors
                .iter()
                .any(|m| m.contains("tbl_locations")),
            "reference-only lookup produced errors: {:?}",
            messages.errors
        );
    }

    #[test]
    fn test_type_clash_is_a_warning() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .fill_column("site_name", Value::BigInt(3));

        let messages = specification().evaluate(&schema, &submission).unwrap();
        assert!(messages
            .warnings
            .iter()
            .any(|m| m.contains("type clash: tbl_sites.site_name")));
    }

    #[test]
    fn test_messages_are_sorted_and_deduplicated() {
        let mut messages = Messages::default();
        messages.error("b");
        messages.error("a");
        messages.error("a");
        messages.uniqify();
        assert_eq!(messages.errors, vec!["a", "b"]);
    }

    #[test]
    fn test_raise_errors_mode() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .drop_column("site_name");

        let specification = SubmissionSpecification::new(vec![], true);
        assert!(matches!(
            specification.is_satisfied_by(&schema, &submission),
            Err(Error::SpecificationFailed(_))
        ));
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_samples")
            .unwrap()
            .fill_column("site_id", Value::Null);

        let first = specification().evaluate(&schema, &submission).unwrap();
        let second = specification().evaluate(&schema, &submission).unwrap();
        assert_eq!(first.errors, second.errors);
        assert_eq!(first.warnings, second.warnings);
    }
}
