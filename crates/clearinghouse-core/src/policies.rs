//! Submission repair policies.
//!
//! An ordered, registered set of in-place repairs applied to the submission
//! so that downstream components may assume the model invariants. Policies
//! run once each, in priority order (ties break on registration order), and
//! must be deterministic and idempotent.

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::config::ImportConfig;
use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::submission::{DataTable, Submission, Value};
use crate::utility::IgnorePatterns;

/// A single in-place submission repair.
pub trait Policy {
    /// Stable identifier, the snake-case form of the policy name.
    fn id(&self) -> &'static str;

    /// Priority; lower runs first, ties break on registration order.
    fn sort_order(&self) -> i32 {
        0
    }

    /// Apply the repair. Returns the names of the tables touched.
    fn update(
        &self,
        schema: &Schema,
        config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>>;
}

/// The registered policy set, resolved to a deterministic order at
/// construction.
pub struct PolicyEngine {
    policies: Vec<Box<dyn Policy>>,
}

impl PolicyEngine {
    pub fn new() -> Self {
        let mut policies: Vec<Box<dyn Policy>> = vec![
            Box::new(AddPrimaryKeyColumnIfMissing),
            Box::new(UpdateMissingForeignKey),
            Box::new(AddIdentityMappingSystemIdToPublicId),
            Box::new(UpdateTypesBasedOnSchema),
            Box::new(SetPublicIdToNegativeSystemIdForNewLookups),
            Box::new(IfSystemIdIsMissingSetSystemIdToPublicId),
            Box::new(IfForeignKeyValueIsMissingAddIdentityMappingToForeignKeyTable),
            Box::new(DropIgnoredColumns),
            Box::new(IfLookupWithNoNewDataThenKeepOnlySystemIdPublicId),
        ];
        policies.sort_by_key(|p| p.sort_order());
        Self { policies }
    }

    /// Registered policy ids in execution order.
    pub fn policy_ids(&self) -> Vec<&'static str> {
        self.policies.iter().map(|p| p.id()).collect()
    }

    /// Run every enabled policy once, in order.
    pub fn apply(
        &self,
        schema: &Schema,
        config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<()> {
        for policy in &self.policies {
            if config.is_policy_disabled(policy.id()) {
                debug!("policy {} is disabled", policy.id());
                continue;
            }
            let touched = policy
                .update(schema, config, submission)
                .map_err(|e| Error::policy(policy.id(), e))?;
            if !touched.is_empty() {
                info!("policy {}: updated {}", policy.id(), touched.join(","));
            }
        }
        Ok(())
    }
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Adds the primary key column, all nulls, where it is missing. Rows in such
/// tables are thereby marked as new.
struct AddPrimaryKeyColumnIfMissing;

impl Policy for AddPrimaryKeyColumnIfMissing {
    fn id(&self) -> &'static str {
        "add_primary_key_column_if_missing"
    }

    fn update(
        &self,
        schema: &Schema,
        _config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (table_name, data) in submission.data_tables.iter_mut() {
            let table = schema.require(table_name)?;
            let Some(pk_name) = table.pk_name.as_deref() else {
                continue;
            };
            if !data.has_column(pk_name) {
                info!(
                    "Added missing primary key column '{pk_name}' to '{table_name}' (assuming all new records)"
                );
                data.insert_null_column(pk_name);
                touched.push(table_name.clone());
            }
        }
        Ok(touched)
    }
}

/// Sets configured default FK values where the column is absent or entirely
/// null.
struct UpdateMissingForeignKey;

impl Policy for UpdateMissingForeignKey {
    fn id(&self) -> &'static str {
        "update_missing_foreign_key"
    }

    fn update(
        &self,
        _schema: &Schema,
        config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (table_name, defaults) in &config.policies.update_missing_foreign_key {
            let Some(data) = submission.get_mut(table_name) else {
                continue;
            };
            for (fk_name, fk_value) in defaults {
                if data.has_column(fk_name) {
                    if data.all_null(fk_name) {
                        info!("Added default value '{fk_value}' to '{fk_name}' in '{table_name}'");
                        data.fill_column(fk_name, Value::BigInt(*fk_value));
                        touched.push(table_name.clone());
                    }
                } else {
                    info!("Added missing column '{fk_name}' to {table_name} using value '{fk_value}'");
                    let values = vec![Value::BigInt(*fk_value); data.num_rows()];
                    data.insert_column(fk_name, values)?;
                    touched.push(table_name.clone());
                }
            }
        }
        touched.dedup();
        Ok(touched)
    }
}

/// Synthesizes identity-mapped tables for configured tables that are absent
/// from the submission but referenced by it. Assumes the referenced ids are
/// exactly the public primary keys.
struct AddIdentityMappingSystemIdToPublicId;

impl Policy for AddIdentityMappingSystemIdToPublicId {
    fn id(&self) -> &'static str {
        "add_identity_mapping_system_id_to_public_id"
    }

    fn update(
        &self,
        schema: &Schema,
        config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for table_name in &config.policies.add_identity_mapping_system_id_to_public_id {
            if submission.contains(schema, table_name) {
                continue;
            }
            let referenced_keys = submission.referenced_keyset(schema, table_name);
            if referenced_keys.is_empty() {
                continue;
            }
            let table = schema.require(table_name)?;
            let Some(pk_name) = table.pk_name.as_deref() else {
                continue;
            };

            let keys: Vec<Value> = referenced_keys.iter().map(|k| Value::BigInt(*k)).collect();
            let mut columns = IndexMap::new();
            columns.insert("system_id".to_string(), keys.clone());
            columns.insert(pk_name.to_string(), keys);

            submission
                .data_tables
                .insert(table_name.clone(), DataTable::from_columns(table_name, columns)?);

            info!("Added table '{table_name}' to submission with identity system_id/{pk_name} mapping");
            touched.push(table_name.clone());
        }
        Ok(touched)
    }
}

/// Coerces integer-family columns to the width the schema declares.
/// Nullability is preserved; values that are not integers are left for the
/// specification engine to report.
struct UpdateTypesBasedOnSchema;

impl UpdateTypesBasedOnSchema {
    fn coerce(table_name: &str, column_name: &str, data_type: &str, value: &Value) -> Result<Option<Value>> {
        let Some(v) = value.as_i64() else {
            return Ok(None);
        };
        let coerced = match data_type {
            "smallint" => i16::try_from(v).map(Value::SmallInt).map_err(|_| v),
            "integer" => i32::try_from(v).map(Value::Int).map_err(|_| v),
            "bigint" => Ok(Value::BigInt(v)),
            _ => return Ok(None),
        };
        match coerced {
            Ok(value) => Ok(Some(value)),
            Err(v) => Err(Error::InvalidSubmission {
                table: table_name.to_string(),
                message: format!("value {v} in column '{column_name}' does not fit {data_type}"),
            }),
        }
    }
}

impl Policy for UpdateTypesBasedOnSchema {
    fn id(&self) -> &'static str {
        "update_types_based_on_schema"
    }

    fn update(
        &self,
        schema: &Schema,
        _config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (table_name, data) in submission.data_tables.iter_mut() {
            let table = schema.require(table_name)?;
            let mut changed = false;
            for column_spec in table.columns.values() {
                if !column_spec.is_integer_type() {
                    continue;
                }
                let Some(column) = data.column_mut(&column_spec.column_name) else {
                    continue;
                };
                for value in column.iter_mut() {
                    if let Some(coerced) = Self::coerce(
                        table_name,
                        &column_spec.column_name,
                        &column_spec.data_type,
                        value,
                    )? {
                        if *value != coerced {
                            *value = coerced;
                            changed = true;
                        }
                    }
                }
            }
            if changed {
                touched.push(table_name.clone());
            }
        }
        Ok(touched)
    }
}

/// Assigns a temporary public primary key, the negative of the system id, to
/// new lookup table rows. The real key is assigned upon commit.
///
/// Disabled by default: with it active, new lookup rows take the short form
/// in the artifact.
struct SetPublicIdToNegativeSystemIdForNewLookups;

impl Policy for SetPublicIdToNegativeSystemIdForNewLookups {
    fn id(&self) -> &'static str {
        "set_public_id_to_negative_system_id_for_new_lookups"
    }

    fn update(
        &self,
        schema: &Schema,
        _config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (table_name, data) in submission.data_tables.iter_mut() {
            let table = schema.require(table_name)?;
            if !table.is_lookup {
                continue;
            }
            let Some(pk_name) = table.pk_name.clone() else {
                continue;
            };
            if !data.has_column(&pk_name) || !data.any_null(&pk_name) {
                continue;
            }
            let system_ids: Vec<Option<i64>> = data
                .column("system_id")
                .map(|c| c.iter().map(Value::as_i64).collect())
                .unwrap_or_default();
            let Some(pk_column) = data.column_mut(&pk_name) else {
                continue;
            };
            for (cell, system_id) in pk_column.iter_mut().zip(system_ids) {
                if cell.is_null() {
                    if let Some(system_id) = system_id {
                        *cell = Value::BigInt(-system_id);
                    }
                }
            }
            touched.push(table_name.clone());
        }
        Ok(touched)
    }
}

/// Copies the public primary key into `system_id` where the latter is null.
struct IfSystemIdIsMissingSetSystemIdToPublicId;

impl Policy for IfSystemIdIsMissingSetSystemIdToPublicId {
    fn id(&self) -> &'static str {
        "if_system_id_is_missing_set_system_id_to_public_id"
    }

    fn update(
        &self,
        schema: &Schema,
        _config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (table_name, data) in submission.data_tables.iter_mut() {
            let table = schema.require(table_name)?;
            let Some(mut pk_name) = table.pk_name.clone() else {
                continue;
            };
            // Known schema defect: the PK column arrives under a singular name.
            if pk_name == "ceramics_id" {
                pk_name = "ceramic_id".to_string();
            }
            if !data.has_column(&pk_name) {
                continue;
            }
            if !data.has_column("system_id") {
                warn!("Table {table_name} has no column named \"system_id\"");
                continue;
            }
            let pk_values: Vec<Value> = data.column(&pk_name).unwrap_or_default().to_vec();
            let Some(system_ids) = data.column_mut("system_id") else {
                continue;
            };
            let mut changed = false;
            for (cell, pk_value) in system_ids.iter_mut().zip(pk_values) {
                if cell.is_null() && !pk_value.is_null() {
                    *cell = pk_value;
                    changed = true;
                }
            }
            if changed {
                touched.push(table_name.clone());
            }
        }
        Ok(touched)
    }
}

/// Appends identity-mapped rows to present lookup tables for referenced keys
/// they do not carry.
struct IfForeignKeyValueIsMissingAddIdentityMappingToForeignKeyTable;

impl Policy for IfForeignKeyValueIsMissingAddIdentityMappingToForeignKeyTable {
    fn id(&self) -> &'static str {
        "if_foreignkey_value_is_missing_add_identity_mapping_to_foreignkey_table"
    }

    fn sort_order(&self) -> i32 {
        1
    }

    fn update(
        &self,
        schema: &Schema,
        _config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        let lookup_names: Vec<String> = schema
            .lookup_tables()
            .map(|t| t.table_name.clone())
            .collect();

        for table_name in lookup_names {
            let referenced_keys = submission.referenced_keyset(schema, &table_name);
            if referenced_keys.is_empty() {
                continue;
            }
            let Some(pk_name) = schema.require(&table_name)?.pk_name.clone() else {
                continue;
            };
            let Some(data) = submission.data_tables.get_mut(&table_name) else {
                // An absent table is handled by the identity-mapping policy.
                continue;
            };

            let existing: Vec<i64> = data
                .column("system_id")
                .map(|c| c.iter().filter_map(Value::as_i64).collect())
                .unwrap_or_default();
            let missing: Vec<i64> = referenced_keys
                .into_iter()
                .filter(|k| !existing.contains(k))
                .collect();
            if missing.is_empty() {
                continue;
            }

            for key in missing {
                let mut values = IndexMap::new();
                values.insert("system_id".to_string(), Value::BigInt(key));
                values.insert(pk_name.clone(), Value::BigInt(key));
                data.append_row(&values);
            }
            touched.push(table_name.clone());
        }
        Ok(touched)
    }
}

/// Removes columns matching the configured ignore patterns.
struct DropIgnoredColumns;

impl Policy for DropIgnoredColumns {
    fn id(&self) -> &'static str {
        "drop_ignored_columns"
    }

    fn sort_order(&self) -> i32 {
        2
    }

    fn update(
        &self,
        _schema: &Schema,
        config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let ignore = IgnorePatterns::compile(&config.options.ignore_columns)?;
        let mut touched = Vec::new();
        for (table_name, data) in submission.data_tables.iter_mut() {
            let ignored: Vec<String> = data
                .column_names()
                .filter(|c| ignore.is_ignored(c))
                .map(|c| c.to_string())
                .collect();
            for column_name in &ignored {
                data.drop_column(column_name);
            }
            if !ignored.is_empty() {
                touched.push(table_name.clone());
            }
        }
        Ok(touched)
    }
}

/// Trims lookup tables carrying no new rows down to the reference-only
/// `{system_id, pk}` shape.
struct IfLookupWithNoNewDataThenKeepOnlySystemIdPublicId;

impl Policy for IfLookupWithNoNewDataThenKeepOnlySystemIdPublicId {
    fn id(&self) -> &'static str {
        "if_lookup_with_no_new_data_then_keep_only_system_id_public_id"
    }

    fn sort_order(&self) -> i32 {
        3
    }

    fn update(
        &self,
        schema: &Schema,
        _config: &ImportConfig,
        submission: &mut Submission,
    ) -> Result<Vec<String>> {
        let mut touched = Vec::new();
        for (table_name, data) in submission.data_tables.iter_mut() {
            let table = schema.require(table_name)?;
            if !table.is_lookup {
                continue;
            }
            let Some(pk_name) = table.pk_name.clone() else {
                continue;
            };
            if !data.has_column(&pk_name) || data.any_null(&pk_name) {
                continue;
            }
            let keep = ["system_id", pk_name.as_str()];
            if data.column_names().count() > keep.len() {
                data.retain_columns(&keep);
                touched.push(table_name.clone());
            }
        }
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use pretty_assertions::assert_eq;

    fn enabled_config() -> ImportConfig {
        ImportConfig::default()
    }

    #[test]
    fn test_engine_order_is_deterministic() {
        let engine = PolicyEngine::new();
        assert_eq!(
            engine.policy_ids(),
            vec![
                "add_primary_key_column_if_missing",
                "update_missing_foreign_key",
                "add_identity_mapping_system_id_to_public_id",
                "update_types_based_on_schema",
                "set_public_id_to_negative_system_id_for_new_lookups",
                "if_system_id_is_missing_set_system_id_to_public_id",
                "if_foreignkey_value_is_missing_add_identity_mapping_to_foreignkey_table",
                "drop_ignored_columns",
                "if_lookup_with_no_new_data_then_keep_only_system_id_public_id",
            ]
        );
    }

    #[test]
    fn test_add_primary_key_column_if_missing() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .drop_column("site_id");

        AddPrimaryKeyColumnIfMissing
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let sites = &submission.data_tables["tbl_sites"];
        assert!(sites.has_column("site_id"));
        assert!(sites.all_null("site_id"));
    }

    #[test]
    fn test_update_missing_foreign_key() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        let mut config = enabled_config();
        config
            .policies
            .update_missing_foreign_key
            .entry("tbl_sites".to_string())
            .or_default()
            .insert("location_id".to_string(), 42);

        UpdateMissingForeignKey
            .update(&schema, &config, &mut submission)
            .unwrap();

        let sites = &submission.data_tables["tbl_sites"];
        assert_eq!(sites.column("location_id").unwrap(), &[Value::BigInt(42)]);

        // A second run is a no-op: the column now has values.
        let before = submission.clone();
        UpdateMissingForeignKey
            .update(&schema, &config, &mut submission)
            .unwrap();
        assert_eq!(before.data_tables, submission.data_tables);
    }

    #[test]
    fn test_add_identity_mapping_for_absent_referenced_table() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission.data_tables.shift_remove("tbl_sites");
        let mut config = enabled_config();
        config.policies.add_identity_mapping_system_id_to_public_id = vec!["tbl_sites".to_string()];

        AddIdentityMappingSystemIdToPublicId
            .update(&schema, &config, &mut submission)
            .unwrap();

        let sites = &submission.data_tables["tbl_sites"];
        assert_eq!(sites.column("system_id").unwrap(), &[Value::BigInt(10)]);
        assert_eq!(sites.column("site_id").unwrap(), &[Value::BigInt(10)]);
    }

    #[test]
    fn test_update_types_based_on_schema() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();

        UpdateTypesBasedOnSchema
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let sites = &submission.data_tables["tbl_sites"];
        assert_eq!(sites.column("site_id").unwrap(), &[Value::Int(10)]);
        let samples = &submission.data_tables["tbl_samples"];
        assert_eq!(samples.column("sample_id").unwrap(), &[Value::Null]);
        assert_eq!(samples.column("site_id").unwrap(), &[Value::Int(10)]);
    }

    #[test]
    fn test_update_types_overflow_is_an_error() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .fill_column("site_id", Value::BigInt(i64::MAX));

        let result =
            UpdateTypesBasedOnSchema.update(&schema, &enabled_config(), &mut submission);
        assert!(matches!(result, Err(Error::InvalidSubmission { .. })));
    }

    #[test]
    fn test_if_system_id_is_missing_set_system_id_to_public_id() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .fill_column("system_id", Value::Null);

        IfSystemIdIsMissingSetSystemIdToPublicId
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let sites = &submission.data_tables["tbl_sites"];
        assert_eq!(sites.column("system_id").unwrap(), &[Value::BigInt(10)]);
    }

    #[test]
    fn test_append_identity_rows_for_missing_fk_values() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();

        // Sites reference locations 5 and 6; the lookup table carries only 5.
        let sites = submission.data_tables.get_mut("tbl_sites").unwrap();
        sites
            .insert_column("location_id", vec![Value::BigInt(5)])
            .unwrap();
        let mut values = IndexMap::new();
        values.insert("system_id".to_string(), Value::BigInt(11));
        values.insert("site_id".to_string(), Value::BigInt(11));
        values.insert("site_name".to_string(), Value::Text("Kiruna".into()));
        values.insert("location_id".to_string(), Value::BigInt(6));
        sites.append_row(&values);

        let mut locations = IndexMap::new();
        locations.insert("system_id".to_string(), vec![Value::BigInt(5)]);
        locations.insert("location_id".to_string(), vec![Value::BigInt(5)]);
        locations.insert(
            "location_name".to_string(),
            vec![Value::Text("North".into())],
        );
        submission.data_tables.insert(
            "tbl_locations".to_string(),
            DataTable::from_columns("tbl_locations", locations).unwrap(),
        );

        IfForeignKeyValueIsMissingAddIdentityMappingToForeignKeyTable
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let lookup = &submission.data_tables["tbl_locations"];
        assert_eq!(
            lookup.column("system_id").unwrap(),
            &[Value::BigInt(5), Value::BigInt(6)]
        );
        assert_eq!(
            lookup.column("location_id").unwrap(),
            &[Value::BigInt(5), Value::BigInt(6)]
        );
        assert_eq!(
            lookup.column("location_name").unwrap(),
            &[Value::Text("North".into()), Value::Null]
        );
    }

    #[test]
    fn test_drop_ignored_columns() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .insert_null_column("date_updated");
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .insert_null_column("site_uuid");

        DropIgnoredColumns
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let sites = &submission.data_tables["tbl_sites"];
        assert!(!sites.has_column("date_updated"));
        assert!(!sites.has_column("site_uuid"));
        assert!(sites.has_column("site_name"));
    }

    #[test]
    fn test_lookup_with_no_new_data_is_trimmed() {
        let schema = fixtures::site_sample_schema();
        let mut columns = IndexMap::new();
        columns.insert("system_id".to_string(), vec![Value::BigInt(1)]);
        columns.insert("location_id".to_string(), vec![Value::BigInt(1)]);
        columns.insert(
            "location_name".to_string(),
            vec![Value::Text("North".into())],
        );
        let mut submission = Submission::default();
        submission.data_tables.insert(
            "tbl_locations".to_string(),
            DataTable::from_columns("tbl_locations", columns).unwrap(),
        );

        IfLookupWithNoNewDataThenKeepOnlySystemIdPublicId
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let lookup = &submission.data_tables["tbl_locations"];
        assert_eq!(lookup.column_names().collect::<Vec<_>>(), vec!["system_id", "location_id"]);
    }

    #[test]
    fn test_lookup_with_new_rows_keeps_all_columns() {
        let schema = fixtures::site_sample_schema();
        let mut columns = IndexMap::new();
        columns.insert("system_id".to_string(), vec![Value::BigInt(1)]);
        columns.insert("location_id".to_string(), vec![Value::Null]);
        columns.insert(
            "location_name".to_string(),
            vec![Value::Text("North".into())],
        );
        let mut submission = Submission::default();
        submission.data_tables.insert(
            "tbl_locations".to_string(),
            DataTable::from_columns("tbl_locations", columns).unwrap(),
        );

        IfLookupWithNoNewDataThenKeepOnlySystemIdPublicId
            .update(&schema, &enabled_config(), &mut submission)
            .unwrap();

        let lookup = &submission.data_tables["tbl_locations"];
        assert!(lookup.has_column("location_name"));
    }

    #[test]
    fn test_engine_is_idempotent() {
        let schema = fixtures::site_sample_schema();
        let config = enabled_config();
        let engine = PolicyEngine::new();

        let mut once = fixtures::site_sample_submission();
        engine.apply(&schema, &config, &mut once).unwrap();

        let mut twice = once.clone();
        engine.apply(&schema, &config, &mut twice).unwrap();

        assert_eq!(once.data_tables, twice.data_tables);
    }

    #[test]
    fn test_disabled_policy_is_skipped() {
        let schema = fixtures::site_sample_schema();
        let mut config = enabled_config();
        config.policies.disabled = vec!["add_primary_key_column_if_missing".to_string()];

        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .drop_column("site_id");

        PolicyEngine::new()
            .apply(&schema, &config, &mut submission)
            .unwrap();
        assert!(!submission.data_tables["tbl_sites"].has_column("site_id"));
    }

    #[test]
    fn test_policy_failure_carries_policy_id() {
        let schema = fixtures::site_sample_schema();
        let mut submission = fixtures::site_sample_submission();
        submission
            .data_tables
            .get_mut("tbl_sites")
            .unwrap()
            .fill_column("site_id", Value::BigInt(i64::MAX));

        let result = PolicyEngine::new().apply(&schema, &enabled_config(), &mut submission);
        match result {
            Err(Error::PolicyFailed { id, .. }) => {
                assert_eq!(id, "update_types_based_on_schema");
            }
            other => panic!("expected PolicyFailed, got {other:?}"),
        }
    }
}
