//! Cell values and inferred column storage classes.

use chrono::NaiveDateTime;
use std::fmt;

/// A single cell value in a submission table.
///
/// Integer widths are explicit so the schema-driven widening policy has a
/// representation to target; `Null` carries nullability for every type.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Timestamp(NaiveDateTime),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer view of the value, if it has one. Floats with no fractional
    /// part convert; everything else is `None`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::SmallInt(v) => Some(*v as i64),
            Value::Int(v) => Some(*v as i64),
            Value::BigInt(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(*v as i64),
            _ => None,
        }
    }

    /// Whether the value is numeric in the `numeric|integer|smallint` sense.
    pub fn is_real_number(&self) -> bool {
        matches!(
            self,
            Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) | Value::Float(_) | Value::Bool(_)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::SmallInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::BigInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v}"),
            Value::Timestamp(v) => write!(f, "{v}"),
        }
    }
}

/// Inferred storage class of a column, the counterpart of a dataframe dtype
/// in the type compatibility matrix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dtype {
    /// No non-null values to infer from.
    Empty,
    Int64,
    Float64,
    Bool,
    Object,
    Datetime64,
}

impl Dtype {
    /// Infer the storage class of a column from its values.
    ///
    /// Any text value makes the column `Object`; datetimes dominate numbers;
    /// a float anywhere lifts integers to `Float64`. All integer widths
    /// infer as `Int64`.
    pub fn infer(values: &[Value]) -> Dtype {
        let mut dtype = Dtype::Empty;
        for value in values {
            let v = match value {
                Value::Null => continue,
                Value::Text(_) => Dtype::Object,
                Value::Timestamp(_) => Dtype::Datetime64,
                Value::Float(_) => Dtype::Float64,
                Value::Bool(_) => Dtype::Bool,
                Value::SmallInt(_) | Value::Int(_) | Value::BigInt(_) => Dtype::Int64,
            };
            dtype = match (dtype, v) {
                (Dtype::Empty, v) => v,
                (a, b) if a == b => a,
                (Dtype::Object, _) | (_, Dtype::Object) => Dtype::Object,
                (Dtype::Datetime64, _) | (_, Dtype::Datetime64) => Dtype::Object,
                (Dtype::Float64, Dtype::Int64) | (Dtype::Int64, Dtype::Float64) => Dtype::Float64,
                _ => Dtype::Object,
            };
        }
        dtype
    }

    /// Name used in diagnostic messages, matching the matrix vocabulary.
    pub fn name(&self) -> &'static str {
        match self {
            Dtype::Empty => "empty",
            Dtype::Int64 => "int64",
            Dtype::Float64 => "float64",
            Dtype::Bool => "bool",
            Dtype::Object => "object",
            Dtype::Datetime64 => "datetime64",
        }
    }
}
