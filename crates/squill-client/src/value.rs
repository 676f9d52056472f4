//! Dynamic value model for positional parameter binding and result rows.

use crate::error::MappingError;

/// A dynamically typed database value.
///
/// `Value` is the unit of exchange across the driver seam: statement
/// parameters are bound as `&[Value]`, and result rows hand values back in
/// the same shape. Integral columns widen to `Int` and floating-point
/// columns to `Float`; narrowing happens on the way back out through
/// [`FromValue`], with range checks.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point.
    Float(f64),
    /// Character data.
    Text(String),
    /// Raw binary data.
    Bytes(Vec<u8>),
}

impl Value {
    /// Short name of the value kind, for diagnostics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOL",
            Value::Int(_) => "INT",
            Value::Float(_) => "FLOAT",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BYTES",
        }
    }

    /// Whether this value is SQL NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

/// Conversion of Rust values into [`Value`] parameters.
pub trait ToValue {
    /// Convert to a dynamically typed database value.
    fn to_value(&self) -> Value;
}

/// Conversion of [`Value`]s back into Rust field types.
pub trait FromValue: Sized {
    /// Convert a database value into `Self`, failing with
    /// [`MappingError::Conversion`] when the kinds are incompatible.
    fn from_value(value: Value) -> Result<Self, MappingError>;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

impl ToValue for bool {
    fn to_value(&self) -> Value {
        Value::Bool(*self)
    }
}

macro_rules! impl_to_value_int {
    ($($ty:ty),* $(,)?) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Int(i64::from(*self))
            }
        }
    )*};
}

impl_to_value_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! impl_to_value_float {
    ($($ty:ty),* $(,)?) => {$(
        impl ToValue for $ty {
            fn to_value(&self) -> Value {
                Value::Float(f64::from(*self))
            }
        }
    )*};
}

impl_to_value_float!(f32, f64);

impl ToValue for String {
    fn to_value(&self) -> Value {
        Value::Text(self.clone())
    }
}

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Text((*self).to_owned())
    }
}

impl ToValue for Vec<u8> {
    fn to_value(&self) -> Value {
        Value::Bytes(self.clone())
    }
}

impl ToValue for &[u8] {
    fn to_value(&self) -> Value {
        Value::Bytes(self.to_vec())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        match self {
            Some(inner) => inner.to_value(),
            None => Value::Null,
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self, MappingError> {
        match value {
            Value::Bool(v) => Ok(v),
            // Drivers without a native boolean type report 0/1 integers.
            Value::Int(0) => Ok(false),
            Value::Int(1) => Ok(true),
            other => Err(MappingError::Conversion {
                expected: "bool",
                actual: other.kind(),
            }),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($ty:ty),* $(,)?) => {$(
        impl FromValue for $ty {
            fn from_value(value: Value) -> Result<Self, MappingError> {
                match value {
                    Value::Int(v) => <$ty>::try_from(v).map_err(|_| MappingError::Conversion {
                        expected: stringify!($ty),
                        actual: "INT",
                    }),
                    other => Err(MappingError::Conversion {
                        expected: stringify!($ty),
                        actual: other.kind(),
                    }),
                }
            }
        }
    )*};
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, MappingError> {
        match value {
            Value::Float(v) => Ok(v),
            Value::Int(v) => Ok(v as f64),
            other => Err(MappingError::Conversion {
                expected: "f64",
                actual: other.kind(),
            }),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self, MappingError> {
        match value {
            Value::Text(v) => Ok(v),
            other => Err(MappingError::Conversion {
                expected: "String",
                actual: other.kind(),
            }),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, MappingError> {
        match value {
            Value::Bytes(v) => Ok(v),
            other => Err(MappingError::Conversion {
                expected: "Vec<u8>",
                actual: other.kind(),
            }),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, MappingError> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self, MappingError> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// Build a fixed-size array of [`Value`] parameters from Rust expressions.
///
/// ```
/// use squill_client::{params, Value};
///
/// let bound = params![1_i64, "John"];
/// assert_eq!(bound, [Value::Int(1), Value::Text("John".into())]);
/// ```
#[macro_export]
macro_rules! params {
    () => {{
        let bound: [$crate::Value; 0] = [];
        bound
    }};
    ($($value:expr),+ $(,)?) => {
        [$($crate::ToValue::to_value(&$value)),+]
    };
}
