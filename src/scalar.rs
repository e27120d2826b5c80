//! Coercion of loosely-typed scalar results into caller-chosen Rust types.
//!
//! The rule is deliberately narrow:
//!
//! 1. the driver's null marker becomes the target's `Default` value,
//! 2. a value whose variant already matches the target passes through,
//! 3. a `String` target receives the value's textual form,
//! 4. every other pairing is a [`QueryHelperError::CoercionError`].

use chrono::NaiveDateTime;
use serde_json::Value as JsonValue;

use crate::error::QueryHelperError;
use crate::types::RowValues;

/// Runtime tag for a scalar target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Int,
    Float,
    Bool,
    Text,
    Timestamp,
    Blob,
    Json,
}

impl ScalarKind {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::Int => "int",
            ScalarKind::Float => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::Text => "text",
            ScalarKind::Timestamp => "timestamp",
            ScalarKind::Blob => "blob",
            ScalarKind::Json => "json",
        }
    }

    /// Kind of a non-null value.
    #[must_use]
    pub fn of(value: &RowValues) -> Option<Self> {
        match value {
            RowValues::Int(_) => Some(ScalarKind::Int),
            RowValues::Float(_) => Some(ScalarKind::Float),
            RowValues::Bool(_) => Some(ScalarKind::Bool),
            RowValues::Text(_) => Some(ScalarKind::Text),
            RowValues::Timestamp(_) => Some(ScalarKind::Timestamp),
            RowValues::Blob(_) => Some(ScalarKind::Blob),
            RowValues::JSON(_) => Some(ScalarKind::Json),
            RowValues::Null => None,
        }
    }
}

/// A Rust type a scalar result can be coerced into.
pub trait ScalarTarget: Sized + Default {
    const KIND: ScalarKind;

    /// Unwrap a value of the matching variant, handing anything else back.
    ///
    /// # Errors
    /// Returns the original value when its variant does not match `KIND`.
    fn from_native(value: RowValues) -> Result<Self, RowValues>;
}

macro_rules! impl_scalar_target {
    ($ty:ty, $kind:ident, $variant:ident) => {
        impl ScalarTarget for $ty {
            const KIND: ScalarKind = ScalarKind::$kind;

            fn from_native(value: RowValues) -> Result<Self, RowValues> {
                match value {
                    RowValues::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

impl_scalar_target!(i64, Int, Int);
impl_scalar_target!(f64, Float, Float);
impl_scalar_target!(bool, Bool, Bool);
impl_scalar_target!(String, Text, Text);
impl_scalar_target!(NaiveDateTime, Timestamp, Timestamp);
impl_scalar_target!(Vec<u8>, Blob, Blob);
impl_scalar_target!(JsonValue, Json, JSON);

fn coercion_error(value: &RowValues, kind: ScalarKind) -> QueryHelperError {
    QueryHelperError::CoercionError {
        value: format!("{} ({})", value, value.type_name()),
        target: kind.name(),
    }
}

/// Normalize `value` into the variant for `kind`.
///
/// Null is preserved; the typed entry point turns it into a default.
///
/// # Errors
/// Returns [`QueryHelperError::CoercionError`] for unsupported pairings.
pub fn coerce_to_kind(value: RowValues, kind: ScalarKind) -> Result<RowValues, QueryHelperError> {
    match ScalarKind::of(&value) {
        None => Ok(RowValues::Null),
        Some(native) if native == kind => Ok(value),
        Some(ScalarKind::Blob) => Err(coercion_error(&value, kind)),
        Some(_) if kind == ScalarKind::Text => Ok(RowValues::Text(value.to_string())),
        Some(_) => Err(coercion_error(&value, kind)),
    }
}

/// Coerce a raw driver value into `T`.
///
/// # Errors
/// Returns [`QueryHelperError::CoercionError`] when the value cannot be
/// represented as `T` without reinterpretation.
pub fn coerce_scalar<T: ScalarTarget>(value: RowValues) -> Result<T, QueryHelperError> {
    match coerce_to_kind(value, T::KIND)? {
        RowValues::Null => Ok(T::default()),
        normalized => T::from_native(normalized).map_err(|v| coercion_error(&v, T::KIND)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_yields_default() -> Result<(), QueryHelperError> {
        assert_eq!(coerce_scalar::<i64>(RowValues::Null)?, 0);
        assert_eq!(coerce_scalar::<String>(RowValues::Null)?, "");
        assert!(!coerce_scalar::<bool>(RowValues::Null)?);
        assert_eq!(coerce_scalar::<JsonValue>(RowValues::Null)?, JsonValue::Null);
        Ok(())
    }

    #[test]
    fn same_type_passes_through() -> Result<(), QueryHelperError> {
        assert_eq!(coerce_scalar::<i64>(RowValues::Int(42))?, 42);
        assert!((coerce_scalar::<f64>(RowValues::Float(2.5))? - 2.5).abs() < f64::EPSILON);
        assert_eq!(
            coerce_scalar::<String>(RowValues::Text("This is the return value.".into()))?,
            "This is the return value."
        );
        Ok(())
    }

    #[test]
    fn numbers_requested_as_text_use_decimal_form() -> Result<(), QueryHelperError> {
        assert_eq!(coerce_scalar::<String>(RowValues::Int(333))?, "333");
        assert_eq!(coerce_scalar::<String>(RowValues::Float(0.25))?, "0.25");
        assert_eq!(coerce_scalar::<String>(RowValues::Bool(false))?, "false");
        Ok(())
    }

    #[test]
    fn unsupported_pairings_fail_loudly() {
        let err = coerce_scalar::<i64>(RowValues::Text("12".into())).unwrap_err();
        assert!(matches!(
            err,
            QueryHelperError::CoercionError { target: "int", .. }
        ));
        assert!(coerce_scalar::<i64>(RowValues::Float(1.0)).is_err());
        assert!(coerce_scalar::<String>(RowValues::Blob(vec![1, 2])).is_err());
        assert!(coerce_scalar::<bool>(RowValues::Int(1)).is_err());
    }

    #[test]
    fn runtime_kind_keeps_null() -> Result<(), QueryHelperError> {
        assert_eq!(coerce_to_kind(RowValues::Null, ScalarKind::Int)?, RowValues::Null);
        assert_eq!(
            coerce_to_kind(RowValues::Int(5), ScalarKind::Text)?,
            RowValues::Text("5".into())
        );
        Ok(())
    }
}
