// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Typed value coercion.
//!
//! The conversion table is keyed by the requested [`ValueType`]. Each row
//! accepts any scalar [`Value`] and either produces a value of the requested
//! variant or fails with a [`ConversionError`]. Requests for a type outside
//! the table fail with [`UnsupportedTypeError`](crate::error::UnsupportedTypeError).
//!
//! ```text
//! requested  │ Bool  Integers  Float/Double  Decimal  String
//! ───────────┼──────────────────────────────────────────────
//! Boolean    │  =    != 0      != 0          != 0     parse
//! Integer    │ 1/0   range     round, range  round    parse
//! Float      │ 1/0   widen     range         range    parse
//! Decimal    │ 1/0   exact     range         =        parse
//! String     │ text  text      text          text     =
//! ```
//!
//! Values out of the target range are rejected rather than saturated or
//! wrapped. Floats convert to integers by rounding half to even.
//!
//! # Examples
//!
//! ```
//! use ua_access::codec::{coerce, FromValue, ValueType};
//! use ua_access::Value;
//!
//! assert_eq!(coerce(&Value::Double(41.6), ValueType::Int32).unwrap(), Value::Int32(42));
//! assert_eq!(i32::from_value(&Value::String(" 12 ".into())).unwrap(), 12);
//! assert!(u8::from_value(&Value::Int32(300)).is_err());
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, ConversionError, UaError, UaResult};
use crate::value::Value;

// =============================================================================
// ValueType
// =============================================================================

/// Type requested from a typed read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    /// `bool`.
    Boolean,
    /// `i8`.
    SByte,
    /// `u8`.
    Byte,
    /// `i16`.
    Int16,
    /// `u16`.
    UInt16,
    /// `i32`.
    Int32,
    /// `u32`.
    UInt32,
    /// `i64`.
    Int64,
    /// `u64`.
    UInt64,
    /// `f32`.
    Float,
    /// `f64`.
    Double,
    /// [`Decimal`].
    Decimal,
    /// `String`.
    String,
    /// Timestamp. Not coercible.
    DateTime,
    /// GUID. Not coercible.
    Guid,
    /// Raw bytes. Not coercible.
    ByteString,
}

impl ValueType {
    /// Returns the type name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Decimal => "Decimal",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
        }
    }

    /// Returns `true` if the conversion table has a row for this type.
    pub const fn is_supported(&self) -> bool {
        !matches!(self, Self::DateTime | Self::Guid | Self::ByteString)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ValueType {
    type Err = UaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace(['-', '_'], "").as_str() {
            "bool" | "boolean" => Ok(Self::Boolean),
            "i8" | "sbyte" | "int8" => Ok(Self::SByte),
            "u8" | "byte" | "uint8" => Ok(Self::Byte),
            "i16" | "int16" | "short" => Ok(Self::Int16),
            "u16" | "uint16" | "ushort" => Ok(Self::UInt16),
            "i32" | "int32" | "int" => Ok(Self::Int32),
            "u32" | "uint32" | "uint" => Ok(Self::UInt32),
            "i64" | "int64" | "long" => Ok(Self::Int64),
            "u64" | "uint64" | "ulong" => Ok(Self::UInt64),
            "f32" | "float" | "single" => Ok(Self::Float),
            "f64" | "double" => Ok(Self::Double),
            "decimal" => Ok(Self::Decimal),
            "string" | "str" => Ok(Self::String),
            "datetime" => Ok(Self::DateTime),
            "guid" | "uuid" => Ok(Self::Guid),
            "bytestring" | "bytes" => Ok(Self::ByteString),
            _ => Err(ConfigurationError::invalid_value(
                "value_type",
                format!("unknown value type '{s}'"),
            )
            .into()),
        }
    }
}

// =============================================================================
// Conversion table
// =============================================================================

/// Coerces `value` to the requested type.
pub fn coerce(value: &Value, target: ValueType) -> UaResult<Value> {
    if !target.is_supported() {
        return Err(UaError::unsupported_type(target.name()));
    }
    if value.is_null() {
        return Err(ConversionError::NullValue {
            target: target.name(),
        }
        .into());
    }

    let coerced = match target {
        ValueType::Boolean => Value::Boolean(to_bool(value)?),
        ValueType::SByte => Value::SByte(to_int(value, target)?),
        ValueType::Byte => Value::Byte(to_int(value, target)?),
        ValueType::Int16 => Value::Int16(to_int(value, target)?),
        ValueType::UInt16 => Value::UInt16(to_int(value, target)?),
        ValueType::Int32 => Value::Int32(to_int(value, target)?),
        ValueType::UInt32 => Value::UInt32(to_int(value, target)?),
        ValueType::Int64 => Value::Int64(to_int(value, target)?),
        ValueType::UInt64 => Value::UInt64(to_int(value, target)?),
        ValueType::Float => Value::Float(to_f32(value)?),
        ValueType::Double => Value::Double(to_f64(value, target)?),
        ValueType::Decimal => Value::Decimal(to_decimal(value)?),
        ValueType::String => Value::String(to_string(value)?),
        ValueType::DateTime | ValueType::Guid | ValueType::ByteString => {
            return Err(UaError::unsupported_type(target.name()));
        }
    };
    Ok(coerced)
}

/// Intermediate numeric form wide enough for every integer variant.
enum Numeric {
    Int(i128),
    Float(f64),
    Decimal(Decimal),
}

fn numeric(value: &Value, target: ValueType) -> Result<Numeric, ConversionError> {
    let n = match value {
        Value::Boolean(v) => Numeric::Int(i128::from(*v)),
        Value::SByte(v) => Numeric::Int(i128::from(*v)),
        Value::Byte(v) => Numeric::Int(i128::from(*v)),
        Value::Int16(v) => Numeric::Int(i128::from(*v)),
        Value::UInt16(v) => Numeric::Int(i128::from(*v)),
        Value::Int32(v) => Numeric::Int(i128::from(*v)),
        Value::UInt32(v) => Numeric::Int(i128::from(*v)),
        Value::Int64(v) => Numeric::Int(i128::from(*v)),
        Value::UInt64(v) => Numeric::Int(i128::from(*v)),
        Value::Float(v) => Numeric::Float(f64::from(*v)),
        Value::Double(v) => Numeric::Float(*v),
        Value::Decimal(v) => Numeric::Decimal(*v),
        Value::String(s) => parse_numeric(s, target)?,
        Value::Null => {
            return Err(ConversionError::NullValue {
                target: target.name(),
            })
        }
        other => return Err(ConversionError::type_mismatch(target.name(), other.type_name())),
    };
    Ok(n)
}

fn parse_numeric(text: &str, target: ValueType) -> Result<Numeric, ConversionError> {
    let text = text.trim();
    if let Ok(i) = text.parse::<i128>() {
        return Ok(Numeric::Int(i));
    }
    if target == ValueType::Decimal {
        if let Ok(d) = Decimal::from_str(text) {
            return Ok(Numeric::Decimal(d));
        }
    }
    text.parse::<f64>()
        .map(Numeric::Float)
        .map_err(|_| ConversionError::invalid_format(text, target.name()))
}

fn to_int<T>(value: &Value, target: ValueType) -> Result<T, ConversionError>
where
    T: TryFrom<i128>,
{
    let wide = match numeric(value, target)? {
        Numeric::Int(i) => i,
        Numeric::Float(f) => {
            let rounded = f.round_ties_even();
            // i128 bounds dwarf every target, so this only filters NaN/inf/huge.
            if !rounded.is_finite() || rounded.abs() >= 1.0e38 {
                return Err(ConversionError::out_of_range(f, target.name()));
            }
            rounded as i128
        }
        Numeric::Decimal(d) => d
            .round()
            .to_i128()
            .ok_or_else(|| ConversionError::out_of_range(d, target.name()))?,
    };
    T::try_from(wide).map_err(|_| ConversionError::out_of_range(wide, target.name()))
}

fn to_f64(value: &Value, target: ValueType) -> Result<f64, ConversionError> {
    match numeric(value, target)? {
        Numeric::Int(i) => Ok(i as f64),
        Numeric::Float(f) => Ok(f),
        Numeric::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| ConversionError::out_of_range(d, target.name())),
    }
}

fn to_f32(value: &Value) -> Result<f32, ConversionError> {
    // Avoid the f64 detour so that f32 sources round-trip bit-exactly.
    if let Value::Float(v) = value {
        return Ok(*v);
    }
    let wide = to_f64(value, ValueType::Float)?;
    if wide.is_finite() && wide.abs() > f64::from(f32::MAX) {
        return Err(ConversionError::out_of_range(wide, ValueType::Float.name()));
    }
    Ok(wide as f32)
}

fn to_decimal(value: &Value) -> Result<Decimal, ConversionError> {
    let target = ValueType::Decimal;
    match numeric(value, target)? {
        Numeric::Int(i) => {
            Decimal::from_i128(i).ok_or_else(|| ConversionError::out_of_range(i, target.name()))
        }
        Numeric::Float(f) => {
            Decimal::from_f64(f).ok_or_else(|| ConversionError::out_of_range(f, target.name()))
        }
        Numeric::Decimal(d) => Ok(d),
    }
}

fn to_bool(value: &Value) -> Result<bool, ConversionError> {
    let target = ValueType::Boolean;
    if let Value::String(s) = value {
        let trimmed = s.trim();
        return match trimmed.to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            _ => Err(ConversionError::invalid_format(trimmed, target.name())),
        };
    }
    match numeric(value, target)? {
        Numeric::Int(i) => Ok(i != 0),
        Numeric::Float(f) => Ok(f != 0.0),
        Numeric::Decimal(d) => Ok(!d.is_zero()),
    }
}

fn to_string(value: &Value) -> Result<String, ConversionError> {
    match value {
        Value::ByteString(_) | Value::Array(_) => Err(ConversionError::type_mismatch(
            ValueType::String.name(),
            value.type_name(),
        )),
        Value::String(s) => Ok(s.clone()),
        other => Ok(other.to_string()),
    }
}

// =============================================================================
// FromValue
// =============================================================================

/// Host types that can be produced by a typed read.
///
/// Implementations name the [`ValueType`] they request. The value goes
/// through [`coerce`] first, so a type whose [`ValueType`] is outside the
/// table fails with an unsupported type error at run time.
pub trait FromValue: Sized {
    /// Requested type.
    const VALUE_TYPE: ValueType;

    /// Extracts the host value from a coerced value of the requested variant.
    fn extract(value: Value) -> Option<Self>;

    /// Coerces and extracts.
    fn from_value(value: &Value) -> UaResult<Self> {
        let coerced = coerce(value, Self::VALUE_TYPE)?;
        let actual = coerced.type_name();
        Self::extract(coerced).ok_or_else(|| {
            ConversionError::type_mismatch(Self::VALUE_TYPE.name(), actual).into()
        })
    }
}

macro_rules! impl_from_value {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl FromValue for $ty {
                const VALUE_TYPE: ValueType = ValueType::$variant;

                fn extract(value: Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_from_value! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    Decimal => Decimal,
    String => String,
    DateTime<Utc> => DateTime,
    Uuid => Guid,
    Vec<u8> => ByteString,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_round_trips() {
        assert!(bool::from_value(&Value::Boolean(true)).unwrap());
        assert_eq!(i32::from_value(&Value::Int32(-12337)).unwrap(), -12337);
        assert_eq!(f32::from_value(&Value::Float(3.25)).unwrap(), 3.25);
        assert_eq!(f64::from_value(&Value::Double(-0.1)).unwrap(), -0.1);
        assert_eq!(
            String::from_value(&Value::String("héllo".into())).unwrap(),
            "héllo"
        );
    }

    #[test]
    fn test_integer_widening_and_narrowing() {
        assert_eq!(i64::from_value(&Value::Byte(255)).unwrap(), 255);
        assert_eq!(u16::from_value(&Value::Int64(65535)).unwrap(), 65535);
        assert_eq!(i8::from_value(&Value::UInt32(127)).unwrap(), 127);
        assert_eq!(u64::from_value(&Value::UInt64(u64::MAX)).unwrap(), u64::MAX);
    }

    #[test]
    fn test_out_of_range_is_rejected() {
        let err = u8::from_value(&Value::Int32(256)).unwrap_err();
        assert!(matches!(
            err,
            UaError::Conversion(ConversionError::OutOfRange { target: "Byte", .. })
        ));
        assert!(u32::from_value(&Value::Int16(-1)).is_err());
        assert!(i32::from_value(&Value::Double(f64::NAN)).is_err());
        assert!(i64::from_value(&Value::Double(1.0e30)).is_err());
        assert!(f32::from_value(&Value::Double(1.0e300)).is_err());
    }

    #[test]
    fn test_float_to_int_rounds_half_to_even() {
        assert_eq!(i32::from_value(&Value::Double(2.5)).unwrap(), 2);
        assert_eq!(i32::from_value(&Value::Double(3.5)).unwrap(), 4);
        assert_eq!(i32::from_value(&Value::Float(-1.4)).unwrap(), -1);
    }

    #[test]
    fn test_bool_conversions() {
        assert!(bool::from_value(&Value::Int32(5)).unwrap());
        assert!(!bool::from_value(&Value::Double(0.0)).unwrap());
        assert!(bool::from_value(&Value::String("TRUE".into())).unwrap());
        assert!(!bool::from_value(&Value::String("0".into())).unwrap());
        assert!(bool::from_value(&Value::String("maybe".into())).is_err());
        assert_eq!(i32::from_value(&Value::Boolean(true)).unwrap(), 1);
    }

    #[test]
    fn test_string_parsing() {
        assert_eq!(i32::from_value(&Value::String(" 42 ".into())).unwrap(), 42);
        assert_eq!(f64::from_value(&Value::String("1.5".into())).unwrap(), 1.5);
        assert_eq!(i32::from_value(&Value::String("2.5".into())).unwrap(), 2);
        assert!(matches!(
            i32::from_value(&Value::String("abc".into())).unwrap_err(),
            UaError::Conversion(ConversionError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_decimal_conversions() {
        let d = Decimal::from_str("12.345").unwrap();
        assert_eq!(Decimal::from_value(&Value::String("12.345".into())).unwrap(), d);
        assert_eq!(Decimal::from_value(&Value::Int32(7)).unwrap(), Decimal::from(7));
        assert_eq!(i32::from_value(&Value::Decimal(d)).unwrap(), 12);
        assert_eq!(String::from_value(&Value::Decimal(d)).unwrap(), "12.345");
    }

    #[test]
    fn test_to_string_renders_scalars() {
        assert_eq!(String::from_value(&Value::Int32(5)).unwrap(), "5");
        assert_eq!(String::from_value(&Value::Boolean(false)).unwrap(), "false");
        assert!(String::from_value(&Value::ByteString(vec![1])).is_err());
    }

    #[test]
    fn test_null_is_rejected() {
        assert!(matches!(
            i32::from_value(&Value::Null).unwrap_err(),
            UaError::Conversion(ConversionError::NullValue { target: "Int32" })
        ));
    }

    #[test]
    fn test_unsupported_types() {
        let now = Value::DateTime(Utc::now());
        assert!(matches!(
            DateTime::<Utc>::from_value(&now).unwrap_err(),
            UaError::UnsupportedType(_)
        ));
        assert!(matches!(
            Uuid::from_value(&Value::Guid(Uuid::nil())).unwrap_err(),
            UaError::UnsupportedType(_)
        ));
        assert!(matches!(
            coerce(&Value::Int32(1), ValueType::ByteString).unwrap_err(),
            UaError::UnsupportedType(_)
        ));
    }

    #[test]
    fn test_mismatched_source() {
        assert!(matches!(
            i32::from_value(&Value::Guid(Uuid::nil())).unwrap_err(),
            UaError::Conversion(ConversionError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_value_type_parse() {
        assert_eq!("int32".parse::<ValueType>().unwrap(), ValueType::Int32);
        assert_eq!("Boolean".parse::<ValueType>().unwrap(), ValueType::Boolean);
        assert_eq!("uint_64".parse::<ValueType>().unwrap(), ValueType::UInt64);
        assert!("quaternion".parse::<ValueType>().is_err());
        assert!(!ValueType::Guid.is_supported());
    }
}
