#![forbid(unsafe_code)]

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of element kinds a vector can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElemKind {
    Float64,
    Int32,
    Bool,
    Utf8,
}

impl ElemKind {
    pub const ALL: [Self; 4] = [Self::Float64, Self::Int32, Self::Bool, Self::Utf8];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Int32 => "int32",
            Self::Bool => "bool",
            Self::Utf8 => "utf8",
        }
    }

    /// Whether elements of this kind have a mapping onto `f64`.
    #[must_use]
    pub fn is_numeric(self) -> bool {
        !matches!(self, Self::Utf8)
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NullKind {
    Na,
    #[serde(rename = "nan")]
    NaN,
}

/// Bit pattern reserved for the float64 missing marker (quiet NaN, payload 1954).
pub const NA_FLOAT64_BITS: u64 = 0x7FF0_0000_0000_07A2;

pub const NA_FLOAT64: f64 = f64::from_bits(NA_FLOAT64_BITS);

pub const NA_INT32: i32 = i32::MIN;

#[must_use]
pub fn is_na_marker(value: f64) -> bool {
    value.to_bits() == NA_FLOAT64_BITS
}

/// Three-state logical: `Na` is distinct from both truth values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logical {
    False,
    True,
    #[default]
    Na,
}

impl Logical {
    #[must_use]
    pub fn to_option(self) -> Option<bool> {
        match self {
            Self::False => Some(false),
            Self::True => Some(true),
            Self::Na => None,
        }
    }
}

impl From<bool> for Logical {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

impl From<Option<bool>> for Logical {
    fn from(value: Option<bool>) -> Self {
        value.map_or(Self::Na, Self::from)
    }
}

/// An element type with a per-kind missing marker.
pub trait NaValue: Clone + fmt::Debug + PartialEq + Sized {
    const KIND: ElemKind;

    fn na() -> Self;

    fn is_na(&self) -> bool;

    fn to_scalar(&self) -> Scalar;

    /// Convert a dynamic scalar into this element type using the cast rules
    /// of [`cast_scalar_owned`].
    fn from_scalar(value: Scalar) -> Result<Self, TypeError>;
}

/// Element types that widen onto `f64`. `None` stands for the missing marker.
pub trait NumericValue: NaValue + Copy {
    fn widen(self) -> Option<f64>;
}

impl NaValue for f64 {
    const KIND: ElemKind = ElemKind::Float64;

    fn na() -> Self {
        NA_FLOAT64
    }

    // Every NaN reads as missing, not only the reserved marker.
    fn is_na(&self) -> bool {
        self.is_nan()
    }

    fn to_scalar(&self) -> Scalar {
        if is_na_marker(*self) {
            Scalar::Null(NullKind::Na)
        } else if self.is_nan() {
            Scalar::Null(NullKind::NaN)
        } else {
            Scalar::Float64(*self)
        }
    }

    fn from_scalar(value: Scalar) -> Result<Self, TypeError> {
        match cast_scalar_owned(value, ElemKind::Float64)? {
            Scalar::Float64(v) => Ok(v),
            Scalar::Null(NullKind::NaN) => Ok(f64::NAN),
            Scalar::Null(NullKind::Na) => Ok(NA_FLOAT64),
            other => Err(TypeError::InvalidCast {
                from: other.kind(),
                to: ElemKind::Float64,
            }),
        }
    }
}

impl NumericValue for f64 {
    fn widen(self) -> Option<f64> {
        if self.is_nan() { None } else { Some(self) }
    }
}

impl NaValue for i32 {
    const KIND: ElemKind = ElemKind::Int32;

    fn na() -> Self {
        NA_INT32
    }

    fn is_na(&self) -> bool {
        *self == NA_INT32
    }

    fn to_scalar(&self) -> Scalar {
        if self.is_na() {
            Scalar::Null(NullKind::Na)
        } else {
            Scalar::Int32(*self)
        }
    }

    fn from_scalar(value: Scalar) -> Result<Self, TypeError> {
        match cast_scalar_owned(value, ElemKind::Int32)? {
            Scalar::Int32(v) => Ok(v),
            Scalar::Null(_) => Ok(NA_INT32),
            other => Err(TypeError::InvalidCast {
                from: other.kind(),
                to: ElemKind::Int32,
            }),
        }
    }
}

impl NumericValue for i32 {
    fn widen(self) -> Option<f64> {
        if self.is_na() {
            None
        } else {
            Some(f64::from(self))
        }
    }
}

impl NaValue for Logical {
    const KIND: ElemKind = ElemKind::Bool;

    fn na() -> Self {
        Self::Na
    }

    fn is_na(&self) -> bool {
        matches!(self, Self::Na)
    }

    fn to_scalar(&self) -> Scalar {
        self.to_option()
            .map_or(Scalar::Null(NullKind::Na), Scalar::Bool)
    }

    fn from_scalar(value: Scalar) -> Result<Self, TypeError> {
        match cast_scalar_owned(value, ElemKind::Bool)? {
            Scalar::Bool(v) => Ok(Self::from(v)),
            Scalar::Null(_) => Ok(Self::Na),
            other => Err(TypeError::InvalidCast {
                from: other.kind(),
                to: ElemKind::Bool,
            }),
        }
    }
}

impl NumericValue for Logical {
    fn widen(self) -> Option<f64> {
        self.to_option().map(|v| if v { 1.0 } else { 0.0 })
    }
}

impl NaValue for Option<String> {
    const KIND: ElemKind = ElemKind::Utf8;

    fn na() -> Self {
        None
    }

    fn is_na(&self) -> bool {
        self.is_none()
    }

    fn to_scalar(&self) -> Scalar {
        self.as_ref()
            .map_or(Scalar::Null(NullKind::Na), |s| Scalar::Utf8(s.clone()))
    }

    fn from_scalar(value: Scalar) -> Result<Self, TypeError> {
        match cast_scalar_owned(value, ElemKind::Utf8)? {
            Scalar::Utf8(v) => Ok(Some(v)),
            Scalar::Null(_) => Ok(None),
            other => Err(TypeError::InvalidCast {
                from: other.kind(),
                to: ElemKind::Utf8,
            }),
        }
    }
}

/// A dynamically typed element value, used where vectors meet plain values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    Null(NullKind),
    Bool(bool),
    Int32(i32),
    Float64(#[serde(with = "float_repr")] f64),
    Utf8(String),
}

impl Scalar {
    /// The element kind of a present value; `None` for `Null`.
    #[must_use]
    pub fn kind(&self) -> Option<ElemKind> {
        match self {
            Self::Null(_) => None,
            Self::Bool(_) => Some(ElemKind::Bool),
            Self::Int32(_) => Some(ElemKind::Int32),
            Self::Float64(_) => Some(ElemKind::Float64),
            Self::Utf8(_) => Some(ElemKind::Utf8),
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Null(_) => true,
            Self::Float64(v) => v.is_nan(),
            Self::Int32(v) => *v == NA_INT32,
            Self::Bool(_) | Self::Utf8(_) => false,
        }
    }

    /// NaN-class missingness, as opposed to the reserved NA marker.
    #[must_use]
    pub fn is_nan(&self) -> bool {
        matches!(self, Self::Null(NullKind::NaN))
            || matches!(self, Self::Float64(v) if v.is_nan() && !is_na_marker(*v))
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => (a.is_nan() && b.is_nan()) || (a == b),
            _ if self.is_missing() && other.is_missing() => true,
            _ => self == other,
        }
    }

    pub fn to_f64(&self) -> Result<f64, TypeError> {
        if self.is_missing() {
            return Err(TypeError::ValueIsMissing);
        }
        match self {
            Self::Bool(v) => Ok(if *v { 1.0 } else { 0.0 }),
            Self::Int32(v) => Ok(f64::from(*v)),
            Self::Float64(v) => Ok(*v),
            Self::Null(_) => Err(TypeError::ValueIsMissing),
            Self::Utf8(v) => Err(TypeError::NonNumericValue { value: v.clone() }),
        }
    }
}

/// JSON has no literal for non-finite floats: they are written as the
/// strings `"inf"`, `"-inf"` and `"nan"`, finite values as plain numbers.
mod float_repr {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_f64(*value)
        } else if value.is_nan() {
            serializer.serialize_str("nan")
        } else if value.is_sign_positive() {
            serializer.serialize_str("inf")
        } else {
            serializer.serialize_str("-inf")
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(value) => Ok(value),
            Raw::Text(text) => match text.as_str() {
                "inf" => Ok(f64::INFINITY),
                "-inf" => Ok(f64::NEG_INFINITY),
                "nan" => Ok(f64::NAN),
                other => Err(D::Error::custom(format_args!(
                    "expected a number, \"inf\", \"-inf\" or \"nan\", found {other:?}"
                ))),
            },
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TypeError {
    #[error("cannot cast scalar of kind {from:?} to {to}")]
    InvalidCast { from: Option<ElemKind>, to: ElemKind },
    #[error("cannot cast float {value} to int32 without loss")]
    LossyFloatToInt { value: f64 },
    #[error("expected 0/1 for bool cast from int32 but found {value}")]
    InvalidBoolInt { value: i32 },
    #[error("expected 0.0/1.0 for bool cast from float64 but found {value}")]
    InvalidBoolFloat { value: f64 },
    #[error("value {value:?} is not numeric")]
    NonNumericValue { value: String },
    #[error("value is missing")]
    ValueIsMissing,
}

/// Cast a scalar to a target kind, taking ownership so identity casts are free.
///
/// Missing values become the target's missing marker; a NaN stays NaN when
/// the target is float64.
pub fn cast_scalar_owned(value: Scalar, target: ElemKind) -> Result<Scalar, TypeError> {
    if value.is_missing() {
        return Ok(if target == ElemKind::Float64 && value.is_nan() {
            Scalar::Null(NullKind::NaN)
        } else {
            Scalar::Null(NullKind::Na)
        });
    }
    let from = value.kind();
    if from == Some(target) {
        return Ok(value);
    }

    match target {
        ElemKind::Bool => match &value {
            Scalar::Int32(v) => match *v {
                0 => Ok(Scalar::Bool(false)),
                1 => Ok(Scalar::Bool(true)),
                _ => Err(TypeError::InvalidBoolInt { value: *v }),
            },
            Scalar::Float64(v) => {
                if *v == 0.0 {
                    Ok(Scalar::Bool(false))
                } else if *v == 1.0 {
                    Ok(Scalar::Bool(true))
                } else {
                    Err(TypeError::InvalidBoolFloat { value: *v })
                }
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        ElemKind::Int32 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Int32(i32::from(*v))),
            Scalar::Float64(v) => {
                if !v.is_finite() || *v != v.trunc() {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                // i32::MIN is the missing marker, so it is out of range here.
                if *v <= f64::from(i32::MIN) || *v > f64::from(i32::MAX) {
                    return Err(TypeError::LossyFloatToInt { value: *v });
                }
                Ok(Scalar::Int32(*v as i32))
            }
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        ElemKind::Float64 => match &value {
            Scalar::Bool(v) => Ok(Scalar::Float64(if *v { 1.0 } else { 0.0 })),
            Scalar::Int32(v) => Ok(Scalar::Float64(f64::from(*v))),
            _ => Err(TypeError::InvalidCast { from, to: target }),
        },
        ElemKind::Utf8 => Err(TypeError::InvalidCast { from, to: target }),
    }
}

/// Result of a numeric reduction: a float64 or the missing marker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ScalarResult {
    Float64(#[serde(with = "float_repr")] f64),
    Missing,
}

impl ScalarResult {
    /// NaN collapses to `Missing` so a result is never an unmarked NaN.
    #[must_use]
    pub fn from_f64(value: f64) -> Self {
        if value.is_nan() {
            Self::Missing
        } else {
            Self::Float64(value)
        }
    }

    #[must_use]
    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }
}

impl From<ScalarResult> for Scalar {
    fn from(value: ScalarResult) -> Self {
        match value {
            ScalarResult::Float64(v) => Self::Float64(v),
            ScalarResult::Missing => Self::Null(NullKind::Na),
        }
    }
}

// ── Missingness utilities ──────────────────────────────────────────────

pub fn count_na<T: NaValue>(values: &[T]) -> usize {
    values.iter().filter(|v| v.is_na()).count()
}
