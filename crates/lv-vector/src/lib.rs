#![forbid(unsafe_code)]

use lv_types::{ElemKind, Logical, NaValue, NumericValue, Scalar, ScalarResult, TypeError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VectorError {
    #[error("index {index} out of bounds for vector of length {len}")]
    IndexOutOfBounds { index: usize, len: usize },
    #[error("type mismatch: expected {expected} vector, found {actual}")]
    TypeMismatch { expected: ElemKind, actual: ElemKind },
    #[error("{kind} vectors have no numeric representation")]
    UnsupportedKind { kind: ElemKind },
    #[error(transparent)]
    Type(#[from] TypeError),
}

/// Fixed-length, exclusively owned sequence of one element kind.
///
/// Missing entries hold the kind's NA marker; there is no separate validity
/// bitmap.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedVector<T> {
    values: Vec<T>,
}

impl<T: NaValue> TypedVector<T> {
    /// Allocate `len` slots, all set to the missing marker.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![T::na(); len],
        }
    }

    #[must_use]
    pub fn from_values(values: Vec<T>) -> Self {
        Self { values }
    }

    /// Build from dynamic scalars. A failed cast drops everything built so far.
    pub fn from_scalars(values: Vec<Scalar>) -> Result<Self, TypeError> {
        values
            .into_iter()
            .map(T::from_scalar)
            .collect::<Result<Vec<_>, _>>()
            .map(Self::from_values)
    }

    #[must_use]
    pub fn kind(&self) -> ElemKind {
        T::KIND
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&T, VectorError> {
        self.values.get(index).ok_or(VectorError::IndexOutOfBounds {
            index,
            len: self.values.len(),
        })
    }

    /// Store `value` at `index`; `value` may be the missing marker.
    pub fn set(&mut self, index: usize, value: T) -> Result<(), VectorError> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or(VectorError::IndexOutOfBounds { index, len })?;
        *slot = value;
        Ok(())
    }

    pub fn is_na(&self, index: usize) -> Result<bool, VectorError> {
        self.get(index).map(NaValue::is_na)
    }

    #[must_use]
    pub fn count_na(&self) -> usize {
        lv_types::count_na(&self.values)
    }

    #[must_use]
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.values.iter()
    }

    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        self.values.iter().map(NaValue::to_scalar).collect()
    }

    /// Equality that treats two missing entries as equal.
    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        self.values.len() == other.values.len()
            && self
                .values
                .iter()
                .zip(&other.values)
                .all(|(left, right)| (left.is_na() && right.is_na()) || left == right)
    }
}

impl<T: NumericValue> TypedVector<T> {
    /// Element `index` widened to `f64`, or `Missing`.
    pub fn widen_get(&self, index: usize) -> Result<ScalarResult, VectorError> {
        Ok(self
            .get(index)?
            .widen()
            .map_or(ScalarResult::Missing, ScalarResult::Float64))
    }
}

impl<T: NaValue> FromIterator<T> for TypedVector<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_values(iter.into_iter().collect())
    }
}

impl<'a, T> IntoIterator for &'a TypedVector<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

/// Serialized as a plain list of dynamic scalars; the kind is implied by `T`.
impl<T: NaValue> Serialize for TypedVector<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.values.iter().map(NaValue::to_scalar))
    }
}

impl<'de, T: NaValue> Deserialize<'de> for TypedVector<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let scalars = Vec::<Scalar>::deserialize(deserializer)?;
        Self::from_scalars(scalars).map_err(serde::de::Error::custom)
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for f64 {}
    impl Sealed for i32 {}
    impl Sealed for lv_types::Logical {}
    impl Sealed for Option<String> {}
}

/// Element types that can live inside an [`AnyVector`]. Sealed to the four kinds.
pub trait Element: NaValue + sealed::Sealed {
    fn wrap(vector: TypedVector<Self>) -> AnyVector;

    fn view(vector: &AnyVector) -> Option<&TypedVector<Self>>;

    fn view_mut(vector: &mut AnyVector) -> Option<&mut TypedVector<Self>>;

    fn unwrap_any(vector: AnyVector) -> Result<TypedVector<Self>, AnyVector>;
}

macro_rules! impl_element {
    ($ty:ty, $variant:ident) => {
        impl Element for $ty {
            fn wrap(vector: TypedVector<Self>) -> AnyVector {
                AnyVector::$variant(vector)
            }

            fn view(vector: &AnyVector) -> Option<&TypedVector<Self>> {
                match vector {
                    AnyVector::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn view_mut(vector: &mut AnyVector) -> Option<&mut TypedVector<Self>> {
                match vector {
                    AnyVector::$variant(inner) => Some(inner),
                    _ => None,
                }
            }

            fn unwrap_any(vector: AnyVector) -> Result<TypedVector<Self>, AnyVector> {
                match vector {
                    AnyVector::$variant(inner) => Ok(inner),
                    other => Err(other),
                }
            }
        }
    };
}

impl_element!(f64, Float64);
impl_element!(i32, Int32);
impl_element!(Logical, Bool);
impl_element!(Option<String>, Utf8);

/// One handler per element kind. Adding a kind adds a required method, so
/// every visitor stops compiling until it handles the new kind.
pub trait VectorVisitor {
    type Output;

    fn visit_float64(&mut self, vector: &TypedVector<f64>) -> Self::Output;

    fn visit_int32(&mut self, vector: &TypedVector<i32>) -> Self::Output;

    fn visit_bool(&mut self, vector: &TypedVector<Logical>) -> Self::Output;

    fn visit_utf8(&mut self, vector: &TypedVector<Option<String>>) -> Self::Output;
}

/// A vector whose element kind is known only at runtime. The variant tag is
/// the kind, so tag and payload cannot disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "VectorRepr", try_from = "VectorRepr")]
pub enum AnyVector {
    Float64(TypedVector<f64>),
    Int32(TypedVector<i32>),
    Bool(TypedVector<Logical>),
    Utf8(TypedVector<Option<String>>),
}

impl AnyVector {
    /// All-missing vector of a runtime-chosen kind.
    #[must_use]
    pub fn new(kind: ElemKind, len: usize) -> Self {
        match kind {
            ElemKind::Float64 => Self::Float64(TypedVector::new(len)),
            ElemKind::Int32 => Self::Int32(TypedVector::new(len)),
            ElemKind::Bool => Self::Bool(TypedVector::new(len)),
            ElemKind::Utf8 => Self::Utf8(TypedVector::new(len)),
        }
    }

    pub fn from_scalars(kind: ElemKind, values: Vec<Scalar>) -> Result<Self, VectorError> {
        Ok(match kind {
            ElemKind::Float64 => Self::Float64(TypedVector::from_scalars(values)?),
            ElemKind::Int32 => Self::Int32(TypedVector::from_scalars(values)?),
            ElemKind::Bool => Self::Bool(TypedVector::from_scalars(values)?),
            ElemKind::Utf8 => Self::Utf8(TypedVector::from_scalars(values)?),
        })
    }

    #[must_use]
    pub fn kind(&self) -> ElemKind {
        match self {
            Self::Float64(_) => ElemKind::Float64,
            Self::Int32(_) => ElemKind::Int32,
            Self::Bool(_) => ElemKind::Bool,
            Self::Utf8(_) => ElemKind::Utf8,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Float64(v) => v.len(),
            Self::Int32(v) => v.len(),
            Self::Bool(v) => v.len(),
            Self::Utf8(v) => v.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn count_na(&self) -> usize {
        match self {
            Self::Float64(v) => v.count_na(),
            Self::Int32(v) => v.count_na(),
            Self::Bool(v) => v.count_na(),
            Self::Utf8(v) => v.count_na(),
        }
    }

    /// Exhaustive dispatch: runs the one handler matching the runtime kind.
    pub fn accept<V: VectorVisitor>(&self, visitor: &mut V) -> V::Output {
        match self {
            Self::Float64(v) => visitor.visit_float64(v),
            Self::Int32(v) => visitor.visit_int32(v),
            Self::Bool(v) => visitor.visit_bool(v),
            Self::Utf8(v) => visitor.visit_utf8(v),
        }
    }

    /// Speculative view as `TypedVector<T>`; fails unless the kind is `T::KIND`.
    pub fn downcast<T: Element>(&self) -> Result<&TypedVector<T>, VectorError> {
        let actual = self.kind();
        T::view(self).ok_or_else(|| mismatch(T::KIND, actual))
    }

    pub fn downcast_mut<T: Element>(&mut self) -> Result<&mut TypedVector<T>, VectorError> {
        let actual = self.kind();
        T::view_mut(self).ok_or_else(|| mismatch(T::KIND, actual))
    }

    /// Take the payload out as `TypedVector<T>`, handing the vector back on mismatch.
    pub fn into_typed<T: Element>(self) -> Result<TypedVector<T>, Self> {
        T::unwrap_any(self)
    }

    /// Element `index` converted to `f64` without materializing a new vector.
    ///
    /// Float64 passes through, Int32 widens exactly, Bool maps to 1.0/0.0.
    /// Utf8 has no numeric mapping and fails with `UnsupportedKind`.
    pub fn coerce_get(&self, index: usize) -> Result<ScalarResult, VectorError> {
        match self {
            Self::Float64(v) => v.widen_get(index),
            Self::Int32(v) => v.widen_get(index),
            Self::Bool(v) => v.widen_get(index),
            Self::Utf8(_) => Err(VectorError::UnsupportedKind {
                kind: ElemKind::Utf8,
            }),
        }
    }

    pub fn get_scalar(&self, index: usize) -> Result<Scalar, VectorError> {
        Ok(match self {
            Self::Float64(v) => v.get(index)?.to_scalar(),
            Self::Int32(v) => v.get(index)?.to_scalar(),
            Self::Bool(v) => v.get(index)?.to_scalar(),
            Self::Utf8(v) => v.get(index)?.to_scalar(),
        })
    }

    /// Store a dynamic scalar, cast to this vector's kind.
    pub fn set_scalar(&mut self, index: usize, value: Scalar) -> Result<(), VectorError> {
        match self {
            Self::Float64(v) => v.set(index, f64::from_scalar(value)?),
            Self::Int32(v) => v.set(index, i32::from_scalar(value)?),
            Self::Bool(v) => v.set(index, Logical::from_scalar(value)?),
            Self::Utf8(v) => v.set(index, Option::<String>::from_scalar(value)?),
        }
    }

    #[must_use]
    pub fn to_scalars(&self) -> Vec<Scalar> {
        match self {
            Self::Float64(v) => v.to_scalars(),
            Self::Int32(v) => v.to_scalars(),
            Self::Bool(v) => v.to_scalars(),
            Self::Utf8(v) => v.to_scalars(),
        }
    }

    #[must_use]
    pub fn semantic_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Float64(a), Self::Float64(b)) => a.semantic_eq(b),
            (Self::Int32(a), Self::Int32(b)) => a.semantic_eq(b),
            (Self::Bool(a), Self::Bool(b)) => a.semantic_eq(b),
            (Self::Utf8(a), Self::Utf8(b)) => a.semantic_eq(b),
            _ => false,
        }
    }
}

fn mismatch(expected: ElemKind, actual: ElemKind) -> VectorError {
    trace!(%expected, %actual, "downcast rejected");
    VectorError::TypeMismatch { expected, actual }
}

impl<T: Element> From<TypedVector<T>> for AnyVector {
    fn from(vector: TypedVector<T>) -> Self {
        T::wrap(vector)
    }
}

/// Serialized form: the kind plus one dynamic scalar per element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRepr {
    pub kind: ElemKind,
    pub values: Vec<Scalar>,
}

impl From<AnyVector> for VectorRepr {
    fn from(vector: AnyVector) -> Self {
        Self {
            kind: vector.kind(),
            values: vector.to_scalars(),
        }
    }
}

impl TryFrom<VectorRepr> for AnyVector {
    type Error = VectorError;

    fn try_from(repr: VectorRepr) -> Result<Self, Self::Error> {
        Self::from_scalars(repr.kind, repr.values)
    }
}
