#![forbid(unsafe_code)]

use std::fmt;

use lv_types::{ElemKind, Logical, NaValue, NumericValue, ScalarResult};
use lv_vector::{AnyVector, TypedVector, VectorError, VectorVisitor};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Square,
    Sum,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Square => "square",
            Self::Sum => "sum",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum OpError {
    #[error("{operation} is not defined for {kind} vectors")]
    UnsupportedOperation { operation: Operation, kind: ElemKind },
    #[error(transparent)]
    Vector(#[from] VectorError),
}

/// How `square` treats int32 results that do not fit.
///
/// Neither policy can yield `i32::MIN`: a square is never negative when
/// saturated, and `x * x mod 2^32` never equals `2^31` because the power of
/// two dividing a square is even.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntOverflow {
    #[default]
    Wrap,
    Saturate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SquareOptions {
    pub int_overflow: IntOverflow,
}

/// Which dispatch path `sum` takes. All three agree wherever they all succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SumStrategy {
    /// Read every element through `AnyVector::coerce_get`.
    Coerce,
    /// Exhaustive per-kind visitor.
    #[default]
    Visit,
    /// Assume float64; any other kind is a type mismatch.
    Downcast,
}

impl SumStrategy {
    pub const ALL: [Self; 3] = [Self::Coerce, Self::Visit, Self::Downcast];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SumOptions {
    pub strategy: SumStrategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub square: SquareOptions,
    pub sum: SumOptions,
}

// ── square ─────────────────────────────────────────────────────────────

trait Squarable: NaValue + Copy {
    fn square(self, overflow: IntOverflow) -> Self;
}

impl Squarable for f64 {
    fn square(self, _overflow: IntOverflow) -> Self {
        self * self
    }
}

impl Squarable for i32 {
    fn square(self, overflow: IntOverflow) -> Self {
        match overflow {
            IntOverflow::Wrap => self.wrapping_mul(self),
            IntOverflow::Saturate => self.saturating_mul(self),
        }
    }
}

fn square_typed<T: Squarable>(vector: &TypedVector<T>, overflow: IntOverflow) -> TypedVector<T> {
    vector
        .iter()
        .map(|value| {
            if value.is_na() {
                T::na()
            } else {
                value.square(overflow)
            }
        })
        .collect()
}

struct SquareVisitor {
    overflow: IntOverflow,
}

impl VectorVisitor for SquareVisitor {
    type Output = Result<AnyVector, OpError>;

    fn visit_float64(&mut self, vector: &TypedVector<f64>) -> Self::Output {
        Ok(square_typed(vector, self.overflow).into())
    }

    fn visit_int32(&mut self, vector: &TypedVector<i32>) -> Self::Output {
        Ok(square_typed(vector, self.overflow).into())
    }

    // With true=1 and false=0 squaring is the identity; hand back a fresh copy.
    fn visit_bool(&mut self, vector: &TypedVector<Logical>) -> Self::Output {
        Ok(vector.clone().into())
    }

    fn visit_utf8(&mut self, _vector: &TypedVector<Option<String>>) -> Self::Output {
        Err(OpError::UnsupportedOperation {
            operation: Operation::Square,
            kind: ElemKind::Utf8,
        })
    }
}

/// Element-wise square. The result has the input's kind and length, and is
/// missing exactly where the input is.
pub fn square(vector: &AnyVector) -> Result<AnyVector, OpError> {
    square_with_options(vector, SquareOptions::default())
}

pub fn square_with_options(
    vector: &AnyVector,
    options: SquareOptions,
) -> Result<AnyVector, OpError> {
    debug!(
        operation = %Operation::Square,
        kind = %vector.kind(),
        len = vector.len(),
        overflow = ?options.int_overflow,
        "dispatching element-wise operation"
    );
    vector.accept(&mut SquareVisitor {
        overflow: options.int_overflow,
    })
}

// ── sum ────────────────────────────────────────────────────────────────

/// Accumulate widened values; the first missing value taints the total.
fn sum_widened<I>(values: I) -> ScalarResult
where
    I: IntoIterator<Item = Option<f64>>,
{
    let mut total = 0.0;
    for (index, value) in values.into_iter().enumerate() {
        let Some(value) = value else {
            trace!(index, "missing value taints sum");
            return ScalarResult::Missing;
        };
        total += value;
    }
    ScalarResult::from_f64(total)
}

fn sum_typed<T: NumericValue>(vector: &TypedVector<T>) -> ScalarResult {
    sum_widened(vector.iter().map(|value| value.widen()))
}

struct SumVisitor;

impl VectorVisitor for SumVisitor {
    type Output = Result<ScalarResult, OpError>;

    fn visit_float64(&mut self, vector: &TypedVector<f64>) -> Self::Output {
        Ok(sum_typed(vector))
    }

    fn visit_int32(&mut self, vector: &TypedVector<i32>) -> Self::Output {
        Ok(sum_typed(vector))
    }

    fn visit_bool(&mut self, vector: &TypedVector<Logical>) -> Self::Output {
        Ok(sum_typed(vector))
    }

    fn visit_utf8(&mut self, _vector: &TypedVector<Option<String>>) -> Self::Output {
        Err(OpError::UnsupportedOperation {
            operation: Operation::Sum,
            kind: ElemKind::Utf8,
        })
    }
}

/// Sum through uniform coercion to `f64`. Kinds without a numeric mapping
/// are rejected up front, before any element is read.
pub fn sum_coerce(vector: &AnyVector) -> Result<ScalarResult, OpError> {
    let kind = vector.kind();
    if !kind.is_numeric() {
        return Err(OpError::UnsupportedOperation {
            operation: Operation::Sum,
            kind,
        });
    }

    let mut total = 0.0;
    for index in 0..vector.len() {
        match vector.coerce_get(index)? {
            ScalarResult::Float64(value) => total += value,
            ScalarResult::Missing => {
                trace!(index, "missing value taints sum");
                return Ok(ScalarResult::Missing);
            }
        }
    }
    Ok(ScalarResult::from_f64(total))
}

/// Sum through the exhaustive per-kind visitor.
pub fn sum_visit(vector: &AnyVector) -> Result<ScalarResult, OpError> {
    vector.accept(&mut SumVisitor)
}

/// Sum that assumes a float64 vector. Int32 and bool are not widened here;
/// every non-float64 kind fails with a type mismatch.
pub fn sum_downcast(vector: &AnyVector) -> Result<ScalarResult, OpError> {
    let floats = vector.downcast::<f64>()?;
    Ok(sum_typed(floats))
}

/// Reduce to a single float64. Any missing element makes the result missing;
/// an empty vector sums to 0.0.
pub fn sum(vector: &AnyVector) -> Result<ScalarResult, OpError> {
    sum_with_options(vector, SumOptions::default())
}

pub fn sum_with_options(vector: &AnyVector, options: SumOptions) -> Result<ScalarResult, OpError> {
    debug!(
        operation = %Operation::Sum,
        kind = %vector.kind(),
        len = vector.len(),
        strategy = ?options.strategy,
        "dispatching reduction"
    );
    let result = match options.strategy {
        SumStrategy::Coerce => sum_coerce(vector),
        SumStrategy::Visit => sum_visit(vector),
        SumStrategy::Downcast => sum_downcast(vector),
    };
    if let Err(err) = &result {
        debug!(error = %err, "reduction failed");
    }
    result
}

/// Run an operation chosen at runtime, returning a vector or a scalar.
pub fn apply(
    operation: Operation,
    vector: &AnyVector,
    config: &OpsConfig,
) -> Result<OpOutput, OpError> {
    match operation {
        Operation::Square => square_with_options(vector, config.square).map(OpOutput::Vector),
        Operation::Sum => sum_with_options(vector, config.sum).map(OpOutput::Scalar),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
    Vector(AnyVector),
    Scalar(ScalarResult),
}
