#![forbid(unsafe_code)]

//! Property-based checks for square and sum across element kinds and
//! missing-value patterns.

use proptest::prelude::*;

use lv_ops::{OpError, Operation, SumOptions, SumStrategy, square, sum, sum_with_options};
use lv_types::{ElemKind, Logical, NA_FLOAT64, NA_INT32, Scalar, ScalarResult};
use lv_vector::{AnyVector, TypedVector, VectorError};

// ---------------------------------------------------------------------------
// Strategy generators
// ---------------------------------------------------------------------------

/// Small-magnitude floats so sums stay exact enough to compare across paths,
/// plus the two infinities.
fn arb_float() -> impl Strategy<Value = f64> {
    prop_oneof![
        12 => (-1_000_i32..1_000).prop_map(|v| f64::from(v) / 4.0),
        2 => Just(NA_FLOAT64),
        2 => Just(f64::NAN),
        1 => Just(f64::INFINITY),
        1 => Just(f64::NEG_INFINITY),
    ]
}

fn arb_int() -> impl Strategy<Value = i32> {
    prop_oneof![
        6 => any::<i32>().prop_filter("not the NA marker", |v| *v != NA_INT32),
        1 => Just(NA_INT32),
    ]
}

fn arb_logical() -> impl Strategy<Value = Logical> {
    prop_oneof![
        3 => Just(Logical::True),
        3 => Just(Logical::False),
        1 => Just(Logical::Na),
    ]
}

fn arb_float_vector() -> impl Strategy<Value = AnyVector> {
    proptest::collection::vec(arb_float(), 0..40)
        .prop_map(|values| TypedVector::from_values(values).into())
}

fn arb_numeric_vector() -> impl Strategy<Value = AnyVector> {
    prop_oneof![
        arb_float_vector(),
        proptest::collection::vec(arb_int(), 0..40)
            .prop_map(|values| TypedVector::from_values(values).into()),
        proptest::collection::vec(arb_logical(), 0..40)
            .prop_map(|values| TypedVector::from_values(values).into()),
    ]
}

fn arb_text_vector() -> impl Strategy<Value = AnyVector> {
    proptest::collection::vec(proptest::option::of("[a-z]{0,4}"), 0..10)
        .prop_map(|values| TypedVector::from_values(values).into())
}

fn missing_flags(vector: &AnyVector) -> Vec<bool> {
    vector.to_scalars().iter().map(|s| s.is_missing()).collect()
}

/// Whether the vector holds both infinities, whose sum is NaN.
fn mixes_infinities(vector: &AnyVector) -> bool {
    let scalars = vector.to_scalars();
    let holds = |target: f64| {
        scalars
            .iter()
            .any(|s| matches!(s, Scalar::Float64(v) if *v == target))
    };
    holds(f64::INFINITY) && holds(f64::NEG_INFINITY)
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// square keeps kind and length, and is missing exactly where the input is.
    #[test]
    fn prop_square_preserves_shape_and_missingness(input in arb_numeric_vector()) {
        let out = square(&input).expect("numeric kinds square");
        prop_assert_eq!(out.kind(), input.kind());
        prop_assert_eq!(out.len(), input.len());
        prop_assert_eq!(missing_flags(&out), missing_flags(&input));
    }

    /// square never produces a value that reads back as the int32 NA marker.
    #[test]
    fn prop_square_int_never_aliases_na(values in proptest::collection::vec(arb_int(), 0..40)) {
        let input: AnyVector = TypedVector::from_values(values).into();
        let out = square(&input).expect("int32 squares");
        prop_assert_eq!(out.count_na(), input.count_na());
    }

    /// square on bool is the identity.
    #[test]
    fn prop_square_bool_is_identity(values in proptest::collection::vec(arb_logical(), 0..40)) {
        let input: AnyVector = TypedVector::from_values(values).into();
        let out = square(&input).expect("bool squares");
        prop_assert_eq!(out, input);
    }

    /// square and sum on text always fail, whatever the content.
    #[test]
    fn prop_text_is_unsupported(input in arb_text_vector()) {
        prop_assert_eq!(
            square(&input),
            Err(OpError::UnsupportedOperation { operation: Operation::Square, kind: ElemKind::Utf8 })
        );
        prop_assert_eq!(
            sum(&input),
            Err(OpError::UnsupportedOperation { operation: Operation::Sum, kind: ElemKind::Utf8 })
        );
    }

    /// Any missing element makes the sum missing. Without one, only a
    /// NaN accumulation (both infinities present) is missing.
    #[test]
    fn prop_sum_taints_on_any_missing(input in arb_numeric_vector()) {
        let result = sum(&input).expect("numeric kinds sum");
        if input.count_na() > 0 {
            prop_assert_eq!(result, ScalarResult::Missing);
        } else {
            prop_assert_eq!(result.is_missing(), mixes_infinities(&input));
        }
    }

    /// Inserting a missing value anywhere taints an otherwise clean float sum.
    #[test]
    fn prop_sum_taint_is_position_independent(
        values in proptest::collection::vec((-100_i32..100).prop_map(f64::from), 0..20),
        at in any::<prop::sample::Index>(),
    ) {
        let mut values = values;
        let position = at.index(values.len() + 1);
        values.insert(position, NA_FLOAT64);
        let input: AnyVector = TypedVector::from_values(values).into();
        for strategy in SumStrategy::ALL {
            prop_assert_eq!(
                sum_with_options(&input, SumOptions { strategy }),
                Ok(ScalarResult::Missing)
            );
        }
    }

    /// All three strategies agree on float64 vectors.
    #[test]
    fn prop_sum_strategies_agree_on_float(input in arb_float_vector()) {
        let visit = sum_with_options(&input, SumOptions { strategy: SumStrategy::Visit });
        let coerce = sum_with_options(&input, SumOptions { strategy: SumStrategy::Coerce });
        let downcast = sum_with_options(&input, SumOptions { strategy: SumStrategy::Downcast });
        prop_assert_eq!(&visit, &coerce);
        prop_assert_eq!(&visit, &downcast);
    }

    /// Coerce and visit agree on every numeric kind; downcast rejects all but float64.
    #[test]
    fn prop_downcast_is_narrower(input in arb_numeric_vector()) {
        let visit = sum_with_options(&input, SumOptions { strategy: SumStrategy::Visit });
        let coerce = sum_with_options(&input, SumOptions { strategy: SumStrategy::Coerce });
        prop_assert_eq!(&visit, &coerce);

        let downcast = sum_with_options(&input, SumOptions { strategy: SumStrategy::Downcast });
        if input.kind() == ElemKind::Float64 {
            prop_assert_eq!(downcast, visit);
        } else {
            prop_assert_eq!(
                downcast,
                Err(OpError::Vector(VectorError::TypeMismatch {
                    expected: ElemKind::Float64,
                    actual: input.kind(),
                }))
            );
        }
    }

    /// JSON round-trip preserves kind, length, missing positions and
    /// infinite values.
    #[test]
    fn prop_vector_serde_round_trip(input in arb_numeric_vector()) {
        let json = serde_json::to_string(&input).expect("serialize");
        let back: AnyVector = serde_json::from_str(&json).expect("deserialize");
        prop_assert!(back.semantic_eq(&input));
    }

    /// Sum results, infinite ones included, survive a JSON round-trip.
    #[test]
    fn prop_sum_result_serde_round_trip(input in arb_float_vector()) {
        let result = sum(&input).expect("float64 sums");
        let json = serde_json::to_string(&result).expect("serialize");
        let back: ScalarResult = serde_json::from_str(&json).expect("deserialize");
        prop_assert_eq!(back, result);
    }
}
