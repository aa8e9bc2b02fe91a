#![forbid(unsafe_code)]

//! Fixture-driven conformance harness for the vector operations.
//!
//! Each fixture is a JSON file holding one case: an input vector, the
//! operation to run, optional execution options, and exactly one expectation
//! (a vector, a scalar, or an error substring).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use lv_ops::{OpError, OpsConfig, SumOptions, SumStrategy, square_with_options, sum_with_options};
use lv_types::ScalarResult;
use lv_vector::{AnyVector, VectorRepr};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
    pub case_filter: Option<String>,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
            case_filter: None,
        }
    }

    #[must_use]
    pub fn case_fixture_root(&self) -> PathBuf {
        self.fixture_root.join("cases")
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    Square,
    /// Sum using the strategy from the fixture's config.
    Sum,
    SumCoerce,
    SumVisit,
    SumDowncast,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseFixture {
    pub case_id: String,
    pub operation: FixtureOperation,
    pub input: VectorRepr,
    #[serde(default)]
    pub config: OpsConfig,
    #[serde(default)]
    pub expected_vector: Option<VectorRepr>,
    #[serde(default)]
    pub expected_scalar: Option<ScalarResult>,
    #[serde(default)]
    pub expected_error_contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
    #[serde(default)]
    pub elapsed_us: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuiteReport {
    pub suite: String,
    pub fixture_count: usize,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<CaseResult>,
}

impl SuiteReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failed == 0
    }

    /// Digest of case ids, statuses and mismatches. Timings are left out so
    /// repeated runs over the same fixtures hash identically.
    pub fn outcome_digest(&self) -> Result<String, HarnessError> {
        let outcomes: Vec<(&str, &CaseStatus, Option<&str>)> = self
            .results
            .iter()
            .map(|r| (r.case_id.as_str(), &r.status, r.mismatch.as_deref()))
            .collect();
        stable_json_digest(&outcomes)
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

enum ResolvedExpected {
    Vector(AnyVector),
    Scalar(ScalarResult),
    ErrorContains(String),
}

enum ActualOutput {
    Vector(AnyVector),
    Scalar(ScalarResult),
}

pub fn run_suite(config: &HarnessConfig) -> Result<SuiteReport, HarnessError> {
    let fixtures = load_fixtures(config)?;
    Ok(run_cases("cases", &fixtures))
}

#[must_use]
pub fn run_cases(suite: &str, fixtures: &[CaseFixture]) -> SuiteReport {
    let results: Vec<CaseResult> = fixtures.iter().map(run_fixture).collect();
    let passed = results
        .iter()
        .filter(|r| r.status == CaseStatus::Pass)
        .count();

    SuiteReport {
        suite: suite.to_owned(),
        fixture_count: fixtures.len(),
        passed,
        failed: results.len() - passed,
        results,
    }
}

pub fn load_fixtures(config: &HarnessConfig) -> Result<Vec<CaseFixture>, HarnessError> {
    let fixture_files = list_fixture_files(&config.case_fixture_root())?;
    let mut fixtures = Vec::with_capacity(fixture_files.len());

    for fixture_path in fixture_files {
        let fixture = load_fixture(&fixture_path)?;
        if config
            .case_filter
            .as_deref()
            .is_none_or(|filter| fixture.case_id.contains(filter))
        {
            fixtures.push(fixture);
        }
    }
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

fn load_fixture(path: &Path) -> Result<CaseFixture, HarnessError> {
    let body = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&body)?)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[must_use]
pub fn run_fixture(fixture: &CaseFixture) -> CaseResult {
    let started = Instant::now();
    let mismatch = run_fixture_operation(fixture).err();
    let elapsed_us = (started.elapsed().as_micros() as u64).max(1);

    match &mismatch {
        Some(message) => warn!(case_id = %fixture.case_id, %message, "case failed"),
        None => debug!(case_id = %fixture.case_id, elapsed_us, "case passed"),
    }

    CaseResult {
        case_id: fixture.case_id.clone(),
        operation: fixture.operation,
        status: if mismatch.is_none() {
            CaseStatus::Pass
        } else {
            CaseStatus::Fail
        },
        mismatch,
        elapsed_us,
    }
}

fn run_fixture_operation(fixture: &CaseFixture) -> Result<(), String> {
    let expected = fixture_expected(fixture).map_err(|err| err.to_string())?;
    let input = AnyVector::try_from(fixture.input.clone())
        .map_err(|err| format!("input vector build failed: {err}"))?;

    let actual = execute(fixture.operation, &input, &fixture.config);

    match (expected, actual) {
        (ResolvedExpected::Vector(expected), Ok(ActualOutput::Vector(actual))) => {
            compare_vector_expected(&actual, &expected)
        }
        (ResolvedExpected::Scalar(expected), Ok(ActualOutput::Scalar(actual))) => {
            if actual == expected {
                Ok(())
            } else {
                Err(format!("scalar mismatch: actual={actual:?}, expected={expected:?}"))
            }
        }
        (ResolvedExpected::ErrorContains(substr), Err(err)) => {
            let message = err.to_string();
            if message.contains(&substr) {
                Ok(())
            } else {
                Err(format!(
                    "expected error containing '{substr}', got '{message}'"
                ))
            }
        }
        (ResolvedExpected::ErrorContains(substr), Ok(_)) => {
            Err(format!("expected failure containing '{substr}', but the operation succeeded"))
        }
        (_, Err(err)) => Err(format!("operation failed unexpectedly: {err}")),
        (ResolvedExpected::Vector(_), Ok(ActualOutput::Scalar(_)))
        | (ResolvedExpected::Scalar(_), Ok(ActualOutput::Vector(_))) => {
            Err("expectation does not match the operation's output shape".to_owned())
        }
    }
}

fn execute(
    operation: FixtureOperation,
    input: &AnyVector,
    config: &OpsConfig,
) -> Result<ActualOutput, OpError> {
    let sum_as = |strategy| sum_with_options(input, SumOptions { strategy });
    match operation {
        FixtureOperation::Square => {
            square_with_options(input, config.square).map(ActualOutput::Vector)
        }
        FixtureOperation::Sum => sum_with_options(input, config.sum).map(ActualOutput::Scalar),
        FixtureOperation::SumCoerce => sum_as(SumStrategy::Coerce).map(ActualOutput::Scalar),
        FixtureOperation::SumVisit => sum_as(SumStrategy::Visit).map(ActualOutput::Scalar),
        FixtureOperation::SumDowncast => sum_as(SumStrategy::Downcast).map(ActualOutput::Scalar),
    }
}

fn fixture_expected(fixture: &CaseFixture) -> Result<ResolvedExpected, HarnessError> {
    if let Some(substr) = fixture.expected_error_contains.clone() {
        return Ok(ResolvedExpected::ErrorContains(substr));
    }

    match fixture.operation {
        FixtureOperation::Square => {
            let repr = fixture.expected_vector.clone().ok_or_else(|| {
                HarnessError::FixtureFormat(format!(
                    "missing expected_vector for case {}",
                    fixture.case_id
                ))
            })?;
            let vector = AnyVector::try_from(repr).map_err(|err| {
                HarnessError::FixtureFormat(format!(
                    "expected_vector for case {} is malformed: {err}",
                    fixture.case_id
                ))
            })?;
            Ok(ResolvedExpected::Vector(vector))
        }
        FixtureOperation::Sum
        | FixtureOperation::SumCoerce
        | FixtureOperation::SumVisit
        | FixtureOperation::SumDowncast => fixture
            .expected_scalar
            .map(ResolvedExpected::Scalar)
            .ok_or_else(|| {
                HarnessError::FixtureFormat(format!(
                    "missing expected_scalar for case {}",
                    fixture.case_id
                ))
            }),
    }
}

fn compare_vector_expected(actual: &AnyVector, expected: &AnyVector) -> Result<(), String> {
    if actual.kind() != expected.kind() {
        return Err(format!(
            "kind mismatch: actual={}, expected={}",
            actual.kind(),
            expected.kind()
        ));
    }
    if actual.len() != expected.len() {
        return Err(format!(
            "length mismatch: actual={}, expected={}",
            actual.len(),
            expected.len()
        ));
    }
    if !actual.semantic_eq(expected) {
        return Err(format!(
            "value mismatch: actual={:?}, expected={:?}",
            actual.to_scalars(),
            expected.to_scalars()
        ));
    }
    Ok(())
}

fn stable_json_digest<T: Serialize>(value: &T) -> Result<String, HarnessError> {
    let payload = serde_json::to_vec(value)?;
    Ok(format!("{:x}", Sha256::digest(&payload)))
}

#[cfg(test)]
mod tests {
    use lv_ops::OpsConfig;
    use lv_types::{ElemKind, NullKind, Scalar, ScalarResult};
    use lv_vector::VectorRepr;

    use std::collections::BTreeMap;

    use super::{
        CaseFixture, CaseStatus, FixtureOperation, HarnessError, run_cases, run_fixture,
        stable_json_digest,
    };

    fn fixture(operation: FixtureOperation, kind: ElemKind, values: Vec<Scalar>) -> CaseFixture {
        CaseFixture {
            case_id: "inline".to_owned(),
            operation,
            input: VectorRepr { kind, values },
            config: OpsConfig::default(),
            expected_vector: None,
            expected_scalar: None,
            expected_error_contains: None,
        }
    }

    #[test]
    fn passing_scalar_case() {
        let mut case = fixture(
            FixtureOperation::SumVisit,
            ElemKind::Int32,
            vec![Scalar::Int32(1), Scalar::Int32(2)],
        );
        case.expected_scalar = Some(ScalarResult::Float64(3.0));
        assert_eq!(run_fixture(&case).status, CaseStatus::Pass);
    }

    #[test]
    fn wrong_expectation_reports_mismatch() {
        let mut case = fixture(
            FixtureOperation::Square,
            ElemKind::Float64,
            vec![Scalar::Float64(2.0), Scalar::Null(NullKind::Na)],
        );
        case.expected_vector = Some(VectorRepr {
            kind: ElemKind::Float64,
            values: vec![Scalar::Float64(4.0), Scalar::Float64(0.0)],
        });
        let result = run_fixture(&case);
        assert_eq!(result.status, CaseStatus::Fail);
        assert!(
            result
                .mismatch
                .as_deref()
                .is_some_and(|m| m.starts_with("value mismatch"))
        );
    }

    #[test]
    fn missing_expectation_is_a_format_failure() {
        let case = fixture(FixtureOperation::Sum, ElemKind::Float64, vec![]);
        let result = run_fixture(&case);
        assert_eq!(result.status, CaseStatus::Fail);
        assert!(
            result
                .mismatch
                .as_deref()
                .is_some_and(|m| m.contains("missing expected_scalar"))
        );
    }

    #[test]
    fn unexpected_success_fails_error_case() {
        let mut case = fixture(
            FixtureOperation::SumDowncast,
            ElemKind::Float64,
            vec![Scalar::Float64(1.0)],
        );
        case.expected_error_contains = Some("type mismatch".to_owned());
        assert_eq!(run_fixture(&case).status, CaseStatus::Fail);
    }

    #[test]
    fn report_counts_and_digest_are_stable() {
        let mut ok = fixture(FixtureOperation::Sum, ElemKind::Bool, vec![]);
        ok.expected_scalar = Some(ScalarResult::Float64(0.0));
        let mut bad = ok.clone();
        bad.case_id = "bad".to_owned();
        bad.expected_scalar = Some(ScalarResult::Missing);

        let first = run_cases("inline", &[ok.clone(), bad.clone()]);
        let second = run_cases("inline", &[ok, bad]);
        assert_eq!(first.fixture_count, 2);
        assert_eq!(first.passed, 1);
        assert_eq!(first.failed, 1);
        assert!(!first.is_green());
        let digest = first.outcome_digest().expect("digest");
        assert_eq!(digest, second.outcome_digest().expect("digest"));
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn digest_reports_unserializable_payloads() {
        let mut keyed = BTreeMap::new();
        keyed.insert((1, 2), "tuple keys are not valid JSON object keys");
        assert!(matches!(
            stable_json_digest(&keyed),
            Err(HarnessError::Json(_))
        ));
    }

    #[test]
    fn infinite_sum_matches_fixture_expectation() {
        let mut case = fixture(
            FixtureOperation::SumCoerce,
            ElemKind::Float64,
            vec![Scalar::Float64(f64::MAX), Scalar::Float64(f64::MAX)],
        );
        case.expected_scalar = Some(ScalarResult::Float64(f64::INFINITY));
        assert_eq!(run_fixture(&case).status, CaseStatus::Pass);

        let json = serde_json::to_string(&case).expect("serialize");
        let back: CaseFixture = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.expected_scalar, case.expected_scalar);
    }
}
