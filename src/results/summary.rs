//! Aggregate counts over one run's step results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{StepStatus, TestStepResult};

/// Per-feature step counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureSummary {
    pub feature_name: String,
    pub total_steps: usize,
    pub passed_steps: usize,
    pub failed_steps: usize,
    pub skipped_steps: usize,
}

/// Derived aggregate over a run's step results.
///
/// Every count is computed from `recent_results`. Deserializing a stored
/// summary recomputes the counts from the stored results and ignores any
/// stored totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredSummary")]
pub struct TestResultsSummary {
    run_id: i64,
    project_name: String,
    total_features: usize,
    total_steps: usize,
    passed_steps: usize,
    failed_steps: usize,
    skipped_steps: usize,
    overall_pass_rate: f64,
    features: Vec<FeatureSummary>,
    recent_results: Vec<TestStepResult>,
    last_updated: DateTime<Utc>,
}

/// The parts of a serialized summary that are trusted on load.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSummary {
    #[serde(default)]
    run_id: i64,
    #[serde(default)]
    project_name: String,
    #[serde(default)]
    recent_results: Vec<TestStepResult>,
    #[serde(default = "Utc::now")]
    last_updated: DateTime<Utc>,
}

impl From<StoredSummary> for TestResultsSummary {
    fn from(stored: StoredSummary) -> Self {
        summarize_at(
            stored.recent_results,
            stored.run_id,
            stored.project_name,
            stored.last_updated,
        )
    }
}

/// Build a summary stamped with the current time.
pub fn summarize(
    results: Vec<TestStepResult>,
    run_id: i64,
    project_name: impl Into<String>,
) -> TestResultsSummary {
    summarize_at(results, run_id, project_name.into(), Utc::now())
}

fn summarize_at(
    results: Vec<TestStepResult>,
    run_id: i64,
    project_name: String,
    last_updated: DateTime<Utc>,
) -> TestResultsSummary {
    let mut passed = 0;
    let mut failed = 0;
    let mut skipped = 0;
    let mut features: Vec<FeatureSummary> = Vec::new();

    for step in &results {
        let idx = match features.iter().position(|f| f.feature_name == step.feature) {
            Some(idx) => idx,
            None => {
                features.push(FeatureSummary {
                    feature_name: step.feature.clone(),
                    total_steps: 0,
                    passed_steps: 0,
                    failed_steps: 0,
                    skipped_steps: 0,
                });
                features.len() - 1
            }
        };
        let feature = &mut features[idx];
        feature.total_steps += 1;

        match step.status {
            StepStatus::Passed => {
                passed += 1;
                feature.passed_steps += 1;
            }
            StepStatus::Failed => {
                failed += 1;
                feature.failed_steps += 1;
            }
            StepStatus::Skipped => {
                skipped += 1;
                feature.skipped_steps += 1;
            }
        }
    }

    let total = results.len();
    let overall_pass_rate = if total == 0 {
        0.0
    } else {
        passed as f64 / total as f64 * 100.0
    };

    TestResultsSummary {
        run_id,
        project_name,
        total_features: features.len(),
        total_steps: total,
        passed_steps: passed,
        failed_steps: failed,
        skipped_steps: skipped,
        overall_pass_rate,
        features,
        recent_results: results,
        last_updated,
    }
}

impl TestResultsSummary {
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    pub fn total_features(&self) -> usize {
        self.total_features
    }

    pub fn total_steps(&self) -> usize {
        self.total_steps
    }

    pub fn passed_steps(&self) -> usize {
        self.passed_steps
    }

    pub fn failed_steps(&self) -> usize {
        self.failed_steps
    }

    pub fn skipped_steps(&self) -> usize {
        self.skipped_steps
    }

    /// Percentage of steps that passed, `0.0` for an empty run.
    pub fn overall_pass_rate(&self) -> f64 {
        self.overall_pass_rate
    }

    pub fn features(&self) -> &[FeatureSummary] {
        &self.features
    }

    pub fn recent_results(&self) -> &[TestStepResult] {
        &self.recent_results
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        self.last_updated
    }

    pub fn failures(&self) -> impl Iterator<Item = &TestStepResult> {
        self.recent_results
            .iter()
            .filter(|r| r.status == StepStatus::Failed)
    }

    /// One-line human summary, e.g. `3 steps: 2 passed, 1 failed, 0 skipped`.
    pub fn headline(&self) -> String {
        format!(
            "{} step{}: {} passed, {} failed, {} skipped",
            self.total_steps,
            if self.total_steps == 1 { "" } else { "s" },
            self.passed_steps,
            self.failed_steps,
            self.skipped_steps,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(feature: &str, status: StepStatus) -> TestStepResult {
        TestStepResult::new(feature, "scenario", "step", status)
    }

    #[test]
    fn test_counts_always_add_up() {
        let results = vec![
            step("Login", StepStatus::Passed),
            step("Login", StepStatus::Failed),
            step("Orders", StepStatus::Skipped),
            step("Orders", StepStatus::Passed),
            step("Cart", StepStatus::Passed),
        ];
        let summary = summarize(results, 9, "Sample");

        assert_eq!(summary.total_steps(), 5);
        assert_eq!(summary.total_steps(), summary.recent_results().len());
        assert_eq!(
            summary.passed_steps() + summary.failed_steps() + summary.skipped_steps(),
            summary.total_steps()
        );
        assert_eq!(summary.total_features(), 3);
        assert!((summary.overall_pass_rate() - 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_features_keep_first_seen_order() {
        let results = vec![
            step("Orders", StepStatus::Passed),
            step("Login", StepStatus::Failed),
            step("Orders", StepStatus::Failed),
        ];
        let summary = summarize(results, 1, "Sample");
        let names: Vec<_> = summary.features().iter().map(|f| f.feature_name.as_str()).collect();
        assert_eq!(names, ["Orders", "Login"]);
        assert_eq!(summary.features()[0].failed_steps, 1);
        assert_eq!(summary.features()[0].passed_steps, 1);
    }

    #[test]
    fn test_empty_run_has_zero_pass_rate() {
        let summary = summarize(Vec::new(), 1, "Sample");
        assert_eq!(summary.total_steps(), 0);
        assert_eq!(summary.overall_pass_rate(), 0.0);
    }

    #[test]
    fn test_deserialize_recomputes_tampered_counts() {
        let summary = summarize(
            vec![step("Login", StepStatus::Passed), step("Login", StepStatus::Failed)],
            777,
            "Sample",
        );
        let mut value = serde_json::to_value(&summary).unwrap();
        value["passedSteps"] = serde_json::json!(40);
        value["totalSteps"] = serde_json::json!(99);

        let restored: TestResultsSummary = serde_json::from_value(value).unwrap();
        assert_eq!(restored.total_steps(), 2);
        assert_eq!(restored.passed_steps(), 1);
        assert_eq!(restored.failed_steps(), 1);
        assert_eq!(restored.run_id(), 777);
        assert_eq!(restored.last_updated(), summary.last_updated());
    }

    #[test]
    fn test_headline() {
        let summary = summarize(vec![step("Login", StepStatus::Passed)], 1, "Sample");
        assert_eq!(summary.headline(), "1 step: 1 passed, 0 failed, 0 skipped");
    }
}
