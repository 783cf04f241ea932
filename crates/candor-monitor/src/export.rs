//! Quality report assembly and JSON export

use candor_common::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Fleet-level rollup over a set of analysis results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualitySummary {
    pub total_tests: usize,
    pub passed_tests: usize,
    pub failed_tests: usize,
    /// Fraction of results that passed the quality gate; `0.0` when empty.
    pub pass_rate: f64,
    /// Mean of per-result average perplexity, finite results only.
    pub avg_perplexity: f64,
    pub avg_entropy: f64,
    pub avg_surprise: f64,
}

/// A batch of analysis results plus their summary, ready to serialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    pub model_id: String,
    pub summary: QualitySummary,
    pub results: Vec<AnalysisResult>,
}

impl QualityReport {
    pub fn from_results(model_id: impl Into<String>, results: Vec<AnalysisResult>) -> Self {
        let summary = summarize(&results);
        Self { model_id: model_id.into(), summary, results }
    }

    pub fn to_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }
}

fn summarize(results: &[AnalysisResult]) -> QualitySummary {
    let total = results.len();
    let passed = results.iter().filter(|r| r.passed_quality_check).count();

    #[allow(clippy::cast_precision_loss)]
    let pass_rate = if total == 0 { 0.0 } else { passed as f64 / total as f64 };

    let finite_mean = |values: &mut dyn Iterator<Item = f64>| -> f64 {
        let finite: Vec<f64> = values.filter(|v| v.is_finite()).collect();
        if finite.is_empty() {
            0.0
        } else {
            #[allow(clippy::cast_precision_loss)]
            let mean = finite.iter().sum::<f64>() / finite.len() as f64;
            mean
        }
    };

    QualitySummary {
        total_tests: total,
        passed_tests: passed,
        failed_tests: total - passed,
        pass_rate,
        avg_perplexity: finite_mean(&mut results.iter().map(|r| r.avg_perplexity)),
        avg_entropy: finite_mean(&mut results.iter().map(|r| r.avg_entropy)),
        avg_surprise: finite_mean(&mut results.iter().map(|r| r.final_surprise)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(passed: bool, avg_perplexity: f64) -> AnalysisResult {
        AnalysisResult {
            model_id: "m".to_string(),
            prompt: "p".to_string(),
            generated_text: "g".to_string(),
            step_metrics: Vec::new(),
            avg_perplexity,
            max_perplexity: avg_perplexity,
            avg_entropy: 0.5,
            max_entropy: 0.9,
            final_surprise: 2.0,
            generation_step_count: 0,
            perplexity_threshold: 50.0,
            entropy_threshold: 3.0,
            surprise_threshold: 20.0,
            passed_quality_check: passed,
            generation_ms: 1,
            from_fallback: false,
        }
    }

    #[test]
    fn summary_counts_and_pass_rate() {
        let report = QualityReport::from_results(
            "m",
            vec![result(true, 2.0), result(false, 4.0), result(true, 6.0)],
        );
        let summary = &report.summary;
        assert_eq!(summary.total_tests, 3);
        assert_eq!(summary.passed_tests, 2);
        assert_eq!(summary.failed_tests, 1);
        assert!((summary.pass_rate - 2.0 / 3.0).abs() < 1e-9);
        assert!((summary.avg_perplexity - 4.0).abs() < 1e-9);
    }

    #[test]
    fn infinite_perplexity_excluded_from_summary_mean() {
        let report = QualityReport::from_results(
            "m",
            vec![result(false, f64::INFINITY), result(true, 3.0)],
        );
        assert!((report.summary.avg_perplexity - 3.0).abs() < 1e-9);
    }

    #[test]
    fn empty_report_is_all_zeroes() {
        let report = QualityReport::from_results("m", Vec::new());
        assert_eq!(report.summary.total_tests, 0);
        assert_eq!(report.summary.pass_rate, 0.0);
        assert_eq!(report.summary.avg_perplexity, 0.0);
    }

    #[test]
    fn report_round_trips_through_json_file() {
        let report = QualityReport::from_results("m", vec![result(true, 2.0)]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let back: QualityReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(back.summary, report.summary);
        assert_eq!(back.results.len(), 1);
    }
}
