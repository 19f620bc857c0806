// src/core/grading.rs

use crate::core::models::{CheckResult, ScanSummary};

const BASE_SCORE: i32 = 100;

// Lower bound of each grade, highest first.
const GRADE_CHART: &[(u32, &str)] = &[
    (100, "A+"),
    (90, "A"),
    (85, "A-"),
    (80, "B+"),
    (70, "B"),
    (65, "B-"),
    (60, "C+"),
    (50, "C"),
    (45, "C-"),
    (40, "D+"),
    (30, "D"),
    (25, "D-"),
];

pub fn grade_for(score: u32) -> &'static str {
    GRADE_CHART
        .iter()
        .find(|(floor, _)| score >= *floor)
        .map(|(_, grade)| *grade)
        .unwrap_or("F")
}

/// Aggregates the results of one completed scan into a score and grade.
pub fn summarize<'a>(results: impl IntoIterator<Item = &'a CheckResult>) -> ScanSummary {
    let mut summary = ScanSummary::default();
    let mut score = BASE_SCORE;

    for result in results {
        summary.tests_quantity += 1;
        if result.pass {
            summary.tests_passed += 1;
        } else {
            summary.tests_failed += 1;
        }
        score += result.score_modifier;
    }

    summary.score = score.max(0) as u32;
    summary.grade = grade_for(summary.score).to_string();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(pass: bool, score_modifier: i32) -> CheckResult {
        CheckResult {
            expectation: String::new(),
            result: String::new(),
            pass,
            score_modifier,
            output: serde_json::Value::Null,
        }
    }

    #[test]
    fn grade_boundaries() {
        assert_eq!(grade_for(135), "A+");
        assert_eq!(grade_for(100), "A+");
        assert_eq!(grade_for(99), "A");
        assert_eq!(grade_for(85), "A-");
        assert_eq!(grade_for(25), "D-");
        assert_eq!(grade_for(24), "F");
        assert_eq!(grade_for(0), "F");
    }

    #[test]
    fn summary_counts_and_clamps() {
        let results = [result(true, 5), result(false, -20), result(false, -25)];
        let summary = summarize(&results);
        assert_eq!(summary.tests_quantity, 3);
        assert_eq!(summary.tests_passed, 1);
        assert_eq!(summary.tests_failed, 2);
        assert_eq!(summary.score, 60);
        assert_eq!(summary.grade, "C+");

        let awful = [result(false, -80), result(false, -50)];
        assert_eq!(summarize(&awful).score, 0);
    }

    #[test]
    fn empty_scan_is_perfect() {
        let summary = summarize(std::iter::empty());
        assert_eq!(summary.score, 100);
        assert_eq!(summary.grade, "A+");
    }
}
