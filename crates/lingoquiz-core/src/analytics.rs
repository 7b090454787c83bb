//! Read-only statistics over one or many aggregate results.
//!
//! All derivations are pure and order-stable (`BTreeMap` keys, sums in input
//! order) so that repeated runs over the same inputs produce identical output.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::model::{Difficulty, QuestionType};
use crate::scoring::{AggregateResult, Evaluation};

/// Percentage-point band within which consecutive attempts count as stable.
pub const TREND_DEAD_BAND: f64 = 5.0;

/// Correct answers over graded answers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accuracy {
    pub correct: usize,
    pub total: usize,
}

impl Accuracy {
    /// Fraction correct in `0.0..=1.0`; zero when nothing was graded.
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn record(&mut self, evaluation: &Evaluation) {
        self.total += 1;
        if evaluation.is_correct {
            self.correct += 1;
        }
    }
}

fn graded_evaluations(results: &[AggregateResult]) -> impl Iterator<Item = &Evaluation> {
    results
        .iter()
        .flat_map(|r| r.per_question_evaluations.iter())
        .filter(|e| !e.is_pending())
}

/// Accuracy per question type. Evaluations awaiting a teacher grade are excluded.
pub fn accuracy_by_type(results: &[AggregateResult]) -> BTreeMap<QuestionType, Accuracy> {
    let mut map: BTreeMap<QuestionType, Accuracy> = BTreeMap::new();
    for evaluation in graded_evaluations(results) {
        map.entry(evaluation.question_type).or_default().record(evaluation);
    }
    map
}

/// Accuracy per difficulty, over questions that carry difficulty metadata.
pub fn accuracy_by_difficulty(results: &[AggregateResult]) -> BTreeMap<Difficulty, Accuracy> {
    let mut map: BTreeMap<Difficulty, Accuracy> = BTreeMap::new();
    for evaluation in graded_evaluations(results) {
        if let Some(difficulty) = evaluation.difficulty {
            map.entry(difficulty).or_default().record(evaluation);
        }
    }
    map
}

/// Direction of change between two consecutive attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Classify a change in percentage. Differences within ±[`TREND_DEAD_BAND`] are stable.
pub fn classify_change(previous: f64, current: f64) -> Trend {
    let delta = current - previous;
    if delta > TREND_DEAD_BAND {
        Trend::Improving
    } else if delta < -TREND_DEAD_BAND {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

/// One step of a student's grade history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendStep {
    pub previous_percentage: f64,
    pub current_percentage: f64,
    pub delta: f64,
    pub trend: Trend,
}

/// Trend between each pair of consecutive attempts, oldest first.
pub fn grade_trend(history: &[AggregateResult]) -> Vec<TrendStep> {
    history
        .windows(2)
        .map(|pair| {
            let (previous, current) = (pair[0].percentage, pair[1].percentage);
            TrendStep {
                previous_percentage: previous,
                current_percentage: current,
                delta: current - previous,
                trend: classify_change(previous, current),
            }
        })
        .collect()
}

/// Current and longest run of consecutive passed attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub current: usize,
    pub longest: usize,
}

/// Pass streaks over a history ordered oldest first.
pub fn pass_streak(history: &[AggregateResult]) -> Streak {
    let mut streak = Streak::default();
    for result in history {
        if result.is_passed {
            streak.current += 1;
            streak.longest = streak.longest.max(streak.current);
        } else {
            streak.current = 0;
        }
    }
    streak
}

/// Mid-rank percentile of `percentage` within a class: the share of results
/// below it plus half the share equal to it, scaled to 0..=100.
pub fn percentile_rank(percentage: f64, class: &[AggregateResult]) -> f64 {
    if class.is_empty() {
        return 0.0;
    }
    let below = class.iter().filter(|r| r.percentage < percentage).count() as f64;
    let equal = class.iter().filter(|r| r.percentage == percentage).count() as f64;
    100.0 * (below + 0.5 * equal) / class.len() as f64
}

/// Competition rank (1 = best): one plus the number of strictly better results.
pub fn rank(percentage: f64, class: &[AggregateResult]) -> usize {
    1 + class.iter().filter(|r| r.percentage > percentage).count()
}

/// Descriptive statistics for a class's results on one quiz.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub count: usize,
    pub mean_percentage: f64,
    pub median_percentage: f64,
    pub min_percentage: f64,
    pub max_percentage: f64,
    /// Fraction of results that passed, `0.0..=1.0`.
    pub pass_rate: f64,
}

/// Summarize a class's results. `None` for an empty class.
pub fn class_summary(class: &[AggregateResult]) -> Option<ClassSummary> {
    if class.is_empty() {
        return None;
    }

    let mut sorted: Vec<f64> = class.iter().map(|r| r.percentage).collect();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    let median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    let mean = class.iter().map(|r| r.percentage).sum::<f64>() / n as f64;
    let passed = class.iter().filter(|r| r.is_passed).count();

    Some(ClassSummary {
        count: n,
        mean_percentage: mean,
        median_percentage: median,
        min_percentage: sorted[0],
        max_percentage: sorted[n - 1],
        pass_rate: passed as f64 / n as f64,
    })
}
