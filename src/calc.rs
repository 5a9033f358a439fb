use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::store::{LogRow, StudentRow};

/// A step is a class bottleneck when its pooled median strictly exceeds this.
pub const BOTTLENECK_MEDIAN_SEC: f64 = 15.0;
/// A step is slow (class view) or an outlier (student view) when the mean
/// time exceeds the reference median by this factor.
pub const SLOW_STEP_FACTOR: f64 = 1.5;
/// Slow/outlier steps at or above this count flag the student.
pub const FLAG_SLOW_STEP_COUNT: usize = 3;
/// A student scoring more than this far below the class average is flagged.
pub const FLAG_SCORE_MARGIN: f64 = 5.0;

/// Lower median: sort ascending and pick index n/2. For even-length input
/// this is the upper of the two middle values, deliberately not their
/// average. Callers never pass an empty slice, but 0 is the safe answer.
pub fn lower_median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted[sorted.len() / 2]
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / (values.len() as f64)
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedStudent {
    pub srn: String,
    pub name: String,
    pub score: f64,
    pub avg_time: f64,
    pub flagged_for: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<String>,
    pub students_analyzed: usize,
    pub avg_score: f64,
    pub avg_total_time: f64,
    pub step_medians: BTreeMap<String, f64>,
    pub bottleneck_steps: Vec<String>,
    pub flagged_students: Vec<FlaggedStudent>,
}

impl ClassReport {
    /// Degraded-but-valid shape: an empty roster or an empty session/log set
    /// is a zero report with a human-readable reason, not a failure.
    pub fn degraded(message: &str, students_analyzed: usize) -> Self {
        Self {
            error: Some(message.to_string()),
            class: None,
            students_analyzed,
            avg_score: 0.0,
            avg_total_time: 0.0,
            step_medians: BTreeMap::new(),
            bottleneck_steps: Vec::new(),
            flagged_students: Vec::new(),
        }
    }
}

#[derive(Debug, Default)]
struct StudentAccum {
    sessions: usize,
    score: f64,
    time: f64,
    step_times: BTreeMap<String, Vec<f64>>,
}

pub fn class_report(
    semester: i64,
    section: &str,
    students: &[StudentRow],
    logs: &[LogRow],
) -> ClassReport {
    let roster: HashMap<&str, &StudentRow> =
        students.iter().map(|s| (s.srn.as_str(), s)).collect();

    let mut total_score = 0.0_f64;
    let mut total_time = 0.0_f64;
    let mut valid_sessions = 0_usize;
    let mut step_times: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut per_student: HashMap<&str, StudentAccum> = HashMap::new();

    for log in logs {
        let Some(result) = &log.result else {
            continue;
        };
        // Orphaned logs (srn absent from the roster) still raise the pooled
        // denominator but contribute no score, time, or step samples.
        valid_sessions += 1;
        if !roster.contains_key(log.srn.as_str()) {
            continue;
        }
        let acc = per_student.entry(log.srn.as_str()).or_default();
        acc.sessions += 1;
        acc.score += result.score;
        acc.time += result.total_time_sec;
        total_score += result.score;
        total_time += result.total_time_sec;
        for step in &result.steps {
            step_times
                .entry(step.name.clone())
                .or_default()
                .push(step.time);
            acc.step_times
                .entry(step.name.clone())
                .or_default()
                .push(step.time);
        }
    }

    let avg_score = if valid_sessions > 0 {
        total_score / (valid_sessions as f64)
    } else {
        0.0
    };
    let avg_total_time = if valid_sessions > 0 {
        total_time / (valid_sessions as f64)
    } else {
        0.0
    };

    let mut step_medians: BTreeMap<String, f64> = BTreeMap::new();
    let mut bottleneck_steps: Vec<String> = Vec::new();
    for (name, times) in &step_times {
        let median = lower_median(times);
        step_medians.insert(name.clone(), median);
        if median > BOTTLENECK_MEDIAN_SEC {
            bottleneck_steps.push(name.clone());
        }
    }

    // Roster order keeps the flagged list deterministic across reruns.
    let mut flagged_students: Vec<FlaggedStudent> = Vec::new();
    for s in students {
        let Some(acc) = per_student.get(s.srn.as_str()) else {
            continue;
        };
        let sessions = acc.sessions as f64;
        let student_avg_score = acc.score / sessions;
        let student_avg_time = acc.time / sessions;

        let mut slow_steps: Vec<&str> = Vec::new();
        for (name, times) in &acc.step_times {
            let class_median = step_medians.get(name).copied().unwrap_or(0.0);
            if mean(times) > class_median * SLOW_STEP_FACTOR {
                slow_steps.push(name);
            }
        }

        // Slow steps take priority over the low-score reason when both hold.
        // Names join in sorted step order (the accumulator is a BTreeMap),
        // not encounter order, so reruns emit an identical flagged_for string.
        let flagged_for = if slow_steps.len() >= FLAG_SLOW_STEP_COUNT {
            Some(format!("Slow Steps: {}", slow_steps.join(", ")))
        } else if student_avg_score < avg_score - FLAG_SCORE_MARGIN {
            Some("Low Score".to_string())
        } else {
            None
        };
        if let Some(flagged_for) = flagged_for {
            flagged_students.push(FlaggedStudent {
                srn: s.srn.clone(),
                name: s.name.clone(),
                score: student_avg_score,
                avg_time: student_avg_time,
                flagged_for,
            });
        }
    }

    ClassReport {
        error: None,
        class: Some(format!("{}{}", semester, section)),
        students_analyzed: students.len(),
        avg_score,
        avg_total_time,
        step_medians,
        bottleneck_steps,
        flagged_students,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StepSummary {
    pub avg_time: f64,
    pub is_outlier: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentReport {
    pub srn: String,
    pub name: String,
    pub total_sessions: usize,
    pub avg_score: f64,
    pub avg_total_time: f64,
    pub step_summary: BTreeMap<String, StepSummary>,
    pub flagged: bool,
    pub outlier_steps: Vec<String>,
}

impl StudentReport {
    pub fn empty(student: &StudentRow, total_sessions: usize) -> Self {
        Self {
            srn: student.srn.clone(),
            name: student.name.clone(),
            total_sessions,
            avg_score: 0.0,
            avg_total_time: 0.0,
            step_summary: BTreeMap::new(),
            flagged: false,
            outlier_steps: Vec::new(),
        }
    }
}

pub fn student_report(student: &StudentRow, logs: &[LogRow]) -> StudentReport {
    let mut total_score = 0.0_f64;
    let mut total_time = 0.0_f64;
    let mut valid_sessions = 0_usize;
    let mut step_times: BTreeMap<String, Vec<f64>> = BTreeMap::new();

    for log in logs {
        let Some(result) = &log.result else {
            continue;
        };
        valid_sessions += 1;
        total_score += result.score;
        total_time += result.total_time_sec;
        for step in &result.steps {
            step_times
                .entry(step.name.clone())
                .or_default()
                .push(step.time);
        }
    }

    let avg_score = if valid_sessions > 0 {
        total_score / (valid_sessions as f64)
    } else {
        0.0
    };
    let avg_total_time = if valid_sessions > 0 {
        total_time / (valid_sessions as f64)
    } else {
        0.0
    };

    let mut step_summary: BTreeMap<String, StepSummary> = BTreeMap::new();
    let mut outlier_steps: Vec<String> = Vec::new();
    for (name, times) in &step_times {
        let avg_time = mean(times);
        // Outlier test is against the student's own median, not the class's.
        let is_outlier = avg_time > lower_median(times) * SLOW_STEP_FACTOR;
        step_summary.insert(name.clone(), StepSummary { avg_time, is_outlier });
        if is_outlier {
            outlier_steps.push(name.clone());
        }
    }

    let flagged = outlier_steps.len() >= FLAG_SLOW_STEP_COUNT;
    StudentReport {
        srn: student.srn.clone(),
        name: student.name.clone(),
        total_sessions: valid_sessions,
        avg_score,
        avg_total_time,
        step_summary,
        flagged,
        outlier_steps,
    }
}
