use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Binary pass/fail classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Normal,
    Defective,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Verdict::Normal => "normal",
            Verdict::Defective => "defective",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Verdict::Normal),
            "defective" => Some(Verdict::Defective),
            _ => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One completed orchestration pass. Immutable after creation; appended to
/// history. Failed passes produce no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub date: String,
    pub time: String,
    pub verdict: Verdict,
    pub duration_seconds: f64,
    pub frames_captured: usize,
}

impl ProcessingRun {
    pub fn new(
        started_at: DateTime<Local>,
        verdict: Verdict,
        duration: Duration,
        frames_captured: usize,
    ) -> Self {
        Self {
            date: started_at.format("%Y-%m-%d").to_string(),
            time: started_at.format("%H:%M:%S").to_string(),
            verdict,
            duration_seconds: duration.as_secs_f64(),
            frames_captured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verdict_round_trip() {
        for verdict in [Verdict::Normal, Verdict::Defective] {
            assert_eq!(Verdict::parse(verdict.as_str()), Some(verdict));
        }
        assert_eq!(Verdict::parse("unknown"), None);
    }

    #[test]
    fn test_processing_run_formats_start_instant() {
        let started_at = Local::now();
        let run = ProcessingRun::new(
            started_at,
            Verdict::Defective,
            Duration::from_millis(42_500),
            4,
        );
        assert_eq!(run.date, started_at.format("%Y-%m-%d").to_string());
        assert_eq!(run.time, started_at.format("%H:%M:%S").to_string());
        assert!((run.duration_seconds - 42.5).abs() < 1e-9);
        assert_eq!(run.frames_captured, 4);
    }
}
