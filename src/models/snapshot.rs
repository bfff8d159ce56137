use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProgramType;

/// Provenance tag stored on every snapshot written by the sync engine.
pub const SNAPSHOT_SOURCE: &str = "remote_sync";

// ═══════════════════════════════════════════════════════════
// Time buckets
// ═══════════════════════════════════════════════════════════

/// Named minute ranges. Ranges overlap on purpose: a 45-minute patient is
/// counted in both `Mins20Plus` and `Mins40Plus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    Mins1To9,
    Mins10To19,
    Mins20To39,
    Mins20Plus,
    Mins40To59,
    Mins40Plus,
    Mins60Plus,
}

impl TimeBucket {
    pub fn contains(&self, minutes: u32) -> bool {
        match self {
            Self::Mins1To9 => (1..=9).contains(&minutes),
            Self::Mins10To19 => (10..=19).contains(&minutes),
            Self::Mins20To39 => (20..=39).contains(&minutes),
            Self::Mins20Plus => minutes >= 20,
            Self::Mins40To59 => (40..=59).contains(&minutes),
            Self::Mins40Plus => minutes >= 40,
            Self::Mins60Plus => minutes >= 60,
        }
    }

    /// Buckets reported for a program. Programs billed in 20-minute
    /// increments get cumulative thresholds, primary-care style programs
    /// get the banded ranges.
    pub fn for_program(program: ProgramType) -> &'static [TimeBucket] {
        use TimeBucket::*;
        match program {
            ProgramType::Ccm | ProgramType::Cccm | ProgramType::Cco => {
                &[Mins1To9, Mins10To19, Mins20Plus, Mins40Plus, Mins60Plus]
            }
            ProgramType::Pcm | ProgramType::Apcm => {
                &[Mins1To9, Mins10To19, Mins20To39, Mins20Plus, Mins40To59, Mins40Plus, Mins60Plus]
            }
            ProgramType::Rpm | ProgramType::Rtm => &[Mins1To9, Mins10To19, Mins20Plus, Mins40Plus],
            ProgramType::Bhi => &[Mins1To9, Mins10To19, Mins20Plus],
            ProgramType::Awv => &[],
        }
    }
}

/// Per-bucket patient counts for one practice × program × month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBucketCounts {
    /// Enrolled patients without any recorded minutes.
    pub mins0: u32,
    pub mins1_9: u32,
    pub mins10_19: u32,
    pub mins20_39: u32,
    pub mins20_plus: u32,
    pub mins40_59: u32,
    pub mins40_plus: u32,
    pub mins60_plus: u32,
}

impl TimeBucketCounts {
    pub fn increment(&mut self, bucket: TimeBucket) {
        let slot = match bucket {
            TimeBucket::Mins1To9 => &mut self.mins1_9,
            TimeBucket::Mins10To19 => &mut self.mins10_19,
            TimeBucket::Mins20To39 => &mut self.mins20_39,
            TimeBucket::Mins20Plus => &mut self.mins20_plus,
            TimeBucket::Mins40To59 => &mut self.mins40_59,
            TimeBucket::Mins40Plus => &mut self.mins40_plus,
            TimeBucket::Mins60Plus => &mut self.mins60_plus,
        };
        *slot += 1;
    }
}

// ═══════════════════════════════════════════════════════════
// Snapshot row
// ═══════════════════════════════════════════════════════════

/// Monthly metrics for one practice's one program. At most one row exists
/// per (practice, program, month, year).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramSnapshot {
    pub practice_id: Uuid,
    pub program: ProgramType,
    pub month: u32,
    pub year: i32,
    pub patients_enrolled: u32,
    pub inactive_count: u32,
    pub not_enrolled_count: u32,
    pub buckets: TimeBucketCounts,
    pub source: String,
    pub synced_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forty_five_minutes_hits_overlapping_buckets() {
        assert!(TimeBucket::Mins20Plus.contains(45));
        assert!(TimeBucket::Mins40Plus.contains(45));
        assert!(TimeBucket::Mins40To59.contains(45));
        assert!(!TimeBucket::Mins1To9.contains(45));
        assert!(!TimeBucket::Mins20To39.contains(45));
        assert!(!TimeBucket::Mins60Plus.contains(45));
    }

    #[test]
    fn zero_minutes_is_in_no_bucket() {
        for program in ProgramType::all() {
            for bucket in TimeBucket::for_program(*program) {
                assert!(!bucket.contains(0), "{bucket:?} should not contain 0");
            }
        }
    }

    #[test]
    fn band_edges_are_inclusive() {
        assert!(TimeBucket::Mins1To9.contains(1));
        assert!(TimeBucket::Mins1To9.contains(9));
        assert!(TimeBucket::Mins10To19.contains(10));
        assert!(TimeBucket::Mins10To19.contains(19));
        assert!(TimeBucket::Mins20Plus.contains(20));
        assert!(!TimeBucket::Mins20To39.contains(40));
    }

    #[test]
    fn increment_targets_matching_field() {
        let mut counts = TimeBucketCounts::default();
        counts.increment(TimeBucket::Mins40Plus);
        counts.increment(TimeBucket::Mins40Plus);
        counts.increment(TimeBucket::Mins1To9);
        assert_eq!(counts.mins40_plus, 2);
        assert_eq!(counts.mins1_9, 1);
        assert_eq!(counts.mins0, 0);
    }

    #[test]
    fn awv_reports_no_minute_buckets() {
        assert!(TimeBucket::for_program(ProgramType::Awv).is_empty());
        assert!(TimeBucket::for_program(ProgramType::Ccm).contains(&TimeBucket::Mins60Plus));
    }
}
