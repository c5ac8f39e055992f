use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::signals::Signal;
use crate::wire_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketType {
    Poach,
    Scale,
    SkillsShift,
    Expansion,
    FundingBoost,
}

wire_enum!(BucketType, "bucket type", {
    Poach => "POACH",
    Scale => "SCALE",
    SkillsShift => "SKILLS_SHIFT",
    Expansion => "EXPANSION",
    FundingBoost => "FUNDING_BOOST",
});

/// Target titles and seniority the workflow looks for when a bucket fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdealProfile {
    pub titles: &'static [&'static str],
    pub min_years_experience: u32,
}

impl BucketType {
    pub const ALL: [BucketType; 5] = [
        BucketType::Poach,
        BucketType::Scale,
        BucketType::SkillsShift,
        BucketType::Expansion,
        BucketType::FundingBoost,
    ];

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            BucketType::Poach => "The Poach",
            BucketType::Scale => "The Scale",
            BucketType::SkillsShift => "The Skills Shift",
            BucketType::Expansion => "The Expansion",
            BucketType::FundingBoost => "The Funding Boost",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            BucketType::Poach => "Companies going through a merger or restructuring",
            BucketType::Scale => "Companies hiring senior leadership",
            BucketType::SkillsShift => "Companies moving to a new technology stack",
            BucketType::Expansion => "Companies entering a new market",
            BucketType::FundingBoost => "Companies that recently raised capital",
        }
    }

    /// Higher sorts first.
    #[must_use]
    pub fn priority(self) -> i32 {
        match self {
            BucketType::FundingBoost => 5,
            BucketType::Scale => 4,
            BucketType::Expansion => 3,
            BucketType::SkillsShift => 2,
            BucketType::Poach => 1,
        }
    }

    /// Buckets without a dedicated profile reuse the `SCALE` one.
    #[must_use]
    pub fn ideal_profile(self) -> IdealProfile {
        match self {
            BucketType::FundingBoost => IdealProfile {
                titles: &["Head of Engineering", "CTO", "VP Engineering"],
                min_years_experience: 10,
            },
            BucketType::Expansion => IdealProfile {
                titles: &["Country Manager", "Regional Director", "Head of Operations"],
                min_years_experience: 7,
            },
            BucketType::Scale | BucketType::Poach | BucketType::SkillsShift => IdealProfile {
                titles: &["Senior Engineer", "Lead Engineer", "Engineering Manager"],
                min_years_experience: 5,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionBucket {
    pub id: i64,
    pub bucket_type: BucketType,
    pub name: String,
    pub description: Option<String>,
    pub priority: i32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketAssignment {
    pub id: i64,
    pub bucket_id: i64,
    pub signal_id: i64,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignedSignal {
    pub signal: Signal,
    pub confidence: f64,
}

/// A bucket together with every signal assigned to it, highest confidence first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketWithSignals {
    pub bucket: ActionBucket,
    pub signals: Vec<AssignedSignal>,
}

impl BucketWithSignals {
    #[must_use]
    pub fn primary_signal(&self) -> Option<&AssignedSignal> {
        self.signals
            .iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub id: i64,
    pub bucket_id: i64,
    pub signal_id: Option<i64>,
    pub full_name: String,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub linkedin_url: Option<String>,
    pub skills: Vec<String>,
    pub tenure_months: Option<i32>,
    pub likelihood_to_move: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewCandidateProfile {
    pub bucket_id: i64,
    pub signal_id: Option<i64>,
    pub full_name: String,
    pub current_title: Option<String>,
    pub current_company: Option<String>,
    pub linkedin_url: Option<String>,
    pub skills: Vec<String>,
    pub tenure_months: Option<i32>,
    pub likelihood_to_move: f64,
}
