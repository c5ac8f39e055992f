//! Domain types and configuration shared by every `signalhub` crate.

mod app_config;
pub mod buckets;
mod config;
pub mod icp;
pub mod partners;
pub mod signals;

use thiserror::Error;

pub use app_config::{AppConfig, Environment};
pub use buckets::{
    ActionBucket, AssignedSignal, BucketAssignment, BucketType, BucketWithSignals,
    CandidateProfile, IdealProfile, NewCandidateProfile,
};
pub use config::{build_app_config, load_app_config, load_app_config_from_env};
pub use icp::{load_icp_config, IcpConfig};
pub use partners::{
    Application, ApplicationStatus, ConflictStrategy, IntegrationStatus, NewApplication,
    NewSyncLog, PartnerCredentials, PartnerIntegration, PartnerJobPosting, PartnerJobStatus,
    PartnerKind, SyncLog, SyncStatus, SyncType,
};
pub use signals::{
    Enrichment, FundingFilters, IngestFilters, NaturalKey, NewSignal, RawFundingEvent,
    RawPosting, Signal, SignalType,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("failed to read ICP config at {path}: {source}")]
    IcpFileIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse ICP config at {path}: {source}")]
    IcpFileParse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum using
/// the listed wire names. Parsing is case-insensitive.
macro_rules! wire_enum {
    ($ty:ident, $kind:literal, { $($variant:ident => $wire:literal),+ $(,)? }) => {
        impl $ty {
            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $wire,)+
                }
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $ty {
            type Err = $crate::CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $(
                    if s.eq_ignore_ascii_case($wire) {
                        return Ok($ty::$variant);
                    }
                )+
                Err($crate::CoreError::UnknownVariant {
                    kind: $kind,
                    value: s.to_string(),
                })
            }
        }
    };
}

pub(crate) use wire_enum;
