//! Snapshot policies.
//!
//! A [`Policy`] is a sparse set of settings: every field is optional so a
//! source-level policy only has to name what it overrides. The effective
//! settings for one source are computed by layering the source policy over
//! the global policy over [`Policy::default_baseline`], giving a
//! [`PolicyTree`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::source::SourceInfo;

/// Where a policy is attached.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PolicyTarget {
    Global,
    Source(SourceInfo),
}

impl PolicyTarget {
    pub fn storage_key(&self) -> String {
        match self {
            Self::Global => "global".into(),
            Self::Source(source) => format!("source-{}", source.storage_key()),
        }
    }
}

impl fmt::Display for PolicyTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "(global)"),
            Self::Source(source) => write!(f, "{source}"),
        }
    }
}

/// How many snapshots of each age bucket to keep. All counts unset or zero
/// means retention is disabled and nothing is ever pruned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_latest: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_hourly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_daily: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_weekly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_monthly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_annual: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_identical_snapshots: Option<bool>,
}

impl RetentionPolicy {
    pub fn is_disabled(&self) -> bool {
        [
            self.keep_latest,
            self.keep_hourly,
            self.keep_daily,
            self.keep_weekly,
            self.keep_monthly,
            self.keep_annual,
        ]
        .iter()
        .all(|count| count.unwrap_or(0) == 0)
    }

    pub fn ignore_identical(&self) -> bool {
        self.ignore_identical_snapshots.unwrap_or(false)
    }

    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            keep_latest: self.keep_latest.or(parent.keep_latest),
            keep_hourly: self.keep_hourly.or(parent.keep_hourly),
            keep_daily: self.keep_daily.or(parent.keep_daily),
            keep_weekly: self.keep_weekly.or(parent.keep_weekly),
            keep_monthly: self.keep_monthly.or(parent.keep_monthly),
            keep_annual: self.keep_annual.or(parent.keep_annual),
            ignore_identical_snapshots: self
                .ignore_identical_snapshots
                .or(parent.ignore_identical_snapshots),
        }
    }
}

/// Which files of a source are considered.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilesPolicy {
    /// Gitignore-style patterns, relative to the source root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub one_file_system: Option<bool>,
}

impl FilesPolicy {
    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            ignore: self.ignore.clone().or_else(|| parent.ignore.clone()),
            one_file_system: self.one_file_system.or(parent.one_file_system),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorHandlingPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_file_errors: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_directory_errors: Option<bool>,
}

impl ErrorHandlingPolicy {
    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            ignore_file_errors: self.ignore_file_errors.or(parent.ignore_file_errors),
            ignore_directory_errors: self
                .ignore_directory_errors
                .or(parent.ignore_directory_errors),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manual: Option<bool>,
}

impl SchedulingPolicy {
    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            interval_seconds: self.interval_seconds.or(parent.interval_seconds),
            manual: self.manual.or(parent.manual),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compressor {
    #[default]
    None,
    Zstd,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressionPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressor: Option<Compressor>,
    /// Files smaller than this are stored uncompressed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u64>,
}

impl CompressionPolicy {
    pub fn compressor(&self) -> Compressor {
        self.compressor.unwrap_or_default()
    }

    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            compressor: self.compressor.or(parent.compressor),
            min_size: self.min_size.or(parent.min_size),
        }
    }
}

/// Verbosity of per-entry logging during upload.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogDetail {
    None,
    #[default]
    Normal,
    Verbose,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<LogDetail>,
}

impl LoggingPolicy {
    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            entries: self.entries.or(parent.entries),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPolicy {
    /// Stop after this many bytes of new content and record the snapshot as
    /// incomplete. Unset or zero means unlimited.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<u64>,
}

impl UploadPolicy {
    pub fn upload_limit(&self) -> Option<u64> {
        self.max_upload_bytes.filter(|&limit| limit > 0)
    }

    fn merged_over(&self, parent: &Self) -> Self {
        Self {
            max_upload_bytes: self.max_upload_bytes.or(parent.max_upload_bytes),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub retention: RetentionPolicy,
    #[serde(default)]
    pub files: FilesPolicy,
    #[serde(default)]
    pub error_handling: ErrorHandlingPolicy,
    #[serde(default)]
    pub scheduling: SchedulingPolicy,
    #[serde(default)]
    pub compression: CompressionPolicy,
    #[serde(default)]
    pub logging: LoggingPolicy,
    #[serde(default)]
    pub upload: UploadPolicy,
}

impl Policy {
    /// Policy written to the global target when a repository is created.
    ///
    /// Retention is disabled: no keep counts are set, so snapshots are never
    /// pruned until the user configures retention explicitly.
    pub fn default_baseline() -> Self {
        Self {
            retention: RetentionPolicy {
                ignore_identical_snapshots: Some(false),
                ..RetentionPolicy::default()
            },
            files: FilesPolicy {
                ignore: Some(Vec::new()),
                one_file_system: Some(false),
            },
            error_handling: ErrorHandlingPolicy {
                ignore_file_errors: Some(false),
                ignore_directory_errors: Some(false),
            },
            scheduling: SchedulingPolicy {
                interval_seconds: None,
                manual: Some(true),
            },
            compression: CompressionPolicy {
                compressor: Some(Compressor::None),
                min_size: None,
            },
            logging: LoggingPolicy {
                entries: Some(LogDetail::Normal),
            },
            upload: UploadPolicy {
                max_upload_bytes: Some(0),
            },
        }
    }

    /// Layer `self` over `parent`: every field set in `self` wins.
    pub fn merged_over(&self, parent: &Policy) -> Policy {
        Policy {
            retention: self.retention.merged_over(&parent.retention),
            files: self.files.merged_over(&parent.files),
            error_handling: self.error_handling.merged_over(&parent.error_handling),
            scheduling: self.scheduling.merged_over(&parent.scheduling),
            compression: self.compression.merged_over(&parent.compression),
            logging: self.logging.merged_over(&parent.logging),
            upload: self.upload.merged_over(&parent.upload),
        }
    }
}

/// Effective policy for one source, together with the policy defined
/// directly on that source (if any).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyTree {
    effective: Policy,
    defined: Option<Policy>,
}

impl PolicyTree {
    pub fn build(global: Option<&Policy>, source: Option<&Policy>) -> Self {
        let baseline = Policy::default_baseline();
        let with_global = match global {
            Some(global) => global.merged_over(&baseline),
            None => baseline,
        };
        let effective = match source {
            Some(source) => source.merged_over(&with_global),
            None => with_global,
        };
        Self {
            effective,
            defined: source.cloned(),
        }
    }

    /// A tree whose effective policy is exactly `policy`.
    pub fn from_effective(policy: Policy) -> Self {
        Self {
            effective: policy,
            defined: None,
        }
    }

    pub fn effective_policy(&self) -> &Policy {
        &self.effective
    }

    pub fn defined_policy(&self) -> Option<&Policy> {
        self.defined.as_ref()
    }
}
