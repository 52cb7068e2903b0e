//! Retention: which manifests of one source have outlived their policy.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use gasset_types::{ManifestId, RetentionPolicy, SnapshotManifest};

type BucketFn = fn(&DateTime<Utc>) -> String;

/// Ids of the manifests that `policy` no longer keeps.
///
/// Complete manifests are kept if they are among the `keep_latest` newest,
/// or the newest of one of the first N hourly/daily/weekly/monthly/annual
/// buckets. Incomplete manifests are kept only while they are newer than
/// the newest complete manifest. The newest complete manifest is never
/// expired. A policy with no non-zero counts keeps everything.
pub fn expired_manifests(
    manifests: &[SnapshotManifest],
    policy: &RetentionPolicy,
) -> Vec<ManifestId> {
    if policy.is_disabled() {
        return Vec::new();
    }

    let mut complete: Vec<&SnapshotManifest> =
        manifests.iter().filter(|m| m.is_complete()).collect();
    complete.sort_by(|a, b| b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id)));

    let mut keep: HashSet<ManifestId> = complete.first().map(|m| m.id).into_iter().collect();
    if let Some(n) = policy.keep_latest {
        keep.extend(complete.iter().take(n as usize).map(|m| m.id));
    }

    let buckets: [(Option<u32>, BucketFn); 5] = [
        (policy.keep_hourly, |t| t.format("%Y-%m-%d %H").to_string()),
        (policy.keep_daily, |t| t.format("%Y-%m-%d").to_string()),
        (policy.keep_weekly, |t| t.format("%G-W%V").to_string()),
        (policy.keep_monthly, |t| t.format("%Y-%m").to_string()),
        (policy.keep_annual, |t| t.format("%Y").to_string()),
    ];
    for (count, bucket_of) in buckets {
        let Some(count) = count else { continue };
        let mut seen: Vec<String> = Vec::new();
        for manifest in &complete {
            if seen.len() >= count as usize {
                break;
            }
            let bucket = bucket_of(&manifest.start_time);
            if !seen.contains(&bucket) {
                seen.push(bucket);
                keep.insert(manifest.id);
            }
        }
    }

    let newest_complete = complete.first().map(|m| m.start_time);
    manifests
        .iter()
        .filter(|m| {
            if m.is_complete() {
                !keep.contains(&m.id)
            } else {
                newest_complete.is_some_and(|newest| m.start_time <= newest)
            }
        })
        .map(|m| m.id)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use gasset_types::{ObjectId, SourceInfo};

    fn at(hours: i64) -> SnapshotManifest {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        SnapshotManifest::new(
            SourceInfo::new("h", "u", "/src"),
            base + Duration::hours(hours),
            ObjectId::from_bytes(&hours.to_le_bytes()),
        )
    }

    #[test]
    fn disabled_policy_keeps_everything() {
        let manifests = vec![at(0), at(1), at(2).with_incomplete_reason("x")];
        assert!(expired_manifests(&manifests, &RetentionPolicy::default()).is_empty());
    }

    #[test]
    fn keep_latest_expires_older() {
        let manifests = vec![at(0), at(5), at(3), at(1)];
        let policy = RetentionPolicy {
            keep_latest: Some(2),
            ..Default::default()
        };
        let expired = expired_manifests(&manifests, &policy);
        assert_eq!(expired, vec![manifests[0].id, manifests[3].id]);
    }

    #[test]
    fn daily_keeps_newest_per_day() {
        // Two on day one, one on day two.
        let manifests = vec![at(1), at(2), at(30)];
        let policy = RetentionPolicy {
            keep_daily: Some(2),
            ..Default::default()
        };
        let expired = expired_manifests(&manifests, &policy);
        assert_eq!(expired, vec![manifests[0].id]);
    }

    #[test]
    fn stale_incomplete_is_expired_fresh_one_kept() {
        let manifests = vec![
            at(0).with_incomplete_reason("limit reached"),
            at(2),
            at(3).with_incomplete_reason("limit reached"),
        ];
        let policy = RetentionPolicy {
            keep_latest: Some(5),
            ..Default::default()
        };
        let expired = expired_manifests(&manifests, &policy);
        assert_eq!(expired, vec![manifests[0].id]);
    }

    #[test]
    fn zero_keep_latest_keeps_everything() {
        let manifests = vec![at(0), at(1)];
        let policy = RetentionPolicy {
            keep_latest: Some(0),
            ..Default::default()
        };
        assert!(expired_manifests(&manifests, &policy).is_empty());
    }

    #[test]
    fn newest_complete_survives_a_zero_count_next_to_a_real_one() {
        let manifests = vec![at(0), at(30), at(60)];
        let policy = RetentionPolicy {
            keep_latest: Some(0),
            keep_monthly: Some(1),
            ..Default::default()
        };
        let expired = expired_manifests(&manifests, &policy);
        assert_eq!(expired, vec![manifests[0].id, manifests[1].id]);
    }
}
