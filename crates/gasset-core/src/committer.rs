use std::path::Path;

use gasset_store::RepositoryWriter;
use gasset_types::{ManifestId, ObjectId, Policy, PolicyTarget, SnapshotManifest, SourceInfo};
use tracing::{debug, info};

use crate::error::{GassetError, GassetResult};
use crate::selector::find_previous;

/// What happened to an uploaded snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Content matched the baseline and identical snapshots are ignored.
    Skipped { root: ObjectId },
    /// The manifest was saved; `expired` lists manifests removed by retention.
    Saved {
        id: ManifestId,
        expired: Vec<ManifestId>,
    },
}

impl Outcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Persist `manifest` unless it is identical to the baseline and the policy
/// says to ignore identical snapshots, then apply retention.
///
/// `previous` is the output of the selector: its first element, when
/// complete, is the baseline.
pub async fn commit<W: RepositoryWriter>(
    writer: &W,
    manifest: SnapshotManifest,
    policy: &Policy,
    previous: &[SnapshotManifest],
) -> GassetResult<Outcome> {
    let source = manifest.source.clone();
    let baseline = previous.first().filter(|m| m.is_complete());

    if policy.retention.ignore_identical() {
        if let Some(baseline) = baseline {
            if baseline.root_object() == manifest.root_object() {
                info!(
                    source = %source,
                    root = %manifest.root_object().short_hex(),
                    "not saving snapshot, identical to previous"
                );
                return Ok(Outcome::Skipped {
                    root: manifest.root_object(),
                });
            }
        }
    }

    let manifest = manifest.without_annotations();
    let id = writer
        .save_snapshot(&manifest)
        .await
        .map_err(|e| GassetError::Save {
            path: source.path.clone(),
            source: e,
        })?;
    debug!(id = %id, source = %source, "snapshot saved");

    let expired = writer
        .apply_retention(&source)
        .await
        .map_err(|e| GassetError::Retention {
            path: source.path.clone(),
            source: e,
        })?;
    Ok(Outcome::Saved { id, expired })
}

/// Snapshot one source directory: select previous manifests, look up the
/// effective policy, upload and commit.
pub async fn snapshot_source<W: RepositoryWriter>(
    writer: &W,
    source: &SourceInfo,
    path: &Path,
) -> GassetResult<Outcome> {
    let previous = find_previous(writer, source).await?;
    let tree = writer
        .policy_tree(source)
        .await
        .map_err(|e| GassetError::Policy {
            target: PolicyTarget::Source(source.clone()).to_string(),
            source: e,
        })?;
    let manifest = writer
        .upload(path, &tree, source, &previous)
        .await
        .map_err(|e| GassetError::Upload {
            path: path.to_path_buf(),
            source: e,
        })?;
    if !manifest.is_complete() {
        info!(source = %source, reason = %manifest.incomplete_reason, "snapshot is incomplete");
    }
    commit(writer, manifest, tree.effective_policy(), &previous).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use chrono::Utc;
    use gasset_store::{Backend, Repository};
    use gasset_types::RetentionPolicy;

    fn manifest(root: &[u8]) -> SnapshotManifest {
        SnapshotManifest::new(
            SourceInfo::new("h", "u", "/assets"),
            Utc::now(),
            ObjectId::from_bytes(root),
        )
    }

    fn ignoring_identical(ignore: bool) -> Policy {
        Policy {
            retention: RetentionPolicy {
                ignore_identical_snapshots: Some(ignore),
                ..Default::default()
            },
            ..Policy::default_baseline()
        }
    }

    #[tokio::test]
    async fn identical_root_is_skipped() {
        let backend = FakeBackend::initialized();
        let repo = backend.open_for_tests().await;
        let writer = repo.new_writer("t").await.unwrap();
        let baseline = manifest(b"same");

        let outcome = commit(&writer, manifest(b"same"), &ignoring_identical(true), &[baseline])
            .await
            .unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(!backend.calls().iter().any(|c| c == "save_snapshot"));
        assert!(!backend.calls().iter().any(|c| c == "apply_retention"));
    }

    #[tokio::test]
    async fn saves_then_applies_retention() {
        let backend = FakeBackend::initialized();
        let repo = backend.open_for_tests().await;
        let writer = repo.new_writer("t").await.unwrap();
        let baseline = manifest(b"same");

        let outcome = commit(
            &writer,
            manifest(b"same").with_description("nightly"),
            &ignoring_identical(false),
            &[baseline],
        )
        .await
        .unwrap();
        assert!(outcome.is_saved());

        let calls = backend.calls();
        let save = calls.iter().position(|c| c == "save_snapshot").unwrap();
        let retention = calls.iter().position(|c| c == "apply_retention").unwrap();
        assert!(save < retention);
        assert!(backend.saved()[0].description.is_empty());
    }

    #[tokio::test]
    async fn different_root_is_saved_even_when_ignoring_identical() {
        let backend = FakeBackend::initialized();
        let repo = backend.open_for_tests().await;
        let writer = repo.new_writer("t").await.unwrap();
        let outcome = commit(
            &writer,
            manifest(b"new"),
            &ignoring_identical(true),
            &[manifest(b"old")],
        )
        .await
        .unwrap();
        assert!(outcome.is_saved());
    }

    #[tokio::test]
    async fn incomplete_first_previous_is_not_a_baseline() {
        let backend = FakeBackend::initialized();
        let repo = backend.open_for_tests().await;
        let writer = repo.new_writer("t").await.unwrap();
        let previous = manifest(b"same").with_incomplete_reason("limit reached");
        let outcome = commit(&writer, manifest(b"same"), &ignoring_identical(true), &[previous])
            .await
            .unwrap();
        assert!(outcome.is_saved());
    }

    #[tokio::test]
    async fn save_failure_skips_retention() {
        let backend = FakeBackend::initialized().failing("save_snapshot");
        let repo = backend.open_for_tests().await;
        let writer = repo.new_writer("t").await.unwrap();
        let err = commit(&writer, manifest(b"x"), &ignoring_identical(false), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GassetError::Save { .. }));
        assert!(!backend.calls().iter().any(|c| c == "apply_retention"));
    }

    #[tokio::test]
    async fn retention_failure_is_reported() {
        let backend = FakeBackend::initialized().failing("apply_retention");
        let repo = backend.open_for_tests().await;
        let writer = repo.new_writer("t").await.unwrap();
        let err = commit(&writer, manifest(b"x"), &ignoring_identical(false), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, GassetError::Retention { .. }));
    }

    #[tokio::test]
    async fn snapshot_source_uploads_against_previous() {
        let backend = FakeBackend::initialized();
        let source = SourceInfo::new("h", "u", "/assets");
        backend.add_manifest(manifest(b"old"));
        let repo = backend.open(std::path::Path::new("conn"), "pw").await.unwrap();
        let writer = repo.new_writer("t").await.unwrap();
        let outcome = snapshot_source(&writer, &source, std::path::Path::new("/assets"))
            .await
            .unwrap();
        assert!(outcome.is_saved());
        let calls = backend.calls();
        let order: Vec<_> = ["list_snapshots", "policy_tree", "upload", "save_snapshot"]
            .iter()
            .map(|op| calls.iter().position(|c| c == op).unwrap())
            .collect();
        assert!(order.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(backend.upload_previous_counts(), vec![1]);
    }
}
