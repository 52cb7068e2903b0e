//! Choice of the manifests an upload diffs against.

use gasset_store::RepositoryWriter;
use gasset_types::{SnapshotManifest, SourceInfo};
use tracing::debug;

use crate::error::{GassetError, GassetResult};

/// Pick the previous manifests for an incremental upload.
///
/// The baseline is the complete manifest with the latest start time; on a
/// tie the first one in `manifests` wins. The result is the baseline (if
/// any) followed by every incomplete manifest that started after it, in
/// input order. With no complete manifest, every incomplete one qualifies.
pub fn select_previous(manifests: &[SnapshotManifest]) -> Vec<SnapshotManifest> {
    let mut baseline: Option<&SnapshotManifest> = None;
    for manifest in manifests.iter().filter(|m| m.is_complete()) {
        if baseline.map_or(true, |b| manifest.start_time > b.start_time) {
            baseline = Some(manifest);
        }
    }

    let newer_than_baseline = |m: &&SnapshotManifest| {
        !m.is_complete() && baseline.map_or(true, |b| m.start_time > b.start_time)
    };
    baseline
        .into_iter()
        .chain(manifests.iter().filter(newer_than_baseline))
        .cloned()
        .collect()
}

/// [`select_previous`] over the input sorted by manifest id, so ties on
/// start time resolve the same way whatever order the backend listed them in.
pub fn select_previous_by_id(manifests: &[SnapshotManifest]) -> Vec<SnapshotManifest> {
    let mut sorted = manifests.to_vec();
    sorted.sort_by_key(|m| m.id);
    select_previous(&sorted)
}

/// List the manifests of `source` and select the previous ones.
pub async fn find_previous<W: RepositoryWriter>(
    writer: &W,
    source: &SourceInfo,
) -> GassetResult<Vec<SnapshotManifest>> {
    let manifests = writer
        .list_snapshots(source)
        .await
        .map_err(|e| GassetError::ManifestList {
            path: source.path.clone(),
            source: e,
        })?;
    let previous = select_previous(&manifests);
    debug!(
        source = %source,
        listed = manifests.len(),
        selected = previous.len(),
        "selected previous snapshots"
    );
    Ok(previous)
}
