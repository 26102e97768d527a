//! The atomically published pipeline snapshot.
//!
//! A snapshot bundles everything a request needs to be evaluated
//! consistently: the compiled pattern set, the exemplar index, the
//! resolved policy table and a monotonically increasing version. A
//! request captures the current `Arc<Snapshot>` once at entry and holds
//! it for its whole lifetime; reload publishes a fresh snapshot without
//! ever mutating a live one, so readers cannot observe torn state.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use warden_contracts::PolicyTable;
use warden_screen::PatternSet;
use warden_semantic::{Embedder, ExemplarIndex, ExemplarSource, IndexBuilder};

use crate::{PolicyDocument, WardenError};

/// Immutable state one request evaluates against.
#[derive(Debug)]
pub struct Snapshot {
    /// Compiled pattern library (built-in plus policy extensions).
    pub patterns: PatternSet,
    /// Frozen exemplar index.
    pub index: ExemplarIndex,
    /// Resolved class policies.
    pub policy: PolicyTable,
    /// Tier flags from the policy document.
    pub semantic_enabled: bool,
    pub reason_enabled: bool,
    /// Monotonic version; participates in decision-cache keys.
    pub version: u64,
}

impl Snapshot {
    /// Content hash of the exemplar index (cache-key component).
    pub fn index_hash(&self) -> &str {
        self.index.content_hash()
    }
}

/// Builds a snapshot off-line from a parsed policy document.
///
/// Encoding the exemplars is the expensive part and runs against the
/// injected embedder under `deadline`; any failure aborts the build and
/// the caller keeps its previous snapshot.
pub async fn build_snapshot(
    document: &PolicyDocument,
    embedder: &dyn Embedder,
    version: u64,
    deadline: Instant,
) -> Result<Snapshot, WardenError> {
    let policy = document.policy_table();

    let mut patterns = PatternSet::builtin();
    patterns.extend_with(&document.patterns)?;

    let mut builder = IndexBuilder::new();
    for (class, text, builtin) in document.exemplars() {
        let embedding = embedder
            .embed(&text, deadline)
            .await
            .map_err(|e| WardenError::ExemplarEncoding(e.to_string()))?;
        let source = if builtin {
            ExemplarSource::Builtin
        } else {
            ExemplarSource::Policy
        };
        builder.add(class, text, embedding, source)?;
    }
    let index = builder.build(&policy);

    info!(
        version,
        patterns = patterns.len(),
        exemplars = index.len(),
        index_hash = &index.content_hash()[..8],
        "snapshot built"
    );

    Ok(Snapshot {
        patterns,
        index,
        policy,
        semantic_enabled: document.tiers.semantic,
        reason_enabled: document.tiers.reason,
        version,
    })
}

/// Publishes snapshots; readers load the current one with a single
/// cheap `Arc` clone.
pub struct SnapshotStore {
    current: RwLock<Arc<Snapshot>>,
    versions: AtomicU64,
}

impl SnapshotStore {
    pub fn new(initial: Snapshot) -> Self {
        let version = initial.version;
        Self {
            current: RwLock::new(Arc::new(initial)),
            versions: AtomicU64::new(version),
        }
    }

    /// The snapshot for one request. Hold the `Arc` for the whole
    /// request; do not re-load mid-flight.
    pub fn load(&self) -> Arc<Snapshot> {
        Arc::clone(&self.current.read())
    }

    /// Next version number for a snapshot being built.
    pub fn next_version(&self) -> u64 {
        self.versions.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Atomically replaces the published snapshot. In-flight requests
    /// keep the `Arc` they already captured.
    pub fn publish(&self, snapshot: Snapshot) {
        let mut slot = self.current.write();
        *slot = Arc::new(snapshot);
    }
}
