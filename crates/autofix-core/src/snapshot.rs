//! Immutable source snapshots and the per-session version chain.

use std::sync::Arc;

/// One immutable version of the full source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    version: u64,
    source: Arc<str>,
}

impl Snapshot {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn line_count(&self) -> usize {
        self.source.lines().count()
    }
}

/// Append-only arena of snapshots owned by a single repair session.
///
/// Version `0` is always the original input. Every accepted fix pushes a new
/// snapshot whose version is exactly one greater than the previous head, so any
/// two consecutive versions can be diffed to recover what a fix changed.
#[derive(Debug, Clone)]
pub struct SnapshotChain {
    snapshots: Vec<Snapshot>,
}

impl SnapshotChain {
    pub fn new(original: impl Into<Arc<str>>) -> Self {
        Self {
            snapshots: vec![Snapshot {
                version: 0,
                source: original.into(),
            }],
        }
    }

    pub fn original(&self) -> &Snapshot {
        &self.snapshots[0]
    }

    pub fn current(&self) -> &Snapshot {
        // The chain is never empty: `new` seeds version 0 and nothing removes entries.
        &self.snapshots[self.snapshots.len() - 1]
    }

    pub fn get(&self, version: u64) -> Option<&Snapshot> {
        usize::try_from(version)
            .ok()
            .and_then(|idx| self.snapshots.get(idx))
    }

    /// Number of accepted fixes applied on top of the original.
    pub fn accepted(&self) -> usize {
        self.snapshots.len() - 1
    }

    /// Push a new head. Returns the previous head alongside the new one.
    pub fn advance(&mut self, source: impl Into<Arc<str>>) -> (&Snapshot, &Snapshot) {
        let version = self.current().version + 1;
        self.snapshots.push(Snapshot {
            version,
            source: source.into(),
        });
        let len = self.snapshots.len();
        (&self.snapshots[len - 2], &self.snapshots[len - 1])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Snapshot> {
        self.snapshots.iter()
    }
}
