use ahash::AHashMap as HashMap;
use mesh_pod_sync_core::{ConduitPair, ConduitPairRx, Uid};
use std::collections::hash_map::Entry;
use tracing::debug;

/// Holds the conduit pair of each tracked pod.
///
/// The registry is the only owner of conduits, so a pair is closed exactly once: when it is
/// removed from the registry.
#[derive(Debug, Default)]
pub struct ConduitRegistry {
    by_uid: HashMap<Uid, ConduitPair>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConduitError {
    #[error("conduits for pod {0} are already open")]
    AlreadyOpen(Uid),
}

// === impl ConduitRegistry ===

impl ConduitRegistry {
    /// Registers a new conduit pair for the pod.
    ///
    /// Fails if the pod already has a pair. Pairs are only closed as they are unregistered.
    pub fn open(&mut self, uid: Uid) -> Result<ConduitPairRx, ConduitError> {
        match self.by_uid.entry(uid) {
            Entry::Occupied(entry) => Err(ConduitError::AlreadyOpen(entry.key().clone())),
            Entry::Vacant(entry) => {
                let pair = ConduitPair::new();
                let rx = pair.subscribe();
                debug!(uid = %entry.key(), "Opened conduits");
                entry.insert(pair);
                Ok(rx)
            }
        }
    }

    /// Closes and unregisters the pod's conduits, returning false if none were open.
    pub fn close(&mut self, uid: &Uid) -> bool {
        match self.by_uid.remove(uid) {
            Some(pair) => {
                let closed = pair.close();
                debug!(%uid, "Closed conduits");
                closed
            }
            None => false,
        }
    }

    pub fn subscribe(&self, uid: &Uid) -> Option<ConduitPairRx> {
        self.by_uid.get(uid).map(ConduitPair::subscribe)
    }

    pub fn is_open(&self, uid: &Uid) -> bool {
        self.by_uid
            .get(uid)
            .map(|pair| !pair.is_closed())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}
