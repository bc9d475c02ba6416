//! One-shot teardown signals for tracked pods.
//!
//! A [`Conduit`] starts `Open` and may only move to `Closed`. It carries no payload: an open
//! conduit means "configuration derived from this pod is still valid", and closing it is the
//! discovery layer's signal to tear down the corresponding subscription. Closing an already closed
//! conduit is a no-op.

use tokio::sync::watch;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConduitState {
    Open,
    Closed,
}

/// The owning side of a teardown signal.
#[derive(Debug)]
pub struct Conduit {
    tx: watch::Sender<ConduitState>,
}

/// A subscription to a [`Conduit`].
#[derive(Clone, Debug)]
pub struct ConduitRx {
    rx: watch::Receiver<ConduitState>,
}

/// A pod's conduits, one per discovery sub-protocol.
#[derive(Debug)]
pub struct ConduitPair {
    pub listeners: Conduit,
    pub clusters: Conduit,
}

#[derive(Clone, Debug)]
pub struct ConduitPairRx {
    pub listeners: ConduitRx,
    pub clusters: ConduitRx,
}

// === impl Conduit ===

impl Default for Conduit {
    fn default() -> Self {
        Self::new()
    }
}

impl Conduit {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(ConduitState::Open);
        Self { tx }
    }

    pub fn state(&self) -> ConduitState {
        *self.tx.borrow()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConduitState::Closed
    }

    pub fn subscribe(&self) -> ConduitRx {
        ConduitRx {
            rx: self.tx.subscribe(),
        }
    }

    /// Closes the conduit, returning `false` if it was already closed.
    pub fn close(&self) -> bool {
        self.tx.send_if_modified(|state| match state {
            ConduitState::Open => {
                *state = ConduitState::Closed;
                true
            }
            ConduitState::Closed => false,
        })
    }
}

// === impl ConduitRx ===

impl ConduitRx {
    pub fn is_closed(&self) -> bool {
        *self.rx.borrow() == ConduitState::Closed || self.rx.has_changed().is_err()
    }

    /// Completes once the conduit is closed.
    ///
    /// A conduit that is dropped without being closed is treated as closed.
    pub async fn closed(&mut self) {
        let _ = self
            .rx
            .wait_for(|state| *state == ConduitState::Closed)
            .await;
    }
}

// === impl ConduitPair ===

impl Default for ConduitPair {
    fn default() -> Self {
        Self::new()
    }
}

impl ConduitPair {
    pub fn new() -> Self {
        Self {
            listeners: Conduit::new(),
            clusters: Conduit::new(),
        }
    }

    pub fn subscribe(&self) -> ConduitPairRx {
        ConduitPairRx {
            listeners: self.listeners.subscribe(),
            clusters: self.clusters.subscribe(),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.listeners.is_closed() && self.clusters.is_closed()
    }

    /// Closes both conduits, returning `false` if neither was open.
    pub fn close(&self) -> bool {
        let listeners = self.listeners.close();
        let clusters = self.clusters.close();
        listeners || clusters
    }
}

// === impl ConduitPairRx ===

impl ConduitPairRx {
    pub fn is_closed(&self) -> bool {
        self.listeners.is_closed() && self.clusters.is_closed()
    }
}
