use std::{collections::BTreeMap, fmt};

pub type Labels = BTreeMap<String, String>;

/// A pod's stable, cluster-unique identity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uid(String);

/// Names a pod by namespace and name, as reconcile triggers do.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

/// The last observed state of a synchronized pod.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrackedPod {
    pub uid: Uid,

    /// Only used for diagnostics and to resolve triggers for pods that no longer exist.
    pub reference: PodRef,

    pub phase: Option<String>,

    /// The pod's IP, if one has been assigned. Never empty.
    pub pod_ip: Option<String>,

    pub labels: Labels,

    /// Set when the pod has a deletion timestamp.
    pub deleting: bool,
}

// === impl Uid ===

impl Uid {
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for Uid {
    fn from(uid: String) -> Self {
        Self(uid)
    }
}

impl From<&str> for Uid {
    fn from(uid: &str) -> Self {
        Self(uid.to_string())
    }
}

impl AsRef<str> for Uid {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// === impl PodRef ===

impl PodRef {
    pub fn new(namespace: impl ToString, name: impl ToString) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

// === impl TrackedPod ===

impl TrackedPod {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}
