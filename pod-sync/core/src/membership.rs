use crate::TrackedPod;
use std::collections::BTreeSet;

/// The only phase in which a pod may join the synchronized set.
pub const RUNNING_PHASE: &str = "Running";

/// Decides which pods belong in the synchronized set.
///
/// A pod is eligible when its membership label holds one of the allowed values, it is in the
/// `Running` phase, and it has been assigned an IP. The readiness half of the predicate is fixed;
/// only the label key and values are configurable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Membership {
    label_key: String,
    allowed_values: BTreeSet<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Eligibility {
    Ineligible,
    EligibleRunning,
}

// === impl Membership ===

impl Membership {
    pub fn new<V: ToString>(
        label_key: impl ToString,
        allowed_values: impl IntoIterator<Item = V>,
    ) -> Self {
        Self {
            label_key: label_key.to_string(),
            allowed_values: allowed_values.into_iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn label_key(&self) -> &str {
        &self.label_key
    }

    pub fn allowed_values(&self) -> impl Iterator<Item = &str> + '_ {
        self.allowed_values.iter().map(String::as_str)
    }

    pub fn classify(&self, pod: &TrackedPod) -> Eligibility {
        let selected = pod
            .label(&self.label_key)
            .map(|v| self.allowed_values.contains(v))
            .unwrap_or(false);
        let running = pod.phase.as_deref() == Some(RUNNING_PHASE);
        let addressed = pod.pod_ip.as_deref().is_some_and(|ip| !ip.is_empty());

        if selected && running && addressed {
            Eligibility::EligibleRunning
        } else {
            Eligibility::Ineligible
        }
    }
}

// === impl Eligibility ===

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Self::EligibleRunning)
    }
}
