//! Cluster lifecycle orchestration.
//!
//! | Module      | Responsibility                                           |
//! |-------------|----------------------------------------------------------|
//! | `lifecycle` | create / use / inspect / destroy / init sequencing       |
//! | `gate`      | confirmation decision and terminal prompts               |
//! | `poll`      | bounded convergence waits                                |
//! | `products`  | add-on product install and removal on a cluster          |
//!
//! Phases are never persisted. A cluster's phase is re-derived on demand
//! from registry presence plus a live describe call:
//!
//! ```text
//! Absent → Creating → Ready → Destroying → Absent
//! ```

pub mod gate;
pub mod lifecycle;
pub mod poll;
pub mod products;

pub use gate::{Confirmation, Prompter, TerminalPrompter, decide};
pub use lifecycle::Orchestrator;
pub use poll::{PollPolicy, poll_until};
pub use products::ProductManager;

use crate::catalog::ProductSpec;
use crate::provider::{ClusterState, Location, Provider, ProvisionReport};
use crate::registry::ClusterDescriptor;

/// The ordered steps of a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyStep {
    DeleteDependents,
    DeleteCluster,
    DestroyInfrastructure,
    RemoveDescriptor,
}

impl std::fmt::Display for DestroyStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DestroyStep::DeleteDependents => write!(f, "delete dependents"),
            DestroyStep::DeleteCluster => write!(f, "delete cluster"),
            DestroyStep::DestroyInfrastructure => write!(f, "destroy infrastructure"),
            DestroyStep::RemoveDescriptor => write!(f, "remove descriptor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Absent,
    Creating,
    Ready,
    Destroying,
}

impl ClusterPhase {
    /// Unregistered clusters are `Absent` whatever the cloud says; so are
    /// registered ones the provider no longer knows about.
    pub fn derive(registered: bool, state: Option<&ClusterState>) -> Self {
        match state {
            _ if !registered => ClusterPhase::Absent,
            None => ClusterPhase::Absent,
            Some(s) if s.is_deleting() => ClusterPhase::Destroying,
            Some(s) if s.is_creating() => ClusterPhase::Creating,
            Some(_) => ClusterPhase::Ready,
        }
    }
}

impl std::fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterPhase::Absent => write!(f, "absent"),
            ClusterPhase::Creating => write!(f, "creating"),
            ClusterPhase::Ready => write!(f, "ready"),
            ClusterPhase::Destroying => write!(f, "destroying"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub name: String,
    pub provider: Provider,
    /// Caller-supplied location; blanks are filled from provider config.
    pub location: Location,
    /// Block until Terraform finishes instead of launching it in background.
    pub wait: bool,
}

#[derive(Debug, Clone)]
pub struct CreateOutcome {
    pub descriptor: ClusterDescriptor,
    pub report: ProvisionReport,
}

#[derive(Debug, Clone)]
pub struct UseRequest {
    pub name: String,
    /// Only needed for clusters the registry does not know.
    pub provider: Option<Provider>,
    pub location: Location,
}

#[derive(Debug, Clone)]
pub struct UseOutcome {
    pub descriptor: ClusterDescriptor,
    /// True when an unknown cluster was added as user-managed.
    pub adopted: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestroyTarget {
    /// Pick from a numbered list of registered clusters.
    Interactive,
    Named { name: String, region: Option<String> },
}

#[derive(Debug, Clone)]
pub struct DestroyRequest {
    pub target: DestroyTarget,
    pub auto_approve: bool,
}

#[derive(Debug, Clone)]
pub enum DestroyOutcome {
    /// Cloud resources torn down and descriptor removed.
    Destroyed(ClusterDescriptor),
    /// User-managed cluster dropped from the registry; nothing deleted.
    Forgotten(ClusterDescriptor),
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ProductRequest {
    /// Registered cluster to install on or remove from.
    pub cluster: String,
    pub spec: ProductSpec,
}

#[derive(Debug, Clone)]
pub struct ClusterInspection {
    pub descriptor: ClusterDescriptor,
    pub state: Option<ClusterState>,
    pub phase: ClusterPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_from_live_state() {
        let active = ClusterState::new("ACTIVE");
        let deleting = ClusterState::new("DELETING");
        let provisioning = ClusterState::new("PROVISIONING");

        assert_eq!(ClusterPhase::derive(true, Some(&active)), ClusterPhase::Ready);
        assert_eq!(ClusterPhase::derive(true, Some(&deleting)), ClusterPhase::Destroying);
        assert_eq!(ClusterPhase::derive(true, Some(&provisioning)), ClusterPhase::Creating);
        assert_eq!(ClusterPhase::derive(true, None), ClusterPhase::Absent);
        assert_eq!(ClusterPhase::derive(false, Some(&active)), ClusterPhase::Absent);
    }

    #[test]
    fn test_step_names() {
        assert_eq!(DestroyStep::DeleteDependents.to_string(), "delete dependents");
        assert_eq!(DestroyStep::RemoveDescriptor.to_string(), "remove descriptor");
    }
}
