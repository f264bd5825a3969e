//! IF-032: Deployment lifecycle state machine.
//!
//! ```text
//! NotStarted → Planned → Approved → Executed → Succeeded
//!                      ↘ Rejected            ↘ Failed → RolledBack
//! ```
//!
//! A rejected plan may be replaced by a fresh one. Every other transition
//! outside the diagram fails with `LifecycleError::InvalidTransition`.

use super::Capability;
use crate::core::types::{CapabilityPlan, CapabilityResult};
use crate::error::LifecycleError;
use crate::tripwire::eventlog;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentState {
    NotStarted,
    Planned,
    Approved,
    Rejected,
    Executed,
    Succeeded,
    Failed,
    RolledBack,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::Planned => "planned",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Executed => "executed",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// No further transitions are possible.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::RolledBack)
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One state change with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub state: DeploymentState,
    pub at: String,
}

/// A single deployment attempt moving through the lifecycle.
#[derive(Debug, Clone)]
pub struct Deployment {
    state: DeploymentState,
    plan: Option<CapabilityPlan>,
    result: Option<CapabilityResult>,
    history: Vec<Transition>,
}

impl Default for Deployment {
    fn default() -> Self {
        Self::new()
    }
}

impl Deployment {
    pub fn new() -> Self {
        Self {
            state: DeploymentState::NotStarted,
            plan: None,
            result: None,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> DeploymentState {
        self.state
    }

    pub fn plan(&self) -> Option<&CapabilityPlan> {
        self.plan.as_ref()
    }

    pub fn result(&self) -> Option<&CapabilityResult> {
        self.result.as_ref()
    }

    pub fn history(&self) -> &[Transition] {
        &self.history
    }

    fn require(&self, allowed: &[DeploymentState], action: &'static str) -> Result<(), LifecycleError> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                action,
            })
        }
    }

    fn enter(&mut self, state: DeploymentState) {
        info!(from = %self.state, to = %state, "deployment transition");
        self.state = state;
        self.history.push(Transition {
            state,
            at: eventlog::now_iso8601(),
        });
    }

    /// Attach a plan. Allowed from `NotStarted` or after a rejection.
    pub fn record_plan(&mut self, plan: CapabilityPlan) -> Result<(), LifecycleError> {
        self.require(&[DeploymentState::NotStarted, DeploymentState::Rejected], "record a plan")?;
        self.plan = Some(plan);
        self.enter(DeploymentState::Planned);
        Ok(())
    }

    pub fn approve(&mut self) -> Result<(), LifecycleError> {
        self.require(&[DeploymentState::Planned], "approve")?;
        self.enter(DeploymentState::Approved);
        Ok(())
    }

    pub fn reject(&mut self) -> Result<(), LifecycleError> {
        self.require(&[DeploymentState::Planned], "reject")?;
        self.plan = None;
        self.enter(DeploymentState::Rejected);
        Ok(())
    }

    /// Run the approved plan through `capability` and settle on
    /// `Succeeded` or `Failed`.
    pub fn execute(&mut self, capability: &dyn Capability) -> Result<&CapabilityResult, LifecycleError> {
        self.require(&[DeploymentState::Approved], "execute")?;
        let Some(plan) = self.plan.as_ref() else {
            return Err(LifecycleError::InvalidTransition {
                from: self.state.to_string(),
                action: "execute without a plan",
            });
        };
        let result = capability.execute(plan);
        self.enter(DeploymentState::Executed);
        let outcome = if result.success {
            DeploymentState::Succeeded
        } else {
            DeploymentState::Failed
        };
        self.result = Some(result);
        self.enter(outcome);
        self.result.as_ref().ok_or(LifecycleError::InvalidTransition {
            from: outcome.to_string(),
            action: "read result",
        })
    }

    /// Ask `capability` to undo a failed execution. Stays `Failed` when the
    /// capability declines.
    pub fn rollback(&mut self, capability: &dyn Capability) -> Result<bool, LifecycleError> {
        self.require(&[DeploymentState::Failed], "roll back")?;
        let Some(result) = self.result.as_ref() else {
            return Ok(false);
        };
        if capability.rollback(result) {
            self.enter(DeploymentState::RolledBack);
            Ok(true)
        } else {
            warn!(capability = capability.name(), "rollback not performed");
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{sample_plan, StubCapability};
    use super::*;

    fn approved() -> Deployment {
        let mut d = Deployment::new();
        d.record_plan(sample_plan("provision_stub")).unwrap();
        d.approve().unwrap();
        d
    }

    #[test]
    fn test_if032_happy_path() {
        let stub = StubCapability::new("provision_stub");
        let mut d = approved();
        let result = d.execute(&stub).unwrap();
        assert!(result.success);
        assert_eq!(d.state(), DeploymentState::Succeeded);
        assert!(d.state().is_terminal());
        let states: Vec<_> = d.history().iter().map(|t| t.state).collect();
        assert_eq!(
            states,
            vec![
                DeploymentState::Planned,
                DeploymentState::Approved,
                DeploymentState::Executed,
                DeploymentState::Succeeded
            ]
        );
    }

    #[test]
    fn test_if032_execute_requires_approval() {
        let stub = StubCapability::new("provision_stub");
        let mut d = Deployment::new();
        d.record_plan(sample_plan("provision_stub")).unwrap();
        let err = d.execute(&stub).unwrap_err();
        assert_eq!(err.to_string(), "cannot execute from state planned");
        assert_eq!(stub.executions.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn test_if032_reject_then_replan() {
        let mut d = Deployment::new();
        d.record_plan(sample_plan("provision_stub")).unwrap();
        d.reject().unwrap();
        assert!(d.plan().is_none());
        assert!(d.approve().is_err());
        d.record_plan(sample_plan("provision_stub")).unwrap();
        assert_eq!(d.state(), DeploymentState::Planned);
    }

    #[test]
    fn test_if032_invalid_transitions() {
        let mut d = Deployment::new();
        assert!(d.approve().is_err());
        assert!(d.reject().is_err());
        let stub = StubCapability::new("provision_stub");
        assert!(d.rollback(&stub).is_err());
        let mut done = approved();
        done.execute(&stub).unwrap();
        assert!(done.record_plan(sample_plan("provision_stub")).is_err());
        assert!(done.rollback(&stub).is_err());
    }

    #[test]
    fn test_if032_failure_and_rollback() {
        let mut stub = StubCapability::new("provision_stub");
        stub.fail_execute = true;
        let mut d = approved();
        assert!(!d.execute(&stub).unwrap().success);
        assert_eq!(d.state(), DeploymentState::Failed);

        assert!(!d.rollback(&stub).unwrap());
        assert_eq!(d.state(), DeploymentState::Failed);

        stub.can_rollback = true;
        assert!(d.rollback(&stub).unwrap());
        assert_eq!(d.state(), DeploymentState::RolledBack);
    }
}
