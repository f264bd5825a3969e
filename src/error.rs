//! Error types for infraforge.
//!
//! Errors discoverable before any external mutation (unknown names, missing
//! parameters, cost ceilings, template gaps) are returned synchronously.
//! Once a subprocess may have touched real infrastructure, failures carry
//! the full stdout/stderr/exit code and are never retried.

use std::path::PathBuf;
use std::time::Duration;

/// Startup-time registration failures.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("{kind} '{name}' is already registered")]
    RegistrationConflict { kind: &'static str, name: String },

    #[error("cannot derive schema for tool '{name}': {reason}")]
    Schema { name: String, reason: String },
}

/// Tool dispatch failures.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool '{name}'. Available: {}", .available.join(", "))]
    UnknownTool { name: String, available: Vec<String> },

    #[error("invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("tool '{name}' failed: {reason}")]
    Execution { name: String, reason: String },
}

/// Capability lookup failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CapabilityError {
    #[error("unknown capability '{name}'. Valid options: {}", .valid.join(", "))]
    UnknownCapability { name: String, valid: Vec<String> },

    #[error("capability '{name}' is registered but no handler is installed")]
    NotInstalled { name: String },
}

/// Decision engine failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecisionError {
    #[error("estimated cost ${estimate:.2}/month exceeds limit ${limit:.2}/month")]
    CostLimitExceeded { estimate: f64, limit: f64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Code generator failures.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodegenError {
    #[error("template not found: '{name}'. Known fragments: {}", .known.join(", "))]
    TemplateNotFound { name: String, known: Vec<String> },

    #[error("render error in '{template}': {reason}")]
    Render { template: String, reason: String },

    #[error("resource '{0}' listed more than once")]
    DuplicateResource(String),

    #[error("resource '{resource}' requires '{dependency}' in the same deployment")]
    MissingDependency { resource: String, dependency: String },
}

/// Executor and subprocess failures.
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    #[error("terraform init failed (exit {exit_code}): {}", .stderr.trim())]
    Initialization {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("terraform {step} failed (exit {exit_code}): {}", .stderr.trim())]
    Subprocess {
        step: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("terraform {step} timed out after {}s", .timeout.as_secs())]
    Timeout {
        step: String,
        timeout: Duration,
        partial_stdout: String,
        partial_stderr: String,
    },

    #[error("cannot spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("apply requires prior approval (auto_approve=false)")]
    NotApproved,

    #[error("working directory {} is in use by another run", .path.display())]
    Locked { path: PathBuf },

    #[error("cannot write artifacts: {0}")]
    Artifacts(#[from] StateError),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output a failed or timed-out terraform step left behind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CapturedOutput<'a> {
    pub step: &'a str,
    /// `None` when the step was killed at its deadline.
    pub exit_code: Option<i32>,
    pub stdout: &'a str,
    pub stderr: &'a str,
}

impl ExecutorError {
    /// Step, exit code and streams for failures that came from a subprocess.
    pub fn captured(&self) -> Option<CapturedOutput<'_>> {
        match self {
            Self::Initialization {
                exit_code,
                stdout,
                stderr,
            } => Some(CapturedOutput {
                step: "init",
                exit_code: Some(*exit_code),
                stdout,
                stderr,
            }),
            Self::Subprocess {
                step,
                exit_code,
                stdout,
                stderr,
            } => Some(CapturedOutput {
                step,
                exit_code: Some(*exit_code),
                stdout,
                stderr,
            }),
            Self::Timeout {
                step,
                partial_stdout,
                partial_stderr,
                ..
            } => Some(CapturedOutput {
                step,
                exit_code: None,
                stdout: partial_stdout,
                stderr: partial_stderr,
            }),
            _ => None,
        }
    }

    /// The message followed by whatever stdout and stderr were captured.
    pub fn detailed(&self) -> String {
        let mut text = self.to_string();
        if let Some(captured) = self.captured() {
            for (label, stream) in [("stdout", captured.stdout), ("stderr", captured.stderr)] {
                if !stream.trim().is_empty() {
                    text.push_str(&format!("\n--- {} ---\n{}", label, stream.trim_end()));
                }
            }
        }
        text
    }
}

/// Failures surfaced by `Capability::plan`.
#[derive(Debug, thiserror::Error)]
pub enum PlanningError {
    #[error("missing required parameter(s): {}", .0.join(", "))]
    MissingParameter(Vec<String>),

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error(transparent)]
    Capability(#[from] CapabilityError),

    #[error(transparent)]
    Decision(#[from] DecisionError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[error("preview failed: {0}")]
    Preview(#[from] ExecutorError),

    #[error(transparent)]
    State(#[from] StateError),
}

/// Invalid lifecycle transitions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot {action} from state {from}")]
    InvalidTransition { from: String, action: &'static str },
}

/// Persisted plan and config file failures.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("serialize error: {0}")]
    Serialize(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if001_unknown_capability_lists_alternatives() {
        let err = CapabilityError::UnknownCapability {
            name: "provision_k8s".into(),
            valid: vec!["provision_databricks".into(), "provision_openai".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("provision_k8s"));
        assert!(msg.contains("provision_databricks, provision_openai"));
    }

    #[test]
    fn test_if001_cost_limit_message() {
        let err = DecisionError::CostLimitExceeded {
            estimate: 1234.5,
            limit: 1000.0,
        };
        assert_eq!(
            err.to_string(),
            "estimated cost $1234.50/month exceeds limit $1000.00/month"
        );
    }

    #[test]
    fn test_if001_planning_error_wraps_missing() {
        let err = PlanningError::MissingParameter(vec!["team".into(), "region".into()]);
        assert_eq!(err.to_string(), "missing required parameter(s): team, region");
    }

    #[test]
    fn test_if001_timeout_message() {
        let err = ExecutorError::Timeout {
            step: "apply".into(),
            timeout: Duration::from_secs(5),
            partial_stdout: "creating...".into(),
            partial_stderr: String::new(),
        };
        assert_eq!(err.to_string(), "terraform apply timed out after 5s");
        let detailed = err.detailed();
        assert!(detailed.ends_with("--- stdout ---\ncreating..."), "{}", detailed);
        assert!(!detailed.contains("--- stderr ---"));
    }

    #[test]
    fn test_if001_captured_output() {
        let err = ExecutorError::Subprocess {
            step: "apply".into(),
            exit_code: 1,
            stdout: "Still creating...\n".into(),
            stderr: "boom\n".into(),
        };
        let captured = err.captured().unwrap();
        assert_eq!(captured.step, "apply");
        assert_eq!(captured.exit_code, Some(1));
        assert_eq!(
            err.detailed(),
            "terraform apply failed (exit 1): boom\n--- stdout ---\nStill creating...\n--- stderr ---\nboom"
        );
        assert!(ExecutorError::NotApproved.captured().is_none());
    }
}
