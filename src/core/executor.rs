//! IF-012: Executor: drive the terraform CLI over a working directory.
//!
//! write artifacts → init → plan (preview) → [dry run stops] → apply → output
//!
//! Every step runs under its own deadline and is appended to the working
//! directory's event log. Nothing is retried: a failed apply may already
//! have created real infrastructure.

use super::codegen;
use super::state::RunLock;
use super::types::{ArtifactSet, ChangeSummary, DeploymentEvent, DeploymentReport, StepLog};
use crate::error::ExecutorError;
use crate::transport::{local, ExecOutput};
use crate::tripwire::eventlog;
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Saved plan file passed from `plan -out` to `apply`.
pub const PLAN_OUT: &str = "tfplan";

static PLAN_SUMMARY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Plan: (\d+) to add, (\d+) to change, (\d+) to destroy").ok()
});
static APPLY_SUMMARY: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"Apply complete! Resources: (\d+) added, (\d+) changed, (\d+) destroyed").ok()
});
static DESTROY_SUMMARY: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"Destroy complete! Resources: (\d+) destroyed").ok());

/// Executor settings (`executor:` section of `infraforge.yaml`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// terraform binary name or path.
    pub binary: String,
    pub init_timeout_secs: u64,
    pub plan_timeout_secs: u64,
    pub apply_timeout_secs: u64,
    pub output_timeout_secs: u64,
    pub destroy_timeout_secs: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            binary: "terraform".to_string(),
            init_timeout_secs: 300,
            plan_timeout_secs: 600,
            apply_timeout_secs: 3600,
            output_timeout_secs: 60,
            destroy_timeout_secs: 3600,
        }
    }
}

/// Runs terraform steps against working directories.
#[derive(Debug, Clone, Default)]
pub struct Executor {
    config: ExecutorConfig,
}

struct Run<'a> {
    run_id: String,
    working_dir: &'a Path,
    steps: Vec<StepLog>,
}

impl Executor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Write `artifacts` into `working_dir` and run terraform over them.
    ///
    /// With `dry_run` the run stops after the preview: no resources are
    /// created and `outputs` is `None`. Otherwise `auto_approve` must be set;
    /// the approval gate itself belongs to the caller.
    pub fn execute_deployment(
        &self,
        artifacts: &ArtifactSet,
        working_dir: &Path,
        auto_approve: bool,
        dry_run: bool,
    ) -> Result<DeploymentReport, ExecutorError> {
        if !dry_run && !auto_approve {
            return Err(ExecutorError::NotApproved);
        }
        let start = Instant::now();
        let _lock = RunLock::acquire(working_dir)?;
        codegen::write_to_directory(artifacts, working_dir)?;

        let mut run = Run {
            run_id: eventlog::generate_run_id(),
            working_dir,
            steps: Vec::new(),
        };
        log_event(
            working_dir,
            DeploymentEvent::RunStarted {
                run_id: run.run_id.clone(),
                dry_run,
                artifact_digest: artifacts.digest(),
            },
        );
        info!(run_id = %run.run_id, dir = %working_dir.display(), dry_run, "deployment started");

        self.init(&mut run)?;

        let plan_out = format!("-out={}", PLAN_OUT);
        let preview = self.step(
            &mut run,
            "plan",
            &["plan", "-input=false", "-no-color", &plan_out],
            self.config.plan_timeout_secs,
        )?;
        let change_summary = parse_plan_summary(&preview.stdout);
        info!(run_id = %run.run_id, changes = %change_summary, "preview complete");

        if dry_run {
            return Ok(self.finish(run, start, dry_run, preview.stdout, change_summary, 0, 0, None));
        }

        let apply = self.step(
            &mut run,
            "apply",
            &["apply", "-input=false", "-no-color", "-auto-approve", PLAN_OUT],
            self.config.apply_timeout_secs,
        )?;
        let (added, _, destroyed) = parse_apply_summary(&apply.stdout)
            .unwrap_or((change_summary.add, change_summary.change, change_summary.destroy));

        let output = self.step(
            &mut run,
            "output",
            &["output", "-json", "-no-color"],
            self.config.output_timeout_secs,
        )?;
        let outputs = parse_outputs(&output.stdout);

        Ok(self.finish(
            run,
            start,
            dry_run,
            preview.stdout,
            change_summary,
            added,
            destroyed,
            Some(outputs),
        ))
    }

    /// Tear down everything terraform manages in `working_dir`.
    pub fn destroy(&self, working_dir: &Path) -> Result<DeploymentReport, ExecutorError> {
        let start = Instant::now();
        let _lock = RunLock::acquire(working_dir)?;
        let mut run = Run {
            run_id: eventlog::generate_run_id(),
            working_dir,
            steps: Vec::new(),
        };
        log_event(
            working_dir,
            DeploymentEvent::RunStarted {
                run_id: run.run_id.clone(),
                dry_run: false,
                artifact_digest: String::new(),
            },
        );
        info!(run_id = %run.run_id, dir = %working_dir.display(), "destroy started");

        self.init(&mut run)?;
        let out = self.step(
            &mut run,
            "destroy",
            &["destroy", "-input=false", "-no-color", "-auto-approve"],
            self.config.destroy_timeout_secs,
        )?;
        let destroyed = parse_destroy_summary(&out.stdout).unwrap_or(0);
        let summary = ChangeSummary {
            destroy: destroyed,
            ..ChangeSummary::default()
        };
        Ok(self.finish(run, start, false, out.stdout, summary, 0, destroyed, None))
    }

    fn init(&self, run: &mut Run) -> Result<ExecOutput, ExecutorError> {
        self.step(
            run,
            "init",
            &["init", "-input=false", "-no-color"],
            self.config.init_timeout_secs,
        )
        .map_err(|e| match e {
            ExecutorError::Subprocess {
                exit_code,
                stdout,
                stderr,
                ..
            } => ExecutorError::Initialization {
                exit_code,
                stdout,
                stderr,
            },
            other => other,
        })
    }

    fn step(
        &self,
        run: &mut Run,
        step: &str,
        args: &[&str],
        timeout_secs: u64,
    ) -> Result<ExecOutput, ExecutorError> {
        let timeout = Duration::from_secs(timeout_secs);
        let out = match local::run_command(&self.config.binary, args, run.working_dir, timeout) {
            Ok(out) => out,
            Err(reason) => {
                let err = ExecutorError::Spawn {
                    program: self.config.binary.clone(),
                    reason,
                };
                record_failure(run, step, &err);
                return Err(err);
            }
        };

        run.steps.push(StepLog {
            step: step.to_string(),
            exit_code: out.exit_code,
            duration_seconds: out.duration.as_secs_f64(),
            stdout: out.stdout.clone(),
            stderr: out.stderr.clone(),
        });

        if out.timed_out {
            let err = ExecutorError::Timeout {
                step: step.to_string(),
                timeout,
                partial_stdout: out.stdout,
                partial_stderr: out.stderr,
            };
            record_failure(run, step, &err);
            return Err(err);
        }
        if !out.success() {
            let err = ExecutorError::Subprocess {
                step: step.to_string(),
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            };
            record_failure(run, step, &err);
            return Err(err);
        }

        log_event(
            run.working_dir,
            DeploymentEvent::StepCompleted {
                run_id: run.run_id.clone(),
                step: step.to_string(),
                exit_code: out.exit_code,
                duration_seconds: out.duration.as_secs_f64(),
            },
        );
        Ok(out)
    }

    #[allow(clippy::too_many_arguments)]
    fn finish(
        &self,
        run: Run,
        start: Instant,
        dry_run: bool,
        preview: String,
        change_summary: ChangeSummary,
        resources_created: u32,
        resources_destroyed: u32,
        outputs: Option<IndexMap<String, String>>,
    ) -> DeploymentReport {
        let duration_seconds = start.elapsed().as_secs_f64();
        log_event(
            run.working_dir,
            DeploymentEvent::RunCompleted {
                run_id: run.run_id.clone(),
                resources_created,
                total_seconds: duration_seconds,
            },
        );
        info!(
            run_id = %run.run_id,
            resources_created,
            resources_destroyed,
            duration_seconds,
            "run complete"
        );
        DeploymentReport {
            run_id: run.run_id,
            dry_run,
            preview,
            change_summary,
            resources_created,
            resources_destroyed,
            outputs,
            duration_seconds,
            steps: run.steps,
        }
    }
}

fn record_failure(run: &Run, step: &str, err: &ExecutorError) {
    warn!(run_id = %run.run_id, step, error = %err, "step failed");
    let captured = err.captured();
    log_event(
        run.working_dir,
        DeploymentEvent::StepFailed {
            run_id: run.run_id.clone(),
            step: step.to_string(),
            error: err.to_string(),
            exit_code: captured.and_then(|c| c.exit_code),
            stdout: captured.map(|c| c.stdout.to_string()).unwrap_or_default(),
            stderr: captured.map(|c| c.stderr.to_string()).unwrap_or_default(),
        },
    );
}

fn log_event(working_dir: &Path, event: DeploymentEvent) {
    if let Err(e) = eventlog::append_event(working_dir, event) {
        warn!(dir = %working_dir.display(), error = %e, "cannot append event");
    }
}

fn capture_u32(caps: &regex::Captures, idx: usize) -> u32 {
    caps.get(idx)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Parse `Plan: N to add, N to change, N to destroy.`; "No changes" → zeros.
pub fn parse_plan_summary(stdout: &str) -> ChangeSummary {
    PLAN_SUMMARY
        .as_ref()
        .and_then(|re| re.captures(stdout))
        .map(|c| ChangeSummary {
            add: capture_u32(&c, 1),
            change: capture_u32(&c, 2),
            destroy: capture_u32(&c, 3),
        })
        .unwrap_or_default()
}

/// Parse `Apply complete! Resources: N added, N changed, N destroyed.`
pub fn parse_apply_summary(stdout: &str) -> Option<(u32, u32, u32)> {
    let re = APPLY_SUMMARY.as_ref()?;
    let c = re.captures(stdout)?;
    Some((capture_u32(&c, 1), capture_u32(&c, 2), capture_u32(&c, 3)))
}

/// Parse `Destroy complete! Resources: N destroyed.`
pub fn parse_destroy_summary(stdout: &str) -> Option<u32> {
    let re = DESTROY_SUMMARY.as_ref()?;
    let c = re.captures(stdout)?;
    Some(capture_u32(&c, 1))
}

/// Flatten `terraform output -json` (`{"k": {"value": v, ...}}`) into
/// key → string. String values are unquoted; others stay as JSON text.
pub fn parse_outputs(stdout: &str) -> IndexMap<String, String> {
    let parsed: IndexMap<String, serde_json::Value> = match serde_json::from_str(stdout.trim()) {
        Ok(v) => v,
        Err(e) => {
            if !stdout.trim().is_empty() {
                warn!(error = %e, "terraform output was not valid JSON");
            }
            return IndexMap::new();
        }
    };
    parsed
        .into_iter()
        .map(|(k, v)| {
            let value = v.get("value").cloned().unwrap_or(v);
            let text = match value {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        })
        .collect()
}
