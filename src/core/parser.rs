//! IF-011: `infraforge.yaml` parsing and validation.
//!
//! Every section is optional; absent keys take their defaults. Validation
//! checks structural constraints:
//! - Version must be "1.0"
//! - Worker bounds ordered, prod floor reachable
//! - Every instance class the tables can pick has a price and DBU rating
//! - Executor binary named, timeouts positive

use super::executor::ExecutorConfig;
use super::policy::DecisionPolicy;
use super::types::{Environment, DEFAULT_REGION};
use crate::error::StateError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config file name.
pub const CONFIG_FILE: &str = "infraforge.yaml";

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InfraforgeConfig {
    pub version: String,
    /// Root under which `<name>_plan/` working directories are created.
    pub workspace_root: PathBuf,
    pub default_region: String,
    /// Where unsupported-capability requests are recorded, if anywhere.
    pub feature_request_log: Option<PathBuf>,
    pub policy: DecisionPolicy,
    pub executor: ExecutorConfig,
}

impl Default for InfraforgeConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            workspace_root: PathBuf::from("workspaces"),
            default_region: DEFAULT_REGION.to_string(),
            feature_request_log: None,
            policy: DecisionPolicy::default(),
            executor: ExecutorConfig::default(),
        }
    }
}

/// Validation error.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a config file from disk.
pub fn parse_config_file(path: &Path) -> Result<InfraforgeConfig, StateError> {
    let content = std::fs::read_to_string(path).map_err(|source| StateError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content).map_err(|reason| StateError::Parse {
        path: path.to_path_buf(),
        reason,
    })
}

/// Parse a config from a string. An empty document yields the defaults.
pub fn parse_config(yaml: &str) -> Result<InfraforgeConfig, String> {
    if yaml.trim().is_empty() {
        return Ok(InfraforgeConfig::default());
    }
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Load `path` if it exists, else the defaults.
pub fn load_or_default(path: &Path) -> Result<InfraforgeConfig, StateError> {
    if path.exists() {
        parse_config_file(path)
    } else {
        Ok(InfraforgeConfig::default())
    }
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &InfraforgeConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let mut push = |message: String| errors.push(ValidationError { message });

    if config.version != "1.0" {
        push(format!("version must be \"1.0\", got \"{}\"", config.version));
    }
    if config.workspace_root.as_os_str().is_empty() {
        push("workspace_root must not be empty".to_string());
    }
    if config.default_region.trim().is_empty() {
        push("default_region must not be empty".to_string());
    }

    let policy = &config.policy;
    for env in Environment::ALL {
        let bounds = policy.workers.get(env);
        if bounds.min > bounds.max {
            push(format!(
                "policy.workers.{}: min {} exceeds max {}",
                env, bounds.min, bounds.max
            ));
        }
        if *policy.monthly_hours.get(env) <= 0.0 {
            push(format!("policy.monthly_hours.{} must be positive", env));
        }
        if *policy.idle_timeout_minutes.get(env) == 0 {
            push(format!("policy.idle_timeout_minutes.{} must be positive", env));
        }
    }
    if policy.prod_min_workers_floor > policy.workers.prod.max {
        push(format!(
            "policy.prod_min_workers_floor {} exceeds prod max workers {}",
            policy.prod_min_workers_floor, policy.workers.prod.max
        ));
    }

    for class in policy.instance_classes() {
        match policy.vm_hourly_usd.get(class) {
            None => push(format!("policy.vm_hourly_usd has no price for '{}'", class)),
            Some(p) if *p < 0.0 || !p.is_finite() => push(format!(
                "policy.vm_hourly_usd['{}'] must be a non-negative number",
                class
            )),
            Some(_) => {}
        }
        match policy.dbu_per_hour.get(class) {
            None => push(format!("policy.dbu_per_hour has no rating for '{}'", class)),
            Some(d) if *d < 0.0 || !d.is_finite() => push(format!(
                "policy.dbu_per_hour['{}'] must be a non-negative number",
                class
            )),
            Some(_) => {}
        }
    }
    for (name, value) in [
        ("dbu_rate.standard", policy.dbu_rate.standard),
        ("dbu_rate.premium", policy.dbu_rate.premium),
        ("tier_fee.standard", policy.tier_fee.standard),
        ("tier_fee.premium", policy.tier_fee.premium),
        ("storage_monthly_usd", policy.storage_monthly_usd),
    ] {
        if value < 0.0 || !value.is_finite() {
            push(format!("policy.{} must be a non-negative number", name));
        }
    }
    if policy.runtime_cpu.trim().is_empty() || policy.runtime_gpu.trim().is_empty() {
        push("policy runtime versions must not be empty".to_string());
    }

    let exec = &config.executor;
    if exec.binary.trim().is_empty() {
        push("executor.binary must not be empty".to_string());
    }
    for (name, secs) in [
        ("init_timeout_secs", exec.init_timeout_secs),
        ("plan_timeout_secs", exec.plan_timeout_secs),
        ("apply_timeout_secs", exec.apply_timeout_secs),
        ("output_timeout_secs", exec.output_timeout_secs),
        ("destroy_timeout_secs", exec.destroy_timeout_secs),
    ] {
        if secs == 0 {
            push(format!("executor.{} must be positive", name));
        }
    }

    errors
}
