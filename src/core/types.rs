//! IF-002: Domain types shared by the decision engine, generator, executor
//! and capability layer.
//!
//! Everything that crosses the plan/execute boundary derives
//! Serialize/Deserialize so a plan can be persisted and replayed later.

use crate::error::DecisionError;
use crate::tripwire::hasher;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ============================================================================
// Enumerations
// ============================================================================

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub const ALL: [Environment; 3] = [Self::Dev, Self::Staging, Self::Prod];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Staging => "staging",
            Self::Prod => "prod",
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Dev),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Prod),
            other => Err(DecisionError::InvalidRequest(format!(
                "unknown environment '{}' (expected dev, staging or prod)",
                other
            ))),
        }
    }
}

/// Workload profile driving instance sizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadType {
    DataEngineering,
    Ml,
    Analytics,
    DataScience,
    Etl,
}

impl WorkloadType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataEngineering => "data_engineering",
            Self::Ml => "ml",
            Self::Analytics => "analytics",
            Self::DataScience => "data_science",
            Self::Etl => "etl",
        }
    }
}

impl Default for WorkloadType {
    fn default() -> Self {
        Self::DataEngineering
    }
}

impl fmt::Display for WorkloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkloadType {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "data_engineering" => Ok(Self::DataEngineering),
            "ml" | "machine_learning" => Ok(Self::Ml),
            "analytics" => Ok(Self::Analytics),
            "data_science" => Ok(Self::DataScience),
            "etl" => Ok(Self::Etl),
            other => Err(DecisionError::InvalidRequest(format!(
                "unknown workload type '{}'",
                other
            ))),
        }
    }
}

/// Workspace SKU tier. Ordered: `Standard < Premium`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SkuTier {
    Standard,
    Premium,
}

impl SkuTier {
    /// Highest tier on offer.
    pub const TOP: SkuTier = SkuTier::Premium;
    /// Lowest tier on offer.
    pub const LOWEST: SkuTier = SkuTier::Standard;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

impl fmt::Display for SkuTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SkuTier {
    type Err = DecisionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            other => Err(DecisionError::InvalidRequest(format!("unknown SKU tier '{}'", other))),
        }
    }
}

/// Instance size class used to index the instance tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceSize {
    Small,
    Medium,
    Large,
}

impl InstanceSize {
    const ORDER: [InstanceSize; 3] = [Self::Small, Self::Medium, Self::Large];

    /// Move `offset` steps along small → medium → large, clamped at both ends.
    pub fn shift(self, offset: i8) -> InstanceSize {
        let idx = Self::ORDER.iter().position(|s| *s == self).unwrap_or(1) as i32;
        let shifted = (idx + offset as i32).clamp(0, Self::ORDER.len() as i32 - 1);
        Self::ORDER[shifted as usize]
    }
}

impl fmt::Display for InstanceSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Small => write!(f, "small"),
            Self::Medium => write!(f, "medium"),
            Self::Large => write!(f, "large"),
        }
    }
}

// ============================================================================
// Request
// ============================================================================

/// Structured infrastructure request. Immutable once built; construct with
/// [`InfrastructureRequest::builder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureRequest {
    team: String,
    environment: Environment,
    region: String,
    workload_type: WorkloadType,
    enable_gpu: bool,
    cost_limit: Option<f64>,
    name: Option<String>,
    sku_override: Option<SkuTier>,
    instance_pool: bool,
    additional_requirements: Option<String>,
}

impl InfrastructureRequest {
    pub fn builder(team: impl Into<String>, environment: Environment) -> RequestBuilder {
        RequestBuilder {
            team: team.into(),
            environment,
            region: DEFAULT_REGION.to_string(),
            workload_type: WorkloadType::default(),
            enable_gpu: false,
            cost_limit: None,
            name: None,
            sku_override: None,
            instance_pool: false,
            additional_requirements: None,
        }
    }

    pub fn team(&self) -> &str {
        &self.team
    }
    pub fn environment(&self) -> Environment {
        self.environment
    }
    pub fn region(&self) -> &str {
        &self.region
    }
    pub fn workload_type(&self) -> WorkloadType {
        self.workload_type
    }
    pub fn enable_gpu(&self) -> bool {
        self.enable_gpu
    }
    pub fn cost_limit(&self) -> Option<f64> {
        self.cost_limit
    }
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
    pub fn sku_override(&self) -> Option<SkuTier> {
        self.sku_override
    }
    pub fn instance_pool(&self) -> bool {
        self.instance_pool
    }
    pub fn additional_requirements(&self) -> Option<&str> {
        self.additional_requirements.as_deref()
    }
}

/// Default cloud region when the caller names none.
pub const DEFAULT_REGION: &str = "eastus";

/// Builder for [`InfrastructureRequest`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    team: String,
    environment: Environment,
    region: String,
    workload_type: WorkloadType,
    enable_gpu: bool,
    cost_limit: Option<f64>,
    name: Option<String>,
    sku_override: Option<SkuTier>,
    instance_pool: bool,
    additional_requirements: Option<String>,
}

impl RequestBuilder {
    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }
    pub fn workload_type(mut self, workload_type: WorkloadType) -> Self {
        self.workload_type = workload_type;
        self
    }
    pub fn enable_gpu(mut self, enable_gpu: bool) -> Self {
        self.enable_gpu = enable_gpu;
        self
    }
    pub fn cost_limit(mut self, limit: Option<f64>) -> Self {
        self.cost_limit = limit;
        self
    }
    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }
    pub fn sku_override(mut self, sku: Option<SkuTier>) -> Self {
        self.sku_override = sku;
        self
    }
    pub fn instance_pool(mut self, enabled: bool) -> Self {
        self.instance_pool = enabled;
        self
    }
    pub fn additional_requirements(mut self, text: Option<String>) -> Self {
        self.additional_requirements = text;
        self
    }

    /// Validate and freeze the request.
    pub fn build(self) -> Result<InfrastructureRequest, DecisionError> {
        if self.team.trim().is_empty() {
            return Err(DecisionError::InvalidRequest("team must not be empty".into()));
        }
        if self.region.trim().is_empty() {
            return Err(DecisionError::InvalidRequest("region must not be empty".into()));
        }
        check_charset("team", &self.team, &['-', '_', ' '])?;
        check_charset("region", &self.region, &['-', ' '])?;
        if let Some(limit) = self.cost_limit {
            if !limit.is_finite() || limit < 0.0 {
                return Err(DecisionError::InvalidRequest(format!(
                    "cost_limit must be a non-negative number, got {}",
                    limit
                )));
            }
        }
        Ok(InfrastructureRequest {
            team: self.team.trim().to_string(),
            environment: self.environment,
            region: self.region.trim().to_string(),
            workload_type: self.workload_type,
            enable_gpu: self.enable_gpu,
            cost_limit: self.cost_limit,
            name: self.name,
            sku_override: self.sku_override,
            instance_pool: self.instance_pool,
            additional_requirements: self.additional_requirements,
        })
    }
}

/// Team and region flow into generated Terraform, so only a plain charset is accepted.
fn check_charset(field: &str, value: &str, extra: &[char]) -> Result<(), DecisionError> {
    match value
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && !extra.contains(c))
    {
        Some(bad) => Err(DecisionError::InvalidRequest(format!(
            "{} '{}' contains unsupported character {:?}",
            field,
            value.escape_debug(),
            bad
        ))),
        None => Ok(()),
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Monthly cost estimate in USD.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub compute: f64,
    pub tier_fee: f64,
    pub storage: f64,
    pub total: f64,
}

/// Concrete configuration derived from exactly one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfrastructureDecision {
    pub name: String,
    pub resource_group_name: String,
    pub region: String,
    pub sku: SkuTier,
    pub instance_size: InstanceSize,
    pub driver_instance_type: String,
    pub worker_instance_type: String,
    pub min_workers: u32,
    pub max_workers: u32,
    pub runtime_version: String,
    pub idle_timeout_minutes: u32,
    pub enable_gpu: bool,
    pub instance_pool: bool,
    pub cost: CostBreakdown,
    pub justification: String,
}

impl InfrastructureDecision {
    pub fn estimated_monthly_cost(&self) -> f64 {
        self.cost.total
    }
}

// ============================================================================
// Artifacts
// ============================================================================

/// Name of the primary infrastructure-as-code artifact.
pub const PRIMARY_ARTIFACT: &str = "main.tf";

/// Ordered name → text mapping of generated infrastructure-as-code files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactSet(IndexMap<String, String>);

impl ArtifactSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.0.insert(name.into(), content.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The primary artifact (`main.tf`), empty if absent.
    pub fn primary(&self) -> &str {
        self.get(PRIMARY_ARTIFACT).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// BLAKE3 digest over every file name and body, in order. Matches
    /// [`hasher::hash_named_files`] over the same files once written.
    pub fn digest(&self) -> String {
        hasher::hash_named_strings(self.iter())
    }
}

// ============================================================================
// Capability context, plan, result
// ============================================================================

/// Everything a capability receives from its caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapabilityContext {
    pub capability_name: String,
    pub user_request: String,
    #[serde(default)]
    pub parameters: IndexMap<String, serde_json::Value>,
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
}

impl CapabilityContext {
    pub fn new(capability_name: impl Into<String>, user_request: impl Into<String>) -> Self {
        Self {
            capability_name: capability_name.into(),
            user_request: user_request.into(),
            ..Self::default()
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.to_string(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<String>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// String-valued parameter, if present and non-empty.
    pub fn param_str(&self, key: &str) -> Option<String> {
        match self.parameters.get(key)? {
            serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            serde_json::Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Boolean parameter; accepts JSON booleans and "true"/"yes"/"1" strings.
    pub fn param_bool(&self, key: &str) -> Option<bool> {
        match self.parameters.get(key)? {
            serde_json::Value::Bool(b) => Some(*b),
            serde_json::Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Numeric parameter; accepts JSON numbers and numeric strings.
    pub fn param_f64(&self, key: &str) -> Option<f64> {
        match self.parameters.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().trim_start_matches('$').parse().ok(),
            _ => None,
        }
    }
}

/// One resource a plan intends to create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
}

impl PlannedResource {
    pub fn new(kind: &str, name: &str) -> Self {
        Self {
            kind: kind.to_string(),
            name: name.to_string(),
            attributes: IndexMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }
}

/// Counts parsed from a preview's `Plan: N to add, ...` line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSummary {
    pub add: u32,
    pub change: u32,
    pub destroy: u32,
}

impl fmt::Display for ChangeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to change, {} to destroy",
            self.add, self.change, self.destroy
        )
    }
}

/// Everything `execute()` needs, captured at plan time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDetails {
    pub decision: InfrastructureDecision,
    pub artifacts: ArtifactSet,
    pub artifact_digest: String,
    pub working_dir: PathBuf,
    pub preview: String,
    pub change_summary: ChangeSummary,
    pub environment: Environment,
    pub workload_type: WorkloadType,
    pub team: String,
}

/// Side-effect-free preview of a deployment. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityPlan {
    pub capability_name: String,
    pub description: String,
    pub resources: Vec<PlannedResource>,
    pub estimated_cost: f64,
    pub estimated_duration_minutes: u32,
    pub requires_approval: bool,
    pub created_at: String,
    pub details: PlanDetails,
}

impl CapabilityPlan {
    /// Fixed-format summary for approvers.
    pub fn to_summary(&self) -> String {
        let mut lines = vec![
            format!("Capability: {}", self.capability_name),
            format!("Description: {}", self.description),
            String::new(),
            "Resources to create:".to_string(),
        ];
        for r in &self.resources {
            lines.push(format!("  - {}: {}", r.kind, r.name));
        }
        lines.push(format!("Estimated cost: ${:.2}/month", self.estimated_cost));
        lines.push(format!(
            "Estimated duration: {} minutes",
            self.estimated_duration_minutes
        ));
        lines.push(format!(
            "Requires approval: {}",
            if self.requires_approval { "yes" } else { "no" }
        ));
        lines.join("\n")
    }
}

/// Outcome of `execute()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityResult {
    pub capability_name: String,
    pub success: bool,
    pub message: String,
    #[serde(default)]
    pub resources_created: Vec<PlannedResource>,
    #[serde(default)]
    pub outputs: IndexMap<String, String>,
    #[serde(default)]
    pub error: Option<String>,
    pub duration_seconds: f64,
}

impl CapabilityResult {
    pub fn failed(capability_name: &str, message: &str, error: String, duration_seconds: f64) -> Self {
        Self {
            capability_name: capability_name.to_string(),
            success: false,
            message: message.to_string(),
            resources_created: Vec::new(),
            outputs: IndexMap::new(),
            error: Some(error),
            duration_seconds,
        }
    }

    /// Fixed-format summary of the outcome.
    pub fn to_summary(&self) -> String {
        let mut lines = vec![
            format!("Capability: {}", self.capability_name),
            format!("Status: {}", if self.success { "SUCCESS" } else { "FAILED" }),
            format!("Message: {}", self.message),
        ];
        if !self.resources_created.is_empty() {
            lines.push("Resources created:".to_string());
            for r in &self.resources_created {
                lines.push(format!("  - {}: {}", r.kind, r.name));
            }
        }
        if !self.outputs.is_empty() {
            lines.push("Outputs:".to_string());
            for (k, v) in &self.outputs {
                lines.push(format!("  {}: {}", k, v));
            }
        }
        if let Some(ref err) = self.error {
            lines.push(format!("Error: {}", err));
        }
        lines.push(format!("Duration: {:.1}s", self.duration_seconds));
        lines.join("\n")
    }
}

// ============================================================================
// Executor report
// ============================================================================

/// Captured output of one subprocess step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepLog {
    pub step: String,
    pub exit_code: i32,
    pub duration_seconds: f64,
    pub stdout: String,
    pub stderr: String,
}

/// What the executor did for one `execute_deployment` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub run_id: String,
    pub dry_run: bool,
    pub preview: String,
    pub change_summary: ChangeSummary,
    pub resources_created: u32,
    pub resources_destroyed: u32,
    /// `None` on dry runs: nothing was applied, so no outputs were read.
    pub outputs: Option<IndexMap<String, String>>,
    pub duration_seconds: f64,
    pub steps: Vec<StepLog>,
}

// ============================================================================
// Provenance events
// ============================================================================

/// Event appended to a working directory's JSONL log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DeploymentEvent {
    RunStarted {
        run_id: String,
        dry_run: bool,
        artifact_digest: String,
    },
    StepCompleted {
        run_id: String,
        step: String,
        exit_code: i32,
        duration_seconds: f64,
    },
    StepFailed {
        run_id: String,
        step: String,
        error: String,
        /// Absent when the step timed out or never started.
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        stdout: String,
        #[serde(default)]
        stderr: String,
    },
    RunCompleted {
        run_id: String,
        resources_created: u32,
        total_seconds: f64,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: DeploymentEvent,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> CapabilityPlan {
        let decision = InfrastructureDecision {
            name: "ml-team-prod".into(),
            resource_group_name: "rg-ml-team-prod".into(),
            region: "eastus".into(),
            sku: SkuTier::Premium,
            instance_size: InstanceSize::Large,
            driver_instance_type: "Standard_DS5_v2".into(),
            worker_instance_type: "Standard_NC24s_v3".into(),
            min_workers: 3,
            max_workers: 10,
            runtime_version: "13.3.x-gpu-ml-scala2.12".into(),
            idle_timeout_minutes: 120,
            enable_gpu: true,
            instance_pool: false,
            cost: CostBreakdown {
                compute: 1000.0,
                tier_fee: 150.0,
                storage: 200.0,
                total: 1350.0,
            },
            justification: "x".into(),
        };
        let mut artifacts = ArtifactSet::new();
        artifacts.insert("main.tf", "resource {}");
        CapabilityPlan {
            capability_name: "provision_databricks".into(),
            description: "Provision workspace".into(),
            resources: vec![
                PlannedResource::new("Resource Group", "rg-ml-team-prod"),
                PlannedResource::new("Databricks Workspace", "ml-team-prod").with("sku", "premium"),
            ],
            estimated_cost: 1350.0,
            estimated_duration_minutes: 15,
            requires_approval: true,
            created_at: "2026-02-16T14:00:00Z".into(),
            details: PlanDetails {
                artifact_digest: artifacts.digest(),
                decision,
                artifacts,
                working_dir: PathBuf::from("/tmp/ws"),
                preview: "Plan: 2 to add, 0 to change, 0 to destroy.".into(),
                change_summary: ChangeSummary {
                    add: 2,
                    change: 0,
                    destroy: 0,
                },
                environment: Environment::Prod,
                workload_type: WorkloadType::Ml,
                team: "ml-team".into(),
            },
        }
    }

    #[test]
    fn test_if002_environment_parse() {
        assert_eq!("prod".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("Production".parse::<Environment>().unwrap(), Environment::Prod);
        assert_eq!("dev".parse::<Environment>().unwrap(), Environment::Dev);
        assert!("qa".parse::<Environment>().is_err());
    }

    #[test]
    fn test_if002_workload_parse() {
        assert_eq!(
            "data-engineering".parse::<WorkloadType>().unwrap(),
            WorkloadType::DataEngineering
        );
        assert_eq!("ML".parse::<WorkloadType>().unwrap(), WorkloadType::Ml);
        assert!("gaming".parse::<WorkloadType>().is_err());
    }

    #[test]
    fn test_if002_sku_ordering() {
        assert!(SkuTier::Premium > SkuTier::Standard);
        assert_eq!(SkuTier::TOP, SkuTier::Premium);
        assert_eq!(SkuTier::LOWEST, SkuTier::Standard);
    }

    #[test]
    fn test_if002_instance_size_shift_clamps() {
        assert_eq!(InstanceSize::Medium.shift(-1), InstanceSize::Small);
        assert_eq!(InstanceSize::Small.shift(-1), InstanceSize::Small);
        assert_eq!(InstanceSize::Large.shift(2), InstanceSize::Large);
        assert_eq!(InstanceSize::Small.shift(0), InstanceSize::Small);
    }

    #[test]
    fn test_if002_builder_defaults() {
        let req = InfrastructureRequest::builder("analytics", Environment::Dev)
            .build()
            .unwrap();
        assert_eq!(req.region(), DEFAULT_REGION);
        assert_eq!(req.workload_type(), WorkloadType::DataEngineering);
        assert!(!req.enable_gpu());
        assert!(req.cost_limit().is_none());
        assert!(req.name().is_none());
    }

    #[test]
    fn test_if002_builder_rejects_empty_team() {
        let err = InfrastructureRequest::builder("  ", Environment::Dev)
            .build()
            .unwrap_err();
        assert!(matches!(err, DecisionError::InvalidRequest(_)));
    }

    #[test]
    fn test_if002_builder_rejects_hcl_metacharacters() {
        let err = InfrastructureRequest::builder(
            "ml\"\nresource \"null_resource\" \"evil\" {}\n#",
            Environment::Dev,
        )
        .build()
        .unwrap_err();
        assert!(err.to_string().contains("team"));

        let err = InfrastructureRequest::builder("ml", Environment::Dev)
            .region("eastus\\\"")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("region"));

        let ok = InfrastructureRequest::builder("Data Team_1", Environment::Dev)
            .region("East US-2")
            .build()
            .unwrap();
        assert_eq!(ok.team(), "Data Team_1");
    }

    #[test]
    fn test_if002_builder_rejects_negative_limit() {
        let err = InfrastructureRequest::builder("t", Environment::Dev)
            .cost_limit(Some(-5.0))
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("cost_limit"));
    }

    #[test]
    fn test_if002_builder_blank_name_is_none() {
        let req = InfrastructureRequest::builder("t", Environment::Dev)
            .name(Some("   ".into()))
            .build()
            .unwrap();
        assert!(req.name().is_none());
    }

    #[test]
    fn test_if002_artifact_digest_changes_with_content() {
        let mut a = ArtifactSet::new();
        a.insert("main.tf", "one");
        let d1 = a.digest();
        a.insert("main.tf", "two");
        let d2 = a.digest();
        assert!(d1.starts_with("blake3:"));
        assert_ne!(d1, d2);
    }

    #[test]
    fn test_if002_artifact_primary() {
        let mut a = ArtifactSet::new();
        assert_eq!(a.primary(), "");
        a.insert("variables.tf", "v");
        a.insert("main.tf", "m");
        assert_eq!(a.primary(), "m");
        assert_eq!(a.names(), vec!["variables.tf", "main.tf"]);
    }

    #[test]
    fn test_if002_context_param_coercion() {
        let ctx = CapabilityContext::new("provision_databricks", "need a workspace")
            .with_param("team", "ml")
            .with_param("enable_gpu", "yes")
            .with_param("cost_limit", "$2500")
            .with_param("empty", "  ");
        assert_eq!(ctx.param_str("team").as_deref(), Some("ml"));
        assert_eq!(ctx.param_bool("enable_gpu"), Some(true));
        assert_eq!(ctx.param_f64("cost_limit"), Some(2500.0));
        assert!(ctx.param_str("empty").is_none());
        assert!(ctx.param_str("missing").is_none());
    }

    #[test]
    fn test_if002_plan_summary_format() {
        let summary = sample_plan().to_summary();
        assert!(summary.starts_with("Capability: provision_databricks"));
        assert!(summary.contains("Resources to create:"));
        assert!(summary.contains("  - Resource Group: rg-ml-team-prod"));
        assert!(summary.contains("Estimated cost: $1350.00/month"));
        assert!(summary.contains("Estimated duration: 15 minutes"));
        assert!(summary.contains("Requires approval: yes"));
    }

    #[test]
    fn test_if002_result_summary_failed() {
        let r = CapabilityResult::failed("provision_databricks", "Deployment failed", "boom".into(), 2.5);
        let s = r.to_summary();
        assert!(s.contains("Status: FAILED"));
        assert!(s.contains("Error: boom"));
        assert!(s.contains("Duration: 2.5s"));
        assert!(!s.contains("Outputs:"));
    }

    #[test]
    fn test_if002_result_summary_success() {
        let mut outputs = IndexMap::new();
        outputs.insert("workspace_url".to_string(), "https://adb-1.net".to_string());
        let r = CapabilityResult {
            capability_name: "provision_databricks".into(),
            success: true,
            message: "ok".into(),
            resources_created: vec![PlannedResource::new("Resource Group", "rg-x")],
            outputs,
            error: None,
            duration_seconds: 10.0,
        };
        let s = r.to_summary();
        assert!(s.contains("Status: SUCCESS"));
        assert!(s.contains("Resources created:\n  - Resource Group: rg-x"));
        assert!(s.contains("Outputs:\n  workspace_url: https://adb-1.net"));
        assert!(!s.contains("Error:"));
    }

    #[test]
    fn test_if002_plan_yaml_roundtrip() {
        let plan = sample_plan();
        let yaml = serde_yaml_ng::to_string(&plan).unwrap();
        let back: CapabilityPlan = serde_yaml_ng::from_str(&yaml).unwrap();
        assert_eq!(back, plan);
    }

    #[test]
    fn test_if002_event_serde() {
        let event = DeploymentEvent::StepCompleted {
            run_id: "r-abc".into(),
            step: "init".into(),
            exit_code: 0,
            duration_seconds: 1.0,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"step_completed\""));
        assert!(json.contains("\"step\":\"init\""));
    }
}
