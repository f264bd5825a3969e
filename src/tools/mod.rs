//! IF-040: Built-in tools exposed to an external planner.
//!
//! Every tool returns JSON text. Validation failures that a planner can
//! correct (unknown capability names) come back as `"status": "error"`
//! payloads listing the valid alternatives, not as `ToolError`s.

use crate::capability::databricks;
use crate::core::decision;
use crate::core::policy::DecisionPolicy;
use crate::core::types::{Environment, InfrastructureRequest, WorkloadType};
use crate::error::{RegistryError, ToolError};
use crate::registry::capabilities::CapabilityRegistry;
use crate::registry::tools::ToolRegistry;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

fn encode(name: &str, value: Value) -> Result<String, ToolError> {
    serde_json::to_string(&value).map_err(|e| ToolError::Execution {
        name: name.to_string(),
        reason: e.to_string(),
    })
}

fn unknown_capability(registry: &CapabilityRegistry, errors: Vec<String>) -> Value {
    json!({
        "status": "error",
        "errors": errors,
        "valid_capabilities": registry.valid_names(),
        "hint": "Use exact capability names from the available list",
    })
}

// ============================================================================
// select_capabilities
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectCapabilitiesArgs {
    /// Capability identifiers; must match names from the registry exactly.
    pub capabilities: Vec<String>,
    /// Why these capabilities were selected.
    #[serde(default)]
    pub rationale: String,
}

/// Confirm a capability selection against the registry.
pub fn select_capabilities(
    registry: &CapabilityRegistry,
    args: SelectCapabilitiesArgs,
) -> Result<String, ToolError> {
    let mut validated = Vec::new();
    let mut errors = Vec::new();
    for name in &args.capabilities {
        match registry.lookup(name) {
            Ok(info) => validated.push(json!({
                "name": name,
                "display_name": info.display_name,
                "description": info.description,
            })),
            Err(e) => errors.push(e.to_string()),
        }
    }
    if !errors.is_empty() {
        return encode("select_capabilities", unknown_capability(registry, errors));
    }
    encode(
        "select_capabilities",
        json!({
            "status": "success",
            "count": validated.len(),
            "capabilities": validated,
            "rationale": args.rationale,
            "next_steps": "Gather configuration details for each capability",
        }),
    )
}

// ============================================================================
// suggest_naming
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SuggestNamingArgs {
    /// Team name, e.g. "ml" or "data-eng".
    pub team: String,
    /// Environment: dev, staging or prod.
    pub environment: String,
    /// Resource type: resource_group, workspace, storage, or anything else.
    pub resource_type: String,
}

/// Azure-style naming suggestions for one resource.
pub fn suggest_naming(args: SuggestNamingArgs) -> Result<String, ToolError> {
    let team = args
        .team
        .trim()
        .to_lowercase()
        .replace([' ', '_'], "-");
    let env: String = args.environment.trim().to_lowercase().chars().take(4).collect();

    let (primary, alternatives) = match args.resource_type.as_str() {
        "resource_group" => (
            format!("rg-{}-{}", team, env),
            vec![
                format!("rg-{}-{}-001", team, env),
                format!("rg-databricks-{}-{}", team, env),
                format!("{}-{}-rg", team, env),
            ],
        ),
        "workspace" => (
            format!("{}-{}", team, env),
            vec![
                format!("dbw-{}-{}", team, env),
                format!("{}-databricks-{}", team, env),
                format!("{}-workspace-{}", team, env),
            ],
        ),
        "storage" => {
            // storage accounts: lowercase alphanumerics only, at most 24 chars
            let short: String = team.replace('-', "").chars().take(8).collect();
            (
                format!("sa{}{}001", short, env),
                vec![format!("st{}{}", short, env), format!("{}{}storage", short, env)],
            )
        }
        other => (format!("{}-{}-{}", team, env, other), Vec::new()),
    };

    encode(
        "suggest_naming",
        json!({
            "primary": primary,
            "alternatives": alternatives,
            "pattern_info": {
                "follows_azure_conventions": true,
                "pattern": "resource_type-team-environment",
                "example": primary,
            },
        }),
    )
}

// ============================================================================
// estimate_cost
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EstimateCostArgs {
    /// Capability name, e.g. "provision_databricks".
    pub capability: String,
    /// Whether GPU instances are needed.
    #[serde(default)]
    pub enable_gpu: bool,
    /// Workload type: data_engineering, ml, analytics, data_science or etl.
    pub workload_type: Option<String>,
    /// Environment to price; defaults to dev.
    pub environment: Option<String>,
}

/// Monthly cost estimate from the same policy tables the decision engine uses.
pub fn estimate_cost(
    registry: &CapabilityRegistry,
    policy: &DecisionPolicy,
    args: EstimateCostArgs,
) -> Result<String, ToolError> {
    const NAME: &str = "estimate_cost";
    let invalid = |reason: String| ToolError::InvalidArguments {
        name: NAME.to_string(),
        reason,
    };

    if let Err(e) = registry.lookup(&args.capability) {
        return encode(NAME, unknown_capability(registry, vec![e.to_string()]));
    }
    if args.capability != databricks::NAME {
        return encode(
            NAME,
            json!({
                "capability": args.capability,
                "status": "unavailable",
                "notes": ["No pricing model for this capability"],
            }),
        );
    }

    let environment: Environment = match &args.environment {
        Some(e) => e.parse().map_err(|e: crate::error::DecisionError| invalid(e.to_string()))?,
        None => Environment::Dev,
    };
    let workload_type: WorkloadType = match &args.workload_type {
        Some(w) => w.parse().map_err(|e: crate::error::DecisionError| invalid(e.to_string()))?,
        None => WorkloadType::default(),
    };
    let request = InfrastructureRequest::builder("estimate", environment)
        .workload_type(workload_type)
        .enable_gpu(args.enable_gpu)
        .build()
        .map_err(|e| invalid(e.to_string()))?;
    let decision = decision::decide(&request, policy).map_err(|e| ToolError::Execution {
        name: NAME.to_string(),
        reason: e.to_string(),
    })?;

    let cost = &decision.cost;
    encode(
        NAME,
        json!({
            "capability": args.capability,
            "environment": environment.as_str(),
            "workload_type": workload_type.as_str(),
            "monthly_estimate": cost.total,
            "currency": "USD",
            "breakdown": [
                {
                    "item": format!("Cluster compute ({})", decision.worker_instance_type),
                    "cost": cost.compute,
                    "note": format!(
                        "{}-{} workers, {} tier DBUs",
                        decision.min_workers, decision.max_workers, decision.sku
                    ),
                },
                {"item": "Workspace tier fee", "cost": cost.tier_fee, "note": decision.sku.as_str()},
                {"item": "Storage", "cost": cost.storage, "note": "Workspace-managed storage"},
            ],
            "confidence": "medium",
            "notes": [
                "Estimates assume average autoscaling between min and max workers",
                "Actual costs vary with usage",
                "Egress and ingress bandwidth not included",
            ],
        }),
    )
}

// ============================================================================
// execute_deployment
// ============================================================================

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteDeploymentArgs {
    /// Capability to execute, e.g. "provision_databricks".
    pub capability_name: String,
    /// Team name.
    pub team: String,
    /// Environment: dev, staging or prod.
    pub environment: String,
    /// Azure region, e.g. "eastus".
    pub region: String,
    /// Workspace name.
    pub workspace_name: Option<String>,
    /// Enable GPU support.
    #[serde(default)]
    pub enable_gpu: bool,
    /// Workload type: data_engineering, ml, analytics, data_science or etl.
    pub workload_type: Option<String>,
}

/// Signal that the user approved a deployment.
///
/// The tool itself never touches infrastructure: it confirms the capability
/// exists and echoes the approved parameters for the caller to hand to the
/// capability engine.
pub fn execute_deployment(
    registry: &CapabilityRegistry,
    args: ExecuteDeploymentArgs,
) -> Result<String, ToolError> {
    if let Err(e) = registry.lookup(&args.capability_name) {
        return encode(
            "execute_deployment",
            unknown_capability(registry, vec![e.to_string()]),
        );
    }
    encode(
        "execute_deployment",
        json!({
            "status": "executing",
            "capability": args.capability_name,
            "message": "Deployment approved and handed to the capability engine",
            "parameters": {
                "team": args.team,
                "environment": args.environment,
                "region": args.region,
                "workspace_name": args.workspace_name,
                "enable_gpu": args.enable_gpu,
                "workload_type": args.workload_type.unwrap_or_else(|| WorkloadType::default().to_string()),
            },
        }),
    )
}

// ============================================================================
// Registration
// ============================================================================

/// Register every built-in tool into `tools`.
pub fn register_builtins(
    tools: &mut ToolRegistry,
    capabilities: Arc<CapabilityRegistry>,
    policy: Arc<DecisionPolicy>,
) -> Result<(), RegistryError> {
    let caps = Arc::clone(&capabilities);
    tools.register(
        "execute_deployment",
        "REQUIRED after user approval: hand the approved parameters to the capability engine",
        move |args: ExecuteDeploymentArgs| execute_deployment(&caps, args),
    )?;

    let caps = Arc::clone(&capabilities);
    tools.register(
        "select_capabilities",
        "Select required infrastructure capabilities by exact registry name",
        move |args: SelectCapabilitiesArgs| select_capabilities(&caps, args),
    )?;

    tools.register(
        "suggest_naming",
        "Generate resource naming suggestions following Azure conventions",
        suggest_naming,
    )?;

    let caps = Arc::clone(&capabilities);
    tools.register(
        "estimate_cost",
        "Estimate monthly infrastructure cost for a capability",
        move |args: EstimateCostArgs| estimate_cost(&caps, &policy, args),
    )?;
    Ok(())
}

/// Fresh tool registry holding the built-ins.
pub fn builtin_registry(
    capabilities: Arc<CapabilityRegistry>,
    policy: Arc<DecisionPolicy>,
) -> Result<ToolRegistry, RegistryError> {
    let mut tools = ToolRegistry::new();
    register_builtins(&mut tools, capabilities, policy)?;
    Ok(tools)
}
