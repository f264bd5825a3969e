//! IF-033: Azure Databricks workspace capability.
//!
//! `plan` runs the whole pipeline up to a terraform preview: request,
//! decision, generated artifacts, dry run in `<root>/<name>_plan/`. The
//! resulting plan is persisted next to the artifacts so a later process can
//! execute it. `execute` takes its inputs from the plan alone and refuses to
//! run when the artifacts, in the plan or on disk, changed since planning.

use super::{prepare_context, Capability, ParameterExtractor};
use crate::core::executor::Executor;
use crate::core::parser::InfraforgeConfig;
use crate::core::policy::DecisionPolicy;
use crate::core::types::{
    CapabilityContext, CapabilityPlan, CapabilityResult, Environment, InfrastructureRequest,
    PlanDetails, SkuTier, WorkloadType,
};
use crate::core::{codegen, decision, state};
use crate::error::{DecisionError, PlanningError};
use crate::resources;
use crate::tripwire::{eventlog, hasher};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub const NAME: &str = "provision_databricks";

/// Typical end-to-end apply time for a workspace plus cluster.
pub const ESTIMATED_DURATION_MINUTES: u32 = 15;

pub struct DatabricksCapability {
    policy: DecisionPolicy,
    executor: Executor,
    workspace_root: PathBuf,
    extractor: Option<Arc<dyn ParameterExtractor>>,
}

impl std::fmt::Debug for DatabricksCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabricksCapability")
            .field("workspace_root", &self.workspace_root)
            .field("executor", &self.executor)
            .field("extractor", &self.extractor.is_some())
            .finish_non_exhaustive()
    }
}

impl DatabricksCapability {
    pub fn new(policy: DecisionPolicy, executor: Executor, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            policy,
            executor,
            workspace_root: workspace_root.into(),
            extractor: None,
        }
    }

    pub fn from_config(config: &InfraforgeConfig) -> Self {
        Self::new(
            config.policy.clone(),
            Executor::new(config.executor.clone()),
            config.workspace_root.clone(),
        )
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn ParameterExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }
}

fn parse_param<T>(ctx: &CapabilityContext, key: &str) -> Result<Option<T>, DecisionError>
where
    T: std::str::FromStr<Err = DecisionError>,
{
    ctx.param_str(key).map(|s| s.parse()).transpose()
}

/// Build the immutable request from a prepared context.
pub fn build_request(ctx: &CapabilityContext) -> Result<InfrastructureRequest, PlanningError> {
    let team = ctx
        .param_str("team")
        .ok_or_else(|| PlanningError::MissingParameter(vec!["team".into()]))?;
    let environment: Environment = parse_param(ctx, "environment")?
        .ok_or_else(|| PlanningError::MissingParameter(vec!["environment".into()]))?;
    let region = ctx
        .param_str("region")
        .ok_or_else(|| PlanningError::MissingParameter(vec!["region".into()]))?;
    let workload_type: WorkloadType = parse_param(ctx, "workload_type")?.unwrap_or_default();
    let sku: Option<SkuTier> = parse_param(ctx, "sku")?;

    if ctx.parameters.contains_key("cost_limit") && ctx.param_f64("cost_limit").is_none() {
        return Err(PlanningError::Validation(vec![
            "cost_limit must be a number".to_string(),
        ]));
    }

    let request = InfrastructureRequest::builder(team, environment)
        .region(region)
        .workload_type(workload_type)
        .enable_gpu(ctx.param_bool("enable_gpu").unwrap_or(false))
        .cost_limit(ctx.param_f64("cost_limit"))
        .name(ctx.param_str("workspace_name"))
        .sku_override(sku)
        .instance_pool(ctx.param_bool("instance_pool_enabled").unwrap_or(false))
        .additional_requirements(ctx.param_str("additional_requirements"))
        .build()?;
    Ok(request)
}

impl Capability for DatabricksCapability {
    fn name(&self) -> &str {
        NAME
    }

    fn description(&self) -> &str {
        "Provision Azure Databricks workspace with compute infrastructure"
    }

    fn required_parameters(&self) -> Vec<String> {
        vec!["team".into(), "environment".into(), "region".into()]
    }

    fn optional_parameters(&self) -> IndexMap<String, Value> {
        let mut m = IndexMap::new();
        m.insert("workspace_name".to_string(), Value::Null);
        m.insert("enable_gpu".to_string(), Value::Bool(false));
        m.insert(
            "workload_type".to_string(),
            Value::from(WorkloadType::default().as_str()),
        );
        m.insert("instance_pool_enabled".to_string(), Value::Bool(false));
        m.insert("cost_limit".to_string(), Value::Null);
        m.insert("sku".to_string(), Value::Null);
        m
    }

    fn validate(&self, ctx: &CapabilityContext) -> Vec<String> {
        let mut errors = Vec::new();
        if let Err(e) = parse_param::<Environment>(ctx, "environment") {
            errors.push(e.to_string());
        }
        if let Err(e) = parse_param::<WorkloadType>(ctx, "workload_type") {
            errors.push(e.to_string());
        }
        if let Err(e) = parse_param::<SkuTier>(ctx, "sku") {
            errors.push(e.to_string());
        }
        if let Some(team) = ctx.param_str("team") {
            if !team
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' '))
            {
                errors.push(format!(
                    "team '{}' may only contain letters, digits, '-', '_' and spaces",
                    team
                ));
            }
        }
        errors
    }

    fn plan(&self, ctx: &CapabilityContext) -> Result<CapabilityPlan, PlanningError> {
        let ctx = prepare_context(self, ctx, self.extractor.as_deref())?;
        let request = build_request(&ctx)?;
        let decision = decision::decide(&request, &self.policy)?;

        let selection = resources::default_selection(&decision);
        let artifacts = codegen::generate(
            &selection,
            &decision,
            request.environment(),
            request.workload_type(),
            request.team(),
        )?;
        let resources = codegen::planned_resources(&selection, &decision)?;

        let working_dir = state::working_dir(&self.workspace_root, &decision.name);
        let preview = self
            .executor
            .execute_deployment(&artifacts, &working_dir, false, true)?;

        let plan = CapabilityPlan {
            capability_name: NAME.to_string(),
            description: format!(
                "Provision Databricks workspace for {} team ({} environment)",
                request.team(),
                request.environment()
            ),
            resources,
            estimated_cost: decision.cost.total,
            estimated_duration_minutes: ESTIMATED_DURATION_MINUTES,
            requires_approval: true,
            created_at: eventlog::now_iso8601(),
            details: PlanDetails {
                artifact_digest: artifacts.digest(),
                artifacts,
                working_dir,
                preview: preview.preview,
                change_summary: preview.change_summary,
                environment: request.environment(),
                workload_type: request.workload_type(),
                team: request.team().to_string(),
                decision,
            },
        };
        let path = state::save_plan(&plan)?;
        info!(
            name = %plan.details.decision.name,
            cost = plan.estimated_cost,
            changes = %plan.details.change_summary,
            path = %path.display(),
            "plan ready"
        );
        Ok(plan)
    }

    fn execute(&self, plan: &CapabilityPlan) -> CapabilityResult {
        let start = Instant::now();
        let details = &plan.details;

        let actual = details.artifacts.digest();
        if actual != details.artifact_digest {
            warn!(expected = %details.artifact_digest, %actual, "artifacts changed since plan");
            return CapabilityResult::failed(
                NAME,
                "Generated artifacts changed since planning; re-plan before deploying",
                format!(
                    "artifact digest mismatch: planned {}, found {}",
                    details.artifact_digest, actual
                ),
                start.elapsed().as_secs_f64(),
            );
        }

        if details.working_dir.exists() {
            let names = details.artifacts.names();
            let found = hasher::hash_named_files(&details.working_dir, &names);
            if found.as_deref() != Ok(details.artifact_digest.as_str()) {
                let error = match found {
                    Ok(on_disk) => format!(
                        "working directory digest mismatch: planned {}, found {}",
                        details.artifact_digest, on_disk
                    ),
                    Err(reason) => reason,
                };
                warn!(dir = %details.working_dir.display(), %error, "working directory edited since plan");
                return CapabilityResult::failed(
                    NAME,
                    "Working directory files were edited since planning; re-plan before deploying",
                    error,
                    start.elapsed().as_secs_f64(),
                );
            }
        }

        match self
            .executor
            .execute_deployment(&details.artifacts, &details.working_dir, true, false)
        {
            Ok(report) => {
                let mut outputs = report.outputs.unwrap_or_default();
                outputs
                    .entry("resource_group".to_string())
                    .or_insert_with(|| details.decision.resource_group_name.clone());
                CapabilityResult {
                    capability_name: NAME.to_string(),
                    success: true,
                    message: "Successfully deployed Databricks workspace".to_string(),
                    resources_created: plan.resources.clone(),
                    outputs,
                    error: None,
                    duration_seconds: start.elapsed().as_secs_f64(),
                }
            }
            Err(e) => {
                let mut result = CapabilityResult::failed(
                    NAME,
                    "Failed to deploy Databricks workspace",
                    e.detailed(),
                    start.elapsed().as_secs_f64(),
                );
                if let Some(captured) = e.captured() {
                    result
                        .outputs
                        .insert("failed_step".to_string(), captured.step.to_string());
                    if let Some(code) = captured.exit_code {
                        result.outputs.insert("exit_code".to_string(), code.to_string());
                    }
                }
                result
            }
        }
    }
}
