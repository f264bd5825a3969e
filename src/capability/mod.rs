//! IF-030: Capability trait and the engine that guards invocation.
//!
//! A capability turns a `CapabilityContext` into a `CapabilityPlan` without
//! touching anything outside its own working directory, then applies that
//! plan once a human has approved it. The engine only ever invokes names
//! present in the capability registry.

pub mod databricks;
pub mod feature_request;
pub mod lifecycle;

use crate::core::types::{CapabilityContext, CapabilityPlan, CapabilityResult};
use crate::error::{CapabilityError, PlanningError, RegistryError};
use crate::registry::capabilities::CapabilityRegistry;
use feature_request::FeatureRequestLog;
use indexmap::IndexMap;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// A side-effecting infrastructure operation with a plan/execute split.
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    fn required_parameters(&self) -> Vec<String>;

    /// Optional parameter names and the value used when absent.
    fn optional_parameters(&self) -> IndexMap<String, Value> {
        IndexMap::new()
    }

    /// Capability-specific checks. Empty means valid.
    fn validate(&self, _ctx: &CapabilityContext) -> Vec<String> {
        Vec::new()
    }

    fn plan(&self, ctx: &CapabilityContext) -> Result<CapabilityPlan, PlanningError>;

    /// Apply an approved plan. Failures come back as an unsuccessful result.
    fn execute(&self, plan: &CapabilityPlan) -> CapabilityResult;

    /// Best-effort undo of a failed execution. Returns whether anything
    /// was rolled back.
    fn rollback(&self, _result: &CapabilityResult) -> bool {
        false
    }
}

/// Fallback that recovers missing required parameters from free text,
/// typically by asking a language model.
pub trait ParameterExtractor: Send + Sync {
    /// Values for as many of `missing` as can be found in `request`.
    fn extract(&self, request: &str, missing: &[String]) -> IndexMap<String, Value>;
}

fn is_present(ctx: &CapabilityContext, key: &str) -> bool {
    match ctx.parameters.get(key) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
    }
}

/// Required parameter names absent from `ctx`.
pub fn missing_parameters(capability: &dyn Capability, ctx: &CapabilityContext) -> Vec<String> {
    capability
        .required_parameters()
        .into_iter()
        .filter(|p| !is_present(ctx, p))
        .collect()
}

/// Complete `ctx` for planning.
///
/// Optional parameters take their defaults; required ones the caller left
/// out are requested from `extractor` when one is configured. Anything
/// still missing fails with `MissingParameter`. The completed context is
/// validated again, since extracted values never passed the caller's check.
pub fn prepare_context(
    capability: &dyn Capability,
    ctx: &CapabilityContext,
    extractor: Option<&dyn ParameterExtractor>,
) -> Result<CapabilityContext, PlanningError> {
    let mut ctx = ctx.clone();
    for (key, default) in capability.optional_parameters() {
        if !is_present(&ctx, &key) && !default.is_null() {
            ctx.parameters.insert(key, default);
        }
    }

    let mut missing = missing_parameters(capability, &ctx);
    if !missing.is_empty() {
        if let Some(extractor) = extractor {
            debug!(capability = capability.name(), ?missing, "asking extractor");
            for (key, value) in extractor.extract(&ctx.user_request, &missing) {
                if missing.contains(&key) {
                    ctx.parameters.insert(key, value);
                }
            }
            missing = missing_parameters(capability, &ctx);
        }
    }
    if !missing.is_empty() {
        return Err(PlanningError::MissingParameter(missing));
    }
    let errors = capability.validate(&ctx);
    if !errors.is_empty() {
        return Err(PlanningError::Validation(errors));
    }
    Ok(ctx)
}

// ============================================================================
// Engine
// ============================================================================

/// Name → installed capability, gated by the capability registry.
pub struct CapabilityEngine {
    registry: Arc<CapabilityRegistry>,
    installed: IndexMap<String, Arc<dyn Capability>>,
    feature_log: Option<Mutex<FeatureRequestLog>>,
}

impl std::fmt::Debug for CapabilityEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityEngine")
            .field("registered", &self.registry.valid_names())
            .field("installed", &self.installed())
            .finish_non_exhaustive()
    }
}

impl CapabilityEngine {
    pub fn new(registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            registry,
            installed: IndexMap::new(),
            feature_log: None,
        }
    }

    /// Record requests for unknown capabilities in `log`.
    pub fn with_feature_log(mut self, log: FeatureRequestLog) -> Self {
        self.feature_log = Some(Mutex::new(log));
        self
    }

    /// Install a handler under its own name.
    pub fn install(&mut self, capability: Arc<dyn Capability>) -> Result<(), RegistryError> {
        let name = capability.name().to_string();
        if self.installed.contains_key(&name) {
            return Err(RegistryError::RegistrationConflict {
                kind: "capability handler",
                name,
            });
        }
        if !self.registry.contains(&name) {
            warn!(capability = %name, "installed handler has no registry entry; it cannot run");
        }
        debug!(capability = %name, "capability installed");
        self.installed.insert(name, capability);
        Ok(())
    }

    pub fn installed(&self) -> Vec<&str> {
        self.installed.keys().map(String::as_str).collect()
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Registered and installed handler for `name`.
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Capability>, CapabilityError> {
        self.registry.lookup(name)?;
        self.installed
            .get(name)
            .cloned()
            .ok_or_else(|| CapabilityError::NotInstalled {
                name: name.to_string(),
            })
    }

    /// Validate `ctx` and plan it with the capability it names.
    pub fn plan(&self, ctx: &CapabilityContext) -> Result<CapabilityPlan, PlanningError> {
        let capability = match self.resolve(&ctx.capability_name) {
            Ok(c) => c,
            Err(e) => {
                if matches!(e, CapabilityError::UnknownCapability { .. }) {
                    self.record_unsupported(ctx);
                }
                return Err(e.into());
            }
        };
        let errors = capability.validate(ctx);
        if !errors.is_empty() {
            return Err(PlanningError::Validation(errors));
        }
        info!(capability = %ctx.capability_name, "planning");
        capability.plan(ctx)
    }

    /// Execute an approved plan.
    pub fn execute(&self, plan: &CapabilityPlan) -> Result<CapabilityResult, CapabilityError> {
        let capability = self.resolve(&plan.capability_name)?;
        info!(capability = %plan.capability_name, "executing");
        let result = capability.execute(plan);
        if !result.success {
            warn!(
                capability = %plan.capability_name,
                error = result.error.as_deref().unwrap_or(""),
                "execution failed"
            );
        }
        Ok(result)
    }

    pub fn rollback(&self, result: &CapabilityResult) -> Result<bool, CapabilityError> {
        let capability = self.resolve(&result.capability_name)?;
        Ok(capability.rollback(result))
    }

    fn record_unsupported(&self, ctx: &CapabilityContext) {
        let Some(log) = &self.feature_log else {
            return;
        };
        let requester = ctx
            .metadata
            .get("requester")
            .map(String::as_str)
            .unwrap_or("unknown");
        let pattern = ctx.metadata.get("attempted_pattern").map(String::as_str);
        match log.lock() {
            Ok(mut log) => {
                if let Err(e) = log.record(&ctx.capability_name, requester, &ctx.user_request, pattern) {
                    warn!(error = %e, "cannot persist feature request");
                }
            }
            Err(_) => warn!("feature request log lock poisoned"),
        }
    }

    /// Snapshot of the feature request log, if one is attached.
    pub fn feature_requests(&self) -> Option<FeatureRequestLog> {
        self.feature_log
            .as_ref()
            .and_then(|m| m.lock().ok().map(|log| log.clone()))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::core::decision;
    use crate::core::policy::DecisionPolicy;
    use crate::core::types::{
        ArtifactSet, ChangeSummary, Environment, InfrastructureRequest, PlanDetails,
        PlannedResource, WorkloadType,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Capability that records calls and never leaves memory.
    pub struct StubCapability {
        pub name: String,
        pub fail_execute: bool,
        pub can_rollback: bool,
        pub executions: AtomicUsize,
    }

    impl StubCapability {
        pub fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_execute: false,
                can_rollback: false,
                executions: AtomicUsize::new(0),
            }
        }
    }

    pub fn sample_plan(name: &str) -> CapabilityPlan {
        let request = InfrastructureRequest::builder("t", Environment::Dev)
            .build()
            .unwrap();
        let decision = decision::decide(&request, &DecisionPolicy::default()).unwrap();
        CapabilityPlan {
            capability_name: name.to_string(),
            description: "stub".into(),
            resources: vec![PlannedResource::new("Stub", "thing")],
            estimated_cost: 1.0,
            estimated_duration_minutes: 1,
            requires_approval: true,
            created_at: "2026-01-01T00:00:00Z".into(),
            details: PlanDetails {
                decision,
                artifacts: ArtifactSet::new(),
                artifact_digest: String::new(),
                working_dir: std::path::PathBuf::from("/nonexistent"),
                preview: String::new(),
                change_summary: ChangeSummary::default(),
                environment: Environment::Dev,
                workload_type: WorkloadType::DataEngineering,
                team: "t".into(),
            },
        }
    }

    impl Capability for StubCapability {
        fn name(&self) -> &str {
            &self.name
        }

        fn description(&self) -> &str {
            "stub"
        }

        fn required_parameters(&self) -> Vec<String> {
            vec!["team".into()]
        }

        fn optional_parameters(&self) -> IndexMap<String, Value> {
            let mut m = IndexMap::new();
            m.insert("size".to_string(), Value::from("small"));
            m.insert("label".to_string(), Value::Null);
            m
        }

        fn validate(&self, ctx: &CapabilityContext) -> Vec<String> {
            match ctx.param_str("team") {
                Some(t) if t.contains(' ') => vec![format!("team '{}' contains spaces", t)],
                _ => Vec::new(),
            }
        }

        fn plan(&self, ctx: &CapabilityContext) -> Result<CapabilityPlan, PlanningError> {
            prepare_context(self, ctx, None)?;
            Ok(sample_plan(&self.name))
        }

        fn execute(&self, plan: &CapabilityPlan) -> CapabilityResult {
            self.executions.fetch_add(1, Ordering::SeqCst);
            if self.fail_execute {
                return CapabilityResult::failed(&self.name, "stub failed", "boom".into(), 0.0);
            }
            CapabilityResult {
                capability_name: self.name.clone(),
                success: true,
                message: "ok".into(),
                resources_created: plan.resources.clone(),
                outputs: IndexMap::new(),
                error: None,
                duration_seconds: 0.0,
            }
        }

        fn rollback(&self, _result: &CapabilityResult) -> bool {
            self.can_rollback
        }
    }
}
