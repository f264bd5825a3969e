//! IF-050: CLI subcommands: init, validate, capabilities, tools, decide,
//! plan, apply, destroy, unlock.

use crate::capability::databricks::{self, DatabricksCapability};
use crate::capability::feature_request::FeatureRequestLog;
use crate::capability::lifecycle::Deployment;
use crate::capability::CapabilityEngine;
use crate::core::executor::Executor;
use crate::core::parser::{self, InfraforgeConfig};
use crate::core::types::{
    CapabilityContext, CapabilityPlan, InfrastructureDecision, InfrastructureRequest,
};
use crate::core::state::{self, RunLock};
use crate::core::decision;
use crate::registry::capabilities::CapabilityRegistry;
use crate::tools;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new infraforge project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate infraforge.yaml without running terraform
    Validate {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,
    },

    /// List registered capabilities
    Capabilities {
        /// One line per capability
        #[arg(long)]
        concise: bool,

        /// Only capabilities whose keywords appear in this text
        #[arg(long)]
        search: Option<String>,
    },

    /// List built-in tools, or call one
    Tools {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,

        /// Print function-calling schemas as JSON
        #[arg(long)]
        schemas: bool,

        /// Tool to call
        #[arg(long)]
        call: Option<String>,

        /// JSON arguments for --call
        #[arg(long, default_value = "{}")]
        args: String,
    },

    /// Show the configuration decision for a request (no side effects)
    Decide {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Generate terraform and preview it; saves the plan for `apply`
    Plan {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,

        /// Capability to plan
        #[arg(long, default_value = databricks::NAME)]
        capability: String,

        /// Free-text request, recorded with the plan
        #[arg(long, default_value = "")]
        request_text: String,

        #[command(flatten)]
        request: RequestArgs,
    },

    /// Apply a saved plan
    Apply {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,

        /// Deployment name (the `<name>_plan` working directory)
        name: String,

        /// Approve the plan without prompting
        #[arg(long)]
        yes: bool,
    },

    /// Destroy everything a deployment created
    Destroy {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,

        /// Deployment name (the `<name>_plan` working directory)
        name: String,

        /// Confirm the teardown
        #[arg(long)]
        yes: bool,
    },

    /// Remove a deployment's run lock left by an interrupted run
    Unlock {
        /// Path to infraforge.yaml
        #[arg(short, long, default_value = parser::CONFIG_FILE)]
        file: PathBuf,

        /// Deployment name (the `<name>_plan` working directory)
        name: String,
    },
}

/// Request parameters shared by `decide` and `plan`.
#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Owning team
    #[arg(long)]
    pub team: String,

    /// Environment: dev, staging or prod
    #[arg(short, long)]
    pub environment: String,

    /// Azure region (default: config default_region)
    #[arg(long)]
    pub region: Option<String>,

    /// Workload type: data_engineering, ml, analytics, data_science, etl
    #[arg(long)]
    pub workload_type: Option<String>,

    /// Use GPU instances
    #[arg(long)]
    pub gpu: bool,

    /// Monthly cost ceiling in USD
    #[arg(long)]
    pub cost_limit: Option<f64>,

    /// Workspace name (default: <team>-<environment>)
    #[arg(long)]
    pub name: Option<String>,

    /// Force a SKU tier: standard or premium
    #[arg(long)]
    pub sku: Option<String>,

    /// Back the cluster with an instance pool
    #[arg(long)]
    pub instance_pool: bool,
}

impl RequestArgs {
    fn to_context(
        &self,
        capability: &str,
        request_text: &str,
        default_region: &str,
    ) -> CapabilityContext {
        let mut ctx = CapabilityContext::new(capability, request_text)
            .with_param("team", self.team.as_str())
            .with_param("environment", self.environment.as_str())
            .with_param(
                "region",
                self.region.as_deref().unwrap_or(default_region),
            )
            .with_param("enable_gpu", self.gpu)
            .with_param("instance_pool_enabled", self.instance_pool)
            .with_metadata("requester", "cli");
        if let Some(w) = &self.workload_type {
            ctx = ctx.with_param("workload_type", w.as_str());
        }
        if let Some(limit) = self.cost_limit {
            ctx = ctx.with_param("cost_limit", limit);
        }
        if let Some(name) = &self.name {
            ctx = ctx.with_param("workspace_name", name.as_str());
        }
        if let Some(sku) = &self.sku {
            ctx = ctx.with_param("sku", sku.as_str());
        }
        ctx
    }
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Capabilities { concise, search } => cmd_capabilities(concise, search.as_deref()),
        Commands::Tools {
            file,
            schemas,
            call,
            args,
        } => cmd_tools(&file, schemas, call.as_deref(), &args),
        Commands::Decide { file, request } => cmd_decide(&file, &request),
        Commands::Plan {
            file,
            capability,
            request_text,
            request,
        } => cmd_plan(&file, &capability, &request_text, &request),
        Commands::Apply { file, name, yes } => cmd_apply(&file, &name, yes),
        Commands::Destroy { file, name, yes } => cmd_destroy(&file, &name, yes),
        Commands::Unlock { file, name } => cmd_unlock(&file, &name),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join(parser::CONFIG_FILE);
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let workspace_root = path.join("workspaces");
    std::fs::create_dir_all(&workspace_root)
        .map_err(|e| format!("cannot create workspace root: {}", e))?;

    let template = r#"version: "1.0"
workspace_root: workspaces
default_region: eastus
# feature_request_log: feature_requests.yaml

executor:
  binary: terraform
  init_timeout_secs: 300
  plan_timeout_secs: 600
  apply_timeout_secs: 3600

# policy: instance tables, pricing and worker bounds; defaults apply when absent
"#;
    std::fs::write(&config_path, template)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    println!("Initialized infraforge project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}/", workspace_root.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: {} (workspace root {}, terraform '{}')",
            file.display(),
            config.workspace_root.display(),
            config.executor.binary
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Load and validate the config; a missing file means defaults.
fn load_config(file: &Path) -> Result<InfraforgeConfig, String> {
    let mut config = parser::load_or_default(file).map_err(|e| e.to_string())?;
    let errors = parser::validate_config(&config);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        return Err("validation failed".to_string());
    }
    // relative roots resolve against the config file's directory
    if config.workspace_root.is_relative() {
        if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.workspace_root = parent.join(&config.workspace_root);
        }
    }
    if let Some(log) = &config.feature_request_log {
        if log.is_relative() {
            if let Some(parent) = file.parent().filter(|p| !p.as_os_str().is_empty()) {
                config.feature_request_log = Some(parent.join(log));
            }
        }
    }
    Ok(config)
}

/// Registry, installed capabilities, and feature log for a config.
fn build_engine(config: &InfraforgeConfig) -> Result<CapabilityEngine, String> {
    let registry = Arc::new(CapabilityRegistry::with_defaults());
    let mut engine = CapabilityEngine::new(registry);
    if let Some(path) = &config.feature_request_log {
        let log = FeatureRequestLog::open(path).map_err(|e| e.to_string())?;
        engine = engine.with_feature_log(log);
    }
    engine
        .install(Arc::new(DatabricksCapability::from_config(config)))
        .map_err(|e| e.to_string())?;
    Ok(engine)
}

fn cmd_capabilities(concise: bool, search: Option<&str>) -> Result<(), String> {
    let registry = CapabilityRegistry::with_defaults();
    if let Some(query) = search {
        let matches = registry.search_by_keywords(query);
        if matches.is_empty() {
            println!("No capability matches '{}'", query);
        }
        for name in matches {
            println!("{}", name);
        }
        return Ok(());
    }
    if concise {
        println!("{}", registry.describe_concise());
    } else {
        println!("{}", registry.describe_all());
    }
    Ok(())
}

fn cmd_tools(file: &Path, schemas: bool, call: Option<&str>, args: &str) -> Result<(), String> {
    let config = load_config(file)?;
    let tools = tools::builtin_registry(
        Arc::new(CapabilityRegistry::with_defaults()),
        Arc::new(config.policy),
    )
    .map_err(|e| e.to_string())?;

    if let Some(name) = call {
        let args: serde_json::Value =
            serde_json::from_str(args).map_err(|e| format!("invalid --args JSON: {}", e))?;
        let out = tools.dispatch(name, args).map_err(|e| e.to_string())?;
        println!("{}", out);
        return Ok(());
    }
    if schemas {
        let text = serde_json::to_string_pretty(&tools.get_schemas())
            .map_err(|e| format!("JSON serialize error: {}", e))?;
        println!("{}", text);
        return Ok(());
    }
    for name in tools.list_tools() {
        if let Some(info) = tools.get_tool_info(name) {
            println!("{}: {}", name, info.description);
        }
    }
    Ok(())
}

fn cmd_decide(file: &Path, args: &RequestArgs) -> Result<(), String> {
    let config = load_config(file)?;
    let ctx = args.to_context(databricks::NAME, "", &config.default_region);
    let request = databricks::build_request(&ctx).map_err(|e| e.to_string())?;
    let decision = decision::decide(&request, &config.policy).map_err(|e| e.to_string())?;
    print_decision(&request, &decision);
    Ok(())
}

fn print_decision(request: &InfrastructureRequest, d: &InfrastructureDecision) {
    println!("Decision for {} ({}):", request.team(), request.environment());
    println!("  name:           {}", d.name);
    println!("  resource group: {}", d.resource_group_name);
    println!("  region:         {}", d.region);
    println!("  sku:            {}", d.sku);
    println!("  size:           {}", d.instance_size);
    println!("  driver:         {}", d.driver_instance_type);
    println!("  workers:        {} x{}-{}", d.worker_instance_type, d.min_workers, d.max_workers);
    println!("  runtime:        {}", d.runtime_version);
    println!("  idle timeout:   {} min", d.idle_timeout_minutes);
    println!(
        "  cost:           ${:.2}/month (compute ${:.2}, tier ${:.2}, storage ${:.2})",
        d.cost.total, d.cost.compute, d.cost.tier_fee, d.cost.storage
    );
    println!("  why:            {}", d.justification);
}

fn cmd_plan(
    file: &Path,
    capability: &str,
    request_text: &str,
    args: &RequestArgs,
) -> Result<(), String> {
    let config = load_config(file)?;
    let engine = build_engine(&config)?;
    let ctx = args.to_context(capability, request_text, &config.default_region);
    let plan = engine.plan(&ctx).map_err(|e| e.to_string())?;

    println!("{}", plan.to_summary());
    println!();
    println!("Preview: {}", plan.details.change_summary);
    println!(
        "Plan saved: {}",
        state::plan_file_path(&plan.details.working_dir).display()
    );
    println!("Run `infraforge apply {} --yes` to deploy.", plan.details.decision.name);
    Ok(())
}

fn saved_plan(config: &InfraforgeConfig, name: &str) -> Result<CapabilityPlan, String> {
    let dir = state::working_dir(&config.workspace_root, name);
    state::load_plan(&dir)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| format!("no saved plan in {}; run `infraforge plan` first", dir.display()))
}

fn cmd_apply(file: &Path, name: &str, yes: bool) -> Result<(), String> {
    let config = load_config(file)?;
    let plan = saved_plan(&config, name)?;
    println!("{}", plan.to_summary());
    println!();

    let engine = build_engine(&config)?;
    let capability = engine
        .resolve(&plan.capability_name)
        .map_err(|e| e.to_string())?;

    let mut deployment = Deployment::new();
    deployment.record_plan(plan).map_err(|e| e.to_string())?;
    if !yes {
        deployment.reject().map_err(|e| e.to_string())?;
        return Err("apply not approved; re-run with --yes".to_string());
    }
    deployment.approve().map_err(|e| e.to_string())?;

    let result = deployment
        .execute(capability.as_ref())
        .map_err(|e| e.to_string())?
        .clone();
    println!("{}", result.to_summary());
    if result.success {
        Ok(())
    } else {
        Err(result
            .error
            .unwrap_or_else(|| "deployment failed".to_string()))
    }
}

fn cmd_destroy(file: &Path, name: &str, yes: bool) -> Result<(), String> {
    let config = load_config(file)?;
    let dir = state::working_dir(&config.workspace_root, name);
    if !dir.exists() {
        return Err(format!("no working directory {}", dir.display()));
    }
    if !yes {
        return Err(format!("destroy of '{}' not confirmed; re-run with --yes", name));
    }
    let executor = Executor::new(config.executor.clone());
    let report = executor.destroy(&dir).map_err(|e| e.detailed())?;
    println!(
        "Destroy complete: {} resource(s) destroyed ({:.1}s)",
        report.resources_destroyed, report.duration_seconds
    );
    Ok(())
}

fn cmd_unlock(file: &Path, name: &str) -> Result<(), String> {
    let config = load_config(file)?;
    let dir = state::working_dir(&config.workspace_root, name);
    if RunLock::force_release(&dir).map_err(|e| e.to_string())? {
        println!("Removed run lock for '{}'", name);
    } else {
        println!("'{}' is not locked", name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::executor::test_support::{calls, fake_terraform};

    fn project(prelude: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_terraform(dir.path(), prelude);
        let file = dir.path().join(parser::CONFIG_FILE);
        std::fs::write(
            &file,
            format!(
                "version: \"1.0\"\nworkspace_root: ws\nfeature_request_log: requests.yaml\nexecutor:\n  binary: {}\n",
                bin.display()
            ),
        )
        .unwrap();
        (dir, file)
    }

    fn request(team: &str, env: &str) -> RequestArgs {
        RequestArgs {
            team: team.into(),
            environment: env.into(),
            region: None,
            workload_type: None,
            gpu: false,
            cost_limit: None,
            name: None,
            sku: None,
            instance_pool: false,
        }
    }

    fn plan(file: &Path, req: RequestArgs) -> Result<(), String> {
        dispatch(Commands::Plan {
            file: file.to_path_buf(),
            capability: databricks::NAME.into(),
            request_text: String::new(),
            request: req,
        })
    }

    #[test]
    fn test_if050_init() {
        let dir = tempfile::tempdir().unwrap();
        cmd_init(dir.path()).unwrap();
        let file = dir.path().join(parser::CONFIG_FILE);
        assert!(file.exists());
        assert!(dir.path().join("workspaces").is_dir());
        cmd_validate(&file).unwrap();
        let err = cmd_init(dir.path()).unwrap_err();
        assert!(err.contains("already exists"));
    }

    #[test]
    fn test_if050_validate_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join(parser::CONFIG_FILE);
        std::fs::write(&file, "version: \"2.0\"\nexecutor:\n  plan_timeout_secs: 0\n").unwrap();
        let err = dispatch(Commands::Validate { file }).unwrap_err();
        assert_eq!(err, "2 validation error(s)");
    }

    #[test]
    fn test_if050_capabilities_and_tools() {
        dispatch(Commands::Capabilities {
            concise: true,
            search: None,
        })
        .unwrap();
        dispatch(Commands::Capabilities {
            concise: false,
            search: Some("spark".into()),
        })
        .unwrap();
        let (_dir, file) = project("");
        cmd_tools(&file, true, None, "{}").unwrap();
        cmd_tools(
            &file,
            false,
            Some("select_capabilities"),
            r#"{"capabilities": ["nonexistent"]}"#,
        )
        .unwrap();
        let err = cmd_tools(&file, false, Some("no_such_tool"), "{}").unwrap_err();
        assert!(err.contains("unknown tool 'no_such_tool'"));
        let err = cmd_tools(&file, false, Some("suggest_naming"), "{not json").unwrap_err();
        assert!(err.contains("invalid --args JSON"));
    }

    #[test]
    fn test_if050_decide() {
        let (_dir, file) = project("");
        let mut req = request("ml-team", "prod");
        req.gpu = true;
        req.workload_type = Some("ml".into());
        cmd_decide(&file, &req).unwrap();

        let mut capped = request("ml-team", "prod");
        capped.cost_limit = Some(10.0);
        let err = cmd_decide(&file, &capped).unwrap_err();
        assert!(err.contains("exceeds limit"));
        assert!(cmd_decide(&file, &request("ml-team", "qa")).is_err());
    }

    #[test]
    fn test_if050_plan_apply_destroy() {
        let (dir, file) = project("");
        plan(&file, request("analytics", "dev")).unwrap();
        let work = dir.path().join("ws").join("analytics-dev_plan");
        assert!(state::plan_file_path(&work).exists());

        let err = dispatch(Commands::Apply {
            file: file.clone(),
            name: "analytics-dev".into(),
            yes: false,
        })
        .unwrap_err();
        assert!(err.contains("--yes"));
        assert!(calls(&work).iter().all(|c| !c.starts_with("apply")));

        dispatch(Commands::Apply {
            file: file.clone(),
            name: "analytics-dev".into(),
            yes: true,
        })
        .unwrap();
        assert!(calls(&work).iter().any(|c| c.starts_with("apply")));

        assert!(cmd_destroy(&file, "analytics-dev", false).is_err());
        dispatch(Commands::Destroy {
            file: file.clone(),
            name: "analytics-dev".into(),
            yes: true,
        })
        .unwrap();
        assert!(calls(&work).iter().any(|c| c.starts_with("destroy")));
    }

    #[test]
    fn test_if050_unlock_clears_held_lock() {
        let (_dir, file) = project("");
        plan(&file, request("analytics", "dev")).unwrap();
        let work = file.parent().unwrap().join("ws").join("analytics-dev_plan");
        let lock = work.join(state::LOCK_FILE);
        std::fs::write(&lock, format!("{}\n", std::process::id())).unwrap();
        let err = cmd_apply(&file, "analytics-dev", true).unwrap_err();
        assert!(err.contains("in use"), "{}", err);

        dispatch(Commands::Unlock {
            file: file.clone(),
            name: "analytics-dev".into(),
        })
        .unwrap();
        assert!(!lock.exists());
        cmd_apply(&file, "analytics-dev", true).unwrap();
        cmd_unlock(&file, "analytics-dev").unwrap();
    }

    #[test]
    fn test_if050_apply_failure_surfaces_error() {
        let (_dir, file) = project(r#"[ "$1" = apply ] && { echo "AuthorizationFailed" >&2; exit 1; }"#);
        plan(&file, request("analytics", "dev")).unwrap();
        let err = cmd_apply(&file, "analytics-dev", true).unwrap_err();
        assert!(err.contains("AuthorizationFailed"));
    }

    #[test]
    fn test_if050_apply_without_plan() {
        let (_dir, file) = project("");
        let err = cmd_apply(&file, "ghost", true).unwrap_err();
        assert!(err.contains("no saved plan"));
        assert!(cmd_destroy(&file, "ghost", true).is_err());
    }

    #[test]
    fn test_if050_plan_unknown_capability_recorded() {
        let (dir, file) = project("");
        let err = dispatch(Commands::Plan {
            file: file.clone(),
            capability: "provision_k8s".into(),
            request_text: "AKS cluster".into(),
            request: request("platform", "dev"),
        })
        .unwrap_err();
        assert!(err.contains("provision_databricks"));
        let log = FeatureRequestLog::open(&dir.path().join("requests.yaml")).unwrap();
        assert_eq!(log.get("provision_k8s").unwrap().requester, "cli");
    }
}
