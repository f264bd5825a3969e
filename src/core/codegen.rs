//! IF-006: Terraform generation: compose fragments into an artifact set.
//!
//! `main.tf` is the ordered concatenation of the selected fragments.
//! `variables.tf`, `provider.tf` and `terraform.tfvars` are fixed files
//! rendered from the decision. `outputs.tf` is assembled from the outputs
//! of the fragments that were actually included.

use super::resolver;
use super::state;
use super::types::{
    ArtifactSet, Environment, InfrastructureDecision, PlannedResource, WorkloadType,
};
use crate::error::{CodegenError, StateError};
use crate::resources::{self, cluster, instance_pool, workspace, Fragment};
use indexmap::IndexMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Supporting files rendered alongside `main.tf`.
pub const SUPPORTING_FILES: [&str; 4] = ["variables.tf", "outputs.tf", "provider.tf", "terraform.tfvars"];

const MAIN_HEADER: &str = "# Generated by infraforge for team {{team}} ({{environment}}, {{workload_type}})
# Estimated monthly cost: ${{estimated_monthly_cost}}
";

const PROVIDER_TF: &str = r#"terraform {
  required_version = ">= 1.5.0"

  required_providers {
    azurerm = {
      source  = "hashicorp/azurerm"
      version = "~> 3.80"
    }
    databricks = {
      source  = "databricks/databricks"
      version = "~> 1.30"
    }
  }
}

provider "azurerm" {
  features {}
}
"#;

const DATABRICKS_PROVIDER: &str = r#"
provider "databricks" {
  host                        = azurerm_databricks_workspace.this.workspace_url
  azure_workspace_resource_id = azurerm_databricks_workspace.this.id
}
"#;

/// (name, type, description) for every input variable.
const VARIABLES: [(&str, &str, &str); 10] = [
    ("workspace_name", "string", "Name of the Databricks workspace"),
    ("resource_group_name", "string", "Name of the Azure resource group"),
    ("region", "string", "Azure region for all resources"),
    ("databricks_sku", "string", "Workspace SKU tier (standard or premium)"),
    ("min_workers", "number", "Minimum autoscaling workers"),
    ("max_workers", "number", "Maximum autoscaling workers"),
    ("driver_instance_type", "string", "Driver node instance type"),
    ("worker_instance_type", "string", "Worker node instance type"),
    ("spark_version", "string", "Databricks runtime version"),
    ("autotermination_minutes", "number", "Idle minutes before the cluster terminates"),
];

/// Resolve a fragment list: reject unknown names, duplicates and missing
/// dependencies, then order by dependency.
pub fn resolve_fragments(resource_list: &[String]) -> Result<Vec<&'static Fragment>, CodegenError> {
    let mut selected: Vec<&'static Fragment> = Vec::with_capacity(resource_list.len());
    for name in resource_list {
        let fragment = resources::lookup(name).ok_or_else(|| CodegenError::TemplateNotFound {
            name: name.clone(),
            known: resources::known_names(),
        })?;
        if selected.iter().any(|f| f.name == fragment.name) {
            return Err(CodegenError::DuplicateResource(name.clone()));
        }
        selected.push(fragment);
    }

    for fragment in &selected {
        for dep in fragment.depends_on {
            if !selected.iter().any(|f| f.name == *dep) {
                return Err(CodegenError::MissingDependency {
                    resource: fragment.name.to_string(),
                    dependency: dep.to_string(),
                });
            }
        }
    }

    let nodes: Vec<(&str, &[&str])> = selected.iter().map(|f| (f.name, f.depends_on)).collect();
    let order = resolver::build_fragment_order(&nodes).map_err(|reason| CodegenError::Render {
        template: "main.tf".to_string(),
        reason,
    })?;

    Ok(order
        .iter()
        .filter_map(|name| resources::lookup(name))
        .collect())
}

/// Shared variable context for every template, with values HCL-escaped.
pub fn context_variables(
    decision: &InfrastructureDecision,
    environment: Environment,
    workload_type: WorkloadType,
    team: &str,
    includes_pool: bool,
) -> IndexMap<String, String> {
    let availability = if environment == Environment::Prod {
        "ON_DEMAND_AZURE"
    } else {
        "SPOT_WITH_FALLBACK_AZURE"
    };
    let worker_source = if includes_pool {
        cluster::WORKER_POOL
    } else {
        cluster::WORKER_NODE_TYPE
    };

    let pairs: [(&str, String); 17] = [
        ("workspace_name", decision.name.clone()),
        ("resource_group_name", decision.resource_group_name.clone()),
        ("region", decision.region.clone()),
        ("databricks_sku", decision.sku.to_string()),
        ("min_workers", decision.min_workers.to_string()),
        ("max_workers", decision.max_workers.to_string()),
        ("driver_instance_type", decision.driver_instance_type.clone()),
        ("worker_instance_type", decision.worker_instance_type.clone()),
        ("spark_version", decision.runtime_version.clone()),
        ("autotermination_minutes", decision.idle_timeout_minutes.to_string()),
        ("enable_gpu", decision.enable_gpu.to_string()),
        ("estimated_monthly_cost", format!("{:.2}", decision.cost.total)),
        ("environment", environment.to_string()),
        ("workload_type", workload_type.to_string()),
        ("team", team.to_string()),
        ("availability", availability.to_string()),
        ("worker_source", worker_source.to_string()),
    ];
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), hcl_escape(&v)))
        .collect()
}

/// Escape a value for a quoted HCL string or a `#` comment.
///
/// Quotes, backslashes and control characters are escaped and `${`/`%{`
/// are doubled, so a rendered value can never end its string or line.
pub fn hcl_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '$' | '%' if chars.peek() == Some(&'{') => {
                out.push(c);
                out.push(c);
            }
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Generate the full artifact set for a fragment list.
pub fn generate(
    resource_list: &[String],
    decision: &InfrastructureDecision,
    environment: Environment,
    workload_type: WorkloadType,
    team: &str,
) -> Result<ArtifactSet, CodegenError> {
    let fragments = resolve_fragments(resource_list)?;
    let includes_pool = fragments.iter().any(|f| f.name == instance_pool::FRAGMENT.name);
    let includes_workspace = fragments.iter().any(|f| f.name == workspace::FRAGMENT.name);
    let vars = context_variables(decision, environment, workload_type, team, includes_pool);

    let mut blocks = vec![render("main.tf", MAIN_HEADER, &vars)?];
    for fragment in &fragments {
        debug!(fragment = fragment.name, "rendering fragment");
        blocks.push(render(fragment.name, fragment.template, &vars)?);
    }

    let mut artifacts = ArtifactSet::new();
    artifacts.insert("main.tf", blocks.join("\n"));
    artifacts.insert("variables.tf", variables_tf());
    artifacts.insert("outputs.tf", outputs_tf(&fragments));
    artifacts.insert("provider.tf", provider_tf(includes_workspace));
    artifacts.insert("terraform.tfvars", tfvars(&vars));

    info!(
        name = %decision.name,
        fragments = fragments.len(),
        files = artifacts.len(),
        "generated terraform"
    );
    Ok(artifacts)
}

/// Planned resources for a fragment list, in render order.
pub fn planned_resources(
    resource_list: &[String],
    decision: &InfrastructureDecision,
) -> Result<Vec<PlannedResource>, CodegenError> {
    Ok(resolve_fragments(resource_list)?
        .iter()
        .filter_map(|f| resources::planned_resource(f.name, decision))
        .collect())
}

/// Availability of each fragment and supporting file.
///
/// A fragment is available when its template is non-empty, every
/// placeholder it uses is provided by the shared context, and its
/// dependencies are known fragments.
pub fn validate_templates() -> IndexMap<String, bool> {
    let sample = sample_decision();
    let vars = context_variables(
        &sample,
        Environment::Dev,
        WorkloadType::default(),
        "sample",
        false,
    );
    let mut status = IndexMap::new();
    for fragment in resources::CATALOG {
        let placeholders_ok = resolver::template_variables(fragment.template)
            .iter()
            .all(|v| vars.contains_key(v));
        let deps_ok = fragment
            .depends_on
            .iter()
            .all(|d| resources::lookup(d).is_some());
        let ok = !fragment.template.trim().is_empty() && placeholders_ok && deps_ok;
        if !ok {
            tracing::warn!(fragment = fragment.name, "fragment unavailable");
        }
        status.insert(fragment.name.to_string(), ok);
    }
    for file in SUPPORTING_FILES {
        status.insert(file.to_string(), true);
    }
    status
}

/// Write every artifact into `dir` atomically. Returns the written paths.
pub fn write_to_directory(artifacts: &ArtifactSet, dir: &Path) -> Result<Vec<PathBuf>, StateError> {
    std::fs::create_dir_all(dir).map_err(|source| StateError::Write {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut written = Vec::with_capacity(artifacts.len());
    for (name, content) in artifacts.iter() {
        let path = dir.join(name);
        state::write_atomic(&path, content)?;
        written.push(path);
    }
    debug!(dir = %dir.display(), files = written.len(), "artifacts written");
    Ok(written)
}

fn render(
    template_name: &str,
    template: &str,
    vars: &IndexMap<String, String>,
) -> Result<String, CodegenError> {
    resolver::render_template(template, vars).map_err(|reason| CodegenError::Render {
        template: template_name.to_string(),
        reason,
    })
}

fn variables_tf() -> String {
    VARIABLES
        .iter()
        .map(|(name, ty, description)| {
            format!(
                "variable \"{}\" {{\n  description = \"{}\"\n  type        = {}\n}}\n",
                name, description, ty
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn outputs_tf(fragments: &[&Fragment]) -> String {
    fragments
        .iter()
        .flat_map(|f| f.outputs.iter())
        .map(|o| {
            format!(
                "output \"{}\" {{\n  description = \"{}\"\n  value       = {}\n}}\n",
                o.name, o.description, o.value
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn provider_tf(includes_workspace: bool) -> String {
    if includes_workspace {
        format!("{}{}", PROVIDER_TF, DATABRICKS_PROVIDER)
    } else {
        PROVIDER_TF.to_string()
    }
}

fn tfvars(vars: &IndexMap<String, String>) -> String {
    let width = VARIABLES.iter().map(|(n, _, _)| n.len()).max().unwrap_or(0);
    let mut out = String::new();
    for (name, ty, _) in VARIABLES {
        let escaped = vars.get(name).map(String::as_str).unwrap_or_default();
        let value = if ty == "string" {
            format!("\"{}\"", escaped)
        } else {
            escaped.to_string()
        };
        out.push_str(&format!("{:<width$} = {}\n", name, value, width = width));
    }
    out
}

fn sample_decision() -> InfrastructureDecision {
    use super::types::{CostBreakdown, InstanceSize, SkuTier};
    InfrastructureDecision {
        name: "sample-dev".into(),
        resource_group_name: "rg-sample-dev".into(),
        region: "eastus".into(),
        sku: SkuTier::Standard,
        instance_size: InstanceSize::Small,
        driver_instance_type: "sample".into(),
        worker_instance_type: "sample".into(),
        min_workers: 1,
        max_workers: 1,
        runtime_version: "sample".into(),
        idle_timeout_minutes: 1,
        enable_gpu: false,
        instance_pool: false,
        cost: CostBreakdown {
            compute: 0.0,
            tier_fee: 0.0,
            storage: 0.0,
            total: 0.0,
        },
        justification: String::new(),
    }
}
