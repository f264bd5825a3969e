//! Resource fragments: composable Terraform blocks.
//!
//! Each fragment declares:
//! 1. An HCL template with `{{var}}` placeholders
//! 2. The context variables that template requires
//! 3. The fragments it depends on within the same deployment
//! 4. The outputs it contributes to `outputs.tf`

pub mod cluster;
pub mod instance_pool;
pub mod resource_group;
pub mod workspace;

use crate::core::types::{InfrastructureDecision, PlannedResource};

/// One `output` block contributed by a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOutput {
    pub name: &'static str,
    pub value: &'static str,
    pub description: &'static str,
}

/// A composable unit of `main.tf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fragment {
    pub name: &'static str,
    /// Human-readable resource kind shown in plan summaries.
    pub kind: &'static str,
    pub template: &'static str,
    pub requires: &'static [&'static str],
    pub depends_on: &'static [&'static str],
    pub outputs: &'static [FragmentOutput],
}

/// Every fragment the generator knows, in canonical order.
pub const CATALOG: [&Fragment; 4] = [
    &resource_group::FRAGMENT,
    &workspace::FRAGMENT,
    &instance_pool::FRAGMENT,
    &cluster::FRAGMENT,
];

/// Look up a fragment by name.
pub fn lookup(name: &str) -> Option<&'static Fragment> {
    CATALOG.iter().copied().find(|f| f.name == name)
}

/// Names of every known fragment.
pub fn known_names() -> Vec<String> {
    CATALOG.iter().map(|f| f.name.to_string()).collect()
}

/// Default fragment list for a decision: the pool only when requested.
pub fn default_selection(decision: &InfrastructureDecision) -> Vec<String> {
    CATALOG
        .iter()
        .filter(|f| f.name != instance_pool::FRAGMENT.name || decision.instance_pool)
        .map(|f| f.name.to_string())
        .collect()
}

/// The resource a fragment will create for this decision.
pub fn planned_resource(name: &str, decision: &InfrastructureDecision) -> Option<PlannedResource> {
    match name {
        "resource_group" => Some(resource_group::planned(decision)),
        "workspace" => Some(workspace::planned(decision)),
        "instance_pool" => Some(instance_pool::planned(decision)),
        "cluster" => Some(cluster::planned(decision)),
        _ => None,
    }
}
