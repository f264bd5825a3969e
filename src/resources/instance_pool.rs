//! IF-009: Instance pool fragment.
//!
//! Optional. When present the cluster draws its workers from the pool.

use super::{Fragment, FragmentOutput};
use crate::core::types::{InfrastructureDecision, PlannedResource};

const TEMPLATE: &str = r#"resource "databricks_instance_pool" "this" {
  instance_pool_name                    = "{{workspace_name}}-pool"
  min_idle_instances                    = 0
  max_capacity                          = var.max_workers
  node_type_id                          = var.worker_instance_type
  idle_instance_autotermination_minutes = var.autotermination_minutes

  azure_attributes {
    availability = "{{availability}}"
  }

  depends_on = [azurerm_databricks_workspace.this]
}
"#;

pub const FRAGMENT: Fragment = Fragment {
    name: "instance_pool",
    kind: "Instance Pool",
    template: TEMPLATE,
    requires: &["workspace_name", "availability"],
    depends_on: &["workspace"],
    outputs: &[FragmentOutput {
        name: "instance_pool_id",
        value: "databricks_instance_pool.this.id",
        description: "ID of the instance pool",
    }],
};

pub fn planned(decision: &InfrastructureDecision) -> PlannedResource {
    PlannedResource::new(FRAGMENT.kind, &format!("{}-pool", decision.name))
        .with("node_type", decision.worker_instance_type.as_str())
        .with("max_capacity", decision.max_workers.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_if009_pool_depends_on_workspace() {
        assert_eq!(FRAGMENT.depends_on, &["workspace"]);
        assert!(FRAGMENT.template.contains("databricks_instance_pool"));
        assert!(FRAGMENT.template.contains("depends_on = [azurerm_databricks_workspace.this]"));
    }
}
