//! IF-008: Databricks workspace fragment.

use super::{Fragment, FragmentOutput};
use crate::core::types::{InfrastructureDecision, PlannedResource};

const TEMPLATE: &str = r#"resource "azurerm_databricks_workspace" "this" {
  name                = var.workspace_name
  resource_group_name = azurerm_resource_group.this.name
  location            = azurerm_resource_group.this.location
  sku                 = var.databricks_sku

  tags = {
    environment   = "{{environment}}"
    team          = "{{team}}"
    workload_type = "{{workload_type}}"
    managed_by    = "infraforge"
  }
}
"#;

pub const FRAGMENT: Fragment = Fragment {
    name: "workspace",
    kind: "Databricks Workspace",
    template: TEMPLATE,
    requires: &["environment", "team", "workload_type"],
    depends_on: &["resource_group"],
    outputs: &[
        FragmentOutput {
            name: "workspace_url",
            value: "\"https://${azurerm_databricks_workspace.this.workspace_url}\"",
            description: "URL of the Databricks workspace",
        },
        FragmentOutput {
            name: "workspace_id",
            value: "azurerm_databricks_workspace.this.id",
            description: "Azure resource ID of the workspace",
        },
    ],
};

pub fn planned(decision: &InfrastructureDecision) -> PlannedResource {
    PlannedResource::new(FRAGMENT.kind, &decision.name)
        .with("sku", decision.sku.as_str())
        .with("region", decision.region.as_str())
}
