//! IF-007: Resource group fragment.

use super::{Fragment, FragmentOutput};
use crate::core::types::{InfrastructureDecision, PlannedResource};

const TEMPLATE: &str = r#"resource "azurerm_resource_group" "this" {
  name     = var.resource_group_name
  location = var.region

  tags = {
    environment = "{{environment}}"
    team        = "{{team}}"
    managed_by  = "infraforge"
  }
}
"#;

pub const FRAGMENT: Fragment = Fragment {
    name: "resource_group",
    kind: "Resource Group",
    template: TEMPLATE,
    requires: &["environment", "team"],
    depends_on: &[],
    outputs: &[
        FragmentOutput {
            name: "resource_group_name",
            value: "azurerm_resource_group.this.name",
            description: "Name of the resource group",
        },
        FragmentOutput {
            name: "resource_group_id",
            value: "azurerm_resource_group.this.id",
            description: "ID of the resource group",
        },
    ],
};

pub fn planned(decision: &InfrastructureDecision) -> PlannedResource {
    PlannedResource::new(FRAGMENT.kind, &decision.resource_group_name)
        .with("location", decision.region.as_str())
}
