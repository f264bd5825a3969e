//! IF-010: Autoscaling cluster fragment.

use super::{Fragment, FragmentOutput};
use crate::core::types::{InfrastructureDecision, PlannedResource};

const TEMPLATE: &str = r#"resource "databricks_cluster" "this" {
  cluster_name            = "{{workspace_name}}-cluster"
  spark_version           = var.spark_version
  driver_node_type_id     = var.driver_instance_type
  {{worker_source}}
  autotermination_minutes = var.autotermination_minutes

  autoscale {
    min_workers = var.min_workers
    max_workers = var.max_workers
  }

  azure_attributes {
    availability       = "{{availability}}"
    first_on_demand    = 1
    spot_bid_max_price = -1
  }

  spark_conf = {
    "spark.databricks.delta.preview.enabled" = "true"
    "spark.databricks.io.cache.enabled"      = "true"
  }

  custom_tags = {
    environment   = "{{environment}}"
    team          = "{{team}}"
    workload_type = "{{workload_type}}"
    gpu_enabled   = "{{enable_gpu}}"
  }

  depends_on = [azurerm_databricks_workspace.this]
}
"#;

/// Worker line when the cluster sizes its own nodes.
pub const WORKER_NODE_TYPE: &str = "node_type_id            = var.worker_instance_type";
/// Worker line when the cluster draws from the instance pool.
pub const WORKER_POOL: &str = "instance_pool_id        = databricks_instance_pool.this.id";

pub const FRAGMENT: Fragment = Fragment {
    name: "cluster",
    kind: "Databricks Cluster",
    template: TEMPLATE,
    requires: &[
        "workspace_name",
        "worker_source",
        "availability",
        "environment",
        "team",
        "workload_type",
        "enable_gpu",
    ],
    depends_on: &["workspace"],
    outputs: &[
        FragmentOutput {
            name: "cluster_id",
            value: "databricks_cluster.this.id",
            description: "ID of the Databricks cluster",
        },
        FragmentOutput {
            name: "cluster_url",
            value: "databricks_cluster.this.url",
            description: "URL of the Databricks cluster",
        },
    ],
};

pub fn planned(decision: &InfrastructureDecision) -> PlannedResource {
    PlannedResource::new(FRAGMENT.kind, &format!("{}-cluster", decision.name))
        .with("driver", decision.driver_instance_type.as_str())
        .with("worker", decision.worker_instance_type.as_str())
        .with(
            "workers",
            format!("{}-{}", decision.min_workers, decision.max_workers),
        )
        .with("runtime", decision.runtime_version.as_str())
}
