//! IF-004: Decision policy: the lookup tables behind every decision.
//!
//! All sizing, pricing and timeout numbers live here as data. Defaults
//! reproduce the built-in tables; any subset can be overridden from the
//! `policy:` section of `infraforge.yaml`.

use super::types::{Environment, InstanceSize, SkuTier, WorkloadType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// ============================================================================
// Keyed tables
// ============================================================================

/// One value per environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvTable<T> {
    pub dev: T,
    pub staging: T,
    pub prod: T,
}

impl<T> EnvTable<T> {
    pub fn get(&self, env: Environment) -> &T {
        match env {
            Environment::Dev => &self.dev,
            Environment::Staging => &self.staging,
            Environment::Prod => &self.prod,
        }
    }
}

/// One value per instance size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeTable<T> {
    pub small: T,
    pub medium: T,
    pub large: T,
}

impl<T> SizeTable<T> {
    pub fn get(&self, size: InstanceSize) -> &T {
        match size {
            InstanceSize::Small => &self.small,
            InstanceSize::Medium => &self.medium,
            InstanceSize::Large => &self.large,
        }
    }

    pub fn values(&self) -> [&T; 3] {
        [&self.small, &self.medium, &self.large]
    }
}

/// One value per SKU tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierTable<T> {
    pub standard: T,
    pub premium: T,
}

impl<T> TierTable<T> {
    pub fn get(&self, tier: SkuTier) -> &T {
        match tier {
            SkuTier::Standard => &self.standard,
            SkuTier::Premium => &self.premium,
        }
    }
}

/// Driver and worker instance classes for one size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstancePair {
    pub driver: String,
    pub worker: String,
}

impl InstancePair {
    fn new(driver: &str, worker: &str) -> Self {
        Self {
            driver: driver.to_string(),
            worker: worker.to_string(),
        }
    }
}

/// Inclusive autoscaling bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerBounds {
    pub min: u32,
    pub max: u32,
}

// ============================================================================
// Policy
// ============================================================================

/// Lookup tables consumed by `decision::decide`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPolicy {
    pub size_by_workload: IndexMap<WorkloadType, InstanceSize>,
    /// Steps to shift the workload size per environment (negative = smaller).
    pub size_offset: EnvTable<i8>,
    pub cpu_instances: SizeTable<InstancePair>,
    pub gpu_instances: SizeTable<InstancePair>,
    /// Pay-as-you-go VM price, USD per hour.
    pub vm_hourly_usd: IndexMap<String, f64>,
    /// Databricks units consumed per VM hour.
    pub dbu_per_hour: IndexMap<String, f64>,
    /// USD per DBU.
    pub dbu_rate: TierTable<f64>,
    /// Fixed monthly workspace fee.
    pub tier_fee: TierTable<f64>,
    pub storage_monthly_usd: f64,
    pub monthly_hours: EnvTable<f64>,
    pub workers: EnvTable<WorkerBounds>,
    pub prod_min_workers_floor: u32,
    pub idle_timeout_minutes: EnvTable<u32>,
    /// Environments that receive the top SKU tier.
    pub top_tier_environments: Vec<Environment>,
    pub runtime_cpu: String,
    pub runtime_gpu: String,
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        let size_by_workload = [
            (WorkloadType::Ml, InstanceSize::Large),
            (WorkloadType::DataEngineering, InstanceSize::Medium),
            (WorkloadType::DataScience, InstanceSize::Medium),
            (WorkloadType::Etl, InstanceSize::Medium),
            (WorkloadType::Analytics, InstanceSize::Small),
        ]
        .into_iter()
        .collect();

        let prices = [
            ("Standard_D4s_v5", 0.192, 0.75),
            ("Standard_DS3_v2", 0.192, 0.75),
            ("Standard_DS4_v2", 0.384, 1.5),
            ("Standard_DS5_v2", 0.768, 3.0),
            ("Standard_NC6s_v3", 3.06, 2.0),
            ("Standard_NC12s_v3", 6.12, 4.0),
            ("Standard_NC24s_v3", 12.24, 8.0),
        ];

        Self {
            size_by_workload,
            size_offset: EnvTable {
                dev: -1,
                staging: 0,
                prod: 0,
            },
            cpu_instances: SizeTable {
                small: InstancePair::new("Standard_D4s_v5", "Standard_D4s_v5"),
                medium: InstancePair::new("Standard_DS4_v2", "Standard_DS4_v2"),
                large: InstancePair::new("Standard_DS5_v2", "Standard_DS5_v2"),
            },
            gpu_instances: SizeTable {
                small: InstancePair::new("Standard_DS3_v2", "Standard_NC6s_v3"),
                medium: InstancePair::new("Standard_DS4_v2", "Standard_NC12s_v3"),
                large: InstancePair::new("Standard_DS5_v2", "Standard_NC24s_v3"),
            },
            vm_hourly_usd: prices.iter().map(|(n, p, _)| (n.to_string(), *p)).collect(),
            dbu_per_hour: prices.iter().map(|(n, _, d)| (n.to_string(), *d)).collect(),
            dbu_rate: TierTable {
                standard: 0.15,
                premium: 0.20,
            },
            tier_fee: TierTable {
                standard: 75.0,
                premium: 150.0,
            },
            storage_monthly_usd: 200.0,
            monthly_hours: EnvTable {
                dev: 176.0,
                staging: 264.0,
                prod: 730.0,
            },
            workers: EnvTable {
                dev: WorkerBounds { min: 1, max: 3 },
                staging: WorkerBounds { min: 2, max: 5 },
                prod: WorkerBounds { min: 3, max: 10 },
            },
            prod_min_workers_floor: 3,
            idle_timeout_minutes: EnvTable {
                dev: 30,
                staging: 60,
                prod: 120,
            },
            top_tier_environments: vec![Environment::Prod],
            runtime_cpu: "13.3.x-scala2.12".to_string(),
            runtime_gpu: "13.3.x-gpu-ml-scala2.12".to_string(),
        }
    }
}

impl DecisionPolicy {
    /// Size class for a workload before the environment shift.
    pub fn base_size(&self, workload: WorkloadType) -> InstanceSize {
        self.size_by_workload
            .get(&workload)
            .copied()
            .unwrap_or(InstanceSize::Medium)
    }

    /// Every instance class named by the CPU and GPU tables.
    pub fn instance_classes(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for pair in self
            .cpu_instances
            .values()
            .into_iter()
            .chain(self.gpu_instances.values())
        {
            for n in [pair.driver.as_str(), pair.worker.as_str()] {
                if !names.contains(&n) {
                    names.push(n);
                }
            }
        }
        names
    }

    /// Worker classes the GPU table can produce.
    pub fn gpu_workers(&self) -> Vec<&str> {
        self.gpu_instances
            .values()
            .into_iter()
            .map(|p| p.worker.as_str())
            .collect()
    }

    /// Worker classes the CPU table can produce.
    pub fn cpu_workers(&self) -> Vec<&str> {
        self.cpu_instances
            .values()
            .into_iter()
            .map(|p| p.worker.as_str())
            .collect()
    }
}
