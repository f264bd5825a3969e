//! IF-021: Capability registry: the authoritative list of what can run.
//!
//! A planner may only select capabilities named here; every rejection
//! enumerates the valid names so the caller can correct itself.

use crate::error::{CapabilityError, RegistryError};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Static description of a capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub name: String,
    pub display_name: String,
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub use_cases: Vec<String>,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub required_parameters: Vec<String>,
    #[serde(default)]
    pub optional_parameters: Vec<String>,
}

fn default_category() -> String {
    "other".to_string()
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Descriptor for the built-in Databricks workspace capability.
pub fn databricks_descriptor() -> CapabilityDescriptor {
    CapabilityDescriptor {
        name: "provision_databricks".to_string(),
        display_name: "Azure Databricks Workspace".to_string(),
        description:
            "Provision Azure Databricks workspace for data engineering, ML, and analytics"
                .to_string(),
        keywords: strings(&[
            "databricks",
            "workspace",
            "spark",
            "ml platform",
            "machine learning",
            "data engineering",
            "analytics",
            "jupyter",
            "notebooks",
        ]),
        use_cases: strings(&[
            "Data engineering pipelines",
            "ML model training and experimentation",
            "Large-scale data analytics",
            "Spark workloads",
            "Collaborative data science",
        ]),
        category: "compute".to_string(),
        required_parameters: strings(&["team", "environment", "region"]),
        optional_parameters: strings(&[
            "workspace_name",
            "enable_gpu",
            "workload_type",
            "instance_pool_enabled",
            "cost_limit",
            "sku",
        ]),
    }
}

/// Name → descriptor map. Append-only after startup.
#[derive(Debug, Clone, Default)]
pub struct CapabilityRegistry {
    capabilities: IndexMap<String, CapabilityDescriptor>,
}

impl CapabilityRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in capabilities.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .capabilities
            .insert("provision_databricks".to_string(), databricks_descriptor());
        registry
    }

    pub fn register(&mut self, descriptor: CapabilityDescriptor) -> Result<(), RegistryError> {
        if self.capabilities.contains_key(&descriptor.name) {
            return Err(RegistryError::RegistrationConflict {
                kind: "capability",
                name: descriptor.name,
            });
        }
        self.capabilities.insert(descriptor.name.clone(), descriptor);
        Ok(())
    }

    pub fn valid_names(&self) -> Vec<String> {
        self.capabilities.keys().cloned().collect()
    }

    /// `(true, "")` when registered, else `(false, msg)` listing every
    /// valid name.
    pub fn validate(&self, name: &str) -> (bool, String) {
        match self.lookup(name) {
            Ok(_) => (true, String::new()),
            Err(e) => (false, e.to_string()),
        }
    }

    pub fn lookup(&self, name: &str) -> Result<&CapabilityDescriptor, CapabilityError> {
        self.capabilities
            .get(name)
            .ok_or_else(|| CapabilityError::UnknownCapability {
                name: name.to_string(),
                valid: self.valid_names(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Markdown listing for planner instructions.
    pub fn describe_all(&self) -> String {
        self.capabilities
            .iter()
            .map(|(name, info)| {
                let use_cases = info
                    .use_cases
                    .iter()
                    .map(|uc| format!("  - {}", uc))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "**{}** (`{}`)\n{}\n\nUse cases:\n{}",
                    info.display_name, name, info.description, use_cases
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// One line per capability.
    pub fn describe_concise(&self) -> String {
        self.capabilities
            .iter()
            .map(|(name, info)| format!("- `{}`: {}", name, info.description))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Capabilities with any keyword appearing in `query` (case-insensitive).
    pub fn search_by_keywords(&self, query: &str) -> Vec<String> {
        let query = query.to_lowercase();
        self.capabilities
            .iter()
            .filter(|(_, info)| info.keywords.iter().any(|k| query.contains(&k.to_lowercase())))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Category → capability names.
    pub fn categories(&self) -> IndexMap<String, Vec<String>> {
        let mut out: IndexMap<String, Vec<String>> = IndexMap::new();
        for (name, info) in &self.capabilities {
            out.entry(info.category.clone())
                .or_default()
                .push(name.clone());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }
}
