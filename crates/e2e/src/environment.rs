//! Catalog of target application environments

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{E2eError, E2eResult};

/// A single target application variant and the command that scaffolds it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Unique, stable identifier (also the run subdirectory name)
    pub name: String,

    /// Shell command run inside a fresh empty directory
    pub bootstrap_command: String,
}

impl EnvironmentConfig {
    pub fn new(name: impl Into<String>, bootstrap_command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bootstrap_command: bootstrap_command.into(),
        }
    }
}

/// Immutable, ordered set of environments built once at startup
#[derive(Debug, Clone)]
pub struct EnvironmentRegistry {
    environments: Vec<EnvironmentConfig>,
}

impl EnvironmentRegistry {
    /// Build a registry, rejecting empty or duplicate names
    pub fn new(environments: Vec<EnvironmentConfig>) -> E2eResult<Self> {
        let mut seen = HashSet::new();
        for env in &environments {
            if env.name.is_empty() || env.name.contains('/') {
                return Err(E2eError::Configuration(format!(
                    "Invalid environment name: {:?}",
                    env.name
                )));
            }
            if !seen.insert(env.name.as_str()) {
                return Err(E2eError::Configuration(format!(
                    "Duplicate environment name: {}",
                    env.name
                )));
            }
        }
        Ok(Self { environments })
    }

    /// All environments in declaration order
    pub fn list(&self) -> &[EnvironmentConfig] {
        &self.environments
    }

    /// Environments whose name matches exactly; empty when nothing matches
    pub fn filter(&self, name: &str) -> Vec<EnvironmentConfig> {
        self.environments
            .iter()
            .filter(|env| env.name == name)
            .cloned()
            .collect()
    }

    /// Apply an optional `--only` filter
    pub fn select(&self, only: Option<&str>) -> Vec<EnvironmentConfig> {
        match only {
            Some(name) => self.filter(name),
            None => self.environments.clone(),
        }
    }
}

impl Default for EnvironmentRegistry {
    fn default() -> Self {
        Self {
            environments: default_environments(),
        }
    }
}

/// Next.js and RedwoodJS apps in both TypeScript and JavaScript flavours
pub fn default_environments() -> Vec<EnvironmentConfig> {
    vec![
        EnvironmentConfig::new("next_ts", "yarn create next-app . --typescript"),
        EnvironmentConfig::new("next_js", "yarn create next-app ."),
        EnvironmentConfig::new(
            "redwood_ts",
            "yarn create redwood-app . --typescript > /dev/null; touch yarn.lock; yarn",
        ),
        EnvironmentConfig::new(
            "redwood_js",
            "yarn create redwood-app . > /dev/null; touch yarn.lock; yarn",
        ),
    ]
}
