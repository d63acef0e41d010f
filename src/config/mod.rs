//! Configuration loading and management

use crate::core::entity::{AttributeKind, EntityDescription};
use crate::core::error::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// How repositories deliver completion signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMode {
    /// Fire from a spawned task once the call has returned (needs a tokio runtime,
    /// falls back to `Immediate` without one)
    #[default]
    Deferred,
    /// Fire before the call returns
    Immediate,
}

/// Runtime settings of a store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Completion dispatch mode
    #[serde(default)]
    pub completion: CompletionMode,

    /// Suggested bound for callers waiting on a completion, in milliseconds.
    ///
    /// Meant for test harnesses; nothing guarantees a signal within it.
    #[serde(default = "default_completion_timeout_ms")]
    pub completion_timeout_ms: u64,
}

fn default_completion_timeout_ms() -> u64 {
    10_000
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            completion: CompletionMode::default(),
            completion_timeout_ms: default_completion_timeout_ms(),
        }
    }
}

impl StoreSettings {
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_millis(self.completion_timeout_ms)
    }
}

/// Complete model: entity schemas plus store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Entity descriptions
    #[serde(default)]
    pub entities: Vec<EntityDescription>,

    /// Store settings
    #[serde(default)]
    pub settings: StoreSettings,
}

impl ModelConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Check entity names are unique and relationships point at real
    /// entities and inverses
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for entity in &self.entities {
            if !seen.insert(entity.name.as_str()) {
                return Err(ConfigError::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
        }

        for entity in &self.entities {
            for attribute in &entity.attributes {
                let Some((target, inverse)) = attribute.kind.relationship() else {
                    continue;
                };
                let Some(target_entity) = self.entity(target) else {
                    return Err(ConfigError::UnknownTarget {
                        entity: entity.name.clone(),
                        attribute: attribute.name.clone(),
                        target: target.to_string(),
                    });
                };
                let Some(inverse) = inverse else {
                    continue;
                };
                let inverse_ok = target_entity
                    .attribute(inverse)
                    .is_some_and(|a| matches!(&a.kind,
                        AttributeKind::ToOne { target, .. } | AttributeKind::ToMany { target, .. }
                            if *target == entity.name));
                if !inverse_ok {
                    return Err(ConfigError::MissingInverse {
                        entity: entity.name.clone(),
                        attribute: attribute.name.clone(),
                        target: target.to_string(),
                        inverse: inverse.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
