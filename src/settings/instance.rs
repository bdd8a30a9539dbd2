//! Instance containers: the mutable layers of a stack.
//!
//! A container is a named bag of setting overrides plus free-form metadata.
//! Containers do not validate anything on their own; attaching a definition
//! scopes `set_value` to the settings that definition declares.

use super::definition::Definition;
use super::meta;
use super::value::SettingValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// The role a container plays inside a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerType {
    User,
    Variant,
    Material,
    Quality,
    QualityChanges,
    DefinitionChanges,
}

impl ContainerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerType::User => "user",
            ContainerType::Variant => "variant",
            ContainerType::Material => "material",
            ContainerType::Quality => "quality",
            ContainerType::QualityChanges => "quality_changes",
            ContainerType::DefinitionChanges => "definition_changes",
        }
    }
}

impl fmt::Display for ContainerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("setting '{key}' is not declared by definition '{definition}'")]
    UnknownSetting { key: String, definition: String },
}

/// A named, mutable bag of setting overrides and metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceContainer {
    id: String,
    name: String,
    container_type: ContainerType,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    values: BTreeMap<String, SettingValue>,
    /// Validation scope for `set_value`, not serialized; the `definition`
    /// metadata entry carries the association in serialized form.
    #[serde(skip)]
    definition: Option<Arc<Definition>>,
}

impl InstanceContainer {
    /// Creates an empty container. The name defaults to the id.
    pub fn new(id: impl Into<String>, container_type: ContainerType) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            container_type,
            metadata: BTreeMap::new(),
            values: BTreeMap::new(),
            definition: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn container_type(&self) -> ContainerType {
        self.container_type
    }

    pub fn add_metadata_entry(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_entry(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Attaches the definition that scopes which settings this container may
    /// override.
    pub fn attach_definition(&mut self, definition: Arc<Definition>) {
        self.definition = Some(definition);
    }

    pub fn definition(&self) -> Option<&Arc<Definition>> {
        self.definition.as_ref()
    }

    /// Writes a setting override. With a definition attached, the key must be
    /// one of the settings that definition declares.
    pub fn set_value(
        &mut self,
        key: impl Into<String>,
        value: impl Into<SettingValue>,
    ) -> Result<(), ContainerError> {
        let key = key.into();
        if let Some(definition) = &self.definition {
            if !definition.declares_setting(&key) {
                return Err(ContainerError::UnknownSetting {
                    key,
                    definition: definition.id().to_string(),
                });
            }
        }
        self.values.insert(key, value.into());
        Ok(())
    }

    pub fn value(&self, key: &str) -> Option<&SettingValue> {
        self.values.get(key)
    }

    pub fn remove_value(&mut self, key: &str) -> Option<SettingValue> {
        self.values.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Filter for instance-container lookup. `None` fields match anything;
/// `definition` matches the container's `definition` metadata entry.
#[derive(Debug, Clone, Default)]
pub struct InstanceFilter {
    pub id: Option<String>,
    pub name: Option<String>,
    pub container_type: Option<ContainerType>,
    pub definition: Option<String>,
}

impl InstanceFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Self::default()
        }
    }

    pub fn of_type(container_type: ContainerType) -> Self {
        Self {
            container_type: Some(container_type),
            ..Self::default()
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn matches(&self, container: &InstanceContainer) -> bool {
        if let Some(id) = &self.id {
            if container.id() != id {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if container.name() != name {
                return false;
            }
        }
        if let Some(container_type) = self.container_type {
            if container.container_type() != container_type {
                return false;
            }
        }
        if let Some(definition) = &self.definition {
            if container.metadata_entry(meta::DEFINITION) != Some(definition.as_str()) {
                return false;
            }
        }
        true
    }
}
