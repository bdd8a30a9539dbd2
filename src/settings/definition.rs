//! Machine and extruder definitions.
//!
//! A definition is the immutable template at the bottom of every stack: the
//! settings a hardware model exposes, their defaults, and free-form metadata
//! (`position`, `machine`, `preferred_*`, ...). Definitions are registered
//! once and shared as `Arc<Definition>`.

use super::meta;
use super::value::SettingValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One setting declared by a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettingDecl {
    pub label: String,
    pub default_value: SettingValue,
}

impl SettingDecl {
    pub fn new(label: impl Into<String>, default_value: impl Into<SettingValue>) -> Self {
        Self {
            label: label.into(),
            default_value: default_value.into(),
        }
    }
}

/// An immutable template describing the settings available for a machine or
/// extruder model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    id: String,
    name: String,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
    #[serde(default)]
    settings: BTreeMap<String, SettingDecl>,
}

impl Definition {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            metadata: BTreeMap::new(),
            settings: BTreeMap::new(),
        }
    }

    pub fn with_metadata_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, decl: SettingDecl) -> Self {
        self.settings.insert(key.into(), decl);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human-readable display name, used as the fallback when deriving a
    /// machine name from this definition.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata_entry(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The extruder slot this definition occupies. `None` when the entry is
    /// missing or not an integer.
    pub fn position(&self) -> Option<u32> {
        self.metadata_entry(meta::POSITION)?.trim().parse().ok()
    }

    /// The parent machine of an extruder definition.
    pub fn machine_id(&self) -> Option<&str> {
        self.metadata_entry(meta::MACHINE)
    }

    pub fn setting(&self, key: &str) -> Option<&SettingDecl> {
        self.settings.get(key)
    }

    pub fn default_value(&self, key: &str) -> Option<&SettingValue> {
        self.settings.get(key).map(|decl| &decl.default_value)
    }

    pub fn declares_setting(&self, key: &str) -> bool {
        self.settings.contains_key(key)
    }

    pub fn settings(&self) -> impl Iterator<Item = (&str, &SettingDecl)> {
        self.settings.iter().map(|(key, decl)| (key.as_str(), decl))
    }
}

/// Filter for definition lookup. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct DefinitionFilter {
    pub id: Option<String>,
    /// Matches the `machine` metadata entry, i.e. the extruder definitions
    /// declared for a given machine.
    pub machine: Option<String>,
}

impl DefinitionFilter {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            machine: None,
        }
    }

    pub fn for_machine(machine_id: impl Into<String>) -> Self {
        Self {
            id: None,
            machine: Some(machine_id.into()),
        }
    }

    pub fn matches(&self, definition: &Definition) -> bool {
        if let Some(id) = &self.id {
            if definition.id() != id {
                return false;
            }
        }
        if let Some(machine) = &self.machine {
            if definition.machine_id() != Some(machine.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extruder() -> Definition {
        Definition::new("fdm_extruder_0", "Extruder 1")
            .with_metadata_entry(meta::MACHINE, "generic_fdm")
            .with_metadata_entry(meta::POSITION, "0")
            .with_setting("nozzle_size", SettingDecl::new("Nozzle Size", 0.4))
    }

    #[test]
    fn test_position_parses_integer_metadata() {
        assert_eq!(extruder().position(), Some(0));
    }

    #[test]
    fn test_position_missing_or_malformed_is_none() {
        let no_position = Definition::new("fdm_extruder_1", "Extruder 2");
        assert_eq!(no_position.position(), None);

        let malformed = Definition::new("fdm_extruder_2", "Extruder 3")
            .with_metadata_entry(meta::POSITION, "first");
        assert_eq!(malformed.position(), None);
    }

    #[test]
    fn test_default_value_from_declared_setting() {
        let definition = extruder();
        assert_eq!(
            definition.default_value("nozzle_size"),
            Some(&SettingValue::Float(0.4))
        );
        assert_eq!(definition.default_value("layer_height"), None);
        assert!(definition.declares_setting("nozzle_size"));
    }

    #[test]
    fn test_filter_by_id() {
        let definition = extruder();
        assert!(DefinitionFilter::by_id("fdm_extruder_0").matches(&definition));
        assert!(!DefinitionFilter::by_id("other").matches(&definition));
    }

    #[test]
    fn test_filter_for_machine() {
        let definition = extruder();
        assert!(DefinitionFilter::for_machine("generic_fdm").matches(&definition));
        assert!(!DefinitionFilter::for_machine("other_machine").matches(&definition));

        let machine = Definition::new("generic_fdm", "Generic FDM");
        assert!(!DefinitionFilter::for_machine("generic_fdm").matches(&machine));
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(DefinitionFilter::default().matches(&extruder()));
    }
}
