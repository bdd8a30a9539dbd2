//! Container stacks: ordered setting layers over a definition.
//!
//! A stack owns nothing but references: six optional layer slots pointing at
//! instance containers by id, the shared definition at the bottom, and an
//! optional `next_stack` link an extruder stack uses to fall back to its
//! machine's global stack. Setting lookup walks the layers from most to least
//! specific.

use crate::registry::ContainerRegistry;
use crate::settings::meta;
use crate::settings::{ContainerType, Definition, SettingValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Whether a stack configures the whole machine or a single extruder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackKind {
    Global,
    Extruder,
}

impl StackKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StackKind::Global => "global",
            StackKind::Extruder => "extruder",
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The six mutable layers of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    UserChanges,
    QualityChanges,
    Quality,
    Material,
    Variant,
    DefinitionChanges,
}

impl LayerKind {
    /// Layer walk order for setting lookup, most specific first. The
    /// definition's defaults sit below all six.
    pub const LOOKUP_ORDER: [LayerKind; 6] = [
        LayerKind::UserChanges,
        LayerKind::QualityChanges,
        LayerKind::Quality,
        LayerKind::Material,
        LayerKind::Variant,
        LayerKind::DefinitionChanges,
    ];

    /// The container type a layer slot accepts.
    pub fn container_type(&self) -> ContainerType {
        match self {
            LayerKind::UserChanges => ContainerType::User,
            LayerKind::QualityChanges => ContainerType::QualityChanges,
            LayerKind::Quality => ContainerType::Quality,
            LayerKind::Material => ContainerType::Material,
            LayerKind::Variant => ContainerType::Variant,
            LayerKind::DefinitionChanges => ContainerType::DefinitionChanges,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::UserChanges => "user_changes",
            LayerKind::QualityChanges => "quality_changes",
            LayerKind::Quality => "quality",
            LayerKind::Material => "material",
            LayerKind::Variant => "variant",
            LayerKind::DefinitionChanges => "definition_changes",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered set of setting layers for one machine or one extruder.
///
/// Layer slots hold container ids, not containers; the registry remains the
/// single owner of every container. A slot left `None` is simply skipped
/// during lookup, as is a slot whose id no longer resolves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerStack {
    id: String,
    name: String,
    kind: StackKind,
    definition: Arc<Definition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_changes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quality_changes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    quality: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    material: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    definition_changes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    next_stack: Option<String>,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl ContainerStack {
    /// Creates a stack with every layer slot empty. The name defaults to the
    /// id.
    pub fn new(id: impl Into<String>, kind: StackKind, definition: Arc<Definition>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            definition,
            user_changes: None,
            quality_changes: None,
            quality: None,
            material: None,
            variant: None,
            definition_changes: None,
            next_stack: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
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

    pub fn kind(&self) -> StackKind {
        self.kind
    }

    pub fn definition(&self) -> &Arc<Definition> {
        &self.definition
    }

    pub fn add_metadata_entry(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.metadata.insert(key.into(), value.into());
    }

    pub fn metadata_entry(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// The extruder slot recorded on this stack. `None` when the entry is
    /// missing or not an integer.
    pub fn position(&self) -> Option<u32> {
        self.metadata_entry(meta::POSITION)?.trim().parse().ok()
    }

    /// The stack consulted when no layer of this one carries a value. Extruder
    /// stacks link to their machine's global stack.
    pub fn next_stack(&self) -> Option<&str> {
        self.next_stack.as_deref()
    }

    pub fn set_next_stack(&mut self, stack_id: impl Into<String>) {
        self.next_stack = Some(stack_id.into());
    }

    fn layer_slot(&self, kind: LayerKind) -> &Option<String> {
        match kind {
            LayerKind::UserChanges => &self.user_changes,
            LayerKind::QualityChanges => &self.quality_changes,
            LayerKind::Quality => &self.quality,
            LayerKind::Material => &self.material,
            LayerKind::Variant => &self.variant,
            LayerKind::DefinitionChanges => &self.definition_changes,
        }
    }

    fn layer_slot_mut(&mut self, kind: LayerKind) -> &mut Option<String> {
        match kind {
            LayerKind::UserChanges => &mut self.user_changes,
            LayerKind::QualityChanges => &mut self.quality_changes,
            LayerKind::Quality => &mut self.quality,
            LayerKind::Material => &mut self.material,
            LayerKind::Variant => &mut self.variant,
            LayerKind::DefinitionChanges => &mut self.definition_changes,
        }
    }

    /// The container id occupying a layer, if any.
    pub fn layer(&self, kind: LayerKind) -> Option<&str> {
        self.layer_slot(kind).as_deref()
    }

    pub fn set_layer(&mut self, kind: LayerKind, container_id: impl Into<String>) {
        *self.layer_slot_mut(kind) = Some(container_id.into());
    }

    pub fn clear_layer(&mut self, kind: LayerKind) {
        *self.layer_slot_mut(kind) = None;
    }

    pub fn user_changes(&self) -> Option<&str> {
        self.layer(LayerKind::UserChanges)
    }

    pub fn set_user_changes(&mut self, container_id: impl Into<String>) {
        self.set_layer(LayerKind::UserChanges, container_id);
    }

    pub fn quality_changes(&self) -> Option<&str> {
        self.layer(LayerKind::QualityChanges)
    }

    pub fn set_quality_changes(&mut self, container_id: impl Into<String>) {
        self.set_layer(LayerKind::QualityChanges, container_id);
    }

    pub fn quality(&self) -> Option<&str> {
        self.layer(LayerKind::Quality)
    }

    pub fn set_quality(&mut self, container_id: impl Into<String>) {
        self.set_layer(LayerKind::Quality, container_id);
    }

    pub fn material(&self) -> Option<&str> {
        self.layer(LayerKind::Material)
    }

    pub fn set_material(&mut self, container_id: impl Into<String>) {
        self.set_layer(LayerKind::Material, container_id);
    }

    pub fn variant(&self) -> Option<&str> {
        self.layer(LayerKind::Variant)
    }

    pub fn set_variant(&mut self, container_id: impl Into<String>) {
        self.set_layer(LayerKind::Variant, container_id);
    }

    pub fn definition_changes(&self) -> Option<&str> {
        self.layer(LayerKind::DefinitionChanges)
    }

    pub fn set_definition_changes(&mut self, container_id: impl Into<String>) {
        self.set_layer(LayerKind::DefinitionChanges, container_id);
    }

    /// Resolves a setting by walking the layers in [`LayerKind::LOOKUP_ORDER`],
    /// then the definition's declared default, then the next stack.
    ///
    /// Layer ids that no longer resolve in the registry are skipped, so a
    /// stale slot degrades to the less specific layers instead of failing.
    pub fn resolve_value(&self, key: &str, registry: &ContainerRegistry) -> Option<SettingValue> {
        for kind in LayerKind::LOOKUP_ORDER {
            let Some(container_id) = self.layer(kind) else {
                continue;
            };
            match registry.instance(container_id) {
                Some(container) => {
                    if let Some(value) = container.value(key) {
                        return Some(value.clone());
                    }
                }
                None => {
                    debug!(
                        stack = %self.id,
                        layer = %kind,
                        container = container_id,
                        "layer points at an unregistered container, skipping"
                    );
                }
            }
        }

        if let Some(value) = self.definition.default_value(key) {
            return Some(value.clone());
        }

        let next = self.next_stack.as_deref()?;
        registry.stack(next)?.resolve_value(key, registry)
    }
}
