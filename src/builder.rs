//! Stack builders: assemble and register machine and extruder stacks.
//!
//! `create_machine` is the entry point: it resolves a machine definition,
//! builds one global stack, then one extruder stack per extruder definition
//! the machine declares. Each stack is configured fully in memory and only
//! then committed to the registry together with its user container, so a
//! failure while resolving a layer never publishes a half-built stack.

use crate::registry::{ContainerRegistry, RegistryError};
use crate::settings::{
    meta, ContainerType, Definition, DefinitionFilter, InstanceContainer, InstanceFilter,
};
use crate::stack::{ContainerStack, LayerKind, StackKind};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BuildError {
    /// An explicitly requested layer id does not exist in the registry.
    #[error("no {expected} container with id '{id}'")]
    LayerNotFound { id: String, expected: ContainerType },

    /// An explicitly requested layer id exists but holds a container of the
    /// wrong type.
    #[error("container '{id}' has type {actual}, expected {expected}")]
    LayerTypeMismatch {
        id: String,
        expected: ContainerType,
        actual: ContainerType,
    },

    /// Committing the finished stack/user pair failed.
    #[error("registration failed: {0}")]
    Registry(#[from] RegistryError),
}

/// How a variant, material or quality layer is chosen at build time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayerSelector {
    /// Resolve the stack definition's `preferred_*` metadata entry. Best
    /// effort: when nothing compatible matches, the layer stays unset.
    Default,
    /// Use exactly this container id. Strict: a missing id or a type
    /// mismatch fails the build.
    Id(String),
}

impl LayerSelector {
    pub fn id(id: impl Into<String>) -> Self {
        LayerSelector::Id(id.into())
    }
}

/// Layer choices for a new global stack. A `None` field leaves that layer
/// unset.
#[derive(Debug, Clone, Default)]
pub struct GlobalStackOptions {
    pub definition_changes: Option<String>,
    pub variant: Option<LayerSelector>,
    pub material: Option<LayerSelector>,
    pub quality: Option<LayerSelector>,
    pub quality_changes: Option<String>,
}

impl GlobalStackOptions {
    /// Default selectors for variant, material and quality; what
    /// `create_machine` asks for.
    pub fn preferred_defaults() -> Self {
        Self {
            variant: Some(LayerSelector::Default),
            material: Some(LayerSelector::Default),
            quality: Some(LayerSelector::Default),
            ..Self::default()
        }
    }
}

/// Layer choices for a new extruder stack.
#[derive(Debug, Clone, Default)]
pub struct ExtruderStackOptions {
    pub definition_changes: Option<String>,
    pub variant: Option<LayerSelector>,
    pub material: Option<LayerSelector>,
    pub quality: Option<LayerSelector>,
    pub quality_changes: Option<String>,
    /// Stack to fall back to for settings no layer of this stack carries.
    /// Applied before any layer is configured, so layer resolution may rely
    /// on the parent.
    pub next_stack: Option<String>,
}

impl ExtruderStackOptions {
    pub fn preferred_defaults() -> Self {
        Self {
            variant: Some(LayerSelector::Default),
            material: Some(LayerSelector::Default),
            quality: Some(LayerSelector::Default),
            ..Self::default()
        }
    }
}

/// Factory for machines and their stacks, operating on a borrowed registry.
pub struct StackBuilder<'r> {
    registry: &'r mut ContainerRegistry,
}

impl<'r> StackBuilder<'r> {
    pub fn new(registry: &'r mut ContainerRegistry) -> Self {
        Self { registry }
    }

    /// Creates a complete machine from a definition id: one global stack plus
    /// one extruder stack per extruder definition declared for the machine.
    ///
    /// Returns the global stack's id, or `Ok(None)` when no definition with
    /// the given id exists. Extruder stacks are discoverable through the
    /// registry only.
    pub fn create_machine(
        &mut self,
        name: &str,
        definition_id: &str,
    ) -> Result<Option<String>, BuildError> {
        let Some(machine_definition) = self
            .registry
            .find_definitions(&DefinitionFilter::by_id(definition_id))
            .into_iter()
            .next()
        else {
            warn!(definition = definition_id, "machine definition was not found");
            return Ok(None);
        };

        let machine_name =
            self.registry
                .create_unique_name("machine", "", name, machine_definition.name());
        info!(
            machine = %machine_name,
            definition = definition_id,
            "creating machine"
        );

        let global_id = self.create_global_stack(
            &machine_name,
            &machine_definition,
            &GlobalStackOptions::preferred_defaults(),
        )?;

        let extruder_definitions = self
            .registry
            .find_definitions(&DefinitionFilter::for_machine(machine_definition.id()));
        for extruder_definition in extruder_definitions {
            if extruder_definition.position().is_none() {
                warn!(
                    extruder = extruder_definition.id(),
                    "extruder definition specifies no position metadata entry"
                );
            }

            let extruder_id = self.registry.unique_name(extruder_definition.id());
            let options = ExtruderStackOptions {
                next_stack: Some(global_id.clone()),
                ..ExtruderStackOptions::preferred_defaults()
            };
            self.create_extruder_stack(
                &extruder_id,
                &extruder_definition,
                &machine_definition,
                &options,
            )?;
        }

        Ok(Some(global_id))
    }

    /// Assembles and registers a global stack.
    ///
    /// The stack and its user container are built in memory, layered in the
    /// contractual order and committed as a pair in the final step; any error
    /// on the way aborts with nothing registered.
    pub fn create_global_stack(
        &mut self,
        stack_id: &str,
        definition: &Arc<Definition>,
        options: &GlobalStackOptions,
    ) -> Result<String, BuildError> {
        debug!(stack = stack_id, definition = definition.id(), "assembling global stack");

        let mut stack = ContainerStack::new(stack_id, StackKind::Global, Arc::clone(definition));

        let mut user_container =
            InstanceContainer::new(format!("{}_user", stack_id), ContainerType::User);
        user_container.add_metadata_entry(meta::MACHINE, stack_id);
        user_container.add_metadata_entry(meta::DEFINITION, definition.id());
        user_container.attach_definition(Arc::clone(definition));
        stack.set_user_changes(user_container.id());

        // The order matters: material resolution may consult the variant set
        // just before it, quality resolution the material.
        if let Some(definition_changes) = options.definition_changes.as_deref() {
            self.set_layer_by_id(&mut stack, LayerKind::DefinitionChanges, definition_changes)?;
        }
        if let Some(variant) = &options.variant {
            self.set_stack_variant(&mut stack, variant)?;
        }
        if let Some(material) = &options.material {
            self.set_stack_material(&mut stack, material)?;
        }
        if let Some(quality) = &options.quality {
            self.set_stack_quality(&mut stack, quality)?;
        }
        if let Some(quality_changes) = options.quality_changes.as_deref() {
            self.set_layer_by_id(&mut stack, LayerKind::QualityChanges, quality_changes)?;
        }

        self.registry.register_stack(stack, user_container)?;
        Ok(stack_id.to_string())
    }

    /// Assembles and registers an extruder stack.
    ///
    /// Differences from a global stack: the stack carries the extruder
    /// definition and records its `position` metadata entry; the user
    /// container is tagged with `extruder=` instead of `machine=` and gets
    /// the *machine* definition as its validation scope; an optional
    /// `next_stack` link is applied before any layer.
    pub fn create_extruder_stack(
        &mut self,
        stack_id: &str,
        definition: &Arc<Definition>,
        machine_definition: &Arc<Definition>,
        options: &ExtruderStackOptions,
    ) -> Result<String, BuildError> {
        debug!(stack = stack_id, definition = definition.id(), "assembling extruder stack");

        let mut stack = ContainerStack::new(stack_id, StackKind::Extruder, Arc::clone(definition));
        if let Some(position) = definition.metadata_entry(meta::POSITION) {
            stack.add_metadata_entry(meta::POSITION, position);
        }

        let mut user_container =
            InstanceContainer::new(format!("{}_user", stack_id), ContainerType::User);
        user_container.add_metadata_entry(meta::EXTRUDER, stack_id);
        user_container.add_metadata_entry(meta::DEFINITION, machine_definition.id());
        user_container.attach_definition(Arc::clone(machine_definition));
        stack.set_user_changes(user_container.id());

        if let Some(next_stack) = options.next_stack.as_deref() {
            stack.set_next_stack(next_stack);
        }

        if let Some(definition_changes) = options.definition_changes.as_deref() {
            self.set_layer_by_id(&mut stack, LayerKind::DefinitionChanges, definition_changes)?;
        }
        if let Some(variant) = &options.variant {
            self.set_stack_variant(&mut stack, variant)?;
        }
        if let Some(material) = &options.material {
            self.set_stack_material(&mut stack, material)?;
        }
        if let Some(quality) = &options.quality {
            self.set_stack_quality(&mut stack, quality)?;
        }
        if let Some(quality_changes) = options.quality_changes.as_deref() {
            self.set_layer_by_id(&mut stack, LayerKind::QualityChanges, quality_changes)?;
        }

        self.registry.register_stack(stack, user_container)?;
        Ok(stack_id.to_string())
    }

    /// Strict by-id layer assignment: the container must exist and carry the
    /// layer's type.
    fn set_layer_by_id(
        &self,
        stack: &mut ContainerStack,
        kind: LayerKind,
        container_id: &str,
    ) -> Result<(), BuildError> {
        let expected = kind.container_type();
        let Some(container) = self.registry.instance(container_id) else {
            return Err(BuildError::LayerNotFound {
                id: container_id.to_string(),
                expected,
            });
        };
        if container.container_type() != expected {
            return Err(BuildError::LayerTypeMismatch {
                id: container_id.to_string(),
                expected,
                actual: container.container_type(),
            });
        }
        stack.set_layer(kind, container_id);
        Ok(())
    }

    fn set_stack_variant(
        &self,
        stack: &mut ContainerStack,
        selector: &LayerSelector,
    ) -> Result<(), BuildError> {
        if let LayerSelector::Id(id) = selector {
            return self.set_layer_by_id(stack, LayerKind::Variant, id);
        }

        let definition = Arc::clone(stack.definition());
        let Some(preferred) = definition.metadata_entry(meta::PREFERRED_VARIANT) else {
            return Ok(());
        };

        let candidates = self
            .registry
            .find_instances(&InstanceFilter::of_type(ContainerType::Variant).named(preferred));
        let mut best: Option<(&InstanceContainer, u8)> = None;
        for candidate in candidates {
            let Some(rank) = variant_rank(candidate, definition.id()) else {
                continue;
            };
            if best.map_or(true, |(_, best_rank)| rank > best_rank) {
                best = Some((candidate, rank));
            }
        }

        match best {
            Some((variant, _)) => {
                debug!(stack = stack.id(), variant = variant.id(), "resolved preferred variant");
                stack.set_variant(variant.id());
            }
            None => warn!(
                stack = stack.id(),
                preferred,
                "no compatible variant matches the preferred entry, leaving the layer unset"
            ),
        }
        Ok(())
    }

    fn set_stack_material(
        &self,
        stack: &mut ContainerStack,
        selector: &LayerSelector,
    ) -> Result<(), BuildError> {
        if let LayerSelector::Id(id) = selector {
            return self.set_layer_by_id(stack, LayerKind::Material, id);
        }

        let definition = Arc::clone(stack.definition());
        let Some(preferred) = definition.metadata_entry(meta::PREFERRED_MATERIAL) else {
            return Ok(());
        };

        // Materials may be specific to the variant chosen one step earlier;
        // compatibility compares against the variant's display name.
        let variant_name = stack
            .variant()
            .and_then(|id| self.registry.instance(id))
            .map(|c| c.name().to_string());

        let candidates = self
            .registry
            .find_instances(&InstanceFilter::of_type(ContainerType::Material).named(preferred));
        let mut best: Option<(&InstanceContainer, u8)> = None;
        for candidate in candidates {
            let Some(rank) = material_rank(candidate, definition.id(), variant_name.as_deref())
            else {
                continue;
            };
            if best.map_or(true, |(_, best_rank)| rank > best_rank) {
                best = Some((candidate, rank));
            }
        }

        match best {
            Some((material, _)) => {
                debug!(stack = stack.id(), material = material.id(), "resolved preferred material");
                stack.set_material(material.id());
            }
            None => warn!(
                stack = stack.id(),
                preferred,
                "no compatible material matches the preferred entry, leaving the layer unset"
            ),
        }
        Ok(())
    }

    fn set_stack_quality(
        &self,
        stack: &mut ContainerStack,
        selector: &LayerSelector,
    ) -> Result<(), BuildError> {
        if let LayerSelector::Id(id) = selector {
            return self.set_layer_by_id(stack, LayerKind::Quality, id);
        }

        let definition = Arc::clone(stack.definition());
        let Some(preferred) = definition.metadata_entry(meta::PREFERRED_QUALITY) else {
            return Ok(());
        };

        // Qualities may be specific to the material chosen one step earlier;
        // compatibility compares against the material container's id.
        let material_id = stack.material().map(str::to_string);

        let candidates = self
            .registry
            .find_instances(&InstanceFilter::of_type(ContainerType::Quality).named(preferred));
        let mut best: Option<(&InstanceContainer, u8)> = None;
        for candidate in candidates {
            let Some(rank) = quality_rank(candidate, definition.id(), material_id.as_deref())
            else {
                continue;
            };
            if best.map_or(true, |(_, best_rank)| rank > best_rank) {
                best = Some((candidate, rank));
            }
        }

        match best {
            Some((quality, _)) => {
                debug!(stack = stack.id(), quality = quality.id(), "resolved preferred quality");
                stack.set_quality(quality.id());
            }
            None => warn!(
                stack = stack.id(),
                preferred,
                "no compatible quality matches the preferred entry, leaving the layer unset"
            ),
        }
        Ok(())
    }
}

/// Specificity of a variant for a stack definition: machine-specific beats
/// generic, other machines' variants are out.
fn variant_rank(container: &InstanceContainer, definition_id: &str) -> Option<u8> {
    match container.metadata_entry(meta::DEFINITION) {
        None => Some(0),
        Some(d) if d == definition_id => Some(1),
        Some(_) => None,
    }
}

/// Specificity of a material: variant-specific beats machine-specific beats
/// generic. A material pinned to a variant the stack does not have is out.
fn material_rank(
    container: &InstanceContainer,
    definition_id: &str,
    variant_name: Option<&str>,
) -> Option<u8> {
    let definition_rank = match container.metadata_entry(meta::DEFINITION) {
        None => 0,
        Some(d) if d == definition_id => 1,
        Some(_) => return None,
    };
    match container.metadata_entry(meta::VARIANT) {
        None => Some(definition_rank),
        Some(v) if Some(v) == variant_name => Some(2),
        Some(_) => None,
    }
}

/// Specificity of a quality, mirroring [`material_rank`] with the material id
/// in place of the variant name.
fn quality_rank(
    container: &InstanceContainer,
    definition_id: &str,
    material_id: Option<&str>,
) -> Option<u8> {
    let definition_rank = match container.metadata_entry(meta::DEFINITION) {
        None => 0,
        Some(d) if d == definition_id => 1,
        Some(_) => return None,
    };
    match container.metadata_entry(meta::MATERIAL) {
        None => Some(definition_rank),
        Some(m) if Some(m) == material_id => Some(2),
        Some(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fdm_definition() -> Definition {
        Definition::new("generic_fdm", "Generic FDM Printer")
    }

    #[test]
    fn test_preferred_defaults_select_all_three_layers() {
        let options = GlobalStackOptions::preferred_defaults();
        assert_eq!(options.variant, Some(LayerSelector::Default));
        assert_eq!(options.material, Some(LayerSelector::Default));
        assert_eq!(options.quality, Some(LayerSelector::Default));
        assert!(options.definition_changes.is_none());
        assert!(options.quality_changes.is_none());

        let options = ExtruderStackOptions::preferred_defaults();
        assert_eq!(options.quality, Some(LayerSelector::Default));
        assert!(options.next_stack.is_none());
    }

    #[test]
    fn test_layer_selector_id_helper() {
        assert_eq!(LayerSelector::id("nozzle_04"), LayerSelector::Id("nozzle_04".to_string()));
    }

    #[test]
    fn test_global_stack_without_options_has_only_user_layer() {
        let mut registry = ContainerRegistry::new();
        let definition = registry.add_definition(fdm_definition()).unwrap();

        let mut builder = StackBuilder::new(&mut registry);
        let stack_id = builder
            .create_global_stack("my_printer", &definition, &GlobalStackOptions::default())
            .unwrap();
        assert_eq!(stack_id, "my_printer");

        let stack = registry.stack("my_printer").unwrap();
        assert_eq!(stack.user_changes(), Some("my_printer_user"));
        assert_eq!(stack.variant(), None);
        assert_eq!(stack.material(), None);
        assert_eq!(stack.quality(), None);

        let user = registry.instance("my_printer_user").unwrap();
        assert_eq!(user.container_type(), ContainerType::User);
        assert_eq!(user.metadata_entry(meta::MACHINE), Some("my_printer"));
        assert_eq!(user.metadata_entry(meta::EXTRUDER), None);
        assert_eq!(user.definition().unwrap().id(), "generic_fdm");
    }

    #[test]
    fn test_explicit_layer_id_must_exist() {
        let mut registry = ContainerRegistry::new();
        let definition = registry.add_definition(fdm_definition()).unwrap();

        let options = GlobalStackOptions {
            variant: Some(LayerSelector::id("no_such_variant")),
            ..GlobalStackOptions::default()
        };
        let mut builder = StackBuilder::new(&mut registry);
        let err = builder
            .create_global_stack("my_printer", &definition, &options)
            .unwrap_err();
        assert!(matches!(err, BuildError::LayerNotFound { .. }));
    }

    #[test]
    fn test_explicit_layer_id_must_match_type() {
        let mut registry = ContainerRegistry::new();
        let definition = registry.add_definition(fdm_definition()).unwrap();
        registry
            .add_instance(InstanceContainer::new("fine", ContainerType::Quality))
            .unwrap();

        // A quality container offered as quality_changes.
        let options = GlobalStackOptions {
            quality_changes: Some("fine".to_string()),
            ..GlobalStackOptions::default()
        };
        let mut builder = StackBuilder::new(&mut registry);
        let err = builder
            .create_global_stack("my_printer", &definition, &options)
            .unwrap_err();
        match err {
            BuildError::LayerTypeMismatch { expected, actual, .. } => {
                assert_eq!(expected, ContainerType::QualityChanges);
                assert_eq!(actual, ContainerType::Quality);
            }
            other => panic!("expected LayerTypeMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_variant_rank_prefers_machine_specific() {
        let generic = InstanceContainer::new("nozzle_04", ContainerType::Variant);
        let specific = InstanceContainer::new("fdm_nozzle_04", ContainerType::Variant)
            .with_metadata_entry(meta::DEFINITION, "generic_fdm");
        let foreign = InstanceContainer::new("other_nozzle", ContainerType::Variant)
            .with_metadata_entry(meta::DEFINITION, "other_machine");

        assert_eq!(variant_rank(&generic, "generic_fdm"), Some(0));
        assert_eq!(variant_rank(&specific, "generic_fdm"), Some(1));
        assert_eq!(variant_rank(&foreign, "generic_fdm"), None);
    }

    #[test]
    fn test_material_rank_requires_matching_variant() {
        let pinned = InstanceContainer::new("pla_04", ContainerType::Material)
            .with_metadata_entry(meta::VARIANT, "0.4 mm nozzle");

        assert_eq!(material_rank(&pinned, "generic_fdm", Some("0.4 mm nozzle")), Some(2));
        assert_eq!(material_rank(&pinned, "generic_fdm", Some("0.8 mm nozzle")), None);
        assert_eq!(material_rank(&pinned, "generic_fdm", None), None);
    }

    #[test]
    fn test_quality_rank_matches_material_by_id() {
        let pinned = InstanceContainer::new("fine_pla", ContainerType::Quality)
            .with_metadata_entry(meta::MATERIAL, "generic_pla");

        assert_eq!(quality_rank(&pinned, "generic_fdm", Some("generic_pla")), Some(2));
        assert_eq!(quality_rank(&pinned, "generic_fdm", Some("generic_abs")), None);
    }
}
