//! The settings data model: scalar values, immutable definitions and mutable
//! instance containers.
//!
//! Definitions describe what a machine or extruder *can* be configured with;
//! instance containers hold the overrides one stack layer actually applies.

pub mod definition;
pub mod instance;
pub mod value;

pub use definition::{Definition, DefinitionFilter, SettingDecl};
pub use instance::{ContainerError, ContainerType, InstanceContainer, InstanceFilter};
pub use value::SettingValue;

/// Well-known metadata keys shared between definitions, containers and stacks.
pub mod meta {
    /// Extruder slot index. Declared by extruder definitions and copied onto
    /// the extruder stack built from them.
    pub const POSITION: &str = "position";

    /// On an extruder definition: the parent machine definition id.
    /// On a user container: the global stack the container belongs to.
    pub const MACHINE: &str = "machine";

    /// On a user container: the extruder stack the container belongs to.
    pub const EXTRUDER: &str = "extruder";

    /// On a profile container: the machine definition it is specific to.
    /// Absent means the container is generic and fits any machine.
    pub const DEFINITION: &str = "definition";

    /// On a material container: the variant (by name) it is specific to.
    pub const VARIANT: &str = "variant";

    /// On a quality container: the material (by id) it is specific to.
    pub const MATERIAL: &str = "material";

    /// On a machine or extruder definition: the container names resolved for
    /// the `default` layer selectors.
    pub const PREFERRED_VARIANT: &str = "preferred_variant";
    pub const PREFERRED_MATERIAL: &str = "preferred_material";
    pub const PREFERRED_QUALITY: &str = "preferred_quality";
}
