//! slicestack - hierarchical settings stacks for 3D-printer configuration
//!
//! This library models how a slicer configures a printer: immutable machine
//! and extruder definitions at the bottom, layers of override containers on
//! top, and a builder that assembles a complete machine (one global stack
//! plus one stack per extruder) against a shared container registry.
//!
//! # Core Concepts
//!
//! - **Definition**: read-only template describing the settings a machine or
//!   extruder model exposes, with defaults and metadata
//! - **Instance Container**: a named, mutable bag of setting overrides; one
//!   container fills one layer of a stack
//! - **Stack**: ordered layers (user changes, quality changes, quality,
//!   material, variant, definition changes) resolved top to bottom, with an
//!   optional fallback link from extruder stacks to their global stack
//! - **Registry**: owns every definition, container and stack; enforces id
//!   uniqueness and derives collision-free names for new machines
//!
//! # Example Usage
//!
//! ```
//! use slicestack::settings::meta;
//! use slicestack::{ContainerRegistry, Definition, StackBuilder};
//!
//! let mut registry = ContainerRegistry::new();
//! registry
//!     .add_definition(Definition::new("generic_fdm", "Generic FDM Printer"))
//!     .unwrap();
//! registry
//!     .add_definition(
//!         Definition::new("fdm_extruder_0", "Extruder 1")
//!             .with_metadata_entry(meta::MACHINE, "generic_fdm")
//!             .with_metadata_entry(meta::POSITION, "0"),
//!     )
//!     .unwrap();
//!
//! let mut builder = StackBuilder::new(&mut registry);
//! let global_id = builder
//!     .create_machine("My Printer", "generic_fdm")
//!     .unwrap()
//!     .expect("definition is registered");
//!
//! let global = registry.stack(&global_id).unwrap();
//! assert_eq!(global.name(), "My Printer");
//! assert_eq!(registry.stacks().count(), 2); // the global stack and one extruder
//! ```
//!
//! # Project Structure
//!
//! - [`settings`]: setting values, definitions and instance containers
//! - [`stack`]: the layered stack model and setting resolution
//! - [`registry`]: container storage, lookup and the unique-name service
//! - [`builder`]: machine, global-stack and extruder-stack factories
//!
//! # Construction Contract
//!
//! Stack assembly is ordered and transactional: layers are applied as
//! definition changes, variant, material, quality, quality changes — later
//! steps may depend on earlier ones — and the stack is registered together
//! with its user container only after every layer resolved. A failure leaves
//! the registry untouched.

// Public modules
pub mod builder;
pub mod registry;
pub mod settings;
pub mod stack;

// Re-export key types for convenient access
pub use builder::{
    BuildError, ExtruderStackOptions, GlobalStackOptions, LayerSelector, StackBuilder,
};
pub use registry::{ContainerRegistry, RegistryError};
pub use settings::{
    ContainerError, ContainerType, Definition, DefinitionFilter, InstanceContainer,
    InstanceFilter, SettingDecl, SettingValue,
};
pub use stack::{ContainerStack, LayerKind, StackKind};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
