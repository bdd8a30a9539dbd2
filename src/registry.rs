//! The container registry: single owner of all definitions, instance
//! containers and stacks.
//!
//! Everything a stack references lives here, addressed by id. The registry
//! also provides the unique-name service the machine builder relies on:
//! candidate names are checked against every registered id *and* display name
//! so a new machine can never shadow an existing container.
//!
//! Registries are small (one per application), so lookup is a linear scan and
//! iteration order is insertion order.

use crate::settings::{
    ContainerType, Definition, DefinitionFilter, InstanceContainer, InstanceFilter,
};
use crate::stack::ContainerStack;
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Fallback base for [`ContainerRegistry::unique_name`] when the seed strips
/// down to nothing.
const EMPTY_SEED_FALLBACK: &str = "container";

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A container with this id is already registered. Ids are compared
    /// case-insensitively.
    #[error("a container with id '{0}' is already registered")]
    Duplicate(String),

    /// The paired stack/user commit was handed a container that is not
    /// attached as the stack's user-changes layer, or is not of type `user`.
    #[error("container '{user}' is not a valid user container for stack '{stack}'")]
    UserContainerMismatch { stack: String, user: String },
}

/// In-memory store for definitions, instance containers and stacks.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    definitions: Vec<Arc<Definition>>,
    instances: Vec<InstanceContainer>,
    stacks: Vec<ContainerStack>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn id_taken(&self, id: &str) -> bool {
        self.definitions
            .iter()
            .any(|d| d.id().eq_ignore_ascii_case(id))
            || self
                .instances
                .iter()
                .any(|c| c.id().eq_ignore_ascii_case(id))
            || self.stacks.iter().any(|s| s.id().eq_ignore_ascii_case(id))
    }

    /// The stronger check used by the naming service: a candidate collides
    /// when it matches any registered id or display name.
    fn name_or_id_taken(&self, candidate: &str) -> bool {
        if self.id_taken(candidate) {
            return true;
        }
        self.definitions
            .iter()
            .any(|d| d.name().eq_ignore_ascii_case(candidate))
            || self
                .instances
                .iter()
                .any(|c| c.name().eq_ignore_ascii_case(candidate))
            || self
                .stacks
                .iter()
                .any(|s| s.name().eq_ignore_ascii_case(candidate))
    }

    /// Registers a definition and returns the shared handle the rest of the
    /// model holds on to.
    pub fn add_definition(&mut self, definition: Definition) -> Result<Arc<Definition>, RegistryError> {
        if self.id_taken(definition.id()) {
            return Err(RegistryError::Duplicate(definition.id().to_string()));
        }
        let definition = Arc::new(definition);
        self.definitions.push(Arc::clone(&definition));
        Ok(definition)
    }

    pub fn find_definitions(&self, filter: &DefinitionFilter) -> Vec<Arc<Definition>> {
        self.definitions
            .iter()
            .filter(|d| filter.matches(d))
            .cloned()
            .collect()
    }

    pub fn definition(&self, id: &str) -> Option<Arc<Definition>> {
        self.definitions.iter().find(|d| d.id() == id).cloned()
    }

    pub fn add_instance(&mut self, container: InstanceContainer) -> Result<(), RegistryError> {
        if self.id_taken(container.id()) {
            return Err(RegistryError::Duplicate(container.id().to_string()));
        }
        self.instances.push(container);
        Ok(())
    }

    pub fn find_instances(&self, filter: &InstanceFilter) -> Vec<&InstanceContainer> {
        self.instances.iter().filter(|c| filter.matches(c)).collect()
    }

    pub fn instance(&self, id: &str) -> Option<&InstanceContainer> {
        self.instances.iter().find(|c| c.id() == id)
    }

    pub fn instance_mut(&mut self, id: &str) -> Option<&mut InstanceContainer> {
        self.instances.iter_mut().find(|c| c.id() == id)
    }

    pub fn add_stack(&mut self, stack: ContainerStack) -> Result<(), RegistryError> {
        if self.id_taken(stack.id()) {
            return Err(RegistryError::Duplicate(stack.id().to_string()));
        }
        self.stacks.push(stack);
        Ok(())
    }

    pub fn stack(&self, id: &str) -> Option<&ContainerStack> {
        self.stacks.iter().find(|s| s.id() == id)
    }

    pub fn stack_mut(&mut self, id: &str) -> Option<&mut ContainerStack> {
        self.stacks.iter_mut().find(|s| s.id() == id)
    }

    pub fn stacks(&self) -> impl Iterator<Item = &ContainerStack> {
        self.stacks.iter()
    }

    /// Commits a stack and its user container as a single unit.
    ///
    /// Both ids are vacancy-checked before either is inserted, so a rejected
    /// pair leaves the registry untouched. The container must already be
    /// attached as the stack's user-changes layer and have type `user`.
    pub fn register_stack(
        &mut self,
        stack: ContainerStack,
        user: InstanceContainer,
    ) -> Result<(), RegistryError> {
        if user.container_type() != ContainerType::User
            || stack.user_changes() != Some(user.id())
        {
            return Err(RegistryError::UserContainerMismatch {
                stack: stack.id().to_string(),
                user: user.id().to_string(),
            });
        }
        if self.id_taken(stack.id()) || user.id().eq_ignore_ascii_case(stack.id()) {
            return Err(RegistryError::Duplicate(stack.id().to_string()));
        }
        if self.id_taken(user.id()) {
            return Err(RegistryError::Duplicate(user.id().to_string()));
        }

        debug!(
            stack = stack.id(),
            user = user.id(),
            kind = %stack.kind(),
            "registering stack with its user container"
        );
        self.stacks.push(stack);
        self.instances.push(user);
        Ok(())
    }

    /// Derives a unique name for a new container of the given kind.
    ///
    /// The proposed name is trimmed and stripped of any trailing `#N`
    /// duplicate suffix; an empty result falls back to `fallback`. Numbering
    /// then starts at `#2` until the candidate is free. A candidate equal to
    /// `current_name` is accepted as-is, so renaming a container to its own
    /// name never picks up a suffix.
    pub fn create_unique_name(
        &self,
        kind: &str,
        current_name: &str,
        proposed: &str,
        fallback: &str,
    ) -> String {
        let base = strip_duplicate_suffix(proposed);
        let base = if base.is_empty() { fallback } else { base };

        let name = self.next_free_name(base, Some(current_name));
        debug!(kind, proposed, name = %name, "created unique name");
        name
    }

    /// Derives a unique id from a seed, typically an existing definition id.
    pub fn unique_name(&self, seed: &str) -> String {
        let base = strip_duplicate_suffix(seed);
        let base = if base.is_empty() {
            EMPTY_SEED_FALLBACK
        } else {
            base
        };
        self.next_free_name(base, None)
    }

    fn next_free_name(&self, base: &str, current_name: Option<&str>) -> String {
        let mut candidate = base.to_string();
        let mut i = 1;
        while self.name_or_id_taken(&candidate) && Some(candidate.as_str()) != current_name {
            i += 1;
            candidate = format!("{} #{}", base, i);
        }
        candidate
    }
}

/// Strips a trailing ` #N` duplicate marker so re-deriving a name from
/// "My Printer #2" numbers from "My Printer", not "My Printer #2 #2".
fn strip_duplicate_suffix(name: &str) -> &str {
    let name = name.trim();
    let re = Regex::new(r"^(.*?)\s*#\d+$").expect("valid regex");
    match re.captures(name) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => name,
    }
}
