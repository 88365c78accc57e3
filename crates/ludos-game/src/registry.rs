//! Game module registry: game type → module.
//!
//! Built once at startup with [`ModuleRegistryBuilder`], then frozen.
//! The frozen registry is an immutable map behind an `Arc`, so cloning
//! it and resolving from any task needs no locking.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use ludos_types::GameType;

use crate::{GameDescriptor, GameError, GameModule};

/// A module together with the descriptor it reported at registration.
#[derive(Clone)]
pub struct RegisteredModule {
    pub descriptor: GameDescriptor,
    pub module: Arc<dyn GameModule>,
}

impl fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Collects modules during startup.
#[derive(Debug, Default)]
pub struct ModuleRegistryBuilder {
    modules: HashMap<GameType, RegisteredModule>,
}

impl ModuleRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a module under the game type its descriptor names.
    ///
    /// # Errors
    /// - [`GameError::InvalidDescriptor`] if the descriptor's bounds are unusable
    /// - [`GameError::DuplicateGameType`] if the tag is already taken
    pub fn register(&mut self, module: impl GameModule) -> Result<&mut Self, GameError> {
        let descriptor = module.describe();
        descriptor.validate()?;
        if self.modules.contains_key(&descriptor.game_type) {
            return Err(GameError::DuplicateGameType(descriptor.game_type));
        }
        tracing::info!(
            game_type = %descriptor.game_type,
            min = descriptor.min_players,
            max = descriptor.max_players,
            "game module registered"
        );
        self.modules.insert(
            descriptor.game_type.clone(),
            RegisteredModule {
                descriptor,
                module: Arc::new(module),
            },
        );
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> ModuleRegistry {
        ModuleRegistry {
            modules: Arc::new(self.modules),
        }
    }
}

/// Frozen game type → module map. Cheap to clone.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Arc<HashMap<GameType, RegisteredModule>>,
}

impl ModuleRegistry {
    pub fn builder() -> ModuleRegistryBuilder {
        ModuleRegistryBuilder::new()
    }

    /// Looks up the module for a game type.
    ///
    /// # Errors
    /// [`GameError::UnknownGameType`] if nothing is registered under it.
    pub fn resolve(&self, game_type: &GameType) -> Result<&RegisteredModule, GameError> {
        self.modules
            .get(game_type)
            .ok_or_else(|| GameError::UnknownGameType(game_type.clone()))
    }

    /// All registered game types, sorted.
    pub fn game_types(&self) -> Vec<GameType> {
        let mut types: Vec<GameType> = self.modules.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleRegistry")
            .field("game_types", &self.game_types())
            .finish()
    }
}
