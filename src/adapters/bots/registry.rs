//! Registry of automated opponents selectable by name.

use std::collections::HashMap;
use std::sync::Arc;

use super::UciEngine;
use crate::config::BotsConfig;
use crate::ports::{EngineError, MoveEngine};

/// Named move engines.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<String, Arc<dyn MoveEngine>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// One UCI engine per configured entry.
    pub fn from_config(config: &BotsConfig) -> Self {
        let mut registry = Self::new();
        for (name, engine) in &config.engines {
            registry.register(Arc::new(UciEngine::from_config(name.clone(), engine)));
        }
        registry
    }

    /// Register an engine under its own name, replacing any previous one.
    pub fn register(&mut self, engine: Arc<dyn MoveEngine>) {
        self.engines.insert(engine.name().to_string(), engine);
    }

    pub fn with_engine(mut self, engine: Arc<dyn MoveEngine>) -> Self {
        self.register(engine);
        self
    }

    /// Look up an engine by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn MoveEngine>, EngineError> {
        self.engines
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownEngine(name.to_string()))
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.engines.keys().cloned().collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.names())
            .finish()
    }
}
