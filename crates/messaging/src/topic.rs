//! Logical topic names resolved to physical names from the environment.
//!
//! Code refers to topics by the name of the environment variable holding the
//! physical name (e.g. `COMMAND_TOPIC_INVENTORY`). Every name a process uses
//! is resolved once at startup; a missing variable is fatal.

use std::collections::HashMap;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    /// One or more topic environment variables are unset or empty.
    #[error("Unresolved topic environment variables: {}", .0.join(", "))]
    Unresolved(Vec<String>),

    /// A topic name was used that was never registered.
    #[error("Unknown topic: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Default)]
pub struct TopicRegistry {
    physical: HashMap<String, String>,
    logical: HashMap<String, String>,
}

impl TopicRegistry {
    /// Resolves every name from the process environment.
    pub fn from_env<I, S>(names: I) -> Result<Self, TopicError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::from_lookup(names, |name| std::env::var(name).ok())
    }

    /// Resolves every name through `lookup`, reporting all missing names at once.
    pub fn from_lookup<I, S, F>(names: I, lookup: F) -> Result<Self, TopicError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        F: Fn(&str) -> Option<String>,
    {
        let mut registry = Self::default();
        let mut missing = Vec::new();

        for name in names {
            let name = name.as_ref();
            match lookup(name).filter(|v| !v.trim().is_empty()) {
                Some(physical) => registry.insert(name, physical),
                None => missing.push(name.to_string()),
            }
        }

        if missing.is_empty() {
            Ok(registry)
        } else {
            missing.sort();
            missing.dedup();
            Err(TopicError::Unresolved(missing))
        }
    }

    /// A registry where each physical name equals its logical name.
    pub fn identity<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::default();
        for name in names {
            registry.insert(name.as_ref(), name.as_ref().to_string());
        }
        registry
    }

    fn insert(&mut self, name: &str, physical: String) {
        self.logical.insert(physical.clone(), name.to_string());
        self.physical.insert(name.to_string(), physical);
    }

    /// Returns the physical topic for a logical name.
    pub fn resolve(&self, name: &str) -> Result<&str, TopicError> {
        self.physical
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| TopicError::Unknown(name.to_string()))
    }

    /// Returns the logical name a physical topic was registered under.
    pub fn logical_name(&self, physical: &str) -> Option<&str> {
        self.logical.get(physical).map(String::as_str)
    }

    /// Iterates over registered logical names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.physical.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.physical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.physical.is_empty()
    }
}
