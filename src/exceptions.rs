//! Exception app allowlist
//!
//! Apps in this set never trigger reminders, whatever the behavior state.

use crate::error::CoachError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Apps exempt on first run (phone, maps, emergency, camera)
pub const DEFAULT_EXCEPTION_APPS: [&str; 4] = ["전화", "지도", "응급상황", "카메라"];

/// Case-sensitive set of exempt app names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExceptionApps {
    names: BTreeSet<String>,
}

impl Default for ExceptionApps {
    fn default() -> Self {
        Self {
            names: DEFAULT_EXCEPTION_APPS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ExceptionApps {
    /// An empty allowlist
    pub fn empty() -> Self {
        Self {
            names: BTreeSet::new(),
        }
    }

    /// Add a name. Surrounding whitespace is trimmed first.
    pub fn add(&mut self, name: &str) -> Result<(), CoachError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoachError::InvalidSetting(
                "exception app name must not be empty".to_string(),
            ));
        }
        if self.names.contains(name) {
            return Err(CoachError::DuplicateException(name.to_string()));
        }
        self.names.insert(name.to_string());
        Ok(())
    }

    /// Remove a name; returns whether it was present
    pub fn remove(&mut self, name: &str) -> bool {
        self.names.remove(name.trim())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn as_set(&self) -> &BTreeSet<String> {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
