//! Credential resolution
//!
//! Turns a raw credential (an API key) into the principal acting on the log.
//! The core only depends on `CredentialResolver`; how keys are provisioned
//! is up to the deployment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::ApiKeyConfig;
use crate::policy::Role;

/// Resolved caller: who they are and what role they hold
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Recorded as `actor` on entries this principal writes
    pub name: String,
    pub role: Role,
}

impl Principal {
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
        }
    }
}

pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<Principal>;
}

impl<F> CredentialResolver for F
where
    F: Fn(&str) -> Option<Principal> + Send + Sync,
{
    fn resolve(&self, credential: &str) -> Option<Principal> {
        self(credential)
    }
}

/// Fixed key table loaded from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticKeyResolver {
    keys: HashMap<String, Principal>,
}

impl StaticKeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(keys: &[ApiKeyConfig]) -> Self {
        keys.iter().fold(Self::new(), |resolver, key| {
            resolver.with_key(key.key.clone(), Principal::new(key.name.clone(), key.role))
        })
    }

    pub fn with_key(mut self, key: impl Into<String>, principal: Principal) -> Self {
        self.keys.insert(key.into(), principal);
        self
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl CredentialResolver for StaticKeyResolver {
    fn resolve(&self, credential: &str) -> Option<Principal> {
        if credential.is_empty() {
            return None;
        }
        let principal = self.keys.get(credential).cloned();
        if principal.is_none() {
            debug!("Unknown API key presented");
        }
        principal
    }
}
