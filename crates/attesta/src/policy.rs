//! Scheme membership and per-requestor authorization, both loaded from the
//! server configuration.

use std::collections::{HashMap, HashSet};

use attesta_core::{AttributeId, AttributeScheme, PolicyStore};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};

/// Attribute scheme and authorization policy backed by the config file.
pub struct ConfiguredPolicy {
    known: HashSet<AttributeId>,
    authorized: HashMap<String, Vec<String>>,
}

impl ConfiguredPolicy {
    pub fn from_config(config: &ServerConfig) -> ServerResult<Self> {
        let mut known = HashSet::new();
        for attribute in &config.scheme.attributes {
            let id = AttributeId::parse(attribute).ok_or_else(|| {
                ServerError::Config(format!("invalid scheme attribute '{}'", attribute))
            })?;
            known.insert(id);
        }
        let authorized = config
            .requestors
            .iter()
            .map(|r| (r.name.clone(), r.authorized.clone()))
            .collect();
        Ok(Self { known, authorized })
    }
}

impl AttributeScheme for ConfiguredPolicy {
    fn knows(&self, attribute: &AttributeId) -> bool {
        self.known.contains(attribute)
    }
}

impl PolicyStore for ConfiguredPolicy {
    fn is_authorized(&self, issuer: &str, attribute: &AttributeId) -> bool {
        let Some(patterns) = self.authorized.get(issuer) else {
            return false;
        };
        patterns
            .iter()
            .any(|pattern| pattern_matches(pattern, attribute))
    }
}

/// Match an authorization pattern against an attribute id: `*` matches
/// everything, `prefix.*` matches anything under the prefix, anything else
/// matches literally.
fn pattern_matches(pattern: &str, attribute: &AttributeId) -> bool {
    if pattern == "*" {
        return true;
    }
    if let Some(prefix) = pattern.strip_suffix(".*") {
        return attribute
            .as_str()
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.'));
    }
    attribute.as_str() == pattern
}
