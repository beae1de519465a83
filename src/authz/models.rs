use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Matches any concrete resource or action.
pub const WILDCARD: &str = "*";

/// A `(resource, action)` grant. Either side may be [`WILDCARD`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub resource: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Permission {
    pub fn new(resource: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            action: action.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// `*:*`, which grants everything.
    #[must_use]
    pub fn super_admin() -> Self {
        Self::new(WILDCARD, WILDCARD).with_description("Full access")
    }

    #[must_use]
    pub fn matches(&self, resource: &str, action: &str) -> bool {
        (self.resource == WILDCARD || self.resource == resource)
            && (self.action == WILDCARD || self.action == action)
    }

    #[must_use]
    pub fn is_super_admin(&self) -> bool {
        self.resource == WILDCARD && self.action == WILDCARD
    }

    /// Parses `resource:action`.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let (resource, action) = value.split_once(':')?;
        let (resource, action) = (resource.trim(), action.trim());
        if resource.is_empty() || action.is_empty() {
            return None;
        }
        Some(Self::new(resource, action))
    }

    fn key(&self) -> (&str, &str) {
        (&self.resource, &self.action)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.resource, self.action)
    }
}

/// Drops repeated `(resource, action)` pairs, keeping the first occurrence.
#[must_use]
pub fn dedupe_permissions(permissions: Vec<Permission>) -> Vec<Permission> {
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(permissions.len());
    permissions
        .into_iter()
        .filter(|permission| {
            let (resource, action) = permission.key();
            seen.insert((resource.to_string(), action.to_string()))
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    /// System roles cannot be deleted or have their grants changed.
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Role {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            name: name.into(),
            description: None,
            is_system: false,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}
