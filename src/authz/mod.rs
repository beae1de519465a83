//! Permission resolution with wildcard matching and a shared cache.
//!
//! Flow Overview:
//! 1) A user's effective permissions are the de-duplicated union of the grants
//!    of every role assigned to them.
//! 2) The union is cached per user under `permissions:user:<uuid>` for a fixed
//!    TTL. Cache failures are logged and the role store is consulted instead.
//! 3) Role assignment changes drop the affected user's entry. Grant changes on a
//!    role drop every user's entry, since there is no role-to-user index.
//!
//! The role store is authoritative: its errors propagate, and callers must
//! treat an `Err` from [`PermissionAuthorizer::check_permission`] as a denial.

mod memory;
mod models;
mod postgres;
mod store;

pub use memory::MemoryRoleStore;
pub use models::{Permission, Role, WILDCARD, dedupe_permissions};
pub use postgres::PgRoleStore;
pub use store::RoleStore;

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use crate::cache::CacheStore;
use crate::error::{Result, TrustError};

const DEFAULT_CACHE_TTL_SECONDS: u64 = 300;
const DEFAULT_KEY_PREFIX: &str = "permissions:user:";

#[derive(Clone, Debug)]
pub struct AuthorizerConfig {
    cache_ttl: Duration,
    key_prefix: String,
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl AuthorizerConfig {
    #[must_use]
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    #[must_use]
    pub fn cache_key(&self, user_id: Uuid) -> String {
        format!("{}{user_id}", self.key_prefix)
    }

    fn all_users_pattern(&self) -> String {
        format!("{}*", self.key_prefix)
    }
}

pub struct PermissionAuthorizer {
    roles: Arc<dyn RoleStore>,
    cache: Arc<dyn CacheStore>,
    config: AuthorizerConfig,
}

impl PermissionAuthorizer {
    pub fn new(
        roles: Arc<dyn RoleStore>,
        cache: Arc<dyn CacheStore>,
        config: AuthorizerConfig,
    ) -> Self {
        Self {
            roles,
            cache,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthorizerConfig {
        &self.config
    }

    /// Effective permission set of a user, served from the cache when possible.
    ///
    /// # Errors
    /// Returns an error only when the role store fails.
    #[instrument(skip(self))]
    pub async fn get_user_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>> {
        let key = self.config.cache_key(user_id);

        if let Some(permissions) = self.cached_permissions(&key).await {
            debug!(count = permissions.len(), "Permission cache hit");
            return Ok(permissions);
        }

        let permissions = self.load_permissions(user_id).await?;
        self.store_in_cache(&key, &permissions).await;
        Ok(permissions)
    }

    /// `true` iff any permission in the user's set matches.
    ///
    /// # Errors
    /// Returns an error when the role store fails; treat it as a denial.
    pub async fn check_permission(&self, user_id: Uuid, resource: &str, action: &str) -> Result<bool> {
        let permissions = self.get_user_permissions(user_id).await?;
        let allowed = permissions
            .iter()
            .any(|permission| permission.matches(resource, action));
        debug!(%user_id, resource, action, allowed, "Permission check");
        Ok(allowed)
    }

    /// `true` if any of the `(resource, action)` pairs is permitted.
    ///
    /// # Errors
    /// Returns an error when the role store fails.
    pub async fn check_any_permission(
        &self,
        user_id: Uuid,
        requested: &[(&str, &str)],
    ) -> Result<bool> {
        let permissions = self.get_user_permissions(user_id).await?;
        Ok(requested.iter().any(|(resource, action)| {
            permissions
                .iter()
                .any(|permission| permission.matches(resource, action))
        }))
    }

    /// # Errors
    /// Returns an error when the role store fails.
    pub async fn has_role(&self, user_id: Uuid, role_name: &str) -> Result<bool> {
        let roles = self.roles.find_roles_by_user(user_id).await?;
        Ok(roles.iter().any(|role| role.name == role_name))
    }

    /// # Errors
    /// `TrustError::NotFound` if the role does not exist, or a store error.
    #[instrument(skip(self))]
    pub async fn assign_role(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<()> {
        self.require_role(role_id).await?;
        self.roles
            .assign_role_to_user(user_id, role_id, assigned_by)
            .await?;
        self.invalidate_user_permission_cache(user_id).await;
        Ok(())
    }

    /// # Errors
    /// `TrustError::NotFound` if the role does not exist, or a store error.
    #[instrument(skip(self))]
    pub async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<()> {
        self.require_role(role_id).await?;
        let removed = self.roles.remove_role_from_user(user_id, role_id).await?;
        if !removed {
            debug!("User did not hold the role");
        }
        self.invalidate_user_permission_cache(user_id).await;
        Ok(())
    }

    /// Drops the user's cached permission set.
    ///
    /// A failed delete is retried once. If the retry fails too the error is
    /// only logged, and the previous set keeps being served until the cache
    /// TTL expires.
    pub async fn invalidate_user_permission_cache(&self, user_id: Uuid) {
        let key = self.config.cache_key(user_id);
        let Err(err) = self.cache.delete(&key).await else {
            return;
        };
        debug!(%user_id, "Retrying permission cache invalidation: {err}");
        if let Err(err) = self.cache.delete(&key).await {
            warn!(
                %user_id,
                ttl_seconds = self.config.cache_ttl().as_secs(),
                "Failed to invalidate permission cache, stale permissions may be served until expiry: {err}"
            );
        }
    }

    /// Drops every user's cached permissions.
    ///
    /// `role_id` only scopes the log line: without a reverse index from roles
    /// to users, the whole permission keyspace is cleared.
    pub async fn invalidate_role_permission_cache(&self, role_id: Uuid) {
        debug!(%role_id, "Role grants changed");
        self.invalidate_all_permission_caches().await;
    }

    /// Returns the number of cache entries removed, zero if the cache failed.
    pub async fn invalidate_all_permission_caches(&self) -> u64 {
        match self
            .cache
            .delete_pattern(&self.config.all_users_pattern())
            .await
        {
            Ok(removed) => {
                debug!(removed, "Invalidated permission caches");
                removed
            }
            Err(err) => {
                warn!("Failed to invalidate permission caches: {err}");
                0
            }
        }
    }

    /// Creates a non-system role with an initial set of grants.
    ///
    /// # Errors
    /// `TrustError::Validation` for an empty or duplicate name, or a store error.
    pub async fn create_role(
        &self,
        name: &str,
        description: Option<&str>,
        permissions: &[Permission],
    ) -> Result<Role> {
        let name = name.trim();
        if name.is_empty() {
            return Err(TrustError::Validation("role name must not be empty".into()));
        }
        if self.roles.find_role_by_name(name).await?.is_some() {
            return Err(TrustError::Validation(format!("role '{name}' already exists")));
        }

        let mut role = Role::new(name);
        if let Some(description) = description {
            role = role.with_description(description);
        }
        self.roles.insert_role(&role).await?;
        for permission in permissions {
            self.roles.add_permission(role.id, permission).await?;
        }
        debug!(role_id = %role.id, name, "Created role");
        Ok(role)
    }

    /// # Errors
    /// `TrustError::NotFound`, `TrustError::SystemRole`, or a store error.
    pub async fn delete_role(&self, role_id: Uuid) -> Result<()> {
        self.require_mutable_role(role_id).await?;
        self.roles.delete_role(role_id).await?;
        self.invalidate_role_permission_cache(role_id).await;
        Ok(())
    }

    /// # Errors
    /// `TrustError::NotFound`, `TrustError::SystemRole`, or a store error.
    pub async fn grant_permission(&self, role_id: Uuid, permission: &Permission) -> Result<()> {
        self.require_mutable_role(role_id).await?;
        self.roles.add_permission(role_id, permission).await?;
        self.invalidate_role_permission_cache(role_id).await;
        Ok(())
    }

    /// Returns `false` if the role did not carry the grant.
    ///
    /// # Errors
    /// `TrustError::NotFound`, `TrustError::SystemRole`, or a store error.
    pub async fn revoke_permission(&self, role_id: Uuid, resource: &str, action: &str) -> Result<bool> {
        self.require_mutable_role(role_id).await?;
        let removed = self
            .roles
            .remove_permission(role_id, resource, action)
            .await?;
        self.invalidate_role_permission_cache(role_id).await;
        Ok(removed)
    }

    async fn require_role(&self, role_id: Uuid) -> Result<Role> {
        self.roles
            .find_role_by_id(role_id)
            .await?
            .ok_or_else(|| TrustError::role_not_found(role_id))
    }

    async fn require_mutable_role(&self, role_id: Uuid) -> Result<Role> {
        let role = self.require_role(role_id).await?;
        if role.is_system {
            return Err(TrustError::SystemRole(role_id));
        }
        Ok(role)
    }

    async fn load_permissions(&self, user_id: Uuid) -> Result<Vec<Permission>> {
        let roles = self.roles.find_roles_by_user(user_id).await?;
        let mut permissions = Vec::new();
        for role in &roles {
            permissions.extend(self.roles.find_permissions_by_role(role.id).await?);
        }
        Ok(dedupe_permissions(permissions))
    }

    async fn cached_permissions(&self, key: &str) -> Option<Vec<Permission>> {
        let raw = match self.cache.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(err) => {
                warn!(key, "Permission cache read failed, using role store: {err}");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(permissions) => Some(permissions),
            Err(err) => {
                warn!(key, "Discarding unreadable permission cache entry: {err}");
                None
            }
        }
    }

    async fn store_in_cache(&self, key: &str, permissions: &[Permission]) {
        let raw = match serde_json::to_string(permissions) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(key, "Failed to serialize permissions for cache: {err}");
                return;
            }
        };
        if let Err(err) = self.cache.set(key, &raw, self.config.cache_ttl).await {
            warn!(key, "Permission cache write failed: {err}");
        }
    }
}
