use async_trait::async_trait;
use uuid::Uuid;

use super::models::{Permission, Role};
use crate::error::StoreError;

/// Authoritative role and permission data owned by the authorization store.
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_roles_by_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError>;

    async fn find_permissions_by_role(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError>;

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    /// Idempotent: assigning an already assigned role is not an error.
    async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<(), StoreError>;

    /// Returns `false` when the user did not hold the role.
    async fn remove_role_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError>;

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError>;

    /// Deletes the role together with its grants and assignments.
    async fn delete_role(&self, role_id: Uuid) -> Result<bool, StoreError>;

    async fn add_permission(&self, role_id: Uuid, permission: &Permission) -> Result<(), StoreError>;

    async fn remove_permission(
        &self,
        role_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, StoreError>;
}
