//! In-process role store for tests and embedded use.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::{Permission, Role};
use super::store::RoleStore;
use crate::error::StoreError;

#[derive(Debug, Default)]
struct State {
    roles: HashMap<Uuid, Role>,
    grants: HashMap<Uuid, Vec<Permission>>,
    assignments: HashMap<Uuid, Vec<Uuid>>,
}

#[derive(Debug, Default)]
pub struct MemoryRoleStore {
    state: RwLock<State>,
}

impl MemoryRoleStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a role with its grants.
    pub async fn with_role(self, role: Role, permissions: Vec<Permission>) -> Self {
        {
            let mut state = self.state.write().await;
            state.grants.insert(role.id, permissions);
            state.roles.insert(role.id, role);
        }
        self
    }
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn find_roles_by_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let state = self.state.read().await;
        let roles = state
            .assignments
            .get(&user_id)
            .map(|role_ids| {
                role_ids
                    .iter()
                    .filter_map(|role_id| state.roles.get(role_id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        Ok(roles)
    }

    async fn find_permissions_by_role(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        let state = self.state.read().await;
        Ok(state.grants.get(&role_id).cloned().unwrap_or_default())
    }

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, StoreError> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let state = self.state.read().await;
        Ok(state.roles.values().find(|role| role.name == name).cloned())
    }

    async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        _assigned_by: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let assigned = state.assignments.entry(user_id).or_default();
        if !assigned.contains(&role_id) {
            assigned.push(role_id);
        }
        Ok(())
    }

    async fn remove_role_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(assigned) = state.assignments.get_mut(&user_id) else {
            return Ok(false);
        };
        let before = assigned.len();
        assigned.retain(|id| *id != role_id);
        Ok(assigned.len() != before)
    }

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.roles.insert(role.id, role.clone());
        state.grants.entry(role.id).or_default();
        Ok(())
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        state.grants.remove(&role_id);
        for assigned in state.assignments.values_mut() {
            assigned.retain(|id| *id != role_id);
        }
        Ok(state.roles.remove(&role_id).is_some())
    }

    async fn add_permission(&self, role_id: Uuid, permission: &Permission) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let grants = state.grants.entry(role_id).or_default();
        if !grants
            .iter()
            .any(|p| p.resource == permission.resource && p.action == permission.action)
        {
            grants.push(permission.clone());
        }
        Ok(())
    }

    async fn remove_permission(
        &self,
        role_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(grants) = state.grants.get_mut(&role_id) else {
            return Ok(false);
        };
        let before = grants.len();
        grants.retain(|p| !(p.resource == resource && p.action == action));
        Ok(grants.len() != before)
    }
}
