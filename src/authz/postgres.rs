//! Postgres role store.
//!
//! Reads `roles`, `role_permissions` and `user_roles` (see `sql/authz.sql`).
//! Deletes rely on `ON DELETE CASCADE` to drop grants and assignments.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use super::models::{Permission, Role};
use super::store::RoleStore;
use crate::error::StoreError;

const ROLE_COLUMNS: &str = "id, name, description, is_system, created_at";

#[derive(Debug, Clone)]
pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn db_span(operation: &'static str, statement: &str) -> tracing::Span {
    info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn role_from_row(row: &PgRow) -> Result<Role, sqlx::Error> {
    Ok(Role {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        is_system: row.try_get("is_system")?,
        created_at: row.try_get("created_at")?,
    })
}

fn permission_from_row(row: &PgRow) -> Result<Permission, sqlx::Error> {
    Ok(Permission {
        resource: row.try_get("resource")?,
        action: row.try_get("action")?,
        description: row.try_get("description")?,
    })
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn find_roles_by_user(&self, user_id: Uuid) -> Result<Vec<Role>, StoreError> {
        let query = "SELECT r.id, r.name, r.description, r.is_system, r.created_at \
                     FROM roles r JOIN user_roles ur ON ur.role_id = r.id \
                     WHERE ur.user_id = $1 ORDER BY r.name";
        let rows = sqlx::query(query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(rows.iter().map(role_from_row).collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_permissions_by_role(&self, role_id: Uuid) -> Result<Vec<Permission>, StoreError> {
        let query = "SELECT resource, action, description FROM role_permissions \
                     WHERE role_id = $1 ORDER BY resource, action";
        let rows = sqlx::query(query)
            .bind(role_id)
            .fetch_all(&self.pool)
            .instrument(db_span("SELECT", query))
            .await?;
        Ok(rows
            .iter()
            .map(permission_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn find_role_by_id(&self, role_id: Uuid) -> Result<Option<Role>, StoreError> {
        let query = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE id = $1");
        let row = sqlx::query(&query)
            .bind(role_id)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(role_from_row).transpose()?)
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let query = format!("SELECT {ROLE_COLUMNS} FROM roles WHERE name = $1");
        let row = sqlx::query(&query)
            .bind(name)
            .fetch_optional(&self.pool)
            .instrument(db_span("SELECT", &query))
            .await?;
        Ok(row.as_ref().map(role_from_row).transpose()?)
    }

    async fn assign_role_to_user(
        &self,
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    ) -> Result<(), StoreError> {
        let query = "INSERT INTO user_roles (user_id, role_id, assigned_by) VALUES ($1, $2, $3) \
                     ON CONFLICT (user_id, role_id) DO NOTHING";
        sqlx::query(query)
            .bind(user_id)
            .bind(role_id)
            .bind(assigned_by)
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn remove_role_from_user(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2";
        let result = sqlx::query(query)
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let query = format!("INSERT INTO roles ({ROLE_COLUMNS}) VALUES ($1, $2, $3, $4, $5)");
        sqlx::query(&query)
            .bind(role.id)
            .bind(&role.name)
            .bind(role.description.as_deref())
            .bind(role.is_system)
            .bind(role.created_at)
            .execute(&self.pool)
            .instrument(db_span("INSERT", &query))
            .await?;
        Ok(())
    }

    async fn delete_role(&self, role_id: Uuid) -> Result<bool, StoreError> {
        let query = "DELETE FROM roles WHERE id = $1";
        let result = sqlx::query(query)
            .bind(role_id)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn add_permission(&self, role_id: Uuid, permission: &Permission) -> Result<(), StoreError> {
        let query = "INSERT INTO role_permissions (role_id, resource, action, description) \
                     VALUES ($1, $2, $3, $4) \
                     ON CONFLICT (role_id, resource, action) DO NOTHING";
        sqlx::query(query)
            .bind(role_id)
            .bind(&permission.resource)
            .bind(&permission.action)
            .bind(permission.description.as_deref())
            .execute(&self.pool)
            .instrument(db_span("INSERT", query))
            .await?;
        Ok(())
    }

    async fn remove_permission(
        &self,
        role_id: Uuid,
        resource: &str,
        action: &str,
    ) -> Result<bool, StoreError> {
        let query =
            "DELETE FROM role_permissions WHERE role_id = $1 AND resource = $2 AND action = $3";
        let result = sqlx::query(query)
            .bind(role_id)
            .bind(resource)
            .bind(action)
            .execute(&self.pool)
            .instrument(db_span("DELETE", query))
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
