use anyhow::Result;
use serde_json::json;
use uuid::Uuid;

use super::context::{EngineArgs, connect_engine, print_json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Show { user_id: Uuid },
    Check { user_id: Uuid, resource: String, action: String },
    InvalidateUser { user_id: Uuid },
    InvalidateAll,
}

#[derive(Debug)]
pub struct Args {
    pub engine: EngineArgs,
    pub operation: Operation,
}

/// Execute a permissions operation.
/// # Errors
/// Returns an error if the database is unreachable or the role store fails.
pub async fn execute(args: Args) -> Result<()> {
    let engine = connect_engine(&args.engine).await?;
    let authorizer = engine.authorizer();

    match args.operation {
        Operation::Show { user_id } => {
            let permissions = authorizer.get_user_permissions(user_id).await?;
            print_json(&json!({ "user_id": user_id, "permissions": permissions }))
        }
        Operation::Check {
            user_id,
            resource,
            action,
        } => {
            let allowed = authorizer
                .check_permission(user_id, &resource, &action)
                .await?;
            print_json(&json!({
                "user_id": user_id,
                "resource": resource,
                "action": action,
                "allowed": allowed,
            }))
        }
        Operation::InvalidateUser { user_id } => {
            authorizer.invalidate_user_permission_cache(user_id).await;
            print_json(&json!({ "user_id": user_id, "invalidated": true }))
        }
        Operation::InvalidateAll => {
            let removed = authorizer.invalidate_all_permission_caches().await;
            print_json(&json!({ "invalidated": removed }))
        }
    }
}
