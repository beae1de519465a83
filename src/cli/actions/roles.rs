use anyhow::Result;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::context::{EngineArgs, connect_engine, print_json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Assign {
        user_id: Uuid,
        role_id: Uuid,
        assigned_by: Option<Uuid>,
    },
    Remove {
        user_id: Uuid,
        role_id: Uuid,
    },
}

#[derive(Debug)]
pub struct Args {
    pub engine: EngineArgs,
    pub operation: Operation,
}

/// Execute a role assignment change.
/// # Errors
/// Returns an error if the role does not exist or the role store fails.
pub async fn execute(args: Args) -> Result<()> {
    let engine = connect_engine(&args.engine).await?;
    let authorizer = engine.authorizer();

    match args.operation {
        Operation::Assign {
            user_id,
            role_id,
            assigned_by,
        } => {
            authorizer.assign_role(user_id, role_id, assigned_by).await?;
            info!(%user_id, %role_id, "Role assigned");
            print_json(&json!({ "user_id": user_id, "role_id": role_id, "status": "assigned" }))
        }
        Operation::Remove { user_id, role_id } => {
            authorizer.remove_role(user_id, role_id).await?;
            info!(%user_id, %role_id, "Role removed");
            print_json(&json!({ "user_id": user_id, "role_id": role_id, "status": "removed" }))
        }
    }
}
