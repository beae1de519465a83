use anyhow::Result;
use uuid::Uuid;

use super::context::{EngineArgs, connect_engine, print_json};

#[derive(Debug)]
pub struct Args {
    pub engine: EngineArgs,
    pub session_id: Uuid,
}

/// Recompute the trust score of a session and persist it.
/// # Errors
/// Returns an error if the session does not exist or the store fails.
pub async fn execute(args: Args) -> Result<()> {
    let engine = connect_engine(&args.engine).await?;
    let session = engine.establish_session_trust(args.session_id).await?;
    print_json(&serde_json::json!({
        "session_id": session.id,
        "user_id": session.user_id,
        "trust_score": session.trust_score(),
        "is_trusted": session.is_trusted,
    }))
}
