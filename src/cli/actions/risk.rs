use anyhow::Result;

use super::context::{EngineArgs, connect_engine, print_json};
use crate::risk::LoginContext;

#[derive(Debug)]
pub struct Args {
    pub engine: EngineArgs,
    pub context: LoginContext,
}

/// Score a login against the stored history and print the decision.
/// # Errors
/// Returns an error for malformed input or an unreachable history store.
pub async fn execute(args: Args) -> Result<()> {
    let engine = connect_engine(&args.engine).await?;
    let decision = engine.evaluate_login(&args.context).await?;
    print_json(&decision)
}
