use anyhow::Result;
use serde_json::json;

use super::context::{EngineArgs, connect_engine, print_json};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Check {
        identifier: String,
        endpoint: String,
        trust_score: u8,
    },
    Reset {
        identifier: String,
        endpoint: String,
    },
}

#[derive(Debug)]
pub struct Args {
    pub engine: EngineArgs,
    pub operation: Operation,
}

/// Execute a rate-limit operation.
/// # Errors
/// Returns an error if the database is unreachable or a reset fails.
pub async fn execute(args: Args) -> Result<()> {
    let engine = connect_engine(&args.engine).await?;
    let limiter = engine.rate_limiter();

    match args.operation {
        Operation::Check {
            identifier,
            endpoint,
            trust_score,
        } => {
            let result = limiter
                .check_rate_limit(&identifier, &endpoint, trust_score)
                .await;
            print_json(&result)
        }
        Operation::Reset {
            identifier,
            endpoint,
        } => {
            limiter.reset_rate_limit(&identifier, &endpoint).await?;
            print_json(&json!({ "identifier": identifier, "endpoint": endpoint, "reset": true }))
        }
    }
}
