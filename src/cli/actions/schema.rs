use anyhow::{Context, Result};
use serde_json::json;

use super::context::{EngineArgs, connect, print_json};
use crate::cache::PgCacheStore;

#[derive(Debug)]
pub struct Args {
    pub engine: EngineArgs,
}

/// Create the cache tables owned by this service and drop expired rows.
/// # Errors
/// Returns an error if the DDL fails.
pub async fn execute(args: Args) -> Result<()> {
    let pool = connect(&args.engine).await?;
    let cache = PgCacheStore::new(pool);
    cache
        .apply_schema()
        .await
        .context("Failed to apply cache schema")?;
    let purged = cache
        .purge_expired()
        .await
        .context("Failed to purge expired cache entries")?;
    print_json(&json!({ "schema": "applied", "purged": purged }))
}
