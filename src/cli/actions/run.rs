use super::{Action, permissions, rate_limit, risk, roles, schema, trust};
use anyhow::Result;

pub(super) async fn execute(action: Action) -> Result<()> {
    match action {
        Action::Permissions(args) => permissions::execute(args).await,
        Action::Roles(args) => roles::execute(args).await,
        Action::RateLimit(args) => rate_limit::execute(args).await,
        Action::Risk(args) => risk::execute(args).await,
        Action::Trust(args) => trust::execute(args).await,
        Action::Schema(args) => schema::execute(args).await,
    }
}
