pub mod context;
pub mod permissions;
pub mod rate_limit;
pub mod risk;
pub mod roles;
pub mod schema;
pub mod trust;

// Internal "interpreter" for `Action`.
mod run;

#[derive(Debug)]
pub enum Action {
    Permissions(permissions::Args),
    Roles(roles::Args),
    RateLimit(rate_limit::Args),
    Risk(risk::Args),
    Trust(trust::Args),
    Schema(schema::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> anyhow::Result<()> {
        run::execute(self).await
    }
}
