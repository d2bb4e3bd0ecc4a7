use sqlx::query;

use crate::application::repos::{HealthRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait::async_trait]
impl HealthRepo for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        query("SELECT 1")
            .execute(self.pool())
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }
}
