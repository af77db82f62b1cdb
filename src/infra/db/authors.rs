use async_trait::async_trait;
use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{AuthorsRepo, RepoError},
    domain::entities::AuthorRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct AuthorRow {
    id: Uuid,
    handle: String,
    created_at: OffsetDateTime,
}

impl From<AuthorRow> for AuthorRecord {
    fn from(row: AuthorRow) -> Self {
        Self {
            id: row.id,
            handle: row.handle,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl AuthorsRepo for PostgresRepositories {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<AuthorRecord>, RepoError> {
        let row = query_as::<_, AuthorRow>(
            r#"
            SELECT id, handle, created_at
            FROM authors
            WHERE handle = $1
            "#,
        )
        .bind(handle)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AuthorRecord::from))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorRecord>, RepoError> {
        let row = query_as::<_, AuthorRow>(
            r#"
            SELECT id, handle, created_at
            FROM authors
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AuthorRecord::from))
    }
}
