use async_trait::async_trait;
use sqlx::query_as;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{CommentsRepo, NewComment, RepoError},
    domain::entities::CommentRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

#[derive(sqlx::FromRow)]
struct CommentRow {
    id: Uuid,
    post_id: Uuid,
    author_id: Uuid,
    author_handle: String,
    text: String,
    created_at: OffsetDateTime,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: row.id,
            post_id: row.post_id,
            author_id: row.author_id,
            author_handle: row.author_handle,
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CommentsRepo for PostgresRepositories {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let rows = query_as::<_, CommentRow>(
            r#"
            SELECT c.id, c.post_id, c.author_id, a.handle AS author_handle,
                   c.text, c.created_at
            FROM comments c
            INNER JOIN authors a ON a.id = c.author_id
            WHERE c.post_id = $1
            ORDER BY c.created_at ASC, c.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRecord, RepoError> {
        let NewComment {
            post_id,
            author_id,
            text,
        } = comment;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let row = query_as::<_, CommentRow>(
            r#"
            WITH inserted AS (
                INSERT INTO comments (id, post_id, author_id, text, created_at)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id, post_id, author_id, text, created_at
            )
            SELECT i.id, i.post_id, i.author_id, a.handle AS author_handle,
                   i.text, i.created_at
            FROM inserted i
            INNER JOIN authors a ON a.id = i.author_id
            "#,
        )
        .bind(id)
        .bind(post_id)
        .bind(author_id)
        .bind(text)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(CommentRecord::from(row))
    }
}
