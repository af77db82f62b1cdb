use async_trait::async_trait;
use sqlx::{query_as, query_scalar};
use uuid::Uuid;

use crate::application::repos::{FollowsRepo, RepoError};

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl FollowsRepo for PostgresRepositories {
    async fn create_edge(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError> {
        // ON CONFLICT DO NOTHING makes concurrent follow requests converge
        // on a single edge; RETURNING tells us whether this call inserted it.
        let inserted = query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO follows (id, follower_id, followed_id, created_at)
            VALUES ($1, $2, $3, now())
            ON CONFLICT (follower_id, followed_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(follower_id)
        .bind(followed_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(inserted.is_some())
    }

    async fn delete_edge(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError> {
        let result = sqlx::query(
            r#"
            DELETE FROM follows
            WHERE follower_id = $1 AND followed_id = $2
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn edge_exists(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError> {
        let exists: bool = query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM follows
                WHERE follower_id = $1 AND followed_id = $2
            )
            "#,
        )
        .bind(follower_id)
        .bind(followed_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(exists)
    }

    async fn followed_author_ids(&self, follower_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let ids: Vec<Uuid> = query_scalar(
            r#"
            SELECT followed_id
            FROM follows
            WHERE follower_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(follower_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(ids)
    }
}
