use async_trait::async_trait;
use sqlx::{QueryBuilder, query_as};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::{
    application::repos::{NewPost, PostScope, PostUpdate, PostsRepo, PostsWriteRepo, RepoError},
    domain::entities::PostRecord,
};

use super::{PostgresRepositories, map_sqlx_error};

const POST_SELECT_COLUMNS: &str = "p.id, p.author_id, a.handle AS author_handle, \
     p.group_id, g.slug AS group_slug, g.title AS group_title, \
     p.text, p.image_path, p.created_at";

const POST_SELECT_JOINS: &str = " FROM posts p \
     INNER JOIN authors a ON a.id = p.author_id \
     LEFT JOIN groups g ON g.id = p.group_id ";

#[derive(sqlx::FromRow)]
struct PostRow {
    id: Uuid,
    author_id: Uuid,
    author_handle: String,
    group_id: Option<Uuid>,
    group_slug: Option<String>,
    group_title: Option<String>,
    text: String,
    image_path: Option<String>,
    created_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            author_id: row.author_id,
            author_handle: row.author_handle,
            group_id: row.group_id,
            group_slug: row.group_slug,
            group_title: row.group_title,
            text: row.text,
            image_path: row.image_path,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl PostsRepo for PostgresRepositories {
    async fn count_posts(&self, scope: &PostScope) -> Result<u64, RepoError> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM posts p WHERE 1=1 ");
        Self::apply_post_scope(&mut qb, scope);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn list_page(
        &self,
        scope: &PostScope,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let mut qb = QueryBuilder::new("SELECT ");
        qb.push(POST_SELECT_COLUMNS);
        qb.push(POST_SELECT_JOINS);
        qb.push(" WHERE 1=1 ");
        Self::apply_post_scope(&mut qb, scope);
        qb.push(" ORDER BY p.created_at DESC, p.id DESC ");
        qb.push(" LIMIT ");
        qb.push_bind(i64::from(limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = qb
            .build_query_as::<PostRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_SELECT_COLUMNS}{POST_SELECT_JOINS} WHERE p.id = $1");
        let row = query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresRepositories {
    async fn create_post(&self, post: NewPost) -> Result<PostRecord, RepoError> {
        let NewPost {
            author_id,
            group_id,
            text,
            image_path,
        } = post;

        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let inserted_id: Uuid = query_as::<_, (Uuid,)>(
            r#"
            INSERT INTO posts (id, author_id, group_id, text, image_path, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(author_id)
        .bind(group_id)
        .bind(text)
        .bind(image_path)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .0;

        self.find_by_id(inserted_id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn update_post(&self, update: PostUpdate) -> Result<PostRecord, RepoError> {
        let PostUpdate {
            id,
            text,
            group_id,
            image_path,
        } = update;

        // COALESCE keeps the stored image when no replacement was uploaded.
        let updated_id: Uuid = query_as::<_, (Uuid,)>(
            r#"
            UPDATE posts
            SET text = $2,
                group_id = $3,
                image_path = COALESCE($4, image_path)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(id)
        .bind(text)
        .bind(group_id)
        .bind(image_path)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?
        .0;

        self.find_by_id(updated_id)
            .await?
            .ok_or(RepoError::NotFound)
    }
}
