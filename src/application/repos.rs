//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::entities::{AuthorRecord, CommentRecord, GroupRecord, PostRecord};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Which slice of the post timeline a feed query covers.
#[derive(Debug, Clone)]
pub enum PostScope {
    All,
    Group(Uuid),
    Author(Uuid),
    Authors(Vec<Uuid>),
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: Uuid,
    pub group_id: Option<Uuid>,
    pub text: String,
    pub image_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PostUpdate {
    pub id: Uuid,
    pub text: String,
    pub group_id: Option<Uuid>,
    /// `None` keeps the stored image; `Some` replaces it.
    pub image_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: Uuid,
    pub author_id: Uuid,
    pub text: String,
}

#[async_trait]
pub trait AuthorsRepo: Send + Sync {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<AuthorRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorRecord>, RepoError>;
}

#[async_trait]
pub trait GroupsRepo: Send + Sync {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError>;

    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn count_posts(&self, scope: &PostScope) -> Result<u64, RepoError>;

    /// Posts in the scope ordered `created_at DESC, id DESC`.
    async fn list_page(
        &self,
        scope: &PostScope,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    async fn create_post(&self, post: NewPost) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, update: PostUpdate) -> Result<PostRecord, RepoError>;
}

#[async_trait]
pub trait CommentsRepo: Send + Sync {
    /// Comments for a post ordered `created_at ASC, id ASC`.
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError>;

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRecord, RepoError>;
}

#[async_trait]
pub trait FollowsRepo: Send + Sync {
    /// Insert the edge if absent. Returns whether a new edge was created;
    /// the store's uniqueness constraint arbitrates concurrent callers.
    async fn create_edge(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError>;

    /// Remove the edge if present. Returns whether an edge was removed.
    async fn delete_edge(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError>;

    async fn edge_exists(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError>;

    async fn followed_author_ids(&self, follower_id: Uuid) -> Result<Vec<Uuid>, RepoError>;
}
