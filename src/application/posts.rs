//! Post authoring: create, edit, and comment operations.

use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use crate::application::repos::{
    AuthorsRepo, CommentsRepo, GroupsRepo, NewComment, NewPost, PostUpdate, PostsRepo,
    PostsWriteRepo, RepoError,
};
use crate::domain::entities::{CommentRecord, PostRecord};
use crate::domain::error::ValidationError;
use crate::domain::posts::{validate_comment_text, validate_post_text};
use crate::domain::viewer::Viewer;

#[derive(Debug, Error)]
pub enum PostError {
    #[error("operation requires an authenticated viewer")]
    AuthenticationRequired,
    #[error("unknown post")]
    UnknownPost,
    #[error("unknown group slug")]
    UnknownGroup,
    #[error("unknown author handle")]
    UnknownAuthor,
    #[error("{0}")]
    InvalidText(String),
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<ValidationError> for PostError {
    fn from(err: ValidationError) -> Self {
        PostError::InvalidText(err.into_message())
    }
}

/// Submitted post form content.
#[derive(Debug, Clone, Default)]
pub struct PostInput {
    pub text: String,
    pub group_slug: Option<String>,
    /// Stored upload path for a freshly submitted image; `None` keeps the
    /// existing image on edit.
    pub image_path: Option<String>,
}

/// What happened when a viewer tried to edit a post.
#[derive(Debug, Clone)]
pub enum EditOutcome {
    Updated(PostRecord),
    /// The viewer is authenticated but does not own the post; policy is to
    /// bounce them to the read-only detail view, leaving the post intact.
    NotOwner { post_id: Uuid },
}

/// A post with its comment thread, resolved for one viewer.
#[derive(Debug, Clone)]
pub struct PostDetail {
    pub post: PostRecord,
    pub comments: Vec<CommentRecord>,
    pub viewer_is_owner: bool,
}

#[derive(Clone)]
pub struct PostService {
    posts: Arc<dyn PostsRepo>,
    posts_write: Arc<dyn PostsWriteRepo>,
    groups: Arc<dyn GroupsRepo>,
    authors: Arc<dyn AuthorsRepo>,
    comments: Arc<dyn CommentsRepo>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        posts_write: Arc<dyn PostsWriteRepo>,
        groups: Arc<dyn GroupsRepo>,
        authors: Arc<dyn AuthorsRepo>,
        comments: Arc<dyn CommentsRepo>,
    ) -> Self {
        Self {
            posts,
            posts_write,
            groups,
            authors,
            comments,
        }
    }

    pub async fn create_post(
        &self,
        viewer: &Viewer,
        input: PostInput,
    ) -> Result<PostRecord, PostError> {
        let author = self.require_author(viewer).await?;
        let text = validate_post_text(&input.text)?;
        let group_id = self.resolve_group(input.group_slug.as_deref()).await?;

        let record = self
            .posts_write
            .create_post(NewPost {
                author_id: author.id,
                group_id,
                text,
                image_path: input.image_path,
            })
            .await?;
        Ok(record)
    }

    pub async fn edit_post(
        &self,
        viewer: &Viewer,
        post_id: Uuid,
        input: PostInput,
    ) -> Result<EditOutcome, PostError> {
        let author = self.require_author(viewer).await?;
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::UnknownPost)?;

        if post.author_id != author.id {
            return Ok(EditOutcome::NotOwner { post_id });
        }

        let text = validate_post_text(&input.text)?;
        let group_id = self.resolve_group(input.group_slug.as_deref()).await?;

        let updated = self
            .posts_write
            .update_post(PostUpdate {
                id: post.id,
                text,
                group_id,
                image_path: input.image_path,
            })
            .await?;
        Ok(EditOutcome::Updated(updated))
    }

    pub async fn add_comment(
        &self,
        viewer: &Viewer,
        post_id: Uuid,
        text: &str,
    ) -> Result<CommentRecord, PostError> {
        let author = self.require_author(viewer).await?;
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::UnknownPost)?;
        let text = validate_comment_text(text)?;

        let record = self
            .comments
            .create_comment(NewComment {
                post_id: post.id,
                author_id: author.id,
                text,
            })
            .await?;
        Ok(record)
    }

    pub async fn detail(&self, post_id: Uuid, viewer: &Viewer) -> Result<PostDetail, PostError> {
        let post = self
            .posts
            .find_by_id(post_id)
            .await?
            .ok_or(PostError::UnknownPost)?;
        let comments = self.comments.list_for_post(post.id).await?;
        let viewer_is_owner = viewer.is_handle(&post.author_handle);

        Ok(PostDetail {
            post,
            comments,
            viewer_is_owner,
        })
    }

    pub async fn list_groups(&self) -> Result<Vec<crate::domain::entities::GroupRecord>, PostError> {
        Ok(self.groups.list_all().await?)
    }

    async fn require_author(
        &self,
        viewer: &Viewer,
    ) -> Result<crate::domain::entities::AuthorRecord, PostError> {
        let handle = viewer.handle().ok_or(PostError::AuthenticationRequired)?;
        self.authors
            .find_by_handle(handle)
            .await?
            .ok_or(PostError::UnknownAuthor)
    }

    async fn resolve_group(&self, slug: Option<&str>) -> Result<Option<Uuid>, PostError> {
        match slug {
            None => Ok(None),
            Some(slug) if slug.trim().is_empty() => Ok(None),
            Some(slug) => {
                let group = self
                    .groups
                    .find_by_slug(slug)
                    .await?
                    .ok_or(PostError::UnknownGroup)?;
                Ok(Some(group.id))
            }
        }
    }
}
