//! Follow graph operations: directed "viewer follows author" edges.

use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{AuthorsRepo, FollowsRepo, RepoError};
use crate::domain::entities::AuthorRecord;
use crate::domain::viewer::Viewer;

#[derive(Debug, Error)]
pub enum FollowError {
    #[error("following requires an authenticated viewer")]
    AuthenticationRequired,
    #[error("an author cannot follow themselves")]
    SelfFollow,
    #[error("unknown author handle")]
    UnknownAuthor,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FollowService {
    authors: Arc<dyn AuthorsRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FollowService {
    pub fn new(authors: Arc<dyn AuthorsRepo>, follows: Arc<dyn FollowsRepo>) -> Self {
        Self { authors, follows }
    }

    /// Create the follow edge. Idempotent: an already-present edge is a
    /// successful no-op; the store's uniqueness constraint settles races.
    pub async fn follow(&self, viewer: &Viewer, target_handle: &str) -> Result<(), FollowError> {
        let (follower, target) = self.resolve_pair(viewer, target_handle).await?;
        match self.follows.create_edge(follower.id, target.id).await {
            Ok(_) => Ok(()),
            // A concurrent caller won the insert; the edge exists, which is
            // all this operation promises.
            Err(RepoError::Duplicate { .. }) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    /// Remove the follow edge. Idempotent: an absent edge is a successful
    /// no-op.
    pub async fn unfollow(&self, viewer: &Viewer, target_handle: &str) -> Result<(), FollowError> {
        let (follower, target) = self.resolve_pair(viewer, target_handle).await?;
        self.follows.delete_edge(follower.id, target.id).await?;
        Ok(())
    }

    /// Whether the viewer follows the author; always false for an
    /// anonymous viewer.
    pub async fn is_following(
        &self,
        viewer: &Viewer,
        author_handle: &str,
    ) -> Result<bool, FollowError> {
        let Some(handle) = viewer.handle() else {
            return Ok(false);
        };
        let Some(follower) = self.authors.find_by_handle(handle).await? else {
            return Ok(false);
        };
        let Some(author) = self.authors.find_by_handle(author_handle).await? else {
            return Ok(false);
        };
        Ok(self.follows.edge_exists(follower.id, author.id).await?)
    }

    async fn resolve_pair(
        &self,
        viewer: &Viewer,
        target_handle: &str,
    ) -> Result<(AuthorRecord, AuthorRecord), FollowError> {
        let handle = viewer.handle().ok_or(FollowError::AuthenticationRequired)?;
        if viewer.is_handle(target_handle) {
            return Err(FollowError::SelfFollow);
        }
        let target = self
            .authors
            .find_by_handle(target_handle)
            .await?
            .ok_or(FollowError::UnknownAuthor)?;
        let follower = self
            .authors
            .find_by_handle(handle)
            .await?
            .ok_or(FollowError::UnknownAuthor)?;
        Ok((follower, target))
    }
}
