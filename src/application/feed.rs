//! Feed assembly: an ordered, paginated slice of posts for one view.

use std::sync::Arc;

use thiserror::Error;

use crate::application::pagination::{
    FEED_PAGE_SIZE, PageNumber, Paginated, clamp_page, offset, total_pages,
};
use crate::application::repos::{
    AuthorsRepo, FollowsRepo, GroupsRepo, PostScope, PostsRepo, RepoError,
};
use crate::domain::entities::{AuthorRecord, GroupRecord, PostRecord};
use crate::domain::viewer::Viewer;

/// The four feed views a reader can request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedView {
    Global,
    Group(String),
    Author(String),
    Following,
}

/// Assembled page plus the context the view resolved along the way.
#[derive(Debug, Clone)]
pub struct FeedPage {
    pub posts: Paginated<PostRecord>,
    pub group: Option<GroupRecord>,
    pub author: Option<AuthorRecord>,
    /// Whether the viewer follows the profiled author; only meaningful for
    /// `FeedView::Author`.
    pub viewer_follows_author: bool,
}

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("unknown group slug")]
    UnknownGroup,
    #[error("unknown author handle")]
    UnknownAuthor,
    #[error("feed requires an authenticated viewer")]
    AuthenticationRequired,
    #[error(transparent)]
    Repo(#[from] RepoError),
}

#[derive(Clone)]
pub struct FeedService {
    posts: Arc<dyn PostsRepo>,
    groups: Arc<dyn GroupsRepo>,
    authors: Arc<dyn AuthorsRepo>,
    follows: Arc<dyn FollowsRepo>,
}

impl FeedService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        groups: Arc<dyn GroupsRepo>,
        authors: Arc<dyn AuthorsRepo>,
        follows: Arc<dyn FollowsRepo>,
    ) -> Self {
        Self {
            posts,
            groups,
            authors,
            follows,
        }
    }

    /// Assemble one page of the requested view. Read-only: resolves the
    /// view to a post scope, counts, clamps the page, and fetches the
    /// slice.
    pub async fn assemble(
        &self,
        view: FeedView,
        viewer: &Viewer,
        page: PageNumber,
    ) -> Result<FeedPage, FeedError> {
        match view {
            FeedView::Global => {
                let posts = self.paginate(&PostScope::All, page).await?;
                Ok(FeedPage {
                    posts,
                    group: None,
                    author: None,
                    viewer_follows_author: false,
                })
            }
            FeedView::Group(slug) => {
                let group = self
                    .groups
                    .find_by_slug(&slug)
                    .await?
                    .ok_or(FeedError::UnknownGroup)?;
                let posts = self.paginate(&PostScope::Group(group.id), page).await?;
                Ok(FeedPage {
                    posts,
                    group: Some(group),
                    author: None,
                    viewer_follows_author: false,
                })
            }
            FeedView::Author(handle) => {
                let author = self
                    .authors
                    .find_by_handle(&handle)
                    .await?
                    .ok_or(FeedError::UnknownAuthor)?;
                let viewer_follows_author = self.viewer_follows(viewer, &author).await?;
                let posts = self.paginate(&PostScope::Author(author.id), page).await?;
                Ok(FeedPage {
                    posts,
                    group: None,
                    author: Some(author),
                    viewer_follows_author,
                })
            }
            FeedView::Following => {
                let handle = viewer.handle().ok_or(FeedError::AuthenticationRequired)?;
                let Some(follower) = self.authors.find_by_handle(handle).await? else {
                    // The identity layer vouched for a handle the store has
                    // never seen; such a viewer cannot own follow edges.
                    return Ok(FeedPage {
                        posts: Paginated::empty(),
                        group: None,
                        author: None,
                        viewer_follows_author: false,
                    });
                };
                let followed = self.follows.followed_author_ids(follower.id).await?;
                let posts = if followed.is_empty() {
                    Paginated::empty()
                } else {
                    self.paginate(&PostScope::Authors(followed), page).await?
                };
                Ok(FeedPage {
                    posts,
                    group: None,
                    author: None,
                    viewer_follows_author: false,
                })
            }
        }
    }

    async fn paginate(
        &self,
        scope: &PostScope,
        requested: PageNumber,
    ) -> Result<Paginated<PostRecord>, FeedError> {
        let total_items = self.posts.count_posts(scope).await?;
        let pages = total_pages(total_items, FEED_PAGE_SIZE);
        let current_page = clamp_page(requested, pages);
        let items = self
            .posts
            .list_page(scope, FEED_PAGE_SIZE, offset(current_page, FEED_PAGE_SIZE))
            .await?;

        Ok(Paginated {
            items,
            current_page,
            total_pages: pages,
            total_items,
        })
    }

    async fn viewer_follows(
        &self,
        viewer: &Viewer,
        author: &AuthorRecord,
    ) -> Result<bool, FeedError> {
        let Some(handle) = viewer.handle() else {
            return Ok(false);
        };
        if handle == author.handle {
            return Ok(false);
        }
        let Some(follower) = self.authors.find_by_handle(handle).await? else {
            return Ok(false);
        };
        Ok(self.follows.edge_exists(follower.id, author.id).await?)
    }
}
