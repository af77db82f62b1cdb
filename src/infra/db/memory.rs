//! In-memory repository implementations backing service and router tests.

use std::sync::Arc;

use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    application::repos::{
        AuthorsRepo, CommentsRepo, FollowsRepo, GroupsRepo, NewComment, NewPost, PostScope,
        PostUpdate, PostsRepo, PostsWriteRepo, RepoError,
    },
    domain::entities::{AuthorRecord, CommentRecord, GroupRecord, PostRecord},
};

#[derive(Default)]
struct State {
    authors: Vec<AuthorRecord>,
    groups: Vec<GroupRecord>,
    posts: Vec<PostRecord>,
    comments: Vec<CommentRecord>,
    follows: Vec<(Uuid, Uuid)>,
    // Monotonic tick so records inserted in one test run have distinct,
    // ordered timestamps.
    ticks: i64,
}

impl State {
    fn next_timestamp(&mut self) -> OffsetDateTime {
        self.ticks += 1;
        OffsetDateTime::UNIX_EPOCH + Duration::seconds(self.ticks)
    }
}

/// Shared in-memory store implementing every repository trait.
#[derive(Clone, Default)]
pub struct MemoryRepositories {
    state: Arc<RwLock<State>>,
}

impl MemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_author(&self, handle: &str) -> AuthorRecord {
        let mut state = self.state.write().await;
        let created_at = state.next_timestamp();
        let record = AuthorRecord {
            id: Uuid::new_v4(),
            handle: handle.to_string(),
            created_at,
        };
        state.authors.push(record.clone());
        record
    }

    pub async fn insert_group(&self, slug: &str, title: &str) -> GroupRecord {
        let mut state = self.state.write().await;
        let created_at = state.next_timestamp();
        let record = GroupRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            title: title.to_string(),
            description: format!("{title} description"),
            created_at,
        };
        state.groups.push(record.clone());
        record
    }
}

fn scope_matches(scope: &PostScope, post: &PostRecord) -> bool {
    match scope {
        PostScope::All => true,
        PostScope::Group(group_id) => post.group_id == Some(*group_id),
        PostScope::Author(author_id) => post.author_id == *author_id,
        PostScope::Authors(author_ids) => author_ids.contains(&post.author_id),
    }
}

fn ordered_scope_posts(state: &State, scope: &PostScope) -> Vec<PostRecord> {
    let mut posts: Vec<PostRecord> = state
        .posts
        .iter()
        .filter(|post| scope_matches(scope, post))
        .cloned()
        .collect();
    posts.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    posts
}

#[async_trait]
impl AuthorsRepo for MemoryRepositories {
    async fn find_by_handle(&self, handle: &str) -> Result<Option<AuthorRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .authors
            .iter()
            .find(|author| author.handle == handle)
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<AuthorRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.authors.iter().find(|author| author.id == id).cloned())
    }
}

#[async_trait]
impl GroupsRepo for MemoryRepositories {
    async fn find_by_slug(&self, slug: &str) -> Result<Option<GroupRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.groups.iter().find(|group| group.slug == slug).cloned())
    }

    async fn list_all(&self) -> Result<Vec<GroupRecord>, RepoError> {
        let state = self.state.read().await;
        let mut groups = state.groups.clone();
        groups.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
        Ok(groups)
    }
}

#[async_trait]
impl PostsRepo for MemoryRepositories {
    async fn count_posts(&self, scope: &PostScope) -> Result<u64, RepoError> {
        let state = self.state.read().await;
        let count = state
            .posts
            .iter()
            .filter(|post| scope_matches(scope, post))
            .count();
        Ok(count as u64)
    }

    async fn list_page(
        &self,
        scope: &PostScope,
        limit: u32,
        offset: u64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let state = self.state.read().await;
        let posts = ordered_scope_posts(&state, scope);
        Ok(posts
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PostRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state.posts.iter().find(|post| post.id == id).cloned())
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryRepositories {
    async fn create_post(&self, post: NewPost) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;

        let author_handle = state
            .authors
            .iter()
            .find(|author| author.id == post.author_id)
            .map(|author| author.handle.clone())
            .ok_or(RepoError::InvalidInput {
                message: "unknown author id".to_string(),
            })?;

        let (group_slug, group_title) = match post.group_id {
            Some(group_id) => {
                let group = state
                    .groups
                    .iter()
                    .find(|group| group.id == group_id)
                    .ok_or(RepoError::InvalidInput {
                        message: "unknown group id".to_string(),
                    })?;
                (Some(group.slug.clone()), Some(group.title.clone()))
            }
            None => (None, None),
        };

        let created_at = state.next_timestamp();
        let record = PostRecord {
            id: Uuid::new_v4(),
            author_id: post.author_id,
            author_handle,
            group_id: post.group_id,
            group_slug,
            group_title,
            text: post.text,
            image_path: post.image_path,
            created_at,
        };
        state.posts.push(record.clone());
        Ok(record)
    }

    async fn update_post(&self, update: PostUpdate) -> Result<PostRecord, RepoError> {
        let mut state = self.state.write().await;

        let (group_slug, group_title) = match update.group_id {
            Some(group_id) => {
                let group = state
                    .groups
                    .iter()
                    .find(|group| group.id == group_id)
                    .ok_or(RepoError::InvalidInput {
                        message: "unknown group id".to_string(),
                    })?;
                (Some(group.slug.clone()), Some(group.title.clone()))
            }
            None => (None, None),
        };

        let post = state
            .posts
            .iter_mut()
            .find(|post| post.id == update.id)
            .ok_or(RepoError::NotFound)?;

        post.text = update.text;
        post.group_id = update.group_id;
        post.group_slug = group_slug;
        post.group_title = group_title;
        if let Some(image_path) = update.image_path {
            post.image_path = Some(image_path);
        }

        Ok(post.clone())
    }
}

#[async_trait]
impl CommentsRepo for MemoryRepositories {
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentRecord>, RepoError> {
        let state = self.state.read().await;
        let mut comments: Vec<CommentRecord> = state
            .comments
            .iter()
            .filter(|comment| comment.post_id == post_id)
            .cloned()
            .collect();
        comments.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(comments)
    }

    async fn create_comment(&self, comment: NewComment) -> Result<CommentRecord, RepoError> {
        let mut state = self.state.write().await;

        let author_handle = state
            .authors
            .iter()
            .find(|author| author.id == comment.author_id)
            .map(|author| author.handle.clone())
            .ok_or(RepoError::InvalidInput {
                message: "unknown author id".to_string(),
            })?;

        let created_at = state.next_timestamp();
        let record = CommentRecord {
            id: Uuid::new_v4(),
            post_id: comment.post_id,
            author_id: comment.author_id,
            author_handle,
            text: comment.text,
            created_at,
        };
        state.comments.push(record.clone());
        Ok(record)
    }
}

#[async_trait]
impl FollowsRepo for MemoryRepositories {
    async fn create_edge(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state.write().await;
        if state.follows.contains(&(follower_id, followed_id)) {
            return Ok(false);
        }
        state.follows.push((follower_id, followed_id));
        Ok(true)
    }

    async fn delete_edge(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError> {
        let mut state = self.state.write().await;
        let before = state.follows.len();
        state
            .follows
            .retain(|edge| *edge != (follower_id, followed_id));
        Ok(state.follows.len() < before)
    }

    async fn edge_exists(&self, follower_id: Uuid, followed_id: Uuid) -> Result<bool, RepoError> {
        let state = self.state.read().await;
        Ok(state.follows.contains(&(follower_id, followed_id)))
    }

    async fn followed_author_ids(&self, follower_id: Uuid) -> Result<Vec<Uuid>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .follows
            .iter()
            .filter(|(follower, _)| *follower == follower_id)
            .map(|(_, followed)| *followed)
            .collect())
    }
}
