use std::sync::Arc;

use brume::application::feed::{FeedError, FeedService, FeedView};
use brume::application::follow::{FollowError, FollowService};
use brume::application::pagination::PageNumber;
use brume::application::repos::{AuthorsRepo, FollowsRepo, GroupsRepo, NewPost, PostsRepo, PostsWriteRepo};
use brume::domain::viewer::Viewer;
use brume::infra::db::memory::MemoryRepositories;

fn follow_service(repos: &MemoryRepositories) -> FollowService {
    let shared = Arc::new(repos.clone());
    let authors: Arc<dyn AuthorsRepo> = shared.clone();
    let follows: Arc<dyn FollowsRepo> = shared;
    FollowService::new(authors, follows)
}

fn feed_service(repos: &MemoryRepositories) -> FeedService {
    let shared = Arc::new(repos.clone());
    let posts: Arc<dyn PostsRepo> = shared.clone();
    let groups: Arc<dyn GroupsRepo> = shared.clone();
    let authors: Arc<dyn AuthorsRepo> = shared.clone();
    let follows: Arc<dyn FollowsRepo> = shared;
    FeedService::new(posts, groups, authors, follows)
}

#[tokio::test]
async fn following_twice_leaves_a_single_edge() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    repos.insert_author("ostap").await;

    let service = follow_service(&repos);
    let viewer = Viewer::known("lena");

    service.follow(&viewer, "ostap").await.expect("first follow");
    service.follow(&viewer, "ostap").await.expect("second follow");

    let followed = repos.followed_author_ids(lena.id).await.unwrap();
    assert_eq!(followed.len(), 1);
}

#[tokio::test]
async fn unfollowing_an_absent_edge_is_a_noop() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;
    repos.insert_author("ostap").await;

    let service = follow_service(&repos);
    let viewer = Viewer::known("lena");

    service.unfollow(&viewer, "ostap").await.expect("noop unfollow");
    assert!(!service.is_following(&viewer, "ostap").await.unwrap());
}

#[tokio::test]
async fn unfollow_removes_the_edge() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;
    repos.insert_author("ostap").await;

    let service = follow_service(&repos);
    let viewer = Viewer::known("lena");

    service.follow(&viewer, "ostap").await.expect("follow");
    assert!(service.is_following(&viewer, "ostap").await.unwrap());

    service.unfollow(&viewer, "ostap").await.expect("unfollow");
    assert!(!service.is_following(&viewer, "ostap").await.unwrap());
}

#[tokio::test]
async fn authors_cannot_follow_themselves() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let service = follow_service(&repos);
    let viewer = Viewer::known("lena");

    let err = service.follow(&viewer, "lena").await.expect_err("must fail");
    assert!(matches!(err, FollowError::SelfFollow));
}

#[tokio::test]
async fn anonymous_viewers_cannot_follow() {
    let repos = MemoryRepositories::new();
    repos.insert_author("ostap").await;

    let service = follow_service(&repos);
    let err = service
        .follow(&Viewer::Anonymous, "ostap")
        .await
        .expect_err("must fail");
    assert!(matches!(err, FollowError::AuthenticationRequired));
}

#[tokio::test]
async fn following_an_unknown_handle_fails() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let service = follow_service(&repos);
    let err = service
        .follow(&Viewer::known("lena"), "nobody")
        .await
        .expect_err("must fail");
    assert!(matches!(err, FollowError::UnknownAuthor));
}

#[tokio::test]
async fn following_feed_contains_only_followed_authors() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    let ostap = repos.insert_author("ostap").await;
    let mira = repos.insert_author("mira").await;

    repos
        .create_post(NewPost {
            author_id: ostap.id,
            group_id: None,
            text: "followed voice".to_string(),
            image_path: None,
        })
        .await
        .unwrap();
    repos
        .create_post(NewPost {
            author_id: mira.id,
            group_id: None,
            text: "unfollowed voice".to_string(),
            image_path: None,
        })
        .await
        .unwrap();
    repos.create_edge(lena.id, ostap.id).await.unwrap();

    let feed = feed_service(&repos);
    let page = feed
        .assemble(FeedView::Following, &Viewer::known("lena"), PageNumber::FIRST)
        .await
        .expect("assemble feed");

    assert_eq!(page.posts.total_items, 1);
    assert_eq!(page.posts.items[0].text, "followed voice");
}

#[tokio::test]
async fn empty_follow_set_yields_a_valid_empty_page() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let feed = feed_service(&repos);
    let page = feed
        .assemble(FeedView::Following, &Viewer::known("lena"), PageNumber::FIRST)
        .await
        .expect("assemble feed");

    assert!(page.posts.items.is_empty());
    assert_eq!(page.posts.current_page, 1);
    assert_eq!(page.posts.total_pages, 1);
}

#[tokio::test]
async fn anonymous_following_feed_requires_authentication() {
    let repos = MemoryRepositories::new();

    let feed = feed_service(&repos);
    let err = feed
        .assemble(FeedView::Following, &Viewer::Anonymous, PageNumber::FIRST)
        .await
        .expect_err("must fail");
    assert!(matches!(err, FeedError::AuthenticationRequired));
}

#[tokio::test]
async fn vouched_but_unknown_handles_get_an_empty_feed() {
    let repos = MemoryRepositories::new();

    let feed = feed_service(&repos);
    let page = feed
        .assemble(FeedView::Following, &Viewer::known("ghost"), PageNumber::FIRST)
        .await
        .expect("assemble feed");
    assert!(page.posts.items.is_empty());
}

#[tokio::test]
async fn profile_feed_reports_whether_the_viewer_follows() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    let ostap = repos.insert_author("ostap").await;
    repos.create_edge(lena.id, ostap.id).await.unwrap();

    let feed = feed_service(&repos);

    let followed = feed
        .assemble(
            FeedView::Author("ostap".to_string()),
            &Viewer::known("lena"),
            PageNumber::FIRST,
        )
        .await
        .expect("assemble feed");
    assert!(followed.viewer_follows_author);

    let own_profile = feed
        .assemble(
            FeedView::Author("lena".to_string()),
            &Viewer::known("lena"),
            PageNumber::FIRST,
        )
        .await
        .expect("assemble feed");
    assert!(!own_profile.viewer_follows_author);
}
