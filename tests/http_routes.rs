use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use brume::application::feed::FeedService;
use brume::application::follow::FollowService;
use brume::application::posts::PostService;
use brume::application::repos::{
    AuthorsRepo, CommentsRepo, FollowsRepo, GroupsRepo, NewPost, PostScope, PostsRepo,
    PostsWriteRepo,
};
use brume::domain::entities::AuthorRecord;
use brume::infra::db::memory::MemoryRepositories;
use brume::infra::http::{HttpState, VIEWER_HEADER, build_router};
use brume::infra::uploads::ImageStore;

const BOUNDARY: &str = "brume-test-boundary";

fn build_app(repos: &MemoryRepositories) -> Router {
    let upload_dir = std::env::temp_dir().join(format!("brume-http-{}", Uuid::new_v4()));
    build_app_with_uploads(repos, upload_dir)
}

fn build_app_with_uploads(repos: &MemoryRepositories, upload_dir: std::path::PathBuf) -> Router {
    let shared = Arc::new(repos.clone());

    let posts_repo: Arc<dyn PostsRepo> = shared.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = shared.clone();
    let groups_repo: Arc<dyn GroupsRepo> = shared.clone();
    let authors_repo: Arc<dyn AuthorsRepo> = shared.clone();
    let comments_repo: Arc<dyn CommentsRepo> = shared.clone();
    let follows_repo: Arc<dyn FollowsRepo> = shared.clone();

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        authors_repo.clone(),
        follows_repo.clone(),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo,
        posts_write_repo,
        groups_repo,
        authors_repo.clone(),
        comments_repo,
    ));
    let follows = Arc::new(FollowService::new(authors_repo, follows_repo));

    let image_store = Arc::new(ImageStore::new(upload_dir).expect("create image store"));

    let state = HttpState {
        feed,
        posts,
        follows,
        image_store,
        db: None,
        max_upload_bytes: 10 * 1024 * 1024,
    };

    build_router(state, None)
}

async fn seed_post(repos: &MemoryRepositories, author: &AuthorRecord, text: &str) -> Uuid {
    let record = repos
        .create_post(NewPost {
            author_id: author.id,
            group_id: None,
            text: text.to_string(),
            image_path: None,
        })
        .await
        .expect("seed post");
    record.id
}

fn multipart_body(fields: &[(&str, &str)]) -> Body {
    let mut raw = String::new();
    for (name, value) in fields {
        raw.push_str(&format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        ));
    }
    raw.push_str(&format!("--{BOUNDARY}--\r\n"));
    Body::from(raw)
}

fn multipart_body_with_image(text: &str, file_name: &str, payload: &[u8]) -> Body {
    let mut raw = Vec::new();
    raw.extend_from_slice(
        format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\n{text}\r\n")
            .as_bytes(),
    );
    raw.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; \
             filename=\"{file_name}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    raw.extend_from_slice(payload);
    raw.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    Body::from(raw)
}

fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

fn stored_upload_count(dir: &std::path::Path) -> usize {
    fn walk(dir: &std::path::Path, count: &mut usize) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                walk(&path, count);
            } else {
                *count += 1;
            }
        }
    }

    let mut count = 0;
    walk(dir, &mut count);
    count
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("build request")
}

fn get_as(uri: &str, handle: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(VIEWER_HEADER, handle)
        .body(Body::empty())
        .expect("build request")
}

fn location(response: &axum::response::Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location header")
        .to_str()
        .expect("ascii location")
}

#[tokio::test]
async fn index_renders_latest_posts() {
    let repos = MemoryRepositories::new();
    let author = repos.insert_author("lena").await;
    seed_post(&repos, &author, "the fog lifted early today").await;

    let app = build_app(&repos);
    let response = app.oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("the fog lifted early today"));
    assert!(body.contains("@lena"));
}

#[tokio::test]
async fn index_pages_hold_ten_posts_newest_first() {
    let repos = MemoryRepositories::new();
    let author = repos.insert_author("lena").await;
    for i in 1..=15 {
        seed_post(&repos, &author, &format!("entry number {i:02}")).await;
    }

    let app = build_app(&repos);

    let first = body_text(app.clone().oneshot(get("/")).await.unwrap()).await;
    assert!(first.contains("entry number 15"));
    assert!(first.contains("entry number 06"));
    assert!(!first.contains("entry number 05"));

    let second = body_text(app.oneshot(get("/?page=2")).await.unwrap()).await;
    assert!(second.contains("entry number 05"));
    assert!(second.contains("entry number 01"));
    assert!(!second.contains("entry number 06"));
}

#[tokio::test]
async fn out_of_range_pages_clamp_to_the_last_page() {
    let repos = MemoryRepositories::new();
    let author = repos.insert_author("lena").await;
    for i in 1..=15 {
        seed_post(&repos, &author, &format!("entry number {i:02}")).await;
    }

    let app = build_app(&repos);

    let clamped = app.clone().oneshot(get("/?page=99")).await.unwrap();
    assert_eq!(clamped.status(), StatusCode::OK);
    let body = body_text(clamped).await;
    assert!(body.contains("entry number 01"));
    assert!(!body.contains("entry number 06"));
}

#[tokio::test]
async fn unparseable_page_values_fall_back_to_page_one() {
    let repos = MemoryRepositories::new();
    let author = repos.insert_author("lena").await;
    for i in 1..=15 {
        seed_post(&repos, &author, &format!("entry number {i:02}")).await;
    }

    let app = build_app(&repos);
    let body = body_text(app.oneshot(get("/?page=abc")).await.unwrap()).await;
    assert!(body.contains("entry number 15"));
    assert!(!body.contains("entry number 05"));
}

#[tokio::test]
async fn group_feed_only_lists_group_posts() {
    let repos = MemoryRepositories::new();
    let author = repos.insert_author("lena").await;
    let group = repos.insert_group("field-notes", "Field Notes").await;
    seed_post(&repos, &author, "outside any group").await;
    repos
        .create_post(NewPost {
            author_id: author.id,
            group_id: Some(group.id),
            text: "observed a heron at dawn".to_string(),
            image_path: None,
        })
        .await
        .expect("seed grouped post");

    let app = build_app(&repos);
    let response = app.oneshot(get("/group/field-notes")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("Field Notes"));
    assert!(body.contains("observed a heron at dawn"));
    assert!(!body.contains("outside any group"));
}

#[tokio::test]
async fn unknown_group_slug_is_not_found() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    let response = app.oneshot(get("/group/no-such-group")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_profile_handle_is_not_found() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    let response = app.oneshot(get("/profile/nobody")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn profile_lists_only_that_authors_posts() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    let ostap = repos.insert_author("ostap").await;
    seed_post(&repos, &lena, "written by lena").await;
    seed_post(&repos, &ostap, "written by ostap").await;

    let app = build_app(&repos);
    let body = body_text(app.oneshot(get("/profile/lena")).await.unwrap()).await;

    assert!(body.contains("written by lena"));
    assert!(!body.contains("written by ostap"));
}

#[tokio::test]
async fn anonymous_viewers_are_redirected_from_guarded_routes() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    for uri in ["/create", "/follow"] {
        let response = app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER, "GET {uri}");
        assert_eq!(location(&response), "/");
    }

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/profile/lena/follow")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn creating_a_post_redirects_to_the_author_profile() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri("/create")
        .header(VIEWER_HEADER, "lena")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body(&[("text", "a fresh thought")]))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/lena");

    let count = repos.count_posts(&PostScope::All).await.unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn placeholder_post_text_is_rejected_with_the_form_redisplayed() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri("/create")
        .header(VIEWER_HEADER, "lena")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body(&[("text", "1")]))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_text(response).await;
    assert!(body.contains("placeholder"));

    let count = repos.count_posts(&PostScope::All).await.unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn non_owner_edit_redirects_and_leaves_the_post_unchanged() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    repos.insert_author("ostap").await;
    let post_id = seed_post(&repos, &lena, "original wording").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri(format!("/posts/{post_id}/edit"))
        .header(VIEWER_HEADER, "ostap")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body(&[("text", "hijacked wording")]))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{post_id}"));

    let post = PostsRepo::find_by_id(&repos, post_id)
        .await
        .unwrap()
        .expect("post kept");
    assert_eq!(post.text, "original wording");
}

#[tokio::test]
async fn owners_can_edit_their_posts() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    let post_id = seed_post(&repos, &lena, "original wording").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri(format!("/posts/{post_id}/edit"))
        .header(VIEWER_HEADER, "lena")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body(&[("text", "revised wording")]))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{post_id}"));

    let post = PostsRepo::find_by_id(&repos, post_id)
        .await
        .unwrap()
        .expect("post kept");
    assert_eq!(post.text, "revised wording");
}

#[tokio::test]
async fn non_owner_edit_discards_the_uploaded_image() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    repos.insert_author("ostap").await;
    let post_id = seed_post(&repos, &lena, "original wording").await;

    let upload_dir = std::env::temp_dir().join(format!("brume-http-{}", Uuid::new_v4()));
    let app = build_app_with_uploads(&repos, upload_dir.clone());
    let request = Request::builder()
        .method("POST")
        .uri(format!("/posts/{post_id}/edit"))
        .header(VIEWER_HEADER, "ostap")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body_with_image(
            "hijacked wording",
            "sneak.png",
            b"pixels",
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{post_id}"));
    assert_eq!(stored_upload_count(&upload_dir), 0);

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[tokio::test]
async fn rejected_post_text_discards_the_uploaded_image() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let upload_dir = std::env::temp_dir().join(format!("brume-http-{}", Uuid::new_v4()));
    let app = build_app_with_uploads(&repos, upload_dir.clone());
    let request = Request::builder()
        .method("POST")
        .uri("/create")
        .header(VIEWER_HEADER, "lena")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body_with_image("1", "orphan.png", b"pixels"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(stored_upload_count(&upload_dir), 0);

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[tokio::test]
async fn accepted_posts_keep_their_uploaded_image() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let upload_dir = std::env::temp_dir().join(format!("brume-http-{}", Uuid::new_v4()));
    let app = build_app_with_uploads(&repos, upload_dir.clone());
    let request = Request::builder()
        .method("POST")
        .uri("/create")
        .header(VIEWER_HEADER, "lena")
        .header(header::CONTENT_TYPE, multipart_content_type())
        .body(multipart_body_with_image(
            "a walk with the camera",
            "heron.png",
            b"pixels",
        ))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(stored_upload_count(&upload_dir), 1);

    let _ = std::fs::remove_dir_all(upload_dir);
}

#[tokio::test]
async fn comments_appear_on_the_post_detail_page() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    repos.insert_author("ostap").await;
    let post_id = seed_post(&repos, &lena, "discuss below").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri(format!("/posts/{post_id}/comment"))
        .header(VIEWER_HEADER, "ostap")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("text=well+observed"))
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/posts/{post_id}"));

    let detail = body_text(
        app.oneshot(get_as(&format!("/posts/{post_id}"), "lena"))
            .await
            .unwrap(),
    )
    .await;
    assert!(detail.contains("well observed"));
    assert!(detail.contains("@ostap"));
}

#[tokio::test]
async fn malformed_post_ids_render_not_found() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    let response = app.oneshot(get("/posts/not-a-uuid")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_post_ids_render_not_found() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    let response = app
        .oneshot(get(&format!("/posts/{}", Uuid::new_v4())))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn following_an_author_records_the_edge() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    let ostap = repos.insert_author("ostap").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri("/profile/ostap/follow")
        .header(VIEWER_HEADER, "lena")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/profile/ostap");

    assert!(repos.edge_exists(lena.id, ostap.id).await.unwrap());
}

#[tokio::test]
async fn self_follow_is_a_bad_request() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let app = build_app(&repos);
    let request = Request::builder()
        .method("POST")
        .uri("/profile/lena/follow")
        .header(VIEWER_HEADER, "lena")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn follow_feed_shows_followed_authors_only() {
    let repos = MemoryRepositories::new();
    let lena = repos.insert_author("lena").await;
    let ostap = repos.insert_author("ostap").await;
    let mira = repos.insert_author("mira").await;
    seed_post(&repos, &ostap, "from a followed author").await;
    seed_post(&repos, &mira, "from an unfollowed author").await;
    repos.create_edge(lena.id, ostap.id).await.unwrap();

    let app = build_app(&repos);
    let response = app.oneshot(get_as("/follow", "lena")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_text(response).await;
    assert!(body.contains("from a followed author"));
    assert!(!body.contains("from an unfollowed author"));
}

#[tokio::test]
async fn empty_follow_feed_is_still_a_valid_page() {
    let repos = MemoryRepositories::new();
    repos.insert_author("lena").await;

    let app = build_app(&repos);
    let response = app.oneshot(get_as("/follow", "lena")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn vouched_but_unknown_handles_get_an_empty_follow_feed() {
    let repos = MemoryRepositories::new();

    let app = build_app(&repos);
    let response = app.oneshot(get_as("/follow", "ghost")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn health_endpoint_reports_no_content_without_a_database() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    let response = app.oneshot(get("/_health/db")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn missing_uploads_are_not_found() {
    let repos = MemoryRepositories::new();
    let app = build_app(&repos);

    let response = app
        .oneshot(get("/uploads/2026/01/01/missing.png"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
