use std::{io::ErrorKind, sync::Arc};

use axum::{
    Extension, Form, Router,
    body::Body,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{
        HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_LENGTH, CONTENT_TYPE},
    },
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tracing::error;
use uuid::Uuid;

use crate::{
    application::{
        error::HttpError,
        feed::{FeedError, FeedService, FeedView},
        follow::{FollowError, FollowService},
        pagination::PageQuery,
        posts::{EditOutcome, PostError, PostInput, PostService},
    },
    domain::viewer::Viewer,
    infra::{
        cache::{FeedCacheState, feed_cache_layer},
        db::PostgresRepositories,
        uploads::{ImageStore, ImageStoreError},
    },
    presentation::views::{
        FeedContext, FollowTemplate, GroupTemplate, IndexTemplate, LayoutChrome, LayoutContext,
        PostCard, PostDetailContext, PostDetailTemplate, PostFormContext, PostFormTemplate,
        ProfileContext, ProfileTemplate, render_not_found_response, render_template_response,
    },
};

use super::{
    db_health_response,
    middleware::{log_responses, resolve_viewer, set_request_context},
};

#[derive(Clone)]
pub struct HttpState {
    pub feed: Arc<FeedService>,
    pub posts: Arc<PostService>,
    pub follows: Arc<FollowService>,
    pub image_store: Arc<ImageStore>,
    /// Absent when running against the in-memory store.
    pub db: Option<Arc<PostgresRepositories>>,
    pub max_upload_bytes: usize,
}

pub fn build_router(state: HttpState, cache: Option<FeedCacheState>) -> Router {
    // Only the global feed sits behind the time-windowed cache; every
    // other view is rendered per request.
    let cached_routes = Router::new().route("/", get(index));

    let cached_routes = if let Some(cache_state) = cache {
        cached_routes.layer(middleware::from_fn_with_state(
            cache_state,
            feed_cache_layer,
        ))
    } else {
        cached_routes
    };

    let routes = Router::new()
        .route("/group/{slug}", get(group_index))
        .route("/profile/{handle}", get(profile))
        .route("/profile/{handle}/follow", post(follow_author))
        .route("/profile/{handle}/unfollow", post(unfollow_author))
        .route("/posts/{id}", get(post_detail))
        .route("/posts/{id}/edit", get(edit_form).post(edit_submit))
        .route("/posts/{id}/comment", post(comment_submit))
        .route("/create", get(create_form).post(create_submit))
        .route("/follow", get(follow_index))
        .route("/uploads/{*path}", get(serve_upload))
        .route("/_health/db", get(health));

    let max_upload_bytes = state.max_upload_bytes;

    cached_routes
        .merge(routes)
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(state)
        .layer(middleware::from_fn(log_responses))
        .layer(middleware::from_fn(resolve_viewer))
        .layer(middleware::from_fn(set_request_context))
}

async fn index(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, "Latest posts");

    match state
        .feed
        .assemble(FeedView::Global, &viewer, query.page_number())
        .await
    {
        Ok(page) => {
            let content = FeedContext::new("Latest posts", None, &page.posts, "/");
            render_template_response(
                IndexTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn group_index(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(slug): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, format!("Group: {slug}"));

    match state
        .feed
        .assemble(FeedView::Group(slug.clone()), &viewer, query.page_number())
        .await
    {
        Ok(page) => {
            let (heading, subheading) = match page.group.as_ref() {
                Some(group) => (group.title.clone(), Some(group.description.clone())),
                None => (slug.clone(), None),
            };
            let content =
                FeedContext::new(heading, subheading, &page.posts, format!("/group/{slug}"));
            render_template_response(
                GroupTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn profile(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(handle): Path<String>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, format!("@{handle}"));

    match state
        .feed
        .assemble(
            FeedView::Author(handle.clone()),
            &viewer,
            query.page_number(),
        )
        .await
    {
        Ok(page) => {
            let feed = FeedContext::new(
                format!("Posts by @{handle}"),
                None,
                &page.posts,
                format!("/profile/{handle}"),
            );
            let content = ProfileContext {
                author_handle: handle.clone(),
                total_posts: page.posts.total_items,
                viewer_follows_author: page.viewer_follows_author,
                viewer_is_author: viewer.is_handle(&handle),
                feed,
            };
            render_template_response(
                ProfileTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn follow_index(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Query(query): Query<PageQuery>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, "Following");

    match state
        .feed
        .assemble(FeedView::Following, &viewer, query.page_number())
        .await
    {
        Ok(page) => {
            let content = FeedContext::new(
                "Posts from authors you follow",
                None,
                &page.posts,
                "/follow",
            );
            render_template_response(
                FollowTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(FeedError::AuthenticationRequired) => Redirect::to("/").into_response(),
        Err(err) => feed_error_to_response(err, chrome),
    }
}

async fn follow_author(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(handle): Path<String>,
) -> Response {
    if viewer.is_anonymous() {
        return Redirect::to("/").into_response();
    }

    match state.follows.follow(&viewer, &handle).await {
        Ok(()) => Redirect::to(&format!("/profile/{handle}")).into_response(),
        Err(err) => follow_error_to_response(err, &viewer, &handle),
    }
}

async fn unfollow_author(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(handle): Path<String>,
) -> Response {
    if viewer.is_anonymous() {
        return Redirect::to("/").into_response();
    }

    match state.follows.unfollow(&viewer, &handle).await {
        Ok(()) => Redirect::to(&format!("/profile/{handle}")).into_response(),
        Err(err) => follow_error_to_response(err, &viewer, &handle),
    }
}

async fn post_detail(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, "Post");

    let Some(post_id) = parse_post_id(&id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.detail(post_id, &viewer).await {
        Ok(detail) => {
            let content = PostDetailContext {
                post: PostCard::from_record(&detail.post),
                comments: detail
                    .comments
                    .iter()
                    .map(crate::presentation::views::CommentView::from_record)
                    .collect(),
                viewer_is_owner: detail.viewer_is_owner,
                viewer_can_comment: !viewer.is_anonymous(),
            };
            render_template_response(
                PostDetailTemplate {
                    view: LayoutContext::new(chrome, content),
                },
                StatusCode::OK,
            )
        }
        Err(PostError::UnknownPost) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn create_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
) -> Response {
    if viewer.is_anonymous() {
        return Redirect::to("/").into_response();
    }

    let chrome = LayoutChrome::new(&viewer, "New post");
    let groups = match state.posts.list_groups().await {
        Ok(groups) => groups,
        Err(err) => return HttpError::from(err).into_response(),
    };

    render_template_response(
        PostFormTemplate {
            view: LayoutContext::new(chrome, PostFormContext::create(groups)),
        },
        StatusCode::OK,
    )
}

async fn create_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    multipart: Multipart,
) -> Response {
    let Some(handle) = viewer.handle().map(str::to_string) else {
        return Redirect::to("/").into_response();
    };

    let input = match parse_post_form(multipart, &state.image_store).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.create_post(&viewer, input.clone()).await {
        Ok(_) => Redirect::to(&format!("/profile/{handle}")).into_response(),
        Err(PostError::InvalidText(message)) => {
            discard_unused_image(&state.image_store, &input).await;
            let chrome = LayoutChrome::new(&viewer, "New post");
            let groups = state.posts.list_groups().await.unwrap_or_default();
            let form = PostFormContext::create(groups)
                .with_text(input.text)
                .with_error(message);
            render_template_response(
                PostFormTemplate {
                    view: LayoutContext::new(chrome, form),
                },
                StatusCode::BAD_REQUEST,
            )
        }
        Err(err) => {
            discard_unused_image(&state.image_store, &input).await;
            HttpError::from(err).into_response()
        }
    }
}

async fn edit_form(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<String>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, "Edit post");

    if viewer.is_anonymous() {
        return Redirect::to("/").into_response();
    }

    let Some(post_id) = parse_post_id(&id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.detail(post_id, &viewer).await {
        Ok(detail) if detail.viewer_is_owner => {
            let groups = match state.posts.list_groups().await {
                Ok(groups) => groups,
                Err(err) => return HttpError::from(err).into_response(),
            };
            render_template_response(
                PostFormTemplate {
                    view: LayoutContext::new(chrome, PostFormContext::edit(&detail.post, groups)),
                },
                StatusCode::OK,
            )
        }
        // Only the author edits a post; everyone else lands on the
        // read-only detail view.
        Ok(_) => Redirect::to(&format!("/posts/{post_id}")).into_response(),
        Err(PostError::UnknownPost) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn edit_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, "Edit post");

    if viewer.is_anonymous() {
        return Redirect::to("/").into_response();
    }

    let Some(post_id) = parse_post_id(&id) else {
        return render_not_found_response(chrome);
    };

    let input = match parse_post_form(multipart, &state.image_store).await {
        Ok(input) => input,
        Err(err) => return err.into_response(),
    };

    match state.posts.edit_post(&viewer, post_id, input.clone()).await {
        Ok(EditOutcome::Updated(post)) => {
            Redirect::to(&format!("/posts/{}", post.id)).into_response()
        }
        Ok(EditOutcome::NotOwner { post_id }) => {
            discard_unused_image(&state.image_store, &input).await;
            Redirect::to(&format!("/posts/{post_id}")).into_response()
        }
        Err(PostError::InvalidText(message)) => {
            discard_unused_image(&state.image_store, &input).await;
            let detail = match state.posts.detail(post_id, &viewer).await {
                Ok(detail) => detail,
                Err(err) => return HttpError::from(err).into_response(),
            };
            let groups = state.posts.list_groups().await.unwrap_or_default();
            let form = PostFormContext::edit(&detail.post, groups)
                .with_text(input.text)
                .with_error(message);
            render_template_response(
                PostFormTemplate {
                    view: LayoutContext::new(chrome, form),
                },
                StatusCode::BAD_REQUEST,
            )
        }
        Err(PostError::UnknownPost) => {
            discard_unused_image(&state.image_store, &input).await;
            render_not_found_response(chrome)
        }
        Err(err) => {
            discard_unused_image(&state.image_store, &input).await;
            HttpError::from(err).into_response()
        }
    }
}

/// Drop an upload that was streamed to disk before the submission was
/// rejected, so refused edits never leave files behind.
async fn discard_unused_image(image_store: &ImageStore, input: &PostInput) {
    const SOURCE: &str = "infra::http::public::discard_unused_image";

    let Some(path) = input.image_path.as_deref() else {
        return;
    };
    if let Err(err) = image_store.remove(path).await {
        error!(
            target = SOURCE,
            path = %path,
            error = %err,
            "failed to remove upload from a rejected submission"
        );
    }
}

#[derive(Debug, Deserialize)]
struct CommentForm {
    text: String,
}

async fn comment_submit(
    State(state): State<HttpState>,
    Extension(viewer): Extension<Viewer>,
    Path(id): Path<String>,
    Form(form): Form<CommentForm>,
) -> Response {
    let chrome = LayoutChrome::new(&viewer, "Post");

    if viewer.is_anonymous() {
        return Redirect::to("/").into_response();
    }

    let Some(post_id) = parse_post_id(&id) else {
        return render_not_found_response(chrome);
    };

    match state.posts.add_comment(&viewer, post_id, &form.text).await {
        Ok(_) => Redirect::to(&format!("/posts/{post_id}")).into_response(),
        // A blank comment just lands the viewer back on the thread.
        Err(PostError::InvalidText(_)) => {
            Redirect::to(&format!("/posts/{post_id}")).into_response()
        }
        Err(PostError::UnknownPost) => render_not_found_response(chrome),
        Err(err) => HttpError::from(err).into_response(),
    }
}

async fn serve_upload(State(state): State<HttpState>, Path(path): Path<String>) -> Response {
    const SOURCE: &str = "infra::http::public::serve_upload";

    match state.image_store.read(&path).await {
        Ok(bytes) => build_upload_response(&path, bytes),
        Err(ImageStoreError::InvalidPath) => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(ImageStoreError::Io(err)) if err.kind() == ErrorKind::NotFound => HttpError::new(
            SOURCE,
            StatusCode::NOT_FOUND,
            "Upload not found",
            "The requested upload is not available",
        )
        .into_response(),
        Err(err) => {
            error!(
                target = SOURCE,
                path = %path,
                error = %err,
                "failed to read stored upload"
            );
            HttpError::new(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to read uploaded file",
                err.to_string(),
            )
            .into_response()
        }
    }
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.db.as_ref() {
        Some(db) => db_health_response(db.health_check().await),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

fn parse_post_id(raw: &str) -> Option<Uuid> {
    Uuid::parse_str(raw).ok()
}

async fn parse_post_form(
    mut multipart: Multipart,
    image_store: &ImageStore,
) -> Result<PostInput, HttpError> {
    const SOURCE: &str = "infra::http::public::parse_post_form";

    let mut input = PostInput::default();

    while let Some(field) = multipart.next_field().await.map_err(|err| {
        HttpError::new(
            SOURCE,
            StatusCode::BAD_REQUEST,
            "Malformed form submission",
            err.to_string(),
        )
    })? {
        match field.name() {
            Some("text") => {
                input.text = field.text().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Malformed form submission",
                        err.to_string(),
                    )
                })?;
            }
            Some("group") => {
                let value = field.text().await.map_err(|err| {
                    HttpError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Malformed form submission",
                        err.to_string(),
                    )
                })?;
                if !value.trim().is_empty() {
                    input.group_slug = Some(value.trim().to_string());
                }
            }
            Some("image") => {
                let file_name = field
                    .file_name()
                    .map(str::to_string)
                    .filter(|name| !name.is_empty());
                let Some(file_name) = file_name else {
                    continue;
                };

                let stream = field.map(|result| {
                    result.map_err(|err| {
                        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
                            ImageStoreError::PayloadTooLarge {
                                source: Box::new(err),
                            }
                        } else {
                            ImageStoreError::PayloadStream {
                                source: Box::new(err),
                            }
                        }
                    })
                });

                match image_store.store_stream(&file_name, stream).await {
                    Ok(stored) => input.image_path = Some(stored.stored_path),
                    // A selected-but-empty file input means no image.
                    Err(ImageStoreError::EmptyPayload) => {}
                    Err(ImageStoreError::PayloadTooLarge { source }) => {
                        return Err(HttpError::new(
                            SOURCE,
                            StatusCode::PAYLOAD_TOO_LARGE,
                            "Uploaded image too large",
                            source.to_string(),
                        ));
                    }
                    Err(err) => {
                        return Err(HttpError::new(
                            SOURCE,
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "Failed to store uploaded image",
                            err.to_string(),
                        ));
                    }
                }
            }
            _ => {}
        }
    }

    Ok(input)
}

fn feed_error_to_response(err: FeedError, chrome: LayoutChrome) -> Response {
    match err {
        FeedError::UnknownGroup | FeedError::UnknownAuthor => {
            render_not_found_response(chrome)
        }
        FeedError::AuthenticationRequired => Redirect::to("/").into_response(),
        err => HttpError::from(err).into_response(),
    }
}

fn follow_error_to_response(err: FollowError, viewer: &Viewer, handle: &str) -> Response {
    match err {
        FollowError::UnknownAuthor => {
            render_not_found_response(LayoutChrome::new(viewer, format!("@{handle}")))
        }
        err => HttpError::from(err).into_response(),
    }
}

fn build_upload_response(path: &str, bytes: Bytes) -> Response {
    let mut response = Response::new(Body::from(bytes.clone()));
    *response.status_mut() = StatusCode::OK;

    let headers = response.headers_mut();
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
        headers.insert(CONTENT_TYPE, value);
    }
    if let Ok(value) = HeaderValue::from_str(&bytes.len().to_string()) {
        headers.insert(CONTENT_LENGTH, value);
    }
    headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("public, max-age=31536000, immutable"),
    );

    response
}
