use crate::application::error::{ErrorReport, HttpError};
use crate::application::pagination::Paginated;
use crate::domain::entities::{CommentRecord, GroupRecord, PostRecord};
use crate::domain::posts::format_human_date;
use crate::domain::viewer::Viewer;
use askama::{Error as AskamaError, Template};
use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{public_message}")]
pub struct TemplateRenderError {
    pub(crate) source: &'static str,
    pub(crate) public_message: &'static str,
    #[source]
    pub(crate) error: AskamaError,
}

impl TemplateRenderError {
    pub fn new(source: &'static str, public_message: &'static str, error: AskamaError) -> Self {
        Self {
            source,
            public_message,
            error,
        }
    }
}

impl From<TemplateRenderError> for HttpError {
    fn from(err: TemplateRenderError) -> Self {
        let TemplateRenderError {
            source,
            public_message,
            error,
        } = err;

        HttpError::from_error(
            source,
            StatusCode::INTERNAL_SERVER_ERROR,
            public_message,
            &error,
        )
    }
}

pub fn render_template<T: Template>(template: T) -> Result<Html<String>, HttpError> {
    template.render().map(Html).map_err(|err| {
        TemplateRenderError::new(
            "presentation::views::render_template",
            "Template rendering failed",
            err,
        )
        .into()
    })
}

pub fn render_template_response<T: Template>(template: T, status: StatusCode) -> Response {
    match render_template(template) {
        Ok(html) => (status, html).into_response(),
        Err(err) => err.into_response(),
    }
}

pub fn render_not_found_response(chrome: LayoutChrome) -> Response {
    let content = ErrorPageView::not_found();
    let view = LayoutContext::new(chrome, content);
    let mut response = render_template_response(ErrorTemplate { view }, StatusCode::NOT_FOUND);
    ErrorReport::from_message(
        "presentation::views::render_not_found_response",
        StatusCode::NOT_FOUND,
        "Resource not found",
    )
    .attach(&mut response);
    response
}

/// Per-request layout data shared by every page.
#[derive(Clone)]
pub struct LayoutChrome {
    pub viewer_handle: Option<String>,
    pub title: String,
}

impl LayoutChrome {
    pub fn new(viewer: &Viewer, title: impl Into<String>) -> Self {
        Self {
            viewer_handle: viewer.handle().map(str::to_string),
            title: title.into(),
        }
    }
}

#[derive(Clone)]
pub struct LayoutContext<T> {
    pub viewer_handle: Option<String>,
    pub title: String,
    pub content: T,
}

impl<T> LayoutContext<T> {
    pub fn new(chrome: LayoutChrome, content: T) -> Self {
        Self {
            viewer_handle: chrome.viewer_handle,
            title: chrome.title,
            content,
        }
    }
}

#[derive(Clone)]
pub struct GroupBadge {
    pub slug: String,
    pub title: String,
}

#[derive(Clone)]
pub struct PostCard {
    pub id: String,
    pub author_handle: String,
    pub group: Option<GroupBadge>,
    pub text: String,
    pub image_path: Option<String>,
    pub published: String,
}

impl PostCard {
    pub fn from_record(record: &PostRecord) -> Self {
        let group = match (record.group_slug.as_ref(), record.group_title.as_ref()) {
            (Some(slug), Some(title)) => Some(GroupBadge {
                slug: slug.clone(),
                title: title.clone(),
            }),
            _ => None,
        };

        Self {
            id: record.id.to_string(),
            author_handle: record.author_handle.clone(),
            group,
            text: record.text.clone(),
            image_path: record.image_path.clone(),
            published: format_human_date(record.created_at),
        }
    }
}

/// Numbered-page navigation rendered under a feed.
#[derive(Clone)]
pub struct PaginationView {
    pub current_page: u32,
    pub total_pages: u32,
    pub has_previous: bool,
    pub has_next: bool,
    pub previous_page: u32,
    pub next_page: u32,
    pub base_path: String,
}

impl PaginationView {
    pub fn from_page<T>(page: &Paginated<T>, base_path: impl Into<String>) -> Self {
        Self {
            current_page: page.current_page,
            total_pages: page.total_pages,
            has_previous: page.has_previous(),
            has_next: page.has_next(),
            previous_page: page.current_page.saturating_sub(1).max(1),
            next_page: page.current_page.saturating_add(1),
            base_path: base_path.into(),
        }
    }
}

pub struct FeedContext {
    pub heading: String,
    pub subheading: Option<String>,
    pub posts: Vec<PostCard>,
    pub pagination: PaginationView,
}

impl FeedContext {
    pub fn new(
        heading: impl Into<String>,
        subheading: Option<String>,
        page: &Paginated<PostRecord>,
        base_path: impl Into<String>,
    ) -> Self {
        Self {
            heading: heading.into(),
            subheading,
            posts: page.items.iter().map(PostCard::from_record).collect(),
            pagination: PaginationView::from_page(page, base_path),
        }
    }
}

#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Template)]
#[template(path = "group.html")]
pub struct GroupTemplate {
    pub view: LayoutContext<FeedContext>,
}

pub struct ProfileContext {
    pub author_handle: String,
    pub total_posts: u64,
    pub viewer_follows_author: bool,
    pub viewer_is_author: bool,
    pub feed: FeedContext,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub view: LayoutContext<ProfileContext>,
}

#[derive(Template)]
#[template(path = "follow.html")]
pub struct FollowTemplate {
    pub view: LayoutContext<FeedContext>,
}

#[derive(Clone)]
pub struct CommentView {
    pub author_handle: String,
    pub text: String,
    pub published: String,
}

impl CommentView {
    pub fn from_record(record: &CommentRecord) -> Self {
        Self {
            author_handle: record.author_handle.clone(),
            text: record.text.clone(),
            published: format_human_date(record.created_at),
        }
    }
}

pub struct PostDetailContext {
    pub post: PostCard,
    pub comments: Vec<CommentView>,
    pub viewer_is_owner: bool,
    pub viewer_can_comment: bool,
}

#[derive(Template)]
#[template(path = "post_detail.html")]
pub struct PostDetailTemplate {
    pub view: LayoutContext<PostDetailContext>,
}

#[derive(Clone)]
pub struct GroupOption {
    pub slug: String,
    pub title: String,
    pub selected: bool,
}

pub struct PostFormContext {
    pub heading: String,
    pub action: String,
    pub text: String,
    pub groups: Vec<GroupOption>,
    pub error: Option<String>,
}

impl PostFormContext {
    pub fn create(groups: Vec<GroupRecord>) -> Self {
        Self {
            heading: "New post".to_string(),
            action: "/create".to_string(),
            text: String::new(),
            groups: group_options(groups, None),
            error: None,
        }
    }

    pub fn edit(post: &PostRecord, groups: Vec<GroupRecord>) -> Self {
        Self {
            heading: "Edit post".to_string(),
            action: format!("/posts/{}/edit", post.id),
            text: post.text.clone(),
            groups: group_options(groups, post.group_slug.as_deref()),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }
}

fn group_options(groups: Vec<GroupRecord>, selected_slug: Option<&str>) -> Vec<GroupOption> {
    groups
        .into_iter()
        .map(|group| {
            let selected = selected_slug == Some(group.slug.as_str());
            GroupOption {
                slug: group.slug,
                title: group.title,
                selected,
            }
        })
        .collect()
}

#[derive(Template)]
#[template(path = "post_form.html")]
pub struct PostFormTemplate {
    pub view: LayoutContext<PostFormContext>,
}

pub struct ErrorPageView {
    pub title: String,
    pub message: String,
}

impl ErrorPageView {
    pub fn not_found() -> Self {
        Self {
            title: "Page Not Found".to_string(),
            message: "The page you requested does not exist. Try returning to the feed."
                .to_string(),
        }
    }
}

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub view: LayoutContext<ErrorPageView>,
}
