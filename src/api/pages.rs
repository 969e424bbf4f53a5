//! Server-rendered pages
//!
//! Every page runs behind `optional_auth`. Pages that need an account send
//! anonymous visitors to `/auth/signin`. Form posts answer with a redirect on
//! success and re-render the form with the error message otherwise.

use axum::{
    extract::{FromRequestParts, Path, Query, RawQuery, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tera::Context as TeraContext;

use crate::api::auth::{sign_in, DeleteAccountRequest};
use crate::api::middleware::{
    session_cookie, session_token, ApiError, AppState, AuthenticatedUser, ClientIp,
    CLEAR_SESSION_COOKIE,
};
use crate::models::{CreatePostInput, Post, PostEngagement, PostQuery, User};
use crate::services::navigation::{display_tag, filter_posts, QuickNav};
use crate::services::post::parse_tags_field;
use crate::services::user::{ChangePasswordInput, LoginInput, RegisterInput, UpdateProfileInput};
use crate::theme::{CurrentUser, StandardTemplateVars};

/// Excerpt length on the home page and the saved list
const CARD_EXCERPT_CHARS: usize = 150;
/// Excerpt length on "My Posts"
const MY_POSTS_EXCERPT_CHARS: usize = 200;
/// Tags shown per card on "My Posts" before "+N more"
const MY_POSTS_TAG_LIMIT: usize = 3;

const SIGNIN_PATH: &str = "/auth/signin";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home))
        .route("/about", get(about))
        .route("/posts/{id}", get(show_post))
        .route("/posts/{id}/delete", post(delete_post))
        .route("/posts/{id}/like", post(toggle_like))
        .route("/posts/{id}/bookmark", post(toggle_bookmark))
        .route("/new", get(new_post_form).post(create_post))
        .route("/edit/{id}", get(edit_post_form).post(update_post))
        .route("/myposts", get(my_posts))
        .route("/saved", get(saved_posts))
        .route("/profile", get(profile).post(update_profile))
        .route("/profile/password", post(change_password))
        .route("/profile/delete", post(delete_account))
        .route("/auth/signin", get(signin_form).post(signin))
        .route("/auth/signup", get(signup_form).post(signup))
        .route("/auth/signout", post(signout))
}

/// Who is asking, and for which path
pub struct PageRequest {
    pub user: Option<User>,
    pub path: String,
}

impl<S> FromRequestParts<S> for PageRequest
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(PageRequest {
            user: parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
            path: parts.uri.path().to_string(),
        })
    }
}

/// Numeric `{id}` of a post page. Anything else gets the themed 404 page.
struct PostIdPath(i64);

impl FromRequestParts<AppState> for PostIdPath {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = Path::<String>::from_request_parts(parts, state)
            .await
            .map(|Path(raw)| raw)
            .unwrap_or_default();
        match raw.parse::<i64>() {
            Ok(id) => Ok(PostIdPath(id)),
            Err(_) => {
                let page = match PageRequest::from_request_parts(parts, state).await {
                    Ok(page) => page,
                    Err(never) => match never {},
                };
                Err(error_page(
                    state,
                    &page,
                    StatusCode::NOT_FOUND,
                    "Not found",
                    "Post not found",
                ))
            }
        }
    }
}

impl PageRequest {
    fn vars(&self, state: &AppState) -> StandardTemplateVars {
        let vars = StandardTemplateVars::new(
            state.site.name.clone(),
            state.site.description.clone(),
            self.path.clone(),
        );
        match &self.user {
            Some(user) => vars.with_user(CurrentUser::from(user)),
            None => vars,
        }
    }

    /// The signed-in user, or a redirect to the sign-in page
    fn signed_in(&self) -> Result<&User, Response> {
        self.user
            .as_ref()
            .ok_or_else(|| Redirect::to(SIGNIN_PATH).into_response())
    }
}

fn render(
    state: &AppState,
    page: &PageRequest,
    status: StatusCode,
    template: &str,
    context: &TeraContext,
) -> Response {
    let html = state
        .theme_engine
        .render_page(template, context, &page.vars(state));
    (status, Html(html)).into_response()
}

fn error_page(
    state: &AppState,
    page: &PageRequest,
    status: StatusCode,
    title: &str,
    message: &str,
) -> Response {
    let mut context = TeraContext::new();
    context.insert("error_title", title);
    context.insert("error_message", message);
    render(state, page, status, "error.html", &context)
}

fn api_error_page(state: &AppState, page: &PageRequest, e: ApiError) -> Response {
    let title = match e.status() {
        StatusCode::NOT_FOUND => "Not found",
        StatusCode::FORBIDDEN => "Forbidden",
        _ => "Something went wrong",
    };
    error_page(state, page, e.status(), title, e.message())
}

/// Fallback for unknown paths
pub async fn not_found(State(state): State<AppState>, page: PageRequest) -> Response {
    error_page(
        &state,
        &page,
        StatusCode::NOT_FOUND,
        "Page not found",
        "The page you are looking for does not exist.",
    )
}

/// Redirect target from a form, restricted to local paths
fn local_redirect(target: Option<&str>, fallback: String) -> String {
    match target {
        Some(t) if t.starts_with('/') && !t.starts_with("//") && !t.contains('\\') => t.to_string(),
        _ => fallback,
    }
}

fn with_message(path: &str, message: &str) -> String {
    format!("{}?message={}", path, urlencoding::encode(message))
}

// ============================================================================
// Reading
// ============================================================================

#[derive(Debug, Serialize)]
struct PostCard {
    post: Post,
    excerpt: String,
    tags: Vec<String>,
    more_tags: usize,
    engagement: PostEngagement,
}

impl PostCard {
    fn new(post: Post, excerpt_chars: usize, tag_limit: Option<usize>) -> Self {
        let all_tags: Vec<String> = post.tags.iter().map(|t| display_tag(t)).collect();
        let shown = tag_limit.unwrap_or(all_tags.len()).min(all_tags.len());
        Self {
            excerpt: post.excerpt(excerpt_chars),
            more_tags: all_tags.len() - shown,
            tags: all_tags.into_iter().take(shown).collect(),
            engagement: PostEngagement::default(),
            post,
        }
    }
}

async fn cards_with_engagement(
    state: &AppState,
    posts: Vec<Post>,
    viewer: Option<i64>,
) -> Result<Vec<PostCard>, ApiError> {
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let engagement = state.engagement_service.engagement_for(&ids, viewer).await?;
    Ok(posts
        .into_iter()
        .map(|post| {
            let mut card = PostCard::new(post, CARD_EXCERPT_CHARS, None);
            card.engagement = engagement.get(&card.post.id).copied().unwrap_or_default();
            card
        })
        .collect())
}

/// GET /
async fn home(
    State(state): State<AppState>,
    page: PageRequest,
    RawQuery(query): RawQuery,
) -> Response {
    let filters = PostQuery::from_query_string(query.as_deref().unwrap_or(""));

    let result = async {
        let all = state.post_service.list().await?;
        let filtered = filter_posts(&all, &filters);
        let cards =
            cards_with_engagement(&state, filtered, page.user.as_ref().map(|u| u.id)).await?;
        Ok::<_, ApiError>((all, cards))
    }
    .await;

    let (all, cards) = match result {
        Ok(v) => v,
        Err(e) => return api_error_page(&state, &page, e),
    };

    let mut context = TeraContext::new();
    context.insert("shown_count", &cards.len());
    context.insert("total_count", &all.len());
    context.insert("cards", &cards);
    context.insert("has_filters", &!filters.is_empty());
    context.insert("filters", &filters);
    context.insert(
        "nav",
        &QuickNav::build(&all, state.site.recent_posts, state.site.archive_limit),
    );
    render(&state, &page, StatusCode::OK, "index.html", &context)
}

/// GET /posts/{id}
async fn show_post(
    State(state): State<AppState>,
    page: PageRequest,
    PostIdPath(id): PostIdPath,
) -> Response {
    let viewer = page.user.as_ref().map(|u| u.id);

    let result = async {
        let post = state.post_service.get_required(id).await?;
        let engagement = state.engagement_service.post_engagement(id, viewer).await?;
        let all = state.post_service.list().await?;
        Ok::<_, ApiError>((post, engagement, all))
    }
    .await;

    let (post, engagement, all) = match result {
        Ok(v) => v,
        Err(e) => return api_error_page(&state, &page, e),
    };

    let rendered = state.post_service.render(&post.content);
    let is_owner = viewer.is_some_and(|uid| post.is_owned_by(uid));
    let recent: Vec<&Post> = all.iter().take(state.site.recent_posts).collect();

    let mut context = TeraContext::new();
    context.insert("post", &post);
    context.insert("content_html", &rendered.html);
    context.insert("toc", &rendered.toc);
    context.insert("engagement", &engagement);
    context.insert("recent_posts", &recent);
    context.insert("is_owner", &is_owner);
    render(&state, &page, StatusCode::OK, "post.html", &context)
}

/// GET /about
async fn about(State(state): State<AppState>, page: PageRequest) -> Response {
    let post_count = state.post_service.list().await.map(|p| p.len()).unwrap_or(0);

    let mut context = TeraContext::new();
    context.insert("categories", &state.site.categories);
    context.insert("post_count", &post_count);
    render(&state, &page, StatusCode::OK, "about.html", &context)
}

// ============================================================================
// Writing
// ============================================================================

/// Editor form contents as the template sees them
#[derive(Debug, Default, Serialize)]
struct PostForm {
    title: String,
    content: String,
    category: String,
    /// Tags offered as checkboxes
    tags: Vec<String>,
    /// Remaining tags, comma separated
    extra_tags: String,
}

impl PostForm {
    fn from_input(input: &CreatePostInput, offered: &[String]) -> Self {
        let (tags, extra): (Vec<String>, Vec<String>) =
            input.tags.iter().cloned().partition(|t| offered.contains(t));
        Self {
            title: input.title.clone(),
            content: input.content.clone(),
            category: input.category.clone().unwrap_or_default(),
            tags,
            extra_tags: extra.join(", "),
        }
    }
}

/// Editor form fields. `tag` repeats once per ticked checkbox; `tags` is free
/// text (comma list or JSON array).
fn post_input(fields: &[(String, String)]) -> CreatePostInput {
    let mut input = CreatePostInput::default();
    for (key, value) in fields {
        match key.as_str() {
            "title" => input.title = value.clone(),
            "content" => input.content = value.clone(),
            "category" => input.category = Some(value.clone()),
            "tag" => input.tags.push(value.clone()),
            "tags" => input.tags.extend(parse_tags_field(value)),
            _ => {}
        }
    }
    input
}

struct FormView<'a> {
    heading: &'a str,
    action: String,
    submit_label: &'a str,
    cancel_url: String,
}

fn render_post_form(
    state: &AppState,
    page: &PageRequest,
    status: StatusCode,
    view: FormView<'_>,
    form: PostForm,
    error: Option<&str>,
) -> Response {
    let mut context = TeraContext::new();
    context.insert("heading", view.heading);
    context.insert("action", &view.action);
    context.insert("submit_label", view.submit_label);
    context.insert("cancel_url", &view.cancel_url);
    context.insert("form", &form);
    context.insert("categories", &state.site.categories);
    context.insert("available_tags", &state.site.tags);
    context.insert("error", &error);
    render(state, page, status, "post_form.html", &context)
}

fn new_post_view() -> FormView<'static> {
    FormView {
        heading: "Create New Post",
        action: "/new".to_string(),
        submit_label: "Publish",
        cancel_url: "/".to_string(),
    }
}

fn edit_post_view(id: i64) -> FormView<'static> {
    FormView {
        heading: "Edit Post",
        action: format!("/edit/{}", id),
        submit_label: "Save changes",
        cancel_url: format!("/posts/{}", id),
    }
}

/// GET /new
async fn new_post_form(State(state): State<AppState>, page: PageRequest) -> Response {
    if let Err(redirect) = page.signed_in() {
        return redirect;
    }
    render_post_form(
        &state,
        &page,
        StatusCode::OK,
        new_post_view(),
        PostForm::default(),
        None,
    )
}

/// POST /new
async fn create_post(
    State(state): State<AppState>,
    page: PageRequest,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let input = post_input(&fields);
    match state.post_service.create(user, input.clone()).await {
        Ok(_) => Redirect::to("/").into_response(),
        Err(e) => {
            let e = ApiError::from(e);
            let form = PostForm::from_input(&input, &state.site.tags);
            render_post_form(&state, &page, e.status(), new_post_view(), form, Some(e.message()))
        }
    }
}

/// GET /edit/{id}
async fn edit_post_form(
    State(state): State<AppState>,
    page: PageRequest,
    PostIdPath(id): PostIdPath,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let post = match state.post_service.get_required(id).await {
        Ok(post) => post,
        Err(e) => return api_error_page(&state, &page, e.into()),
    };
    if !post.is_owned_by(user.id) {
        return api_error_page(
            &state,
            &page,
            ApiError::forbidden("You don't have permission to edit this post"),
        );
    }

    let input = CreatePostInput {
        title: post.title,
        content: post.content,
        category: post.category,
        tags: post.tags,
    };
    let form = PostForm::from_input(&input, &state.site.tags);
    render_post_form(&state, &page, StatusCode::OK, edit_post_view(id), form, None)
}

/// POST /edit/{id}
async fn update_post(
    State(state): State<AppState>,
    page: PageRequest,
    PostIdPath(id): PostIdPath,
    Form(fields): Form<Vec<(String, String)>>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let input = post_input(&fields);
    match state.post_service.update(user, id, input.clone()).await {
        Ok(post) => Redirect::to(&format!("/posts/{}", post.id)).into_response(),
        Err(e) => {
            let e = ApiError::from(e);
            if e.status() != StatusCode::BAD_REQUEST {
                return api_error_page(&state, &page, e);
            }
            let form = PostForm::from_input(&input, &state.site.tags);
            render_post_form(&state, &page, e.status(), edit_post_view(id), form, Some(e.message()))
        }
    }
}

/// POST /posts/{id}/delete
async fn delete_post(
    State(state): State<AppState>,
    page: PageRequest,
    PostIdPath(id): PostIdPath,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.post_service.delete(user, id).await {
        Ok(()) => Redirect::to("/myposts").into_response(),
        Err(e) => api_error_page(&state, &page, e.into()),
    }
}

#[derive(Debug, Default, Deserialize)]
struct RedirectForm {
    redirect: Option<String>,
}

/// POST /posts/{id}/like
async fn toggle_like(
    State(state): State<AppState>,
    page: PageRequest,
    PostIdPath(id): PostIdPath,
    Form(form): Form<RedirectForm>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.engagement_service.toggle_like(id, user.id).await {
        Ok(_) => Redirect::to(&local_redirect(form.redirect.as_deref(), format!("/posts/{}", id)))
            .into_response(),
        Err(e) => api_error_page(&state, &page, e.into()),
    }
}

/// POST /posts/{id}/bookmark
async fn toggle_bookmark(
    State(state): State<AppState>,
    page: PageRequest,
    PostIdPath(id): PostIdPath,
    Form(form): Form<RedirectForm>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.engagement_service.toggle_bookmark(id, user.id).await {
        Ok(_) => Redirect::to(&local_redirect(form.redirect.as_deref(), format!("/posts/{}", id)))
            .into_response(),
        Err(e) => api_error_page(&state, &page, e.into()),
    }
}

/// GET /myposts
async fn my_posts(State(state): State<AppState>, page: PageRequest) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let posts = match state.post_service.list_by_user(user.id).await {
        Ok(posts) => posts,
        Err(e) => return api_error_page(&state, &page, e.into()),
    };
    let cards: Vec<PostCard> = posts
        .into_iter()
        .map(|p| PostCard::new(p, MY_POSTS_EXCERPT_CHARS, Some(MY_POSTS_TAG_LIMIT)))
        .collect();

    let mut context = TeraContext::new();
    context.insert("cards", &cards);
    render(&state, &page, StatusCode::OK, "my_posts.html", &context)
}

/// GET /saved
async fn saved_posts(State(state): State<AppState>, page: PageRequest) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let result = async {
        let posts = state.engagement_service.saved_posts(user.id).await?;
        cards_with_engagement(&state, posts, Some(user.id)).await
    }
    .await;

    match result {
        Ok(cards) => {
            let mut context = TeraContext::new();
            context.insert("cards", &cards);
            render(&state, &page, StatusCode::OK, "saved.html", &context)
        }
        Err(e) => api_error_page(&state, &page, e),
    }
}

// ============================================================================
// Account
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct MessageQuery {
    message: Option<String>,
}

async fn render_profile(
    state: &AppState,
    page: &PageRequest,
    user: &User,
    status: StatusCode,
    message: Option<&str>,
    error: Option<&str>,
) -> Response {
    let post_count = state
        .post_service
        .list_by_user(user.id)
        .await
        .map(|p| p.len())
        .unwrap_or(0);

    let mut context = TeraContext::new();
    context.insert("user", user);
    context.insert("post_count", &post_count);
    context.insert("message", &message);
    context.insert("error", &error);
    render(state, page, status, "profile.html", &context)
}

/// GET /profile
async fn profile(
    State(state): State<AppState>,
    page: PageRequest,
    Query(query): Query<MessageQuery>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };
    render_profile(&state, &page, user, StatusCode::OK, query.message.as_deref(), None).await
}

/// POST /profile
async fn update_profile(
    State(state): State<AppState>,
    page: PageRequest,
    Form(input): Form<UpdateProfileInput>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.user_service.update_profile(user.id, input).await {
        Ok(_) => {
            state.post_service.invalidate_cache().await;
            Redirect::to(&with_message("/profile", "Profile updated successfully")).into_response()
        }
        Err(e) => {
            let e = ApiError::from(e);
            render_profile(&state, &page, user, e.status(), None, Some(e.message())).await
        }
    }
}

/// POST /profile/password
async fn change_password(
    State(state): State<AppState>,
    page: PageRequest,
    headers: HeaderMap,
    Form(input): Form<ChangePasswordInput>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    let current = session_token(&headers);
    match state
        .user_service
        .change_password(user.id, input, current.as_deref())
        .await
    {
        Ok(()) => {
            Redirect::to(&with_message("/profile", "Password changed successfully")).into_response()
        }
        Err(e) => {
            let e = ApiError::from(e);
            // A wrong current password is a form error here, not a lost session
            let status = if e.status() == StatusCode::UNAUTHORIZED {
                StatusCode::BAD_REQUEST
            } else {
                e.status()
            };
            render_profile(&state, &page, user, status, None, Some(e.message())).await
        }
    }
}

/// POST /profile/delete
async fn delete_account(
    State(state): State<AppState>,
    page: PageRequest,
    Form(form): Form<DeleteAccountRequest>,
) -> Response {
    let user = match page.signed_in() {
        Ok(user) => user,
        Err(redirect) => return redirect,
    };

    match state.user_service.delete_account(user.id, &form.confirmation).await {
        Ok(()) => {
            state.post_service.invalidate_cache().await;
            (
                [(header::SET_COOKIE, CLEAR_SESSION_COOKIE)],
                Redirect::to(&with_message(SIGNIN_PATH, "Your account has been deleted")),
            )
                .into_response()
        }
        Err(e) => {
            let e = ApiError::from(e);
            render_profile(&state, &page, user, e.status(), None, Some(e.message())).await
        }
    }
}

fn render_signin(
    state: &AppState,
    page: &PageRequest,
    status: StatusCode,
    email: &str,
    message: Option<&str>,
    error: Option<&str>,
) -> Response {
    let mut context = TeraContext::new();
    context.insert("email", email);
    context.insert("message", &message);
    context.insert("error", &error);
    render(state, page, status, "signin.html", &context)
}

/// GET /auth/signin
async fn signin_form(
    State(state): State<AppState>,
    page: PageRequest,
    Query(query): Query<MessageQuery>,
) -> Response {
    if page.user.is_some() {
        return Redirect::to("/").into_response();
    }
    render_signin(&state, &page, StatusCode::OK, "", query.message.as_deref(), None)
}

/// POST /auth/signin
async fn signin(
    State(state): State<AppState>,
    page: PageRequest,
    ClientIp(ip): ClientIp,
    Form(input): Form<LoginInput>,
) -> Response {
    let email = input.email.clone();
    match sign_in(&state, ip, input).await {
        Ok((session, _user)) => {
            let cookie = session_cookie(&session.id, state.user_service.session_days());
            ([(header::SET_COOKIE, cookie)], Redirect::to("/")).into_response()
        }
        Err(e) => render_signin(&state, &page, e.status(), &email, None, Some(e.message())),
    }
}

/// GET /auth/signup
async fn signup_form(State(state): State<AppState>, page: PageRequest) -> Response {
    if page.user.is_some() {
        return Redirect::to("/").into_response();
    }
    render(&state, &page, StatusCode::OK, "signup.html", &TeraContext::new())
}

/// POST /auth/signup
async fn signup(
    State(state): State<AppState>,
    page: PageRequest,
    Form(input): Form<RegisterInput>,
) -> Response {
    let (name, email) = (input.name.clone(), input.email.clone());
    match state.user_service.register(input).await {
        Ok(_) => Redirect::to(&with_message(SIGNIN_PATH, "Account created successfully"))
            .into_response(),
        Err(e) => {
            let e = ApiError::from(e);
            let mut context = TeraContext::new();
            context.insert("name", &name);
            context.insert("email", &email);
            context.insert("error", e.message());
            render(&state, &page, e.status(), "signup.html", &context)
        }
    }
}

/// POST /auth/signout
async fn signout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    if let Some(token) = session_token(&headers) {
        if let Err(e) = state.user_service.logout(&token).await {
            tracing::warn!("Failed to delete session on sign-out: {}", e);
        }
    }
    ([(header::SET_COOKIE, CLEAR_SESSION_COOKIE)], Redirect::to("/")).into_response()
}
