//! API layer - HTTP handlers and routing
//!
//! Two surfaces share one `AppState`:
//! - Server-rendered pages at the site root (`pages`)
//! - A JSON API under `/api/v1` (`auth`, `posts`, `engagement`)
//!
//! Both resolve the session from the `session` cookie or a Bearer token.

pub mod auth;
pub mod engagement;
pub mod middleware;
pub mod pages;
pub mod posts;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::cache::Cache;
use crate::config::Config;
use crate::db::repositories::{
    SqlxEngagementRepository, SqlxPostRepository, SqlxSessionRepository, SqlxUserRepository,
};
use crate::db::DynDatabasePool;
use crate::services::{
    EngagementService, LoginRateLimiter, MarkdownRenderer, PostService, UserService,
};
use crate::theme::ThemeEngine;

pub use middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};

/// Wire repositories, services and the theme engine into the shared state
pub fn build_state(pool: DynDatabasePool, config: &Config, cache: Arc<Cache>) -> Result<AppState> {
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let session_repo = SqlxSessionRepository::boxed(pool.clone());
    let post_repo = SqlxPostRepository::boxed(pool.clone());
    let engagement_repo = SqlxEngagementRepository::boxed(pool);

    let user_service = Arc::new(UserService::with_config(
        user_repo,
        session_repo,
        post_repo.clone(),
        &config.auth,
    ));
    let post_service = Arc::new(PostService::with_cache_ttl(
        post_repo.clone(),
        cache,
        MarkdownRenderer::new(),
        Duration::from_secs(config.cache.ttl_seconds),
    ));
    let engagement_service = Arc::new(EngagementService::new(engagement_repo, post_repo));

    let theme_engine = match &config.site.templates_dir {
        Some(dir) => ThemeEngine::with_overrides(Path::new(dir))
            .with_context(|| format!("Failed to load templates from {}", dir))?,
        None => ThemeEngine::new().context("Failed to load built-in templates")?,
    };

    Ok(AppState {
        user_service,
        post_service,
        engagement_service,
        theme_engine: Arc::new(theme_engine),
        rate_limiter: Arc::new(LoginRateLimiter::new()),
        site: Arc::new(config.site.clone()),
    })
}

/// Build the JSON API router
pub fn build_api_router(state: AppState) -> Router<AppState> {
    // Signed in only
    let protected_routes = Router::new()
        .nest("/auth", auth::protected_router())
        .merge(posts::protected_router())
        .merge(engagement::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Public routes, user attached when signed in
    Router::new()
        .nest("/auth", auth::public_router())
        .merge(posts::public_router())
        .merge(engagement::public_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::optional_auth,
        ))
        .merge(protected_routes)
        .fallback(api_not_found)
}

async fn api_not_found() -> ApiError {
    ApiError::not_found("Endpoint not found")
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, cors_origin: &str) -> Result<Router> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .with_context(|| format!("Invalid CORS origin: {}", cors_origin))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
        .allow_credentials(true);

    let pages = pages::router()
        .fallback(pages::not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::optional_auth,
        ));

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone()))
        .merge(pages)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::create_cache;
    use crate::config::CacheConfig;
    use crate::db::{create_test_pool, migrations::run_migrations};
    use axum::body::Body;
    use axum::http::{Request, Response, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let pool = create_test_pool().await.expect("Failed to create pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        let cache = create_cache(&CacheConfig::default());
        let state = build_state(pool, &Config::default(), cache).expect("Failed to build state");
        build_router(state, "http://localhost:8080").expect("Failed to build router")
    }

    #[tokio::test]
    async fn test_post_cache_uses_configured_ttl() {
        let pool = create_test_pool().await.expect("Failed to create pool");
        let mut config = Config::default();
        config.cache.ttl_seconds = 30;
        let state = build_state(pool.clone(), &config, create_cache(&config.cache)).unwrap();
        assert_eq!(
            state.post_service.cache_ttls(),
            (Duration::from_secs(30), Duration::from_secs(30))
        );

        config.cache.ttl_seconds = 7200;
        let state = build_state(pool, &config, create_cache(&config.cache)).unwrap();
        assert_eq!(
            state.post_service.cache_ttls(),
            (Duration::from_secs(7200), Duration::from_secs(600))
        );
    }

    fn json_request(method: &str, uri: &str, cookie: Option<&str>, body: Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn form_request(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        builder.body(Body::empty()).unwrap()
    }

    async fn body_json(response: Response<Body>) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn location(response: &Response<Body>) -> String {
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    /// `session=<token>` from a sign-in response
    fn session_from(response: &Response<Body>) -> String {
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        set_cookie.split(';').next().unwrap().to_string()
    }

    /// Create an account and sign in through the JSON API
    async fn signed_in(app: &Router, name: &str, email: &str) -> String {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/signup",
                None,
                json!({
                    "name": name,
                    "email": email,
                    "password": "password123",
                    "confirm_password": "password123"
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/signin",
                None,
                json!({ "email": email, "password": "password123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        session_from(&response)
    }

    async fn create_post(app: &Router, cookie: &str, title: &str) -> i64 {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/posts",
                Some(cookie),
                json!({ "title": title, "content": "# Heading\n\nBody", "tags": "Rust, Axum" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        body_json(response).await["post"]["id"].as_i64().unwrap()
    }

    #[tokio::test]
    async fn test_signin_sets_session_cookie() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;
        assert!(cookie.starts_with("session="));

        let response = app
            .clone()
            .oneshot(get("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["email"], "ada@example.com");
    }

    #[tokio::test]
    async fn test_signin_wrong_password() {
        let app = test_app().await;
        signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/signin",
                None,
                json!({ "email": "ada@example.com", "password": "wrong-password" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Invalid email or password"
        );
    }

    #[tokio::test]
    async fn test_protected_route_requires_session() {
        let app = test_app().await;
        let response = app
            .oneshot(get("/api/v1/auth/me", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_create_post_requires_title_and_content() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/posts",
                Some(&cookie),
                json!({ "title": "   ", "content": "Body" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "Title and content are required"
        );
    }

    #[tokio::test]
    async fn test_post_detail_and_listing() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;
        let id = create_post(&app, &cookie, "First").await;

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/posts/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["post"]["author"], "Ada");
        assert_eq!(body["post"]["tags"], json!(["Rust", "Axum"]));
        assert!(body["content_html"].as_str().unwrap().contains("<h1"));
        assert_eq!(body["toc"][0]["text"], "Heading");

        let response = app
            .clone()
            .oneshot(get("/api/v1/posts?tag=Rust", None))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["count"], 1);

        let response = app
            .clone()
            .oneshot(get("/api/v1/posts?tag=Go", None))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["count"], 0);
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_delete_other_users_post_is_forbidden() {
        let app = test_app().await;
        let owner = signed_in(&app, "Ada", "ada@example.com").await;
        let other = signed_in(&app, "Bob", "bob@example.com").await;
        let id = create_post(&app, &owner, "Mine").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                &format!("/api/v1/posts/{}", id),
                Some(&other),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(json_request(
                "DELETE",
                &format!("/api/v1/posts/{}", id),
                Some(&owner),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .clone()
            .oneshot(get(&format!("/api/v1/posts/{}", id), None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_like_toggle() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;
        let id = create_post(&app, &cookie, "Likeable").await;
        let uri = format!("/api/v1/posts/{}/like", id);

        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, None, json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            body_json(response).await["error"]["message"],
            "You must be signed in to like posts"
        );

        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, Some(&cookie), json!({})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["liked"], true);

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/engagement",
                Some(&cookie),
                json!({ "post_ids": [id] }),
            ))
            .await
            .unwrap();
        let body = body_json(response).await;
        let entry = &body["engagement"][id.to_string()];
        assert_eq!(entry["like_count"], 1);
        assert_eq!(entry["is_liked"], true);

        let response = app
            .clone()
            .oneshot(json_request("POST", &uri, Some(&cookie), json!({})))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["liked"], false);
    }

    #[tokio::test]
    async fn test_bookmark_missing_post() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/posts/999/bookmark",
                Some(&cookie),
                json!({}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_api_route() {
        let app = test_app().await;
        let response = app.oneshot(get("/api/v1/nope", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_home_page_empty_state() {
        let app = test_app().await;
        let response = app.oneshot(get("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("No posts yet. Create one!"));
        assert!(html.contains("Sign in"));
    }

    #[tokio::test]
    async fn test_home_page_lists_posts() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;
        create_post(&app, &cookie, "Hello from Ada").await;

        let response = app.oneshot(get("/", Some(&cookie))).await.unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Hello from Ada"));
        assert!(html.contains("Ada"));
    }

    #[tokio::test]
    async fn test_unknown_page_renders_error_page() {
        let app = test_app().await;
        let response = app.oneshot(get("/no/such/page", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(body_text(response).await.contains("Page not found"));
    }

    #[tokio::test]
    async fn test_new_post_page_redirects_anonymous() {
        let app = test_app().await;
        let response = app.oneshot(get("/new", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/auth/signin");
    }

    #[tokio::test]
    async fn test_signup_and_signin_pages() {
        let app = test_app().await;

        let response = app
            .clone()
            .oneshot(form_request(
                "/auth/signup",
                None,
                "name=Ada&email=ada%40example.com&password=password123&confirm_password=password123",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "/auth/signin?message=Account%20created%20successfully"
        );

        let response = app
            .clone()
            .oneshot(form_request(
                "/auth/signin",
                None,
                "email=ada%40example.com&password=password123",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");
        let cookie = session_from(&response);

        let response = app.oneshot(get("/new", Some(&cookie))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Create New Post"));
    }

    #[tokio::test]
    async fn test_signup_page_shows_validation_error() {
        let app = test_app().await;
        let response = app
            .oneshot(form_request(
                "/auth/signup",
                None,
                "name=Ada&email=ada%40example.com&password=password123&confirm_password=other",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response).await.contains("Passwords do not match"));
    }

    #[tokio::test]
    async fn test_new_post_form_flow() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(form_request("/new", Some(&cookie), "title=&content=Body"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response)
            .await
            .contains("Title and content are required"));

        let response = app
            .clone()
            .oneshot(form_request(
                "/new",
                Some(&cookie),
                "title=Form+post&content=Body&category=Design&tag=CSS&tags=Rust",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), "/");

        let response = app
            .clone()
            .oneshot(get("/myposts", Some(&cookie)))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Form post"));
    }

    #[tokio::test]
    async fn test_bookmark_page_redirect() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;
        let id = create_post(&app, &cookie, "Keep me").await;

        let response = app
            .clone()
            .oneshot(form_request(
                &format!("/posts/{}/bookmark", id),
                Some(&cookie),
                "",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/posts/{}", id));

        let response = app
            .clone()
            .oneshot(get("/saved", Some(&cookie)))
            .await
            .unwrap();
        assert!(body_text(response).await.contains("Keep me"));

        let response = app
            .clone()
            .oneshot(form_request(
                &format!("/posts/{}/bookmark", id),
                Some(&cookie),
                "redirect=%2Fsaved",
            ))
            .await
            .unwrap();
        assert_eq!(location(&response), "/saved");

        let response = app.oneshot(get("/saved", Some(&cookie))).await.unwrap();
        assert!(body_text(response).await.contains("No saved posts yet"));
    }

    fn signin_from(ip: &str, email: &str, password: &str) -> Request<Body> {
        let mut request = json_request(
            "POST",
            "/api/v1/auth/signin",
            None,
            json!({ "email": email, "password": password }),
        );
        request
            .headers_mut()
            .insert("x-forwarded-for", ip.parse().unwrap());
        request
    }

    #[tokio::test]
    async fn test_signin_rate_limited_per_email() {
        let app = test_app().await;
        signed_in(&app, "Ada", "ada@example.com").await;

        for _ in 0..5 {
            let response = app
                .clone()
                .oneshot(json_request(
                    "POST",
                    "/api/v1/auth/signin",
                    None,
                    json!({ "email": "ada@example.com", "password": "wrong-password" }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        // Even the right password is refused now
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/auth/signin",
                None,
                json!({ "email": "ada@example.com", "password": "password123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT");
        assert_eq!(
            body["error"]["message"],
            "Too many failed sign-in attempts, please try again in 15 minutes"
        );
    }

    #[tokio::test]
    async fn test_signin_rate_limited_per_ip() {
        let app = test_app().await;
        signed_in(&app, "Ada", "ada@example.com").await;

        // Distinct emails so the per-email limit never triggers
        for i in 0..10 {
            let response = app
                .clone()
                .oneshot(signin_from(
                    "203.0.113.7",
                    &format!("nobody{}@example.com", i),
                    "password123",
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }

        let response = app
            .clone()
            .oneshot(signin_from("203.0.113.7", "ada@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "RATE_LIMIT");
        assert_eq!(
            body["error"]["message"],
            "Too many requests, please try again later"
        );

        // Another address is unaffected
        let response = app
            .oneshot(signin_from("198.51.100.1", "ada@example.com", "password123"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_engagement_rejects_oversized_batch() {
        let app = test_app().await;
        let ids: Vec<i64> = (1..=1001).collect();

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/engagement",
                None,
                json!({ "post_ids": ids }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], "VALIDATION_ERROR");

        let ids: Vec<i64> = (1..=1000).collect();
        let response = app
            .oneshot(json_request(
                "POST",
                "/api/v1/engagement",
                None,
                json!({ "post_ids": ids }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_edit_page_is_owner_only() {
        let app = test_app().await;
        let owner = signed_in(&app, "Ada", "ada@example.com").await;
        let other = signed_in(&app, "Bob", "bob@example.com").await;
        let id = create_post(&app, &owner, "Launch notes").await;
        let edit_path = format!("/edit/{}", id);

        let response = app
            .clone()
            .oneshot(get(&edit_path, Some(&other)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert!(body_text(response)
            .await
            .contains("permission to edit this post"));

        let response = app
            .clone()
            .oneshot(form_request(
                &edit_path,
                Some(&other),
                "title=Hijacked&content=Body",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app
            .clone()
            .oneshot(get(&edit_path, Some(&owner)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("Launch notes"));

        let response = app
            .clone()
            .oneshot(form_request(
                &edit_path,
                Some(&owner),
                "title=Edited+title&content=New+body",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(location(&response), format!("/posts/{}", id));

        let response = app
            .oneshot(get(&format!("/posts/{}", id), None))
            .await
            .unwrap();
        let html = body_text(response).await;
        assert!(html.contains("Edited title"));
        assert!(!html.contains("Hijacked"));
    }

    #[tokio::test]
    async fn test_non_numeric_post_id_renders_not_found_page() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        for request in [
            get("/posts/abc", None),
            get("/edit/abc", Some(&cookie)),
            form_request("/posts/abc/like", Some(&cookie), ""),
        ] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
            let html = body_text(response).await;
            assert!(html.contains("Post not found"));
            assert!(html.contains("<html"));
        }
    }

    #[tokio::test]
    async fn test_profile_update() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(form_request(
                "/profile",
                Some(&cookie),
                "name=Ada+Lovelace&email=ada%40example.com",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "/profile?message=Profile%20updated%20successfully"
        );

        let response = app
            .oneshot(get("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_profile_password_wrong_current() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(form_request(
                "/profile/password",
                Some(&cookie),
                "current_password=not-my-password&new_password=newpassword1&confirm_password=newpassword1",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response)
            .await
            .contains("Current password is incorrect"));

        // Still signed in
        let response = app
            .oneshot(get("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_profile_delete_account() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;

        let response = app
            .clone()
            .oneshot(form_request(
                "/profile/delete",
                Some(&cookie),
                "confirmation=ada%40example.com",
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            location(&response),
            "/auth/signin?message=Your%20account%20has%20been%20deleted"
        );
        let set_cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(set_cookie.starts_with("session=;"));
        assert!(set_cookie.contains("Max-Age=0"));

        let response = app
            .oneshot(get("/api/v1/auth/me", Some(&cookie)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_home_page_filters() {
        let app = test_app().await;
        let cookie = signed_in(&app, "Ada", "ada@example.com").await;
        create_post(&app, &cookie, "Rust notes").await;
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/v1/posts",
                Some(&cookie),
                json!({ "title": "Styling notes", "content": "Body", "tags": "CSS" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app.clone().oneshot(get("/?tag=CSS", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let html = body_text(response).await;
        assert!(html.contains("1 of 2 posts"));
        assert!(html.contains("Styling notes"));
        assert_eq!(html.matches("<article class=\"card\">").count(), 1);

        let response = app.oneshot(get("/?tag=Nope", None)).await.unwrap();
        let html = body_text(response).await;
        assert!(html.contains("0 of 2 posts"));
        assert!(html.contains("No posts found with the selected filters."));
    }
}
