use axum::{
    Extension, Router,
    body::Body,
    http::{Request, StatusCode, header},
    middleware::from_fn,
    routing::get,
};
use http_body_util::BodyExt;
use tideway_impersonation::impersonation::test::Harness;
use tideway_impersonation::{
    ImpersonationConfig, ImpersonationMiddleware, Impersonator, PrincipalId, RequestContext,
    TtlExpiry,
};
use tower::ServiceExt;

fn router(impersonator: Impersonator) -> Router {
    Router::new()
        .route("/dashboard", get(|| async { "dashboard" }))
        .route(
            "/admin/billing",
            get(|| async { "billing" }).layer(from_fn(ImpersonationMiddleware::prevent_impersonation)),
        )
        .route(
            "/impersonate/banner",
            get(|| async { "banner" }).layer(from_fn(ImpersonationMiddleware::require_impersonation)),
        )
        .layer(from_fn(ImpersonationMiddleware::check_ttl))
        .layer(Extension(impersonator))
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn start(h: &Harness, impersonator: &Impersonator, leave: Option<&str>) {
    impersonator
        .start(
            &RequestContext::new("/admin/users"),
            h.user.clone(),
            leave.map(str::to_string),
            None,
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_requests_pass_without_episode() {
    let h = Harness::new();
    let app = router(h.impersonator(ImpersonationConfig::new().ttl_seconds(Some(60))));

    let response = app.clone().oneshot(get_request("/dashboard")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.oneshot(get_request("/admin/billing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_expired_episode_redirects_to_leave_url() {
    let h = Harness::new();
    let impersonator = h.impersonator(ImpersonationConfig::new().ttl_seconds(Some(3600)));
    start(&h, &impersonator, Some("/admin/users")).await;
    h.clock.advance(3601);

    let response = router(impersonator.clone())
        .oneshot(get_request("/dashboard"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/admin/users"
    );
    let expiry = response.extensions().get::<TtlExpiry>().unwrap();
    assert_eq!(
        expiry.message,
        "Your impersonation session has expired and you have been returned to your original account."
    );

    assert!(!impersonator.is_impersonating().await.unwrap());
    assert_eq!(h.auth.current_id("web"), Some(PrincipalId::Int(1)));
}

#[tokio::test]
async fn test_live_episode_passes_ttl_check() {
    let h = Harness::new();
    let impersonator = h.impersonator(ImpersonationConfig::new().ttl_seconds(Some(3600)));
    start(&h, &impersonator, None).await;
    h.clock.advance(3600);

    let response = router(impersonator.clone())
        .oneshot(get_request("/dashboard"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(impersonator.is_impersonating().await.unwrap());
}

#[tokio::test]
async fn test_prevent_impersonation_blocks_active_episode() {
    let h = Harness::new();
    let impersonator = h.impersonator(ImpersonationConfig::new());
    start(&h, &impersonator, None).await;

    let response = router(impersonator)
        .oneshot(get_request("/admin/billing"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(
        body["error"],
        "This action is not allowed while impersonating another user."
    );
    assert!(body["error_id"].is_string());
}

#[tokio::test]
async fn test_require_impersonation() {
    let h = Harness::new();
    let impersonator = h.impersonator(ImpersonationConfig::new());
    let app = router(impersonator.clone());

    let response = app
        .clone()
        .oneshot(get_request("/impersonate/banner"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(
        body_json(response).await["error"],
        "This action requires active impersonation."
    );

    start(&h, &impersonator, None).await;

    let response = app.oneshot(get_request("/impersonate/banner")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_missing_impersonator_is_server_error() {
    let app = Router::new()
        .route("/dashboard", get(|| async { "dashboard" }))
        .layer(from_fn(ImpersonationMiddleware::check_ttl));

    let response = app.oneshot(get_request("/dashboard")).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["error"], "Internal server error");
}
