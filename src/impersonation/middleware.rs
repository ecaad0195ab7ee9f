use crate::error::ImpersonationError;
use crate::impersonation::manager::Impersonator;
use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

/// Request gates for routers that carry an [`Impersonator`] in their
/// extensions.
///
/// The impersonator must be added to the request before these run, usually
/// by a session layer that builds one per request.
///
/// # Example
///
/// ```rust,ignore
/// use axum::{Extension, Router, middleware::from_fn, routing::get};
/// use tideway_impersonation::ImpersonationMiddleware;
///
/// let admin = Router::new()
///     .route("/admin/billing", get(billing))
///     .layer(from_fn(ImpersonationMiddleware::prevent_impersonation));
///
/// let app = Router::new()
///     .merge(admin)
///     .route("/impersonate/leave", get(leave).layer(from_fn(ImpersonationMiddleware::require_impersonation)))
///     .layer(from_fn(ImpersonationMiddleware::check_ttl))
///     .layer(Extension(impersonator));
/// ```
pub struct ImpersonationMiddleware;

impl ImpersonationMiddleware {
    /// End an episode that outlived its TTL and redirect to the leave URL.
    ///
    /// The redirect is a 303 carrying the [`TtlExpiry`](super::TtlExpiry) in
    /// its response extensions, so a flash layer can show the message.
    pub async fn check_ttl(request: Request, next: Next) -> Result<Response, ImpersonationError> {
        let impersonator = impersonator(&request)?;

        if let Some(expiry) = impersonator.check_ttl().await? {
            let mut response = Redirect::to(&expiry.redirect_url).into_response();
            response.extensions_mut().insert(expiry);
            return Ok(response);
        }

        Ok(next.run(request).await)
    }

    /// Reject the request with 403 while an episode is active.
    pub async fn prevent_impersonation(
        request: Request,
        next: Next,
    ) -> Result<Response, ImpersonationError> {
        impersonator(&request)?.prevent_impersonation().await?;
        Ok(next.run(request).await)
    }

    /// Reject the request with 403 unless an episode is active.
    pub async fn require_impersonation(
        request: Request,
        next: Next,
    ) -> Result<Response, ImpersonationError> {
        impersonator(&request)?.require_impersonation().await?;
        Ok(next.run(request).await)
    }
}

fn impersonator(request: &Request) -> Result<Impersonator, ImpersonationError> {
    request
        .extensions()
        .get::<Impersonator>()
        .cloned()
        .ok_or_else(|| ImpersonationError::internal("Impersonator not found in request extensions"))
}
