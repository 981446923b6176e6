//! Identity middleware
//!
//! Resolves the caller from request headers and stores it in the request
//! extensions for handlers to use.

use crate::auth::{Caller, Role};
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Turns request headers into a caller identity
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Result<Caller, AppError>;
}

/// Reads `X-Actor-Id` / `X-Actor-Role` as set by the upstream gateway
#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderIdentityResolver;

impl IdentityResolver for HeaderIdentityResolver {
    fn resolve(&self, headers: &HeaderMap) -> Result<Caller, AppError> {
        let header = |name: &str| -> Result<Option<String>, AppError> {
            match headers.get(name) {
                None => Ok(None),
                Some(value) => {
                    let value = value
                        .to_str()
                        .map_err(|_| AppError::Validation(format!("Header {} is not valid text", name)))?
                        .trim();
                    Ok((!value.is_empty()).then(|| value.to_string()))
                }
            }
        };

        let actor_id = header(ACTOR_ID_HEADER)?;
        let role = header(ACTOR_ROLE_HEADER)?
            .map(|r| r.parse::<Role>())
            .transpose()?;

        Ok(Caller { actor_id, role })
    }
}

/// Resolve the caller and insert it into request extensions
pub async fn identity_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let caller = state.identity.resolve(request.headers())?;
    request.extensions_mut().insert(caller);
    Ok(next.run(request).await)
}
