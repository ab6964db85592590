use actix_web::dev::Payload;
use actix_web::{FromRequest, HttpRequest};
use std::future::{ready, Ready};
use uuid::Uuid;

use super::error::ApiError;

// ============================================================================
// Caller Identity
// ============================================================================
//
// Authentication happens upstream. The auth layer in front of this service
// forwards the authenticated user id and role as headers; handlers only
// extract them.
//
// ============================================================================

pub const USER_ID_HEADER: &str = "X-User-Id";
pub const USER_ROLE_HEADER: &str = "X-User-Role";
const ADMIN_ROLE: &str = "admin";

/// Authenticated user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub Uuid);

/// Authenticated user holding the admin role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminUser(pub Uuid);

fn user_id(req: &HttpRequest) -> Result<Uuid, ApiError> {
    req.headers()
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok())
        .ok_or(ApiError::Unauthorized)
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(user_id(req).map(AuthUser))
    }
}

impl FromRequest for AdminUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let result = user_id(req).and_then(|id| {
            let is_admin = req
                .headers()
                .get(USER_ROLE_HEADER)
                .and_then(|value| value.to_str().ok())
                .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE));

            if is_admin {
                Ok(AdminUser(id))
            } else {
                tracing::warn!(user_id = %id, path = req.path(), "Admin route refused");
                Err(ApiError::Forbidden)
            }
        });
        ready(result)
    }
}
