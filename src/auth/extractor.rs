use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use futures_util::future::LocalBoxFuture;

use super::crypto::hash_token;
use crate::db::{with_conn, DbPool};
use crate::error::ApiError;
use crate::models::User;
use crate::query;

pub const TOKEN_PREFIX: &str = "Token ";

/// Extractor that validates the Authorization header and provides the
/// authenticated user. Rejects the request with 401 otherwise.
pub struct AuthUser {
    pub user: User,
    /// Digest of the presented key, so logout can revoke exactly this token.
    pub token_hash: String,
}

/// Like [`AuthUser`] but lets anonymous requests through. A header carrying
/// an unknown token is still rejected.
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<i32> {
        self.0.as_ref().map(|user| user.id)
    }
}

fn presented_token(req: &HttpRequest) -> Result<Option<String>, ApiError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| ApiError::Unauthenticated)?;
    value
        .strip_prefix(TOKEN_PREFIX)
        .map(|token| Some(token.trim().to_string()))
        .ok_or(ApiError::Unauthenticated)
}

async fn resolve(req: HttpRequest) -> Result<Option<AuthUser>, ApiError> {
    let Some(token) = presented_token(&req)? else {
        return Ok(None);
    };
    let pool = req
        .app_data::<web::Data<DbPool>>()
        .ok_or_else(|| ApiError::Internal("database pool is not registered".to_string()))?
        .clone();

    let token_hash = hash_token(&token);
    let lookup = token_hash.clone();
    let user = with_conn(&pool, move |conn| Ok(query::user_by_token(conn, &lookup)?)).await?;

    match user {
        Some(user) => Ok(Some(AuthUser { user, token_hash })),
        None => Err(ApiError::Unauthenticated),
    }
}

impl FromRequest for AuthUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { resolve(req).await?.ok_or(ApiError::Unauthenticated) })
    }
}

impl FromRequest for MaybeUser {
    type Error = ApiError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let req = req.clone();
        Box::pin(async move { Ok(MaybeUser(resolve(req).await?.map(|auth| auth.user))) })
    }
}
