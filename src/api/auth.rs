use actix_web::{post, web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{generate_token, hash_token, verify_password, AuthUser};
use crate::db::{with_conn, DbPool};
use crate::error::{ApiError, FieldErrors};
use crate::query;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub auth_token: String,
}

fn invalid_credentials() -> ApiError {
    ApiError::Validation(FieldErrors::single(
        "non_field_errors",
        "Невозможно войти с предоставленными учетными данными.",
    ))
}

/// Exchanges email and password for a fresh API token.
#[post("/api/auth/token/login/")]
pub async fn login(
    pool: web::Data<DbPool>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let LoginRequest { email, password } = body.into_inner();
    let email = email.trim().to_string();

    let mut errors = FieldErrors::new();
    if email.is_empty() {
        errors.add("email", "Обязательное поле.");
    }
    if password.is_empty() {
        errors.add("password", "Обязательное поле.");
    }
    errors.into_result()?;

    let auth_token = with_conn(&pool, move |conn| {
        let user = query::user_by_email(conn, &email)?
            .filter(|user| verify_password(&password, &user.password_hash))
            .ok_or_else(invalid_credentials)?;
        let token = generate_token();
        query::create_token(conn, user.id, &hash_token(&token))?;
        log::info!("issued token for user {}", user.id);
        Ok(token)
    })
    .await?;

    Ok(HttpResponse::Ok().json(LoginResponse { auth_token }))
}

/// Revokes the token the request was authenticated with.
#[post("/api/auth/token/logout/")]
pub async fn logout(auth: AuthUser, pool: web::Data<DbPool>) -> Result<HttpResponse, ApiError> {
    let token_hash = auth.token_hash;
    with_conn(&pool, move |conn| Ok(query::delete_token(conn, &token_hash)?)).await?;
    Ok(HttpResponse::NoContent().finish())
}
