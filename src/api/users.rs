use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};

use super::{followed_by_viewer, media_field_error, UserRead};
use crate::auth::{hash_password, verify_password, AuthUser, MaybeUser};
use crate::config::Config;
use crate::db::{with_conn, DbPool};
use crate::error::{ApiError, FieldErrors, StoreError};
use crate::media::{self, DataImage};
use crate::models::NewUser;
use crate::pagination::{PageParams, Pagination};
use crate::query;

const NAME_MAX_LEN: usize = 150;
const EMAIL_MAX_LEN: usize = 254;
const PASSWORD_MIN_LEN: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct RegisteredUser {
    pub email: String,
    pub id: i32,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
}

fn is_valid_username(username: &str) -> bool {
    !username.is_empty()
        && username
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'))
}

fn is_valid_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

/// Problems with a candidate password; empty when it is acceptable.
pub(crate) fn password_problems(password: &str) -> Vec<String> {
    let mut problems = Vec::new();
    if password.chars().count() < PASSWORD_MIN_LEN {
        problems.push(format!(
            "Введённый пароль слишком короткий. Он должен содержать как минимум {PASSWORD_MIN_LEN} символов."
        ));
    }
    if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
        problems.push("Введённый пароль состоит только из цифр.".to_string());
    }
    problems
}

fn validate_registration(req: &RegisterRequest) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if req.email.is_empty() {
        errors.add("email", "Обязательное поле.");
    } else if req.email.chars().count() > EMAIL_MAX_LEN || !is_valid_email(&req.email) {
        errors.add("email", "Введите правильный адрес электронной почты.");
    }

    if req.username.is_empty() {
        errors.add("username", "Обязательное поле.");
    } else if req.username.chars().count() > NAME_MAX_LEN {
        errors.add(
            "username",
            "Имя пользователя должно быть не более 150 символов",
        );
    } else if !is_valid_username(&req.username) {
        errors.add(
            "username",
            "Имя пользователя может содержать буквы, цифры и символы @/./+/-/_",
        );
    }

    for (field, value) in [("first_name", &req.first_name), ("last_name", &req.last_name)] {
        if value.trim().is_empty() {
            errors.add(field, "Обязательное поле.");
        } else if value.chars().count() > NAME_MAX_LEN {
            errors.add(field, "Убедитесь, что это значение содержит не более 150 символов.");
        }
    }

    if req.password.is_empty() {
        errors.add("password", "Обязательное поле.");
    } else {
        for problem in password_problems(&req.password) {
            errors.add("password", problem);
        }
    }

    errors
}

#[post("/api/users/")]
pub async fn register(
    pool: web::Data<DbPool>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    let mut req = body.into_inner();
    req.email = req.email.trim().to_string();
    req.username = req.username.trim().to_string();
    validate_registration(&req).into_result()?;

    let user = with_conn(&pool, move |conn| {
        let mut errors = FieldErrors::new();
        if query::email_taken(conn, &req.email)? {
            errors.add("email", "Пользователь с таким email уже существует.");
        }
        if query::username_taken(conn, &req.username)? {
            errors.add("username", "Пользователь с таким именем уже существует");
        }
        errors.into_result()?;

        let password_hash = hash_password(&req.password)
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;
        let new_user = NewUser {
            email: &req.email,
            username: &req.username,
            first_name: &req.first_name,
            last_name: &req.last_name,
            password_hash: &password_hash,
        };
        query::create_user(conn, &new_user).map_err(|err| match err {
            StoreError::Duplicate => ApiError::Duplicate(
                "Пользователь с таким email или именем уже существует".to_string(),
            ),
            other => other.into(),
        })
    })
    .await?;

    log::info!("registered user {} ({})", user.id, user.username);
    Ok(HttpResponse::Created().json(RegisteredUser {
        email: user.email,
        id: user.id,
        username: user.username,
        first_name: user.first_name,
        last_name: user.last_name,
    }))
}

#[get("/api/users/")]
pub async fn list_users(
    req: HttpRequest,
    viewer: MaybeUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    params: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let pagination = Pagination::from_params(&params)?;
    let viewer = viewer.id();

    let (count, users, followed) = with_conn(&pool, move |conn| {
        let (count, users) = query::list_users(conn, pagination.offset(), pagination.limit())?;
        pagination.check(count)?;
        let ids: Vec<i32> = users.iter().map(|user| user.id).collect();
        let followed = followed_by_viewer(conn, viewer, &ids)?;
        Ok((count, users, followed))
    })
    .await?;

    let results = users
        .iter()
        .map(|user| UserRead::new(user, followed.contains(&user.id), &config))
        .collect();
    Ok(HttpResponse::Ok().json(pagination.into_page(&req, count, results)))
}

#[get("/api/users/{id:\\d+}/")]
pub async fn get_user(
    path: web::Path<i32>,
    viewer: MaybeUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let user_id = path.into_inner();
    let viewer = viewer.id();

    let (user, followed) = with_conn(&pool, move |conn| {
        let user = query::user_by_id(conn, user_id)?;
        let followed = followed_by_viewer(conn, viewer, &[user.id])?;
        Ok((user, followed))
    })
    .await?;

    Ok(HttpResponse::Ok().json(UserRead::new(&user, followed.contains(&user.id), &config)))
}

#[get("/api/users/me/")]
pub async fn me(auth: AuthUser, config: web::Data<Config>) -> HttpResponse {
    HttpResponse::Ok().json(UserRead::new(&auth.user, false, &config))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SetPasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[post("/api/users/set_password/")]
pub async fn set_password(
    auth: AuthUser,
    pool: web::Data<DbPool>,
    body: web::Json<SetPasswordRequest>,
) -> Result<HttpResponse, ApiError> {
    let SetPasswordRequest {
        current_password,
        new_password,
    } = body.into_inner();
    if current_password.is_empty() || new_password.is_empty() {
        return Err(ApiError::BadRequest(
            "Both 'current_password' and 'new_password' are required.".to_string(),
        ));
    }

    let user = auth.user;
    with_conn(&pool, move |conn| {
        if !verify_password(&current_password, &user.password_hash) {
            return Err(ApiError::Validation(FieldErrors::single(
                "current_password",
                "Wrong password.",
            )));
        }
        let mut errors = FieldErrors::new();
        for problem in password_problems(&new_password) {
            errors.add("new_password", problem);
        }
        if current_password == new_password {
            errors.add(
                "new_password",
                "New password must be different from current password.",
            );
        }
        errors.into_result()?;

        let password_hash = hash_password(&new_password)
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {e}")))?;
        query::set_password_hash(conn, user.id, &password_hash)?;
        Ok(())
    })
    .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AvatarRequest {
    pub avatar: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AvatarResponse {
    pub avatar: String,
}

#[put("/api/users/me/avatar/")]
pub async fn put_avatar(
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
    body: web::Json<AvatarRequest>,
) -> Result<HttpResponse, ApiError> {
    let data_url = body
        .into_inner()
        .avatar
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(FieldErrors::single("avatar", "This field is required.")))?;
    let image = DataImage::parse(&data_url).map_err(|e| media_field_error("avatar", e))?;

    let user = auth.user;
    let media_root = config.media_root.clone();
    let stored = with_conn(&pool, move |conn| {
        let stored = media::store(&media_root, media::AVATARS, &image)
            .map_err(|e| media_field_error("avatar", e))?;
        query::set_avatar(conn, user.id, Some(&stored))?;
        if let Some(previous) = user.avatar.as_deref() {
            media::remove(&media_root, previous);
        }
        Ok(stored)
    })
    .await?;

    Ok(HttpResponse::Ok().json(AvatarResponse {
        avatar: config.media_url(&stored),
    }))
}

#[delete("/api/users/me/avatar/")]
pub async fn delete_avatar(
    auth: AuthUser,
    pool: web::Data<DbPool>,
    config: web::Data<Config>,
) -> Result<HttpResponse, ApiError> {
    let user = auth.user;
    let Some(previous) = user.avatar.clone() else {
        return Err(ApiError::BadRequest("Аватар не найден.".to_string()));
    };

    let media_root = config.media_root.clone();
    with_conn(&pool, move |conn| {
        query::set_avatar(conn, user.id, None)?;
        media::remove(&media_root, &previous);
        Ok(())
    })
    .await?;

    Ok(HttpResponse::NoContent().finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegisterRequest {
        RegisterRequest {
            email: "cook@example.com".into(),
            username: "cook.42".into(),
            first_name: "Анна".into(),
            last_name: "Иванова".into(),
            password: "correct-horse".into(),
        }
    }

    #[test]
    fn accepts_well_formed_registration() {
        assert!(validate_registration(&valid()).is_empty());
    }

    #[test]
    fn reports_each_bad_field() {
        let req = RegisterRequest {
            email: "not-an-email".into(),
            username: "bad name!".into(),
            first_name: " ".into(),
            last_name: "x".repeat(151),
            password: "1234".into(),
        };
        let errors = validate_registration(&req);
        for field in ["email", "username", "first_name", "last_name"] {
            assert_eq!(errors.get(field).map(<[String]>::len), Some(1), "{field}");
        }
        // too short and numeric-only
        assert_eq!(errors.get("password").map(<[String]>::len), Some(2));
    }

    #[test]
    fn username_allows_unicode_word_characters() {
        assert!(is_valid_username("повар_1"));
        assert!(is_valid_username("a.b@c+d-e"));
        assert!(!is_valid_username("with space"));
        assert!(!is_valid_username(""));
    }

    #[test]
    fn email_shape_checks() {
        assert!(is_valid_email("a@b.ru"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("@b.ru"));
        assert!(!is_valid_email("a@b@c.ru"));
        assert!(!is_valid_email("a b@c.ru"));
    }
}
