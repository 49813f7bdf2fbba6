use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_cookies::Cookies;
use uuid::Uuid;

use crate::api::common::utils::{remove_auth_cookie, setup_auth_cookie, SESSION_DAYS};
use crate::api::common::ApiResponse;
use crate::api::v1::entities::users;
use crate::authentication::{compute_password_hash, validate_credentials, Credentials, MIN_PASSWORD_LENGTH};
use crate::errors::AppError;
use crate::InnerState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub user_id: String,
    pub exp: usize,
}

#[derive(Deserialize)]
pub struct AuthForm {
    email: String,
    password: String,
}

#[derive(Debug, Serialize)]
pub struct Me {
    pub id: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

pub fn encode_token(email: &str, user_id: &str, secret: &str) -> Result<String, AppError> {
    let claims = Claims {
        sub: email.to_owned(),
        user_id: user_id.to_owned(),
        exp: (Utc::now() + chrono::Duration::days(SESSION_DAYS)).timestamp() as usize,
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Unexpected(anyhow::Error::new(e).context("Failed to encode JWT token")))
}

fn normalise_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[tracing::instrument(name = "User signup", skip(cookies, inner, form), fields(email = %form.email))]
pub async fn signup(
    cookies: Cookies,
    State(inner): State<InnerState>,
    Json(form): Json<AuthForm>,
) -> Result<Json<Value>, AppError> {
    let email = normalise_email(&form.email);
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("A valid e-mail is required".to_string()));
    }
    if form.password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        )));
    }

    let password_hash = compute_password_hash(form.password).await?;
    let user_id = Uuid::new_v4().to_string();
    let user = users::insert(&inner.db, &user_id, &email, &password_hash).await?;

    let token = encode_token(&user.email, &user.id, inner.settings.jwt_secret.expose_secret())?;
    setup_auth_cookie(&token, inner.settings.is_development(), &cookies);

    tracing::info!(user_id = %user.id, "User signed up");
    Ok(Json(json!({ "data": "signup completed", "user_id": user.id })))
}

#[tracing::instrument(name = "User login", skip(cookies, inner, form), fields(email = %form.email))]
pub async fn login(
    cookies: Cookies,
    State(inner): State<InnerState>,
    Json(form): Json<AuthForm>,
) -> Result<Json<Value>, AppError> {
    let credentials = Credentials {
        email: normalise_email(&form.email),
        password: form.password,
    };

    let user_id = validate_credentials(&credentials, &inner.db).await?;
    let token = encode_token(&credentials.email, &user_id, inner.settings.jwt_secret.expose_secret())?;
    setup_auth_cookie(&token, inner.settings.is_development(), &cookies);

    tracing::info!(user_id = %user_id, "Login completed");
    Ok(Json(json!({ "data": "login completed" })))
}

#[tracing::instrument(name = "User logout", skip(cookies))]
pub async fn logout(cookies: Cookies) -> Json<Value> {
    remove_auth_cookie(&cookies);
    Json(json!({ "data": "logout completed" }))
}

#[tracing::instrument(name = "Get current user", skip(inner, claims), fields(user_id = %claims.user_id))]
pub async fn me(
    State(inner): State<InnerState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ApiResponse<Me>>, AppError> {
    let user = users::find_by_id(&inner.db, &claims.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiResponse::success(Me {
        id: user.id,
        email: user.email,
        created_at: user.created_at,
    })))
}
