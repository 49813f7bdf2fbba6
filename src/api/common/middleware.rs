use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use cookie::Cookie;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde_json::json;

use crate::api::v1::auth::Claims;
use crate::InnerState;

pub const AUTH_COOKIE: &str = "auth-token";

/// Rejects requests without a valid session with 401 and stores the decoded
/// [`Claims`] in request extensions.
pub async fn auth_middleware(
    State(inner): State<InnerState>,
    mut request: Request,
    next: Next,
) -> Response {
    match claims_from_headers(request.headers(), inner.settings.jwt_secret.expose_secret()) {
        Some(claims) => {
            tracing::Span::current().record("user_id", claims.user_id.as_str());
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "Unauthorized" })),
        )
            .into_response(),
    }
}

/// Decodes the session, if any. Invalid or expired tokens count as no session.
pub fn claims_from_headers(headers: &HeaderMap, secret: &str) -> Option<Claims> {
    let token = extract_token(headers)?;
    let validation = Validation::new(Algorithm::HS256);
    decode::<Claims>(&token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map_err(|e| {
            tracing::warn!("JWT validation failed: {:?}", e);
        })
        .ok()
        .map(|data| data.claims)
}

/// Extracts the JWT from either the `Authorization` header or the auth cookie.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        if let Ok(auth_str) = auth_header.to_str() {
            if let Some(token) = auth_str.strip_prefix("Bearer ") {
                return Some(token.to_string());
            }
        }
    }

    for cookie_header in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = cookie_header.to_str() {
            for cookie in cookie_str.split(';') {
                if let Ok(parsed) = Cookie::parse(cookie.trim()) {
                    if parsed.name() == AUTH_COOKIE {
                        return Some(parsed.value().to_string());
                    }
                }
            }
        }
    }

    None
}
