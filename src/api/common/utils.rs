use cookie::{Cookie, SameSite};
use time::OffsetDateTime;
use tower_cookies::Cookies;

use crate::api::common::middleware::AUTH_COOKIE;
use crate::errors::AppError;

/// Session cookies live as long as the JWT inside them.
pub const SESSION_DAYS: i64 = 90;

pub fn setup_auth_cookie(token: &str, is_development: bool, cookies: &Cookies) {
    let mut cookie = Cookie::new(AUTH_COOKIE, token.to_string());

    // Plain-HTTP localhost can't carry secure cookies.
    cookie.set_secure(!is_development);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path("/");
    cookie.set_expires(OffsetDateTime::now_utc() + time::Duration::days(SESSION_DAYS));
    cookie.set_http_only(true);
    cookies.add(cookie);
}

pub fn remove_auth_cookie(cookies: &Cookies) {
    let mut cookie = Cookie::from(AUTH_COOKIE);
    cookie.set_path("/");
    cookie.make_removal();
    cookies.remove(cookie);
}

pub async fn timeout_query<T, F>(duration: std::time::Duration, fut: F) -> Result<T, AppError>
where
    F: std::future::Future<Output = Result<T, AppError>>,
{
    tokio::time::timeout(duration, fut).await?
}
