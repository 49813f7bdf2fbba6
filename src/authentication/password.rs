use anyhow::Context;
use argon2::password_hash::SaltString;
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordHasher, PasswordVerifier, Version};
use sqlx::PgPool;

use crate::api::v1::entities::users;
use crate::errors::AppError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Hash verified when the e-mail is unknown, so both paths cost the same.
const FALLBACK_PASSWORD_HASH: &str = "$argon2id$v=19$m=15000,t=2,p=1$\
    gZiV/M1gPc22ElAH/Jh1Hw$\
    CWOrkoo7oJBQ/iyh7uJ0LO2aLEfrHwTWllSAxT0zRno";

pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials.")]
    InvalidCredentials(#[source] anyhow::Error),
    #[error(transparent)]
    UnexpectedError(#[from] anyhow::Error),
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials(e) => AppError::Authentication(e),
            AuthError::UnexpectedError(e) => AppError::Unexpected(e),
        }
    }
}

/// Returns the user id when the e-mail/password pair matches.
#[tracing::instrument(name = "Validate user credentials", skip(credentials, pool), fields(email = %credentials.email))]
pub async fn validate_credentials(credentials: &Credentials, pool: &PgPool) -> Result<String, AppError> {
    let mut user_id = None;
    let mut expected_password_hash = FALLBACK_PASSWORD_HASH.to_string();

    if let Some(user) = users::find_by_email(pool, &credentials.email).await? {
        user_id = Some(user.id);
        expected_password_hash = user.password_hash;
    } else {
        tracing::debug!("Unknown e-mail, verifying against fallback hash");
    }

    let password = credentials.password.clone();
    tokio::task::spawn_blocking(move || verify_password_hash(&expected_password_hash, &password))
        .await
        .context("Failed to spawn blocking task.")
        .map_err(AuthError::UnexpectedError)??;

    user_id.ok_or_else(|| {
        tracing::warn!("Credential validation failed - user not found");
        AuthError::InvalidCredentials(anyhow::anyhow!("Unknown e-mail.")).into()
    })
}

fn verify_password_hash(expected_password_hash: &str, password_candidate: &str) -> Result<(), AuthError> {
    let expected_password_hash = PasswordHash::new(expected_password_hash)
        .context("Failed to parse hash in PHC string format.")?;

    Argon2::default()
        .verify_password(password_candidate.as_bytes(), &expected_password_hash)
        .context("Invalid password.")
        .map_err(AuthError::InvalidCredentials)
}

#[tracing::instrument(name = "Compute password hash", skip(password))]
pub async fn compute_password_hash(password: String) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .context("Failed to spawn blocking task.")?
}

fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let params = Params::new(15000, 2, 1, None).map_err(|e| {
        AppError::Unexpected(anyhow::anyhow!("Failed to create Argon2 params: {}", e))
    })?;

    let password_hash = Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Unexpected(anyhow::anyhow!("Failed to hash password: {}", e)))?
        .to_string();

    Ok(password_hash)
}
