mod password;

pub use password::{compute_password_hash, validate_credentials, Credentials, MIN_PASSWORD_LENGTH};
