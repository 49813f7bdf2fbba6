use axum::Json;

use crate::catalog::{Avatar, Background, Voice, AVATARS, BACKGROUNDS, VOICES};

pub async fn list_avatars() -> Json<&'static [Avatar]> {
    Json(AVATARS)
}

pub async fn list_voices() -> Json<&'static [Voice]> {
    Json(VOICES)
}

pub async fn list_backgrounds() -> Json<&'static [Background]> {
    Json(BACKGROUNDS)
}
