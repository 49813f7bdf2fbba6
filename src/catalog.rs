//! Avatars, voices and backgrounds offered by the generation provider.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Avatar {
    pub id: &'static str,
    pub name: &'static str,
    pub preview: &'static str,
    pub has_default_voice: bool,
    pub has_default_background: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct Voice {
    pub id: &'static str,
    pub name: &'static str,
    pub language: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    Color,
    Image,
    Video,
}

#[derive(Debug, Clone, Serialize)]
pub struct Background {
    #[serde(rename = "type")]
    pub kind: BackgroundKind,
    pub value: &'static str,
    pub name: &'static str,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvatarStyle {
    #[default]
    Normal,
    Happy,
    Sad,
    Angry,
}

pub const AVATARS: &[Avatar] = &[
    Avatar {
        id: "Daisy-inskirt-20220818",
        name: "Daisy",
        preview: "👩",
        has_default_voice: false,
        has_default_background: false,
    },
    Avatar {
        id: "4906bbce5e1a49d9936a59403c2c8efe",
        name: "Brody",
        preview: "👨‍💼",
        has_default_voice: true,
        has_default_background: true,
    },
];

pub const VOICES: &[Voice] = &[Voice {
    id: "2d5b0e6cf36f460aa7fc47e3eee4ba54",
    name: "Daisy (English)",
    language: "English",
}];

pub const BACKGROUNDS: &[Background] = &[
    Background {
        kind: BackgroundKind::Color,
        value: "#FFFFFF",
        name: "White",
    },
    Background {
        kind: BackgroundKind::Color,
        value: "#008000",
        name: "Green Screen",
    },
    Background {
        kind: BackgroundKind::Color,
        value: "#000000",
        name: "Black",
    },
];

/// Green screen.
pub const DEFAULT_BACKGROUND: &Background = &BACKGROUNDS[1];

pub fn find_avatar(id: &str) -> Option<&'static Avatar> {
    AVATARS.iter().find(|a| a.id == id)
}

pub fn find_voice(id: &str) -> Option<&'static Voice> {
    VOICES.iter().find(|v| v.id == id)
}

pub fn default_avatar() -> &'static Avatar {
    &AVATARS[0]
}

pub fn default_voice() -> &'static Voice {
    &VOICES[0]
}
