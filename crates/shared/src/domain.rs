use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(ImageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Error,
}

/// An image staged by the user or attached to a sent turn.
///
/// Identity is the [`ImageId`]; two attachments with identical bytes are
/// still distinct handles. The payload is shared, so clones are cheap.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub id: ImageId,
    pub mime_type: String,
    pub label: String,
    bytes: Arc<[u8]>,
}

impl ImageAttachment {
    pub fn new(mime_type: impl Into<String>, label: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: ImageId::new(),
            mime_type: mime_type.into(),
            label: label.into(),
            bytes: bytes.into(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("id", &self.id)
            .field("mime_type", &self.mime_type)
            .field("label", &self.label)
            .field("size_bytes", &self.bytes.len())
            .finish()
    }
}

/// One chat entry. Fields are private so a turn cannot change after it is
/// built; the in-progress assistant turn is replaced, never edited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    role: Role,
    text: String,
    images: Vec<ImageAttachment>,
    created_at: DateTime<Utc>,
}

impl Turn {
    pub fn user(text: impl Into<String>, images: Vec<ImageAttachment>) -> Self {
        Self::with_role(Role::User, text.into(), images)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::with_role(Role::Assistant, text.into(), Vec::new())
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self::with_role(Role::Error, text.into(), Vec::new())
    }

    fn with_role(role: Role, text: String, images: Vec<ImageAttachment>) -> Self {
        Self {
            role,
            text,
            images,
            created_at: Utc::now(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn images(&self) -> &[ImageAttachment] {
        &self.images
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}
