//! Note analysis request payload.
//!
//! The user message always starts with the text part, followed by one image
//! part per uploaded file in upload order.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;

use crate::config::ModelConfig;
use crate::upload::UploadedFile;

/// Instruction used when images arrive without any text.
pub const DEFAULT_NOTES_TEXT: &str = "Please analyze these notes.";

/// Chat completion request sent for note analysis.
#[derive(Debug, Clone, Serialize)]
pub struct NotesRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<Message>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System { content: String },
    User { content: Vec<ContentPart> },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl NotesRequest {
    /// Build the request, or `None` when there is neither text nor an image.
    pub fn build(models: &ModelConfig, text: Option<&str>, images: &[UploadedFile]) -> Option<Self> {
        let text = text.map(str::trim).filter(|t| !t.is_empty());
        if text.is_none() && images.is_empty() {
            return None;
        }

        Some(Self {
            model: models.notes_model.clone(),
            max_tokens: models.notes_max_tokens,
            messages: vec![
                Message::System {
                    content: models.notes_system_prompt.clone(),
                },
                Message::User {
                    content: user_content(text.unwrap_or(DEFAULT_NOTES_TEXT), images),
                },
            ],
        })
    }
}

fn user_content(text: &str, images: &[UploadedFile]) -> Vec<ContentPart> {
    let mut parts = Vec::with_capacity(images.len() + 1);
    parts.push(ContentPart::Text {
        text: text.to_string(),
    });
    parts.extend(images.iter().map(|image| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: data_uri(image),
        },
    }));
    parts
}

/// Inline an image as `data:<mime>;base64,<payload>`.
pub fn data_uri(file: &UploadedFile) -> String {
    format!("data:{};base64,{}", file.content_type, STANDARD.encode(&file.data))
}
