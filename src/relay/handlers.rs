//! Relay route handlers.

use std::sync::Arc;

use axum::{
    extract::{
        multipart::MultipartRejection, rejection::BytesRejection, Multipart, State,
    },
    http::HeaderMap,
    response::Response,
};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};

use crate::config::{ModelConfig, RelayConfig};
use crate::http::request::request_id;
use crate::http::response::{passthrough, RelayError};
use crate::relay::client::{UpstreamClient, UpstreamError};
use crate::relay::notes::NotesRequest;
use crate::relay::Operation;
use crate::upload::{intake, UploadError, UploadFilter};

/// Form field carrying the optional note text.
pub const NOTES_TEXT_FIELD: &str = "text";

/// State shared by the relay handlers.
#[derive(Clone)]
pub struct RelayState {
    pub client: UpstreamClient,
    pub models: Arc<ModelConfig>,
    pub images: Arc<UploadFilter>,
    pub audio: Arc<UploadFilter>,
}

impl RelayState {
    pub fn from_config(config: &RelayConfig) -> Result<Self, UpstreamError> {
        Ok(Self {
            client: UpstreamClient::new(&config.upstream, &config.timeouts)?,
            models: Arc::new(config.models.clone()),
            images: Arc::new(UploadFilter::from(&config.uploads.images)),
            audio: Arc::new(UploadFilter::from(&config.uploads.audio)),
        })
    }
}

/// `POST /api/openai`, `POST /api/openai/chat`: forward the JSON body verbatim.
pub async fn chat(
    State(state): State<RelayState>,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, RelayError> {
    let body = body?;
    serde_json::from_slice::<serde::de::IgnoredAny>(&body).map_err(RelayError::InvalidJson)?;

    tracing::info!(
        request_id = %request_id(&headers),
        size = body.len(),
        "Relaying chat completion"
    );

    let upstream = state
        .client
        .chat(Operation::Chat, body)
        .await
        .map_err(RelayError::upstream(Operation::Chat))?;
    Ok(passthrough(upstream))
}

/// `POST /api/openai/transcribe`: one audio file in, transcription JSON out.
pub async fn transcribe(
    State(state): State<RelayState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, RelayError> {
    let batch = intake(multipart?, &state.audio).await?;
    let file = batch.into_single_file(&state.audio)?;

    tracing::info!(
        request_id = %request_id(&headers),
        content_type = %file.content_type,
        size = file.data.len(),
        "Relaying transcription"
    );

    let file_name = file
        .file_name
        .clone()
        .unwrap_or_else(|| fallback_file_name(&file.content_type));
    let part = Part::bytes(file.data.to_vec())
        .file_name(file_name)
        .mime_str(&file.content_type)
        .map_err(|e| UploadError::Malformed(e.to_string()))?;
    let form = Form::new()
        .text("model", state.models.transcription_model.clone())
        .part("file", part);

    let upstream = state
        .client
        .transcribe(form)
        .await
        .map_err(RelayError::upstream(Operation::Transcription))?;
    Ok(passthrough(upstream))
}

/// `POST /api/openai/process-notes`: optional text plus images, analyzed in one completion.
pub async fn process_notes(
    State(state): State<RelayState>,
    headers: HeaderMap,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, RelayError> {
    let batch = intake(multipart?, &state.images).await?;
    let request = NotesRequest::build(&state.models, batch.text(NOTES_TEXT_FIELD), &batch.files)
        .ok_or(RelayError::EmptyNotes)?;

    tracing::info!(
        request_id = %request_id(&headers),
        images = batch.files.len(),
        image_bytes = batch.total_bytes(),
        "Relaying note analysis"
    );

    let upstream = state
        .client
        .chat_json(Operation::Notes, &request)
        .await
        .map_err(RelayError::upstream(Operation::Notes))?;
    Ok(passthrough(upstream))
}

/// File name for an upload that arrived without one. The transcription API
/// infers the audio format from the extension.
fn fallback_file_name(content_type: &str) -> String {
    let extension = match content_type {
        "audio/mpeg" => "mp3",
        "audio/mp4" => "mp4",
        "audio/wav" => "wav",
        "audio/webm" => "webm",
        "audio/m4a" => "m4a",
        other => other.rsplit('/').next().unwrap_or("bin"),
    };
    format!("audio.{extension}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_file_name() {
        assert_eq!(fallback_file_name("audio/mpeg"), "audio.mp3");
        assert_eq!(fallback_file_name("audio/wav"), "audio.wav");
        assert_eq!(fallback_file_name("audio/ogg"), "audio.ogg");
    }
}
