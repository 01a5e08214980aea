//! Input capabilities behind traits: decoding uploaded images and turning
//! recorded speech into text.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::llm::{ChatModel, GenerationRequest, InlineData, ModelError};
use crate::prompts::Prompts;

lazy_static! {
    static ref DATA_URL: Regex =
        Regex::new(r"(?s)^data:(?P<mime>[\w.+-]+/[\w.+-]+)?(?P<params>(;[^;,]*)*?),(?P<payload>.*)$")
            .expect("data URL pattern is valid");
}

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// Image types the model accepts inline.
const SUPPORTED_IMAGE_MIMES: &[&str] = &[
    "image/png",
    "image/jpeg",
    "image/gif",
    "image/webp",
    "image/heic",
    "image/heif",
];

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Please upload an image file")]
    NotAnImage,

    #[error("Unsupported image format: {0}. Please use PNG, JPEG, GIF or WebP.")]
    UnsupportedImage(String),

    #[error("Image too large. Please choose an image under {limit_mb}MB.")]
    TooLarge { limit_mb: usize },

    #[error("Invalid image data: {0}")]
    InvalidEncoding(#[from] base64::DecodeError),

    #[error("Unsupported audio format: {0}")]
    UnsupportedAudio(String),

    #[error("No speech detected. Please try again and speak clearly.")]
    NoSpeech,

    #[error(transparent)]
    Model(#[from] ModelError),
}

pub trait ImageDecoder: Send + Sync {
    /// Returns the MIME type and raw payload of an uploaded image.
    fn decode(&self, bytes: &[u8]) -> Result<InlineData, CaptureError>;
}

#[async_trait]
pub trait AudioTranscriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, CaptureError>;
}

/// Decodes `data:` URLs as produced by a browser `FileReader`, or bare base64.
pub struct DataUrlDecoder {
    max_bytes: usize,
}

impl DataUrlDecoder {
    pub fn new(max_bytes: usize) -> Self {
        DataUrlDecoder { max_bytes }
    }

    fn check_size(&self, len: usize) -> Result<(), CaptureError> {
        if len > self.max_bytes {
            return Err(CaptureError::TooLarge {
                limit_mb: (self.max_bytes / (1024 * 1024)).max(1),
            });
        }
        Ok(())
    }
}

impl ImageDecoder for DataUrlDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<InlineData, CaptureError> {
        let text = String::from_utf8_lossy(bytes);
        let text = text.trim();

        let (declared_mime, payload) = match DATA_URL.captures(text) {
            Some(caps) => {
                if !caps["params"].contains(";base64") {
                    return Err(CaptureError::NotAnImage);
                }
                (
                    caps.name("mime").map(|m| m.as_str().to_ascii_lowercase()),
                    caps.name("payload").map(|p| p.as_str()).unwrap_or_default(),
                )
            }
            None => (None, text),
        };

        // Base64 inflates by 4/3, so an oversized payload can be rejected before decoding.
        self.check_size(payload.len() / 4 * 3)?;
        let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = STANDARD.decode(compact)?;
        self.check_size(data.len())?;

        let mime_type = match declared_mime {
            Some(mime) if mime == "image/jpg" => "image/jpeg".to_string(),
            Some(mime) => mime,
            None => sniff_image_mime(&data).unwrap_or(DEFAULT_IMAGE_MIME).to_string(),
        };
        if !mime_type.starts_with("image/") {
            return Err(CaptureError::NotAnImage);
        }
        if !SUPPORTED_IMAGE_MIMES.contains(&mime_type.as_str()) {
            return Err(CaptureError::UnsupportedImage(mime_type));
        }

        Ok(InlineData { mime_type, data })
    }
}

fn sniff_image_mime(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(&[0x89, b'P', b'N', b'G']) {
        Some("image/png")
    } else if data.starts_with(&[0xff, 0xd8, 0xff]) {
        Some("image/jpeg")
    } else if data.starts_with(b"GIF8") {
        Some("image/gif")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

/// Transcribes speech by handing the clip to the chat model as inline audio.
pub struct ModelTranscriber {
    model: Arc<dyn ChatModel>,
}

impl ModelTranscriber {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        ModelTranscriber { model }
    }
}

#[async_trait]
impl AudioTranscriber for ModelTranscriber {
    async fn transcribe(&self, audio: &[u8], mime_type: &str) -> Result<String, CaptureError> {
        let mime_type = mime_type.trim().to_ascii_lowercase();
        if !mime_type.starts_with("audio/") {
            return Err(CaptureError::UnsupportedAudio(mime_type));
        }

        let request = GenerationRequest {
            system_prompt: None,
            history: vec![],
            message: Prompts::TRANSCRIBE_AUDIO.to_string(),
            attachment: Some(InlineData {
                mime_type,
                data: audio.to_vec(),
            }),
        };
        let transcript = match self.model.generate(&request).await {
            Ok(text) => text.trim().to_string(),
            Err(ModelError::Empty) => String::new(),
            Err(e) => return Err(e.into()),
        };
        if transcript.is_empty() {
            return Err(CaptureError::NoSpeech);
        }
        Ok(transcript)
    }
}
