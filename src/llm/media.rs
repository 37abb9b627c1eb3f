use std::time::Duration;

use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use tracing::{error, warn};

use crate::llm::types::InlineData;
use crate::utils::http::get_http_client;

const MEDIA_DOWNLOAD_MAX_ATTEMPTS: usize = 3;
const MEDIA_DOWNLOAD_BASE_DELAY_MS: u64 = 400;
const MEDIA_DOWNLOAD_ERROR_BODY_LIMIT: usize = 800;
const FALLBACK_IMAGE_MIME: &str = "image/png";

/// An image picked by the user, kept as raw bytes until submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub display_name: Option<String>,
}

impl MediaFile {
    pub fn new(bytes: Vec<u8>, mime_type: Option<String>, display_name: Option<String>) -> Self {
        let mime_type = resolve_image_mime(&bytes, mime_type.as_deref());
        Self {
            bytes,
            mime_type,
            display_name,
        }
    }
}

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn normalize_mime_type(mime_type: &str) -> String {
    let lowered = mime_type.trim().to_ascii_lowercase();
    match lowered.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        "image/x-png" => "image/png".to_string(),
        _ => lowered,
    }
}

/// Declared type wins when it is an image type; otherwise sniff the bytes.
fn resolve_image_mime(bytes: &[u8], declared: Option<&str>) -> String {
    if let Some(declared) = declared {
        let normalized = normalize_mime_type(declared);
        if normalized.starts_with("image/") {
            return normalized;
        }
    }
    detect_mime_type(bytes)
        .map(|detected| normalize_mime_type(&detected))
        .unwrap_or_else(|| FALLBACK_IMAGE_MIME.to_string())
}

pub fn encode_inline(file: &MediaFile) -> InlineData {
    InlineData {
        mime_type: file.mime_type.clone(),
        data: general_purpose::STANDARD.encode(&file.bytes),
    }
}

pub fn to_data_uri(file: &MediaFile) -> String {
    encode_inline(file).to_data_uri()
}

/// Splits `data:<mime>;base64,<payload>` back into mime type and bytes.
pub fn decode_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    let rest = uri.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime_type = header.strip_suffix(";base64")?;
    let bytes = general_purpose::STANDARD.decode(payload.trim()).ok()?;
    Some((mime_type.to_string(), bytes))
}

pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "image/jpeg" => "jpg",
        "image/webp" => "webp",
        "image/heic" | "image/heif" => "heic",
        "image/gif" => "gif",
        _ => "png",
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// One download attempt. The error flag says whether another attempt is worthwhile.
async fn fetch_once(url: &str) -> Result<Vec<u8>, bool> {
    let response = get_http_client().get(url).send().await.map_err(|err| {
        let timeout = err.is_timeout();
        let connect = err.is_connect();
        // The URL carries the bot token.
        warn!(timeout, connect, "Failed to fetch media: {}", err.without_url());
        timeout || connect
    })?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        warn!(
            %status,
            "Media download failed: {}",
            truncate_for_log(&body, MEDIA_DOWNLOAD_ERROR_BODY_LIMIT)
        );
        return Err(retryable_status(status));
    }

    match response.bytes().await {
        Ok(bytes) => Ok(bytes.to_vec()),
        Err(err) => {
            error!("Failed to read media bytes: {}", err.without_url());
            Err(true)
        }
    }
}

/// Downloads a Telegram file with exponential backoff between attempts.
pub async fn download_media(url: &str) -> Option<Vec<u8>> {
    for attempt in 0..MEDIA_DOWNLOAD_MAX_ATTEMPTS {
        match fetch_once(url).await {
            Ok(bytes) => return Some(bytes),
            Err(retryable) => {
                if !retryable || attempt + 1 == MEDIA_DOWNLOAD_MAX_ATTEMPTS {
                    warn!(attempts = attempt + 1, "Giving up on media download");
                    return None;
                }
                let delay = Duration::from_millis(MEDIA_DOWNLOAD_BASE_DELAY_MS << attempt);
                tokio::time::sleep(delay).await;
            }
        }
    }
    None
}
