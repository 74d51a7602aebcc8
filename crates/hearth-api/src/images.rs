use axum::body::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use sha2::{Digest, Sha256};

use crate::error::ApiError;

/// 5 MB per image, after base64 decoding.
pub const MAX_IMAGE_SIZE: usize = 5 * 1024 * 1024;

pub const MAX_IMAGES_PER_NOTE: usize = 10;

/// Avatars are stored no larger than this on either side.
pub const AVATAR_MAX_SIDE: u32 = 400;

const AVATAR_JPEG_QUALITY: u8 = 80;

/// File extension for the image types we accept.
pub fn extension_for(content_type: &str) -> Option<&'static str> {
    let essence = content_type.split(';').next().unwrap_or("").trim();
    match essence.to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        _ => None,
    }
}

/// Check an upload and return the extension its key should use.
pub fn check_image(content_type: &str, data: &[u8]) -> Result<&'static str, ApiError> {
    let ext = extension_for(content_type).ok_or_else(|| {
        ApiError::validation("Images must be JPEG, PNG, GIF or WebP")
    })?;
    if data.is_empty() {
        return Err(ApiError::validation("Image is empty"));
    }
    if data.len() > MAX_IMAGE_SIZE {
        return Err(ApiError::PayloadTooLarge("Images must be 5 MB or smaller".into()));
    }
    Ok(ext)
}

/// Re-encode an avatar as JPEG, scaled down to fit a 400x400 box with its
/// aspect ratio kept. Images already inside the box keep their dimensions.
pub fn shrink_avatar(data: &[u8]) -> Result<Vec<u8>, ApiError> {
    let img = image::load_from_memory(data)
        .map_err(|_| ApiError::validation("Image could not be read"))?;
    let (width, height) = img.dimensions();
    let img = if width > AVATAR_MAX_SIDE || height > AVATAR_MAX_SIDE {
        img.resize(AVATAR_MAX_SIDE, AVATAR_MAX_SIDE, FilterType::Triangle)
    } else {
        img
    };

    let mut out = Vec::new();
    DynamicImage::ImageRgb8(img.to_rgb8())
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, AVATAR_JPEG_QUALITY))
        .map_err(|e| anyhow::anyhow!("avatar encoding failed: {}", e))?;
    Ok(out)
}

/// Check an uploaded avatar and shrink it off the async runtime.
pub async fn prepare_avatar(content_type: &str, body: Bytes) -> Result<Vec<u8>, ApiError> {
    check_image(content_type, &body)?;
    tokio::task::spawn_blocking(move || shrink_avatar(&body))
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e)))?
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}
