//! Stateless helpers for HTTP request processing.

use http_body_util::BodyExt;

use crate::api::error::ApiError;

/// Parses and validates a Content-Type header for `application/json`.
/// Charset parameters are accepted; other media types are rejected.
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime, ApiError> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        ApiError::InvalidPayload(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(ApiError::InvalidPayload(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}

/// Collects the request body, enforcing the configured size limit.
/// Decompression is already handled by the middleware layer.
pub async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    if data.len() > max_size {
        return Err(ApiError::PayloadTooLarge(data.len()));
    }

    Ok(data)
}
