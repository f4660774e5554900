// HTTP response utilities for JSON with optional Brotli encoding
use async_compression::tokio::bufread::BrotliEncoder;
use axum::{
    body::Body,
    http::{header, HeaderMap, Response, StatusCode},
};
use serde::Serialize;
use tokio::io::AsyncReadExt;

/// Whether the client listed `br` in `accept-encoding`.
pub fn accepts_brotli(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.contains("br"))
        .unwrap_or(false)
}

pub async fn brotli(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    let mut encoder = BrotliEncoder::new(std::io::Cursor::new(bytes));
    let mut compressed = Vec::new();
    encoder.read_to_end(&mut compressed).await?;
    Ok(compressed)
}

/// Serialize `data` to JSON, compressed with Brotli when `compress` is set.
pub async fn json_response<T: Serialize>(
    data: &T,
    compress: bool,
) -> Result<Response<Body>, StatusCode> {
    let json = serde_json::to_vec(data).map_err(|e| {
        tracing::error!("JSON serialization error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let (body, content_encoding) = if compress {
        let uncompressed = json.len();
        let compressed = brotli(json).await.map_err(|e| {
            tracing::error!("Brotli compression error: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;
        tracing::debug!(uncompressed, compressed = compressed.len(), "Compressed response");
        (compressed, Some("br"))
    } else {
        (json, None)
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len());

    if let Some(encoding) = content_encoding {
        builder = builder.header(header::CONTENT_ENCODING, encoding);
    }

    builder.body(Body::from(body)).map_err(|e| {
        tracing::error!("Response build error: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
