// Chunked JSON streaming utilities
use crate::application::render_state::RenderSnapshot;
use crate::infrastructure::http_response::brotli;
use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use axum::response::IntoResponse;
use bytes::{BufMut, Bytes, BytesMut};
use futures::stream::Stream;
use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

/// Stream every item as one length-prefixed JSON chunk.
pub fn chunked_json_stream<S, T>(stream: S, compress: bool) -> Result<Response<Body>, StatusCode>
where
    S: Stream<Item = T> + Send + 'static,
    T: Serialize + Send + 'static,
{
    let byte_stream = stream.then(move |msg| {
        let json = serde_json::to_vec(&msg);
        async move {
            match json {
                Ok(json) => frame_chunk(json, compress).await,
                Err(e) => Err(e.into()),
            }
        }
    });

    // Chunks are compressed one by one, so there is no Content-Encoding
    // header for the response as a whole.
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(Body::from_stream(byte_stream))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// 4-byte big-endian payload length followed by the payload.
async fn frame_chunk(json: Vec<u8>, compress: bool) -> Result<Bytes, std::io::Error> {
    let payload = if compress { brotli(json).await? } else { json };

    let length = u32::try_from(payload.len())
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidData, "chunk too large"))?;
    let mut chunk = BytesMut::with_capacity(4 + payload.len());
    chunk.put_u32(length);
    chunk.put_slice(&payload);

    Ok(chunk.freeze())
}

/// The current snapshot, then every later one until the session stops.
pub fn stream_snapshots(
    snapshots: watch::Receiver<Arc<RenderSnapshot>>,
    compress: bool,
) -> impl IntoResponse {
    match chunked_json_stream(WatchStream::new(snapshots), compress) {
        Ok(response) => response,
        Err(status) => status.into_response(),
    }
}
