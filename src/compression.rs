//! Per-response compression decision for `tower_http::compression`.

use axum::body::HttpBody;
use axum::extract::Request;
use axum::http::{header, Response};
use axum::middleware::Next;
use tower_http::compression::Predicate;

pub const NO_COMPRESSION_HEADER: &str = "x-no-compression";

/// Response extension marking that the caller asked for an identity body.
#[derive(Debug, Clone, Copy)]
pub struct CompressionOptOut;

#[derive(Debug, Clone, Copy)]
pub struct CompressionPolicy {
    min_bytes: u64,
}

impl CompressionPolicy {
    pub fn new(min_bytes: u64) -> Self {
        Self { min_bytes }
    }
}

impl Default for CompressionPolicy {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_COMPRESSION_MIN_BYTES)
    }
}

impl Predicate for CompressionPolicy {
    fn should_compress<B>(&self, response: &Response<B>) -> bool
    where
        B: HttpBody,
    {
        let headers = response.headers();
        let content_type = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());
        let size = response.body().size_hint().exact().or_else(|| {
            headers
                .get(header::CONTENT_LENGTH)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
        });

        should_compress(
            content_type,
            size,
            self.min_bytes,
            response.extensions().get::<CompressionOptOut>().is_some(),
            headers.contains_key(header::CONTENT_ENCODING),
        )
    }
}

/// Compress structured/text bodies above the size floor unless the caller
/// opted out or the body is already encoded. Unknown sizes are compressed.
pub fn should_compress(
    content_type: Option<&str>,
    size: Option<u64>,
    min_bytes: u64,
    opted_out: bool,
    already_encoded: bool,
) -> bool {
    if opted_out || already_encoded {
        return false;
    }

    let Some(content_type) = content_type else {
        return false;
    };
    if !is_compressible(content_type) {
        return false;
    }

    size.map_or(true, |size| size > min_bytes)
}

/// Lowercased media type with any parameters stripped.
pub(crate) fn mime_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_compressible(content_type: &str) -> bool {
    let essence = mime_essence(content_type);

    essence.starts_with("text/")
        || essence == "application/json"
        || essence.ends_with("+json")
        || essence == "application/javascript"
        || essence == "application/xml"
        || essence.ends_with("+xml")
}

/// Carries the request's opt-out header over to the response, where the
/// compression predicate can see it.
pub async fn compression_opt_out_middleware(request: Request, next: Next) -> axum::response::Response {
    let opted_out = request.headers().contains_key(NO_COMPRESSION_HEADER);
    let mut response = next.run(request).await;

    if opted_out {
        response.extensions_mut().insert(CompressionOptOut);
    }

    response
}
