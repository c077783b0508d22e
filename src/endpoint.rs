use axum::extract::{MatchedPath, Request};
use axum::http::Method;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::LazyLock;

static UUID_SEGMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$")
        .expect("uuid pattern is valid")
});
static OBJECT_ID_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9a-fA-F]{24}$").expect("object id pattern is valid"));
static NUMERIC_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("numeric pattern is valid"));

/// Statistical bucket for telemetry: HTTP method plus route template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EndpointKey {
    method: String,
    route: String,
}

impl EndpointKey {
    pub fn new(method: &Method, route: impl Into<String>) -> Self {
        Self {
            method: method.as_str().to_string(),
            route: route.into(),
        }
    }

    /// Resolve the key for a request. The router's matched template is used
    /// when available; otherwise identifier-looking path segments are folded
    /// into `:id` so that `/lessons/17` and `/lessons/18` share a bucket.
    pub fn from_request(request: &Request) -> Self {
        let route = match request.extensions().get::<MatchedPath>() {
            Some(matched) => matched.as_str().to_string(),
            None => normalize_path(request.uri().path()),
        };

        Self::new(request.method(), route)
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn route(&self) -> &str {
        &self.route
    }
}

impl fmt::Display for EndpointKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.route)
    }
}

impl Serialize for EndpointKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

pub fn normalize_path(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_string();
    }

    let normalized: Vec<&str> = path
        .trim_end_matches('/')
        .split('/')
        .map(|segment| {
            if NUMERIC_SEGMENT.is_match(segment)
                || UUID_SEGMENT.is_match(segment)
                || OBJECT_ID_SEGMENT.is_match(segment)
            {
                ":id"
            } else {
                segment
            }
        })
        .collect();

    normalized.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    #[test]
    fn test_normalize_numeric_and_uuid_segments() {
        assert_eq!(normalize_path("/api/lessons/17"), "/api/lessons/:id");
        assert_eq!(
            normalize_path("/api/students/550e8400-e29b-41d4-a716-446655440000/payments"),
            "/api/students/:id/payments"
        );
        assert_eq!(
            normalize_path("/api/assessments/64b7f0c2a1e4d9f3b2c1a0e9"),
            "/api/assessments/:id"
        );
    }

    #[test]
    fn test_normalize_keeps_plain_segments() {
        assert_eq!(normalize_path("/api/lessons/"), "/api/lessons");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("/api/v2/lessons"), "/api/v2/lessons");
    }

    #[test]
    fn test_same_logical_endpoint_same_key() {
        let a = axum::http::Request::get("/api/lessons/1").body(Body::empty()).unwrap();
        let b = axum::http::Request::get("/api/lessons/2").body(Body::empty()).unwrap();

        assert_eq!(EndpointKey::from_request(&a), EndpointKey::from_request(&b));
        assert_eq!(
            EndpointKey::from_request(&a).to_string(),
            "GET /api/lessons/:id"
        );
    }

    #[test]
    fn test_method_distinguishes_keys() {
        let get = EndpointKey::new(&Method::GET, "/api/lessons");
        let post = EndpointKey::new(&Method::POST, "/api/lessons");
        assert_ne!(get, post);
    }
}
