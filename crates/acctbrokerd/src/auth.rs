//! HTTP basic authentication for the broker API

use crate::api::ErrorBody;
use axum::Json;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Username and password the platform must present
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn is_empty(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }

    /// Check an `Authorization` header value. The scheme is matched
    /// case-insensitively, the credentials in constant time.
    pub fn matches_header(&self, value: &str) -> bool {
        let Some((scheme, encoded)) = value.trim().split_once(' ') else {
            return false;
        };
        if !scheme.eq_ignore_ascii_case("Basic") {
            return false;
        }
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Some(split) = decoded.iter().position(|b| *b == b':') else {
            return false;
        };
        let (username, password) = (&decoded[..split], &decoded[split + 1..]);

        let username_ok = username.ct_eq(self.username.as_bytes());
        let password_ok = password.ct_eq(self.password.as_bytes());
        (username_ok & password_ok).into()
    }

    /// `Authorization` header value for these credentials
    pub fn header_value(&self) -> String {
        let raw = format!("{}:{}", self.username, self.password);
        format!("Basic {}", STANDARD.encode(raw))
    }
}

/// Reject requests without matching basic credentials
pub async fn require_basic_auth(
    State(credentials): State<Arc<Credentials>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| credentials.matches_header(v));

    if authorized {
        return next.run(request).await;
    }

    tracing::debug!("Rejected unauthenticated request to {}", request.uri().path());

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"acctbroker\"")],
        Json(ErrorBody {
            error: None,
            description: "Unauthorized".to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_header() {
        let credentials = Credentials::new("broker", "s3cret");

        assert!(credentials.matches_header(&credentials.header_value()));
        assert!(credentials.matches_header("Basic YnJva2VyOnMzY3JldA=="));
        assert!(!credentials.matches_header("Basic YnJva2VyOndyb25n"));
        assert!(!credentials.matches_header("Bearer YnJva2VyOnMzY3JldA=="));
        assert!(!credentials.matches_header("Basic not-base64!"));
        assert!(!credentials.matches_header("Basic YnJva2Vy"));
    }

    #[test]
    fn test_scheme_is_case_insensitive() {
        let credentials = Credentials::new("broker", "s3cret");

        assert!(credentials.matches_header("basic YnJva2VyOnMzY3JldA=="));
        assert!(credentials.matches_header("BASIC YnJva2VyOnMzY3JldA=="));
        assert!(!credentials.matches_header("Basicx YnJva2VyOnMzY3JldA=="));
        assert!(!credentials.matches_header("YnJva2VyOnMzY3JldA=="));
    }

    #[test]
    fn test_prefix_of_password_rejected() {
        let credentials = Credentials::new("broker", "s3cret");
        let shorter = Credentials::new("broker", "s3cre");
        let longer = Credentials::new("broker", "s3crets");

        assert!(!credentials.matches_header(&shorter.header_value()));
        assert!(!credentials.matches_header(&longer.header_value()));
    }

    #[test]
    fn test_password_with_colon() {
        let credentials = Credentials::new("broker", "a:b");
        assert!(credentials.matches_header(&credentials.header_value()));
    }

    #[test]
    fn test_debug_redacts_password() {
        let credentials = Credentials::new("broker", "s3cret");
        let rendered = format!("{:?}", credentials);
        assert!(rendered.contains("broker"));
        assert!(!rendered.contains("s3cret"));
    }
}
