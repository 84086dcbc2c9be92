//! Staff gate for mutating endpoints.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, Request};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use tracing::warn;

use super::AppState;
use crate::error::GalleryError;

const STAFF_TOKEN_HEADER: &str = "x-staff-token";

/// Decides whether a request may mutate the gallery.
pub trait StaffGate: Send + Sync {
    /// `Unauthorized` when no credential is present, `Forbidden` when it is refused.
    fn check(&self, headers: &HeaderMap) -> Result<(), GalleryError>;
}

/// Accepts a fixed set of shared tokens, sent as `Authorization: Bearer <token>`
/// or `X-Staff-Token: <token>`. With no tokens configured nothing is accepted.
pub struct TokenGate {
    tokens: Vec<String>,
}

impl TokenGate {
    pub fn new(tokens: Vec<String>) -> Self {
        Self {
            tokens: tokens.into_iter().filter(|t| !t.is_empty()).collect(),
        }
    }
}

impl StaffGate for TokenGate {
    fn check(&self, headers: &HeaderMap) -> Result<(), GalleryError> {
        if self.tokens.is_empty() {
            return Err(GalleryError::Forbidden);
        }
        let presented = credential(headers).ok_or(GalleryError::Unauthorized)?;
        if self
            .tokens
            .iter()
            .any(|t| bool::from(t.as_bytes().ct_eq(presented.as_bytes())))
        {
            Ok(())
        } else {
            Err(GalleryError::Forbidden)
        }
    }
}

fn credential(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim);

    bearer
        .or_else(|| {
            headers
                .get(STAFF_TOKEN_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
        })
        .filter(|t| !t.is_empty())
}

pub(crate) async fn require_staff(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match state.gate.check(request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            warn!(
                method = %request.method(),
                route = %request.uri().path(),
                "Staff gate refused request: {}",
                e
            );
            e.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_accepts_bearer_and_header() {
        let gate = TokenGate::new(vec!["s3cret".into()]);
        assert!(gate.check(&headers(&[("authorization", "Bearer s3cret")])).is_ok());
        assert!(gate.check(&headers(&[("x-staff-token", "s3cret")])).is_ok());
    }

    #[test]
    fn test_missing_and_wrong_credentials() {
        let gate = TokenGate::new(vec!["s3cret".into()]);
        assert!(matches!(gate.check(&HeaderMap::new()), Err(GalleryError::Unauthorized)));
        assert!(matches!(
            gate.check(&headers(&[("authorization", "Basic s3cret")])),
            Err(GalleryError::Unauthorized)
        ));
        assert!(matches!(
            gate.check(&headers(&[("x-staff-token", "guess")])),
            Err(GalleryError::Forbidden)
        ));
    }

    #[test]
    fn test_token_must_match_exactly() {
        let gate = TokenGate::new(vec!["first".into(), "s3cret".into()]);
        assert!(gate.check(&headers(&[("x-staff-token", "s3cret")])).is_ok());
        for guess in ["s3c", "s3cret!", "S3CRET", "first s3cret"] {
            assert!(
                matches!(gate.check(&headers(&[("x-staff-token", guess)])), Err(GalleryError::Forbidden)),
                "{} was accepted",
                guess
            );
        }
    }

    #[test]
    fn test_no_tokens_refuses_everything() {
        let gate = TokenGate::new(vec![String::new()]);
        assert!(matches!(
            gate.check(&headers(&[("x-staff-token", "")])),
            Err(GalleryError::Forbidden)
        ));
        assert!(matches!(gate.check(&HeaderMap::new()), Err(GalleryError::Forbidden)));
    }
}
