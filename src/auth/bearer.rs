use actix_web::http::header::{HeaderMap, AUTHORIZATION};

use crate::error::AuthError;

const BEARER_PREFIX: &str = "Bearer ";

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// An absent, empty, non-text or non-bearer header all count as missing.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or(AuthError::MissingAuthorization)?;

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .ok_or(AuthError::MissingAuthorization)?;

    if token.is_empty() {
        return Err(AuthError::MissingAuthorization);
    }

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::HeaderValue;

    fn headers_with(value: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static(value));
        headers
    }

    #[test]
    fn test_extracts_token() {
        let headers = headers_with("Bearer abc123");
        assert_eq!(extract_bearer_token(&headers), Ok("abc123"));
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            extract_bearer_token(&HeaderMap::new()),
            Err(AuthError::MissingAuthorization)
        );
    }

    #[test]
    fn test_empty_header_counts_as_missing() {
        let headers = headers_with("");
        assert_eq!(
            extract_bearer_token(&headers),
            Err(AuthError::MissingAuthorization)
        );
    }

    #[test]
    fn test_requires_bearer_prefix() {
        for value in ["Basic dXNlcjpwYXNz", "bearer abc123", "abc123", "Bearer ", "Bearer    "] {
            let headers = headers_with(value);
            assert_eq!(
                extract_bearer_token(&headers),
                Err(AuthError::MissingAuthorization),
                "should reject {:?}",
                value
            );
        }
    }
}
