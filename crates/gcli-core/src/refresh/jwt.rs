//! Service-account JWT-bearer assertion.

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::Serialize;

use super::exchanger::RefreshError;

/// Lifetime Google accepts for a self-signed assertion.
const ASSERTION_TTL_SECS: i64 = 3600;

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    exp: i64,
    iat: i64,
}

pub(crate) fn build_assertion(
    client_email: &str,
    private_key_pem: &str,
    private_key_id: Option<&str>,
    scope: &str,
    audience: &str,
    issued_at: i64,
) -> Result<String, RefreshError> {
    let claims = JwtClaims {
        iss: client_email,
        scope,
        aud: audience,
        exp: issued_at + ASSERTION_TTL_SECS,
        iat: issued_at,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = private_key_id.map(str::to_string);

    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| RefreshError::Malformed(format!("service account private key: {}", e)))?;

    encode(&header, &claims, &key)
        .map_err(|e| RefreshError::Malformed(format!("JWT signing failed: {}", e)))
}
