//! Expiry check for stored credentials
//!
//! Only the `exp` claim is read. The signature is not verified: the server
//! is the authority, this just avoids a round-trip with a token that is
//! certainly dead.

use base64::prelude::*;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

#[derive(Deserialize)]
struct Claims {
    exp: Option<f64>,
}

/// Expiry time embedded in a JWT, if the token has one
pub fn expires_at(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = BASE64_URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;
    Utc.timestamp_opt(claims.exp? as i64, 0).single()
}

/// Whether the token is expired at `now`
///
/// Tokens that cannot be decoded count as expired.
pub fn is_expired(token: &str, now: DateTime<Utc>) -> bool {
    expires_at(token).is_none_or(|exp| exp <= now)
}
