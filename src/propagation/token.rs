//! # Context Token
//!
//! Wire form of a [`ConsistencyWindow`]: a JSON object mapping database keys
//! to UNIX timestamps, URL-escaped the way Rack escapes cookie values, e.g.
//! `%7B%22primary%22%3A1700000000.5%7D`. With a secret configured the
//! payload is followed by `.` and a base64url SHA-256 signature of
//! `secret + payload`.

use std::collections::BTreeMap;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::context::ConsistencyWindow;

/// Everything but `*-._` and alphanumerics is escaped
const COOKIE_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'*')
    .remove(b'-')
    .remove(b'.')
    .remove(b'_');

/// Why an inbound token was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is not valid URL-escaped UTF-8")]
    Encoding,

    #[error("token payload is not a JSON object of timestamps: {0}")]
    Payload(String),

    #[error("token signature missing")]
    Unsigned,

    #[error("token signature mismatch")]
    InvalidSignature,
}

/// Encodes and decodes context tokens
#[derive(Clone, Default)]
pub struct TokenCodec {
    secret: Option<Vec<u8>>,
}

impl TokenCodec {
    /// Codec producing and accepting unsigned tokens
    pub fn unsigned() -> Self {
        Self { secret: None }
    }

    /// Codec producing signed tokens and rejecting unsigned ones
    pub fn signed(secret: &[u8]) -> Self {
        Self {
            secret: Some(secret.to_vec()),
        }
    }

    pub fn is_signed(&self) -> bool {
        self.secret.is_some()
    }

    /// Token for `window`
    pub fn encode(&self, window: &ConsistencyWindow) -> String {
        // A string-keyed map of f64 always serializes.
        let json = serde_json::to_string(&window.to_map()).unwrap_or_else(|_| "{}".to_string());
        let payload = utf8_percent_encode(&json, COOKIE_VALUE).to_string();
        match &self.secret {
            Some(secret) => format!("{}.{}", payload, sign(secret, &payload)),
            None => payload,
        }
    }

    /// Window carried by `raw`; anything unusable yields an empty window.
    pub fn decode(&self, raw: &str) -> ConsistencyWindow {
        match self.try_decode(raw) {
            Ok(window) => window,
            Err(e) => {
                tracing::debug!(error = %e, "discarding context token");
                ConsistencyWindow::new()
            }
        }
    }

    /// Window carried by `raw`, or why it was rejected
    pub fn try_decode(&self, raw: &str) -> Result<ConsistencyWindow, TokenError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(ConsistencyWindow::new());
        }

        let payload = match &self.secret {
            Some(secret) => {
                let (payload, signature) = raw.rsplit_once('.').ok_or(TokenError::Unsigned)?;
                let expected = sign(secret, payload);
                if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
                    return Err(TokenError::InvalidSignature);
                }
                payload
            }
            None => raw,
        };

        let json = unescape(payload)?;
        parse_timestamps(json.as_bytes()).map(ConsistencyWindow::from_map)
    }
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec")
            .field("signed", &self.is_signed())
            .finish()
    }
}

fn sign(secret: &[u8], payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret);
    hasher.update(payload.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

/// Form-style unescape: `+` is a space, `%XX` a byte
fn unescape(payload: &str) -> Result<String, TokenError> {
    let spaced = payload.replace('+', " ");
    percent_decode_str(&spaced)
        .decode_utf8()
        .map(|json| json.into_owned())
        .map_err(|_| TokenError::Encoding)
}

/// Accepts numbers and numeric strings as timestamps
fn parse_timestamps(json: &[u8]) -> Result<BTreeMap<String, f64>, TokenError> {
    let value: Value =
        serde_json::from_slice(json).map_err(|e| TokenError::Payload(e.to_string()))?;
    let Value::Object(object) = value else {
        return Err(TokenError::Payload("expected an object".to_string()));
    };

    let mut map = BTreeMap::new();
    for (key, value) in object {
        let ts = match &value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match ts {
            Some(ts) if ts.is_finite() => {
                map.insert(key, ts);
            }
            _ => {
                return Err(TokenError::Payload(format!(
                    "timestamp for {:?} is not a number",
                    key
                )))
            }
        }
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window() -> ConsistencyWindow {
        let mut window = ConsistencyWindow::new();
        window.record_write("primary", 1_700_000_000.25);
        window
    }

    #[test]
    fn test_unsigned_token_is_escaped_json() {
        let codec = TokenCodec::unsigned();
        let token = codec.encode(&window());
        assert_eq!(token, "%7B%22primary%22%3A1700000000.25%7D");
        assert_eq!(codec.decode(&token), window());
    }

    #[test]
    fn test_rack_escaped_cookie_decodes() {
        let decoded = TokenCodec::unsigned()
            .try_decode("%7B%22primary%22%3A1700000000.5%7D")
            .unwrap();
        assert_eq!(decoded.last_write("primary"), 1_700_000_000.5);

        let spaced = TokenCodec::unsigned()
            .try_decode("%7B%22primary+db%22%3A%221700000000.5%22%7D")
            .unwrap();
        assert_eq!(spaced.last_write("primary db"), 1_700_000_000.5);
    }

    #[test]
    fn test_invalid_utf8_escape_rejected() {
        assert_eq!(
            TokenCodec::unsigned().try_decode("%7B%FF%7D"),
            Err(TokenError::Encoding)
        );
    }

    #[test]
    fn test_signed_round_trip() {
        let codec = TokenCodec::signed(b"test-secret");
        let token = codec.encode(&window());
        assert_eq!(codec.try_decode(&token).unwrap(), window());
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let codec = TokenCodec::signed(b"test-secret");
        let token = codec.encode(&window());
        let (_, signature) = token.rsplit_once('.').unwrap();

        let mut forged = ConsistencyWindow::new();
        forged.record_write("primary", 1.0);
        let forged_payload = TokenCodec::unsigned().encode(&forged);
        let forged_token = format!("{}.{}", forged_payload, signature);

        assert_eq!(
            codec.try_decode(&forged_token),
            Err(TokenError::InvalidSignature)
        );
        assert!(codec.decode(&forged_token).is_empty());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = TokenCodec::signed(b"one").encode(&window());
        assert_eq!(
            TokenCodec::signed(b"two").try_decode(&token),
            Err(TokenError::InvalidSignature)
        );
    }

    #[test]
    fn test_signed_codec_rejects_unsigned_token() {
        let signed = TokenCodec::signed(b"secret");
        let token = TokenCodec::unsigned().encode(&window());
        assert_eq!(signed.try_decode(&token), Err(TokenError::InvalidSignature));
        assert_eq!(signed.try_decode("%7B%7D"), Err(TokenError::Unsigned));
    }

    #[test]
    fn test_raw_json_accepted_when_unsigned() {
        let codec = TokenCodec::unsigned();
        let decoded = codec.decode(r#"{"primary": "1700000000.5", "reporting": 12}"#);
        assert_eq!(decoded.last_write("primary"), 1_700_000_000.5);
        assert_eq!(decoded.last_write("reporting"), 12.0);
    }

    #[test]
    fn test_malformed_tokens_decode_empty() {
        let codec = TokenCodec::unsigned();
        for raw in ["{not json", "%%%", "[1,2,3]", r#"{"primary": "soon"}"#, r#"{"primary": null}"#] {
            assert!(codec.try_decode(raw).is_err(), "{raw} should be rejected");
            assert!(codec.decode(raw).is_empty());
        }
    }

    #[test]
    fn test_empty_token_is_empty_window() {
        assert!(TokenCodec::unsigned().try_decode("").unwrap().is_empty());
        assert!(TokenCodec::signed(b"s").try_decode("  ").unwrap().is_empty());
    }
}
