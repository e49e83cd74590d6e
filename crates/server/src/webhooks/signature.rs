//! Webhook signature computation and verification.
//!
//! Both supported platforms sign deliveries with HMAC-SHA256 over the exact
//! raw request body bytes, base64-encoded in a header. Verification must run
//! on the raw bytes (never a re-serialized form) and compare in constant
//! time.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Compute the base64-encoded HMAC-SHA256 of `body`.
///
/// Matches both platforms' reference implementations; also used by tests to
/// build valid deliveries.
#[must_use]
pub fn sign(secret: &SecretString, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    BASE64.encode(mac.finalize().into_bytes())
}

/// Verify a header-supplied signature against the raw body bytes.
///
/// Returns `false` for undecodable signatures. The digest comparison is
/// constant-time (`Mac::verify_slice`).
#[must_use]
pub fn verify(secret: &SecretString, body: &[u8], provided: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.expose_secret().as_bytes()) else {
        return false;
    };
    mac.update(body);

    let Ok(expected) = BASE64.decode(provided.trim()) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> SecretString {
        SecretString::from("whsec_9f8e7d6c5b4a39281706f5e4d3c2b1a0")
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let body = br#"{"id":1001,"line_items":[{"id":1},{"id":2}]}"#;
        let signature = sign(&secret(), body);
        assert!(verify(&secret(), body, &signature));
    }

    #[test]
    fn test_single_bit_body_mutation_fails() {
        let body = br#"{"id":1001}"#.to_vec();
        let signature = sign(&secret(), &body);

        for index in 0..body.len() {
            let mut mutated = body.clone();
            if let Some(byte) = mutated.get_mut(index) {
                *byte ^= 0x01;
            }
            assert!(
                !verify(&secret(), &mutated, &signature),
                "bit flip at byte {index} must fail verification"
            );
        }
    }

    #[test]
    fn test_different_secret_fails() {
        let body = br#"{"id":1001}"#;
        let signature = sign(&secret(), body);
        let other = SecretString::from("whsec_00000000000000000000000000000000");
        assert!(!verify(&other, body, &signature));
    }

    #[test]
    fn test_signature_of_other_body_fails() {
        let signature = sign(&secret(), b"body-a");
        assert!(!verify(&secret(), b"body-b", &signature));
    }

    #[test]
    fn test_undecodable_signature_fails() {
        assert!(!verify(&secret(), b"body", "!!! not base64 !!!"));
    }

    #[test]
    fn test_empty_signature_fails() {
        assert!(!verify(&secret(), b"body", ""));
    }

    #[test]
    fn test_signature_survives_surrounding_whitespace() {
        let body = b"payload";
        let signature = format!(" {}\n", sign(&secret(), body));
        assert!(verify(&secret(), body, &signature));
    }
}
