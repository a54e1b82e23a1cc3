//! Keyed signing for cookie values.
//!
//! A signed value is `hex(HMAC-SHA1(secret, value)) + "----" + value`: the
//! payload stays readable, the MAC makes it tamper-evident.

use hmac::{Hmac, Mac};
use sha1::Sha1;

use crate::error::Error;

type HmacSha1 = Hmac<Sha1>;

const SEPARATOR: &str = "----";

fn mac(value: &str, secret: &str) -> HmacSha1 {
    let mut mac = HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(value.as_bytes());
    mac
}

/// Returns `value` prefixed with its hex-encoded MAC.
pub fn sign(value: &str, secret: &str) -> String {
    let digest = mac(value, secret).finalize().into_bytes();
    format!("{}{SEPARATOR}{value}", hex::encode(digest))
}

/// Recomputes the MAC over the payload portion and returns the payload if it
/// verifies. Comparison is constant-time.
pub fn validate(signed: &str, secret: &str) -> Result<String, Error> {
    let (digest, value) = signed.split_once(SEPARATOR).ok_or(Error::Tampered)?;
    let digest = hex::decode(digest).map_err(|_| Error::Tampered)?;
    mac(value, secret)
        .verify_slice(&digest)
        .map_err(|_| Error::Tampered)?;
    Ok(value.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let signed = sign("ABCDE", "secret");
        assert_eq!(validate(&signed, "secret").unwrap(), "ABCDE");
    }

    #[test]
    fn any_flipped_character_fails() {
        let signed = sign("session-id", "secret");
        for i in 0..signed.len() {
            let mut bytes = signed.clone().into_bytes();
            bytes[i] = if bytes[i] == b'x' { b'y' } else { b'x' };
            let Ok(tampered) = String::from_utf8(bytes) else { continue };
            assert!(validate(&tampered, "secret").is_err(), "flip at {i} accepted");
        }
    }

    #[test]
    fn wrong_secret_fails() {
        let signed = sign("session-id", "secret");
        assert!(validate(&signed, "other").is_err());
    }

    #[test]
    fn garbage_fails() {
        assert!(validate("no separator here", "secret").is_err());
        assert!(validate("nothex----payload", "secret").is_err());
        assert!(validate("", "secret").is_err());
    }
}
