use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Checks a GitHub `X-Hub-Signature-256` header (`sha256=<hex>`) against `body`.
pub fn verify_signature(signature: &str, body: &[u8], secret: &str) -> bool {
    let Some(expected) = signature
        .trim()
        .strip_prefix("sha256=")
        .and_then(|hex_digest| hex::decode(hex_digest).ok())
    else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

/// Header value for `body`, in the form GitHub sends.
#[cfg(test)]
pub fn sign_body(body: &[u8], secret: &str) -> Option<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(body);
    Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Example from GitHub's webhook validation docs.
    const SECRET: &str = "It's a Secret to Everybody";
    const BODY: &[u8] = b"Hello, World!";
    const SIGNATURE: &str =
        "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

    #[test]
    fn accepts_matching_signature() {
        assert!(verify_signature(SIGNATURE, BODY, SECRET));
        assert_eq!(sign_body(BODY, SECRET).as_deref(), Some(SIGNATURE));
    }

    #[test]
    fn rejects_wrong_secret_or_body() {
        assert!(!verify_signature(SIGNATURE, BODY, "other"));
        assert!(!verify_signature(SIGNATURE, b"Hello", SECRET));
        assert!(!verify_signature("sha256=00", BODY, SECRET));
    }

    #[test]
    fn rejects_malformed_headers() {
        assert!(!verify_signature(&SIGNATURE.replace("sha256=", "sha1="), BODY, SECRET));
        assert!(!verify_signature("sha256=not-hex", BODY, SECRET));
        assert!(!verify_signature("", BODY, SECRET));
    }
}
