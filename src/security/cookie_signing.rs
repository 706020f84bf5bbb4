//! Cookie integrity protection.
//!
//! # Responsibilities
//! - Sign outgoing cookie values with a server-held secret
//! - Verify incoming cookie values and recover the original value
//!
//! # Format
//! ```text
//! base64url(HMAC-SHA256(payload)) "." payload
//! payload = base64url(JSON ["name", "value"])
//! ```
//! Binding the cookie name into the payload stops a signed value from being
//! replayed under a different cookie name.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies cookie values.
#[derive(Clone)]
pub struct CookieSigner {
    key: Vec<u8>,
}

impl CookieSigner {
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: key.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
        }
    }

    /// Produce the signed representation of `value` for cookie `name`.
    pub fn sign(&self, name: &str, value: &str) -> String {
        let payload_json = serde_json::Value::Array(vec![name.into(), value.into()]).to_string();
        let payload = URL_SAFE_NO_PAD.encode(payload_json.as_bytes());

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let tag = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        format!("{}.{}", tag, payload)
    }

    /// Recover the original value if the signature and name check out.
    pub fn verify(&self, name: &str, signed: &str) -> Option<String> {
        let (tag, payload) = signed.split_once('.')?;
        let tag = URL_SAFE_NO_PAD.decode(tag).ok()?;

        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_slice(&tag).ok()?;

        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        let (signed_name, value): (String, String) = serde_json::from_slice(&json).ok()?;
        (signed_name == name).then_some(value)
    }
}

impl std::fmt::Debug for CookieSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieSigner").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let signer = CookieSigner::new("secret");
        let signed = signer.sign("theme", "dark");
        assert_ne!(signed, "dark");
        assert_eq!(signer.verify("theme", &signed).as_deref(), Some("dark"));
    }

    #[test]
    fn wrong_key_or_name_rejected() {
        let signed = CookieSigner::new("secret").sign("theme", "dark");
        assert!(CookieSigner::new("other").verify("theme", &signed).is_none());
        assert!(CookieSigner::new("secret").verify("layout", &signed).is_none());
    }

    #[test]
    fn tampered_or_unsigned_rejected() {
        let signer = CookieSigner::new("secret");
        let signed = signer.sign("theme", "dark");
        let forged = signer.sign("theme", "light");
        let (tag, _) = signed.split_once('.').unwrap();
        let (_, payload) = forged.split_once('.').unwrap();

        assert!(signer.verify("theme", &format!("{}.{}", tag, payload)).is_none());
        assert!(signer.verify("theme", "dark").is_none());
        assert!(signer.verify("theme", "!!.??").is_none());
    }
}
