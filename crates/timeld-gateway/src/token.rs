//! Compact signed tokens and code-sealed payloads.
//!
//! A signed token is `base64url(json claims) "." base64url(ed25519 sig)`,
//! the signature covering the encoded claims. Activation tokens are signed
//! by the gateway; access tokens are signed by account keys.
//!
//! A sealed payload is `base64url(salt || nonce || ciphertext)`: the token
//! encrypted with ChaCha20-Poly1305 under an Argon2id key stretched from a
//! 6-digit activation code.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use timeld_crypto::ed25519::{Signature, SigningKey, VerifyingKey};
use timeld_crypto::{argon2id, chacha20, CryptoError};
use zeroize::Zeroizing;

use crate::{GatewayError, Result};

/// Associated data bound into every sealed activation token.
pub const SEAL_AAD: &[u8] = b"timeld v1 activation-token";

/// Claims of a gateway-signed activation token.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivationClaims {
    /// Account the activation was issued for.
    pub sub: String,
    pub email: String,
    /// Expiry, Unix seconds.
    pub exp: u64,
}

/// Claims of a client access token, signed with an account key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: String,
    /// Key record id of the signing key.
    pub kid: String,
    pub exp: u64,
}

/// Claims with an expiry.
pub trait Expiring {
    fn expires_at(&self) -> u64;

    /// Fail with `Unauthorized` if expired at `now`.
    fn check_expiry(&self, now: u64) -> Result<()> {
        if now >= self.expires_at() {
            return Err(unauthorized("token expired"));
        }
        Ok(())
    }
}

impl Expiring for ActivationClaims {
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

impl Expiring for AccessClaims {
    fn expires_at(&self) -> u64 {
        self.exp
    }
}

/// Sign claims into a compact token.
pub fn sign<C: Serialize>(claims: &C, key: &SigningKey) -> Result<String> {
    let payload = serde_json::to_vec(claims)
        .map_err(|e| GatewayError::Crypto(CryptoError::InvalidInput(e.to_string())))?;
    let head = URL_SAFE_NO_PAD.encode(payload);
    let signature = key.sign(head.as_bytes());
    Ok(format!(
        "{head}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Check a token's signature under `key` and decode its claims.
///
/// Expiry is not checked here; see [`Expiring::check_expiry`].
pub fn verify<C: DeserializeOwned>(token: &str, key: &VerifyingKey) -> Result<C> {
    let (head, signature) = split(token)?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .ok()
        .and_then(|bytes| Signature::from_slice(&bytes).ok())
        .ok_or_else(|| unauthorized("malformed token signature"))?;
    key.verify(head.as_bytes(), &signature)
        .map_err(|_| unauthorized("invalid token signature"))?;
    decode_claims(head)
}

/// Decode a token's claims without checking its signature.
///
/// Only for locating the key to verify with.
pub fn peek<C: DeserializeOwned>(token: &str) -> Result<C> {
    let (head, _) = split(token)?;
    decode_claims(head)
}

/// Seal a token under an activation code.
pub async fn seal(token: &str, code: u32) -> Result<String> {
    let salt = argon2id::generate_salt();
    let key = code_key(code, salt.to_vec()).await?;
    let sealed = chacha20::seal(&key, token.as_bytes(), SEAL_AAD)?;

    let mut out = Vec::with_capacity(salt.len() + sealed.len());
    out.extend_from_slice(&salt);
    out.extend_from_slice(&sealed);
    Ok(URL_SAFE_NO_PAD.encode(out))
}

/// Open a sealed token with its activation code.
pub async fn unseal(sealed: &str, code: u32) -> Result<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(sealed.trim())
        .map_err(|_| unauthorized("malformed sealed token"))?;
    if bytes.len() <= argon2id::SALT_LEN {
        return Err(unauthorized("malformed sealed token"));
    }
    let (salt, sealed) = bytes.split_at(argon2id::SALT_LEN);
    let key = code_key(code, salt.to_vec()).await?;
    let token = chacha20::open(&key, sealed, SEAL_AAD)
        .map_err(|_| unauthorized("wrong activation code"))?;
    String::from_utf8(token).map_err(|_| unauthorized("malformed sealed token"))
}

/// Stretch an activation code off the async workers.
async fn code_key(code: u32, salt: Vec<u8>) -> Result<Zeroizing<[u8; argon2id::KEY_LEN]>> {
    let key = tokio::task::spawn_blocking(move || {
        argon2id::derive_code_key(code.to_string().as_bytes(), &salt).map(Zeroizing::new)
    })
    .await
    .map_err(|e| GatewayError::Crypto(CryptoError::Argon2(e.to_string())))??;
    Ok(key)
}

fn split(token: &str) -> Result<(&str, &str)> {
    let token = token.trim();
    match token.split_once('.') {
        Some((head, sig)) if !head.is_empty() && !sig.is_empty() && !sig.contains('.') => {
            Ok((head, sig))
        }
        _ => Err(unauthorized("malformed token")),
    }
}

fn decode_claims<C: DeserializeOwned>(head: &str) -> Result<C> {
    let payload = URL_SAFE_NO_PAD
        .decode(head)
        .map_err(|_| unauthorized("malformed token claims"))?;
    serde_json::from_slice(&payload).map_err(|_| unauthorized("malformed token claims"))
}

fn unauthorized(reason: &str) -> GatewayError {
    GatewayError::Unauthorized(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> ActivationClaims {
        ActivationClaims {
            sub: "acme".to_string(),
            email: "a@acme.com".to_string(),
            exp: 2_000_000_000,
        }
    }

    #[test]
    fn test_sign_and_verify() {
        let key = SigningKey::generate();
        let token = sign(&claims(), &key).expect("sign");
        assert_eq!(token.matches('.').count(), 1);

        let decoded: ActivationClaims = verify(&token, &key.verifying_key()).expect("verify");
        assert_eq!(decoded, claims());
        let peeked: ActivationClaims = peek(&token).expect("peek");
        assert_eq!(peeked, claims());
    }

    #[test]
    fn test_verify_rejects_other_key() {
        let token = sign(&claims(), &SigningKey::generate()).expect("sign");
        let other = SigningKey::generate().verifying_key();
        let result: Result<ActivationClaims> = verify(&token, &other);
        assert!(matches!(result, Err(GatewayError::Unauthorized(_))));
    }

    #[test]
    fn test_verify_rejects_tampered_claims() {
        let key = SigningKey::generate();
        let token = sign(&claims(), &key).expect("sign");
        let (_, sig) = token.split_once('.').expect("two parts");

        let mut forged = claims();
        forged.sub = "evil".to_string();
        let head = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged).expect("json"));
        let result: Result<ActivationClaims> =
            verify(&format!("{head}.{sig}"), &key.verifying_key());
        assert!(matches!(result, Err(GatewayError::Unauthorized(_))));
    }

    #[test]
    fn test_malformed_tokens() {
        let key = SigningKey::generate().verifying_key();
        for bad in ["", "abc", "a.b.c", ".sig", "head.", "!!!.???"] {
            let result: Result<ActivationClaims> = verify(bad, &key);
            assert!(
                matches!(result, Err(GatewayError::Unauthorized(_))),
                "'{bad}' should be unauthorized"
            );
        }
    }

    #[test]
    fn test_expiry() {
        let c = claims();
        assert!(c.check_expiry(c.exp - 1).is_ok());
        assert!(matches!(
            c.check_expiry(c.exp),
            Err(GatewayError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn test_seal_and_unseal() {
        let sealed = seal("some.token", 123_456).await.expect("seal");
        assert!(!sealed.contains("some.token"));
        assert_eq!(unseal(&sealed, 123_456).await.expect("unseal"), "some.token");
        assert!(matches!(
            unseal(&sealed, 654_321).await,
            Err(GatewayError::Unauthorized(_))
        ));
        assert!(matches!(
            unseal("short", 123_456).await,
            Err(GatewayError::Unauthorized(_))
        ));
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_unseal_yields_to_other_tasks() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let sealed = seal("some.token", 123_456).await.expect("seal");
        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        tokio::spawn(async move { flag.store(true, Ordering::SeqCst) });

        // A single worker only runs the spawned task if key stretching
        // leaves it free.
        assert_eq!(unseal(&sealed, 123_456).await.expect("unseal"), "some.token");
        assert!(ran.load(Ordering::SeqCst));
    }
}
