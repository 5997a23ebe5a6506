//! RSA JSON Web Keys.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CryptoError;
use crate::key::RsaKey;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_ops: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,
}

#[derive(Deserialize)]
struct JwkSet {
    keys: Vec<Jwk>,
}

impl Jwk {
    /// Decode a single key, or the first key of a `{"keys": [...]}` set.
    pub fn from_value(value: &Value) -> Result<Self, CryptoError> {
        if value.get("keys").is_some() {
            let set: JwkSet = serde_json::from_value(value.clone())
                .map_err(|e| CryptoError::invalid_key(format!("key set: {e}")))?;
            return set
                .keys
                .into_iter()
                .next()
                .ok_or_else(|| CryptoError::invalid_key("key set is empty"));
        }
        serde_json::from_value(value.clone()).map_err(|e| CryptoError::invalid_key(format!("jwk: {e}")))
    }

    pub fn to_rsa_key(&self) -> Result<RsaKey, CryptoError> {
        if self.kty != "RSA" {
            return Err(CryptoError::unsupported("key type", self.kty.clone()));
        }
        let n = required(&self.n, "n")?;
        let e = required(&self.e, "e")?;

        match &self.d {
            None => Ok(RsaKey::Public(RsaPublicKey::new(n, e)?)),
            Some(d) => {
                let d = decode_uint(d, "d")?;
                let primes = match (&self.p, &self.q) {
                    (Some(p), Some(q)) => vec![decode_uint(p, "p")?, decode_uint(q, "q")?],
                    _ => Vec::new(),
                };
                let mut key = RsaPrivateKey::from_components(n, e, d, primes)?;
                key.validate()?;
                key.precompute()?;
                Ok(RsaKey::Private(key))
            }
        }
    }

    pub fn from_rsa_key(key: &RsaKey) -> Self {
        match key {
            RsaKey::Public(key) => Self {
                kty: "RSA".to_string(),
                n: Some(encode_uint(key.n())),
                e: Some(encode_uint(key.e())),
                ..Default::default()
            },
            RsaKey::Private(key) => {
                let primes = key.primes();
                let mut jwk = Self {
                    kty: "RSA".to_string(),
                    n: Some(encode_uint(key.n())),
                    e: Some(encode_uint(key.e())),
                    d: Some(encode_uint(key.d())),
                    ..Default::default()
                };
                if let [p, q] = primes {
                    jwk.p = Some(encode_uint(p));
                    jwk.q = Some(encode_uint(q));
                    if let (Some(dp), Some(dq)) = (key.dp(), key.dq()) {
                        jwk.dp = Some(encode_uint(dp));
                        jwk.dq = Some(encode_uint(dq));
                    }
                }
                jwk
            }
        }
    }
}

fn required(field: &Option<String>, name: &str) -> Result<BigUint, CryptoError> {
    let value = field
        .as_deref()
        .ok_or_else(|| CryptoError::invalid_key(format!("missing '{name}'")))?;
    decode_uint(value, name)
}

fn decode_uint(value: &str, name: &str) -> Result<BigUint, CryptoError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value.trim_end_matches('='))
        .map_err(|e| CryptoError::invalid_key(format!("'{name}' is not base64url: {e}")))?;
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encode_uint(value: &BigUint) -> String {
    URL_SAFE_NO_PAD.encode(value.to_bytes_be())
}
