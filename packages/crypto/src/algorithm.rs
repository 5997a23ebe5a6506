//! Decoding of script-supplied algorithm identifiers.
//!
//! Script passes either a bare name (`"RSA-OAEP"`) or a dictionary
//! (`{name, modulusLength, publicExponent, hash, saltLength}`). It is decoded
//! once at the boundary into an [`AlgorithmSpec`]; a value of the wrong shape
//! is [`CryptoError::Malformed`], a well-formed name this crate does not
//! implement is [`CryptoError::Unsupported`].

use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256, Sha384, Sha512};

use crate::error::CryptoError;

pub const DEFAULT_MODULUS_LENGTH: usize = 2048;

/// 65537, big-endian.
pub const DEFAULT_PUBLIC_EXPONENT: [u8; 3] = [0x01, 0x00, 0x01];

const MIN_MODULUS_LENGTH: usize = 1024;
const MAX_MODULUS_LENGTH: usize = 8192;
const MAX_PUBLIC_EXPONENT: u64 = (1 << 33) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> Result<Self, CryptoError> {
        match name.to_ascii_uppercase().as_str() {
            "SHA-256" => Ok(Self::Sha256),
            "SHA-384" => Ok(Self::Sha384),
            "SHA-512" => Ok(Self::Sha512),
            _ => Err(CryptoError::unsupported("hash", name)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA-256",
            Self::Sha384 => "SHA-384",
            Self::Sha512 => "SHA-512",
        }
    }

    /// JWK `alg` suffix, as in `RS256`.
    pub fn bits(&self) -> u16 {
        match self {
            Self::Sha256 => 256,
            Self::Sha384 => 384,
            Self::Sha512 => 512,
        }
    }

    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }

    fn decode(value: &Value) -> Result<Self, CryptoError> {
        match value {
            Value::String(name) => Self::parse(name),
            Value::Object(map) => match map.get("name") {
                Some(Value::String(name)) => Self::parse(name),
                _ => Err(CryptoError::malformed("hash", "missing name")),
            },
            other => Err(CryptoError::malformed("hash", format!("unexpected {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaScheme {
    RsaOaep,
    RsassaPkcs1v15,
    RsaPss,
}

impl RsaScheme {
    pub fn name(&self) -> &'static str {
        match self {
            Self::RsaOaep => "RSA-OAEP",
            Self::RsassaPkcs1v15 => "RSASSA-PKCS1-v1_5",
            Self::RsaPss => "RSA-PSS",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "RSA-OAEP" => Some(Self::RsaOaep),
            "RSASSA-PKCS1-V1_5" => Some(Self::RsassaPkcs1v15),
            "RSA-PSS" => Some(Self::RsaPss),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RsaAlgorithm {
    pub scheme: RsaScheme,
    pub modulus_length: usize,
    pub public_exponent: Vec<u8>,
    /// `None` when the caller did not name one.
    pub hash: Option<HashAlgorithm>,
    /// PSS salt length in bytes; defaults to the digest length.
    pub salt_length: Option<usize>,
}

impl RsaAlgorithm {
    pub fn new(scheme: RsaScheme) -> Self {
        Self {
            scheme,
            modulus_length: DEFAULT_MODULUS_LENGTH,
            public_exponent: DEFAULT_PUBLIC_EXPONENT.to_vec(),
            hash: None,
            salt_length: None,
        }
    }

    pub fn hash_or_default(&self) -> HashAlgorithm {
        self.hash.unwrap_or(HashAlgorithm::Sha256)
    }

    /// Public exponent as an integer.
    ///
    /// Values that do not fit are malformed. Even exponents and those outside
    /// `3..=MAX_PUBLIC_EXPONENT` are unsupported: no key pair exists for them.
    pub fn exponent(&self) -> Result<u64, CryptoError> {
        let significant: Vec<u8> = self
            .public_exponent
            .iter()
            .copied()
            .skip_while(|b| *b == 0)
            .collect();
        if significant.is_empty() || significant.len() > 8 {
            return Err(CryptoError::malformed("publicExponent", "out of range"));
        }
        let exponent = significant.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
        if exponent < 3 || exponent % 2 == 0 || exponent > MAX_PUBLIC_EXPONENT {
            return Err(CryptoError::unsupported("publicExponent", exponent.to_string()));
        }
        Ok(exponent)
    }

    /// Dictionary form reported back to script on key descriptors.
    pub fn to_json(&self) -> Value {
        let mut algorithm = json!({
            "name": self.scheme.name(),
            "modulusLength": self.modulus_length,
            "publicExponent": self.public_exponent,
            "hash": { "name": self.hash_or_default().name() },
        });
        if let (Some(salt), RsaScheme::RsaPss) = (self.salt_length, self.scheme) {
            algorithm["saltLength"] = json!(salt);
        }
        algorithm
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlgorithmSpec {
    Rsa(RsaAlgorithm),
}

impl AlgorithmSpec {
    pub fn decode(value: &Value) -> Result<Self, CryptoError> {
        match value {
            Value::String(name) => Self::from_name(name, &Map::new()),
            Value::Object(map) => match map.get("name") {
                Some(Value::String(name)) => Self::from_name(name, map),
                Some(_) => Err(CryptoError::malformed("algorithm", "name must be a string")),
                None => Err(CryptoError::malformed("algorithm", "missing name")),
            },
            _ => Err(CryptoError::malformed(
                "algorithm",
                "expected a name or a dictionary",
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlgorithmSpec::Rsa(rsa) => rsa.scheme.name(),
        }
    }

    pub fn as_rsa(&self) -> &RsaAlgorithm {
        match self {
            AlgorithmSpec::Rsa(rsa) => rsa,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            AlgorithmSpec::Rsa(rsa) => rsa.to_json(),
        }
    }

    fn from_name(name: &str, params: &Map<String, Value>) -> Result<Self, CryptoError> {
        let scheme =
            RsaScheme::parse(name).ok_or_else(|| CryptoError::unsupported("algorithm", name))?;
        let mut rsa = RsaAlgorithm::new(scheme);

        if let Some(length) = params.get("modulusLength") {
            let length = length
                .as_u64()
                .ok_or_else(|| CryptoError::malformed("modulusLength", "expected an integer"))?
                as usize;
            if !(MIN_MODULUS_LENGTH..=MAX_MODULUS_LENGTH).contains(&length) {
                return Err(CryptoError::unsupported("modulusLength", length.to_string()));
            }
            rsa.modulus_length = length;
        }

        if let Some(exponent) = params.get("publicExponent") {
            rsa.public_exponent = decode_bytes(exponent)
                .ok_or_else(|| CryptoError::malformed("publicExponent", "expected bytes"))?;
            rsa.exponent()?;
        }

        if let Some(hash) = params.get("hash") {
            rsa.hash = Some(HashAlgorithm::decode(hash)?);
        }

        if let Some(salt) = params.get("saltLength") {
            let salt = salt
                .as_u64()
                .ok_or_else(|| CryptoError::malformed("saltLength", "expected an integer"))?;
            rsa.salt_length = Some(salt as usize);
        }

        Ok(AlgorithmSpec::Rsa(rsa))
    }
}

/// Bytes from either a JSON array of numbers or an index-keyed object, the
/// two shapes a `Uint8Array` takes when serialized.
fn decode_bytes(value: &Value) -> Option<Vec<u8>> {
    let byte = |v: &Value| v.as_u64().and_then(|n| u8::try_from(n).ok());
    match value {
        Value::Array(items) => items.iter().map(byte).collect(),
        Value::Object(map) => {
            let mut indexed = map
                .iter()
                .map(|(k, v)| Some((k.parse::<usize>().ok()?, byte(v)?)))
                .collect::<Option<Vec<_>>>()?;
            indexed.sort_by_key(|(i, _)| *i);
            Some(indexed.into_iter().map(|(_, b)| b).collect())
        }
        _ => None,
    }
}
