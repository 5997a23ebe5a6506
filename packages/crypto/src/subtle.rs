//! Key operations over the resource store.
//!
//! Keys live in the [`ResourceStore`] as [`KeyHandle`]s; callers only ever see
//! a [`KeyDescriptor`] whose `kid` is the store key. Generation and import
//! return [`StagedKey`]s so the caller decides when the handle becomes
//! visible in the store.

use std::sync::Arc;

use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{BigUint, Pkcs1v15Sign, Pss, RsaPrivateKey, RsaPublicKey};
use scriptbridge_core::{CorrelationId, IdGenerator, KeyHandle, KeyKind, ResourceStore};
use serde_json::Value;
use sha2::{Sha256, Sha384, Sha512};

use crate::algorithm::{AlgorithmSpec, HashAlgorithm, RsaAlgorithm, RsaScheme};
use crate::error::CryptoError;
use crate::jwk::Jwk;
use crate::key::{GeneratedKeyPair, RsaKey, RsaKeyMaterial, StagedKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Jwk,
    Spki,
    Pkcs8,
}

impl KeyFormat {
    pub fn parse(format: &str) -> Result<Self, CryptoError> {
        match format {
            "jwk" => Ok(Self::Jwk),
            "spki" => Ok(Self::Spki),
            "pkcs8" => Ok(Self::Pkcs8),
            "raw" => Err(CryptoError::unsupported("key format", format)),
            other => Err(CryptoError::malformed(
                "key format",
                format!("'{other}' is not one of jwk, spki, pkcs8, raw"),
            )),
        }
    }
}

/// Key material as handed over by script.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyData {
    Jwk(Value),
    Der(Vec<u8>),
}

/// Result of an export.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportedKey {
    Jwk(Value),
    Der(Vec<u8>),
}

#[derive(Clone)]
pub struct SubtleCrypto {
    store: ResourceStore,
    ids: Arc<IdGenerator>,
}

impl SubtleCrypto {
    pub fn new(store: ResourceStore, ids: Arc<IdGenerator>) -> Self {
        Self { store, ids }
    }

    pub fn store(&self) -> &ResourceStore {
        &self.store
    }

    /// Generate an RSA key pair. Both halves are staged under fresh ids.
    pub fn generate_key(
        &self,
        algorithm: &AlgorithmSpec,
        extractable: bool,
        usages: Vec<String>,
    ) -> Result<GeneratedKeyPair, CryptoError> {
        let rsa = algorithm.as_rsa();
        let exponent = BigUint::from(rsa.exponent()?);
        let mut rng = rand::thread_rng();
        let private = RsaPrivateKey::new_with_exp(&mut rng, rsa.modulus_length, &exponent)?;
        let public = private.to_public_key();

        let private_key = StagedKey::new(
            self.ids.generate(),
            RsaKeyMaterial {
                key: RsaKey::Private(private),
                algorithm: rsa.clone(),
            },
            extractable,
            usages.clone(),
        );
        // The public half of a pair is always exportable.
        let public_key = StagedKey::new(
            self.ids.generate(),
            RsaKeyMaterial {
                key: RsaKey::Public(public),
                algorithm: rsa.clone(),
            },
            true,
            usages,
        );

        tracing::debug!(
            algorithm = rsa.scheme.name(),
            bits = rsa.modulus_length,
            private_kid = %private_key.descriptor.kid.short(),
            public_kid = %public_key.descriptor.kid.short(),
            "generated key pair"
        );
        Ok(GeneratedKeyPair {
            private_key,
            public_key,
        })
    }

    pub fn import_key(
        &self,
        format: KeyFormat,
        key_data: KeyData,
        algorithm: &AlgorithmSpec,
        extractable: bool,
        usages: Vec<String>,
    ) -> Result<StagedKey, CryptoError> {
        let key = match (format, key_data) {
            (KeyFormat::Jwk, KeyData::Jwk(value)) => Jwk::from_value(&value)?.to_rsa_key()?,
            (KeyFormat::Spki, KeyData::Der(der)) => RsaKey::Public(
                RsaPublicKey::from_public_key_der(&der).map_err(CryptoError::invalid_key)?,
            ),
            (KeyFormat::Pkcs8, KeyData::Der(der)) => RsaKey::Private(
                RsaPrivateKey::from_pkcs8_der(&der).map_err(CryptoError::invalid_key)?,
            ),
            (format, _) => {
                return Err(CryptoError::malformed(
                    "key data",
                    format!("does not match format {format:?}"),
                ))
            }
        };

        let material = RsaKeyMaterial {
            key,
            algorithm: algorithm.as_rsa().clone(),
        };
        let staged = StagedKey::new(self.ids.generate(), material, extractable, usages);
        tracing::debug!(
            kind = %staged.descriptor.kind,
            kid = %staged.descriptor.kid.short(),
            "imported key"
        );
        Ok(staged)
    }

    pub fn export_key(&self, format: KeyFormat, kid: &str) -> Result<ExportedKey, CryptoError> {
        let (kid, handle) = self.resolve(kid)?;
        if !handle.extractable {
            return Err(CryptoError::NotExtractable {
                kid: kid.to_string(),
            });
        }
        let material = rsa_material(&kid, &handle)?;

        match (format, &material.key) {
            (KeyFormat::Jwk, key) => {
                let mut jwk = Jwk::from_rsa_key(key);
                jwk.alg = jwk_alg(&material.algorithm);
                jwk.ext = Some(true);
                Ok(ExportedKey::Jwk(serde_json::to_value(jwk)?))
            }
            (KeyFormat::Spki, RsaKey::Public(key)) => {
                let der = key.to_public_key_der().map_err(CryptoError::invalid_key)?;
                Ok(ExportedKey::Der(der.as_bytes().to_vec()))
            }
            (KeyFormat::Pkcs8, RsaKey::Private(key)) => {
                let der = key.to_pkcs8_der().map_err(CryptoError::invalid_key)?;
                Ok(ExportedKey::Der(der.as_bytes().to_vec()))
            }
            (KeyFormat::Spki, RsaKey::Private(_)) => {
                Err(wrong_kind(&kid, KeyKind::Private, KeyKind::Public))
            }
            (KeyFormat::Pkcs8, RsaKey::Public(_)) => {
                Err(wrong_kind(&kid, KeyKind::Public, KeyKind::Private))
            }
        }
    }

    /// Sign `data` with the private key `kid`.
    pub fn sign(&self, algorithm: &AlgorithmSpec, kid: &str, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let (kid, handle) = self.resolve(kid)?;
        let material = rsa_material(&kid, &handle)?;
        let RsaKey::Private(key) = &material.key else {
            return Err(wrong_kind(&kid, KeyKind::Public, KeyKind::Private));
        };

        let params = Params::new(algorithm.as_rsa(), &material.algorithm);
        let hashed = params.hash.digest(data);
        let signature = match params.scheme {
            RsaScheme::RsaPss => {
                key.sign_with_rng(&mut rand::thread_rng(), params.pss(), &hashed)?
            }
            RsaScheme::RsaOaep | RsaScheme::RsassaPkcs1v15 => key.sign(params.pkcs1v15(), &hashed)?,
        };
        Ok(signature)
    }

    /// Check `signature` over `data` against the public key `kid`.
    ///
    /// A signature that does not verify is `Ok(false)`; an unknown or
    /// unsuitable key is an error.
    pub fn verify(
        &self,
        algorithm: &AlgorithmSpec,
        kid: &str,
        signature: &[u8],
        data: &[u8],
    ) -> Result<bool, CryptoError> {
        let (kid, handle) = self.resolve(kid)?;
        let material = rsa_material(&kid, &handle)?;
        let RsaKey::Public(key) = &material.key else {
            return Err(wrong_kind(&kid, KeyKind::Private, KeyKind::Public));
        };

        let params = Params::new(algorithm.as_rsa(), &material.algorithm);
        let hashed = params.hash.digest(data);
        let outcome = match params.scheme {
            RsaScheme::RsaPss => key.verify(params.pss(), &hashed, signature),
            RsaScheme::RsaOaep | RsaScheme::RsassaPkcs1v15 => {
                key.verify(params.pkcs1v15(), &hashed, signature)
            }
        };
        if let Err(error) = &outcome {
            tracing::debug!(kid = %kid.short(), %error, "signature rejected");
        }
        Ok(outcome.is_ok())
    }

    fn resolve(&self, kid: &str) -> Result<(CorrelationId, KeyHandle), CryptoError> {
        let unknown = || CryptoError::UnknownKey {
            kid: kid.to_string(),
        };
        let id = CorrelationId::parse(kid).map_err(|_| unknown())?;
        let handle = self
            .store
            .get(&id)
            .and_then(|resource| resource.as_key().cloned())
            .ok_or_else(unknown)?;
        Ok((id, handle))
    }
}

/// Effective scheme, hash and salt for one sign or verify call.
struct Params {
    scheme: RsaScheme,
    hash: HashAlgorithm,
    salt_length: Option<usize>,
}

impl Params {
    /// Call parameters win over those recorded on the key.
    fn new(call: &RsaAlgorithm, key: &RsaAlgorithm) -> Self {
        Self {
            scheme: call.scheme,
            hash: call.hash.or(key.hash).unwrap_or(HashAlgorithm::Sha256),
            salt_length: call.salt_length.or(key.salt_length),
        }
    }

    fn pkcs1v15(&self) -> Pkcs1v15Sign {
        match self.hash {
            HashAlgorithm::Sha256 => Pkcs1v15Sign::new::<Sha256>(),
            HashAlgorithm::Sha384 => Pkcs1v15Sign::new::<Sha384>(),
            HashAlgorithm::Sha512 => Pkcs1v15Sign::new::<Sha512>(),
        }
    }

    fn pss(&self) -> Pss {
        match (self.hash, self.salt_length) {
            (HashAlgorithm::Sha256, None) => Pss::new::<Sha256>(),
            (HashAlgorithm::Sha384, None) => Pss::new::<Sha384>(),
            (HashAlgorithm::Sha512, None) => Pss::new::<Sha512>(),
            (HashAlgorithm::Sha256, Some(salt)) => Pss::new_with_salt::<Sha256>(salt),
            (HashAlgorithm::Sha384, Some(salt)) => Pss::new_with_salt::<Sha384>(salt),
            (HashAlgorithm::Sha512, Some(salt)) => Pss::new_with_salt::<Sha512>(salt),
        }
    }
}

fn rsa_material<'a>(kid: &CorrelationId, handle: &'a KeyHandle) -> Result<&'a RsaKeyMaterial, CryptoError> {
    handle
        .material::<RsaKeyMaterial>()
        .ok_or_else(|| CryptoError::UnknownKey {
            kid: kid.to_string(),
        })
}

fn wrong_kind(kid: &CorrelationId, actual: KeyKind, expected: KeyKind) -> CryptoError {
    CryptoError::WrongKeyKind {
        kid: kid.to_string(),
        actual: actual.to_string(),
        expected: expected.to_string(),
    }
}

fn jwk_alg(algorithm: &RsaAlgorithm) -> Option<String> {
    let bits = algorithm.hash_or_default().bits();
    Some(match algorithm.scheme {
        RsaScheme::RsaOaep => format!("RSA-OAEP-{bits}"),
        RsaScheme::RsassaPkcs1v15 => format!("RS{bits}"),
        RsaScheme::RsaPss => format!("PS{bits}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn subtle() -> SubtleCrypto {
        SubtleCrypto::new(ResourceStore::new(), Arc::new(IdGenerator::new()))
    }

    fn small(name: &str) -> AlgorithmSpec {
        AlgorithmSpec::decode(&json!({"name": name, "modulusLength": 1024})).unwrap()
    }

    #[test]
    fn kind_mismatch_is_an_error_not_false() {
        let subtle = subtle();
        let pair = subtle
            .generate_key(&small("RSASSA-PKCS1-v1_5"), false, vec!["sign".into()])
            .unwrap()
            .store(subtle.store());

        let private_kid = pair.private_key.kid.to_string();
        assert!(matches!(
            subtle.verify(&small("RSASSA-PKCS1-v1_5"), &private_kid, b"sig", b"data"),
            Err(CryptoError::WrongKeyKind { .. })
        ));
    }

    #[test]
    fn export_respects_extractable() {
        let subtle = subtle();
        let pair = subtle
            .generate_key(&small("RSA-PSS"), false, vec![])
            .unwrap()
            .store(subtle.store());

        assert!(matches!(
            subtle.export_key(KeyFormat::Pkcs8, pair.private_key.kid.as_str()),
            Err(CryptoError::NotExtractable { .. })
        ));
        assert!(subtle
            .export_key(KeyFormat::Spki, pair.public_key.kid.as_str())
            .is_ok());
    }

    #[test]
    fn malformed_kid_is_unknown() {
        let subtle = subtle();
        assert!(matches!(
            subtle.verify(&small("RSA-OAEP"), "not-a-kid", b"", b""),
            Err(CryptoError::UnknownKey { .. })
        ));
    }

    #[test]
    fn format_parsing() {
        assert_eq!(KeyFormat::parse("spki").unwrap(), KeyFormat::Spki);
        assert!(matches!(KeyFormat::parse("raw"), Err(CryptoError::Unsupported { .. })));
        assert!(matches!(KeyFormat::parse("pem"), Err(CryptoError::Malformed { .. })));
    }

    #[test]
    fn jwk_alg_names() {
        let alg = |name: &str, hash: &str| {
            AlgorithmSpec::decode(&json!({"name": name, "hash": hash}))
                .unwrap()
                .as_rsa()
                .clone()
        };
        assert_eq!(jwk_alg(&alg("RSASSA-PKCS1-v1_5", "SHA-384")).unwrap(), "RS384");
        assert_eq!(jwk_alg(&alg("RSA-PSS", "SHA-256")).unwrap(), "PS256");
        assert_eq!(jwk_alg(&alg("RSA-OAEP", "SHA-256")).unwrap(), "RSA-OAEP-256");
    }
}
