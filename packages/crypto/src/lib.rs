//! # scriptbridge-crypto
//!
//! Asymmetric key management for script. Key material stays in the host's
//! resource store; script only handles [`KeyDescriptor`]s that reference it
//! by correlation id.
//!
//! Supported: the RSA family (`RSA-OAEP`, `RSASSA-PKCS1-v1_5`, `RSA-PSS`) with
//! SHA-256, SHA-384 or SHA-512; `jwk`, `spki` and `pkcs8` key formats.

pub mod algorithm;
pub mod error;
pub mod jwk;
pub mod key;
pub mod subtle;

pub use algorithm::{AlgorithmSpec, HashAlgorithm, RsaAlgorithm, RsaScheme};
pub use error::CryptoError;
pub use jwk::Jwk;
pub use key::{GeneratedKeyPair, KeyDescriptor, KeyPairDescriptor, RsaKey, RsaKeyMaterial, StagedKey};
pub use subtle::{ExportedKey, KeyData, KeyFormat, SubtleCrypto};
