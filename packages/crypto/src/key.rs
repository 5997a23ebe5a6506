use std::any::Any;

use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use scriptbridge_core::{CorrelationId, KeyHandle, KeyKind, KeyMaterial, ResourceStore};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::algorithm::RsaAlgorithm;

/// Script-visible description of a stored key. Never carries key bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyDescriptor {
    #[serde(rename = "type")]
    pub kind: KeyKind,
    pub kid: CorrelationId,
    pub extractable: bool,
    pub algorithm: Value,
    pub usages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyPairDescriptor {
    pub private_key: KeyDescriptor,
    pub public_key: KeyDescriptor,
}

#[derive(Debug, Clone)]
pub enum RsaKey {
    Public(RsaPublicKey),
    Private(RsaPrivateKey),
}

/// RSA key plus the algorithm it was generated or imported for.
#[derive(Debug, Clone)]
pub struct RsaKeyMaterial {
    pub key: RsaKey,
    pub algorithm: RsaAlgorithm,
}

impl RsaKeyMaterial {
    pub fn kind(&self) -> KeyKind {
        match self.key {
            RsaKey::Public(_) => KeyKind::Public,
            RsaKey::Private(_) => KeyKind::Private,
        }
    }

    pub fn public_key(&self) -> RsaPublicKey {
        match &self.key {
            RsaKey::Public(key) => key.clone(),
            RsaKey::Private(key) => key.to_public_key(),
        }
    }

    pub fn modulus_bits(&self) -> usize {
        match &self.key {
            RsaKey::Public(key) => key.size() * 8,
            RsaKey::Private(key) => key.size() * 8,
        }
    }
}

impl KeyMaterial for RsaKeyMaterial {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A key ready to be stored under its descriptor's kid.
#[derive(Debug, Clone)]
pub struct StagedKey {
    pub descriptor: KeyDescriptor,
    pub handle: KeyHandle,
}

impl StagedKey {
    pub(crate) fn new(
        kid: CorrelationId,
        material: RsaKeyMaterial,
        extractable: bool,
        usages: Vec<String>,
    ) -> Self {
        let kind = material.kind();
        let mut algorithm = material.algorithm.clone();
        algorithm.modulus_length = material.modulus_bits();
        let descriptor = KeyDescriptor {
            kind,
            kid,
            extractable,
            algorithm: algorithm.to_json(),
            usages,
        };
        Self {
            descriptor,
            handle: KeyHandle::new(kind, extractable, material),
        }
    }

    /// Put the key into `store` and return its descriptor.
    pub fn store(self, store: &ResourceStore) -> KeyDescriptor {
        store.put(self.descriptor.kid.clone(), self.handle);
        self.descriptor
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    pub private_key: StagedKey,
    pub public_key: StagedKey,
}

impl GeneratedKeyPair {
    pub fn descriptor(&self) -> KeyPairDescriptor {
        KeyPairDescriptor {
            private_key: self.private_key.descriptor.clone(),
            public_key: self.public_key.descriptor.clone(),
        }
    }

    pub fn store(self, store: &ResourceStore) -> KeyPairDescriptor {
        KeyPairDescriptor {
            private_key: self.private_key.store(store),
            public_key: self.public_key.store(store),
        }
    }
}
