use std::sync::Arc;

use serde_json::json;

use scriptbridge_core::{CorrelationId, IdGenerator, KeyKind, OperationError, ResourceStore};
use scriptbridge_crypto::{
    AlgorithmSpec, CryptoError, ExportedKey, KeyData, KeyFormat, RsaKeyMaterial, SubtleCrypto,
};

fn subtle() -> SubtleCrypto {
    SubtleCrypto::new(ResourceStore::new(), Arc::new(IdGenerator::new()))
}

fn oaep() -> AlgorithmSpec {
    AlgorithmSpec::decode(&json!({
        "name": "RSA-OAEP",
        "modulusLength": 2048,
        "publicExponent": [1, 0, 1],
        "hash": "SHA-256",
    }))
    .unwrap()
}

#[test]
fn generated_pair_signs_and_verifies() {
    let subtle = subtle();
    let pair = subtle
        .generate_key(&oaep(), true, vec!["encrypt".into(), "decrypt".into()])
        .unwrap()
        .store(subtle.store());

    assert_eq!(pair.private_key.kind, KeyKind::Private);
    assert_eq!(pair.public_key.kind, KeyKind::Public);
    assert_ne!(pair.private_key.kid, pair.public_key.kid);
    assert_eq!(pair.public_key.algorithm["modulusLength"], 2048);
    assert_eq!(subtle.store().len(), 2);

    let signature = subtle
        .sign(&oaep(), pair.private_key.kid.as_str(), b"hello")
        .unwrap();
    assert!(subtle
        .verify(&oaep(), pair.public_key.kid.as_str(), &signature, b"hello")
        .unwrap());
    assert!(!subtle
        .verify(&oaep(), pair.public_key.kid.as_str(), &signature, b"hellO")
        .unwrap());
}

#[test]
fn unrelated_key_never_verifies() {
    let subtle = subtle();
    let signer = subtle
        .generate_key(&oaep(), false, vec![])
        .unwrap()
        .store(subtle.store());
    let other = subtle
        .generate_key(&oaep(), false, vec![])
        .unwrap()
        .store(subtle.store());

    let signature = subtle
        .sign(&oaep(), signer.private_key.kid.as_str(), b"hello")
        .unwrap();
    let verdict = subtle.verify(&oaep(), other.public_key.kid.as_str(), &signature, b"hello");
    assert!(!matches!(verdict, Ok(true)));
}

#[test]
fn pss_round_trip_with_custom_salt() {
    let subtle = subtle();
    let pss = AlgorithmSpec::decode(&json!({
        "name": "RSA-PSS",
        "modulusLength": 1024,
        "hash": {"name": "SHA-384"},
        "saltLength": 20,
    }))
    .unwrap();
    let pair = subtle
        .generate_key(&pss, false, vec!["sign".into(), "verify".into()])
        .unwrap()
        .store(subtle.store());

    let signature = subtle.sign(&pss, pair.private_key.kid.as_str(), b"data").unwrap();
    assert!(subtle
        .verify(&pss, pair.public_key.kid.as_str(), &signature, b"data")
        .unwrap());
}

#[test]
fn unknown_kid_is_a_key_error() {
    let subtle = subtle();
    let kid = IdGenerator::global().generate();
    let error = subtle
        .verify(&oaep(), kid.as_str(), b"sig", b"data")
        .unwrap_err();
    assert!(matches!(error, CryptoError::UnknownKey { .. }));
    assert_eq!(OperationError::from(error).name(), "KeyError");
}

#[test]
fn jwk_import_resolves_to_usable_public_key() {
    let source = subtle();
    let pair = source
        .generate_key(&oaep(), true, vec![])
        .unwrap()
        .store(source.store());
    let ExportedKey::Jwk(jwk) = source
        .export_key(KeyFormat::Jwk, pair.public_key.kid.as_str())
        .unwrap()
    else {
        panic!("expected a jwk");
    };
    assert_eq!(jwk["kty"], "RSA");
    assert_eq!(jwk["alg"], "RSA-OAEP-256");

    let target = subtle();
    let descriptor = target
        .import_key(
            KeyFormat::Jwk,
            KeyData::Jwk(jwk),
            &AlgorithmSpec::decode(&json!({"name": "RSA-OAEP"})).unwrap(),
            true,
            vec!["encrypt".into()],
        )
        .unwrap()
        .store(target.store());

    assert_eq!(descriptor.kind, KeyKind::Public);
    assert_eq!(descriptor.usages, vec!["encrypt".to_string()]);
    assert!(CorrelationId::is_correlation_id(descriptor.kid.as_str()));

    let stored = target.store().get(&descriptor.kid).unwrap();
    let material = stored.as_key().unwrap().material::<RsaKeyMaterial>().unwrap();
    assert_eq!(material.kind(), KeyKind::Public);

    // Usable: verifies a signature from the original private key.
    let signature = source
        .sign(&oaep(), pair.private_key.kid.as_str(), b"hello")
        .unwrap();
    assert!(target
        .verify(&oaep(), descriptor.kid.as_str(), &signature, b"hello")
        .unwrap());
}

#[test]
fn der_formats_round_trip_between_stores() {
    let source = subtle();
    let alg = AlgorithmSpec::decode(&json!({"name": "RSASSA-PKCS1-v1_5", "modulusLength": 1024}))
        .unwrap();
    let pair = source
        .generate_key(&alg, true, vec![])
        .unwrap()
        .store(source.store());

    let ExportedKey::Der(spki) = source
        .export_key(KeyFormat::Spki, pair.public_key.kid.as_str())
        .unwrap()
    else {
        panic!("expected der");
    };
    let ExportedKey::Der(pkcs8) = source
        .export_key(KeyFormat::Pkcs8, pair.private_key.kid.as_str())
        .unwrap()
    else {
        panic!("expected der");
    };

    let target = subtle();
    let public = target
        .import_key(KeyFormat::Spki, KeyData::Der(spki), &alg, false, vec![])
        .unwrap()
        .store(target.store());
    let private = target
        .import_key(KeyFormat::Pkcs8, KeyData::Der(pkcs8), &alg, false, vec![])
        .unwrap()
        .store(target.store());

    let signature = target.sign(&alg, private.kid.as_str(), b"msg").unwrap();
    assert!(target
        .verify(&alg, public.kid.as_str(), &signature, b"msg")
        .unwrap());
}

#[test]
fn garbage_der_is_rejected() {
    let subtle = subtle();
    let error = subtle
        .import_key(
            KeyFormat::Spki,
            KeyData::Der(vec![0x30, 0x01, 0xff]),
            &oaep(),
            true,
            vec![],
        )
        .unwrap_err();
    assert!(matches!(error, CryptoError::InvalidKey { .. }));
}
