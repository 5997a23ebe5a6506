use std::rc::Rc;

use rand::RngCore;
use rquickjs::{Ctx, Exception, Function, Object, Value};
use scriptbridge_core::{Completion, OperationError};
use scriptbridge_crypto::{AlgorithmSpec, CryptoError, ExportedKey, KeyData, KeyFormat, StagedKey};

use super::{bool_arg, bytes_arg, json_arg, kid_arg, string_arg, strings_arg, type_error, Host};
use crate::convert::bytes_to_js;

const MAX_RANDOM_BYTES: i32 = 65536;

/// Malformed input throws; anything else is left for the operation to reject.
fn checked<T>(ctx: &Ctx<'_>, result: Result<T, CryptoError>) -> rquickjs::Result<Result<T, CryptoError>> {
    match result {
        Err(error @ CryptoError::Malformed { .. }) => Err(type_error(ctx, error.to_string())),
        other => Ok(other),
    }
}

fn algorithm_arg<'js>(
    ctx: &Ctx<'js>,
    value: Value<'js>,
) -> rquickjs::Result<Result<AlgorithmSpec, CryptoError>> {
    let value = json_arg(ctx, value, "algorithm")?;
    checked(ctx, AlgorithmSpec::decode(&value))
}

fn format_arg(ctx: &Ctx<'_>, value: &Value<'_>) -> rquickjs::Result<Result<KeyFormat, CryptoError>> {
    let format = string_arg(ctx, value, "format")?;
    checked(ctx, KeyFormat::parse(&format))
}

fn staged_completion(key: StagedKey) -> Result<Completion, OperationError> {
    let descriptor = serde_json::to_value(&key.descriptor)?;
    Ok(Completion::json(descriptor).with_resource(key.descriptor.kid, key.handle))
}

pub(super) fn install<'js>(ctx: &Ctx<'js>, natives: &Object<'js>, host: &Rc<Host>) -> rquickjs::Result<()> {
    let h = Rc::clone(host);
    natives.set(
        "generateKey",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, algorithm: Value<'js>, extractable: Value<'js>, usages: Value<'js>| {
                let algorithm = match algorithm_arg(&ctx, algorithm)? {
                    Ok(algorithm) => algorithm,
                    Err(error) => return h.reject(&ctx, "generateKey", error.into()),
                };
                let extractable = bool_arg(&ctx, &extractable, "extractable")?;
                let usages = strings_arg(&ctx, usages, "usages")?;

                let subtle = h.subtle.clone();
                h.spawn(&ctx, "generateKey", move |worker| {
                    let pair = subtle.generate_key(&algorithm, extractable, usages)?;
                    worker.ensure_live()?;
                    let descriptor = serde_json::to_value(pair.descriptor())?;
                    let (private_key, public_key) = (pair.private_key, pair.public_key);
                    Ok(Completion::json(descriptor)
                        .with_resource(private_key.descriptor.kid, private_key.handle)
                        .with_resource(public_key.descriptor.kid, public_key.handle))
                })
            },
        )?,
    )?;

    let h = Rc::clone(host);
    natives.set(
        "importKey",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  format: Value<'js>,
                  key_data: Value<'js>,
                  algorithm: Value<'js>,
                  extractable: Value<'js>,
                  usages: Value<'js>| {
                let format = match format_arg(&ctx, &format)? {
                    Ok(format) => format,
                    Err(error) => return h.reject(&ctx, "importKey", error.into()),
                };
                let key_data = match format {
                    KeyFormat::Jwk => {
                        let jwk = json_arg(&ctx, key_data, "keyData")?;
                        if !jwk.is_object() {
                            return Err(type_error(&ctx, "jwk keyData must be an object"));
                        }
                        KeyData::Jwk(jwk)
                    }
                    KeyFormat::Spki | KeyFormat::Pkcs8 => KeyData::Der(bytes_arg(&ctx, &key_data, "keyData")?),
                };
                let algorithm = match algorithm_arg(&ctx, algorithm)? {
                    Ok(algorithm) => algorithm,
                    Err(error) => return h.reject(&ctx, "importKey", error.into()),
                };
                let extractable = bool_arg(&ctx, &extractable, "extractable")?;
                let usages = strings_arg(&ctx, usages, "usages")?;

                let subtle = h.subtle.clone();
                h.spawn(&ctx, "importKey", move |worker| {
                    let key = subtle.import_key(format, key_data, &algorithm, extractable, usages)?;
                    worker.ensure_live()?;
                    staged_completion(key)
                })
            },
        )?,
    )?;

    let h = Rc::clone(host);
    natives.set(
        "exportKey",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, format: Value<'js>, key: Value<'js>| {
                let format = match format_arg(&ctx, &format)? {
                    Ok(format) => format,
                    Err(error) => return h.reject(&ctx, "exportKey", error.into()),
                };
                let kid = kid_arg(&ctx, &key)?;

                let subtle = h.subtle.clone();
                h.spawn(&ctx, "exportKey", move |_| {
                    Ok(match subtle.export_key(format, &kid)? {
                        ExportedKey::Jwk(jwk) => Completion::json(jwk),
                        ExportedKey::Der(der) => Completion::bytes(der),
                    })
                })
            },
        )?,
    )?;

    let h = Rc::clone(host);
    natives.set(
        "sign",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, algorithm: Value<'js>, key: Value<'js>, data: Value<'js>| {
                let algorithm = match algorithm_arg(&ctx, algorithm)? {
                    Ok(algorithm) => algorithm,
                    Err(error) => return h.reject(&ctx, "sign", error.into()),
                };
                let kid = kid_arg(&ctx, &key)?;
                let data = bytes_arg(&ctx, &data, "data")?;

                let subtle = h.subtle.clone();
                h.spawn(&ctx, "sign", move |_| {
                    Ok(Completion::bytes(subtle.sign(&algorithm, &kid, &data)?))
                })
            },
        )?,
    )?;

    let h = Rc::clone(host);
    natives.set(
        "verify",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>,
                  algorithm: Value<'js>,
                  key: Value<'js>,
                  signature: Value<'js>,
                  data: Value<'js>| {
                let algorithm = match algorithm_arg(&ctx, algorithm)? {
                    Ok(algorithm) => algorithm,
                    Err(error) => return h.reject(&ctx, "verify", error.into()),
                };
                let kid = kid_arg(&ctx, &key)?;
                let signature = bytes_arg(&ctx, &signature, "signature")?;
                let data = bytes_arg(&ctx, &data, "data")?;

                let subtle = h.subtle.clone();
                h.spawn(&ctx, "verify", move |_| {
                    let valid = subtle.verify(&algorithm, &kid, &signature, &data)?;
                    Ok(Completion::json(serde_json::Value::Bool(valid)))
                })
            },
        )?,
    )?;

    natives.set(
        "randomUUID",
        Function::new(ctx.clone(), || uuid::Uuid::new_v4().to_string())?,
    )?;

    natives.set(
        "randomBytes",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, len: i32| -> rquickjs::Result<Value<'js>> {
            if !(0..=MAX_RANDOM_BYTES).contains(&len) {
                return Err(Exception::throw_range(
                    &ctx,
                    &format!("byte length must be between 0 and {MAX_RANDOM_BYTES}"),
                ));
            }
            let mut bytes = vec![0u8; len as usize];
            rand::thread_rng().fill_bytes(&mut bytes);
            bytes_to_js(&ctx, bytes)
        })?,
    )?;

    Ok(())
}
