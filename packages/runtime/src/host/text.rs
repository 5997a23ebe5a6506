use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use rquickjs::{Ctx, Exception, Function, Object, Value};

use super::{bytes_arg, type_error};
use crate::convert::bytes_to_js;

/// Decoder for `atob`: padding optional, stray trailing bits ignored.
const FORGIVING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// Decode base64 into a binary string. `None` if the input is not base64.
pub(crate) fn atob(input: &str) -> Option<String> {
    let compact: String = input
        .chars()
        .filter(|c| !matches!(c, ' ' | '\t' | '\n' | '\x0c' | '\r'))
        .collect();
    let bytes = FORGIVING.decode(compact).ok()?;
    Some(bytes.into_iter().map(char::from).collect())
}

/// Encode a binary string. `None` if it holds a code point above U+00FF.
pub(crate) fn btoa(input: &str) -> Option<String> {
    let bytes = input
        .chars()
        .map(|c| u8::try_from(u32::from(c)).ok())
        .collect::<Option<Vec<u8>>>()?;
    Some(STANDARD.encode(bytes))
}

#[derive(Debug)]
pub(crate) struct Malformed;

pub(crate) fn decode(bytes: &[u8], encoding: &str, fatal: bool, ignore_bom: bool) -> Option<Result<String, Malformed>> {
    let decoded = match encoding {
        "utf-8" => {
            let bytes = match bytes {
                [0xEF, 0xBB, 0xBF, rest @ ..] if !ignore_bom => rest,
                _ => bytes,
            };
            if fatal {
                String::from_utf8(bytes.to_vec()).map_err(|_| Malformed)
            } else {
                Ok(String::from_utf8_lossy(bytes).into_owned())
            }
        }
        "utf-16le" => {
            let bytes = match bytes {
                [0xFF, 0xFE, rest @ ..] if !ignore_bom => rest,
                _ => bytes,
            };
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                .collect();
            let dangling = bytes.len() % 2 == 1;
            if fatal {
                if dangling {
                    Err(Malformed)
                } else {
                    String::from_utf16(&units).map_err(|_| Malformed)
                }
            } else {
                let mut text = String::from_utf16_lossy(&units);
                if dangling {
                    text.push(char::REPLACEMENT_CHARACTER);
                }
                Ok(text)
            }
        }
        "latin1" => Ok(bytes.iter().copied().map(char::from).collect()),
        _ => return None,
    };
    Some(decoded)
}

pub(super) fn install<'js>(ctx: &Ctx<'js>, natives: &Object<'js>) -> rquickjs::Result<()> {
    natives.set("atob", Function::new(ctx.clone(), |input: String| atob(&input))?)?;
    natives.set("btoa", Function::new(ctx.clone(), |input: String| btoa(&input))?)?;

    natives.set(
        "encodeText",
        Function::new(ctx.clone(), |ctx: Ctx<'js>, input: String| {
            bytes_to_js(&ctx, input.into_bytes())
        })?,
    )?;

    natives.set(
        "decodeText",
        Function::new(
            ctx.clone(),
            |ctx: Ctx<'js>, input: Value<'js>, encoding: String, fatal: bool, ignore_bom: bool| {
                let bytes = bytes_arg(&ctx, &input, "input")?;
                match decode(&bytes, &encoding, fatal, ignore_bom) {
                    Some(Ok(text)) => Ok(text),
                    Some(Err(Malformed)) => Err(type_error(
                        &ctx,
                        format!("the encoded data was not valid {encoding}"),
                    )),
                    None => Err(Exception::throw_range(
                        &ctx,
                        &format!("unsupported encoding: {encoding}"),
                    )),
                }
            },
        )?,
    )?;

    natives.set(
        "log",
        Function::new(ctx.clone(), |level: String, message: String| match level.as_str() {
            "error" => tracing::error!(target: "scriptbridge::console", "{message}"),
            "warn" => tracing::warn!(target: "scriptbridge::console", "{message}"),
            "debug" => tracing::debug!(target: "scriptbridge::console", "{message}"),
            "trace" => tracing::trace!(target: "scriptbridge::console", "{message}"),
            _ => tracing::info!(target: "scriptbridge::console", "{message}"),
        })?,
    )?;

    Ok(())
}
