use std::rc::Rc;

use rquickjs::{Ctx, Function, Object, Value};
use scriptbridge_core::{Completion, CorrelationId, OperationError};
use scriptbridge_fetch::FetchRequest;

use super::{bytes_arg, json_arg, string_arg, type_error, Host};

#[derive(Clone, Copy)]
enum BodyMode {
    Text,
    Bytes,
}

pub(super) fn install<'js>(ctx: &Ctx<'js>, natives: &Object<'js>, host: &Rc<Host>) -> rquickjs::Result<()> {
    let h = Rc::clone(host);
    natives.set(
        "fetch",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, meta: Value<'js>, body: Value<'js>| -> rquickjs::Result<String> {
                let meta = json_arg(&ctx, meta, "request")?;
                let mut request: FetchRequest = serde_json::from_value(meta)
                    .map_err(|e| type_error(&ctx, format!("invalid request: {e}")))?;
                if request.url.is_empty() {
                    return Err(type_error(&ctx, "request url is empty"));
                }
                if !(body.is_undefined() || body.is_null()) {
                    request.body = Some(bytes_arg(&ctx, &body, "request body")?);
                }

                let fetcher = h.fetcher.clone();
                h.spawn(&ctx, "fetch", move |worker| {
                    fetcher
                        .fetch_completion(&request, worker)
                        .map_err(OperationError::from)
                })
            },
        )?,
    )?;

    let h = Rc::clone(host);
    natives.set(
        "readBody",
        Function::new(
            ctx.clone(),
            move |ctx: Ctx<'js>, token: Value<'js>, mode: Value<'js>| -> rquickjs::Result<String> {
                let token = string_arg(&ctx, &token, "body token")?;
                let mode = match string_arg(&ctx, &mode, "read mode")?.as_str() {
                    "text" => BodyMode::Text,
                    "bytes" => BodyMode::Bytes,
                    other => return Err(type_error(&ctx, format!("unknown read mode {other:?}"))),
                };
                let id = CorrelationId::parse(&token).map_err(|e| type_error(&ctx, e.to_string()))?;

                let Some(stream) = h.store.get(&id).and_then(|r| r.as_stream().cloned()) else {
                    return h.reject(
                        &ctx,
                        "readBody",
                        OperationError::argument("body already consumed or released"),
                    );
                };
                h.store.remove(&id);

                h.spawn(&ctx, "readBody", move |_| {
                    let bytes = stream
                        .read_to_end()
                        .map_err(|e| OperationError::transport(format!("reading body: {e}")))?;
                    Ok(match mode {
                        BodyMode::Text => Completion::json(serde_json::Value::String(
                            String::from_utf8_lossy(&bytes).into_owned(),
                        )),
                        BodyMode::Bytes => Completion::bytes(bytes),
                    })
                })
            },
        )?,
    )?;

    let h = Rc::clone(host);
    natives.set(
        "closeBody",
        Function::new(ctx.clone(), move |token: String| -> bool {
            match CorrelationId::parse(&token) {
                Ok(id) => h.store.delete(&id),
                Err(_) => false,
            }
        })?,
    )?;

    Ok(())
}
