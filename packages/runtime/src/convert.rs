//! Conversions between interpreter values and host data.

use rquickjs::{ArrayBuffer, Ctx, Exception, FromJs, IntoJs, TypedArray, Value};
use scriptbridge_core::{OperationError, Payload};
use serde_json::json;

/// Convert a JSON value into a JS value.
pub fn json_to_js<'js>(ctx: &Ctx<'js>, value: &serde_json::Value) -> rquickjs::Result<Value<'js>> {
    match value {
        serde_json::Value::Null => Ok(Value::new_null(ctx.clone())),
        serde_json::Value::Bool(b) => (*b).into_js(ctx),
        serde_json::Value::String(s) => s.as_str().into_js(ctx),
        _ => ctx.json_parse(value.to_string()),
    }
}

/// Convert a JS value into JSON. `undefined` and functions become `null`.
pub fn js_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> rquickjs::Result<serde_json::Value> {
    if value.is_undefined() || value.is_null() {
        return Ok(serde_json::Value::Null);
    }
    let Some(text) = ctx.json_stringify(value)? else {
        return Ok(serde_json::Value::Null);
    };
    serde_json::from_str(&text.to_string()?)
        .map_err(|e| rquickjs::Error::new_from_js_message("value", "json", e.to_string()))
}

/// Bytes from a string (UTF-8) or a `Uint8Array`/`ArrayBuffer`.
///
/// Returns `None` for anything else.
pub fn bytes_from_js<'js>(ctx: &Ctx<'js>, value: &Value<'js>) -> rquickjs::Result<Option<Vec<u8>>> {
    if let Some(s) = value.as_string() {
        return Ok(Some(s.to_string()?.into_bytes()));
    }
    if !value.is_object() {
        return Ok(None);
    }
    if let Ok(array) = TypedArray::<u8>::from_js(ctx, value.clone()) {
        return Ok(array.as_bytes().map(<[u8]>::to_vec));
    }
    if let Ok(buffer) = ArrayBuffer::from_js(ctx, value.clone()) {
        return Ok(buffer.as_bytes().map(<[u8]>::to_vec));
    }
    Ok(None)
}

/// Fresh `Uint8Array` holding `bytes`.
pub fn bytes_to_js<'js>(ctx: &Ctx<'js>, bytes: Vec<u8>) -> rquickjs::Result<Value<'js>> {
    TypedArray::<u8>::new(ctx.clone(), bytes)?.into_js(ctx)
}

/// Script-visible value of a settled payload.
pub fn payload_to_js<'js>(ctx: &Ctx<'js>, payload: &Payload) -> rquickjs::Result<Value<'js>> {
    match payload {
        Payload::Json(value) => json_to_js(ctx, value),
        Payload::Bytes(bytes) => ArrayBuffer::new(ctx.clone(), bytes.clone())?.into_js(ctx),
    }
}

/// `{name, message}` shape the prelude turns back into an `Error`.
pub fn operation_error_to_js<'js>(ctx: &Ctx<'js>, error: &OperationError) -> rquickjs::Result<Value<'js>> {
    json_to_js(
        ctx,
        &json!({
            "name": error.name(),
            "message": error.message(),
        }),
    )
}

/// JSON form of a thrown or rejected value.
///
/// Error objects do not stringify usefully, so their `name` and `message`
/// are lifted out. Everything else goes through `JSON.stringify`.
pub fn rejection_to_json<'js>(ctx: &Ctx<'js>, value: Value<'js>) -> serde_json::Value {
    if let Some(object) = value.as_object() {
        let message = object.get::<_, Option<String>>("message").ok().flatten();
        if let Some(message) = message {
            let name = object
                .get::<_, Option<String>>("name")
                .ok()
                .flatten()
                .unwrap_or_else(|| "Error".to_string());
            return json!({ "name": name, "message": message });
        }
    }
    js_to_json(ctx, value).unwrap_or_else(|_| serde_json::Value::Null)
}

/// Human readable form of the exception pending on `ctx`.
pub fn describe_exception(ctx: &Ctx<'_>) -> String {
    let caught = ctx.catch();
    if let Some(object) = caught.as_object() {
        let name = object
            .get::<_, Option<String>>("name")
            .ok()
            .flatten()
            .unwrap_or_else(|| "Error".to_string());
        if let Some(exception) = Exception::from_object(object.clone()) {
            let message = exception.message().unwrap_or_default();
            return match exception.stack() {
                Some(stack) if !stack.is_empty() => format!("{name}: {message}\n{stack}"),
                _ => format!("{name}: {message}"),
            };
        }
    }
    match rquickjs::Coerced::<String>::from_js(ctx, caught) {
        Ok(text) => text.0,
        Err(_) => "unknown exception".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn with_ctx<F: FnOnce(Ctx<'_>)>(f: F) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(f);
    }

    #[test]
    fn json_survives_a_trip_through_the_interpreter() {
        with_ctx(|ctx| {
            let original = json!({"a": [1, 2.5, "x", null], "b": {"c": true}});
            let value = json_to_js(&ctx, &original).unwrap();
            assert_eq!(js_to_json(&ctx, value).unwrap(), original);

            let text = json_to_js(&ctx, &json!("plain")).unwrap();
            assert_eq!(text.as_string().unwrap().to_string().unwrap(), "plain");
        });
    }

    #[test]
    fn undefined_is_null() {
        with_ctx(|ctx| {
            let value: Value = ctx.eval("undefined").unwrap();
            assert_eq!(js_to_json(&ctx, value).unwrap(), serde_json::Value::Null);
        });
    }

    #[test]
    fn bytes_from_strings_and_arrays() {
        with_ctx(|ctx| {
            let text: Value = ctx.eval("'hé'").unwrap();
            assert_eq!(bytes_from_js(&ctx, &text).unwrap().unwrap(), "hé".as_bytes());

            let array: Value = ctx.eval("new Uint8Array([1, 2, 3])").unwrap();
            assert_eq!(bytes_from_js(&ctx, &array).unwrap().unwrap(), vec![1, 2, 3]);

            let buffer: Value = ctx.eval("new Uint8Array([9, 8]).buffer").unwrap();
            assert_eq!(bytes_from_js(&ctx, &buffer).unwrap().unwrap(), vec![9, 8]);

            let number: Value = ctx.eval("42").unwrap();
            assert!(bytes_from_js(&ctx, &number).unwrap().is_none());
        });
    }

    #[test]
    fn errors_keep_name_and_message() {
        with_ctx(|ctx| {
            let error: Value = ctx.eval("new TypeError('bad input')").unwrap();
            assert_eq!(
                rejection_to_json(&ctx, error),
                json!({"name": "TypeError", "message": "bad input"})
            );

            let plain: Value = ctx.eval("({code: 7})").unwrap();
            assert_eq!(rejection_to_json(&ctx, plain), json!({"code": 7}));
        });
    }
}
