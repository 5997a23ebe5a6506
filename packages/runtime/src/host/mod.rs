//! Native functions exposed to script.
//!
//! Natives are installed on a private `__host` object that the prelude
//! captures and then removes from the global scope. Asynchronous natives
//! validate their arguments on the interpreter thread, throwing `TypeError`
//! for malformed input, and otherwise return the id of the operation they
//! spawned. The prelude turns that id into a promise.

mod crypto;
mod fetch;
mod text;

use std::rc::Rc;

use rquickjs::{Ctx, Exception, Object, Value};
use scriptbridge_core::{Completion, Executor, OperationError, ResourceStore, WorkerContext};
use scriptbridge_crypto::SubtleCrypto;
use scriptbridge_fetch::Fetcher;

use crate::bridge::PromiseBridge;
use crate::convert::{bytes_from_js, js_to_json};

const PRELUDE: &str = include_str!("../prelude.js");

/// Host services shared by every native.
pub(crate) struct Host {
    pub executor: Executor,
    pub store: ResourceStore,
    pub fetcher: Fetcher,
    pub subtle: SubtleCrypto,
}

impl Host {
    /// Spawn `work` and return its operation id to script.
    fn spawn<'js, F>(&self, ctx: &Ctx<'js>, operation: &'static str, work: F) -> rquickjs::Result<String>
    where
        F: FnOnce(&WorkerContext) -> Result<Completion, OperationError> + Send + 'static,
    {
        self.executor
            .spawn(operation, work)
            .map(|id| id.to_string())
            .map_err(|error| Exception::throw_internal(ctx, &error.to_string()))
    }

    /// An operation that rejects with `error` as soon as it is delivered.
    fn reject<'js>(&self, ctx: &Ctx<'js>, operation: &'static str, error: OperationError) -> rquickjs::Result<String> {
        self.spawn(ctx, operation, move |_| Err(error))
    }
}

/// Install natives and evaluate the prelude.
pub(crate) fn install<'js>(ctx: &Ctx<'js>, host: &Rc<Host>, bridge: &Rc<PromiseBridge>) -> rquickjs::Result<()> {
    let natives = Object::new(ctx.clone())?;
    bridge.install(ctx, &natives)?;
    fetch::install(ctx, &natives, host)?;
    crypto::install(ctx, &natives, host)?;
    text::install(ctx, &natives)?;

    ctx.globals().set("__host", natives)?;
    ctx.eval::<(), _>(PRELUDE)
}

fn type_error(ctx: &Ctx<'_>, message: impl AsRef<str>) -> rquickjs::Error {
    Exception::throw_type(ctx, message.as_ref())
}

fn json_arg<'js>(ctx: &Ctx<'js>, value: Value<'js>, what: &str) -> rquickjs::Result<serde_json::Value> {
    if value.is_undefined() || value.is_null() {
        return Err(type_error(ctx, format!("{what} is required")));
    }
    js_to_json(ctx, value).map_err(|_| type_error(ctx, format!("{what} is not serializable")))
}

fn string_arg(ctx: &Ctx<'_>, value: &Value<'_>, what: &str) -> rquickjs::Result<String> {
    match value.as_string() {
        Some(s) => s.to_string(),
        None => Err(type_error(ctx, format!("{what} must be a string"))),
    }
}

fn bool_arg(ctx: &Ctx<'_>, value: &Value<'_>, what: &str) -> rquickjs::Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| type_error(ctx, format!("{what} must be a boolean")))
}

fn bytes_arg<'js>(ctx: &Ctx<'js>, value: &Value<'js>, what: &str) -> rquickjs::Result<Vec<u8>> {
    bytes_from_js(ctx, value)?
        .ok_or_else(|| type_error(ctx, format!("{what} must be a string, ArrayBuffer or Uint8Array")))
}

fn strings_arg<'js>(ctx: &Ctx<'js>, value: Value<'js>, what: &str) -> rquickjs::Result<Vec<String>> {
    let not_strings = || type_error(ctx, format!("{what} must be an array of strings"));
    let serde_json::Value::Array(items) = json_arg(ctx, value, what)? else {
        return Err(not_strings());
    };
    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::String(s) => Ok(s),
            _ => Err(not_strings()),
        })
        .collect()
}

/// The `kid` of a key descriptor.
fn kid_arg(ctx: &Ctx<'_>, value: &Value<'_>) -> rquickjs::Result<String> {
    let kid = value
        .as_object()
        .and_then(|object| object.get::<_, Option<String>>("kid").ok().flatten());
    kid.ok_or_else(|| type_error(ctx, "key must be a key descriptor with a kid"))
}
