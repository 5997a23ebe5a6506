//! Bridge from the script's final promise to the host driver.
//!
//! Each run opens a slot holding a run token and two single-slot channels.
//! Script signals completion through `resultChannel(run, value)` or
//! `errorChannel(run, error)`; signals carrying a stale token, or arriving
//! after the slot has already been filled, are dropped.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crossbeam_channel::{bounded, Receiver, Sender};
use rquickjs::{Ctx, Function, Object, Value};
use scriptbridge_core::OperationError;
use serde_json::json;

use crate::convert::{describe_exception, js_to_json, rejection_to_json};

/// Receiving end of one run.
pub(crate) struct Run {
    pub token: i32,
    pub result: Receiver<serde_json::Value>,
    pub error: Receiver<serde_json::Value>,
}

struct RunSlot {
    token: i32,
    result: Sender<serde_json::Value>,
    error: Sender<serde_json::Value>,
}

#[derive(Default)]
pub(crate) struct PromiseBridge {
    slot: RefCell<Option<RunSlot>>,
    next_token: Cell<i32>,
}

impl PromiseBridge {
    /// Open a new run, replacing any previous one.
    pub fn open(&self) -> Run {
        let token = self.next_token.get().wrapping_add(1);
        self.next_token.set(token);

        let (result_tx, result_rx) = bounded(1);
        let (error_tx, error_rx) = bounded(1);
        *self.slot.borrow_mut() = Some(RunSlot {
            token,
            result: result_tx,
            error: error_tx,
        });
        Run {
            token,
            result: result_rx,
            error: error_rx,
        }
    }

    /// Close run `token` if it is still the current one.
    pub fn close(&self, token: i32) {
        let mut slot = self.slot.borrow_mut();
        if slot.as_ref().is_some_and(|s| s.token == token) {
            *slot = None;
        }
    }

    fn signal(&self, token: i32, value: serde_json::Value, is_error: bool) -> bool {
        let slot = self.slot.borrow();
        let Some(slot) = slot.as_ref().filter(|s| s.token == token) else {
            tracing::debug!(token, "ignoring signal for a finished run");
            return false;
        };
        let sender = if is_error { &slot.error } else { &slot.result };
        sender.try_send(value).is_ok()
    }

    /// Install `resultChannel` and `errorChannel` on `host`.
    pub fn install<'js>(self: &Rc<Self>, ctx: &Ctx<'js>, host: &Object<'js>) -> rquickjs::Result<()> {
        let bridge = Rc::clone(self);
        host.set(
            "resultChannel",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, token: i32, value: Value<'js>| -> bool {
                    match js_to_json(&ctx, value) {
                        Ok(value) => bridge.signal(token, value, false),
                        Err(error) => {
                            let message = match error {
                                rquickjs::Error::Exception => describe_exception(&ctx),
                                other => other.to_string(),
                            };
                            tracing::debug!(token, %message, "result is not representable as JSON");
                            bridge.signal(token, unrepresentable(&message), true)
                        }
                    }
                },
            )?,
        )?;

        let bridge = Rc::clone(self);
        host.set(
            "errorChannel",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, token: i32, error: Value<'js>| -> bool {
                    let value = rejection_to_json(&ctx, error);
                    bridge.signal(token, value, true)
                },
            )?,
        )?;
        Ok(())
    }
}

/// Rejection value for a result that could not be converted.
fn unrepresentable(message: &str) -> serde_json::Value {
    let error = OperationError::serialization(message);
    json!({ "name": error.name(), "message": error.message() })
}

/// Wrap `source` so its `res` binding reports to run `token`.
pub(crate) fn wrap_source(source: &str, token: i32) -> String {
    format!(
        "{{\n{source}\n;Promise.resolve(res).then(\
         (v) => resultChannel({token}, v), \
         (e) => errorChannel({token}, e))\
         .catch((e) => errorChannel({token}, e));\n}}"
    )
}
