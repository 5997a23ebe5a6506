//! One worker thread per async operation.
//!
//! The interpreter thread calls [`Executor::spawn`] from inside a host
//! function and gets an [`OperationId`] back immediately. The worker runs the
//! blocking closure and settles through a [`Settler`]; settlements queue on an
//! unbounded channel until the interpreter thread pumps them with
//! [`Executor::try_next`] or selects on [`Executor::settlements`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::deferred::{CancelToken, Completion, OperationId, Settlement, Settler};
use crate::error::OperationError;
use crate::id::{CorrelationId, IdGenerator};

/// Host-side bookkeeping for one in-flight operation.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub id: OperationId,
    pub operation: &'static str,
    pub started_at: Instant,
    pub cancel: CancelToken,
}

impl PendingOperation {
    /// The run that started this operation was abandoned.
    pub fn is_abandoned(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// What a worker can see about its own operation.
pub struct WorkerContext {
    id: OperationId,
    operation: &'static str,
    cancel: CancelToken,
    ids: Arc<IdGenerator>,
}

impl WorkerContext {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// `Err(Cancelled)` once the owning run has been abandoned.
    pub fn ensure_live(&self) -> Result<(), OperationError> {
        if self.is_cancelled() {
            return Err(OperationError::Cancelled {
                operation: self.operation.to_string(),
            });
        }
        Ok(())
    }

    /// Fresh id for a resource this worker stages.
    pub fn generate_id(&self) -> CorrelationId {
        self.ids.generate()
    }
}

pub struct Executor {
    ids: Arc<IdGenerator>,
    sender: Sender<Settlement>,
    receiver: Receiver<Settlement>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<OperationId, PendingOperation>>,
    cancel: Mutex<CancelToken>,
}

impl Executor {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            ids,
            sender,
            receiver,
            next_id: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            cancel: Mutex::new(CancelToken::new()),
        }
    }

    pub fn ids(&self) -> &Arc<IdGenerator> {
        &self.ids
    }

    /// Start `work` on its own thread.
    ///
    /// The operation inherits the current cancellation token. A worker whose
    /// token is already raised settles as cancelled without running `work`.
    pub fn spawn<F>(&self, operation: &'static str, work: F) -> Result<OperationId, OperationError>
    where
        F: FnOnce(&WorkerContext) -> Result<Completion, OperationError> + Send + 'static,
    {
        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let cancel = self.cancel.lock().clone();

        self.pending.lock().insert(
            id,
            PendingOperation {
                id,
                operation,
                started_at: Instant::now(),
                cancel: cancel.clone(),
            },
        );

        let settler = Settler::new(id, operation, self.sender.clone());
        let ctx = WorkerContext {
            id,
            operation,
            cancel,
            ids: Arc::clone(&self.ids),
        };

        let spawned = thread::Builder::new()
            .name(format!("scriptbridge-{operation}"))
            .spawn(move || {
                if ctx.is_cancelled() {
                    settler.settle(Err(OperationError::Cancelled {
                        operation: operation.to_string(),
                    }));
                    return;
                }
                let outcome = work(&ctx);
                settler.settle(outcome);
            });

        match spawned {
            Ok(_) => {
                tracing::debug!(operation, op_id = %id, "spawned worker");
                Ok(id)
            }
            Err(error) => {
                // The dropped settler still queues an abandonment; with the
                // pending entry gone it is ignored on arrival.
                self.pending.lock().remove(&id);
                tracing::error!(operation, %error, "failed to spawn worker");
                Err(OperationError::Abandoned {
                    operation: operation.to_string(),
                })
            }
        }
    }

    /// Replace the token inherited by operations spawned from now on.
    pub fn set_cancel_token(&self, token: CancelToken) {
        *self.cancel.lock() = token;
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.lock().clone()
    }

    /// Raise the current token, abandoning every operation that shares it.
    pub fn cancel_current(&self) {
        self.cancel.lock().cancel();
    }

    /// Receiving end of the settlement channel, for use in `select!`.
    pub fn settlements(&self) -> &Receiver<Settlement> {
        &self.receiver
    }

    pub fn try_next(&self) -> Option<Settlement> {
        self.receiver.try_recv().ok()
    }

    /// Take the bookkeeping for `id` out of the pending table.
    ///
    /// Returns `None` when the operation was already claimed, so a second
    /// settlement for the same id can be ignored.
    pub fn claim(&self, id: OperationId) -> Option<PendingOperation> {
        let claimed = self.pending.lock().remove(&id);
        if claimed.is_none() {
            tracing::debug!(op_id = %id, "ignoring settlement for unknown operation");
        }
        claimed
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_pending(&self, id: OperationId) -> bool {
        self.pending.lock().contains_key(&id)
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(Arc::new(IdGenerator::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Payload;
    use serde_json::json;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn worker_settles_through_channel() {
        let executor = Executor::default();
        let id = executor
            .spawn("add", |_| Ok(Completion::json(json!(1 + 2))))
            .unwrap();
        assert!(executor.is_pending(id));

        let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
        assert_eq!(settlement.id, id);
        assert_eq!(settlement.operation, "add");

        let pending = executor.claim(settlement.id).unwrap();
        assert!(!pending.is_abandoned());
        assert_eq!(settlement.outcome.unwrap().payload, Payload::Json(json!(3)));
        assert_eq!(executor.pending_count(), 0);
    }

    #[test]
    fn second_claim_is_ignored() {
        let executor = Executor::default();
        let id = executor.spawn("noop", |_| Ok(Completion::json(json!(null)))).unwrap();
        executor.settlements().recv_timeout(WAIT).unwrap();

        assert!(executor.claim(id).is_some());
        assert!(executor.claim(id).is_none());
    }

    #[test]
    fn panicking_worker_is_abandoned() {
        let executor = Executor::default();
        executor
            .spawn("explode", |_| -> Result<Completion, OperationError> {
                panic!("worker blew up")
            })
            .unwrap();

        let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
        assert_eq!(
            settlement.outcome.unwrap_err(),
            OperationError::Abandoned {
                operation: "explode".into()
            }
        );
    }

    #[test]
    fn failures_are_delivered_as_is() {
        let executor = Executor::default();
        executor
            .spawn("lookup", |_| Err(OperationError::key("no such kid")))
            .unwrap();

        let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
        assert_eq!(settlement.outcome.unwrap_err(), OperationError::key("no such kid"));
    }

    #[test]
    fn cancelled_token_skips_work() {
        let executor = Executor::default();
        executor.cancel_current();

        let id = executor
            .spawn("never", |_| -> Result<Completion, OperationError> {
                unreachable!("work must not run")
            })
            .unwrap();

        let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
        assert!(matches!(settlement.outcome, Err(OperationError::Cancelled { .. })));
        assert!(executor.claim(id).unwrap().is_abandoned());
    }

    #[test]
    fn new_token_only_affects_later_operations() {
        let executor = Executor::default();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        let first = executor
            .spawn("slow", move |ctx| {
                let _ = release_rx.recv();
                Ok(Completion::json(json!(ctx.is_cancelled())))
            })
            .unwrap();

        executor.cancel_current();
        executor.set_cancel_token(CancelToken::new());
        let second = executor.spawn("fast", |_| Ok(Completion::json(json!("ok")))).unwrap();

        let _ = release_tx.send(());

        let mut seen = Vec::new();
        for _ in 0..2 {
            let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
            let pending = executor.claim(settlement.id).unwrap();
            seen.push((settlement.id, pending.is_abandoned()));
        }
        seen.sort();
        assert_eq!(seen, vec![(first, true), (second, false)]);
    }

    #[test]
    fn workers_see_cancellation_raised_mid_flight() {
        let executor = Executor::default();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        executor
            .spawn("keygen", move |ctx| {
                ctx.ensure_live()?;
                let _ = release_rx.recv();
                ctx.ensure_live()?;
                Ok(Completion::json(json!("staged")))
            })
            .unwrap();

        executor.cancel_current();
        let _ = release_tx.send(());

        let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
        assert_eq!(
            settlement.outcome.unwrap_err(),
            OperationError::Cancelled {
                operation: "keygen".into()
            }
        );
    }

    #[test]
    fn workers_generate_ids_from_executor_generator() {
        let executor = Executor::default();
        executor
            .spawn("stage", |ctx| Ok(Completion::json(json!(ctx.generate_id().as_str()))))
            .unwrap();

        let settlement = executor.settlements().recv_timeout(WAIT).unwrap();
        let Payload::Json(value) = settlement.outcome.unwrap().payload else {
            panic!("expected json payload");
        };
        assert!(CorrelationId::is_correlation_id(value.as_str().unwrap()));
    }
}
