//! Values that cross from a worker back to the interpreter thread.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use serde_json::Value;

use crate::error::OperationError;
use crate::id::CorrelationId;
use crate::resource::{ResourceStore, StoredResource};

/// Identifies one async operation within an [`Executor`](crate::Executor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub(crate) u64);

impl OperationId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Shared flag raised when the run owning an operation is abandoned.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Script-facing result value of an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    /// Delivered to script as an `ArrayBuffer`.
    Bytes(Vec<u8>),
}

/// Successful result of a worker, with resources waiting to be stored.
///
/// Staged resources are only inserted into the store when the completion is
/// committed on the interpreter thread. A completion that is dropped instead
/// releases them.
#[derive(Debug)]
pub struct Completion {
    pub payload: Payload,
    pub resources: Vec<(CorrelationId, StoredResource)>,
}

impl Completion {
    pub fn json(value: Value) -> Self {
        Self {
            payload: Payload::Json(value),
            resources: Vec::new(),
        }
    }

    pub fn bytes(bytes: Vec<u8>) -> Self {
        Self {
            payload: Payload::Bytes(bytes),
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, id: CorrelationId, resource: impl Into<StoredResource>) -> Self {
        self.resources.push((id, resource.into()));
        self
    }

    /// Move staged resources into `store` and hand back the payload.
    pub fn commit(self, store: &ResourceStore) -> Payload {
        for (id, resource) in self.resources {
            store.put(id, resource);
        }
        self.payload
    }

    /// Release staged resources without storing them.
    pub fn discard(self) {
        for (_, resource) in self.resources {
            resource.release();
        }
    }
}

/// Exactly-once outcome of an operation, sent to the interpreter thread.
#[derive(Debug)]
pub struct Settlement {
    pub id: OperationId,
    pub operation: &'static str,
    pub outcome: Result<Completion, OperationError>,
}

/// Write end of an operation's settlement.
///
/// Consumed by [`Settler::settle`]. If it is dropped first, because the worker
/// returned early or panicked, it settles the operation as abandoned.
pub struct Settler {
    id: OperationId,
    operation: &'static str,
    sender: Option<Sender<Settlement>>,
}

impl Settler {
    pub(crate) fn new(id: OperationId, operation: &'static str, sender: Sender<Settlement>) -> Self {
        Self {
            id,
            operation,
            sender: Some(sender),
        }
    }

    pub fn settle(mut self, outcome: Result<Completion, OperationError>) {
        self.send(outcome);
    }

    fn send(&mut self, outcome: Result<Completion, OperationError>) {
        let Some(sender) = self.sender.take() else {
            return;
        };
        let settlement = Settlement {
            id: self.id,
            operation: self.operation,
            outcome,
        };
        if let Err(unsent) = sender.send(settlement) {
            // Interpreter side is gone.
            if let Ok(completion) = unsent.into_inner().outcome {
                completion.discard();
            }
        }
    }
}

impl Drop for Settler {
    fn drop(&mut self) {
        if self.sender.is_some() {
            tracing::warn!(
                operation = self.operation,
                op_id = %self.id,
                "worker ended without settling"
            );
            self.send(Err(OperationError::Abandoned {
                operation: self.operation.to_string(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::IdGenerator;
    use crate::resource::ByteStream;
    use serde_json::json;

    #[test]
    fn settle_sends_once() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let settler = Settler::new(OperationId(1), "test", tx);
        settler.settle(Ok(Completion::json(json!(1))));

        let settlement = rx.try_recv().unwrap();
        assert_eq!(settlement.id, OperationId(1));
        assert_eq!(settlement.outcome.unwrap().payload, Payload::Json(json!(1)));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn dropped_settler_reports_abandoned() {
        let (tx, rx) = crossbeam_channel::unbounded();
        drop(Settler::new(OperationId(2), "fetch", tx));

        let settlement = rx.try_recv().unwrap();
        assert_eq!(
            settlement.outcome.unwrap_err(),
            OperationError::Abandoned {
                operation: "fetch".into()
            }
        );
    }

    #[test]
    fn commit_stores_and_discard_releases() {
        let store = ResourceStore::new();
        let id = IdGenerator::global().generate();
        let completion = Completion::json(json!({"body": id.as_str()}))
            .with_resource(id.clone(), ByteStream::from_bytes("x"));
        completion.commit(&store);
        assert!(store.contains(&id));

        let stream = ByteStream::from_bytes("y");
        Completion::json(json!(null))
            .with_resource(IdGenerator::global().generate(), stream.clone())
            .discard();
        assert!(stream.is_closed());
    }

    #[test]
    fn cancel_token_is_shared() {
        let token = CancelToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }
}
