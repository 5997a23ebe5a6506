//! The script runtime and its host-side driver loop.

use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use rquickjs::{Context, Ctx, Function, Object, Runtime, Value};
use scriptbridge_core::{
    ByteStream, CancelToken, CorrelationId, Executor, IdGenerator, OperationError, ResourceStore,
    Settlement,
};
use scriptbridge_crypto::SubtleCrypto;
use scriptbridge_fetch::{Fetcher, HttpExecutor, LocalHandler};

use crate::bridge::{wrap_source, PromiseBridge, Run};
use crate::config::RuntimeConfig;
use crate::convert::{describe_exception, js_to_json, operation_error_to_js, payload_to_js};
use crate::error::{Result, RuntimeError};
use crate::host::{self, Host};

/// One step of the driver loop.
enum Step {
    Resolved(Option<serde_json::Value>),
    Rejected(Option<serde_json::Value>),
    Settled(Option<Settlement>),
    Deadline,
}

/// A QuickJS interpreter with the host surface installed.
///
/// All script execution happens on the thread that owns the runtime. Host
/// operations run on worker threads and are delivered back by [`pump`],
/// [`run`] or [`run_promise`].
///
/// [`pump`]: ScriptRuntime::pump
/// [`run`]: ScriptRuntime::run
/// [`run_promise`]: ScriptRuntime::run_promise
pub struct ScriptRuntime {
    context: Context,
    runtime: Runtime,
    host: Rc<Host>,
    bridge: Rc<PromiseBridge>,
    config: RuntimeConfig,
}

impl ScriptRuntime {
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Host-side resources: key material and streamed bodies.
    pub fn resources(&self) -> &ResourceStore {
        &self.host.store
    }

    pub fn ids(&self) -> &Arc<IdGenerator> {
        self.host.executor.ids()
    }

    /// Operations spawned but not yet delivered.
    pub fn pending_operations(&self) -> usize {
        self.host.executor.pending_count()
    }

    /// Remove a streamed response body from the store and hand it to the host.
    pub fn take_body(&self, id: &CorrelationId) -> Option<ByteStream> {
        let stream = self.host.store.get(id)?.as_stream()?.clone();
        self.host.store.remove(id);
        Some(stream)
    }

    /// Evaluate `source` and return its completion value as JSON.
    ///
    /// Pending jobs are run afterwards, but settlements are not waited for.
    pub fn eval(&self, source: &str) -> Result<serde_json::Value> {
        let value = self.context.with(|ctx| {
            let value = script_result(&ctx, ctx.eval::<Value, _>(source))?;
            script_result(&ctx, js_to_json(&ctx, value))
        })?;
        self.drain_jobs();
        Ok(value)
    }

    /// Deliver every settlement that has already arrived.
    ///
    /// Returns the number of settlements delivered.
    pub fn pump(&self) -> Result<usize> {
        self.drain_jobs();
        let mut delivered = 0;
        while let Some(settlement) = self.host.executor.try_next() {
            self.deliver(settlement)?;
            self.drain_jobs();
            delivered += 1;
        }
        Ok(delivered)
    }

    /// [`run_promise`](Self::run_promise) with the configured default timeout.
    pub fn run(&self, source: &str) -> Result<serde_json::Value> {
        self.run_promise(source, self.config.default_timeout)
    }

    /// Evaluate `source`, which must bind `res`, and wait for `res` to settle.
    ///
    /// `res` may be a promise or a plain value. Settlements are delivered as
    /// they arrive until the result or error signal fires or `timeout`
    /// elapses. On timeout, operations started by this run are cancelled and
    /// their late settlements discarded. Operations spawned after the run
    /// returns start under a fresh token.
    pub fn run_promise(&self, source: &str, timeout: Duration) -> Result<serde_json::Value> {
        let started = Instant::now();
        let token = CancelToken::new();
        self.host.executor.set_cancel_token(token.clone());

        let run = self.bridge.open();
        tracing::debug!(run = run.token, ?timeout, "run started");
        let outcome = self.drive(&run, source, started, timeout);
        self.bridge.close(run.token);

        if let Err(RuntimeError::Timeout { elapsed }) = &outcome {
            token.cancel();
            tracing::warn!(
                run = run.token,
                ?elapsed,
                pending = self.host.executor.pending_count(),
                "script did not settle before the deadline"
            );
        }
        self.host.executor.set_cancel_token(CancelToken::new());
        outcome
    }

    fn drive(&self, run: &Run, source: &str, started: Instant, timeout: Duration) -> Result<serde_json::Value> {
        let deadline: Receiver<Instant> = crossbeam_channel::at(started + timeout);
        self.context.with(|ctx| {
            script_result(&ctx, ctx.eval::<(), _>(wrap_source(source, run.token)))
        })?;

        loop {
            self.drain_jobs();
            if let Ok(value) = run.result.try_recv() {
                return Ok(value);
            }
            if let Ok(value) = run.error.try_recv() {
                return Err(RuntimeError::Rejected { value });
            }

            let step = crossbeam_channel::select! {
                recv(run.result) -> value => Step::Resolved(value.ok()),
                recv(run.error) -> value => Step::Rejected(value.ok()),
                recv(self.host.executor.settlements()) -> settlement => Step::Settled(settlement.ok()),
                recv(deadline) -> _ => Step::Deadline,
            };

            match step {
                Step::Resolved(Some(value)) => return Ok(value),
                Step::Rejected(Some(value)) => return Err(RuntimeError::Rejected { value }),
                Step::Settled(Some(settlement)) => self.deliver(settlement)?,
                Step::Deadline => {
                    return Err(RuntimeError::Timeout {
                        elapsed: started.elapsed(),
                    })
                }
                Step::Resolved(None) | Step::Rejected(None) | Step::Settled(None) => {
                    return Err(RuntimeError::Disconnected)
                }
            }
        }
    }

    /// Resolve or reject the promise waiting on `settlement`.
    ///
    /// Resources travelling with a success are committed to the store only
    /// here, and only for operations whose run is still live.
    fn deliver(&self, settlement: Settlement) -> Result<()> {
        let Settlement { id, operation, outcome } = settlement;

        let Some(pending) = self.host.executor.claim(id) else {
            if let Ok(completion) = outcome {
                completion.discard();
            }
            return Ok(());
        };

        let outcome = if pending.is_abandoned() {
            tracing::debug!(op_id = %id, operation, "discarding settlement of a cancelled run");
            if let Ok(completion) = outcome {
                completion.discard();
            }
            Err(OperationError::Cancelled {
                operation: operation.to_string(),
            })
        } else {
            outcome
        };

        self.context.with(|ctx| {
            let settle: Function = ctx.globals().get::<_, Object>("__scriptbridge")?.get("settle")?;
            let (ok, value) = match outcome {
                Ok(completion) => match payload_to_js(&ctx, &completion.payload) {
                    Ok(value) => {
                        completion.commit(&self.host.store);
                        (true, value)
                    }
                    Err(error) => {
                        completion.discard();
                        let error = OperationError::serialization(error.to_string());
                        (false, operation_error_to_js(&ctx, &error)?)
                    }
                },
                Err(error) => (false, operation_error_to_js(&ctx, &error)?),
            };

            let first = script_result(&ctx, settle.call::<_, bool>((id.to_string(), ok, value)))?;
            if !first {
                tracing::debug!(op_id = %id, operation, "operation was already settled");
            }
            Ok(())
        })
    }

    fn drain_jobs(&self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => {}
                Ok(false) => return,
                Err(failed) => {
                    let message = failed.0.with(|ctx| describe_exception(&ctx));
                    tracing::warn!(%message, "pending job threw");
                }
            }
        }
    }
}

impl Drop for ScriptRuntime {
    fn drop(&mut self) {
        self.host.executor.cancel_current();
    }
}

/// Map a thrown exception to [`RuntimeError::Script`].
fn script_result<T>(ctx: &Ctx<'_>, result: rquickjs::Result<T>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(rquickjs::Error::Exception) => Err(RuntimeError::Script {
            message: describe_exception(ctx),
        }),
        Err(error) => Err(error.into()),
    }
}

/// Builder for [`ScriptRuntime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    local: Option<Arc<dyn LocalHandler>>,
    http: Option<Arc<dyn HttpExecutor>>,
    ids: Option<Arc<IdGenerator>>,
    store: Option<ResourceStore>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Serve matching `fetch` calls in-process instead of over the network.
    pub fn local_handler(mut self, handler: impl LocalHandler + 'static) -> Self {
        self.local = Some(Arc::new(handler));
        self
    }

    pub fn shared_local_handler(mut self, handler: Arc<dyn LocalHandler>) -> Self {
        self.local = Some(handler);
        self
    }

    /// Replace the network transport.
    pub fn http_executor(mut self, executor: Arc<dyn HttpExecutor>) -> Self {
        self.http = Some(executor);
        self
    }

    pub fn id_generator(mut self, ids: Arc<IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn resource_store(mut self, store: ResourceStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<ScriptRuntime> {
        let ids = self.ids.unwrap_or_else(|| Arc::new(IdGenerator::new()));
        let store = self.store.unwrap_or_default();

        let mut fetcher = Fetcher::builder().config(self.config.fetch.clone());
        if let Some(http) = self.http {
            fetcher = fetcher.executor(http);
        }
        if let Some(local) = self.local {
            fetcher = fetcher.shared_local_handler(local);
        }
        let fetcher = fetcher.build()?;

        let runtime = Runtime::new()?;
        if let Some(limit) = self.config.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(size) = self.config.max_stack_size {
            runtime.set_max_stack_size(size);
        }
        let context = Context::full(&runtime)?;

        let host = Rc::new(Host {
            executor: Executor::new(Arc::clone(&ids)),
            store: store.clone(),
            fetcher,
            subtle: SubtleCrypto::new(store, ids),
        });
        let bridge = Rc::new(PromiseBridge::default());
        context.with(|ctx| script_result(&ctx, host::install(&ctx, &host, &bridge)))?;

        tracing::debug!(
            timeout = ?self.config.default_timeout,
            memory_limit = ?self.config.memory_limit,
            "script runtime ready"
        );
        Ok(ScriptRuntime {
            context,
            runtime,
            host,
            bridge,
            config: self.config,
        })
    }
}
