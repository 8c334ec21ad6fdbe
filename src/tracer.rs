//! The layer lifecycle state machine.
//!
//! A [`TracerProvider`] is the shared entry point: it owns the injected
//! sampling engine, reporter, id generator and configuration, and mints one
//! [`Tracer`] per logical unit of work (thread, task, request). The tracer
//! owns that unit's [`ContextStore`] and the strict stack of entered layers,
//! and enforces the `entry -> (info|error)* -> exit` ordering per layer
//! invocation.
//!
//! Ordering mistakes by instrumentation code (exit without enter, double
//! enter) are reported through internal logging and a counter, never raised
//! into the host application.

use crate::common::KeyValue;
use crate::config::{Config, TracingMode};
use crate::context::ContextStore;
use crate::event::{Event, Label};
use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::metadata::{Metadata, OpId, SampleSource};
use crate::reporter::{NoopReporter, Reporter};
use crate::sampler::{Sampler, SamplingDecision, SamplingEngine};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

#[derive(Debug)]
struct ProviderInner {
    /// Explicitly injected engine; `None` means "derive from config", which
    /// keeps runtime reconfiguration effective.
    sampler: Option<Box<dyn SamplingEngine>>,
    reporter: Box<dyn Reporter>,
    id_generator: Box<dyn IdGenerator>,
    config: RwLock<Config>,
    dropped_events: AtomicU64,
    ordering_violations: AtomicU64,
}

/// Shared handle to the tracing configuration and collaborators.
///
/// Cheap to clone; all clones observe the same configuration and counters.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<ProviderInner>,
}

impl Default for TracerProvider {
    fn default() -> Self {
        TracerProvider::builder().build()
    }
}

impl TracerProvider {
    /// Create a builder with default collaborators.
    pub fn builder() -> TracerProviderBuilder {
        TracerProviderBuilder::default()
    }

    /// Create a [`Tracer`] for one logical unit of work.
    pub fn tracer(&self) -> Tracer {
        Tracer {
            provider: self.clone(),
            context: ContextStore::new(),
            stack: Vec::new(),
            last_op: None,
        }
    }

    /// A snapshot of the current configuration.
    pub fn config(&self) -> Config {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the tracing mode. Affects traces started afterwards; running
    /// traces keep the decision made at their start.
    pub fn set_tracing_mode(&self, mode: TracingMode) {
        self.inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .tracing_mode = mode;
    }

    /// Change the sampling ratio for locally-started traces. Values outside
    /// `0.0..=1.0` are clamped.
    pub fn set_sample_ratio(&self, ratio: f64) {
        self.inner
            .config
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .sample_ratio = ratio.clamp(0.0, 1.0);
    }

    /// Number of events lost to reporter failures.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }

    /// Number of caller ordering mistakes observed (exit without enter,
    /// double enter, logs outside an invocation).
    pub fn ordering_violations(&self) -> u64 {
        self.inner.ordering_violations.load(Ordering::Relaxed)
    }

    fn sampling_decision(&self, layer: &str, inbound: Option<&Metadata>) -> SamplingDecision {
        let result = match &self.inner.sampler {
            Some(engine) => engine.should_trace(layer, inbound),
            None => Sampler::from_config(&self.config()).should_trace(layer, inbound),
        };

        // An engine that cannot decide records nothing; tracing stays
        // best-effort.
        result.unwrap_or_else(|err| {
            tracing::warn!(layer = %layer, error = %err, "sampling engine failed; trace not sampled");
            SamplingDecision::drop(SampleSource::Default)
        })
    }

    fn id_generator(&self) -> &dyn IdGenerator {
        self.inner.id_generator.as_ref()
    }

    fn new_op_id(&self) -> OpId {
        self.inner.id_generator.new_op_id()
    }

    fn report(&self, event: &Event) {
        let timeout = self.config().send_timeout;
        if let Err(err) = self.inner.reporter.send(event, timeout) {
            self.inner.dropped_events.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                layer = event.layer(),
                label = event.label().as_str(),
                error = %err,
                "failed to report event"
            );
        }
    }

    fn ordering_violation(&self, layer: &str, reason: &'static str) {
        self.inner
            .ordering_violations
            .fetch_add(1, Ordering::Relaxed);
        tracing::warn!(layer = %layer, reason, "instrumentation ordering violation; event dropped");
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct TracerProviderBuilder {
    sampler: Option<Box<dyn SamplingEngine>>,
    reporter: Option<Box<dyn Reporter>>,
    id_generator: Option<Box<dyn IdGenerator>>,
    config: Option<Config>,
}

impl TracerProviderBuilder {
    /// Inject a sampling engine, replacing the config-derived sampler.
    pub fn with_sampler<S: SamplingEngine + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Some(Box::new(sampler));
        self
    }

    /// Set the reporter events are delivered to. Defaults to
    /// [`NoopReporter`].
    pub fn with_reporter<R: Reporter + 'static>(mut self, reporter: R) -> Self {
        self.reporter = Some(Box::new(reporter));
        self
    }

    /// Set the id generator. Defaults to [`RandomIdGenerator`].
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, generator: G) -> Self {
        self.id_generator = Some(Box::new(generator));
        self
    }

    /// Set the configuration. Defaults to [`Config::default`], which reads
    /// the `XTRACE_*` environment variables.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the provider.
    pub fn build(self) -> TracerProvider {
        TracerProvider {
            inner: Arc::new(ProviderInner {
                sampler: self.sampler,
                reporter: self.reporter.unwrap_or_else(|| Box::new(NoopReporter::new())),
                id_generator: self
                    .id_generator
                    .unwrap_or_else(|| Box::<RandomIdGenerator>::default()),
                config: RwLock::new(self.config.unwrap_or_default()),
                dropped_events: AtomicU64::new(0),
                ordering_violations: AtomicU64::new(0),
            }),
        }
    }
}

/// Per-unit-of-work tracer enforcing the layer lifecycle.
///
/// Not shared across concurrent requests; each concurrent execution context
/// gets its own tracer from [`TracerProvider::tracer`].
///
/// If an instrumented operation is aborted before its `exit`, the invocation
/// stays entered; nothing closes it automatically. Use [`Tracer::in_layer`]
/// to guarantee the exit on every path.
#[derive(Debug)]
pub struct Tracer {
    provider: TracerProvider,
    context: ContextStore,
    stack: Vec<String>,
    last_op: Option<OpId>,
}

impl Tracer {
    /// Begin a trace and emit the `entry` event of its root layer.
    ///
    /// `inbound` is the serialized token from an upstream caller, typically
    /// the `X-Trace` request header. A malformed or all-zero token is
    /// treated as absent and a new trace is started; bad input from a
    /// caller never interrupts the host application. The sampling engine is
    /// consulted exactly once, here; the decision holds for the whole trace.
    ///
    /// Returns `true` if the trace is sampled.
    pub fn start_trace(&mut self, layer: &str, inbound: Option<&str>, fields: Vec<KeyValue>) -> bool {
        if self.context.current().is_some() || !self.stack.is_empty() {
            self.provider
                .ordering_violation(layer, "start_trace called while a trace is active");
            return self.is_tracing();
        }

        let inbound_md = inbound.and_then(|raw| match Metadata::from_hex(raw.trim()) {
            Ok(md) if md.is_valid() => Some(md),
            Ok(_) => {
                tracing::debug!(layer = %layer, "inbound context has all-zero identifiers; starting a new trace");
                None
            }
            Err(err) => {
                tracing::debug!(layer = %layer, error = %err, "malformed inbound context; starting a new trace");
                None
            }
        });

        let decision = self.provider.sampling_decision(layer, inbound_md.as_ref());
        let metadata = match inbound_md {
            Some(upstream) => upstream.with_sampling(&decision),
            None => Metadata::start_new(&decision, self.provider.id_generator()),
        };

        // A continued trace's root entry edges from the upstream op id; a
        // locally started trace's root entry has no edge.
        self.last_op = inbound_md.map(|md| md.op_id());
        self.context.set(metadata);
        self.stack.push(layer.to_owned());
        self.emit(layer, Label::Entry, fields);
        self.is_tracing()
    }

    /// Emit the `exit` event of the root layer, clear the context and
    /// return the serialized token for the response header.
    ///
    /// Layers still entered at this point are discarded with a warning;
    /// their invocations were never exited and the trace is incomplete.
    pub fn end_trace(&mut self, layer: &str, fields: Vec<KeyValue>) -> Option<String> {
        if self.context.current().is_none() {
            self.provider
                .ordering_violation(layer, "end_trace called with no active trace");
            return None;
        }

        self.exit(layer, fields);
        if !self.stack.is_empty() {
            tracing::warn!(
                layer = %layer,
                dangling = self.stack.len(),
                "trace ended with layers still entered"
            );
            self.stack.clear();
        }

        let token = self
            .context
            .current()
            .filter(|md| md.is_valid())
            .map(Metadata::to_hex_string);
        self.context.clear();
        self.last_op = None;
        token
    }

    /// Enter a nested layer, emitting its `entry` event.
    ///
    /// Layers form a strict stack: entering a layer that is already entered
    /// is an ordering violation and a no-op.
    pub fn enter(&mut self, layer: &str, fields: Vec<KeyValue>) {
        if self.context.current().is_none() {
            self.provider
                .ordering_violation(layer, "enter called with no active trace");
            return;
        }
        if self.stack.iter().any(|frame| frame == layer) {
            self.provider
                .ordering_violation(layer, "enter called twice without an intervening exit");
            return;
        }
        self.stack.push(layer.to_owned());
        self.emit(layer, Label::Entry, fields);
    }

    /// Exit the most recently entered layer, emitting its `exit` event.
    ///
    /// Only the top of the layer stack may exit; anything else is an
    /// ordering violation and a no-op.
    pub fn exit(&mut self, layer: &str, fields: Vec<KeyValue>) {
        match self.stack.last() {
            Some(top) if top == layer => {
                self.emit(layer, Label::Exit, fields);
                self.stack.pop();
            }
            Some(_) => self
                .provider
                .ordering_violation(layer, "exit does not match the most recently entered layer"),
            None => self
                .provider
                .ordering_violation(layer, "exit called without a matching enter"),
        }
    }

    /// Record an `info` or `error` event for an entered layer, chained from
    /// the most recent event of the trace.
    pub fn log(&mut self, layer: &str, label: Label, fields: Vec<KeyValue>) {
        if !matches!(label, Label::Info | Label::Error) {
            self.provider
                .ordering_violation(layer, "entry and exit events must go through enter/exit");
            return;
        }
        if !self.stack.iter().any(|frame| frame == layer) {
            self.provider
                .ordering_violation(layer, "log called for a layer that is not entered");
            return;
        }
        self.emit(layer, label, fields);
    }

    /// Record an `info` event for an entered layer.
    pub fn info(&mut self, layer: &str, fields: Vec<KeyValue>) {
        self.log(layer, Label::Info, fields);
    }

    /// Record an `error` event for an entered layer.
    ///
    /// The error does not terminate the invocation; the matching exit must
    /// still be issued.
    pub fn error(&mut self, layer: &str, error_class: &str, message: &str) {
        self.log(
            layer,
            Label::Error,
            vec![
                KeyValue::new("ErrorClass", error_class.to_owned()),
                KeyValue::new("ErrorMsg", message.to_owned()),
            ],
        );
    }

    /// Run `f` bracketed by `enter`/`exit` of the given layer.
    ///
    /// The exit is emitted on every path out of `f`, including early
    /// returns. This is the recommended way to instrument operations whose
    /// control flow may leave before an explicit exit call.
    pub fn in_layer<T>(
        &mut self,
        layer: &str,
        fields: Vec<KeyValue>,
        f: impl FnOnce(&mut Tracer) -> T,
    ) -> T {
        self.enter(layer, fields);
        let result = f(self);
        self.exit(layer, Vec::new());
        result
    }

    /// The metadata currently in effect, if a trace is active.
    pub fn current_metadata(&self) -> Option<&Metadata> {
        self.context.current()
    }

    /// The serialized token for outbound propagation, if a trace is active.
    pub fn serialized_context(&self) -> Option<String> {
        self.context
            .current()
            .filter(|md| md.is_valid())
            .map(Metadata::to_hex_string)
    }

    /// Returns `true` if a valid, sampled trace is active.
    pub fn is_tracing(&self) -> bool {
        self.context
            .current()
            .map(|md| md.is_valid() && md.is_sampled())
            .unwrap_or(false)
    }

    /// The provider this tracer was created from.
    pub fn provider(&self) -> &TracerProvider {
        &self.provider
    }

    /// Build and report one event, advancing the causal chain: the event
    /// gets a fresh op id, edges from the previous one, and becomes the new
    /// chain head in the context store.
    fn emit(&mut self, layer: &str, label: Label, fields: Vec<KeyValue>) {
        let Some(current) = self.context.current().copied() else {
            return;
        };
        if !current.is_sampled() {
            // Unsampled traces propagate context but record nothing.
            return;
        }

        let op_id = self.provider.new_op_id();
        let stamped = current.derive_child(op_id);
        let edge = self.last_op;
        self.context.set(stamped);
        self.last_op = Some(op_id);

        let event = Event::builder(layer.to_owned(), label, stamped)
            .with_edge(edge)
            .with_fields(fields)
            .build();
        self.provider.report(&event);
    }
}
