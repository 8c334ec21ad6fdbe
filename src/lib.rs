//! Trace context propagation and event correlation for APM instrumentation.
//!
//! This crate implements the protocol by which an application-performance
//! monitoring client breaks a request's lifecycle into parent/child layer
//! events, correlates them through a shared trace identifier, and hands the
//! resulting event stream to a collector that reconstructs the causal trace
//! tree.
//!
//! ## Overview
//!
//! * A [`TracerProvider`] holds the injected collaborators: a
//!   [`SamplingEngine`] deciding once per trace whether it is recorded, a
//!   [`Reporter`] sink receiving completed events, and the shared
//!   [`Config`].
//! * Each logical unit of work (request, task, thread) gets its own
//!   [`Tracer`], which owns the unit's [`ContextStore`] and enforces the
//!   `entry -> (info|error)* -> exit` lifecycle per instrumented layer.
//! * Context crosses process boundaries as a fixed-layout [`Metadata`]
//!   token in the `X-Trace` header, injected and extracted by the
//!   [`XTracePropagator`].
//!
//! Tracing is best-effort by contract: malformed inbound context, caller
//! ordering mistakes, reporter failures and identifier-generation failures
//! are logged and counted but never raise into the host application.
//!
//! ## Getting Started
//!
//! ```
//! use xtrace::{InMemoryReporter, KeyValue, TracerProvider};
//!
//! let reporter = InMemoryReporter::default();
//! let provider = TracerProvider::builder()
//!     .with_reporter(reporter.clone())
//!     .build();
//!
//! // One tracer per request.
//! let mut tracer = provider.tracer();
//! tracer.start_trace("web", None, vec![KeyValue::new("URL", "/index")]);
//! tracer.in_layer("db", Vec::new(), |tracer| {
//!     tracer.info("db", vec![KeyValue::new("Query", "SELECT 1")]);
//! });
//! let response_token = tracer.end_trace("web", Vec::new());
//!
//! assert!(response_token.is_some());
//! assert_eq!(reporter.finished_events().len(), 5);
//! ```
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod common;
pub mod config;
pub mod context;
pub mod error;
pub mod event;
pub mod id_generator;
pub mod metadata;
pub mod propagation;
pub mod reporter;
pub mod sampler;
pub mod tracer;

pub use common::{Key, KeyValue, Value};
pub use config::{Config, TracingMode};
pub use context::ContextStore;
pub use error::{TraceError, TraceResult};
pub use event::{Event, EventBuilder, Label};
#[cfg(any(test, feature = "testing"))]
pub use id_generator::SequentialIdGenerator;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use metadata::{Metadata, OpId, ParseError, SampleSource, TraceFlags, TraceId};
pub use propagation::{Extractor, Injector, XTracePropagator, XTRACE_HEADER};
pub use reporter::{InMemoryReporter, NoopReporter, Reporter};
pub use sampler::{Sampler, SamplingDecision, SamplingEngine};
pub use tracer::{Tracer, TracerProvider, TracerProviderBuilder};
