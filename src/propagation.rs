//! Carrying trace context across process boundaries.
//!
//! Context travels between services as a serialized [`Metadata`] token in
//! the `X-Trace` header. [`Injector`] and [`Extractor`] decouple the
//! propagator from the carrier (HTTP header maps, message properties); a
//! `HashMap<String, String>` implementation is provided for the common case.

use crate::metadata::Metadata;
use std::collections::HashMap;

/// The request and response header carrying the serialized context token.
pub const XTRACE_HEADER: &str = "X-Trace";

/// Injector provides an interface for adding fields to an underlying
/// carrier such as a header map.
pub trait Injector {
    /// Add a key and value to the underlying data.
    fn set(&mut self, key: &str, value: String);
}

/// Extractor provides an interface for reading fields from an underlying
/// carrier such as a header map.
pub trait Extractor {
    /// Get a value for a key from the underlying data.
    fn get(&self, key: &str) -> Option<&str>;

    /// Collect all the keys from the underlying data.
    fn keys(&self) -> Vec<&str>;
}

impl<S: std::hash::BuildHasher> Injector for HashMap<String, String, S> {
    /// Set a key and value in the HashMap. Keys are lowercased; header
    /// lookup is case-insensitive.
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_lowercase(), value);
    }
}

impl<S: std::hash::BuildHasher> Extractor for HashMap<String, String, S> {
    /// Get a value for a key from the HashMap.
    fn get(&self, key: &str) -> Option<&str> {
        self.get(&key.to_lowercase()).map(|v| v.as_str())
    }

    /// Collect all the keys from the HashMap.
    fn keys(&self) -> Vec<&str> {
        self.keys().map(|k| k.as_str()).collect::<Vec<_>>()
    }
}

/// Propagates [`Metadata`] under the `X-Trace` header.
#[derive(Clone, Debug, Default)]
pub struct XTracePropagator {
    _private: (),
}

impl XTracePropagator {
    /// Create a new `XTracePropagator`.
    pub fn new() -> Self {
        XTracePropagator { _private: () }
    }

    /// Write the serialized token into the carrier. Invalid metadata is not
    /// propagated.
    pub fn inject(&self, metadata: &Metadata, injector: &mut dyn Injector) {
        if metadata.is_valid() {
            injector.set(XTRACE_HEADER, metadata.to_hex_string());
        }
    }

    /// Read a token from the carrier.
    ///
    /// Returns `None` when the header is absent, malformed, or carries
    /// all-zero identifiers; callers start a new trace in that case. Bad
    /// input from an upstream caller is never an error.
    pub fn extract(&self, extractor: &dyn Extractor) -> Option<Metadata> {
        let raw = extractor.get(XTRACE_HEADER)?.trim();
        match Metadata::from_hex(raw) {
            Ok(metadata) if metadata.is_valid() => Some(metadata),
            Ok(_) => {
                tracing::debug!(header = raw, "inbound context has all-zero identifiers");
                None
            }
            Err(err) => {
                tracing::debug!(header = raw, error = %err, "malformed inbound context");
                None
            }
        }
    }

    /// The header names this propagator reads and writes.
    pub fn fields(&self) -> impl Iterator<Item = &'static str> {
        [XTRACE_HEADER].into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{OpId, SampleSource, TraceFlags, TraceId};

    fn metadata() -> Metadata {
        Metadata::new(
            TraceId::from_bytes([3; 20]),
            OpId::from(99),
            TraceFlags::SAMPLED,
            SampleSource::Engine,
        )
    }

    #[test]
    fn inject_extract_round_trip() {
        let propagator = XTracePropagator::new();
        let mut carrier = HashMap::new();

        propagator.inject(&metadata(), &mut carrier);
        assert!(carrier.contains_key("x-trace"));

        let extracted = propagator.extract(&carrier).unwrap();
        assert_eq!(extracted.trace_id(), metadata().trace_id());
        assert_eq!(extracted.op_id(), metadata().op_id());
        assert!(extracted.is_sampled());
    }

    #[test]
    fn extraction_is_header_case_insensitive() {
        let propagator = XTracePropagator::new();
        let mut carrier = HashMap::new();
        carrier.insert("x-trace".to_string(), metadata().to_hex_string());

        assert!(propagator.extract(&carrier).is_some());
    }

    #[test]
    fn invalid_metadata_is_not_injected() {
        let propagator = XTracePropagator::new();
        let mut carrier: HashMap<String, String> = HashMap::new();

        propagator.inject(&Metadata::INVALID, &mut carrier);
        assert!(carrier.is_empty());
    }

    #[test]
    fn malformed_headers_extract_to_none() {
        let propagator = XTracePropagator::new();
        let zeroed = Metadata::INVALID.to_hex_string();
        let test_cases = vec!["", "2B1234", "not a token at all", zeroed.as_str()];

        for raw in test_cases {
            let mut carrier = HashMap::new();
            carrier.set(XTRACE_HEADER, raw.to_string());
            assert!(propagator.extract(&carrier).is_none(), "input: {raw:?}");
        }
    }

    #[test]
    fn trace_context_flows_across_a_hop() {
        let reporter = crate::InMemoryReporter::new();
        let provider = crate::TracerProvider::builder()
            .with_reporter(reporter.clone())
            .build();
        let propagator = XTracePropagator::new();

        // Service A handles a request and calls service B.
        let mut upstream = provider.tracer();
        upstream.start_trace("service-a", None, Vec::new());
        let mut headers = HashMap::new();
        propagator.inject(upstream.current_metadata().unwrap(), &mut headers);

        // Service B continues the same trace from the carried header.
        let inbound = propagator.extract(&headers).map(|md| md.to_hex_string());
        let mut downstream = provider.tracer();
        downstream.start_trace("service-b", inbound.as_deref(), Vec::new());

        assert_eq!(
            downstream.current_metadata().unwrap().trace_id(),
            upstream.current_metadata().unwrap().trace_id()
        );

        downstream.end_trace("service-b", Vec::new());
        upstream.end_trace("service-a", Vec::new());
        assert_eq!(reporter.finished_events().len(), 4);
    }

    #[test]
    fn fields_lists_the_header() {
        let propagator = XTracePropagator::new();
        assert_eq!(propagator.fields().collect::<Vec<_>>(), vec![XTRACE_HEADER]);
    }
}
