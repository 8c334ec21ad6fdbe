//! Trace events and their builder.
//!
//! An event is one timestamped key-value record in the trace's causal tree:
//! it names the instrumented layer, carries a [`Label`] describing its place
//! in the layer lifecycle, the metadata snapshot stamped at emit time (with
//! the event's own fresh op id) and an edge back to the op id it is causally
//! linked from. Events are immutable once built.

use crate::common::{KeyValue, Value};
use crate::metadata::{Metadata, OpId};
use std::borrow::Cow;
use std::fmt;
use std::time::SystemTime;

/// The position of an event within a layer invocation.
#[derive(Clone, Debug, PartialEq, Eq, Copy, Hash)]
pub enum Label {
    /// The layer invocation begins.
    Entry,
    /// The layer invocation ends.
    Exit,
    /// Diagnostic information recorded while the layer is entered.
    Info,
    /// A failure of the underlying operation. Does not end the invocation.
    Error,
}

impl Label {
    /// The wire name of this label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Label::Entry => "entry",
            Label::Exit => "exit",
            Label::Info => "info",
            Label::Error => "error",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single trace event, immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct Event {
    layer: Cow<'static, str>,
    label: Label,
    timestamp: SystemTime,
    fields: Vec<KeyValue>,
    edge: Option<OpId>,
    metadata: Metadata,
}

impl Event {
    /// Start building an event for the given layer and label, stamped with
    /// the given metadata snapshot.
    ///
    /// The snapshot must already carry the op id allocated for this event;
    /// wiring it to the context store and the causal edge is the tracer's
    /// job.
    pub fn builder(
        layer: impl Into<Cow<'static, str>>,
        label: Label,
        metadata: Metadata,
    ) -> EventBuilder {
        EventBuilder {
            layer: layer.into(),
            label,
            metadata,
            edge: None,
            fields: Vec::new(),
        }
    }

    /// The name of the instrumented layer this event belongs to.
    pub fn layer(&self) -> &str {
        &self.layer
    }

    /// The event's label.
    pub fn label(&self) -> Label {
        self.label
    }

    /// The time at which this event was built.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// The event's fields, in insertion order with unique keys.
    pub fn fields(&self) -> &[KeyValue] {
        &self.fields
    }

    /// Look up a field value by key.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|kv| kv.key.as_str() == key)
            .map(|kv| &kv.value)
    }

    /// The op id this event is causally linked from, if any. The root entry
    /// of a locally started trace has no edge.
    pub fn edge(&self) -> Option<OpId> {
        self.edge
    }

    /// The metadata snapshot stamped on this event.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Shorthand for the op id allocated for this event.
    pub fn op_id(&self) -> OpId {
        self.metadata.op_id()
    }
}

/// Accumulates fields for an [`Event`] before it is frozen.
#[derive(Debug)]
pub struct EventBuilder {
    layer: Cow<'static, str>,
    label: Label,
    metadata: Metadata,
    edge: Option<OpId>,
    fields: Vec<KeyValue>,
}

impl EventBuilder {
    /// Set the causal parent edge of this event.
    pub fn with_edge(mut self, edge: Option<OpId>) -> Self {
        self.edge = edge;
        self
    }

    /// Add one field. A repeated key overwrites the earlier value rather
    /// than erroring; instrumentation call sites may add overlapping
    /// diagnostic fields.
    pub fn with_field(mut self, field: KeyValue) -> Self {
        self.add_field(field);
        self
    }

    /// Add several fields.
    pub fn with_fields<I>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = KeyValue>,
    {
        for field in fields {
            self.add_field(field);
        }
        self
    }

    fn add_field(&mut self, field: KeyValue) {
        match self.fields.iter_mut().find(|kv| kv.key == field.key) {
            Some(existing) => existing.value = field.value,
            None => self.fields.push(field),
        }
    }

    /// Freeze the field mapping and produce the event.
    pub fn build(self) -> Event {
        Event {
            layer: self.layer,
            label: self.label,
            timestamp: SystemTime::now(),
            fields: self.fields,
            edge: self.edge,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{SampleSource, TraceFlags, TraceId};

    fn metadata() -> Metadata {
        Metadata::new(
            TraceId::from_bytes([1; 20]),
            OpId::from(42),
            TraceFlags::SAMPLED,
            SampleSource::Default,
        )
    }

    #[test]
    fn builder_stamps_metadata_and_edge() {
        let event = Event::builder("http", Label::Entry, metadata())
            .with_edge(Some(OpId::from(7)))
            .with_field(KeyValue::new("URL", "/index"))
            .build();

        assert_eq!(event.layer(), "http");
        assert_eq!(event.label(), Label::Entry);
        assert_eq!(event.op_id(), OpId::from(42));
        assert_eq!(event.edge(), Some(OpId::from(7)));
        assert_eq!(event.field("URL"), Some(&Value::String("/index".into())));
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let event = Event::builder("db", Label::Info, metadata())
            .with_field(KeyValue::new("Query", "SELECT 1"))
            .with_field(KeyValue::new("RemoteHost", "db-1"))
            .with_field(KeyValue::new("Query", "SELECT 2"))
            .build();

        assert_eq!(event.fields().len(), 2);
        assert_eq!(event.fields()[0].key.as_str(), "Query");
        assert_eq!(event.field("Query"), Some(&Value::String("SELECT 2".into())));
    }

    #[test]
    fn label_wire_names() {
        let test_cases = vec![
            (Label::Entry, "entry"),
            (Label::Exit, "exit"),
            (Label::Info, "info"),
            (Label::Error, "error"),
        ];
        for (label, expected) in test_cases {
            assert_eq!(label.as_str(), expected);
            assert_eq!(label.to_string(), expected);
        }
    }
}
