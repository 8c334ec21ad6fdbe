//! Sampling engines and the built-in samplers.
//!
//! The sampling decision is made exactly once, when a trace starts, and is
//! stamped into every event of that trace. The decision itself is delegated
//! to a [`SamplingEngine`] injected into the tracer provider; this module
//! provides the built-in [`Sampler`] implementations covering the common
//! cases (always, never, rate-based, and honoring an upstream decision).

use crate::config::{Config, TracingMode};
use crate::error::TraceResult;
use crate::metadata::{Metadata, SampleSource};
use std::fmt;

/// The outcome of a sampling call: whether the trace is recorded, and why.
#[derive(Clone, Debug, PartialEq, Eq, Copy)]
pub struct SamplingDecision {
    /// `true` if events of this trace are recorded and transmitted.
    pub sampled: bool,
    /// How the decision was reached.
    pub source: SampleSource,
}

impl SamplingDecision {
    /// A positive decision with the given source.
    pub fn record(source: SampleSource) -> Self {
        SamplingDecision {
            sampled: true,
            source,
        }
    }

    /// A negative decision with the given source.
    pub fn drop(source: SampleSource) -> Self {
        SamplingDecision {
            sampled: false,
            source,
        }
    }
}

/// Interface consumed by the tracer when a trace starts.
///
/// Implementations receive the entry layer's name and the inbound propagated
/// metadata, if a structurally valid token arrived with the request. A
/// returned error is treated by the core as "not sampled"; engine failures
/// must never interrupt the host application.
pub trait SamplingEngine: Send + Sync + fmt::Debug {
    /// Decide whether a trace entered through `layer` should be recorded.
    fn should_trace(
        &self,
        layer: &str,
        inbound: Option<&Metadata>,
    ) -> TraceResult<SamplingDecision>;
}

/// Built-in sampling options.
///
/// For more complex scenarios implement [`SamplingEngine`] directly.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace
    AlwaysOn,
    /// Never sample the trace
    AlwaysOff,
    /// Sample a given fraction of traces. Fractions >= 1 always sample and
    /// fractions <= 0 never sample. When inbound metadata is present the
    /// decision is keyed deterministically on the trace id, so every hop of
    /// a trace resolves the same way.
    TraceIdRatio(f64),
    /// Respects a valid inbound context's sampled flag, delegating to the
    /// wrapped sampler for traces that start here.
    ParentBased(Box<Sampler>),
}

impl Sampler {
    /// The sampler implied by the configured tracing mode and sample ratio.
    ///
    /// `Always` honors upstream decisions and records locally-started
    /// traces (subject to the configured ratio); `Never` records nothing;
    /// `Through` only continues traces an upstream caller already sampled.
    pub fn from_config(config: &Config) -> Sampler {
        match config.tracing_mode {
            TracingMode::Never => Sampler::AlwaysOff,
            TracingMode::Through => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
            TracingMode::Always if config.sample_ratio < 1.0 => {
                Sampler::ParentBased(Box::new(Sampler::TraceIdRatio(config.sample_ratio)))
            }
            TracingMode::Always => Sampler::ParentBased(Box::new(Sampler::AlwaysOn)),
        }
    }
}

impl SamplingEngine for Sampler {
    fn should_trace(
        &self,
        layer: &str,
        inbound: Option<&Metadata>,
    ) -> TraceResult<SamplingDecision> {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::record(SampleSource::Config),
            Sampler::AlwaysOff => SamplingDecision::drop(SampleSource::Config),
            Sampler::TraceIdRatio(ratio) => {
                let sampled = match inbound.filter(|md| md.is_valid()) {
                    Some(md) => sample_from_trace_id(*ratio, md),
                    None => sample_from_draw(*ratio),
                };
                SamplingDecision {
                    sampled,
                    source: SampleSource::Engine,
                }
            }
            Sampler::ParentBased(delegate) => match inbound.filter(|md| md.is_valid()) {
                Some(md) => SamplingDecision {
                    sampled: md.is_sampled(),
                    source: SampleSource::Propagated,
                },
                None => delegate.should_trace(layer, None)?,
            },
        };

        Ok(decision)
    }
}

fn sample_from_trace_id(ratio: f64, metadata: &Metadata) -> bool {
    if ratio >= 1.0 {
        return true;
    }
    if ratio <= 0.0 {
        return false;
    }

    let threshold = (ratio * (1u64 << 63) as f64) as u64;
    let bytes = metadata.trace_id().to_bytes();
    let mut low = [0u8; 8];
    low.copy_from_slice(&bytes[12..20]);
    (u64::from_be_bytes(low) >> 1) < threshold
}

fn sample_from_draw(ratio: f64) -> bool {
    if ratio >= 1.0 {
        return true;
    }
    if ratio <= 0.0 {
        return false;
    }
    rand::random::<f64>() < ratio
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{OpId, TraceFlags, TraceId};

    fn inbound(sampled: bool) -> Metadata {
        Metadata::new(
            TraceId::from_bytes([7; 20]),
            OpId::from(11),
            TraceFlags::default().with_sampled(sampled),
            SampleSource::Propagated,
        )
    }

    #[test]
    fn always_on_and_off() {
        let on = Sampler::AlwaysOn.should_trace("web", None).unwrap();
        assert!(on.sampled);
        assert_eq!(on.source, SampleSource::Config);

        let off = Sampler::AlwaysOff
            .should_trace("web", Some(&inbound(true)))
            .unwrap();
        assert!(!off.sampled);
    }

    #[test]
    fn parent_based_honors_upstream_decision() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));

        let continued = sampler.should_trace("web", Some(&inbound(true))).unwrap();
        assert!(continued.sampled);
        assert_eq!(continued.source, SampleSource::Propagated);

        let suppressed = sampler.should_trace("web", Some(&inbound(false))).unwrap();
        assert!(!suppressed.sampled);
        assert_eq!(suppressed.source, SampleSource::Propagated);

        // No upstream context: the delegate decides.
        let root = sampler.should_trace("web", None).unwrap();
        assert!(!root.sampled);
        assert_eq!(root.source, SampleSource::Config);
    }

    #[test]
    fn parent_based_ignores_invalid_inbound() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOn));
        let decision = sampler
            .should_trace("web", Some(&Metadata::INVALID))
            .unwrap();
        assert!(decision.sampled);
        assert_eq!(decision.source, SampleSource::Config);
    }

    #[test]
    fn ratio_extremes() {
        let never = Sampler::TraceIdRatio(0.0);
        let always = Sampler::TraceIdRatio(1.0);

        for md in [None, Some(inbound(true))] {
            assert!(!never.should_trace("web", md.as_ref()).unwrap().sampled);
            assert!(always.should_trace("web", md.as_ref()).unwrap().sampled);
        }
    }

    #[test]
    fn ratio_is_deterministic_per_trace_id() {
        let sampler = Sampler::TraceIdRatio(0.5);
        let md = inbound(true);
        let first = sampler.should_trace("web", Some(&md)).unwrap();
        for _ in 0..10 {
            assert_eq!(sampler.should_trace("web", Some(&md)).unwrap(), first);
        }
    }

    #[test]
    fn from_config_maps_tracing_modes() {
        let mut config = Config {
            tracing_mode: TracingMode::Never,
            ..Config::default()
        };
        assert!(matches!(
            Sampler::from_config(&config),
            Sampler::AlwaysOff
        ));

        config.tracing_mode = TracingMode::Through;
        let through = Sampler::from_config(&config);
        assert!(!through.should_trace("web", None).unwrap().sampled);
        assert!(through
            .should_trace("web", Some(&inbound(true)))
            .unwrap()
            .sampled);

        config.tracing_mode = TracingMode::Always;
        config.sample_ratio = 1.0;
        let always = Sampler::from_config(&config);
        assert!(always.should_trace("web", None).unwrap().sampled);
    }
}
