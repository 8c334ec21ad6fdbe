//! Trace identifiers and the propagated context token.
//!
//! A trace is identified by a fixed-width random [`TraceId`] generated once
//! per trace, while every emitted event carries its own [`OpId`]. The two,
//! together with the sampled flag, form the [`Metadata`] token that travels
//! in the `X-Trace` request header and is stamped on every event.
//!
//! The serialized token has a fixed layout:
//!
//! ```text
//! version(1 byte) | trace id(20 bytes) | op id(8 bytes) | flags(1 byte)
//! ```
//!
//! carried either as 30 raw bytes or as 60 uppercase hex characters. Parsing
//! validates structure only (length, version, hex encoding); semantic checks
//! such as non-zero identifiers are left to [`Metadata::is_valid`].

use crate::id_generator::IdGenerator;
use crate::sampler::SamplingDecision;
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use thiserror::Error;

/// The token version this crate produces and accepts.
pub const SUPPORTED_VERSION: u8 = 0x2b;

const TRACE_ID_LEN: usize = 20;
const OP_ID_LEN: usize = 8;
const METADATA_BYTE_LEN: usize = 1 + TRACE_ID_LEN + OP_ID_LEN + 1;
const METADATA_HEX_LEN: usize = METADATA_BYTE_LEN * 2;

const HEX_UPPER: &[u8; 16] = b"0123456789ABCDEF";

/// Errors produced when parsing a serialized context token.
///
/// A structurally invalid token is expected input (an upstream caller may
/// send anything); callers treat it as "no inbound context" and start a new
/// trace rather than failing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ParseError {
    /// The token does not have the fixed expected length.
    #[error("context token has invalid length {0}")]
    InvalidLength(usize),

    /// The version byte is not one this crate understands.
    #[error("unsupported context token version {0:#04x}")]
    UnsupportedVersion(u8),

    /// The textual token contains non-hex characters.
    #[error("context token is not valid hex")]
    InvalidEncoding,
}

/// Flags carried in the final byte of the context token.
///
/// Only the `sampled` bit is currently defined; unknown bits are cleared on
/// parse.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub struct TraceFlags(u8);

impl TraceFlags {
    /// Trace flags with the `sampled` flag set to `0`.
    pub const NOT_SAMPLED: TraceFlags = TraceFlags(0x00);

    /// Trace flags with the `sampled` flag set to `1`.
    pub const SAMPLED: TraceFlags = TraceFlags(0x01);

    /// Construct new trace flags.
    pub const fn new(flags: u8) -> Self {
        TraceFlags(flags)
    }

    /// Returns `true` if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        (*self & TraceFlags::SAMPLED) == TraceFlags::SAMPLED
    }

    /// Returns a copy of the current flags with the `sampled` flag set.
    pub fn with_sampled(&self, sampled: bool) -> Self {
        if sampled {
            *self | TraceFlags::SAMPLED
        } else {
            *self & !TraceFlags::SAMPLED
        }
    }

    /// Returns the flags as a `u8`.
    pub fn to_u8(self) -> u8 {
        self.0
    }
}

impl BitAnd for TraceFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self::Output {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for TraceFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl Not for TraceFlags {
    type Output = Self;

    fn not(self) -> Self::Output {
        Self(!self.0)
    }
}

impl fmt::LowerHex for TraceFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

/// A 20-byte value which identifies a given trace.
///
/// The id is valid if it contains at least one non-zero byte. It is constant
/// for the lifetime of a trace.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct TraceId([u8; TRACE_ID_LEN]);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId([0; TRACE_ID_LEN]);

    /// Create a trace id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; TRACE_ID_LEN]) -> Self {
        TraceId(bytes)
    }

    /// Return the representation of this trace id as a byte array.
    pub const fn to_bytes(self) -> [u8; TRACE_ID_LEN] {
        self.0
    }

    /// Converts a string in base 16 to a trace id.
    ///
    /// Accepts exactly 40 hex characters, case-insensitive.
    pub fn from_hex(hex: &str) -> Result<Self, ParseError> {
        let mut bytes = [0; TRACE_ID_LEN];
        decode_hex(hex, &mut bytes)?;
        Ok(TraceId(bytes))
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// An 8-byte value which identifies a single event within a trace.
///
/// A fresh op id is allocated for every event before it is stamped; the
/// previous op id becomes the new event's causal edge.
#[derive(Clone, PartialEq, Eq, Copy, Hash)]
pub struct OpId(u64);

impl OpId {
    /// Invalid op id
    pub const INVALID: OpId = OpId(0);

    /// Create an op id from its representation as a byte array.
    pub const fn from_bytes(bytes: [u8; OP_ID_LEN]) -> Self {
        OpId(u64::from_be_bytes(bytes))
    }

    /// Return the representation of this op id as a byte array.
    pub const fn to_bytes(self) -> [u8; OP_ID_LEN] {
        self.0.to_be_bytes()
    }

    /// Converts a string in base 16 to an op id.
    pub fn from_hex(hex: &str) -> Result<Self, ParseError> {
        let mut bytes = [0; OP_ID_LEN];
        decode_hex(hex, &mut bytes)?;
        Ok(OpId::from_bytes(bytes))
    }
}

impl From<u64> for OpId {
    fn from(value: u64) -> Self {
        OpId(value)
    }
}

impl fmt::Debug for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("{:016x}", self.0))
    }
}

/// Records how the sampling decision for a trace was reached.
///
/// Not part of the serialized token; kept alongside the metadata so events
/// can report it to the collector.
#[derive(Clone, Debug, Default, PartialEq, Eq, Copy, Hash)]
pub enum SampleSource {
    /// The decision came from explicit configuration.
    Config,
    /// No configuration applied; the built-in default decided.
    #[default]
    Default,
    /// A sampling engine (e.g. a rate-based sampler) decided.
    Engine,
    /// The decision was inherited from a valid upstream context.
    Propagated,
}

/// The opaque context token for one trace.
///
/// Carries the trace id (constant per trace), the op id of the most recent
/// event (the next event's causal edge), the sampled flag (decided once at
/// trace start) and the source of that decision.
#[derive(Clone, Debug, PartialEq, Eq, Copy, Hash)]
pub struct Metadata {
    trace_id: TraceId,
    op_id: OpId,
    flags: TraceFlags,
    sample_source: SampleSource,
}

impl Metadata {
    /// An invalid metadata token.
    pub const INVALID: Metadata = Metadata {
        trace_id: TraceId::INVALID,
        op_id: OpId::INVALID,
        flags: TraceFlags::NOT_SAMPLED,
        sample_source: SampleSource::Default,
    };

    /// Construct metadata from its parts.
    pub fn new(
        trace_id: TraceId,
        op_id: OpId,
        flags: TraceFlags,
        sample_source: SampleSource,
    ) -> Self {
        Metadata {
            trace_id,
            op_id,
            flags,
            sample_source,
        }
    }

    /// Start a brand new trace with fresh random identifiers.
    ///
    /// If the generator yields invalid (all-zero) identifiers the trace is
    /// marked unsampled instead of failing; tracing is best-effort and must
    /// never break the host application.
    pub fn start_new(decision: &SamplingDecision, generator: &dyn IdGenerator) -> Self {
        let trace_id = generator.new_trace_id();
        let op_id = generator.new_op_id();
        let degraded = trace_id == TraceId::INVALID || op_id == OpId::INVALID;
        if degraded {
            tracing::warn!("identifier generation failed; marking trace unsampled");
        }
        Metadata {
            trace_id,
            op_id,
            flags: TraceFlags::default().with_sampled(decision.sampled && !degraded),
            sample_source: decision.source,
        }
    }

    /// Copy this token with a new op id, keeping trace id, flags and sample
    /// source. Pure, no side effects.
    pub fn derive_child(&self, op_id: OpId) -> Self {
        Metadata { op_id, ..*self }
    }

    /// Copy this token with the sampled flag and source replaced by a fresh
    /// sampling decision. Used when continuing a propagated upstream trace.
    pub fn with_sampling(&self, decision: &SamplingDecision) -> Self {
        Metadata {
            flags: self.flags.with_sampled(decision.sampled),
            sample_source: decision.source,
            ..*self
        }
    }

    /// The trace id, constant for the lifetime of the trace.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The op id of the most recent event in this trace.
    pub fn op_id(&self) -> OpId {
        self.op_id
    }

    /// The flags carried by this token.
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// How the sampling decision for this trace was reached.
    pub fn sample_source(&self) -> SampleSource {
        self.sample_source
    }

    /// Returns `true` if the `sampled` flag is set.
    pub fn is_sampled(&self) -> bool {
        self.flags.is_sampled()
    }

    /// Returns `true` if both identifiers are non-zero.
    pub fn is_valid(&self) -> bool {
        self.trace_id != TraceId::INVALID && self.op_id != OpId::INVALID
    }

    /// Parse a token from its 30-byte binary form.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != METADATA_BYTE_LEN {
            return Err(ParseError::InvalidLength(bytes.len()));
        }
        if bytes[0] != SUPPORTED_VERSION {
            return Err(ParseError::UnsupportedVersion(bytes[0]));
        }

        let mut trace_id = [0; TRACE_ID_LEN];
        trace_id.copy_from_slice(&bytes[1..1 + TRACE_ID_LEN]);
        let mut op_id = [0; OP_ID_LEN];
        op_id.copy_from_slice(&bytes[1 + TRACE_ID_LEN..METADATA_BYTE_LEN - 1]);

        // Clear bits this version does not define.
        let flags = TraceFlags::new(bytes[METADATA_BYTE_LEN - 1]) & TraceFlags::SAMPLED;

        Ok(Metadata {
            trace_id: TraceId::from_bytes(trace_id),
            op_id: OpId::from_bytes(op_id),
            flags,
            sample_source: SampleSource::Propagated,
        })
    }

    /// Parse a token from its 60-character hex form. Case-insensitive.
    pub fn from_hex(hex: &str) -> Result<Self, ParseError> {
        if hex.len() != METADATA_HEX_LEN {
            return Err(ParseError::InvalidLength(hex.len()));
        }
        let mut bytes = [0; METADATA_BYTE_LEN];
        decode_hex(hex, &mut bytes)?;
        Metadata::from_bytes(&bytes)
    }

    /// The 30-byte binary form of this token.
    pub fn to_bytes(&self) -> [u8; METADATA_BYTE_LEN] {
        let mut bytes = [0; METADATA_BYTE_LEN];
        bytes[0] = SUPPORTED_VERSION;
        bytes[1..1 + TRACE_ID_LEN].copy_from_slice(&self.trace_id.to_bytes());
        bytes[1 + TRACE_ID_LEN..METADATA_BYTE_LEN - 1].copy_from_slice(&self.op_id.to_bytes());
        bytes[METADATA_BYTE_LEN - 1] = self.flags.to_u8();
        bytes
    }

    /// The 60-character uppercase hex form of this token, as carried in the
    /// `X-Trace` header.
    pub fn to_hex_string(&self) -> String {
        let mut out = String::with_capacity(METADATA_HEX_LEN);
        for byte in self.to_bytes() {
            out.push(HEX_UPPER[(byte >> 4) as usize] as char);
            out.push(HEX_UPPER[(byte & 0x0f) as usize] as char);
        }
        out
    }
}

impl fmt::Display for Metadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_string())
    }
}

fn decode_hex(hex: &str, out: &mut [u8]) -> Result<(), ParseError> {
    if !hex.is_ascii() {
        return Err(ParseError::InvalidEncoding);
    }
    if hex.len() != out.len() * 2 {
        return Err(ParseError::InvalidLength(hex.len()));
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|_| ParseError::InvalidEncoding)?;
    }
    Ok(())
}
