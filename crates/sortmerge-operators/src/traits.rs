//! The pull interface every tuple source implements, and the operator error type.
//!
//! Table scans, sort outputs and joins all look the same to a consumer:
//! `open`, then `get_next` until it yields `None`, then `close`. The join core
//! never inspects which concrete source it is pulling from.

use sortmerge_core::order::Side;
use sortmerge_core::prelude::Schema;
use sortmerge_core::types::Tuple;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("invalid join configuration: {0}")]
    InvalidJoinConfiguration(String),

    #[error("sort of {side} input failed: {reason}")]
    SortFailed { side: Side, reason: String },

    #[error("sort of {side} input ran out of memory: {reason}")]
    SortResourceExhausted { side: Side, reason: String },

    #[error("sort of {side} input could not read its input: {source}")]
    SortInputError {
        side: Side,
        #[source]
        source: Box<OpError>,
    },

    #[error(
        "duplicate-key group on {side} input does not fit in {budget_bytes} bytes \
         (key {key}, {tuples} tuples buffered, {needed_bytes} bytes needed)"
    )]
    GroupTooLarge {
        side: Side,
        key: String,
        tuples: usize,
        needed_bytes: usize,
        budget_bytes: usize,
    },

    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    #[error("failed to open stream '{stream}': {reason}")]
    StreamOpenFailed { stream: String, reason: String },

    /// A failure of one of the join's input streams, with the side and the
    /// pull-interface operation that failed. The original error is kept as-is.
    #[error("{op} on {side} input failed: {source}")]
    Input {
        side: Side,
        op: &'static str,
        #[source]
        source: Box<OpError>,
    },

    #[error("stream error: {0}")]
    Stream(String),

    #[error("projection index {index} out of range for {side} input with {field_count} fields")]
    ProjectionIndexOutOfRange {
        side: Side,
        index: usize,
        field_count: usize,
    },

    #[error("iterator is closed")]
    IteratorClosed,

    #[error("iterator is not open")]
    NotOpen,

    #[error("spill error: {0}")]
    Spill(#[from] sortmerge_mem::error::Error),

    #[error("internal invariant failed: {0}")]
    Internal(String),
}

impl OpError {
    /// Attach input-side context to a stream failure.
    pub fn input(side: Side, op: &'static str, source: OpError) -> Self {
        OpError::Input {
            side,
            op,
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through `Input` and `SortInputError` context.
    pub fn root(&self) -> &OpError {
        match self {
            OpError::Input { source, .. } | OpError::SortInputError { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Lifecycle of a pull-interface stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Constructed; `open` not called yet.
    Created,
    /// Ready to produce tuples.
    Open,
    /// `get_next` returned `None`.
    Finished,
    /// `close` was called; resources released.
    Closed,
}

impl StreamState {
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open | Self::Finished)
    }

    pub const fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Uniform "produce next tuple" capability.
///
/// Every returned `Tuple` is owned by the caller; a producer never hands out a
/// view into storage it reuses on the next call.
pub trait TupleStream: Send {
    /// Prepare the stream. Fails with `StreamOpenFailed` on I/O or
    /// configuration problems.
    fn open(&mut self) -> Result<(), OpError>;

    /// Next tuple in stream order, or `None` once exhausted.
    fn get_next(&mut self) -> Result<Option<Tuple>, OpError>;

    /// Release resources. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), OpError>;

    /// Schema of the produced tuples.
    fn schema(&self) -> &Schema;

    /// Human-readable stream name (stable).
    fn name(&self) -> &'static str;
}

/// A boxed stream for dynamic dispatch.
pub type BoxedStream = Box<dyn TupleStream>;
