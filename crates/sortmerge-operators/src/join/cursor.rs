//! Forward-only cursors over the join inputs.

use sortmerge_core::order::Side;
use sortmerge_core::prelude::Schema;
use sortmerge_core::types::Tuple;

use crate::traits::{BoxedStream, OpError, TupleStream};

/// One side's ordered input, read strictly forward.
///
/// Once the stream reports its end the cursor never calls `get_next` on it
/// again, so every input is pulled at most (tuples + 1) times.
pub struct SideCursor {
    stream: BoxedStream,
    side: Side,
    pulls: u64,
    exhausted: bool,
    closed: bool,
}

impl SideCursor {
    pub fn new(stream: BoxedStream, side: Side) -> Self {
        Self {
            stream,
            side,
            pulls: 0,
            exhausted: false,
            closed: false,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Number of `get_next` calls issued on the stream.
    pub fn pulls(&self) -> u64 {
        self.pulls
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn schema(&self) -> &Schema {
        self.stream.schema()
    }

    /// Next tuple, or `None` once the stream is exhausted. Stream failures
    /// come back as `OpError::Input` naming this side.
    pub fn pull(&mut self) -> Result<Option<Tuple>, OpError> {
        if self.exhausted {
            return Ok(None);
        }
        self.pulls += 1;
        let next = self
            .stream
            .get_next()
            .map_err(|e| OpError::input(self.side, "get_next", e))?;
        if next.is_none() {
            self.exhausted = true;
        }
        Ok(next)
    }

    /// Close the underlying stream once.
    pub fn close(&mut self) -> Result<(), OpError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close()
            .map_err(|e| OpError::input(self.side, "close", e))
    }

    pub fn into_stream(self) -> BoxedStream {
        self.stream
    }
}

/// Replays one already-read tuple ahead of an open stream.
///
/// The join reads the first tuple of each input before deciding whether a
/// sort is needed at all; this puts that tuple back in front.
pub struct Prefixed {
    first: Option<Tuple>,
    inner: BoxedStream,
}

impl Prefixed {
    pub fn new(first: Tuple, inner: BoxedStream) -> Self {
        Self {
            first: Some(first),
            inner,
        }
    }
}

impl TupleStream for Prefixed {
    /// The inner stream is open already; nothing to do.
    fn open(&mut self) -> Result<(), OpError> {
        Ok(())
    }

    fn get_next(&mut self) -> Result<Option<Tuple>, OpError> {
        match self.first.take() {
            Some(t) => Ok(Some(t)),
            None => self.inner.get_next(),
        }
    }

    fn close(&mut self) -> Result<(), OpError> {
        self.first = None;
        self.inner.close()
    }

    fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    fn name(&self) -> &'static str {
        self.inner.name()
    }
}
