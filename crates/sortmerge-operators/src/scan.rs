//! In-memory table scan: the simplest `TupleStream`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use sortmerge_core::prelude::Schema;
use sortmerge_core::types::Tuple;

use crate::traits::{OpError, StreamState, TupleStream};

/// Shared count of `get_next` calls a stream has served, including the
/// terminal end-of-stream probe. Clones observe the same counter.
#[derive(Debug, Clone, Default)]
pub struct PullCounter(Arc<AtomicU64>);

impl PullCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    fn bump(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

/// Scan over tuples held in memory. Every produced tuple is checked against
/// the declared schema.
pub struct MemoryScan {
    schema: Schema,
    tuples: Vec<Tuple>,
    pos: usize,
    state: StreamState,
    pulls: PullCounter,
    closes: PullCounter,
}

impl MemoryScan {
    pub fn new(schema: Schema, tuples: Vec<Tuple>) -> Self {
        Self {
            schema,
            tuples,
            pos: 0,
            state: StreamState::Created,
            pulls: PullCounter::new(),
            closes: PullCounter::new(),
        }
    }

    /// Count `get_next` calls into `counter`.
    pub fn with_pull_counter(mut self, counter: PullCounter) -> Self {
        self.pulls = counter;
        self
    }

    /// Count effective `close` calls into `counter`.
    pub fn with_close_counter(mut self, counter: PullCounter) -> Self {
        self.closes = counter;
        self
    }

    pub fn boxed(self) -> Box<dyn TupleStream> {
        Box::new(self)
    }

    pub fn state(&self) -> StreamState {
        self.state
    }
}

impl TupleStream for MemoryScan {
    fn open(&mut self) -> Result<(), OpError> {
        if self.state.is_closed() {
            return Err(OpError::StreamOpenFailed {
                stream: self.name().into(),
                reason: "scan was already closed".into(),
            });
        }
        self.pos = 0;
        self.state = StreamState::Open;
        Ok(())
    }

    fn get_next(&mut self) -> Result<Option<Tuple>, OpError> {
        match self.state {
            StreamState::Created => return Err(OpError::NotOpen),
            StreamState::Closed => return Err(OpError::IteratorClosed),
            StreamState::Open | StreamState::Finished => {}
        }
        self.pulls.bump();
        let Some(tuple) = self.tuples.get(self.pos) else {
            self.state = StreamState::Finished;
            return Ok(None);
        };
        self.schema
            .check_tuple(tuple)
            .map_err(|e| OpError::TypeMismatch(format!("row {}: {e}", self.pos + 1)))?;
        self.pos += 1;
        Ok(Some(tuple.clone()))
    }

    fn close(&mut self) -> Result<(), OpError> {
        if !self.state.is_closed() {
            self.closes.bump();
            self.state = StreamState::Closed;
        }
        Ok(())
    }

    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn name(&self) -> &'static str {
        "memory_scan"
    }
}
