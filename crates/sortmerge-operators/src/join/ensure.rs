//! Getting each input into key order.

use std::sync::Arc;

use sortmerge_core::order::{Side, SortOrder};
use sortmerge_core::prelude::Schema;

use crate::sort::Sorter;
use crate::traits::{BoxedStream, OpError};

/// What the sort collaborator is asked to do for one input.
#[derive(Debug, Clone, PartialEq)]
pub struct SortRequest {
    pub side: Side,
    pub schema: Schema,
    /// 1-based key column.
    pub key_column: usize,
    pub key_length: usize,
    pub order: SortOrder,
    pub mem_pages: usize,
    pub page_size: usize,
}

impl SortRequest {
    pub fn budget_bytes(&self) -> usize {
        self.mem_pages.saturating_mul(self.page_size)
    }
}

/// Passes declared-sorted inputs through and sends the rest to the sorter.
#[derive(Clone)]
pub struct SortEnsurer {
    sorter: Arc<dyn Sorter>,
}

impl SortEnsurer {
    pub fn new(sorter: Arc<dyn Sorter>) -> Self {
        Self { sorter }
    }

    /// Return a stream ordered on `request.key_column`.
    ///
    /// A `presorted` stream is returned as-is; its order is trusted, not
    /// checked. The sorter's `SortFailed`, `SortResourceExhausted`,
    /// `SortInputError` and `TypeMismatch` pass through unchanged; any other
    /// sorter failure becomes `SortFailed` for the request's side.
    pub fn ensure_sorted(&self, stream: BoxedStream, request: &SortRequest, presorted: bool) -> Result<BoxedStream, OpError> {
        if presorted {
            #[cfg(feature = "tracing")]
            tracing::debug!(side = %request.side, "input declared sorted; sort skipped");
            return Ok(stream);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            side = %request.side,
            key_column = request.key_column,
            order = %request.order,
            mem_pages = request.mem_pages,
            "sorting input"
        );
        self.sorter.sort(request, stream).map_err(|e| match e {
            e @ (OpError::SortFailed { .. }
            | OpError::SortResourceExhausted { .. }
            | OpError::SortInputError { .. }
            | OpError::TypeMismatch(_)) => e,
            other => OpError::SortFailed {
                side: request.side,
                reason: other.to_string(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::MemoryScan;
    use crate::traits::TupleStream;
    use sortmerge_core::schema::{DataType, Field};
    use sortmerge_core::tuple;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing(AtomicUsize);

    impl Sorter for Failing {
        fn sort(&self, _request: &SortRequest, _input: BoxedStream) -> Result<BoxedStream, OpError> {
            self.0.fetch_add(1, Ordering::Relaxed);
            Err(OpError::Stream("disk full".into()))
        }
    }

    fn request() -> SortRequest {
        SortRequest {
            side: Side::Right,
            schema: Schema::new(vec![Field::new("k", DataType::Int32)]),
            key_column: 1,
            key_length: 4,
            order: SortOrder::Ascending,
            mem_pages: 4,
            page_size: 64,
        }
    }

    fn input() -> BoxedStream {
        let req = request();
        let mut s = MemoryScan::new(req.schema, vec![tuple![2i32], tuple![1i32]]);
        s.open().unwrap();
        s.boxed()
    }

    #[test]
    fn presorted_input_skips_the_sorter() {
        let sorter = Arc::new(Failing(AtomicUsize::new(0)));
        let ensurer = SortEnsurer::new(sorter.clone());
        let mut out = ensurer.ensure_sorted(input(), &request(), true).unwrap();
        assert_eq!(out.get_next().unwrap(), Some(tuple![2i32]));
        assert_eq!(sorter.0.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn foreign_sorter_errors_become_sort_failed() {
        let sorter = Arc::new(Failing(AtomicUsize::new(0)));
        let ensurer = SortEnsurer::new(sorter.clone());
        let err = ensurer.ensure_sorted(input(), &request(), false).err().unwrap();
        assert!(matches!(err, OpError::SortFailed { side: Side::Right, ref reason } if reason.contains("disk full")));
        assert_eq!(sorter.0.load(Ordering::Relaxed), 1);
    }
}
