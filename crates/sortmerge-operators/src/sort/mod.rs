//! The sort collaborator.
//!
//! The join only needs "give me this input ordered on its key"; `Sorter` is
//! that seam. `ExternalSort` is the implementation shipped here.

pub mod external;
pub mod run;

pub use external::ExternalSort;

use crate::join::ensure::SortRequest;
use crate::traits::{BoxedStream, OpError};

pub trait Sorter: Send + Sync {
    /// Consume `input` (already open) and return an open stream of the same
    /// tuples ordered on `request.key_column` in `request.order`.
    ///
    /// The returned stream owns `input` and closes it on `close`. Fails with
    /// `SortResourceExhausted` when `request`'s memory budget is too small and
    /// with `SortInputError` when `input` fails.
    fn sort(&self, request: &SortRequest, input: BoxedStream) -> Result<BoxedStream, OpError>;
}
