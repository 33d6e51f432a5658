//! Background workers.

mod cleanup;

pub use cleanup::{CleanupHandle, CleanupWorker};
