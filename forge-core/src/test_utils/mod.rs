//! In-memory implementations for testing.
//!
//! Available behind the `test-utils` feature flag. These are minimal
//! implementations that prove the protocol APIs are usable and give
//! tests something to assert event ordering and compensation against.

mod probe_operation;
mod recording_logger;
mod recording_observer;

pub use probe_operation::ProbeOperation;
pub use recording_logger::RecordingLogger;
pub use recording_observer::RecordingObserver;
