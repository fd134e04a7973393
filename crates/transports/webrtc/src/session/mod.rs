//! Session lifecycle: admission gate, setup with rollback, once-only teardown

mod admission;
mod capture;
mod cleanup;
mod coordinator;

pub use admission::Admission;
pub use capture::CaptureProcess;
pub use cleanup::{CleanupToken, TerminationReason};
pub use coordinator::{ActiveSession, SessionAnswer, SessionCoordinator};
