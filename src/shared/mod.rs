//! Job progress shared between the worker and its observers
//!
//! Workers publish [`JobEvent`]s over a channel; observers fold them into
//! immutable [`JobSnapshot`]s held by a [`JobRegistry`].

pub mod messages;
pub mod state;

pub use messages::{JobEvent, ProgressEvent};
pub use state::{JobRegistry, JobSnapshot, JobStatus};
