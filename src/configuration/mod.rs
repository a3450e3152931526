//! Configuration Requests
//!
//! Request types, validation against a generation, and the commit pass that
//! writes an accepted request to the backend.

mod apply;
mod request;
mod validate;

pub use apply::{commit, plan, ApplyPlan, ApplyReport};
pub use request::{ApplyRequest, CrtcAssignment, OutputPropertyChange};
pub use validate::{validate, ValidationError};
