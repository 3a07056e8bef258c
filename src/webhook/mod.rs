//! # Admission Rules
//!
//! Defaulting and validation applied to Subscriptions at admission time.
//! These are pure functions; the HTTP admission transport wraps them.

mod defaulting;
pub mod error;
pub mod validation;

pub use defaulting::default_subscription;
pub use error::{to_admission_status, AdmissionStatus, FieldError, ValidationError};
pub use validation::validate_subscription;
