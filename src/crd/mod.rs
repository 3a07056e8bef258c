//! # Custom Resource Definitions
//!
//! Subscription (reconciled) and APIRule (managed) resource types.

mod apirule;
pub mod condition;
mod subscription;

pub use apirule::*;
pub use condition::{conditions_equal, Condition, ConditionStatus, ConditionType, Conditions};
pub use subscription::*;
