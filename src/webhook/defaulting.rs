//! # Defaulting
//!
//! Mutations applied before validation.

use crate::constants::{DEFAULT_MAX_IN_FLIGHT_MESSAGES, MAX_IN_FLIGHT_MESSAGES_KEY};
use crate::crd::{Subscription, TypeMatching};

/// Fill in the type matching mode and the in-flight message limit when unset
pub fn default_subscription(sub: &mut Subscription) {
    if sub.spec.type_matching.is_none() {
        sub.spec.type_matching = Some(TypeMatching::Standard);
    }

    let max_in_flight = sub
        .spec
        .config
        .entry(MAX_IN_FLIGHT_MESSAGES_KEY.to_string())
        .or_default();
    if max_in_flight.is_empty() {
        *max_in_flight = DEFAULT_MAX_IN_FLIGHT_MESSAGES.to_string();
    }
}
