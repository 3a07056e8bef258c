//! # CRD Generator
//!
//! Generates Kubernetes CustomResourceDefinition (CRD) YAML from Rust type definitions.
//!
//! ## Usage
//!
//! ```bash
//! # Generate CRD YAML
//! cargo run --bin crdgen > config/crd/crds.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```
//!
//! Both resources are written as one multi-document stream: the Subscription CRD the
//! controller owns, and the APIRule CRD it manages.

use eventing_controller::crd::{APIRule, Subscription};
use kube::core::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    let subscription = serde_yaml::to_string(&Subscription::crd())?;
    let apirule = serde_yaml::to_string(&APIRule::crd())?;
    print!("{subscription}---\n{apirule}");
    Ok(())
}
