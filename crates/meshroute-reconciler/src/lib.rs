//! Mesh traffic policy reconciliation for meshroute
//!
//! Derives the DestinationRule, VirtualService and Gateway a service needs
//! from its [`PolicyDescriptor`] and reconciles them against a
//! [`ResourceStore`]: missing resources are created, existing ones are merged
//! so routes for other versions survive.

#![deny(missing_docs)]

pub mod builders;
pub mod descriptor;
pub mod naming;
pub mod reconciler;
pub mod store;

#[cfg(test)]
mod testing;

pub use descriptor::{FaultKind, FaultSpec, MatchMode, MatchRule, MatchTarget, PolicyDescriptor};
pub use naming::NamingPolicy;
pub use reconciler::{Outcome, ReconcileReport, Reconciler};
pub use store::{KubeResourceStore, ResourceStore};
