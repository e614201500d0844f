// State machine module for service instance lifecycle
//
// An instance has no state of its own beyond its operation record. The reported
// state is derived from the record's kind and the deployment task status polled
// from the gateway, with the classification table living in `reconcile`.

pub mod reconcile;
pub mod states;

pub use reconcile::{reconcile, Reconciliation};
pub use states::{LastOperationState, OperationKind, TaskState};
