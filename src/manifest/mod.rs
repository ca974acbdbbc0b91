//! Manifest reconciliation engine
//!
//! Turns a multi-document YAML payload into one-shot create/update/delete
//! calls against a cluster's generic object API.

pub mod applier;
pub mod client;
pub mod error;
pub mod object;
pub mod reconciler;
pub mod resolver;
pub mod splitter;

#[cfg(test)]
pub(crate) mod mock;

pub use applier::{ApplyReport, ManifestApplier, ObjectOutcome};
pub use client::{DynamicClient, KubeDynamicClient, ObjectRef};
pub use error::{AggregateError, ApiError, ApiErrorKind, ManifestError};
pub use object::ParsedObject;
pub use reconciler::{ApplyOptions, ReconcileOutcome, Reconciler};
pub use resolver::{resolve, ResourceAddress};
