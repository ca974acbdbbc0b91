//! Object Reconciler
//!
//! One-shot create/update/delete of a single object against the generic API.
//!
//! Every call targets the namespaced form first and falls back once to the
//! cluster-scoped form, since a manifest rendered for a namespace may still
//! contain cluster-scoped objects.
//!
//! Install path:
//! - Create. Success means `Created`.
//! - Custom manifests: delete, wait, create once more.
//! - Templated manifests: get, copy the live identity, update. An immutable
//!   field or refused verb deletes and restarts from create, bounded by
//!   `max_recreate_cycles`.
//!
//! Delete path: the `default` namespace is never touched, deployments are
//! scaled to zero first, and an object that is already gone is not an error.

use super::client::{DynamicClient, ObjectRef};
use super::error::{ApiError, ApiErrorKind, ManifestError};
use super::object::ParsedObject;
use super::resolver::ResourceAddress;
use crate::config::ApplyConfig;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What happened to one object
#[derive(Debug)]
pub enum ReconcileOutcome {
    Created,
    Updated,
    Deleted,
    Skipped(String),
    Failed(ManifestError),
}

impl ReconcileOutcome {
    /// Metric/log label
    pub fn label(&self) -> &'static str {
        match self {
            ReconcileOutcome::Created => "created",
            ReconcileOutcome::Updated => "updated",
            ReconcileOutcome::Deleted => "deleted",
            ReconcileOutcome::Skipped(_) => "skipped",
            ReconcileOutcome::Failed(_) => "failed",
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ReconcileOutcome::Failed(_))
    }
}

/// Flags for one apply call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Remove the objects instead of installing them
    pub delete: bool,
    /// The manifest was supplied by the caller rather than rendered by us
    pub custom: bool,
}

impl ApplyOptions {
    pub fn install() -> Self {
        Self::default()
    }

    pub fn remove() -> Self {
        Self {
            delete: true,
            custom: false,
        }
    }

    pub fn custom(delete: bool) -> Self {
        Self {
            delete,
            custom: true,
        }
    }
}

/// Namespace the reconciler addresses an object in
///
/// A non-empty caller namespace wins over the object's own; otherwise the
/// object's namespace is used; otherwise the call is cluster-scoped.
pub fn effective_namespace<'a>(namespace: &'a str, object: &'a ParsedObject) -> Option<&'a str> {
    if !namespace.is_empty() {
        Some(namespace)
    } else {
        object.namespace()
    }
}

/// Pick the error to surface after a namespaced and a cluster-scoped attempt
///
/// A namespaced not-found usually means "wrong scope", so the cluster-scoped
/// error is more informative unless it is itself a scope mismatch.
fn prefer<T>(first: ApiError, second: Result<T, ApiError>) -> Result<T, ApiError> {
    match second {
        Ok(value) => Ok(value),
        Err(second)
            if first.kind() == ApiErrorKind::NotFound
                && !matches!(
                    second.kind(),
                    ApiErrorKind::NotFound | ApiErrorKind::ImmutableField
                ) =>
        {
            Err(second)
        }
        Err(_) => Err(first),
    }
}

fn api_failure(target: &ObjectRef, source: ApiError) -> ManifestError {
    ManifestError::Api {
        kind: target.kind.clone(),
        name: target.name.clone(),
        source,
    }
}

pub struct Reconciler {
    client: Arc<dyn DynamicClient>,
    config: ApplyConfig,
}

impl Reconciler {
    pub fn new(client: Arc<dyn DynamicClient>, config: ApplyConfig) -> Self {
        Self { client, config }
    }

    /// Reconcile one object
    pub async fn reconcile(
        &self,
        address: &ResourceAddress,
        object: &ParsedObject,
        namespace: &str,
        options: ApplyOptions,
    ) -> ReconcileOutcome {
        if object.is_empty() {
            return ReconcileOutcome::Skipped("empty document".to_string());
        }

        let target = ObjectRef::new(
            address.clone(),
            object.kind().unwrap_or_default(),
            object.name().unwrap_or_default(),
        );
        let ns = effective_namespace(namespace, object);

        let mut desired = object.clone();
        if let Some(ns) = ns {
            desired.set_namespace(Some(ns));
        }

        if options.delete {
            self.remove(&target, ns).await
        } else if options.custom {
            self.install_custom(&target, ns, &desired).await
        } else {
            self.install(&target, ns, &desired).await
        }
    }

    async fn install(
        &self,
        target: &ObjectRef,
        ns: Option<&str>,
        desired: &ParsedObject,
    ) -> ReconcileOutcome {
        let mut cycles = 0u32;

        loop {
            let create_err = match self.create(target, ns, desired).await {
                Ok(_) => return ReconcileOutcome::Created,
                Err(e) => e,
            };
            debug!(object = %target, error = %create_err, "Create failed, updating existing object");

            let existing = match self.get(target, ns).await {
                Ok(existing) => existing,
                Err(e) if e.is_not_found() => {
                    return ReconcileOutcome::Failed(api_failure(target, create_err))
                }
                Err(e) => return ReconcileOutcome::Failed(api_failure(target, e)),
            };

            let mut body = desired.clone();
            body.adopt_identity(&existing);

            let update_err = match self.update(target, ns, &body).await {
                Ok(_) => return ReconcileOutcome::Updated,
                Err(e) => e,
            };

            match update_err.kind() {
                ApiErrorKind::ImmutableField | ApiErrorKind::Conflict
                    if cycles >= self.config.max_recreate_cycles =>
                {
                    return ReconcileOutcome::Failed(ManifestError::RecreateExhausted {
                        kind: target.kind.clone(),
                        name: target.name.clone(),
                        cycles,
                        source: update_err,
                    });
                }
                ApiErrorKind::ImmutableField => {
                    warn!(
                        object = %target,
                        cycle = cycles + 1,
                        error = %update_err,
                        "Update rejected, deleting and recreating"
                    );
                    if let Err(e) = self.delete(target, ns).await {
                        if !e.is_not_found() {
                            return ReconcileOutcome::Failed(api_failure(target, e));
                        }
                    }
                    tokio::time::sleep(self.config.recreate_delay).await;
                }
                ApiErrorKind::Conflict => {
                    debug!(object = %target, "Update conflicted, retrying");
                }
                _ => return ReconcileOutcome::Failed(api_failure(target, update_err)),
            }
            cycles += 1;
        }
    }

    async fn install_custom(
        &self,
        target: &ObjectRef,
        ns: Option<&str>,
        desired: &ParsedObject,
    ) -> ReconcileOutcome {
        let create_err = match self.create(target, ns, desired).await {
            Ok(_) => return ReconcileOutcome::Created,
            Err(e) => e,
        };
        debug!(object = %target, error = %create_err, "Create failed, replacing object");

        let replaced = match self.delete(target, ns).await {
            Ok(()) => true,
            Err(e) if e.is_not_found() => false,
            Err(e) => return ReconcileOutcome::Failed(api_failure(target, e)),
        };
        tokio::time::sleep(self.config.recreate_delay).await;

        match self.create(target, ns, desired).await {
            Ok(_) if replaced => ReconcileOutcome::Updated,
            Ok(_) => ReconcileOutcome::Created,
            Err(e) => ReconcileOutcome::Failed(api_failure(target, e)),
        }
    }

    async fn remove(&self, target: &ObjectRef, ns: Option<&str>) -> ReconcileOutcome {
        if target.address.resource == "namespaces" && target.name == "default" {
            return ReconcileOutcome::Skipped("the default namespace is never deleted".to_string());
        }
        if target.name.is_empty() {
            return ReconcileOutcome::Failed(ManifestError::InvalidObject(format!(
                "{} has no metadata.name",
                target.kind
            )));
        }

        if target.address.resource == "deployments" {
            self.scale_to_zero(target, ns).await;
        }

        match self.delete(target, ns).await {
            Ok(()) => ReconcileOutcome::Deleted,
            Err(e) if e.is_not_found() => ReconcileOutcome::Skipped("already absent".to_string()),
            Err(e) => ReconcileOutcome::Failed(api_failure(target, e)),
        }
    }

    /// Best effort; the delete goes ahead either way
    async fn scale_to_zero(&self, target: &ObjectRef, ns: Option<&str>) {
        let mut live = match self.get(target, ns).await {
            Ok(live) => live,
            Err(e) => {
                if !e.is_not_found() {
                    warn!(object = %target, error = %e, "Failed to fetch deployment before delete");
                }
                return;
            }
        };
        live.set_replicas(0);
        match self.update(target, ns, &live).await {
            Ok(_) => info!(object = %target, "Scaled deployment to zero before delete"),
            Err(e) => warn!(object = %target, error = %e, "Failed to scale deployment to zero"),
        }
    }

    async fn timed<T>(&self, call: impl Future<Output = Result<T, ApiError>>) -> Result<T, ApiError> {
        match tokio::time::timeout(self.config.request_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ApiError::timeout(self.config.request_timeout)),
        }
    }

    async fn get(&self, target: &ObjectRef, ns: Option<&str>) -> Result<ParsedObject, ApiError> {
        let first = match self.timed(self.client.get(target, ns)).await {
            Ok(found) => return Ok(found),
            Err(e) => e,
        };
        if ns.is_none() {
            return Err(first);
        }
        debug!(object = %target, error = %first, "Namespaced get failed, trying cluster scope");
        prefer(first, self.timed(self.client.get(target, None)).await)
    }

    async fn create(
        &self,
        target: &ObjectRef,
        ns: Option<&str>,
        body: &ParsedObject,
    ) -> Result<ParsedObject, ApiError> {
        let first = match self.timed(self.client.create(target, ns, body)).await {
            Ok(created) => return Ok(created),
            Err(e) => e,
        };
        if ns.is_none() {
            return Err(first);
        }
        debug!(object = %target, error = %first, "Namespaced create failed, trying cluster scope");
        let cluster_body = body.without_namespace();
        prefer(
            first,
            self.timed(self.client.create(target, None, &cluster_body)).await,
        )
    }

    async fn update(
        &self,
        target: &ObjectRef,
        ns: Option<&str>,
        body: &ParsedObject,
    ) -> Result<ParsedObject, ApiError> {
        let first = match self.timed(self.client.update(target, ns, body)).await {
            Ok(updated) => return Ok(updated),
            Err(e) => e,
        };
        if ns.is_none() {
            return Err(first);
        }
        debug!(object = %target, error = %first, "Namespaced update failed, trying cluster scope");
        let cluster_body = body.without_namespace();
        prefer(
            first,
            self.timed(self.client.update(target, None, &cluster_body)).await,
        )
    }

    async fn delete(&self, target: &ObjectRef, ns: Option<&str>) -> Result<(), ApiError> {
        let first = match self.timed(self.client.delete(target, ns)).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if ns.is_none() {
            return Err(first);
        }
        debug!(object = %target, error = %first, "Namespaced delete failed, trying cluster scope");
        prefer(first, self.timed(self.client.delete(target, None)).await)
    }
}

#[cfg(test)]
#[path = "reconciler_test.rs"]
mod tests;
