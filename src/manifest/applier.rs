//! Manifest Applier
//!
//! Splits a payload, resolves each document and reconciles it, in document
//! order. Ordering between objects (namespaces before namespaced objects) is
//! the caller's job.

use super::client::DynamicClient;
use super::error::{AggregateError, ManifestError};
use super::object::ParsedObject;
use super::reconciler::{ApplyOptions, ReconcileOutcome, Reconciler};
use super::resolver::resolve;
use super::splitter::{is_blank, split_manifest};
use crate::config::ApplyConfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Outcome for one object in the payload
#[derive(Debug)]
pub struct ObjectOutcome {
    /// Position of the source document in the payload
    pub index: usize,
    pub kind: String,
    pub name: String,
    pub outcome: ReconcileOutcome,
}

/// Per-object outcomes of a successful apply, in application order
#[derive(Debug, Default)]
pub struct ApplyReport {
    pub outcomes: Vec<ObjectOutcome>,
}

impl ApplyReport {
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of objects with the given outcome label
    pub fn count(&self, label: &str) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.label() == label)
            .count()
    }
}

pub struct ManifestApplier {
    reconciler: Reconciler,
}

impl ManifestApplier {
    pub fn new(client: Arc<dyn DynamicClient>, config: ApplyConfig) -> Self {
        Self {
            reconciler: Reconciler::new(client, config),
        }
    }

    /// Apply every document of `payload` against the cluster
    ///
    /// Failures that leave the cluster in the requested state (already gone
    /// on delete, already present on install) are recorded as skipped. Any
    /// other failure aborts the remaining documents. List documents are
    /// expanded and all of their items attempted before errors are returned.
    pub async fn apply_manifest(
        &self,
        payload: &[u8],
        namespace: &str,
        options: ApplyOptions,
    ) -> Result<ApplyReport, ManifestError> {
        let documents = split_manifest(payload)?;
        let mut report = ApplyReport::default();

        for (index, document) in documents.iter().enumerate() {
            if is_blank(document) {
                continue;
            }
            let object = match ParsedObject::from_yaml(document) {
                Ok(Some(object)) if !object.is_empty() => object,
                Ok(_) => continue,
                Err(e) => {
                    return Err(ManifestError::Document {
                        index,
                        message: e.to_string(),
                    })
                }
            };

            if object.is_list() {
                let mut errors = Vec::new();
                for item in object.list_items() {
                    if let Err(e) = self
                        .apply_object(index, &item, namespace, options, &mut report)
                        .await
                    {
                        errors.push(e);
                    }
                }
                if let Some(aggregate) = AggregateError::from_errors(errors) {
                    return Err(aggregate.into());
                }
                continue;
            }

            self.apply_object(index, &object, namespace, options, &mut report)
                .await?;
        }

        info!(
            namespace = %namespace,
            delete = options.delete,
            objects = report.len(),
            "Manifest applied"
        );
        Ok(report)
    }

    async fn apply_object(
        &self,
        index: usize,
        object: &ParsedObject,
        namespace: &str,
        options: ApplyOptions,
        report: &mut ApplyReport,
    ) -> Result<(), ManifestError> {
        let (Some(api_version), Some(kind)) = (object.api_version(), object.kind()) else {
            return Err(ManifestError::Document {
                index,
                message: "object is missing apiVersion or kind".to_string(),
            });
        };
        let address = resolve(api_version, kind);
        let name = object.name().unwrap_or_default().to_string();

        let outcome = match self
            .reconciler
            .reconcile(&address, object, namespace, options)
            .await
        {
            ReconcileOutcome::Failed(err) if is_tolerated(&err, options) => {
                debug!(kind = %kind, name = %name, error = %err, "Continuing past tolerated failure");
                ReconcileOutcome::Skipped(err.to_string())
            }
            ReconcileOutcome::Failed(err) => {
                warn!(kind = %kind, name = %name, resource = %address, error = %err, "Object failed, aborting manifest");
                return Err(err);
            }
            outcome => outcome,
        };

        debug!(kind = %kind, name = %name, outcome = outcome.label(), "Object reconciled");
        report.outcomes.push(ObjectOutcome {
            index,
            kind: kind.to_string(),
            name,
            outcome,
        });
        Ok(())
    }
}

fn is_tolerated(err: &ManifestError, options: ApplyOptions) -> bool {
    if options.delete {
        err.is_not_found()
    } else {
        err.is_already_exists()
    }
}

#[cfg(test)]
#[path = "applier_test.rs"]
mod tests;
