//! Tests for the manifest applier

use super::*;
use crate::manifest::mock::{MockClient, Verb};
use crate::manifest::ApiError;
use std::time::Duration;

const NAMESPACE_AND_DEPLOYMENT: &str = r#"
apiVersion: v1
kind: Namespace
metadata:
  name: nsm-system
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: nsmgr
spec:
  replicas: 1
---
apiVersion: v1
kind: ServiceAccount
metadata:
  name: nsmgr-sa
"#;

fn setup() -> (Arc<MockClient>, ManifestApplier) {
    let mock = Arc::new(MockClient::new());
    let applier = ManifestApplier::new(
        mock.clone(),
        ApplyConfig {
            recreate_delay: Duration::from_millis(1),
            max_recreate_cycles: 3,
            request_timeout: Duration::from_secs(5),
        },
    );
    (mock, applier)
}

#[tokio::test]
async fn test_applies_documents_in_order() {
    // ARRANGE
    let (mock, applier) = setup();

    // ACT
    let report = applier
        .apply_manifest(NAMESPACE_AND_DEPLOYMENT.as_bytes(), "nsm-system", ApplyOptions::install())
        .await
        .unwrap();

    // ASSERT
    let kinds: Vec<&str> = report.outcomes.iter().map(|o| o.kind.as_str()).collect();
    assert_eq!(kinds, vec!["Namespace", "Deployment", "ServiceAccount"]);
    assert_eq!(report.count("created"), 3);
    assert!(mock.object("namespaces", None, "nsm-system").is_some());
    assert!(mock.object("deployments", Some("nsm-system"), "nsmgr").is_some());
    assert!(mock
        .object("serviceaccounts", Some("nsm-system"), "nsmgr-sa")
        .is_some());
}

#[tokio::test]
async fn test_reapplying_updates_instead_of_failing() {
    let (_mock, applier) = setup();
    let payload = NAMESPACE_AND_DEPLOYMENT.as_bytes();

    applier
        .apply_manifest(payload, "nsm-system", ApplyOptions::install())
        .await
        .unwrap();
    let second = applier
        .apply_manifest(payload, "nsm-system", ApplyOptions::install())
        .await
        .unwrap();

    assert_eq!(second.count("updated"), 3);
}

#[tokio::test]
async fn test_blank_and_stray_documents_are_ignored() {
    let (mock, applier) = setup();
    let payload = "---\n# rendered by helm\n---\n\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cfg\n---\n";

    let report = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap();

    assert_eq!(report.len(), 1);
    assert_eq!(report.outcomes[0].index, 3);
    assert_eq!(mock.calls().len(), 1);
}

#[tokio::test]
async fn test_empty_payload_is_a_no_op() {
    let (mock, applier) = setup();

    let report = applier
        .apply_manifest(b"", "mesh", ApplyOptions::install())
        .await
        .unwrap();

    assert!(report.is_empty());
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_unparseable_document_aborts_before_later_documents() {
    // ARRANGE: invalid YAML first, valid object second
    let (mock, applier) = setup();
    let payload = "apiVersion: v1\nkind: ConfigMap\nmetadata: [unclosed\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: valid\n";

    // ACT
    let err = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap_err();

    // ASSERT: nothing reached the cluster
    assert!(matches!(err, ManifestError::Document { index: 0, .. }), "{:?}", err);
    assert!(err.is_decode());
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_object_without_kind_is_rejected() {
    let (mock, applier) = setup();
    let payload = "apiVersion: v1\nmetadata:\n  name: orphan\n";

    let err = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("missing apiVersion or kind"));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_delete_continues_past_absent_objects() {
    // ARRANGE: only the second object exists
    let (mock, applier) = setup();
    let create = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: present\n";
    applier
        .apply_manifest(create.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap();
    let payload = format!(
        "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: absent\n---\n{}",
        create
    );

    // ACT
    let report = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::remove())
        .await
        .unwrap();

    // ASSERT: both documents processed
    assert_eq!(report.len(), 2);
    assert_eq!(report.count("skipped"), 1);
    assert_eq!(report.count("deleted"), 1);
    assert_eq!(mock.object_count(), 0);
}

#[tokio::test]
async fn test_custom_install_continues_past_already_exists() {
    // ARRANGE: the re-create after delete still sees the old object
    let (mock, applier) = setup();
    let first = "apiVersion: v1\nkind: Service\nmetadata:\n  name: web\n";
    applier
        .apply_manifest(first.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap();
    mock.fail_always(
        Verb::Delete,
        "web",
        ApiError::status(404, "NotFound", "services \"web\" not found"),
    );
    let payload = format!(
        "{}---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: after\n",
        first
    );

    // ACT
    let report = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::custom(false))
        .await
        .unwrap();

    // ASSERT
    assert_eq!(report.count("skipped"), 1);
    assert_eq!(report.count("created"), 1);
    assert!(mock.object("configmaps", Some("mesh"), "after").is_some());
}

#[tokio::test]
async fn test_hard_failure_aborts_remaining_documents() {
    let (mock, applier) = setup();
    mock.fail_always(
        Verb::Create,
        "first",
        ApiError::status(403, "Forbidden", "configmaps is forbidden"),
    );
    let payload = "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: first\n---\napiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: second\n";

    let err = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("forbidden"), "{}", err);
    assert!(mock.object("configmaps", Some("mesh"), "second").is_none());
    assert!(mock.calls().iter().all(|c| c.name == "first"));
}

#[tokio::test]
async fn test_list_items_are_all_attempted_and_errors_aggregated() {
    // ARRANGE: two of three list items fail
    let (mock, applier) = setup();
    for name in ["bad-a", "bad-b"] {
        mock.fail_always(
            Verb::Create,
            name,
            ApiError::status(422, "Invalid", format!("{} is invalid", name)),
        );
    }
    let payload = r#"
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: bad-a
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: good
- apiVersion: v1
  kind: ConfigMap
  metadata:
    name: bad-b
"#;

    // ACT
    let err = applier
        .apply_manifest(payload.as_bytes(), "mesh", ApplyOptions::install())
        .await
        .unwrap_err();

    // ASSERT
    match &err {
        ManifestError::Aggregate(aggregate) => assert_eq!(aggregate.len(), 2),
        other => panic!("expected aggregate, got {:?}", other),
    }
    let message = err.to_string();
    assert_eq!(message.lines().count(), 2);
    assert!(message.contains("bad-a is invalid"));
    assert!(message.contains("bad-b is invalid"));
    assert!(mock.object("configmaps", Some("mesh"), "good").is_some());
}

#[tokio::test]
async fn test_delete_deployment_in_manifest_scales_down_first() {
    let (mock, applier) = setup();
    applier
        .apply_manifest(NAMESPACE_AND_DEPLOYMENT.as_bytes(), "nsm-system", ApplyOptions::install())
        .await
        .unwrap();
    let before = mock.calls().len();

    applier
        .apply_manifest(NAMESPACE_AND_DEPLOYMENT.as_bytes(), "nsm-system", ApplyOptions::remove())
        .await
        .unwrap();

    let deployment_verbs: Vec<Verb> = mock.calls()[before..]
        .iter()
        .filter(|c| c.resource == "deployments")
        .map(|c| c.verb)
        .collect();
    assert_eq!(deployment_verbs, vec![Verb::Get, Verb::Update, Verb::Delete]);
    assert_eq!(mock.object_count(), 0);
}
