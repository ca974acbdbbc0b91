//! Generic (schema-less) object API
//!
//! `DynamicClient` is the seam the reconciler talks to. `KubeDynamicClient`
//! implements it over kube-rs `Api<DynamicObject>`; tests use an in-memory mock.

use super::error::ApiError;
use super::object::ParsedObject;
use super::resolver::ResourceAddress;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, DynamicObject, PostParams};
use kube::Client;
use std::fmt;

/// One object addressed through the generic API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub address: ResourceAddress,
    pub kind: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(address: ResourceAddress, kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            address,
            kind: kind.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

/// Get/create/update/delete by resource address and name
///
/// `namespace: None` targets the cluster-scoped form of the call.
#[async_trait]
pub trait DynamicClient: Send + Sync {
    async fn get(&self, target: &ObjectRef, namespace: Option<&str>)
        -> Result<ParsedObject, ApiError>;

    async fn create(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
        object: &ParsedObject,
    ) -> Result<ParsedObject, ApiError>;

    async fn update(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
        object: &ParsedObject,
    ) -> Result<ParsedObject, ApiError>;

    async fn delete(&self, target: &ObjectRef, namespace: Option<&str>) -> Result<(), ApiError>;
}

/// `DynamicClient` backed by a kube-rs client
#[derive(Clone)]
pub struct KubeDynamicClient {
    client: Client,
}

impl KubeDynamicClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, target: &ObjectRef, namespace: Option<&str>) -> Api<DynamicObject> {
        let resource = target.address.api_resource(&target.kind);
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }
}

fn to_dynamic(object: &ParsedObject) -> Result<DynamicObject, ApiError> {
    serde_json::from_value(object.as_value().clone())
        .map_err(|e| ApiError::transport(format!("failed to encode object: {}", e)))
}

fn from_dynamic(object: DynamicObject) -> Result<ParsedObject, ApiError> {
    serde_json::to_value(object)
        .map(ParsedObject::from_value)
        .map_err(|e| ApiError::transport(format!("failed to decode object: {}", e)))
}

#[async_trait]
impl DynamicClient for KubeDynamicClient {
    async fn get(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
    ) -> Result<ParsedObject, ApiError> {
        let found = self.api(target, namespace).get(&target.name).await?;
        from_dynamic(found)
    }

    async fn create(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
        object: &ParsedObject,
    ) -> Result<ParsedObject, ApiError> {
        let body = to_dynamic(object)?;
        let created = self
            .api(target, namespace)
            .create(&PostParams::default(), &body)
            .await?;
        from_dynamic(created)
    }

    async fn update(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
        object: &ParsedObject,
    ) -> Result<ParsedObject, ApiError> {
        let body = to_dynamic(object)?;
        let updated = self
            .api(target, namespace)
            .replace(&target.name, &PostParams::default(), &body)
            .await?;
        from_dynamic(updated)
    }

    async fn delete(&self, target: &ObjectRef, namespace: Option<&str>) -> Result<(), ApiError> {
        self.api(target, namespace)
            .delete(&target.name, &DeleteParams::background())
            .await?;
        Ok(())
    }
}
