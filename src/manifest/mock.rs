//! In-memory `DynamicClient` for tests
//!
//! Behaves like a small API server: scoped paths, AlreadyExists on duplicate
//! create, optimistic concurrency on update, NotFound on missing objects.
//! Every call is recorded so tests can assert on ordering.

use super::client::{DynamicClient, ObjectRef};
use super::error::ApiError;
use super::object::ParsedObject;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

const CLUSTER_SCOPED: &[&str] = &[
    "namespaces",
    "clusterroles",
    "clusterrolebindings",
    "customresourcedefinitions",
    "mutatingwebhookconfigurations",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub verb: Verb,
    pub resource: String,
    pub namespace: Option<String>,
    pub name: String,
}

type Key = (String, Option<String>, String);

struct Scripted {
    verb: Verb,
    name: String,
    error: ApiError,
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    objects: HashMap<Key, ParsedObject>,
    calls: Vec<Call>,
    updates: Vec<ParsedObject>,
    scripted: Vec<Scripted>,
    next_version: u64,
}

pub struct MockClient {
    state: Mutex<State>,
    cluster_scoped: HashSet<String>,
}

pub fn not_found(resource: &str, name: &str) -> ApiError {
    ApiError::status(404, "NotFound", format!("{} \"{}\" not found", resource, name))
}

pub fn missing_resource() -> ApiError {
    ApiError::status(404, "NotFound", "the server could not find the requested resource")
}

pub fn immutable(name: &str) -> ApiError {
    ApiError::status(
        422,
        "Invalid",
        format!(
            "Deployment.apps \"{}\" is invalid: spec.selector: Invalid value: field is immutable",
            name
        ),
    )
}

pub fn conflict() -> ApiError {
    ApiError::status(
        409,
        "Conflict",
        "the object has been modified; please apply your changes to the latest version and try again",
    )
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            cluster_scoped: CLUSTER_SCOPED.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Seed an existing object
    pub fn with_object(self, resource: &str, namespace: Option<&str>, object: ParsedObject) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.next_version += 1;
            let object = stamp(&object, state.next_version, true);
            let name = object.name().unwrap_or_default().to_string();
            state.objects.insert(
                (resource.to_string(), namespace.map(String::from), name),
                object,
            );
        }
        self
    }

    /// Fail the next matching call
    pub fn fail_next(&self, verb: Verb, name: &str, error: ApiError) {
        self.script(verb, name, error, Some(1));
    }

    /// Fail the next `times` matching calls
    pub fn fail_times(&self, verb: Verb, name: &str, error: ApiError, times: usize) {
        self.script(verb, name, error, Some(times));
    }

    /// Fail every matching call
    pub fn fail_always(&self, verb: Verb, name: &str, error: ApiError) {
        self.script(verb, name, error, None);
    }

    fn script(&self, verb: Verb, name: &str, error: ApiError, remaining: Option<usize>) {
        self.state.lock().unwrap().scripted.push(Scripted {
            verb,
            name: name.to_string(),
            error,
            remaining,
        });
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Verbs in call order, ignoring scope
    pub fn verbs(&self) -> Vec<Verb> {
        self.calls().into_iter().map(|c| c.verb).collect()
    }

    /// Bodies accepted by update, in order
    pub fn updates(&self) -> Vec<ParsedObject> {
        self.state.lock().unwrap().updates.clone()
    }

    pub fn object(&self, resource: &str, namespace: Option<&str>, name: &str) -> Option<ParsedObject> {
        self.state
            .lock()
            .unwrap()
            .objects
            .get(&(resource.to_string(), namespace.map(String::from), name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().unwrap().objects.len()
    }

    fn begin(&self, verb: Verb, target: &ObjectRef, namespace: Option<&str>) -> Result<Key, ApiError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call {
            verb,
            resource: target.address.resource.clone(),
            namespace: namespace.map(String::from),
            name: target.name.clone(),
        });

        let cluster_scoped = self.cluster_scoped.contains(&target.address.resource);
        if cluster_scoped == namespace.is_some() {
            return Err(missing_resource());
        }

        if let Some(pos) = state
            .scripted
            .iter()
            .position(|s| s.verb == verb && s.name == target.name)
        {
            let error = state.scripted[pos].error.clone();
            let exhausted = match state.scripted[pos].remaining.as_mut() {
                Some(n) => {
                    *n = n.saturating_sub(1);
                    *n == 0
                }
                None => false,
            };
            if exhausted {
                state.scripted.remove(pos);
            }
            return Err(error);
        }

        Ok((
            target.address.resource.clone(),
            namespace.map(String::from),
            target.name.clone(),
        ))
    }
}

/// Stored copy with server-assigned fields filled in
fn stamp(object: &ParsedObject, version: u64, created: bool) -> ParsedObject {
    let mut value = object.clone().into_value();
    value["metadata"]["resourceVersion"] = Value::String(version.to_string());
    if created {
        value["metadata"]["creationTimestamp"] = Value::String("2024-01-01T00:00:00Z".to_string());
    }
    ParsedObject::from_value(value)
}

#[async_trait]
impl DynamicClient for MockClient {
    async fn get(&self, target: &ObjectRef, namespace: Option<&str>) -> Result<ParsedObject, ApiError> {
        let key = self.begin(Verb::Get, target, namespace)?;
        let state = self.state.lock().unwrap();
        state
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| not_found(&key.0, &key.2))
    }

    async fn create(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
        object: &ParsedObject,
    ) -> Result<ParsedObject, ApiError> {
        let key = self.begin(Verb::Create, target, namespace)?;
        let mut state = self.state.lock().unwrap();
        if state.objects.contains_key(&key) {
            return Err(ApiError::status(
                409,
                "AlreadyExists",
                format!("{} \"{}\" already exists", key.0, key.2),
            ));
        }
        state.next_version += 1;
        let stored = stamp(object, state.next_version, true);
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn update(
        &self,
        target: &ObjectRef,
        namespace: Option<&str>,
        object: &ParsedObject,
    ) -> Result<ParsedObject, ApiError> {
        let key = self.begin(Verb::Update, target, namespace)?;
        let mut state = self.state.lock().unwrap();
        let current = state
            .objects
            .get(&key)
            .ok_or_else(|| not_found(&key.0, &key.2))?;
        if let Some(version) = object.resource_version() {
            if current.resource_version() != Some(version) {
                return Err(conflict());
            }
        }
        state.next_version += 1;
        let stored = stamp(object, state.next_version, false);
        state.updates.push(object.clone());
        state.objects.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete(&self, target: &ObjectRef, namespace: Option<&str>) -> Result<(), ApiError> {
        let key = self.begin(Verb::Delete, target, namespace)?;
        let mut state = self.state.lock().unwrap();
        state
            .objects
            .remove(&key)
            .map(|_| ())
            .ok_or_else(|| not_found(&key.0, &key.2))
    }
}
