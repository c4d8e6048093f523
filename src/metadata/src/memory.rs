//! A complete in-process metadata service.
//!
//! Mirrors the behaviors of the real store the launcher relies on: type registration is
//! idempotent by name, a context lookup that matches nothing succeeds with an empty payload,
//! creating a second context with the same type and name fails. Every call is counted so tests
//! can assert on the exact traffic a launch produced.

use crate::errors::{MetadataError, MetadataResult};
use crate::service::{method, MetadataStoreService};
use crate::wire::*;
use launcher_common::types::{Artifact, Context, ContextType, Event, Execution};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct State {
    next_id: i64,
    context_types: BTreeMap<String, i64>,
    execution_types: BTreeMap<String, i64>,
    artifact_types: BTreeMap<String, i64>,
    contexts: BTreeMap<i64, Context>,
    executions: BTreeMap<i64, Execution>,
    artifacts: BTreeMap<i64, Artifact>,
    events: Vec<Event>,
    // (context id, execution id)
    associations: BTreeSet<(i64, i64)>,
    // (context id, artifact id)
    attributions: BTreeSet<(i64, i64)>,
    calls: Vec<String>,
    failures: BTreeMap<String, u16>,
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryMetadataStore {
    state: Arc<Mutex<State>>,
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl State {
    fn allocate_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn register_type(types: &mut BTreeMap<String, i64>, next_id: &mut i64, name: &str) -> i64 {
        if let Some(id) = types.get(name) {
            return *id;
        }
        *next_id += 1;
        types.insert(name.to_string(), *next_id);
        *next_id
    }

    fn context_type_name(&self, type_id: i64) -> Option<&str> {
        self.context_types
            .iter()
            .find(|(_, id)| **id == type_id)
            .map(|(name, _)| name.as_str())
    }

    fn get_context_by_type_and_name(
        &self,
        request: GetContextByTypeAndNameRequest,
    ) -> MetadataResult<GetContextByTypeAndNameResponse> {
        let context = self.context_types.get(&request.type_name).and_then(|type_id| {
            self.contexts
                .values()
                .find(|c| c.type_id == Some(*type_id) && c.name == request.context_name)
                .cloned()
        });
        Ok(GetContextByTypeAndNameResponse { context })
    }

    fn get_context_type(&self, request: GetContextTypeRequest) -> MetadataResult<GetContextTypeResponse> {
        match self.context_types.get(&request.type_name) {
            Some(id) => Ok(GetContextTypeResponse {
                context_type: Some(ContextType {
                    id: Some(*id),
                    name: request.type_name,
                }),
            }),
            None => Err(MetadataError::NotFound(format!(
                "No type found for query, name: `{}`",
                request.type_name
            ))),
        }
    }

    fn put_context_type(&mut self, request: PutContextTypeRequest) -> MetadataResult<PutTypeResponse> {
        let name = non_empty_type_name(&request.context_type.name)?;
        let id = Self::register_type(&mut self.context_types, &mut self.next_id, name);
        Ok(PutTypeResponse { type_id: Some(id) })
    }

    fn put_contexts(&mut self, request: PutContextsRequest) -> MetadataResult<PutContextsResponse> {
        let mut context_ids = Vec::with_capacity(request.contexts.len());
        for mut context in request.contexts {
            let type_id = context.type_id.ok_or_else(|| {
                MetadataError::Status {
                    status: 400,
                    body: format!("Context {:?} has no type_id", context.name),
                }
            })?;
            if self.context_type_name(type_id).is_none() {
                return Err(MetadataError::NotFound(format!(
                    "No context type with id {}",
                    type_id
                )));
            }
            if context.name.is_empty() {
                return Err(MetadataError::Status {
                    status: 400,
                    body: "Context name should not be empty".to_string(),
                });
            }

            let duplicate = self.contexts.values().any(|existing| {
                existing.type_id == Some(type_id)
                    && existing.name == context.name
                    && existing.id != context.id
            });
            if duplicate {
                return Err(MetadataError::AlreadyExists(format!(
                    "Given node already exists: type_id: {} name: {:?}",
                    type_id, context.name
                )));
            }

            let id = match context.id {
                Some(id) => id,
                None => self.allocate_id(),
            };
            context.id = Some(id);
            self.contexts.insert(id, context);
            context_ids.push(id);
        }
        Ok(PutContextsResponse { context_ids })
    }

    fn put_execution_type(
        &mut self,
        request: PutExecutionTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        let name = non_empty_type_name(&request.execution_type.name)?;
        let id = Self::register_type(&mut self.execution_types, &mut self.next_id, name);
        Ok(PutTypeResponse { type_id: Some(id) })
    }

    fn put_artifact_type(&mut self, request: PutArtifactTypeRequest) -> MetadataResult<PutTypeResponse> {
        let name = non_empty_type_name(&request.artifact_type.name)?;
        let id = Self::register_type(&mut self.artifact_types, &mut self.next_id, name);
        Ok(PutTypeResponse { type_id: Some(id) })
    }

    fn store_artifact(&mut self, mut artifact: Artifact) -> MetadataResult<i64> {
        let type_id = artifact.type_id.ok_or_else(|| MetadataError::Status {
            status: 400,
            body: "Artifact has no type_id".to_string(),
        })?;
        if !self.artifact_types.values().any(|id| *id == type_id) {
            return Err(MetadataError::NotFound(format!(
                "No artifact type with id {}",
                type_id
            )));
        }

        let now = now_millis();
        let id = match artifact.id {
            Some(id) if self.artifacts.contains_key(&id) => id,
            Some(id) => {
                return Err(MetadataError::NotFound(format!("No artifact with id {}", id)))
            }
            None => {
                artifact.create_time_since_epoch = Some(now);
                self.allocate_id()
            }
        };
        artifact.id = Some(id);
        artifact.last_update_time_since_epoch = Some(now);
        self.artifacts.insert(id, artifact);
        Ok(id)
    }

    fn put_artifacts(&mut self, request: PutArtifactsRequest) -> MetadataResult<PutArtifactsResponse> {
        let artifact_ids = request
            .artifacts
            .into_iter()
            .map(|artifact| self.store_artifact(artifact))
            .collect::<MetadataResult<Vec<_>>>()?;
        Ok(PutArtifactsResponse { artifact_ids })
    }

    fn put_execution(&mut self, request: PutExecutionRequest) -> MetadataResult<PutExecutionResponse> {
        let mut execution = request.execution;
        let type_id = execution.type_id.ok_or_else(|| MetadataError::Status {
            status: 400,
            body: "Execution has no type_id".to_string(),
        })?;
        if !self.execution_types.values().any(|id| *id == type_id) {
            return Err(MetadataError::NotFound(format!(
                "No execution type with id {}",
                type_id
            )));
        }

        let mut context_ids = Vec::with_capacity(request.contexts.len());
        for context in &request.contexts {
            match context.id {
                Some(id) if self.contexts.contains_key(&id) => context_ids.push(id),
                _ => {
                    return Err(MetadataError::NotFound(format!(
                        "Unknown context {:?}",
                        context.name
                    )))
                }
            }
        }

        let now = now_millis();
        let execution_id = self.allocate_id();
        execution.id = Some(execution_id);
        execution.create_time_since_epoch = Some(now);
        execution.last_update_time_since_epoch = Some(now);
        self.executions.insert(execution_id, execution);

        let mut artifact_ids = Vec::with_capacity(request.artifact_event_pairs.len());
        for pair in request.artifact_event_pairs {
            let artifact_id = match pair.artifact {
                Some(artifact) => self.store_artifact(artifact)?,
                None => pair
                    .event
                    .as_ref()
                    .and_then(|event| event.artifact_id)
                    .filter(|id| self.artifacts.contains_key(id))
                    .ok_or_else(|| {
                        MetadataError::NotFound("Event references an unknown artifact".into())
                    })?,
            };
            if let Some(mut event) = pair.event {
                event.artifact_id = Some(artifact_id);
                event.execution_id = Some(execution_id);
                event.milliseconds_since_epoch = Some(now);
                self.events.push(event);
            }
            for context_id in &context_ids {
                self.attributions.insert((*context_id, artifact_id));
            }
            artifact_ids.push(artifact_id);
        }

        for context_id in &context_ids {
            self.associations.insert((*context_id, execution_id));
        }

        Ok(PutExecutionResponse {
            execution_id: Some(execution_id),
            artifact_ids,
            context_ids,
        })
    }

    fn get_executions_by_id(
        &self,
        request: GetExecutionsByIdRequest,
    ) -> MetadataResult<GetExecutionsByIdResponse> {
        let executions = request
            .execution_ids
            .iter()
            .filter_map(|id| self.executions.get(id).cloned())
            .collect();
        Ok(GetExecutionsByIdResponse { executions })
    }

    fn get_artifacts_by_id(
        &self,
        request: GetArtifactsByIdRequest,
    ) -> MetadataResult<GetArtifactsByIdResponse> {
        let artifacts = request
            .artifact_ids
            .iter()
            .filter_map(|id| self.artifacts.get(id).cloned())
            .collect();
        Ok(GetArtifactsByIdResponse { artifacts })
    }
}

fn non_empty_type_name(name: &str) -> MetadataResult<&str> {
    if name.is_empty() {
        return Err(MetadataError::Status {
            status: 400,
            body: "Type name should not be empty".to_string(),
        });
    }
    Ok(name)
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_state<T>(
        &self,
        method: &str,
        operation: impl FnOnce(&mut State) -> MetadataResult<T>,
    ) -> MetadataResult<T> {
        let mut state = self.lock();
        state.calls.push(method.to_string());
        if let Some(status) = state.failures.get(method) {
            return Err(MetadataError::from_status(
                *status,
                format!("injected failure for {}", method),
            ));
        }
        operation(&mut *state)
    }

    /// Makes every later call to `method` fail with `status`.
    pub fn fail_method(&self, method: &str, status: u16) {
        self.lock().failures.insert(method.to_string(), status);
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.lock().calls.iter().filter(|call| *call == method).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn mutating_call_count(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| method::MUTATING.contains(&call.as_str()))
            .count()
    }

    pub fn contexts(&self) -> Vec<Context> {
        self.lock().contexts.values().cloned().collect()
    }

    pub fn artifacts(&self) -> Vec<Artifact> {
        self.lock().artifacts.values().cloned().collect()
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.lock().executions.values().cloned().collect()
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().events.clone()
    }

    pub fn is_associated(&self, context_id: i64, execution_id: i64) -> bool {
        self.lock().associations.contains(&(context_id, execution_id))
    }

    pub fn is_attributed(&self, context_id: i64, artifact_id: i64) -> bool {
        self.lock().attributions.contains(&(context_id, artifact_id))
    }

    /// Serves one JSON-encoded call by method name, as the HTTP gateway would.
    pub fn dispatch(
        &self,
        method: &str,
        body: serde_json::Value,
    ) -> MetadataResult<serde_json::Value> {
        match method {
            method::GET_CONTEXT_BY_TYPE_AND_NAME => {
                self.dispatch_with(method, body, |s, r| s.get_context_by_type_and_name(r))
            }
            method::GET_CONTEXT_TYPE => self.dispatch_with(method, body, |s, r| s.get_context_type(r)),
            method::PUT_CONTEXT_TYPE => self.dispatch_with(method, body, State::put_context_type),
            method::PUT_CONTEXTS => self.dispatch_with(method, body, State::put_contexts),
            method::PUT_EXECUTION_TYPE => {
                self.dispatch_with(method, body, State::put_execution_type)
            }
            method::PUT_EXECUTION => self.dispatch_with(method, body, State::put_execution),
            method::GET_EXECUTIONS_BY_ID => {
                self.dispatch_with(method, body, |s, r| s.get_executions_by_id(r))
            }
            method::PUT_ARTIFACT_TYPE => self.dispatch_with(method, body, State::put_artifact_type),
            method::PUT_ARTIFACTS => self.dispatch_with(method, body, State::put_artifacts),
            method::GET_ARTIFACTS_BY_ID => {
                self.dispatch_with(method, body, |s, r| s.get_artifacts_by_id(r))
            }
            other => Err(MetadataError::NotFound(format!("Unknown method {}", other))),
        }
    }

    fn dispatch_with<Req, Resp>(
        &self,
        method: &str,
        body: serde_json::Value,
        operation: impl FnOnce(&mut State, Req) -> MetadataResult<Resp>,
    ) -> MetadataResult<serde_json::Value>
    where
        Req: DeserializeOwned,
        Resp: Serialize,
    {
        let request: Req = serde_json::from_value(body)?;
        let response = self.with_state(method, |state| operation(state, request))?;
        Ok(serde_json::to_value(response)?)
    }
}

impl MetadataStoreService for InMemoryMetadataStore {
    async fn get_context_by_type_and_name(
        &self,
        request: GetContextByTypeAndNameRequest,
    ) -> MetadataResult<GetContextByTypeAndNameResponse> {
        self.with_state(method::GET_CONTEXT_BY_TYPE_AND_NAME, |s| {
            s.get_context_by_type_and_name(request)
        })
    }

    async fn get_context_type(
        &self,
        request: GetContextTypeRequest,
    ) -> MetadataResult<GetContextTypeResponse> {
        self.with_state(method::GET_CONTEXT_TYPE, |s| s.get_context_type(request))
    }

    async fn put_context_type(
        &self,
        request: PutContextTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        self.with_state(method::PUT_CONTEXT_TYPE, |s| s.put_context_type(request))
    }

    async fn put_contexts(
        &self,
        request: PutContextsRequest,
    ) -> MetadataResult<PutContextsResponse> {
        self.with_state(method::PUT_CONTEXTS, |s| s.put_contexts(request))
    }

    async fn put_execution_type(
        &self,
        request: PutExecutionTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        self.with_state(method::PUT_EXECUTION_TYPE, |s| s.put_execution_type(request))
    }

    async fn put_execution(
        &self,
        request: PutExecutionRequest,
    ) -> MetadataResult<PutExecutionResponse> {
        self.with_state(method::PUT_EXECUTION, |s| s.put_execution(request))
    }

    async fn get_executions_by_id(
        &self,
        request: GetExecutionsByIdRequest,
    ) -> MetadataResult<GetExecutionsByIdResponse> {
        self.with_state(method::GET_EXECUTIONS_BY_ID, |s| {
            s.get_executions_by_id(request)
        })
    }

    async fn put_artifact_type(
        &self,
        request: PutArtifactTypeRequest,
    ) -> MetadataResult<PutTypeResponse> {
        self.with_state(method::PUT_ARTIFACT_TYPE, |s| s.put_artifact_type(request))
    }

    async fn put_artifacts(
        &self,
        request: PutArtifactsRequest,
    ) -> MetadataResult<PutArtifactsResponse> {
        self.with_state(method::PUT_ARTIFACTS, |s| s.put_artifacts(request))
    }

    async fn get_artifacts_by_id(
        &self,
        request: GetArtifactsByIdRequest,
    ) -> MetadataResult<GetArtifactsByIdResponse> {
        self.with_state(method::GET_ARTIFACTS_BY_ID, |s| s.get_artifacts_by_id(request))
    }
}
