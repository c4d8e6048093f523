//! Get-or-create bookkeeping against the metadata service.
//!
//! Every mutating call is followed by a read, and the copy the server returns is the one
//! handed back to callers.

use crate::errors::{MetadataError, MetadataResult};
use crate::schema::artifact_type_title;
use crate::service::MetadataStoreService;
use crate::wire::*;
use launcher_common::constants::{
    CONTAINER_EXECUTION_TYPE, PIPELINE_CONTEXT_TYPE, PIPELINE_RUN_CONTEXT_TYPE,
};
use launcher_common::types::{
    Artifact, ArtifactType, Context, ContextType, Event, EventType, Execution, ExecutionState,
    ExecutionType, Properties,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// The contexts every execution and artifact of a run is attributed to.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineContexts {
    pub pipeline: Context,
    pub pipeline_run: Context,
}

impl PipelineContexts {
    fn to_vec(&self) -> Vec<Context> {
        vec![self.pipeline.clone(), self.pipeline_run.clone()]
    }
}

/// What the launcher knows about a finished step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ExecutionRecord {
    pub custom_properties: Properties,
    pub input_artifact_ids: Vec<i64>,
    pub output_artifact_ids: Vec<i64>,
}

pub struct MetadataClient<S> {
    service: S,
    pipeline_name: String,
    pipeline_run_id: String,
    contexts: OnceCell<PipelineContexts>,
}

impl<S: MetadataStoreService> MetadataClient<S> {
    pub fn new(service: S, pipeline_name: &str, pipeline_run_id: &str) -> Self {
        Self {
            service,
            pipeline_name: pipeline_name.to_string(),
            pipeline_run_id: pipeline_run_id.to_string(),
            contexts: OnceCell::new(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Pipeline and pipeline run contexts, fetched or created on first use and cached after.
    pub async fn pipeline_contexts(&self) -> MetadataResult<&PipelineContexts> {
        self.contexts
            .get_or_try_init(|| async {
                let pipeline = self
                    .ensure_context(&self.pipeline_name, PIPELINE_CONTEXT_TYPE)
                    .await?;
                let pipeline_run = self
                    .ensure_context(&self.pipeline_run_id, PIPELINE_RUN_CONTEXT_TYPE)
                    .await?;
                Ok::<_, MetadataError>(PipelineContexts {
                    pipeline,
                    pipeline_run,
                })
            })
            .await
    }

    pub async fn ensure_context(&self, name: &str, type_name: &str) -> MetadataResult<Context> {
        if let Some(context) = self.find_context(name, type_name).await? {
            debug!("Found context {:?} of type {:?}", name, type_name);
            return Ok(context);
        }

        let type_id = self.ensure_context_type(type_name).await?;
        self.service
            .put_contexts(PutContextsRequest {
                contexts: vec![Context {
                    name: name.to_string(),
                    type_id: Some(type_id),
                    ..Default::default()
                }],
            })
            .await?;

        let context = self.find_context(name, type_name).await?.ok_or_else(|| {
            MetadataError::Invariant(format!(
                "context {:?} of type {:?} is missing after creation",
                name, type_name
            ))
        })?;
        info!(
            "Created context {:?} of type {:?} with id {:?}",
            name, type_name, context.id
        );
        Ok(context)
    }

    // An empty lookup response is a miss, not an error.
    async fn find_context(&self, name: &str, type_name: &str) -> MetadataResult<Option<Context>> {
        let request = GetContextByTypeAndNameRequest {
            type_name: type_name.to_string(),
            context_name: name.to_string(),
        };
        match self.service.get_context_by_type_and_name(request).await {
            Ok(response) => Ok(response.context.filter(|context| context.id.is_some())),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ensure_context_type(&self, type_name: &str) -> MetadataResult<i64> {
        let request = GetContextTypeRequest {
            type_name: type_name.to_string(),
        };
        let existing = match self.service.get_context_type(request).await {
            Ok(response) => response.context_type.and_then(|context_type| context_type.id),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        if let Some(id) = existing {
            return Ok(id);
        }

        let response = self
            .service
            .put_context_type(PutContextTypeRequest {
                context_type: ContextType::named(type_name),
            })
            .await?;
        response.type_id.ok_or_else(|| {
            MetadataError::Invariant(format!("no type id for context type {:?}", type_name))
        })
    }

    pub async fn ensure_artifact_type(&self, schema: &str) -> MetadataResult<ArtifactType> {
        let name = artifact_type_title(schema)?;
        let response = self
            .service
            .put_artifact_type(PutArtifactTypeRequest {
                artifact_type: ArtifactType {
                    id: None,
                    name: name.clone(),
                },
            })
            .await?;

        let id = response.type_id.ok_or_else(|| {
            MetadataError::Invariant(format!("no type id for artifact type {:?}", name))
        })?;
        Ok(ArtifactType { id: Some(id), name })
    }

    /// Registers `artifact` under the type named by `schema` and returns the stored record.
    pub async fn record_artifact(&self, schema: &str, artifact: Artifact) -> MetadataResult<Artifact> {
        let artifact_type = self.ensure_artifact_type(schema).await?;
        let artifact = Artifact {
            type_id: artifact_type.id,
            ..artifact
        };

        let response = self
            .service
            .put_artifacts(PutArtifactsRequest {
                artifacts: vec![artifact],
            })
            .await?;
        let id = single(&response.artifact_ids, "artifact ids from PutArtifacts")?;

        let mut artifacts = self.get_artifacts(&[id]).await?;
        let stored = match artifacts.len() {
            1 => artifacts.remove(0),
            n => {
                return Err(MetadataError::Invariant(format!(
                    "expected one artifact with id {}, got {}",
                    id, n
                )))
            }
        };
        info!(
            "Registered artifact {} of type {:?} at {:?}",
            id,
            artifact_type.name,
            stored.uri()
        );
        Ok(stored)
    }

    /// Records a completed step attributed to both pipeline contexts.
    pub async fn record_execution(&self, record: ExecutionRecord) -> MetadataResult<Execution> {
        let contexts = self.pipeline_contexts().await?;
        let type_id = self
            .service
            .put_execution_type(PutExecutionTypeRequest {
                execution_type: ExecutionType::named(CONTAINER_EXECUTION_TYPE),
            })
            .await?
            .type_id
            .ok_or_else(|| {
                MetadataError::Invariant(format!(
                    "no type id for execution type {:?}",
                    CONTAINER_EXECUTION_TYPE
                ))
            })?;

        let mut custom_properties = record.custom_properties;
        custom_properties.insert("pipeline_name".into(), self.pipeline_name.as_str().into());
        custom_properties.insert(
            "pipeline_run_id".into(),
            self.pipeline_run_id.as_str().into(),
        );

        let events = record
            .input_artifact_ids
            .iter()
            .map(|id| Event::for_artifact(EventType::Input, *id))
            .chain(
                record
                    .output_artifact_ids
                    .iter()
                    .map(|id| Event::for_artifact(EventType::Output, *id)),
            )
            .map(|event| ArtifactAndEvent {
                artifact: None,
                event: Some(event),
            })
            .collect();

        let response = self
            .service
            .put_execution(PutExecutionRequest {
                execution: Execution {
                    type_id: Some(type_id),
                    last_known_state: Some(ExecutionState::Complete),
                    custom_properties,
                    ..Default::default()
                },
                artifact_event_pairs: events,
                contexts: contexts.to_vec(),
            })
            .await?;
        let id = response.execution_id.ok_or_else(|| {
            MetadataError::Invariant("no execution id from PutExecution".to_string())
        })?;

        let mut executions = self
            .service
            .get_executions_by_id(GetExecutionsByIdRequest {
                execution_ids: vec![id],
            })
            .await?
            .executions;
        if executions.len() != 1 {
            return Err(MetadataError::Invariant(format!(
                "expected one execution with id {}, got {}",
                id,
                executions.len()
            )));
        }
        info!("Recorded execution {}", id);
        Ok(executions.remove(0))
    }

    pub async fn get_artifacts(&self, ids: &[i64]) -> MetadataResult<Vec<Artifact>> {
        let response = self
            .service
            .get_artifacts_by_id(GetArtifactsByIdRequest {
                artifact_ids: ids.to_vec(),
            })
            .await?;
        Ok(response.artifacts)
    }
}

fn single(ids: &[i64], what: &str) -> MetadataResult<i64> {
    match ids {
        [id] => Ok(*id),
        _ => Err(MetadataError::Invariant(format!(
            "expected exactly one of {}, got {}",
            what,
            ids.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryMetadataStore;
    use crate::service::method;
    use launcher_common::types::Value;

    fn client() -> MetadataClient<InMemoryMetadataStore> {
        MetadataClient::new(InMemoryMetadataStore::new(), "my-pipeline", "run-1")
    }

    #[tokio::test]
    async fn ensure_context_is_idempotent() {
        let client = client();

        let first = client.ensure_context("p", PIPELINE_CONTEXT_TYPE).await.unwrap();
        let second = client.ensure_context("p", PIPELINE_CONTEXT_TYPE).await.unwrap();

        assert_eq!(first, second);
        assert!(first.id.is_some());
        let store = client.service();
        assert_eq!(store.call_count(method::PUT_CONTEXTS), 1);
        assert_eq!(store.call_count(method::PUT_CONTEXT_TYPE), 1);
        assert_eq!(store.contexts().len(), 1);
    }

    #[tokio::test]
    async fn ensure_context_reuses_registered_type() {
        let client = client();
        client.ensure_context("a", PIPELINE_CONTEXT_TYPE).await.unwrap();
        let b = client.ensure_context("b", PIPELINE_CONTEXT_TYPE).await.unwrap();

        let store = client.service();
        assert_eq!(store.call_count(method::PUT_CONTEXT_TYPE), 1);
        assert_eq!(store.call_count(method::PUT_CONTEXTS), 2);
        assert_eq!(b.name, "b");
    }

    #[tokio::test]
    async fn context_lookup_failures_are_surfaced() {
        let client = client();
        client
            .service()
            .fail_method(method::GET_CONTEXT_BY_TYPE_AND_NAME, 500);

        let err = client
            .ensure_context("p", PIPELINE_CONTEXT_TYPE)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Status { status: 500, .. }));
        assert_eq!(client.service().mutating_call_count(), 0);
    }

    #[tokio::test]
    async fn not_found_context_lookup_is_a_miss() {
        let client = client();
        client
            .service()
            .fail_method(method::GET_CONTEXT_BY_TYPE_AND_NAME, 404);

        // creation succeeds, but the read-back keeps reporting a miss
        let err = client
            .ensure_context("p", PIPELINE_CONTEXT_TYPE)
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::Invariant(_)));
        assert_eq!(client.service().call_count(method::PUT_CONTEXTS), 1);
    }

    #[tokio::test]
    async fn pipeline_contexts_are_created_once() {
        let client = client();
        let first = client.pipeline_contexts().await.unwrap().clone();
        let second = client.pipeline_contexts().await.unwrap().clone();

        assert_eq!(first, second);
        assert_eq!(first.pipeline.name, "my-pipeline");
        assert_eq!(first.pipeline_run.name, "run-1");
        assert_ne!(first.pipeline.type_id, first.pipeline_run.type_id);
        assert_eq!(
            client
                .service()
                .call_count(method::GET_CONTEXT_BY_TYPE_AND_NAME),
            4
        );
    }

    #[tokio::test]
    async fn record_artifact_returns_the_stored_copy() {
        let client = client();
        let stored = client
            .record_artifact(
                "title: kfp.Dataset",
                Artifact::with_uri("gs://bucket/prefix/p/r/t/data"),
            )
            .await
            .unwrap();

        assert!(stored.id.is_some());
        assert!(stored.type_id.is_some());
        assert!(stored.create_time_since_epoch.is_some());
        assert_eq!(stored.uri(), "gs://bucket/prefix/p/r/t/data");
        assert_eq!(client.service().call_count(method::GET_ARTIFACTS_BY_ID), 1);
    }

    #[tokio::test]
    async fn record_artifact_without_title_makes_no_mutating_call() {
        let client = client();
        let err = client
            .record_artifact("type: object", Artifact::with_uri("gs://bucket/k"))
            .await
            .unwrap_err();

        assert!(matches!(err, MetadataError::Schema(_)));
        assert!(client.service().calls().is_empty());
    }

    #[tokio::test]
    async fn record_execution_links_artifacts_and_contexts() {
        let client = client();
        let input = client
            .record_artifact("title: kfp.Dataset", Artifact::with_uri("gs://b/in"))
            .await
            .unwrap();
        let output = client
            .record_artifact("title: kfp.Model", Artifact::with_uri("gs://b/out"))
            .await
            .unwrap();

        let mut custom_properties = Properties::new();
        custom_properties.insert("task_name".into(), Value::from("train"));
        let execution = client
            .record_execution(ExecutionRecord {
                custom_properties,
                input_artifact_ids: vec![input.id.unwrap()],
                output_artifact_ids: vec![output.id.unwrap()],
            })
            .await
            .unwrap();

        assert_eq!(execution.last_known_state, Some(ExecutionState::Complete));
        assert_eq!(
            execution.custom_properties["pipeline_name"],
            Value::from("my-pipeline")
        );
        assert_eq!(execution.custom_properties["task_name"], Value::from("train"));

        let store = client.service();
        let events = store.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::Input);
        assert_eq!(events[0].artifact_id, input.id);
        assert_eq!(events[1].event_type, EventType::Output);
        assert_eq!(events[1].execution_id, execution.id);

        let contexts = client.pipeline_contexts().await.unwrap();
        let execution_id = execution.id.unwrap();
        assert!(store.is_associated(contexts.pipeline.id.unwrap(), execution_id));
        assert!(store.is_associated(contexts.pipeline_run.id.unwrap(), execution_id));
        assert!(store.is_attributed(contexts.pipeline_run.id.unwrap(), output.id.unwrap()));
    }

    #[test]
    fn single_rejects_other_counts() {
        assert_eq!(single(&[4], "ids").unwrap(), 4);
        assert!(matches!(single(&[], "ids"), Err(MetadataError::Invariant(_))));
        assert!(matches!(single(&[1, 2], "ids"), Err(MetadataError::Invariant(_))));
    }
}
