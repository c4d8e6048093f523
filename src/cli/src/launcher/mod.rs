//! Runs one pipeline step end to end.
//!
//! A launch moves through [`Phase`]s strictly in order and stops at the first failure.
//! Nothing is registered with the metadata service before the step has exited successfully,
//! and no output byte is uploaded before its artifact record exists.

mod errors;
mod phase;
mod process;
mod store_opener;

pub use errors::{LaunchError, LaunchFailure};
pub use phase::Phase;
pub use process::run_command;
pub use store_opener::SchemeStoreOpener;

use crate::config::LauncherConfig;
use launcher_common::object_store::{download_to_file, upload_file, ObjectStore, ObjectStoreOpener};
use launcher_common::placeholder::PlaceholderMap;
use launcher_common::resolver::{PlaceholderResolver, StagingLayout, TaskIdentity};
use launcher_common::runtime_info::RuntimeInfo;
use launcher_common::storage_root::StorageRoot;
use launcher_common::types::{Artifact, Execution, Properties, Value};
use launcher_metadata::{ExecutionRecord, MetadataClient, MetadataStoreService};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

/// What a successful launch left in the metadata service.
#[derive(Clone, Debug, PartialEq)]
pub struct LaunchOutcome {
    /// Server copies of the registered output artifacts, by output name
    pub output_artifacts: BTreeMap<String, Artifact>,
    pub execution: Execution,
}

pub struct Launcher<S> {
    config: LauncherConfig,
    storage_root: StorageRoot,
    task: TaskIdentity,
    layout: StagingLayout,
    runtime_info: RuntimeInfo,
    placeholders: PlaceholderMap,
    metadata: MetadataClient<S>,
    store_opener: Box<dyn ObjectStoreOpener>,
    phase: Phase,
}

impl<S: MetadataStoreService> Launcher<S> {
    /// Validates the configuration and decodes the runtime descriptor. Failures are reported
    /// as [`Phase::Init`] failures.
    pub fn new(
        config: LauncherConfig,
        metadata: S,
        store_opener: Box<dyn ObjectStoreOpener>,
    ) -> Result<Self, LaunchFailure> {
        let init = |error: LaunchError| LaunchFailure {
            phase: Phase::Init,
            error,
        };

        config.validate().map_err(init)?;
        let storage_root = config.storage_root().map_err(|e| init(e.into()))?;
        let runtime_info =
            RuntimeInfo::parse(&config.runtime_info_json).map_err(|e| init(e.into()))?;

        let metadata = MetadataClient::new(metadata, &config.pipeline_name, &config.pipeline_run_id);
        info!(
            "Launching task {:?} of run {:?} under {}",
            config.pipeline_task_id, config.pipeline_run_id, storage_root
        );

        Ok(Self {
            task: config.task_identity(),
            layout: config.staging_layout(),
            config,
            storage_root,
            runtime_info,
            placeholders: PlaceholderMap::new(),
            metadata,
            store_opener,
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn metadata(&self) -> &MetadataClient<S> {
        &self.metadata
    }

    pub async fn run(mut self, command: &[String]) -> Result<LaunchOutcome, LaunchFailure> {
        self.advance();
        self.stage_inputs().await.map_err(|e| self.fail(e))?;

        self.advance();
        self.stage_outputs().await.map_err(|e| self.fail(e))?;

        self.advance();
        let args = self.placeholders.rewrite(command);
        run_command(&args).await.map_err(|e| self.fail(e))?;

        self.advance();
        let outcome = self.upload_and_record().await.map_err(|e| self.fail(e))?;

        self.advance();
        Ok(outcome)
    }

    fn advance(&mut self) {
        self.phase = self.phase.next();
        info!("Entering {}", self.phase);
    }

    fn fail(&self, error: LaunchError) -> LaunchFailure {
        LaunchFailure {
            phase: self.phase,
            error,
        }
    }

    async fn open_store(&self) -> Result<Box<dyn ObjectStore>, LaunchError> {
        Ok(self
            .store_opener
            .open(&self.storage_root.to_base_url())
            .await?)
    }

    async fn stage_inputs(&mut self) -> Result<(), LaunchError> {
        let resolver = PlaceholderResolver::new(&self.storage_root, &self.task, &self.layout);
        resolver.resolve_inputs(&mut self.runtime_info, &mut self.placeholders)?;

        if self.runtime_info.input_artifacts.is_empty() {
            return Ok(());
        }

        let store = self.open_store().await?;
        let staged = self.download_inputs(store.as_ref()).await;
        let closed = store.close().await;
        staged?;
        closed?;
        Ok(())
    }

    async fn download_inputs(&self, store: &dyn ObjectStore) -> Result<(), LaunchError> {
        for (name, input) in &self.runtime_info.input_artifacts {
            let uri = input.artifact.as_ref().map(Artifact::uri).unwrap_or_default();
            let key = self
                .storage_root
                .key_for(uri)
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            let path = self
                .layout
                .input_path(name)
                .map_err(|e| LaunchError::for_artifact(name, e))?;

            let copied = download_to_file(store, &key, &path)
                .await
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            info!("Staged input {:?}: {} bytes from {:?} to {:?}", name, copied, key, path);
        }
        Ok(())
    }

    async fn stage_outputs(&mut self) -> Result<(), LaunchError> {
        let resolver = PlaceholderResolver::new(&self.storage_root, &self.task, &self.layout);
        resolver.resolve_outputs(&mut self.runtime_info, &mut self.placeholders)?;

        for (name, output) in &self.runtime_info.output_artifacts {
            let local_path = self
                .layout
                .output_path(name)
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            create_parent_dir(&local_path)
                .await
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            debug!(
                "Output {:?} is staged at {:?} for {:?}",
                name,
                local_path,
                output.uri.as_deref().unwrap_or_default()
            );
        }

        for parameter in self.runtime_info.output_parameters.values() {
            create_parent_dir(Path::new(&parameter.file_output_path)).await?;
        }
        Ok(())
    }

    async fn upload_and_record(&self) -> Result<LaunchOutcome, LaunchError> {
        self.metadata.pipeline_contexts().await?;

        let output_artifacts = if self.runtime_info.output_artifacts.is_empty() {
            BTreeMap::new()
        } else {
            let store = self.open_store().await?;
            let recorded = self.record_outputs(store.as_ref()).await;
            let closed = store.close().await;
            let recorded = recorded?;
            closed?;
            recorded
        };

        let record = ExecutionRecord {
            custom_properties: self.execution_properties().await?,
            input_artifact_ids: self
                .runtime_info
                .input_artifacts
                .values()
                .filter_map(|input| input.artifact.as_ref().and_then(|a| a.id))
                .collect(),
            output_artifact_ids: output_artifacts.values().filter_map(|a| a.id).collect(),
        };
        let execution = self.metadata.record_execution(record).await?;

        Ok(LaunchOutcome {
            output_artifacts,
            execution,
        })
    }

    async fn record_outputs(
        &self,
        store: &dyn ObjectStore,
    ) -> Result<BTreeMap<String, Artifact>, LaunchError> {
        let mut recorded = BTreeMap::new();

        for (name, output) in &self.runtime_info.output_artifacts {
            let uri = output
                .uri
                .as_deref()
                .ok_or_else(|| LaunchError::Unresolved(name.clone()))?;

            let artifact = self
                .metadata
                .record_artifact(&output.artifact_schema, Artifact::with_uri(uri))
                .await
                .map_err(|e| LaunchError::for_artifact(name, e))?;

            let sink = Path::new(&output.file_output_path);
            write_artifact_record(&artifact, sink)
                .await
                .map_err(|e| LaunchError::for_artifact(name, e))?;

            let key = self
                .storage_root
                .key_for(uri)
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            let local_path = self
                .layout
                .output_path(name)
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            let copied = upload_file(store, &local_path, &key)
                .await
                .map_err(|e| LaunchError::for_artifact(name, e))?;
            info!("Uploaded output {:?}: {} bytes to {:?}", name, copied, key);

            recorded.insert(name.clone(), artifact);
        }

        Ok(recorded)
    }

    async fn execution_properties(&self) -> Result<Properties, LaunchError> {
        let mut properties = Properties::new();
        properties.insert("task_name".into(), self.config.task_name.as_str().into());
        properties.insert(
            "kfp_pod_name".into(),
            self.config.pipeline_task_id.as_str().into(),
        );
        if let Some(image) = &self.config.container_image {
            properties.insert("container_image".into(), image.as_str().into());
        }

        for (name, parameter) in &self.runtime_info.input_parameters {
            properties.insert(
                format!("input:{}", name),
                parameter.parameter_type.value_of(&parameter.parameter_value),
            );
        }

        for (name, parameter) in &self.runtime_info.output_parameters {
            let path = &parameter.file_output_path;
            match tokio::fs::read(path).await {
                Ok(raw) => {
                    let raw = String::from_utf8_lossy(&raw);
                    let value: Value = parameter.parameter_type.value_of(&raw);
                    properties.insert(format!("output:{}", name), value);
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    warn!("Output parameter {:?} was not written to {:?}", name, path);
                }
                Err(e) => return Err(LaunchError::io(path, e)),
            }
        }

        Ok(properties)
    }
}

async fn create_parent_dir(path: &Path) -> Result<(), LaunchError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| LaunchError::io(parent, e)),
        _ => Ok(()),
    }
}

/// Writes the server's copy of `artifact` to `sink` in protojson form.
async fn write_artifact_record(artifact: &Artifact, sink: &Path) -> Result<(), LaunchError> {
    create_parent_dir(sink).await?;
    let encoded = serde_json::to_vec(artifact)?;
    tokio::fs::write(sink, encoded)
        .await
        .map_err(|e| LaunchError::io(sink, e))
}
