use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::commands::Cli;
use crate::launcher::LaunchError;
use config::{Config as RConfig, Environment, File, FileFormat};
use launcher_aws::{AwsConfig, S3Settings};
use launcher_common::constants::{
    DEFAULT_INPUT_STAGING_ROOT, DEFAULT_METADATA_PORT, DEFAULT_OUTPUT_STAGING_ROOT,
};
use launcher_common::resolver::{OutputKeyLayout, StagingLayout, TaskIdentity};
use launcher_common::storage_root::{StorageRoot, StorageRootError};
use launcher_gcp::GcsSettings;

pub const ENV_PREFIX: &str = "LAUNCHER";

/// Every option of one launch, merged from defaults, the TOML file, the environment and the
/// command line. Required options are left empty until [`LauncherConfig::validate`] checks them.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct LauncherConfig {
    pub pipeline_name: String,
    pub pipeline_run_id: String,
    pub pipeline_task_id: String,
    pub pipeline_root: String,
    pub task_name: String,
    pub mlmd_server_address: String,
    pub mlmd_server_port: u16,
    pub runtime_info_json: String,

    pub input_staging_root: PathBuf,
    pub output_staging_root: PathBuf,
    pub per_artifact_output_keys: bool,
    #[serde(default)]
    pub container_image: Option<String>,

    pub aws_init_type: AwsConfig,
    #[serde(default)]
    pub aws_region: Option<String>,
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,
    #[serde(default)]
    pub gcs_endpoint: Option<String>,
    #[serde(default)]
    pub gcs_access_token: Option<String>,

    pub log_level: String,
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            pipeline_name: String::new(),
            pipeline_run_id: String::new(),
            pipeline_task_id: String::new(),
            pipeline_root: String::new(),
            task_name: String::new(),
            mlmd_server_address: String::new(),
            mlmd_server_port: DEFAULT_METADATA_PORT,
            runtime_info_json: String::new(),
            input_staging_root: PathBuf::from(DEFAULT_INPUT_STAGING_ROOT),
            output_staging_root: PathBuf::from(DEFAULT_OUTPUT_STAGING_ROOT),
            per_artifact_output_keys: false,
            container_image: None,
            aws_init_type: AwsConfig::Env,
            aws_region: None,
            aws_endpoint_url: None,
            gcs_endpoint: None,
            gcs_access_token: None,
            log_level: "info".to_string(),
            log_file: None,
        }
    }
}

impl LauncherConfig {
    /// Fails on the first required option that is still empty, in declaration order.
    pub fn validate(&self) -> Result<(), LaunchError> {
        let required = [
            ("pipeline_name", self.pipeline_name.is_empty()),
            ("pipeline_run_id", self.pipeline_run_id.is_empty()),
            ("pipeline_task_id", self.pipeline_task_id.is_empty()),
            ("pipeline_root", self.pipeline_root.is_empty()),
            ("task_name", self.task_name.is_empty()),
            ("mlmd_server_address", self.mlmd_server_address.is_empty()),
            ("mlmd_server_port", self.mlmd_server_port == 0),
        ];

        match required.iter().find(|(_, missing)| *missing) {
            Some((option, _)) => Err(LaunchError::MissingOption(*option)),
            None => Ok(()),
        }
    }

    pub fn storage_root(&self) -> Result<StorageRoot, StorageRootError> {
        StorageRoot::parse(&self.pipeline_root)
    }

    pub fn task_identity(&self) -> TaskIdentity {
        TaskIdentity {
            pipeline_name: self.pipeline_name.clone(),
            pipeline_run_id: self.pipeline_run_id.clone(),
            pipeline_task_id: self.pipeline_task_id.clone(),
        }
    }

    pub fn staging_layout(&self) -> StagingLayout {
        StagingLayout {
            input_root: self.input_staging_root.clone(),
            output_root: self.output_staging_root.clone(),
            output_keys: if self.per_artifact_output_keys {
                OutputKeyLayout::PerArtifact
            } else {
                OutputKeyLayout::SharedTaskKey
            },
        }
    }

    pub fn s3_settings(&self) -> S3Settings {
        S3Settings {
            init_type: self.aws_init_type.clone(),
            region: self.aws_region.clone(),
            endpoint_url: self.aws_endpoint_url.clone(),
        }
    }

    pub fn gcs_settings(&self) -> GcsSettings {
        GcsSettings {
            endpoint: self.gcs_endpoint.clone(),
            access_token: self.gcs_access_token.clone(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load(cli: &Cli) -> Result<LauncherConfig> {
        Self::load_layers(cli.config.as_deref(), Some(cli))
    }

    pub fn load_default_config() -> Result<LauncherConfig> {
        Self::load_layers(None, None)
    }

    fn load_layers(path: Option<&Path>, cli: Option<&Cli>) -> Result<LauncherConfig> {
        let defaults = LauncherConfig::default();
        let mut builder = RConfig::builder()
            .set_default("pipeline_name", "")?
            .set_default("pipeline_run_id", "")?
            .set_default("pipeline_task_id", "")?
            .set_default("pipeline_root", "")?
            .set_default("task_name", "")?
            .set_default("mlmd_server_address", "")?
            .set_default("mlmd_server_port", defaults.mlmd_server_port)?
            .set_default("runtime_info_json", "")?
            .set_default("input_staging_root", DEFAULT_INPUT_STAGING_ROOT)?
            .set_default("output_staging_root", DEFAULT_OUTPUT_STAGING_ROOT)?
            .set_default("per_artifact_output_keys", false)?
            .set_default("aws_init_type", defaults.aws_init_type)?
            .set_default("log_level", defaults.log_level)?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true));

        if let Some(cli) = cli {
            builder = builder
                .set_override_option("pipeline_name", cli.pipeline_name.clone())?
                .set_override_option("pipeline_run_id", cli.pipeline_run_id.clone())?
                .set_override_option("pipeline_task_id", cli.pipeline_task_id.clone())?
                .set_override_option("pipeline_root", cli.pipeline_root.clone())?
                .set_override_option("task_name", cli.task_name.clone())?
                .set_override_option("mlmd_server_address", cli.mlmd_server_address.clone())?
                .set_override_option("mlmd_server_port", cli.mlmd_server_port)?
                .set_override_option("runtime_info_json", cli.runtime_info_json.clone())?
                .set_override_option("container_image", cli.container_image.clone())?
                .set_override_option("log_level", cli.log_level.clone())?
                .set_override_option(
                    "log_file",
                    cli.log_file.as_ref().map(|p| p.to_string_lossy().into_owned()),
                )?
                .set_override_option(
                    "per_artifact_output_keys",
                    cli.per_artifact_output_keys.then_some(true),
                )?;
        }

        let config: LauncherConfig = builder
            .build()?
            .try_deserialize()
            .context("failed to parse launcher config")?;

        Ok(config)
    }
}
