pub const DEFAULT_INPUT_STAGING_ROOT: &str = "/tmp/kfp_launcher_inputs";
pub const DEFAULT_OUTPUT_STAGING_ROOT: &str = "/tmp/kfp_launcher_outputs";

// file name of every staged artifact, locally and remotely
pub const STAGED_FILE_NAME: &str = "data";

pub const PIPELINE_CONTEXT_TYPE: &str = "kfp.Pipeline";
pub const PIPELINE_RUN_CONTEXT_TYPE: &str = "kfp.PipelineRun";
pub const CONTAINER_EXECUTION_TYPE: &str = "kfp.ContainerExecution";

pub const DEFAULT_METADATA_PORT: u16 = 8080;

// copy buffer for uploads
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;
