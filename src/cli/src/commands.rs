use clap::Parser;
use std::path::PathBuf;

/// Flags keep the snake_case names the pipeline compiler emits.
#[derive(Parser, Clone, Debug, Default)]
#[clap(
    name = "launcher",
    about = "Runs one pipeline step: stages its input artifacts, executes it and records its outputs",
    version
)]
pub struct Cli {
    /// TOML file with launcher options
    #[clap(long)]
    pub config: Option<PathBuf>,

    #[clap(long = "pipeline_name")]
    pub pipeline_name: Option<String>,

    #[clap(long = "pipeline_run_id")]
    pub pipeline_run_id: Option<String>,

    #[clap(long = "pipeline_task_id")]
    pub pipeline_task_id: Option<String>,

    /// Storage root, e.g. gs://bucket/prefix
    #[clap(long = "pipeline_root")]
    pub pipeline_root: Option<String>,

    #[clap(long = "task_name")]
    pub task_name: Option<String>,

    #[clap(long = "mlmd_server_address")]
    pub mlmd_server_address: Option<String>,

    #[clap(long = "mlmd_server_port")]
    pub mlmd_server_port: Option<u16>,

    /// Runtime descriptor of the step's inputs and outputs
    #[clap(long = "runtime_info_json")]
    pub runtime_info_json: Option<String>,

    #[clap(long = "container_image")]
    pub container_image: Option<String>,

    /// Upload each output artifact to its own key instead of the task's shared key
    #[clap(long = "per_artifact_output_keys")]
    pub per_artifact_output_keys: bool,

    #[clap(long = "log_level")]
    pub log_level: Option<String>,

    #[clap(long = "log_file")]
    pub log_file: Option<PathBuf>,

    /// Step command and arguments, after `--`
    #[clap(last = true, required = true)]
    pub command: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_trailing_command() {
        let cli = Cli::try_parse_from([
            "launcher",
            "--pipeline_name",
            "p",
            "--mlmd_server_port",
            "9090",
            "--per_artifact_output_keys",
            "--",
            "python",
            "train.py",
            "--epochs",
            "{{$.inputs.parameters['epochs']}}",
        ])
        .unwrap();

        assert_eq!(cli.pipeline_name.as_deref(), Some("p"));
        assert_eq!(cli.mlmd_server_port, Some(9090));
        assert!(cli.per_artifact_output_keys);
        assert_eq!(
            cli.command,
            vec![
                "python",
                "train.py",
                "--epochs",
                "{{$.inputs.parameters['epochs']}}"
            ]
        );
    }

    #[test]
    fn requires_a_command() {
        assert!(Cli::try_parse_from(["launcher", "--pipeline_name", "p"]).is_err());
    }
}
