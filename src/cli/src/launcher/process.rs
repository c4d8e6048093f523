use super::errors::LaunchError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::info;

/// Runs `args` with the launcher's own stdio and waits for it. Any non-zero exit is an error.
pub async fn run_command(args: &[String]) -> Result<(), LaunchError> {
    let (program, rest) = args.split_first().ok_or(LaunchError::EmptyCommand)?;
    info!("Running command: {:?}", args);

    let status = Command::new(program)
        .args(rest)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .map_err(|source| LaunchError::Spawn {
            program: program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(LaunchError::ChildFailed {
            program: program.clone(),
            status,
        });
    }

    info!("Command {:?} finished: {}", program, status);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[tokio::test]
    async fn succeeds_on_zero_exit() {
        run_command(&command(&["true"])).await.unwrap();
    }

    #[tokio::test]
    async fn reports_non_zero_exit() {
        let error = run_command(&command(&["sh", "-c", "exit 3"]))
            .await
            .unwrap_err();
        match error {
            LaunchError::ChildFailed { program, status } => {
                assert_eq!(program, "sh");
                assert_eq!(status.code(), Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn reports_spawn_failures_and_empty_commands() {
        let error = run_command(&command(&["/nonexistent/launcher-test-binary"]))
            .await
            .unwrap_err();
        assert!(matches!(error, LaunchError::Spawn { .. }));

        let error = run_command(&[]).await.unwrap_err();
        assert!(matches!(error, LaunchError::EmptyCommand));
    }
}
