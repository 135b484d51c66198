use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{Shell, ShellOutput};
use crate::error::ToolError;
use crate::sandbox::SandboxedPath;

/// Runs commands through the platform shell with stdin closed.
#[derive(Debug, Clone, Default)]
pub struct ProcessShell {
    timeout: Option<Duration>,
}

impl ProcessShell {
    pub const fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    fn command(script: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.arg("/C").arg(script);
            cmd
        } else {
            // Single pipe for both streams keeps their interleaving.
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(format!("exec 2>&1\n{script}"));
            cmd
        }
    }
}

#[async_trait]
impl Shell for ProcessShell {
    async fn run(&self, command: &str, working_dir: &SandboxedPath) -> Result<ShellOutput> {
        working_dir.ensure_physically_contained()?;
        let mut cmd = Self::command(command);
        cmd.current_dir(working_dir.absolute())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::debug!("shell: `{command}` in {working_dir}");
        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{command}`"))?;
        let wait = child.wait_with_output();

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(ToolError::Timeout(format!(
                        "`{command}` did not finish within {} ms",
                        limit.as_millis()
                    ))
                    .into())
                }
            },
            None => wait.await,
        }
        .with_context(|| format!("Failed to run `{command}`"))?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(ShellOutput {
            output: text,
            exit_code: output.status.code(),
        })
    }
}
