/*!
 * Process Invoker
 * Runs the external Bluetooth and audio tools and captures their text
 */

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{BluedeckError, Result};

/// Captured result of one external invocation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Standard output followed by standard error, lossily decoded.
    pub text: String,
}

#[cfg(test)]
impl CommandOutput {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            success: true,
            text: text.into(),
        }
    }

    pub fn failed(text: impl Into<String>) -> Self {
        Self {
            success: false,
            text: text.into(),
        }
    }
}

/// Seam between the core and the operating system.
///
/// A non-zero exit is not an error: the captured text is returned with
/// `success == false` because callers inspect it either way. Only a
/// process that cannot be started at all yields `Err`.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runner backed by real child processes.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!("exec: {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| BluedeckError::Invocation {
                program: program.to_string(),
                source,
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            tracing::debug!("{} exited with {}", program, output.status);
        }

        Ok(CommandOutput {
            success: output.status.success(),
            text,
        })
    }
}

/// Builds an owned argument vector from string slices.
pub fn args<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|s| s.as_ref().to_string()).collect()
}
