//! Sandbox namespace resolution

use crate::command::{command_line, CommandRunner};
use crate::error::{PluginError, PluginResult};
use async_trait::async_trait;
use std::sync::Arc;

/// Resolves a workload's sandbox handle to its network namespace id
#[async_trait]
pub trait NetnsResolver: Send + Sync {
    async fn resolve(&self, sandbox_id: &str) -> PluginResult<String>;
}

/// Asks the container runtime for the sandbox's init pid
pub struct DockerNetnsResolver {
    runner: Arc<dyn CommandRunner>,
}

impl DockerNetnsResolver {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl NetnsResolver for DockerNetnsResolver {
    async fn resolve(&self, sandbox_id: &str) -> PluginResult<String> {
        let args = ["inspect", "-f", "{{.State.Pid}}", sandbox_id];
        let output = self.runner.run("docker", &args).await?;

        let pid = output
            .first()
            .map(|line| line.trim().trim_matches('\''))
            .unwrap_or_default();

        match pid.parse::<u32>() {
            Ok(0) => Err(PluginError::Sandbox {
                sandbox: sandbox_id.to_string(),
                reason: "not running".to_string(),
            }),
            Ok(pid) => Ok(pid.to_string()),
            Err(_) => Err(PluginError::UnexpectedOutput {
                command: command_line("docker", &args),
                detail: format!("expected a pid, got {:?}", pid),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::MockCommandRunner;

    fn resolver(output: &[&str]) -> (DockerNetnsResolver, Arc<MockCommandRunner>) {
        let mock = Arc::new(MockCommandRunner::new());
        mock.respond("docker inspect", output);
        (DockerNetnsResolver::new(mock.clone()), mock)
    }

    #[tokio::test]
    async fn test_resolve_pid() {
        let (resolver, mock) = resolver(&["'31337'"]);
        assert_eq!(resolver.resolve("abc123").await.unwrap(), "31337");
        assert_eq!(mock.calls(), vec!["docker inspect -f {{.State.Pid}} abc123"]);
    }

    #[tokio::test]
    async fn test_stopped_sandbox() {
        let (resolver, _) = resolver(&["0"]);
        assert!(matches!(
            resolver.resolve("abc123").await,
            Err(PluginError::Sandbox { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_output() {
        let (resolver, _) = resolver(&[]);
        assert!(matches!(
            resolver.resolve("abc123").await,
            Err(PluginError::UnexpectedOutput { .. })
        ));
    }
}
