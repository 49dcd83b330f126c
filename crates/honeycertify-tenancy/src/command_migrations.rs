//! Migration runner that shells out to an external migration tool
//!
//! The tool is started with `DATABASE_URL` set to the tenant store's
//! descriptor and must exit with status 0 once the store is up to date.

use async_trait::async_trait;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use honeycertify_core::{ConnectionDescriptor, Error, MigrationRunner, Result};

#[derive(Debug, Clone)]
pub struct CommandMigrationRunner {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandMigrationRunner {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: Duration::from_secs(300),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl MigrationRunner for CommandMigrationRunner {
    async fn apply(&self, descriptor: &ConnectionDescriptor) -> Result<()> {
        debug!(
            program = %self.program,
            descriptor = %descriptor,
            "Running migration command"
        );

        let output = Command::new(&self.program)
            .args(&self.args)
            .env("DATABASE_URL", descriptor.expose())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, output)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "migration command '{}' exceeded {:?}",
                    self.program, self.timeout
                ))
            })?
            .map_err(|e| {
                Error::Database(format!(
                    "Failed to start migration command '{}': {}",
                    self.program, e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Database(format!(
                "Migration command '{}' failed ({}): {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        info!(program = %self.program, descriptor = %descriptor, "Migration command succeeded");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> CommandMigrationRunner {
        CommandMigrationRunner::new("sh", vec!["-c".to_string(), script.to_string()])
    }

    #[tokio::test]
    async fn test_passes_descriptor_as_database_url() {
        let runner = sh(r#"test "$DATABASE_URL" = "postgres://db/tenant_abc""#);
        let descriptor = ConnectionDescriptor::new("postgres://db/tenant_abc");
        runner.apply(&descriptor).await.unwrap();
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let runner = sh("echo 'relation already exists' >&2; exit 3");
        let err = runner
            .apply(&ConnectionDescriptor::new("postgres://db/x"))
            .await
            .unwrap_err();
        match err {
            Error::Database(msg) => assert!(msg.contains("relation already exists")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let runner = CommandMigrationRunner::new("/nonexistent/migrate-tool", vec![]);
        let err = runner
            .apply(&ConnectionDescriptor::new("postgres://db/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_timeout() {
        let runner = sh("sleep 5").with_timeout(Duration::from_millis(50));
        let err = runner
            .apply(&ConnectionDescriptor::new("postgres://db/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
    }
}
