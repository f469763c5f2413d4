use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// goose subcommands the service uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GooseCommand {
    Up,
    Down,
    Status,
}

impl GooseCommand {
    fn as_arg(&self) -> &'static str {
        match self {
            GooseCommand::Up => "up",
            GooseCommand::Down => "down",
            GooseCommand::Status => "status",
        }
    }
}

/// Applies SQL migrations by shelling out to the goose binary.
///
/// The invocation is `goose -dir {migrations_dir} {driver} {dsn} {command}`.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    driver: String,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(
        goose_binary_path: String,
        migrations_dir: String,
        driver: String,
        dsn: String,
    ) -> Self {
        Self {
            goose_binary_path,
            migrations_dir,
            driver,
            dsn,
        }
    }

    /// Runner for the postgres driver
    pub fn postgres(goose_binary_path: String, migrations_dir: String, dsn: String) -> Self {
        Self::new(goose_binary_path, migrations_dir, "postgres".to_string(), dsn)
    }

    /// Apply every pending migration
    pub async fn run_migrations(&self) -> Result<()> {
        info!(migrations_dir = %self.migrations_dir, "Running database migrations");
        let stdout = self.exec(GooseCommand::Up).await?;
        debug!("migrations completed:\n{}", stdout);
        Ok(())
    }

    /// Roll back the most recent migration
    pub async fn rollback_migration(&self) -> Result<()> {
        let stdout = self.exec(GooseCommand::Down).await?;
        debug!("rollback completed:\n{}", stdout);
        Ok(())
    }

    /// goose's status table as printed by the binary
    pub async fn migration_status(&self) -> Result<String> {
        self.exec(GooseCommand::Status).await
    }

    fn args(&self, command: GooseCommand) -> Vec<&str> {
        vec![
            "-dir",
            &self.migrations_dir,
            &self.driver,
            &self.dsn,
            command.as_arg(),
        ]
    }

    async fn exec(&self, command: GooseCommand) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .args(self.args(command))
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.goose_binary_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "goose {} failed.\nstdout: {}\nstderr: {}",
                command.as_arg(),
                stdout,
                stderr
            );
        }

        Ok(stdout)
    }
}
