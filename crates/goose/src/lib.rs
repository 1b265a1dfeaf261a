use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::{debug, info};

/// goose driver names for the stores this workspace migrates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres,
    Clickhouse,
}

impl Driver {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Clickhouse => "clickhouse",
        }
    }
}

/// Applies SQL migrations by spawning the goose binary.
pub struct MigrationRunner {
    goose_binary_path: String,
    migrations_dir: String,
    driver: Driver,
    dsn: String,
}

impl MigrationRunner {
    pub fn new(
        goose_binary_path: impl Into<String>,
        migrations_dir: impl Into<String>,
        driver: Driver,
        dsn: impl Into<String>,
    ) -> Self {
        Self {
            goose_binary_path: goose_binary_path.into(),
            migrations_dir: migrations_dir.into(),
            driver,
            dsn: dsn.into(),
        }
    }

    /// `goose -dir <dir> <driver> <dsn> up`
    pub async fn run_migrations(&self) -> Result<()> {
        info!(driver = self.driver.as_str(), dir = %self.migrations_dir, "running migrations");
        let stdout = self.goose("up").await?;
        debug!(driver = self.driver.as_str(), "migrations completed:\n{}", stdout);
        Ok(())
    }

    pub async fn rollback_migration(&self) -> Result<()> {
        info!(driver = self.driver.as_str(), "rolling back most recent migration");
        self.goose("down").await.map(|_| ())
    }

    pub async fn migration_status(&self) -> Result<String> {
        self.goose("status").await
    }

    fn args<'a>(&'a self, command: &'a str) -> [&'a str; 5] {
        [
            "-dir",
            &self.migrations_dir,
            self.driver.as_str(),
            &self.dsn,
            command,
        ]
    }

    async fn goose(&self, command: &str) -> Result<String> {
        let output = Command::new(&self.goose_binary_path)
            .args(self.args(command))
            .output()
            .await
            .with_context(|| format!("failed to spawn {}", self.goose_binary_path))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "goose {} failed for {}.\nstdout: {}\nstderr: {}",
                command,
                self.driver.as_str(),
                stdout,
                stderr
            );
        }

        Ok(stdout)
    }
}
