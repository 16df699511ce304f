//! Per-invocation state shared by the commands: loaded config, the document
//! store and a pipeline wired with the configured sub-tasks.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::adapters::sqlite::{initialize_from_config, SqliteDocumentStore};
use crate::adapters::subtasks::CommandSubtask;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AmbiguityItem, Config, SpecDocument};
use crate::domain::ports::{Analyzer, DocumentStore, FindingSink, Integrator, Researcher};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{
    ConvergenceThresholds, MergeIntegrator, OpenItemAnalyzer, OrchestratorConfig, RefinementPipeline,
    SubtaskOrchestrator,
};

pub struct CliContext {
    pub config: Config,
    pub json: bool,
}

impl CliContext {
    pub fn load(config_path: Option<&Path>, json: bool) -> Result<Self> {
        let config = ConfigLoader::load_with_override(config_path)?;
        Ok(Self { config, json })
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.config.output_dir)
    }

    pub async fn store(&self) -> Result<Arc<SqliteDocumentStore>> {
        let path = Path::new(&self.config.database.path);
        if self.config.database.path != ":memory:" && !path.exists() {
            bail!(
                "Database not found at {}. Run 'spec-refine init' first.",
                path.display()
            );
        }
        let pool = initialize_from_config(&self.config.database)
            .await
            .context("Failed to open database")?;
        Ok(Arc::new(SqliteDocumentStore::new(pool)))
    }

    pub async fn pipeline(&self) -> Result<RefinementPipeline> {
        let store: Arc<dyn DocumentStore> = self.store().await?;
        Ok(build_pipeline(&self.config, store))
    }

    /// Iterations cannot run without an external research command.
    pub fn require_research(&self) -> Result<()> {
        if self.config.subtasks.research.is_none() {
            bail!("No research sub-task configured. Set subtasks.research in .spec-refine/config.yaml.");
        }
        Ok(())
    }
}

/// Wire a pipeline from configuration: configured commands where present,
/// built-in analyzer and integrator otherwise.
pub fn build_pipeline(config: &Config, store: Arc<dyn DocumentStore>) -> RefinementPipeline {
    let subtasks = &config.subtasks;

    let analyzer: Arc<dyn Analyzer> = match &subtasks.analyze {
        Some(command) => Arc::new(CommandSubtask::new(command.clone())),
        None => Arc::new(OpenItemAnalyzer::new()),
    };
    let researcher: Arc<dyn Researcher> = match &subtasks.research {
        Some(command) => Arc::new(CommandSubtask::new(command.clone())),
        None => Arc::new(UnconfiguredResearcher),
    };
    let integrator: Arc<dyn Integrator> = match &subtasks.integrate {
        Some(command) => Arc::new(CommandSubtask::new(command.clone())),
        None => Arc::new(MergeIntegrator::new()),
    };

    let orchestrator = SubtaskOrchestrator::new(
        analyzer,
        researcher,
        integrator,
        OrchestratorConfig::from(&config.refinement),
    );
    RefinementPipeline::new(store, orchestrator, ConvergenceThresholds::from(&config.refinement))
        .with_artifact_dir(&config.output_dir)
}

struct UnconfiguredResearcher;

#[async_trait]
impl Researcher for UnconfiguredResearcher {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn research(
        &self,
        _ambiguities: Vec<AmbiguityItem>,
        _snapshot: Arc<SpecDocument>,
        _sink: FindingSink,
        _cancel: CancellationToken,
    ) -> DomainResult<()> {
        Err(DomainError::ValidationFailed(
            "no research command configured (subtasks.research)".to_string(),
        ))
    }
}

/// Cancel `token` on Ctrl-C so a running research process is stopped cleanly.
pub fn cancel_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling iteration");
            trigger.cancel();
        }
    });
    token
}
