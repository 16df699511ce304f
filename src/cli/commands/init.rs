//! Implementation of the `spec-refine init` command.

use anyhow::{Context, Result};
use clap::Args;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::adapters::sqlite::initialize_from_config;
use crate::cli::context::CliContext;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::config::PROJECT_DIR;

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config.yaml with the defaults
    #[arg(long, short)]
    pub force: bool,
}

#[derive(Debug, serde::Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub message: String,
    pub config_path: PathBuf,
    pub config_written: bool,
    pub database_path: String,
    pub directories_created: Vec<String>,
}

impl CommandOutput for InitOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.message.clone()];
        if !self.directories_created.is_empty() {
            lines.push("\nCreated directories:".to_string());
            for dir in &self.directories_created {
                lines.push(format!("  - {dir}"));
            }
        }
        if self.config_written {
            lines.push(format!("\nWrote default configuration to {}", self.config_path.display()));
        } else {
            lines.push(format!("\nKept existing configuration at {}", self.config_path.display()));
        }
        lines.push(format!("Database ready at {}", self.database_path));
        lines.join("\n")
    }
}

pub async fn execute(args: InitArgs, ctx: &CliContext) -> Result<()> {
    let project_dir = Path::new(PROJECT_DIR);
    let mut directories_created = vec![];
    for dir in [project_dir.to_path_buf(), ctx.output_dir()] {
        if !dir.exists() {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            directories_created.push(dir.display().to_string());
        }
    }

    let config_path = project_dir.join("config.yaml");
    let config_written = if args.force || !config_path.exists() {
        write_default_config(&config_path).await?;
        true
    } else {
        false
    };

    initialize_from_config(&ctx.config.database)
        .await
        .context("Failed to initialize database")?;

    let out = InitOutput {
        success: true,
        message: "Project initialized successfully.".to_string(),
        config_path,
        config_written,
        database_path: ctx.config.database.path.clone(),
        directories_created,
    };
    output(&out, ctx.json);
    Ok(())
}

async fn write_default_config(path: &Path) -> Result<()> {
    let yaml = serde_yaml::to_string(&Config::default()).context("Failed to serialize default config")?;
    let contents = format!(
        "# spec-refine configuration. Environment variables prefixed with SPEC_REFINE_\n\
         # override these values; nested keys are separated by '__'.\n{yaml}"
    );
    fs::write(path, contents)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
