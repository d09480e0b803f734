use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use person_api::codegen;

/// Scaffolds models and migrations for the API.
#[derive(Parser)]
#[command(name = "generate")]
#[command(about = "Generate model and migration files", long_about = None)]
struct Cli {
    /// Project root containing `src/` and `migrations/`
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a model struct and its create-table migration
    Model {
        /// Model name, e.g. BlogPost
        name: String,
        /// Comma separated `name:type` pairs, e.g. title:string,published:boolean
        attributes: String,
    },
    /// Generate an empty migration
    Migration {
        /// Migration description, e.g. add_index_to_persons
        name: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let now = Utc::now();

    match cli.command {
        Commands::Model { name, attributes } => {
            let generated = codegen::generate_model(&cli.root, &name, &attributes, now)
                .with_context(|| format!("failed to generate model {}", name))?;
            println!("✅ Model created: {}", generated.model_path.display());
            println!("✅ Migration created: {}", generated.migration_path.display());
            println!(
                "   Add `pub mod {};` to src/models.rs to compile it.",
                codegen::to_snake_case(&name)
            );
        }
        Commands::Migration { name } => {
            let path = codegen::generate_migration(&cli.root, &name, now)
                .with_context(|| format!("failed to generate migration {}", name))?;
            println!("✅ Migration created: {}", path.display());
        }
    }

    Ok(())
}
