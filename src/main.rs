use std::collections::HashMap;
use std::sync::Arc;

use lore::cli::{infer_content_type, Cli, Commands, ConfigAction};
use lore::config::Config;
use lore::engine::Engine;
use lore::error::{LoreError, Result};
use lore::feedback::{FeedbackEvent, Judgment};
use lore::storage::SqliteFeedbackLog;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse_args();

    match cli.command {
        Commands::Config { action } => return cmd_config(cli.config, action),
        _ => {}
    }

    let config = load_config(cli.config)?;
    let data_dir = config.expanded_data_dir()?;
    let feedback_log = Arc::new(SqliteFeedbackLog::new(&data_dir.join("feedback.db"))?);
    let engine = Engine::new(config, feedback_log)?;

    let result = run_command(&engine, &cli.user, cli.command).await;

    // Drain any queued feedback before the process exits.
    engine.shutdown().await;

    result
}

async fn run_command(engine: &Engine, user: &str, command: Commands) -> Result<()> {
    match command {
        Commands::Index {
            path,
            content_type,
            replace,
        } => {
            let document_id = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .ok_or_else(|| LoreError::InvalidArgument("path has no file name".to_string()))?;
            let content_type =
                content_type.unwrap_or_else(|| infer_content_type(&document_id));

            let text = std::fs::read_to_string(&path).map_err(|e| LoreError::Io {
                source: e,
                context: format!("Failed to read document: {}", path.display()),
            })?;

            if replace {
                let removed = engine.remove_document(user, &document_id).await?;
                if removed.chunks_removed > 0 {
                    println!("Replaced previous copy ({} chunks)", removed.chunks_removed);
                }
            }

            let mut metadata = HashMap::new();
            metadata.insert(
                "path".to_string(),
                serde_json::Value::String(path.display().to_string()),
            );
            metadata.insert(
                "bytes".to_string(),
                serde_json::Value::from(text.len() as u64),
            );

            let report = engine
                .index_document(user, &document_id, &content_type, &text, metadata)
                .await?;
            println!("✓ Indexed {} ({} chunks)", document_id, report.chunks_indexed);
        }

        Commands::Ask { question } => {
            let answer = engine.answer_question(user, &question).await?;

            println!("{}", answer.text);
            println!();
            println!("Confidence: {}%", answer.confidence);
            if !answer.source_document_ids.is_empty() {
                println!("Sources: {}", answer.source_document_ids.join(", "));
            }
        }

        Commands::Remove { document_id } => {
            let report = engine.remove_document(user, &document_id).await?;
            if report.chunks_removed > 0 {
                println!("✓ Removed {} ({} chunks)", document_id, report.chunks_removed);
            } else {
                println!("Nothing indexed under {document_id}");
            }
        }

        Commands::List => {
            let documents = engine.list_documents(user).await;
            if documents.is_empty() {
                println!("No documents indexed for {user}");
            } else {
                println!("Documents for {user}:");
                for document_id in documents {
                    println!("  {document_id}");
                }
            }
        }

        Commands::History { clear } => {
            if clear {
                engine.clear_history(user).await;
                println!("✓ History cleared");
            } else {
                let records = engine.history(user).await;
                if records.is_empty() {
                    println!("No history for {user}");
                }
                for record in records {
                    println!(
                        "[{}] Q: {}",
                        record.timestamp.format("%Y-%m-%d %H:%M:%S"),
                        record.question
                    );
                    println!("  A: {} ({}%)", record.answer, record.confidence);
                }
            }
        }

        Commands::Feedback {
            query,
            document_id,
            content_type,
            irrelevant,
        } => {
            let content_type = content_type.unwrap_or_else(|| infer_content_type(&document_id));
            let judgment = if irrelevant {
                Judgment::NotRelevant
            } else {
                Judgment::Relevant
            };

            engine
                .record_feedback(FeedbackEvent::new(query, document_id, content_type, judgment))
                .await?;
            println!("✓ Feedback recorded");
        }

        Commands::Insights { limit } => {
            let insights = engine.insights(limit).await;
            if insights.is_empty() {
                println!("No learning insights yet");
            }
            for insight in insights {
                println!("[{}]", insight.timestamp.format("%Y-%m-%d %H:%M:%S"));
                if !insight.preferred.is_empty() {
                    println!("  Preferred: {}", insight.preferred.join(", "));
                }
                if !insight.avoided.is_empty() {
                    println!("  Avoided: {}", insight.avoided.join(", "));
                }
                if let Some(recommendation) = &insight.recommendation {
                    println!("  Note: {recommendation}");
                }
            }
        }

        Commands::Config { .. } => unreachable!("handled before engine construction"),
    }

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lore=info"));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn cmd_config(config_path: Option<std::path::PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(config_path)?;
            let json = serde_json::to_string_pretty(&config).map_err(|e| LoreError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;
            println!("{json}");
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(path) => path,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| LoreError::Io {
                    source: e,
                    context: format!("Failed to create config directory: {:?}", parent),
                })?;
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
        ConfigAction::Validate { file } => {
            let path = match file {
                Some(path) => path,
                None => Config::default_path()?,
            };
            Config::load(&path)?;
            println!("✓ Configuration is valid");
        }
    }

    Ok(())
}

fn load_config(config_path: Option<std::path::PathBuf>) -> Result<Config> {
    let path = match config_path {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!("Config file not found, using defaults. Run 'lore config init' to create one.");
        return Ok(Config::default());
    }

    Config::load(&path)
}
