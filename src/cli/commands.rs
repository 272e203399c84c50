//! CLI commands

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;

use crate::chat::{ChatClient, ChatSession};
use crate::config::Config;
use crate::core::AppState;
use crate::db::repositories::saved_plan::SavedPlanStatus;
use crate::db::Database;
use crate::plan::{ActionOutcome, ContentPlan, ContentTable, PlanReview};
use crate::storage::BlobStore;
use crate::store::{ContentStore, Query};

#[derive(Parser)]
#[command(name = "folio")]
#[command(about = "Portfolio content engine: AI content plans, review and execution", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: ~/.folio/config.yml)
    #[arg(long)]
    config: Option<String>,

    /// Database path (overrides the config file)
    #[arg(long)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to the content assistant
    Chat {
        message: String,

        /// Continue an existing conversation
        #[arg(long)]
        conversation: Option<String>,

        /// Save proposed plans for later review
        #[arg(long)]
        save: bool,
    },

    /// List conversations
    Conversations,

    /// Print a conversation transcript
    ConversationShow { id: String },

    /// Delete a conversation
    ConversationDelete { id: String },

    /// List saved plans
    Plans {
        /// Filter by status (saved, executed)
        #[arg(long)]
        status: Option<String>,
    },

    /// Review a saved plan against current content
    PlanShow { id: String },

    /// Edit one field of one action in a saved plan
    PlanEdit {
        id: String,

        /// Action number (1-based)
        #[arg(long)]
        action: usize,

        #[arg(long)]
        field: String,

        /// New value, coerced to the column type
        #[arg(long, required_unless_present = "clear")]
        value: Option<String>,

        /// Remove the field from the payload instead
        #[arg(long, conflicts_with = "value")]
        clear: bool,
    },

    /// Execute a saved plan
    PlanExecute { id: String },

    /// Delete a saved plan
    PlanDelete { id: String },

    /// Show execution or change history
    History {
        /// Show row changes instead of plan executions
        #[arg(long)]
        changes: bool,

        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Query a content table
    Records {
        table: String,

        /// Equality filter as column=value (repeatable)
        #[arg(long = "where")]
        filters: Vec<String>,

        #[arg(long)]
        order: Option<String>,

        #[arg(long)]
        desc: bool,

        #[arg(long)]
        limit: Option<usize>,
    },

    /// List content tables and their columns
    Tables,

    /// Upload a media file
    Upload {
        file: String,

        #[arg(long)]
        bucket: String,

        /// Destination path inside the bucket (default: file name)
        #[arg(long)]
        path: Option<String>,
    },

    /// List media in a bucket
    Media {
        bucket: String,

        #[arg(long, default_value = "")]
        prefix: String,
    },
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let db_path = match &cli.database {
        Some(path) => std::path::PathBuf::from(path),
        None => config.resolve_db_path()?,
    };

    let db = Database::new(&db_path)?;
    let state = AppState::new(config, db)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match cli.command {
            Commands::Chat {
                message,
                conversation,
                save,
            } => chat(&state, &message, conversation, save).await,

            Commands::Conversations => {
                let conversations = state.conversations().list().await?;
                if conversations.is_empty() {
                    println!("No conversations found");
                }
                for conversation in conversations {
                    println!(
                        "[{}] {} ({} messages, updated {})",
                        short_id(&conversation.id),
                        conversation.title,
                        conversation.messages.len(),
                        conversation.updated_at.format("%Y-%m-%d %H:%M")
                    );
                }
                Ok(())
            }

            Commands::ConversationShow { id } => {
                let conversation = state
                    .conversations()
                    .get(&id)
                    .await?
                    .with_context(|| format!("Conversation not found: {}", id))?;
                println!("{}\n", conversation.title);
                for message in conversation.messages {
                    println!("{}: {}\n", message.role.as_str(), message.content);
                }
                Ok(())
            }

            Commands::ConversationDelete { id } => {
                if !state.conversations().delete(&id).await? {
                    anyhow::bail!("Conversation not found: {}", id);
                }
                println!("Deleted conversation: {}", id);
                Ok(())
            }

            Commands::Plans { status } => {
                let status = status.map(|s| SavedPlanStatus::from_str(&s)).transpose()?;
                let plans = state.saved_plans().list(status).await?;
                if plans.is_empty() {
                    println!("No saved plans found");
                }
                for plan in plans {
                    println!(
                        "[{}] {} - {} actions ({})",
                        short_id(&plan.id),
                        plan.title,
                        plan.actions.len(),
                        plan.status.as_str()
                    );
                }
                Ok(())
            }

            Commands::PlanShow { id } => {
                let saved = state
                    .saved_plans()
                    .get(&id)
                    .await?
                    .with_context(|| format!("Saved plan not found: {}", id))?;
                let plan = saved.to_plan();
                print_plan_header(&plan);

                let mut review = PlanReview::new();
                review.load(&plan, state.store.as_ref()).await;
                for diff in review.diffs(&plan) {
                    println!("{}", diff.render());
                }
                Ok(())
            }

            Commands::PlanEdit {
                id,
                action,
                field,
                value,
                clear,
            } => {
                let repo = state.saved_plans();
                let saved = repo
                    .get(&id)
                    .await?
                    .with_context(|| format!("Saved plan not found: {}", id))?;
                let mut plan = saved.to_plan();
                let target = plan
                    .actions
                    .get_mut(action.wrapping_sub(1))
                    .with_context(|| format!("Plan has no action #{}", action))?;
                match value {
                    Some(value) if !clear => target.set_field(&field, &value)?,
                    _ => target.clear_field(&field)?,
                }
                repo.update_actions(&id, &plan.actions).await?;
                println!("Updated action #{} field {}", action, field);
                Ok(())
            }

            Commands::PlanExecute { id } => {
                let repo = state.saved_plans();
                let saved = repo
                    .get(&id)
                    .await?
                    .with_context(|| format!("Saved plan not found: {}", id))?;
                if saved.status == SavedPlanStatus::Executed {
                    anyhow::bail!("Plan {} was already executed", id);
                }

                let plan = saved.to_plan();
                let report = state
                    .executor()
                    .execute_with_progress(&plan, saved.conversation_id.as_deref(), |p| {
                        eprintln!("[{:>3}%] {}/{}", p.percent(), p.completed, p.total)
                    })
                    .await;

                for result in &report.results {
                    let outcome = match &result.outcome {
                        ActionOutcome::Succeeded { record_id } => format!("ok {}", record_id),
                        ActionOutcome::Failed { error } => format!("failed: {}", error),
                        ActionOutcome::Skipped => "skipped".to_string(),
                        ActionOutcome::Compensated { record_id } => format!("undone {}", record_id),
                    };
                    println!(
                        "#{} {} {}: {}",
                        result.index + 1,
                        result.kind.as_str(),
                        result.table,
                        outcome
                    );
                }
                for error in &report.compensation_errors {
                    println!("compensation failed: {}", error);
                }

                if !report.success() {
                    anyhow::bail!("Plan execution {}", report.status.as_str());
                }

                repo.mark_executed(&id).await?;
                for link in &report.links {
                    println!("Open in editor: {}", link.url());
                }
                println!("Plan executed");
                Ok(())
            }

            Commands::PlanDelete { id } => {
                if !state.saved_plans().delete(&id).await? {
                    anyhow::bail!("Saved plan not found: {}", id);
                }
                println!("Deleted saved plan: {}", id);
                Ok(())
            }

            Commands::History { changes, limit } => {
                let history = state.history();
                if changes {
                    for entry in history.list_changes(limit, None).await? {
                        println!(
                            "{} {} {}/{}",
                            entry.changed_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.change.operation.as_str(),
                            entry.change.table,
                            entry.change.record_id
                        );
                    }
                } else {
                    for entry in history.list_executions(limit).await? {
                        println!(
                            "[{}] {} {} - {} actions ({})",
                            short_id(&entry.id),
                            entry.executed_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.title,
                            entry.actions.len(),
                            entry.status.as_str()
                        );
                    }
                }
                Ok(())
            }

            Commands::Records {
                table,
                filters,
                order,
                desc,
                limit,
            } => {
                let table = ContentTable::from_str(&table)?;
                let mut query = Query::new();
                for filter in &filters {
                    let (column, value) = parse_filter(table, filter)?;
                    query = query.eq(column, value);
                }
                if let Some(order) = order {
                    query = query.order_by(order, desc);
                }
                if let Some(limit) = limit {
                    query = query.limit(limit);
                }

                for record in state.store.select_many(table, &query).await? {
                    println!("{}", serde_json::to_string(&record.to_row())?);
                }
                Ok(())
            }

            Commands::Tables => {
                for table in ContentTable::ALL {
                    let columns: Vec<String> = table
                        .columns()
                        .iter()
                        .map(|c| {
                            format!("{}{}:{}", c.name, if c.required { "*" } else { "" }, c.kind.as_str())
                        })
                        .collect();
                    println!("{} ({})", table, columns.join(", "));
                }
                Ok(())
            }

            Commands::Upload { file, bucket, path } => {
                let bytes = tokio::fs::read(&file)
                    .await
                    .with_context(|| format!("Failed to read {}", file))?;
                let path = match path {
                    Some(path) => path,
                    None => std::path::Path::new(&file)
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .with_context(|| format!("No file name in {}", file))?,
                };

                let stored = state.blobs.upload(&bucket, &path, &bytes).await?;
                println!("Uploaded: {}", stored);
                println!("URL: {}", state.blobs.public_url(&bucket, &path)?);
                Ok(())
            }

            Commands::Media { bucket, prefix } => {
                let entries = state.blobs.list(&bucket, &prefix).await?;
                if entries.is_empty() {
                    println!("No media found");
                }
                for entry in entries {
                    if entry.is_dir {
                        println!("{}/", entry.path);
                    } else {
                        println!("{} ({} bytes)", entry.path, entry.size);
                    }
                }
                Ok(())
            }
        }
    })
}

async fn chat(state: &AppState, message: &str, conversation: Option<String>, save: bool) -> Result<()> {
    let client = ChatClient::from_config(&state.config.chat)?;
    let store: Arc<dyn ContentStore> = state.store.clone();
    let mut session = ChatSession::new(Arc::new(client), store, state.conversations())
        .with_site_content_rows(state.config.chat.site_content_rows);

    if let Some(id) = conversation {
        let existing = state
            .conversations()
            .get(&id)
            .await?
            .with_context(|| format!("Conversation not found: {}", id))?;
        session = session.resume(existing);
    }

    let outcome = session.send(message).await?;
    if !outcome.reply.is_empty() {
        println!("{}", outcome.reply);
    }

    for plan in &outcome.plans {
        println!();
        print_plan_header(plan);
        for (index, action) in plan.actions.iter().enumerate() {
            println!(
                "#{} {} {}{} - {}",
                index + 1,
                action.kind().as_str(),
                action.table(),
                action.record_id().map(|id| format!("/{}", id)).unwrap_or_default(),
                action.description()
            );
        }
        if save {
            let saved = state
                .saved_plans()
                .save(plan, Some(&outcome.conversation_id))
                .await?;
            println!("Saved plan: {}", saved.id);
        }
    }

    for rejected in &outcome.rejected {
        eprintln!("Could not read a content plan: {}", rejected.error);
        eprintln!("{}", rejected.raw);
    }

    println!("\nConversation: {}", outcome.conversation_id);
    if let Some(error) = outcome.error {
        anyhow::bail!("Chat failed: {}", error);
    }
    Ok(())
}

fn print_plan_header(plan: &ContentPlan) {
    println!("Plan: {}", plan.title);
    if !plan.summary.is_empty() {
        println!("{}", plan.summary);
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

/// Parse `column=value`, coercing the value to the column's kind
fn parse_filter(table: ContentTable, raw: &str) -> Result<(String, Value)> {
    let (column, value) = raw
        .split_once('=')
        .with_context(|| format!("Filter must look like column=value: {}", raw))?;
    let column = column.trim();
    let value = match table.column(column) {
        Some(def) => def
            .kind
            .coerce(value)
            .with_context(|| format!("{} is not a valid {} for {}", value, def.kind.as_str(), column))?,
        None => Value::String(value.to_string()),
    };
    Ok((column.to_string(), value))
}
