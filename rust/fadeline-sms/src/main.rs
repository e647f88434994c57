//! Fadeline SMS - Command-Line Entry Point
//!
//! A thin CLI over the schedule engine. Every invocation loads the current
//! collection from the backend first, so the commands are safe to run from
//! any machine that has credentials.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fadeline_sms::backend::{HttpBackend, HttpValidator};
use fadeline_sms::config::AppConfig;
use fadeline_sms::scheduler::{
    Lifecycle, Meridiem, MessagePatch, Recurrence, SaveMode, ScheduleStore, ScheduledMessage,
    TimeOfDay,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "fadeline-sms")]
#[command(about = "Fadeline SMS - recurring SMS schedule manager")]
#[command(version)]
struct Args {
    /// Log level (overrides the configured default).
    #[arg(long, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Backend base URL.
    #[arg(long, env = "FADELINE_API_URL")]
    api_url: Option<String>,

    /// Backend access token.
    #[arg(long, env = "FADELINE_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

/// Subcommands for managing the schedule collection.
#[derive(Subcommand, Debug)]
enum Command {
    /// List every scheduled message with its status.
    List,

    /// Create a new message and save it as a draft.
    Create {
        /// Campaign title shown in the app (up to 30 characters).
        #[arg(long)]
        title: String,

        /// Message body (100 to 240 characters).
        #[arg(long)]
        body: String,

        /// How often the message repeats: weekly, biweekly, or monthly.
        #[arg(long)]
        frequency: String,

        /// Weekday for weekly and biweekly schedules (0 = Sunday .. 6 = Saturday).
        #[arg(long)]
        weekday: Option<u32>,

        /// Day of the month for monthly schedules (1-31).
        #[arg(long)]
        day: Option<u32>,

        /// Hour on the 12-hour clock (1-12).
        #[arg(long)]
        hour: u32,

        /// Minute (0-59).
        #[arg(long, default_value = "0")]
        minute: u32,

        /// am or pm.
        #[arg(long)]
        period: String,
    },

    /// Change a message's title or body.
    Edit {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,

        /// New title.
        #[arg(long)]
        title: Option<String>,

        /// New body.
        #[arg(long)]
        body: Option<String>,
    },

    /// Run a message through content validation.
    Validate {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Validate a message if needed, then turn its schedule on.
    Activate {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Suspend an active message without losing its schedule.
    Pause {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Reactivate a paused message.
    Resume {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Delete a message from the backend and the local collection.
    Delete {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Send a one-off copy of a message to the configured test number.
    TestSend {
        /// Message id, or its position in `list`.
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load_unchecked()?;
    if let Some(url) = args.api_url.clone() {
        config.api.base_url = Some(url);
    }
    if let Some(token) = args.access_token.clone() {
        config.api.access_token = Some(token);
    }

    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&log_level, config.logging.json);

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed:\n\n{e}"))?;
    let (base_url, access_token) = config.api.credentials()?;

    tracing::debug!("Fadeline SMS v{}", env!("CARGO_PKG_VERSION"));

    let backend = HttpBackend::new(
        base_url.clone(),
        access_token.clone(),
        Duration::from_secs(config.api.timeout_secs),
    )?;
    let validator = HttpValidator::new(
        base_url,
        access_token,
        Duration::from_secs(config.api.verify_timeout_secs),
    )?;
    let store = ScheduleStore::new(Arc::new(backend), Arc::new(validator));

    run_command(&store, args.command).await
}

async fn run_command(store: &ScheduleStore, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List => {
            let messages = store.load().await?;
            if messages.is_empty() {
                println!("No scheduled messages.");
            } else {
                for (i, message) in messages.iter().enumerate() {
                    print_message(i + 1, message);
                }
            }
        }

        Command::Create {
            title,
            body,
            frequency,
            weekday,
            day,
            hour,
            minute,
            period,
        } => {
            let recurrence = parse_recurrence(&frequency, weekday, day)?;
            let time = parse_time(hour, minute, &period)?;
            store.load().await?;
            let draft = store.create(title, body, recurrence, time)?;
            let saved = store.save(&draft.id, SaveMode::Draft).await?;
            println!("Created draft '{}' ({}).", saved.title, saved.id);
            println!("Run `fadeline-sms activate {}` to turn it on.", saved.id);
        }

        Command::Edit { id, title, body } => {
            if title.is_none() && body.is_none() {
                anyhow::bail!("nothing to change; pass --title or --body");
            }
            store.load().await?;
            let id = resolve_id(store, &id)?;
            let before = store
                .get(&id)
                .with_context(|| format!("no message with id {id}"))?;
            if before.persisted {
                store.enable_edit(&id)?;
            }
            let body_changed = body.as_deref().is_some_and(|b| b != before.body);
            let patch = MessagePatch {
                title,
                body,
                ..MessagePatch::default()
            };
            let message = store.update(&id, patch).await?;
            println!("Updated '{}'.", message.title);
            if body_changed {
                println!("The body changed, so the message must pass validation again before it can go live.");
            }
        }

        Command::Validate { id } => {
            store.load().await?;
            let id = resolve_id(store, &id)?;
            let message = store.validate(&id).await?;
            match message.lifecycle {
                Lifecycle::ValidatedAccepted => {
                    println!("'{}' was accepted by content validation.", message.title);
                }
                Lifecycle::ValidatedDenied => {
                    println!("'{}' was denied by content validation.", message.title);
                    if let Some(reason) = &message.validation_reason {
                        println!("Reason: {reason}");
                    }
                }
                _ => {}
            }
        }

        Command::Activate { id } => {
            store.load().await?;
            let id = resolve_id(store, &id)?;
            let current = store
                .get(&id)
                .with_context(|| format!("no message with id {id}"))?;
            match current.lifecycle {
                Lifecycle::SavedActive => {
                    println!("'{}' is already active.", current.title);
                    return Ok(());
                }
                Lifecycle::SavedPaused => {
                    let message = store.resume(&id).await?;
                    println!("Resumed '{}'.", message.title);
                    return Ok(());
                }
                Lifecycle::ValidatedDenied => {
                    let reason = current
                        .validation_reason
                        .clone()
                        .unwrap_or_else(|| "no reason given".to_string());
                    anyhow::bail!(
                        "'{}' was denied by content validation: {reason}. Edit the body and try again.",
                        current.title
                    );
                }
                Lifecycle::ValidatedAccepted => {}
                Lifecycle::Draft | Lifecycle::SavedDraft => {
                    let validated = store.validate(&id).await?;
                    if validated.lifecycle == Lifecycle::ValidatedDenied {
                        let reason = validated
                            .validation_reason
                            .unwrap_or_else(|| "no reason given".to_string());
                        anyhow::bail!(
                            "'{}' was denied by content validation: {reason}",
                            validated.title
                        );
                    }
                }
            }
            let message = store.save(&id, SaveMode::Activate).await?;
            println!("Activated '{}'.", message.title);
        }

        Command::Pause { id } => {
            store.load().await?;
            let id = resolve_id(store, &id)?;
            let message = store.pause(&id).await?;
            println!("Paused '{}'.", message.title);
        }

        Command::Resume { id } => {
            store.load().await?;
            let id = resolve_id(store, &id)?;
            let message = store.resume(&id).await?;
            println!("Resumed '{}'.", message.title);
        }

        Command::Delete { id } => {
            store.load().await?;
            let id = resolve_id(store, &id)?;
            let title = store.get(&id).map(|m| m.title);
            store.delete(&id).await?;
            match title {
                Some(title) => println!("Deleted '{title}'."),
                None => println!("Deleted {id}."),
            }
        }

        Command::TestSend { id } => {
            store.load().await?;
            let id = resolve_id(store, &id)?;
            store.test_send(&id).await?;
            let title = store.get(&id).map_or_else(|| id.clone(), |m| m.title);
            println!("Test message sent for '{title}'.");
        }
    }

    Ok(())
}

/// Accept either a message id or the 1-based position shown by `list`.
fn resolve_id(store: &ScheduleStore, raw: &str) -> anyhow::Result<String> {
    if let Ok(index) = raw.parse::<usize>() {
        let messages = store.list();
        let message = index
            .checked_sub(1)
            .and_then(|i| messages.get(i))
            .with_context(|| format!("no message at position {index} (run `fadeline-sms list`)"))?;
        return Ok(message.id.clone());
    }
    Ok(raw.to_string())
}

fn parse_recurrence(
    frequency: &str,
    weekday: Option<u32>,
    day: Option<u32>,
) -> anyhow::Result<Recurrence> {
    match frequency {
        "weekly" => {
            let weekday = weekday.context("--weekday is required for weekly schedules")?;
            Ok(Recurrence::weekly(weekday)?)
        }
        "biweekly" => {
            let weekday = weekday.context("--weekday is required for biweekly schedules")?;
            Ok(Recurrence::biweekly(weekday)?)
        }
        "monthly" => {
            let day = day.context("--day is required for monthly schedules")?;
            Ok(Recurrence::monthly(day)?)
        }
        other => anyhow::bail!("unknown frequency '{other}' (expected weekly, biweekly, or monthly)"),
    }
}

fn parse_time(hour: u32, minute: u32, period: &str) -> anyhow::Result<TimeOfDay> {
    let meridiem = match period.to_ascii_lowercase().as_str() {
        "am" => Meridiem::Am,
        "pm" => Meridiem::Pm,
        other => anyhow::bail!("unknown period '{other}' (expected am or pm)"),
    };
    Ok(TimeOfDay::new(hour, minute, meridiem)?)
}

fn print_message(index: usize, message: &ScheduledMessage) {
    println!(
        "{index}. [{}] {} - {} at {}",
        status_label(message.lifecycle),
        message.title,
        message.recurrence,
        message.time
    );
    println!("   id: {}", message.id);
    if let Some(reason) = &message.validation_reason {
        println!("   reason: {reason}");
    }
}

fn status_label(lifecycle: Lifecycle) -> &'static str {
    match lifecycle {
        Lifecycle::Draft => "draft",
        Lifecycle::ValidatedAccepted => "accepted",
        Lifecycle::ValidatedDenied => "denied",
        Lifecycle::SavedDraft => "saved draft",
        Lifecycle::SavedActive => "active",
        Lifecycle::SavedPaused => "paused",
    }
}

/// Initialize tracing/logging.
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
