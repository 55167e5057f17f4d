//! Honyaku - Background Chapter Translation
//!
//! Command line front end for the translation queue: queue chapters, drain the
//! queue with a progress bar and manage the translation cache.

use std::path::Path;
use std::sync::Arc;
use anyhow::Result;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tracing_appender::{non_blocking, rolling};

use honyaku::cli::{Args, CacheAction, Commands, EngineAction, QueueAction};
use honyaku::config::Config;
use honyaku::error::HonyakuError;
use honyaku::library::{ChapterLibrary, LocalLibrary};
use honyaku::model::{Priority, TaskRequest};
use honyaku::service::TranslationService;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration
    let config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if Path::new("config.toml").exists() {
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    setup_logging(args.verbose, &config.log_dir())?;
    info!("Starting Honyaku - Background Chapter Translation");

    let library = Arc::new(LocalLibrary::from_manifest(&config.library.manifest).await?);
    let service = TranslationService::from_config(&config, library.clone() as Arc<dyn ChapterLibrary>)?;

    match args.command {
        Commands::Enqueue { parent, chapters, source_lang, target_lang, priority } => {
            let priority = parse_priority(&priority)?;
            let chapters = if chapters.is_empty() {
                library.chapters_of(parent).iter().map(|c| c.chapter_id).collect()
            } else {
                chapters
            };
            if chapters.is_empty() {
                println!("No chapters found for parent {}", parent);
                return Ok(());
            }

            let requests: Vec<_> = chapters
                .iter()
                .map(|&chapter| TaskRequest::new(parent, chapter, &source_lang, &target_lang, priority))
                .collect();

            // Hold the worker so the queue is only persisted here
            service.pause();
            service.restore().await?;
            let accepted = service.enqueue_all(&requests).await;
            service.stop().await;

            println!(
                "Queued {} of {} chapters ({} -> {}), {} skipped as duplicates",
                accepted,
                requests.len(),
                source_lang,
                target_lang,
                requests.len() - accepted
            );
        }
        Commands::Run => {
            let restored = service.restore().await?;
            if restored == 0 {
                println!("Translation queue is empty.");
                return Ok(());
            }
            service.start();
            drain_with_progress(&service).await?;

            let progress = service.progress();
            println!(
                "Translated {} chapters, {} failed",
                progress.completed_chapters, progress.failed_chapters
            );
            for dropped in service.dropped_tasks() {
                println!("  chapter {}: {}", dropped.task.chapter_id, dropped.error);
            }
        }
        Commands::Queue { action } => {
            service.pause();
            service.restore().await?;

            match action {
                QueueAction::List => {
                    let tasks = service.pending_tasks();
                    if tasks.is_empty() {
                        println!("Translation queue is empty.");
                    } else {
                        println!("\nQueued Chapters:");
                        println!("{:<10} {:<10} {:<10} {:<12} {:<8} {:<15}", "Chapter", "Parent", "Priority", "Languages", "Retries", "Queued");
                        println!("{}", "-".repeat(70));

                        for task in tasks {
                            let queued_ago = (chrono::Utc::now() - task.created_at).num_seconds().max(0) as u64;
                            println!("{:<10} {:<10} {:<10} {:<12} {:<8} {:<15}",
                                task.chapter_id,
                                task.parent_id,
                                task.priority,
                                format!("{}->{}", task.source_language, task.target_language),
                                task.retry_count,
                                format_duration(queued_ago)
                            );
                        }
                    }
                }
                QueueAction::Clear => {
                    let removed = service.clear_queue().await;
                    println!("Removed {} queued chapters", removed);
                }
                QueueAction::Remove { chapter } => {
                    if service.dequeue(chapter).await {
                        println!("Removed chapter {} from the queue", chapter);
                    } else {
                        println!("Chapter {} is not queued", chapter);
                    }
                }
            }

            service.stop().await;
        }
        Commands::Cache { action } => {
            let cache = service.cache();

            match action {
                CacheAction::Info => {
                    let info = cache.info().await;
                    println!("\nCache Statistics:");
                    println!("Location: {}", cache.root().display());
                    println!("Translated chapters: {}", info.entries);
                    println!("Total cache size: {:.2} MB", info.size_bytes as f64 / 1024.0 / 1024.0);
                }
                CacheAction::List => {
                    let entries = cache.list().await;
                    if entries.is_empty() {
                        println!("No cached translations found.");
                    } else {
                        println!("\nCached Translations:");
                        println!("{:<10} {:<10} {:<12} {:<16} {:<15} {:<30}", "Parent", "Chapter", "Languages", "Engine", "Cached", "Title");
                        println!("{}", "-".repeat(95));

                        for entry in entries {
                            let cached_ago = (chrono::Utc::now() - entry.created_at).num_seconds().max(0) as u64;
                            let title = entry.translated_title.unwrap_or_default();
                            let title = if title.chars().count() > 27 {
                                format!("{}...", title.chars().take(27).collect::<String>())
                            } else {
                                title
                            };

                            println!("{:<10} {:<10} {:<12} {:<16} {:<15} {:<30}",
                                entry.parent_id,
                                entry.chapter_id,
                                format!("{}->{}", entry.source_language, entry.target_language),
                                entry.engine_id,
                                format_duration(cached_ago),
                                title
                            );
                        }
                    }
                }
                CacheAction::Clear => {
                    let deleted_count = cache.clear().await?;
                    println!("Cleared {} cached translations", deleted_count);
                }
                CacheAction::Delete { parent, chapter, target_lang } => {
                    if cache.delete(parent, chapter, &target_lang).await? {
                        println!("Deleted translation of chapter {} ({})", chapter, target_lang);
                    } else {
                        println!("No translation of chapter {} ({}) cached", chapter, target_lang);
                    }
                }
                CacheAction::DeleteParent { parent } => {
                    cache.delete_all(parent).await?;
                    println!("Deleted all translations of parent {}", parent);
                }
                CacheAction::Show { chapter, target_lang } => {
                    match service.get_translation(chapter, &target_lang).await {
                        Some(entry) => {
                            if let Some(title) = &entry.translated_title {
                                println!("# {}\n", title);
                            }
                            println!("{}", entry.translated_content);
                        }
                        None => println!("No translation of chapter {} ({}) cached", chapter, target_lang),
                    }
                }
            }
        }
        Commands::Engines { action } => {
            let registry = service.registry();

            match action {
                EngineAction::List => {
                    let selected = registry.selected_id();
                    println!("\nTranslation Engines:");
                    println!("{:<3} {:<16} {:<16} {:<12} {:<10} {:<12}", "", "Id", "Name", "Configured", "Offline", "Rate limit");
                    println!("{}", "-".repeat(72));

                    for engine in registry.engines() {
                        let marker = if engine.id() == selected { "*" } else { "" };
                        println!("{:<3} {:<16} {:<16} {:<12} {:<10} {:<12}",
                            marker,
                            engine.id(),
                            engine.name(),
                            yes_no(engine.is_configured()),
                            yes_no(engine.is_offline()),
                            yes_no(engine.is_rate_limited())
                        );
                    }
                }
                EngineAction::Select { id } => {
                    registry.select(&id)?;
                    if registry.engine().is_none() {
                        warn!("Engine {} is selected but not configured", id);
                    }
                    println!("Selected translation engine: {}", id);
                }
            }
        }
        Commands::InitConfig { output, force } => {
            if output.exists() && !force {
                anyhow::bail!("{} already exists, use --force to overwrite", output.display());
            }
            Config::default().save_to_file(&output)?;
            println!("Wrote default configuration to {}", output.display());
        }
    }

    info!("Honyaku completed successfully");
    Ok(())
}

/// Drive a progress bar from the service until the worker goes idle or Ctrl-C is pressed
async fn drain_with_progress(service: &TranslationService) -> Result<()> {
    let mut progress = service.subscribe_progress();

    let pb = ProgressBar::new(0);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("#>-"));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let snapshot = progress.borrow_and_update().clone();
        pb.set_length(snapshot.total_chapters as u64);
        pb.set_position((snapshot.completed_chapters + snapshot.failed_chapters) as u64);
        pb.set_message(snapshot.current_chapter_name.unwrap_or_default());

        if !snapshot.is_running {
            break;
        }

        tokio::select! {
            changed = progress.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = &mut ctrl_c => {
                pb.abandon_with_message("interrupted");
                if let Some(task) = service.shutdown().await {
                    info!("Chapter {} will resume on the next run", task.chapter_id);
                }
                return Ok(());
            }
        }
    }

    pb.finish_with_message("done");
    Ok(())
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool, log_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(log_dir, "honyaku.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(false)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false); // No ANSI colors in file

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("honyaku.log").display());

    Ok(())
}

/// Format duration in seconds to human readable string
fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

fn yes_no(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}

/// Parse priority tier from string
fn parse_priority(priority: &str) -> Result<i32> {
    match priority.to_lowercase().as_str() {
        "low" => Ok(Priority::LOW),
        "normal" => Ok(Priority::NORMAL),
        "high" => Ok(Priority::HIGH),
        "user" => Ok(Priority::USER_INITIATED),
        other => other.parse::<i32>().map_err(|_| {
            HonyakuError::Config(format!(
                "Invalid priority '{}'. Valid values: low, normal, high, user or a number",
                priority
            ))
            .into()
        }),
    }
}
