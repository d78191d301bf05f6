use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;

use crate::core::{
    config::{ConfigManager, Settings},
    dispatcher::NotificationService,
    log_io::{self, EventLogTailer},
    notifications::{model::EventType, presenter::NotificationView},
    submit::LoggingSubmitter,
    watcher::FileSnapshotReader,
};

/// A line typed on stdin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    /// 1-based row index
    Close(usize),
    Remove(usize),
    Resolve(EventType),
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
    let arg = parts.next();

    let row = |arg: Option<&str>| -> Result<usize, String> {
        let raw = arg.ok_or_else(|| format!("usage: {} <row>", verb))?;
        match raw.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(format!("invalid row: {}", raw)),
        }
    };

    match verb {
        "list" | "ls" => Ok(Command::List),
        "close" => row(arg).map(Command::Close),
        "remove" | "rm" => row(arg).map(Command::Remove),
        "resolve" => {
            let tag = arg.unwrap_or("harvest");
            match EventType::from_tag(tag) {
                Some(event_type) if event_type.is_batch_resolvable() => Ok(Command::Resolve(event_type)),
                Some(event_type) => Err(format!("{} cannot be resolved in bulk", event_type.display_name())),
                None => Err(format!("unknown event type: {}", tag)),
            }
        }
        "quit" | "exit" | "q" => Ok(Command::Quit),
        other => Err(format!("unknown command: {}", other)),
    }
}

pub fn render_view(rows: &[NotificationView]) -> String {
    if rows.is_empty() {
        return "No notifications.".to_string();
    }
    rows.iter()
        .enumerate()
        .map(|(i, row)| {
            let state = if row.pending {
                "pending"
            } else if row.closed {
                "closed"
            } else if row.reopened {
                "retry"
            } else {
                "open"
            };
            format!("{:>3}. [{:<7}] {}: {}", i + 1, state, row.title, row.message)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("REALM_WATCHER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".config/realm-watcher")
}

pub fn run() -> io::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config_manager = ConfigManager::new(config_dir());
    let settings = config_manager.load();
    log::info!("Watching snapshot {:?}", settings.snapshot_path);

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_session(settings))
}

async fn run_session(settings: Settings) -> io::Result<()> {
    let reader = Arc::new(FileSnapshotReader::new(settings.snapshot_path.clone()));
    let mut service = NotificationService::start(&settings, reader, Arc::new(LoggingSubmitter));

    let tail_token = CancellationToken::new();
    let mut tail_task = None;
    if let Some(path) = &settings.events_path {
        match EventLogTailer::open(path) {
            Ok(tailer) => {
                let (events, handle) =
                    log_io::subscribe_event_log(tailer, settings.poll_interval(), tail_token.clone());
                service.add_subscription(events);
                tail_task = Some(handle);
                log::info!("Subscribed to event log {:?}", path);
            }
            Err(e) => log::warn!("Cannot open event log {:?}: {}", path, e),
        }
    }

    let mut view_rx = service.watch();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = view_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let rows = view_rx.borrow_and_update().clone();
                println!("{}", render_view(&rows));
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(Command::Quit) => break,
                    Ok(command) => {
                        if let Err(e) = execute(&service, command).await {
                            log::warn!("{}", e);
                            break;
                        }
                    }
                    Err(e) => println!("{}", e),
                }
            }
        }
    }

    tail_token.cancel();
    if let Some(handle) = tail_task {
        let _ = handle.await;
    }
    service.shutdown().await;
    Ok(())
}

async fn execute(
    service: &NotificationService,
    command: Command,
) -> Result<(), crate::core::dispatcher::ServiceError> {
    let rows = service.view();
    let key_at = |row: usize| rows.get(row - 1).map(|r| r.key.clone());

    match command {
        Command::List => println!("{}", render_view(&rows)),
        Command::Close(row) => match key_at(row) {
            Some(key) => service.close(key).await?,
            None => println!("no row {}", row),
        },
        Command::Remove(row) => match key_at(row) {
            Some(key) => service.remove(key).await?,
            None => println!("no row {}", row),
        },
        Command::Resolve(event_type) => match service.resolve_all(event_type).await? {
            Some(batch) => println!(
                "Resolving {} {} notifications (batch {})",
                batch.keys.len(),
                event_type.display_name(),
                batch.id
            ),
            None => println!("Nothing to resolve for {}", event_type.display_name()),
        },
        Command::Quit => {}
    }
    Ok(())
}
