//! Hostbook - workspace manager for host inventories
//!
//! Command-line front end over `hostbook-core`. Connects to the CouchDB
//! server from the user configuration and runs one lifecycle command.

use hostbook_core::config::{load_config, sample_config, user_config_display};
use hostbook_core::{build_manager, DbKind, Notification, NotificationBus, WorkspaceManager};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;

static TRACING_INIT: Once = Once::new();

fn init_tracing() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    TRACING_INIT.call_once(|| {
        tracing_subscriber::registry()
            .with(tracing_subscriber::EnvFilter::new(
                std::env::var("RUST_LOG")
                    .unwrap_or_else(|_| "hostbook=info,hostbook_core=info".into()),
            ))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    });
}

/// Command to run
enum Action {
    List,
    Types,
    Create { name: String, description: String },
    Open { name: String, follow: bool },
    Remove { name: String },
    Check { name: String },
    Update { name: String, description: String },
    SampleConfig,
    Version,
    Help,
}

/// Command-line arguments
struct Args {
    /// Explicit config file
    config: Option<PathBuf>,
    action: Action,
}

impl Args {
    /// Parse command-line arguments
    fn parse() -> anyhow::Result<Self> {
        Self::parse_from(std::env::args().skip(1))
    }

    fn parse_from(args: impl IntoIterator<Item = String>) -> anyhow::Result<Self> {
        let mut args = args.into_iter();
        let mut config = None;
        let mut follow = false;
        let mut positional = Vec::new();

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--follow" | "-f" => follow = true,
                "--help" | "-h" => positional.insert(0, "help".to_string()),
                "--version" | "-V" => positional.insert(0, "version".to_string()),
                _ if !arg.starts_with('-') => positional.push(arg),
                _ => anyhow::bail!("Unknown option: {}", arg),
            }
        }

        let mut positional = positional.into_iter();
        let command = positional.next().unwrap_or_else(|| "help".to_string());
        let mut name = || {
            positional
                .next()
                .ok_or_else(|| anyhow::anyhow!("`{}` needs a workspace name", command))
        };

        let action = match command.as_str() {
            "list" => Action::List,
            "types" => Action::Types,
            "create" => {
                let name = name()?;
                let description = positional.next().unwrap_or_default();
                Action::Create { name, description }
            }
            "open" => Action::Open {
                name: name()?,
                follow,
            },
            "remove" => Action::Remove { name: name()? },
            "check" => Action::Check { name: name()? },
            "update" => {
                let name = name()?;
                let description = positional.next().unwrap_or_default();
                Action::Update { name, description }
            }
            "sample-config" => Action::SampleConfig,
            "version" => Action::Version,
            "help" => Action::Help,
            other => anyhow::bail!("Unknown command: {}", other),
        };

        Ok(Self { config, action })
    }
}

fn print_usage() {
    println!(
        "Usage: hostbook [--config <file>] <command>\n\n\
         Commands:\n  \
         list                       List workspaces\n  \
         types                      List available workspace types\n  \
         create <name> [desc]       Create a workspace\n  \
         open <name> [--follow]     Open a workspace, optionally follow its changes\n  \
         remove <name>              Remove a workspace\n  \
         check <name>               Check a workspace name\n  \
         update <name> [desc]       Rebuild a missing workspace document\n  \
         sample-config              Print a sample configuration\n  \
         version                    Print the version\n\n\
         Configuration: {}",
        user_config_display()
    );
}

fn print_notification(notification: &Notification) {
    match notification {
        Notification::WorkspaceChanged {
            workspace,
            workspace_type,
        } => println!("Active workspace: {} ({})", workspace.name, workspace_type),
        Notification::WorkspaceLoaded { hosts } => {
            println!("Hosts: {}", hosts.len());
            for host in hosts {
                if host.os.is_empty() {
                    println!("  - {}", host.name);
                } else {
                    println!("  - {} [{}]", host.name, host.os);
                }
            }
        }
        Notification::ConnectionProblem { message } => {
            eprintln!("Connection problem: {}", message)
        }
        Notification::ChangesDetected { workspace, changes } => {
            println!("{} change(s) in {}", changes.len(), workspace)
        }
        Notification::WorkspaceRemoved { name } => println!("Removed workspace {}", name),
    }
}

/// Print notifications until `running` is cleared; returns how many were printed
fn follow_changes(bus: &NotificationBus, running: &AtomicBool, tick: Duration) -> usize {
    let listener = bus.subscribe();
    let mut printed = 0;
    while running.load(Ordering::SeqCst) {
        if let Ok(notification) = listener.recv_timeout(tick) {
            print_notification(&notification);
            printed += 1;
        }
    }
    printed
}

fn run(manager: &WorkspaceManager, bus: &NotificationBus, action: Action) -> anyhow::Result<()> {
    match action {
        Action::List => {
            let active = manager.active_workspace().map(|ws| ws.name);
            for name in manager.workspace_names()? {
                let ty = manager.workspace_type(&name)?;
                let marker = if active.as_deref() == Some(name.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{} {} ({})", marker, name, ty);
            }
        }
        Action::Types => {
            for ty in manager.available_workspace_types() {
                println!("{}", ty);
            }
        }
        Action::Create { name, description } => {
            if !manager.is_workspace_name_valid(&name) {
                anyhow::bail!(
                    "Invalid workspace name '{}': use lowercase letters, digits and _$()+-/, \
                     starting with a letter",
                    name
                );
            }
            match manager.create_workspace(&name, &description, DbKind::CouchDb)? {
                Some(ws) => println!("Created workspace {}", ws.name()),
                None => anyhow::bail!(
                    "Workspace {} could not be created (does it already exist?)",
                    name
                ),
            }
        }
        Action::Open { name, follow } => {
            let ws = manager.open_workspace(&name)?;
            tracing::debug!("Opened '{}' with {} host(s)", ws.name(), ws.hosts().len());
            for notification in bus.drain(16) {
                print_notification(&notification);
            }
            if follow {
                let running = Arc::new(AtomicBool::new(true));
                let flag = running.clone();
                ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))?;
                follow_changes(bus, &running, Duration::from_millis(500));
            }
            manager.close_workspace();
        }
        Action::Remove { name } => match manager.remove_workspace(&name)? {
            Some(true) => println!("Removed workspace {}", name),
            Some(false) => anyhow::bail!("Workspace {} could not be removed", name),
            None => println!("No workspace named {}", name),
        },
        Action::Check { name } => {
            let valid = manager.is_workspace_name_valid(&name);
            let exists = manager.workspace_exists(&name)?;
            let verdict = if manager.blacklist().contains(&name) {
                "reserved"
            } else if valid {
                "valid"
            } else {
                "invalid"
            };
            println!(
                "{}: name {}, {}",
                name,
                verdict,
                if exists { "exists" } else { "does not exist" }
            );
        }
        Action::Update { name, description } => {
            if manager.repair_workspace(&name, &description)? {
                println!("Rebuilt workspace document for {}", name);
            } else {
                println!("Workspace {} is up to date", name);
            }
        }
        Action::SampleConfig | Action::Version | Action::Help => {
            unreachable!("handled before connecting")
        }
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse()?;
    match args.action {
        Action::Help => {
            print_usage();
            return Ok(());
        }
        Action::SampleConfig => {
            print!("{}", sample_config());
            return Ok(());
        }
        Action::Version => {
            println!("hostbook {}", hostbook_core::version());
            return Ok(());
        }
        _ => {}
    }

    let config = load_config(args.config.as_deref())?;
    tracing::debug!("Configuration loaded");

    let (manager, bus) = build_manager(&config);
    run(&manager, &bus, args.action)
}
