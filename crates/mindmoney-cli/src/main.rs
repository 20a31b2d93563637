use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use console::{style, Term};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod ui;

use mindmoney_core::*;
use mindmoney_memory::{MemoryKeyValueStore, SqliteKeyValueStore};
use mindmoney_provider::{CoachBackend, HttpCoachBackend, StubBackend};

#[derive(Parser)]
#[command(name = "mindmoney", version, about = "MindMoney financial coaching client")]
struct Cli {
    #[arg(
        long,
        global = true,
        default_value = "~/.mindmoney",
        help = "Config root directory (contains config/ and data/)"
    )]
    config_root: PathBuf,

    #[arg(long, global = true, help = "Answer locally without contacting the backend")]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Interactive chat with the coach")]
    Chat,
    #[command(about = "Validate config files")]
    Validate,
    #[command(subcommand, about = "Tracked action items")]
    Actions(ActionCommands),
    #[command(subcommand, about = "Stored chat sessions of the signed-in user")]
    Sessions(SessionCommands),
}

#[derive(Subcommand)]
enum ActionCommands {
    #[command(about = "List action items, open and urgent first")]
    List,
    #[command(about = "Mark an action item done, or not done")]
    Toggle {
        #[arg(help = "Action item ID")]
        id: String,
    },
}

#[derive(Subcommand)]
enum SessionCommands {
    #[command(about = "List stored sessions")]
    List,
    #[command(about = "Print the history of a stored session")]
    Show {
        #[arg(help = "Session ID")]
        session_id: String,
    },
}

/// A line typed at the chat prompt.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Quit,
    Help,
    Actions,
    Toggle(String),
    Form,
    Sessions,
    Restore(String),
    Message(String),
    Empty,
    Invalid(String),
}

fn parse_repl_line(line: &str) -> ReplCommand {
    let line = line.trim();
    if line.is_empty() {
        return ReplCommand::Empty;
    }
    if line == "quit" || line == "exit" {
        return ReplCommand::Quit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ReplCommand::Message(line.to_string());
    };

    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match (name, arg) {
        ("help", _) => ReplCommand::Help,
        ("actions", _) => ReplCommand::Actions,
        ("form", _) => ReplCommand::Form,
        ("sessions", _) => ReplCommand::Sessions,
        ("done" | "toggle", id) if !id.is_empty() => ReplCommand::Toggle(id.to_string()),
        ("restore", id) if !id.is_empty() => ReplCommand::Restore(id.to_string()),
        _ => ReplCommand::Invalid(line.to_string()),
    }
}

const REPL_HELP: &str = "\
Commands:
  /actions          show the action plan
  /done <id>        toggle an action item
  /form             show the latest profile form
  /sessions         list stored sessions
  /restore <id>     load a stored session
  quit | exit       leave";

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    // Expand ~ to home directory
    if cli.config_root.starts_with("~") {
        if let Some(home) = std::env::var_os("HOME") {
            cli.config_root = PathBuf::from(home).join(
                cli.config_root
                    .strip_prefix("~")
                    .unwrap_or(&cli.config_root),
            );
        }
    }

    let log_dir = cli.config_root.join("logs");
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "mindmoney.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking),
        )
        .init();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = load_config(&cli.config_root)?;

    match command {
        Commands::Validate => {
            println!(
                "Config valid. backend {} (timeout {}s), data dir {}, {}.",
                config.backend.base_url,
                config.backend.request_timeout_secs,
                config.data_dir(&cli.config_root).display(),
                if config.user_id().is_some() {
                    "signed in"
                } else {
                    "signed out"
                }
            );
        }
        Commands::Chat => {
            let backend = build_backend(&config, cli.offline)?;
            run_repl(&cli.config_root, &config, backend).await?;
        }
        Commands::Actions(cmd) => {
            let plan = open_action_plan(&cli.config_root, &config).await?;
            match cmd {
                ActionCommands::List => print_actions(&plan).await,
                ActionCommands::Toggle { id } => {
                    if plan.toggle_completion(&id).await {
                        print_actions(&plan).await;
                    } else {
                        println!("No action item with id {id}.");
                    }
                }
            }
        }
        Commands::Sessions(cmd) => {
            let backend = build_backend(&config, cli.offline)?;
            let session =
                ChatSession::open(&config, &cli.config_root, backend, &MemoryKeyValueStore::new())
                    .await?;
            if !session.user_present() {
                println!("Not signed in. Set auth.user_id to see stored sessions.");
                return Ok(());
            }
            match cmd {
                SessionCommands::List => print_sessions(&session).await?,
                SessionCommands::Show { session_id } => {
                    session.restore(&session_id).await?;
                    for turn in session.conversation().turns().await {
                        println!("{}", ui::render_turn(&turn));
                    }
                }
            }
        }
    }

    Ok(())
}

fn build_backend(config: &MindMoneyConfig, offline: bool) -> Result<Arc<dyn CoachBackend>> {
    if offline {
        return Ok(Arc::new(StubBackend));
    }
    let backend =
        HttpCoachBackend::new(&config.backend.base_url, config.backend.request_timeout())?;
    Ok(Arc::new(backend))
}

async fn open_action_plan(root: &Path, config: &MindMoneyConfig) -> Result<ActionPlanStore> {
    let storage = SqliteKeyValueStore::open(&config.data_dir(root).join(STORE_FILE))?;
    Ok(ActionPlanStore::open(Arc::new(storage), Arc::new(RandomIds)).await)
}

async fn print_actions(plan: &ActionPlanStore) {
    let items = plan.sorted_items().await;
    let progress = plan.progress().await;
    for line in ui::render_actions(&items, progress) {
        println!("{line}");
    }
}

async fn print_sessions(session: &ChatSession) -> Result<()> {
    let sessions = session.list_sessions().await?;
    if sessions.is_empty() {
        println!("No stored sessions.");
    }
    for summary in &sessions {
        println!("{}", ui::render_session(summary));
    }
    Ok(())
}

async fn run_repl(
    root: &Path,
    config: &MindMoneyConfig,
    backend: Arc<dyn CoachBackend>,
) -> Result<()> {
    // The process is the "tab": its session id lives as long as the REPL.
    let tab_store = MemoryKeyValueStore::new();
    let session = ChatSession::open(config, root, backend, &tab_store).await?;
    let term = Term::stdout();

    println!(
        "MindMoney chat ({}). Type /help for commands, 'quit' to exit.",
        session.session_id()
    );
    println!("---");
    for turn in session.conversation().turns().await {
        println!("{}", ui::render_turn(&turn));
    }

    let interrupted = CancellationToken::new();
    spawn_interrupt_listener(interrupted.clone());
    let mut lines = spawn_line_reader();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(input) = next_line(&mut lines, &interrupted).await else {
            break;
        };

        match parse_repl_line(&input) {
            ReplCommand::Empty => continue,
            ReplCommand::Quit => break,
            ReplCommand::Help => println!("{REPL_HELP}"),
            ReplCommand::Invalid(line) => println!("Unknown command: {line}. Try /help."),
            ReplCommand::Actions => print_actions(session.action_plan()).await,
            ReplCommand::Toggle(id) => {
                if session.action_plan().toggle_completion(&id).await {
                    print_actions(session.action_plan()).await;
                } else {
                    println!("No action item with id {id}.");
                }
            }
            ReplCommand::Form => match session.action_plan().form_schema().await {
                Some(schema) => {
                    for line in ui::render_form(&schema) {
                        println!("{line}");
                    }
                }
                None => println!("The coach has not asked for a profile yet."),
            },
            ReplCommand::Sessions => {
                if let Err(err) = print_sessions(&session).await {
                    eprintln!("Error: {err}");
                }
            }
            ReplCommand::Restore(id) => match session.restore(&id).await {
                Ok(0) if !session.user_present() => {
                    println!("Not signed in. Set auth.user_id to restore sessions.")
                }
                Ok(_) => {
                    for turn in session.conversation().turns().await {
                        println!("{}", ui::render_turn(&turn));
                    }
                }
                Err(err) => eprintln!("Error: {err}"),
            },
            ReplCommand::Message(text) => {
                if !send_with_trace(&session, &term, &text, &interrupted).await? {
                    break;
                }
            }
        }
    }

    if interrupted.is_cancelled() {
        let _ = term.write_line("interrupted");
    }
    session.shutdown().await;
    Ok(())
}

/// Cancels `interrupted` on the first Ctrl-C. Installed once for the whole
/// REPL so the handler covers the prompt as well as in-flight sends.
fn spawn_interrupt_listener(interrupted: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => interrupted.cancel(),
            Err(err) => tracing::warn!(error = %err, "failed to listen for ctrl-c"),
        }
    });
}

/// Reads stdin lines on a plain thread. Blocking reads would otherwise keep
/// the runtime from shutting down after an interrupt at the prompt.
fn spawn_line_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// The next typed line, or `None` on end of input or interrupt.
async fn next_line(
    lines: &mut mpsc::UnboundedReceiver<String>,
    interrupted: &CancellationToken,
) -> Option<String> {
    tokio::select! {
        biased;
        () = interrupted.cancelled() => None,
        line = lines.recv() => line,
    }
}

/// Sends one message, printing trace steps as they are revealed. Returns
/// false if the user interrupted and the session was shut down.
async fn send_with_trace(
    session: &ChatSession,
    term: &Term,
    text: &str,
    interrupted: &CancellationToken,
) -> Result<bool> {
    let send = session.send(text);
    tokio::pin!(send);
    let mut ticker = tokio::time::interval(Duration::from_millis(50));
    let mut shown = 0;

    let result = loop {
        tokio::select! {
            result = &mut send => break result,
            _ = ticker.tick() => {
                shown = print_new_steps(session, term, shown).await;
            }
            () = interrupted.cancelled() => return Ok(false),
        }
    };
    print_new_steps(session, term, shown).await;

    match result {
        Ok(SendOutcome::Answered(reply)) => {
            let _ = term.write_line(&ui::render_turn(&reply));
            if let Some(plan) = &reply.attached_plan {
                if let Some(actions) = plan.immediate_actions.as_ref().filter(|a| !a.is_empty()) {
                    let _ = term.write_line(&format!(
                        "{}",
                        style(format!("{} new action item(s). See /actions.", actions.len()))
                            .yellow()
                    ));
                }
                if let Some(score) = plan.financial_health_score {
                    let _ = term.write_line(&format!("Financial health score: {score}/100"));
                }
                for win in plan.quick_wins.iter().flatten() {
                    let _ = term.write_line(&format!("  quick win: {win}"));
                }
                if plan.financial_planning_form.is_some() {
                    let _ = term.write_line("The coach wants to know more. See /form.");
                }
            }
        }
        Ok(SendOutcome::Failed { reply, .. }) => {
            let _ = term.write_line(&ui::render_turn(&reply));
        }
        Ok(SendOutcome::Cancelled) => return Ok(false),
        Err(err) => {
            let _ = term.write_line(&format!("{}", style(err).red()));
        }
    }
    Ok(true)
}

async fn print_new_steps(session: &ChatSession, term: &Term, shown: usize) -> usize {
    let steps = session.animator().visible_steps().await;
    for step in steps.iter().skip(shown) {
        let _ = term.write_line(&ui::render_step(step));
    }
    steps.len().max(shown)
}
