use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::Instant;
use tracing::Level;
use uuid::Uuid;

use wsprobe::config::{AppConfig, ReconnectPolicy, ReconnectTracker};
use wsprobe::services::persistence::PersistenceError;
use wsprobe::session::{InputQueue, SessionInput, parse_line};
use wsprobe::transcript::{TranscriptEntry, format_clock, render_content};
use wsprobe::transport::tungstenite::TungsteniteConnector;
use wsprobe::validation::{self, ValidationError};
use wsprobe::{AppState, ConnectionStatus, ErrorCode, FileStorage, Outcome, PersistenceGateway, Project, Signal};

type LiveState = AppState<TungsteniteConnector, FileStorage>;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("no project matches `{0}`")]
    UnknownProject(String),
    #[error("no signal matches `{signal}` in project `{project}`")]
    UnknownSignal { signal: String, project: String },
    #[error("no projects yet; create one with `wsprobe project add`")]
    NoProject,
    #[error("nothing to update; pass at least one field")]
    EmptyPatch,
    #[error("refusing to clear data without --yes")]
    ConfirmationRequired,
    #[error("stdin read failed: {0}")]
    Stdin(#[from] io::Error),
    #[error("output encode failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ErrorCode for CliError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Persistence(e) => e.error_code(),
            Self::Validation(e) => e.error_code(),
            Self::UnknownProject(_) => "E_PROJECT_NOT_FOUND",
            Self::UnknownSignal { .. } => "E_SIGNAL_NOT_FOUND",
            Self::NoProject => "E_NO_PROJECT",
            Self::EmptyPatch => "E_EMPTY_PATCH",
            Self::ConfirmationRequired => "E_CONFIRM",
            Self::Stdin(_) => "E_STDIN",
            Self::Encode(_) => "E_ENCODE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Persistence(e) => e.retryable(),
            _ => false,
        }
    }
}

// =============================================================================
// COMMAND LINE
// =============================================================================

#[derive(Parser, Debug)]
#[command(name = "wsprobe", about = "WebSocket testing client")]
struct Cli {
    /// Directory holding the stored projects and signals.
    #[arg(long, global = true, env = "WSPROBE_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log at debug level on stderr.
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Project(ProjectCommand),
    Signal(SignalCommand),
    /// Open an interactive session against a project's endpoint.
    Connect(ConnectArgs),
    Data(DataCommand),
}

#[derive(Args, Debug)]
struct ProjectCommand {
    #[command(subcommand)]
    command: ProjectSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectSubcommand {
    List,
    Show {
        project: String,
    },
    Add {
        name: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        description: Option<String>,
    },
    Update {
        project: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        url: Option<String>,
        #[arg(long, help = "New description; pass an empty string to clear it")]
        description: Option<String>,
    },
    Delete {
        project: String,
    },
}

#[derive(Args, Debug)]
struct SignalCommand {
    #[command(subcommand)]
    command: SignalSubcommand,
}

#[derive(Subcommand, Debug)]
enum SignalSubcommand {
    List {
        #[arg(long)]
        project: Option<String>,
    },
    Add {
        name: String,
        #[arg(long)]
        payload: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        project: Option<String>,
    },
    Update {
        signal: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        payload: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Delete {
        signal: String,
        #[arg(long)]
        project: Option<String>,
    },
}

#[derive(Args, Debug)]
struct ConnectArgs {
    /// Project id or name; defaults to the first project.
    project: Option<String>,

    /// Do not reconnect after the connection drops.
    #[arg(long, default_value_t = false)]
    no_reconnect: bool,
}

#[derive(Args, Debug)]
struct DataCommand {
    #[command(subcommand)]
    command: DataSubcommand,
}

#[derive(Subcommand, Debug)]
enum DataSubcommand {
    /// Remove every stored project and signal.
    Clear {
        #[arg(long, default_value_t = false)]
        yes: bool,
    },
}

// =============================================================================
// ENTRY
// =============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    tracing_subscriber::fmt().with_max_level(level).with_writer(io::stderr).init();

    // wss handshakes need a process-wide crypto provider.
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        tracing::debug!("crypto provider already installed");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error[{}]: {e}", e.error_code());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let mut config = AppConfig::from_env();
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    let connector = TungsteniteConnector::new(Duration::from_secs(config.connect_timeout_secs));
    let gateway = PersistenceGateway::new(FileStorage::new(&config.data_dir), config.storage_key.clone());
    let mut state = AppState::load(connector, gateway)?;

    match cli.command {
        Command::Project(project) => run_project(&mut state, project),
        Command::Signal(signal) => run_signal(&mut state, signal),
        Command::Connect(args) => {
            let mut policy = config.reconnect;
            if args.no_reconnect {
                policy.enabled = false;
            }
            run_connect(&mut state, args.project.as_deref(), policy).await
        }
        Command::Data(data) => run_data(&mut state, data),
    }?;

    state.flush()?;
    Ok(())
}

// =============================================================================
// PROJECTS / SIGNALS
// =============================================================================

fn run_project(state: &mut LiveState, project: ProjectCommand) -> Result<(), CliError> {
    match project.command {
        ProjectSubcommand::List => print_json(&state.store().projects()),
        ProjectSubcommand::Show { project } => {
            let found = find_project(state, &project)?;
            let signals: Vec<&Signal> = state.store().signals_for(found.id).collect();
            print_json(&serde_json::json!({ "project": found, "signals": signals }))
        }
        ProjectSubcommand::Add { name, url, description } => {
            let input = validation::validate_project(&name, description.as_deref(), &url)?;
            let created = state.add_project(input);
            print_json(&created)
        }
        ProjectSubcommand::Update { project, name, url, description } => {
            let id = find_project(state, &project)?.id;
            let patch = validation::validate_project_patch(name.as_deref(), description.as_deref(), url.as_deref())?;
            if patch.is_empty() {
                return Err(CliError::EmptyPatch);
            }
            expect_found(state.update_project(id, patch), || CliError::UnknownProject(project.clone()))?;
            print_json(&state.store().project(id))
        }
        ProjectSubcommand::Delete { project } => {
            let id = find_project(state, &project)?.id;
            let cascaded = state.store().signals_for(id).count();
            expect_found(state.delete_project(id), || CliError::UnknownProject(project.clone()))?;
            print_json(&serde_json::json!({ "deleted": id, "signalsDeleted": cascaded }))
        }
    }
}

fn run_signal(state: &mut LiveState, signal: SignalCommand) -> Result<(), CliError> {
    match signal.command {
        SignalSubcommand::List { project } => {
            let project_id = resolve_project(state, project.as_deref())?.id;
            let signals: Vec<&Signal> = state.store().signals_for(project_id).collect();
            print_json(&signals)
        }
        SignalSubcommand::Add { name, payload, description, project } => {
            let project_id = resolve_project(state, project.as_deref())?.id;
            let input = validation::validate_signal(project_id, &name, description.as_deref(), &payload)?;
            let created = state.add_signal(input);
            print_json(&created)
        }
        SignalSubcommand::Update { signal, project, name, payload, description } => {
            let id = find_signal(state, project.as_deref(), &signal)?.id;
            let patch = validation::validate_signal_patch(name.as_deref(), description.as_deref(), payload.as_deref())?;
            if patch.is_empty() {
                return Err(CliError::EmptyPatch);
            }
            expect_found(state.update_signal(id, patch), || signal_not_found(&signal, project.as_deref()))?;
            print_json(&state.store().signal(id))
        }
        SignalSubcommand::Delete { signal, project } => {
            let id = find_signal(state, project.as_deref(), &signal)?.id;
            expect_found(state.delete_signal(id), || signal_not_found(&signal, project.as_deref()))?;
            print_json(&serde_json::json!({ "deleted": id }))
        }
    }
}

fn run_data(state: &mut LiveState, data: DataCommand) -> Result<(), CliError> {
    match data.command {
        DataSubcommand::Clear { yes } => {
            if !yes {
                return Err(CliError::ConfirmationRequired);
            }
            state.clear_all_data()?;
            println!("all projects and signals removed");
            Ok(())
        }
    }
}

fn find_project<'a>(state: &'a LiveState, reference: &str) -> Result<&'a Project, CliError> {
    state
        .store()
        .find_project(reference)
        .ok_or_else(|| CliError::UnknownProject(reference.to_owned()))
}

/// Explicit reference, else the current project, else the first one.
fn resolve_project<'a>(state: &'a LiveState, reference: Option<&str>) -> Result<&'a Project, CliError> {
    match reference {
        Some(reference) => find_project(state, reference),
        None => state
            .store()
            .current_project()
            .or_else(|| state.store().projects().first())
            .ok_or(CliError::NoProject),
    }
}

fn find_signal<'a>(state: &'a LiveState, project: Option<&str>, reference: &str) -> Result<&'a Signal, CliError> {
    let project = resolve_project(state, project)?;
    state
        .store()
        .find_signal(project.id, reference)
        .ok_or_else(|| CliError::UnknownSignal { signal: reference.to_owned(), project: project.name.clone() })
}

fn signal_not_found(signal: &str, project: Option<&str>) -> CliError {
    CliError::UnknownSignal { signal: signal.to_owned(), project: project.unwrap_or("current").to_owned() }
}

fn expect_found(outcome: Outcome, not_found: impl FnOnce() -> CliError) -> Result<(), CliError> {
    match outcome {
        Outcome::NotFound => Err(not_found()),
        _ => Ok(()),
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    let rendered = serde_json::to_string_pretty(value)?;
    println!("{rendered}");
    Ok(())
}

// =============================================================================
// INTERACTIVE SESSION
// =============================================================================

const SESSION_HELP: &str = "\
  <text>            send text verbatim
  //<text>          send text that starts with a single /
  /signal <ref>     load a signal's payload into the draft
  /send             send the draft
  /signals          list signals of the current project
  /project <ref>    switch project and reconnect
  /use <ref>        switch project without reconnecting
  /open <url>       connect to a ws:// or wss:// url outside the store
  /connect          reconnect to the current project
  /disconnect       close the connection
  /clear            clear the transcript
  /status           show connection status
  /history          print the whole transcript
  /quit             leave the session";

#[derive(Debug)]
struct Session {
    /// Payload loaded by `/signal`, sent by `/send`.
    draft: String,
    /// Transcript entries already printed.
    printed: usize,
    /// Lines read while connecting, replayed once the connection settles.
    input: InputQueue,
    stdin_open: bool,
    reconnect: ReconnectTracker,
    reconnect_at: Option<Instant>,
}

impl Session {
    fn new(policy: ReconnectPolicy) -> Self {
        Self {
            draft: String::new(),
            printed: 0,
            input: InputQueue::new(),
            stdin_open: true,
            reconnect: ReconnectTracker::new(policy),
            reconnect_at: None,
        }
    }
}

enum Flow {
    Continue,
    Quit,
}

async fn run_connect(state: &mut LiveState, project: Option<&str>, policy: ReconnectPolicy) -> Result<(), CliError> {
    let id = resolve_project(state, project)?.id;
    if state.select_project(id) == Outcome::NotFound {
        return Err(CliError::NoProject);
    }
    if let Some(project) = state.store().current_project() {
        println!(
            "project {} -> {} (browser: {})",
            project.name,
            project.websocket_url,
            validation::browser_url(&project.websocket_url)
        );
    }
    println!("type /help for commands");

    let mut session = Session::new(policy);
    let mut last_status = ConnectionStatus::Disconnected;
    report_status(state, &mut session, &mut last_status);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let reconnect_at = session.reconnect_at;
        let reconnect = async move {
            match reconnect_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            line = lines.next_line(), if session.stdin_open => match line? {
                Some(line) => session.input.push(line),
                None => session.stdin_open = false,
            },
            Some(envelope) = state.connection_mut().next_event() => {
                state.connection_mut().handle_event(envelope);
            }
            () = reconnect => {
                session.reconnect_at = None;
                session.reconnect.fired();
                println!("reconnecting (attempt {})", session.reconnect.attempt());
                if state.connect_current() == Outcome::NotFound {
                    println!("no project selected; not reconnecting");
                }
            }
        }

        let flow = replay_input(state, &mut session);
        print_new_entries(state, &mut session);
        report_status(state, &mut session, &mut last_status);
        if let Flow::Quit = flow {
            break;
        }
        if !session.stdin_open && session.input.is_empty() {
            break;
        }
    }

    state.disconnect();
    Ok(())
}

/// Handle held lines until the queue is empty or the connection is
/// connecting again.
fn replay_input(state: &mut LiveState, session: &mut Session) -> Flow {
    while let Some(line) = session.input.next_ready(state.connection().status()) {
        if let Flow::Quit = handle_line(state, session, &line) {
            return Flow::Quit;
        }
    }
    Flow::Continue
}

fn handle_line(state: &mut LiveState, session: &mut Session, line: &str) -> Flow {
    let (name, arg) = match parse_line(line) {
        SessionInput::Text(text) => {
            if validation::is_sendable_draft(text) {
                report_send(state.send(text));
            }
            return Flow::Continue;
        }
        SessionInput::Command { name, arg } => (name, arg),
    };

    match name {
        "quit" | "exit" => {
            session.reconnect.user_close();
            return Flow::Quit;
        }
        "signal" => load_signal(state, session, arg),
        "send" => {
            if validation::is_sendable_draft(&session.draft) {
                let outcome = state.send(&session.draft);
                if outcome.is_applied() {
                    session.draft.clear();
                }
                report_send(outcome);
            } else {
                println!("draft is empty; load one with /signal <name>");
            }
        }
        "signals" => {
            for signal in state.store().current_signals() {
                println!("  {}  {}", signal.name, signal.payload);
            }
        }
        "project" => match state.store().find_project(arg).map(|p| p.id) {
            Some(id) => user_connect(state, session, Target::Project(id)),
            None => println!("no project matches `{arg}`"),
        },
        "use" => match state.store().find_project(arg).map(|p| p.id) {
            Some(id) => {
                if state.set_current_project(Some(id)).is_applied() {
                    println!("current project: {arg}");
                }
            }
            None => println!("no project matches `{arg}`"),
        },
        "open" => match validation::websocket_url(arg) {
            Ok(url) => user_connect(state, session, Target::Url(&url)),
            Err(e) => println!("error[{}]: {e}", e.error_code()),
        },
        "connect" => user_connect(state, session, Target::Current),
        "disconnect" => {
            session.reconnect.user_close();
            session.reconnect_at = None;
            state.disconnect();
        }
        "clear" => {
            state.clear_transcript();
            session.printed = 0;
        }
        "status" => print_status(state),
        "history" => {
            for entry in state.connection().transcript().entries() {
                print_entry(entry);
            }
        }
        _ => println!("{SESSION_HELP}"),
    }
    Flow::Continue
}

enum Target<'a> {
    Current,
    Project(Uuid),
    Url(&'a str),
}

/// Connect on the user's request. Resets the reconnect backoff.
fn user_connect(state: &mut LiveState, session: &mut Session, target: Target<'_>) {
    session.reconnect.user_connect();
    session.reconnect_at = None;
    let outcome = match target {
        Target::Current => state.connect_current(),
        Target::Project(id) => state.select_project(id),
        Target::Url(url) => {
            state.connect(url);
            Outcome::Applied
        }
    };
    if outcome == Outcome::NotFound {
        println!("no project selected");
    }
}

fn load_signal(state: &LiveState, session: &mut Session, reference: &str) {
    let Some(project) = state.store().current_project() else {
        println!("no project selected");
        return;
    };
    let Some(payload) = state
        .store()
        .find_signal(project.id, reference)
        .and_then(|s| state.signal_payload(s.id))
    else {
        println!("no signal matches `{reference}`");
        return;
    };
    println!("draft loaded; /send to transmit:\n{}", render_content(&payload));
    session.draft = payload;
}

fn report_send(outcome: Outcome) {
    if outcome == Outcome::NotConnected {
        println!("not connected; message not sent");
    }
}

fn print_new_entries(state: &LiveState, session: &mut Session) {
    let transcript = state.connection().transcript();
    for entry in transcript.since(session.printed) {
        print_entry(entry);
    }
    session.printed = transcript.len();
}

fn print_entry(entry: &TranscriptEntry) {
    println!("[{}] {:<8} {}", format_clock(entry.timestamp), entry.direction.label(), render_content(&entry.content));
}

fn print_status(state: &LiveState) {
    let connection = state.connection();
    println!("status: {}", connection.status().label());
    if let Some(url) = connection.url() {
        println!("url: {url}");
    }
    if let Some(e) = connection.last_error() {
        println!("last error[{}]: {e}", e.error_code());
    }
    println!("messages: {}", connection.transcript().len());
}

/// Print status changes and schedule the reconnects the tracker asks for.
fn report_status(state: &LiveState, session: &mut Session, last: &mut ConnectionStatus) {
    let status = state.connection().status();
    if status != *last {
        match (status, state.connection().last_error()) {
            (ConnectionStatus::Error, Some(e)) => println!("-- {} [{}]: {e}", status.label(), e.error_code()),
            _ => println!("-- {}", status.label()),
        }
        *last = status;
    }

    if let Some(delay) = session.reconnect.observe(status) {
        session.reconnect_at = Some(Instant::now() + delay);
        println!("-- reconnecting in {}ms", delay.as_millis());
    }
}
