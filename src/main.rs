//! `projchat`: command-line front end for the project chat client.
//!
//! Startup sequence:
//!   1. Load .env (if present)
//!   2. Load config
//!   3. Resolve effective log level (CLI `-v` flags > env > config)
//!   4. Init logger once
//!   5. Build the workspace (restores a stored session token)
//!   6. Run one command, or the interactive shell
//!
//! # Usage
//!
//! ```text
//! projchat [--config <path>] [-v|-vv] <command> [args...]
//! ```
//!
//! Run `projchat --help` for the command list.

use std::path::PathBuf;
use std::process;

use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

use projchat::config;
use projchat::error::AppError;
use projchat::logger;
use projchat::models::{FileHandle, Message, Project, ProjectId, Upload};
use projchat::Workspace;

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct Args {
    config_path: Option<PathBuf>,
    verbose: u8,
    words: Vec<String>,
}

fn parse_args() -> Args {
    let mut config_path = None;
    let mut verbose = 0u8;
    let mut words = Vec::new();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" if words.is_empty() => {
                config_path = iter.next().map(PathBuf::from);
            }
            "-v" if words.is_empty() => verbose = verbose.saturating_add(1),
            "-vv" if words.is_empty() => verbose = verbose.saturating_add(2),
            "--help" | "-h" if words.is_empty() => {
                print_help();
                process::exit(0);
            }
            _ => words.push(arg),
        }
    }

    Args { config_path, verbose, words }
}

fn print_help() {
    eprintln!("usage: projchat [--config <path>] [-v|-vv] <command> [args...]");
    eprintln!();
    eprintln!("commands:");
    eprintln!("  register <email> <password>     create an account");
    eprintln!("  login <email> <password>        log in and store the session token");
    eprintln!("  logout                          forget the session token");
    eprintln!("  whoami                          show whether a session is held");
    eprintln!("  projects                        list projects");
    eprintln!("  create <name> [description...]  create a project");
    eprintln!("  delete <project-id>             delete a project");
    eprintln!("  files <project-id>              list a project's files");
    eprintln!("  upload <project-id> <path>      attach a file");
    eprintln!("  rm-file <project-id> <name>     remove an attachment");
    eprintln!("  chat <project-id> <message...>  send a chat message");
    eprintln!("  reset <project-id>              clear a project's chat history");
    eprintln!("  ping                            check the service is reachable");
    eprintln!("  shell                           interactive session (adds select/say/transcript)");
    eprintln!();
    eprintln!("flags:");
    eprintln!("  --config, -c <path>   config file (default: $PROJCHAT_CONFIG or config/default.toml)");
    eprintln!("  -v, -vv               debug / trace logging");
    eprintln!("  --help, -h            print this help");
}

// ── Commands ───────────────────────────────────────────────────────────────

enum Command {
    Register { email: String, password: String },
    Login { email: String, password: String },
    Logout,
    Whoami,
    Projects,
    Create { name: String, description: Option<String> },
    Delete(ProjectId),
    Files(ProjectId),
    Upload { id: ProjectId, path: PathBuf },
    RemoveFile { id: ProjectId, name: String },
    Chat { id: ProjectId, message: String },
    Reset(ProjectId),
    Ping,
    // shell-only
    Select(ProjectId),
    Deselect,
    Say(String),
    Transcript,
    Shell,
    Quit,
}

fn word<'a>(rest: &'a [String], i: usize, usage: &str) -> Result<&'a str, AppError> {
    rest.get(i)
        .map(String::as_str)
        .ok_or_else(|| AppError::Usage(format!("usage: {usage}")))
}

fn project_id(rest: &[String], usage: &str) -> Result<ProjectId, AppError> {
    let raw = word(rest, 0, usage)?;
    raw.parse()
        .map_err(|_| AppError::Usage(format!("not a project id: {raw}")))
}

fn tail(rest: &[String], from: usize) -> String {
    rest.iter().skip(from).cloned().collect::<Vec<_>>().join(" ")
}

fn build_command(words: &[String]) -> Result<Command, AppError> {
    let (cmd, rest) = words
        .split_first()
        .ok_or_else(|| AppError::Usage("no command given; run 'projchat --help' for usage".into()))?;
    let cmd = match cmd.as_str() {
        "register" => Command::Register {
            email: word(rest, 0, "register <email> <password>")?.to_string(),
            password: word(rest, 1, "register <email> <password>")?.to_string(),
        },
        "login" => Command::Login {
            email: word(rest, 0, "login <email> <password>")?.to_string(),
            password: word(rest, 1, "login <email> <password>")?.to_string(),
        },
        "logout" => Command::Logout,
        "whoami" => Command::Whoami,
        "projects" | "ls" => Command::Projects,
        "create" => Command::Create {
            name: word(rest, 0, "create <name> [description...]")?.to_string(),
            description: Some(tail(rest, 1)).filter(|d| !d.is_empty()),
        },
        "delete" => Command::Delete(project_id(rest, "delete <project-id>")?),
        "files" => Command::Files(project_id(rest, "files <project-id>")?),
        "upload" => Command::Upload {
            id: project_id(rest, "upload <project-id> <path>")?,
            path: PathBuf::from(word(rest, 1, "upload <project-id> <path>")?),
        },
        "rm-file" => Command::RemoveFile {
            id: project_id(rest, "rm-file <project-id> <name>")?,
            name: tail(rest, 1),
        },
        "chat" => Command::Chat {
            id: project_id(rest, "chat <project-id> <message...>")?,
            message: tail(rest, 1),
        },
        "reset" => Command::Reset(project_id(rest, "reset <project-id>")?),
        "ping" => Command::Ping,
        "select" => Command::Select(project_id(rest, "select <project-id>")?),
        "deselect" => Command::Deselect,
        "say" => Command::Say(tail(rest, 0)),
        "transcript" => Command::Transcript,
        "shell" => Command::Shell,
        "quit" | "exit" => Command::Quit,
        other => {
            return Err(AppError::Usage(format!(
                "unknown command: {other}\n  run 'projchat --help' for usage"
            )));
        }
    };
    Ok(cmd)
}

fn print_projects(projects: &[Project], selected: Option<ProjectId>) {
    if projects.is_empty() {
        println!("(no projects)");
    }
    for p in projects {
        let marker = if Some(p.id) == selected { "*" } else { " " };
        let description = p.description.as_deref().filter(|d| !d.is_empty()).unwrap_or("-");
        println!("{marker} {:>4}  {}  [{} file(s)]  {description}", p.id, p.name, p.files.len());
    }
}

fn print_transcript(messages: &[Message]) {
    if messages.is_empty() {
        println!("(empty transcript)");
    }
    for m in messages {
        println!("{:>9}: {}", m.role.label(), m.content);
    }
}

/// Make sure `id` is in the cache before operating on it.
async fn ensure_listed(ws: &Workspace, id: ProjectId) -> Result<(), AppError> {
    if !ws.store().contains(id) {
        ws.refresh_projects().await?;
    }
    Ok(())
}

async fn execute(ws: &Workspace, cmd: Command) -> Result<(), AppError> {
    match cmd {
        Command::Register { email, password } => {
            let c = ws.register(&email, &password).await?;
            println!("ok  {}", if c.message.is_empty() { "registered" } else { c.message.as_str() });
            println!("    now run: projchat login {email} <password>");
        }
        Command::Login { email, password } => {
            ws.login(&email, &password).await?;
            println!("ok  logged in as {email}");
        }
        Command::Logout => {
            ws.logout();
            println!("ok  logged out");
        }
        Command::Whoami => {
            let state = if ws.is_authenticated() { "authenticated" } else { "not logged in" };
            println!("{state}");
        }
        Command::Projects => {
            let projects = ws.refresh_projects().await?;
            print_projects(&projects, ws.store().selected_id());
        }
        Command::Create { name, description } => {
            let p = ws.create_project(&name, description.as_deref()).await?;
            println!("ok  created project {} ({})", p.id, p.name);
        }
        Command::Delete(id) => {
            let remaining = ws.delete_project(id).await?;
            println!("ok  deleted project {id}");
            print_projects(&remaining, ws.store().selected_id());
        }
        Command::Files(id) => {
            ws.refresh_projects().await?;
            let files = ws.files().files(id).ok_or(projchat::ClientError::UnknownProject(id))?;
            if files.is_empty() {
                println!("(no files)");
            }
            for f in files {
                println!("  {}", f.name);
            }
        }
        Command::Upload { id, path } => {
            let upload = Upload::from_path(&path).await?;
            let files = ws.upload_file(id, &upload).await?;
            println!("ok  uploaded {} ({} file(s) attached)", upload.file_name, files.len());
        }
        Command::RemoveFile { id, name } => {
            let files = ws.delete_file(id, &FileHandle::named(name.clone())).await?;
            println!("ok  removed {name} ({} file(s) attached)", files.len());
        }
        Command::Chat { id, message } => {
            ensure_listed(ws, id).await?;
            let transcript = ws.send_message(id, &message).await?;
            print_transcript(&transcript);
        }
        Command::Reset(id) => {
            ws.reset_chat(id).await?;
            println!("ok  chat history cleared for project {id}");
        }
        Command::Ping => {
            let status = ws.ping().await?;
            let state = if status.reachable { "reachable" } else { "degraded" };
            println!("{state}  {}", status.message);
        }
        Command::Select(id) => {
            ensure_listed(ws, id).await?;
            let p = ws.select_project(id)?;
            println!("ok  selected {} ({})", p.id, p.name);
            print_transcript(&ws.active_transcript());
        }
        Command::Deselect => {
            ws.deselect_project();
            println!("ok  no project selected");
        }
        Command::Say(message) => {
            let id = ws
                .store()
                .selected_id()
                .ok_or_else(|| AppError::Usage("no project selected; use 'select <project-id>'".into()))?;
            let transcript = ws.send_message(id, &message).await?;
            print_transcript(&transcript);
        }
        Command::Transcript => print_transcript(&ws.active_transcript()),
        Command::Shell | Command::Quit => {}
    }
    Ok(())
}

/// Line-oriented loop over stdin; one command per line.
async fn shell(ws: &Workspace) -> Result<(), AppError> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("projchat shell; 'quit' to leave");
    while let Some(line) = lines.next_line().await? {
        let words: Vec<String> = line.split_whitespace().map(String::from).collect();
        if words.is_empty() {
            continue;
        }
        match build_command(&words) {
            Ok(Command::Quit) => break,
            Ok(Command::Shell) => eprintln!("already in the shell"),
            Ok(cmd) => {
                if let Err(e) = execute(ws, cmd).await {
                    eprintln!("error: {e}");
                    if !ws.is_authenticated() {
                        eprintln!("       session ended; run 'login <email> <password>'");
                    }
                }
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

async fn run() -> Result<(), AppError> {
    // .env is optional.
    let _ = dotenvy::dotenv();

    let args = parse_args();
    let config = config::load(args.config_path.as_deref())?;

    let cli_level = logger::verbosity_level(args.verbose);
    let effective_log_level = cli_level.unwrap_or(config.log_level.as_str());
    logger::init(effective_log_level, cli_level.is_some())?;

    info!(base_url = %config.api.base_url, persist_token = config.session.persist, "config loaded");

    let ws = Workspace::from_config(&config)?;
    debug!(authenticated = ws.is_authenticated(), "workspace ready");

    match build_command(&args.words)? {
        Command::Shell => shell(&ws).await,
        cmd => execute(&ws, cmd).await,
    }
}
