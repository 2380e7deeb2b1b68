//! sessionkeep - terminal front end for the session manager.
//!
//! Logs in against the token backend, keeps the session in the configured
//! credential store and exercises protected calls and route checks from the
//! command line.

use std::io::{self, Write};

use anyhow::{bail, Context, Result};
use sessionkeep_core::api::ApiError;
use sessionkeep_core::{Config, GuardDecision, SessionManager, SubmitError};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// ============================================================================
// Constants
// ============================================================================

/// Directory for an additional log file
const ENV_LOG_DIR: &str = "SESSIONKEEP_LOG_DIR";

/// Log file name inside `SESSIONKEEP_LOG_DIR`
const LOG_FILE: &str = "sessionkeep.log";

/// Defaults for non-interactive login
const ENV_USERNAME: &str = "SESSIONKEEP_USERNAME";
const ENV_PASSWORD: &str = "SESSIONKEEP_PASSWORD";

/// Route opened after a successful login
const AFTER_LOGIN_ROUTE: &str = "/dashboard";

const USAGE: &str = "\
Usage: sessionkeep <command>

Commands:
  login [username]              Log in (password is prompted)
  register <username> <email>   Create an account and log in
  logout                        End the session
  status                        Show who is logged in
  probe                         Call the protected endpoint
  open <route>                  Check whether a route may be opened";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Login { username: Option<String> },
    Register { username: String, email: String },
    Logout,
    Status,
    Probe,
    Open { route: String },
    Help,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        Ok(match args.as_slice() {
            [] | ["help"] | ["--help"] | ["-h"] => Command::Help,
            ["login"] => Command::Login { username: None },
            ["login", username] => Command::Login {
                username: Some(username.to_string()),
            },
            ["register", username, email] => Command::Register {
                username: username.to_string(),
                email: email.to_string(),
            },
            ["logout"] => Command::Logout,
            ["status"] => Command::Status,
            ["probe"] => Command::Probe,
            ["open", route] => Command::Open {
                route: route.to_string(),
            },
            _ => bail!("Unrecognized arguments: {}\n\n{}", args.join(" "), USAGE),
        })
    }
}

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the log file on drop.
fn init_tracing() -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match std::env::var(ENV_LOG_DIR) {
        Ok(dir) => {
            let appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let _log_guard = init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;
    if command == Command::Help {
        println!("{}", USAGE);
        return Ok(());
    }

    let config = Config::load().context("Failed to load configuration")?;
    let manager = SessionManager::new(&config)?;
    info!(?command, store = ?config.store, "sessionkeep starting");

    run(&manager, command).await
}

async fn run(manager: &SessionManager, command: Command) -> Result<()> {
    match command {
        Command::Login { username } => {
            let username = match username.or_else(|| std::env::var(ENV_USERNAME).ok()) {
                Some(username) => username,
                None => prompt("Username: ")?,
            };
            let password = read_password()?;
            report_submit(manager.login(&username, &password).await)?;
            after_login(manager);
        }
        Command::Register { username, email } => {
            let password = read_password()?;
            report_submit(manager.register(&username, &email, &password).await)?;
            println!("Registration successful!");
            after_login(manager);
        }
        Command::Logout => {
            manager.logout();
            println!("Logged out.");
        }
        Command::Status => match manager.display_name() {
            Some(name) if manager.is_logged_in() => {
                println!("Logged in as {}", name);
                if manager.store().is_degraded() {
                    println!("Warning: credential storage unavailable, session will not persist");
                }
            }
            _ => println!("Not logged in."),
        },
        Command::Probe => match manager.probe().await {
            Ok(message) => println!("{}", message),
            Err(ApiError::Unauthenticated) => {
                let logged_in = manager.is_logged_in();
                println!("{}", unauthenticated_notice(logged_in));
                if !logged_in {
                    open(manager, AFTER_LOGIN_ROUTE);
                }
            }
            Err(e) if e.is_network() => {
                bail!("Network error: check backend connection ({})", e)
            }
            Err(e) => bail!("{}", e),
        },
        Command::Open { route } => open(manager, &route),
        Command::Help => println!("{}", USAGE),
    }
    Ok(())
}

fn after_login(manager: &SessionManager) {
    let name = manager.display_name().unwrap_or_else(|| "User".to_string());
    println!("Login successful! Welcome {}", name);
    open(manager, AFTER_LOGIN_ROUTE);
}

fn open(manager: &SessionManager, route: &str) {
    match manager.check_route(route) {
        GuardDecision::Admit => println!("Opened {}", route),
        GuardDecision::Redirect { to } => println!("Redirected to {}", to),
    }
}

/// A 401 that survives a refresh leaves the session in place.
fn unauthenticated_notice(logged_in: bool) -> &'static str {
    if logged_in {
        "Request rejected even with a refreshed token. Session kept."
    } else {
        "Session expired. Please log in again."
    }
}

fn report_submit(result: Result<(), SubmitError>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(SubmitError::Invalid(errors)) => {
            for error in &errors {
                eprintln!("  {}: {}", error.field, error.message);
            }
            bail!("Please fix the fields above")
        }
        Err(e) => bail!("{}", e),
    }
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(ENV_PASSWORD) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse(&args(&[])).unwrap(), Command::Help);
        assert_eq!(
            Command::parse(&args(&["login"])).unwrap(),
            Command::Login { username: None }
        );
        assert_eq!(
            Command::parse(&args(&["login", "alice"])).unwrap(),
            Command::Login {
                username: Some("alice".into())
            }
        );
        assert_eq!(
            Command::parse(&args(&["register", "alice", "alice@example.com"])).unwrap(),
            Command::Register {
                username: "alice".into(),
                email: "alice@example.com".into()
            }
        );
        assert_eq!(
            Command::parse(&args(&["open", "/dashboard"])).unwrap(),
            Command::Open {
                route: "/dashboard".into()
            }
        );
        assert_eq!(Command::parse(&args(&["logout"])).unwrap(), Command::Logout);
    }

    #[test]
    fn test_parse_rejects_unknown() {
        assert!(Command::parse(&args(&["launch"])).is_err());
        assert!(Command::parse(&args(&["register", "alice"])).is_err());
    }

    #[test]
    fn test_unauthenticated_notice_depends_on_session() {
        assert_eq!(
            unauthenticated_notice(false),
            "Session expired. Please log in again."
        );
        assert!(!unauthenticated_notice(true).contains("expired"));
    }
}
