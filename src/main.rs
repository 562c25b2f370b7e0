//! servex-auth -- OAuth session tool for the ServeX admin console.
//!
//! This is the application entry point. It wires together all modules:
//!   - Configuration loading
//!   - Session store selection (file, keyring, memory)
//!   - Session manager + token endpoint client
//!   - Loopback callback listener for the authorization-code redirect
//!   - Graceful shutdown on SIGTERM / SIGINT

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::EnvFilter;

use servex_auth::callback;
use servex_auth::config::Config;
use servex_auth::session::SessionManager;
use servex_auth::store;

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Login { path: String },
    Status,
    Token,
    Logout,
}

struct CliArgs {
    config_path: PathBuf,
    command: Command,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("servex-auth.toml");
    let mut command: Option<String> = None;
    let mut login_path = String::from("/");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--path" => {
                if let Some(path) = args.next() {
                    login_path = path;
                } else {
                    eprintln!("Error: --path requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("servex-auth {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "login" | "status" | "token" | "logout" => {
                command = Some(arg.clone());
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    let command = match command.as_deref() {
        Some("login") => Command::Login { path: login_path },
        Some("status") => Command::Status,
        Some("token") => Command::Token,
        Some("logout") => Command::Logout,
        _ => {
            eprintln!("Error: no command given");
            eprintln!("Run with --help for usage information.");
            std::process::exit(1);
        }
    };

    CliArgs {
        config_path,
        command,
    }
}

fn print_usage() {
    println!(
        "\
servex-auth {version} -- OAuth session tool for the ServeX admin console

USAGE:
    servex-auth [OPTIONS] <COMMAND>

COMMANDS:
    login      Sign in through the browser and wait for the provider callback
    status     Show the current session
    token      Print a valid access token, refreshing it first if needed
    logout     End the local session and print the provider sign-out URL

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: servex-auth.toml]
        --path <PATH>      Application path to return to after sign-in [default: /]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    SERVEX_CONFIG          Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .thread_stack_size(10 * 1024 * 1024) // 10 MiB per worker thread
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime")
        .block_on(async_main())
}

async fn async_main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments
    let cli = parse_args();

    // Allow SERVEX_CONFIG env var as alternative to --config flag
    let config_path = std::env::var("SERVEX_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting servex-auth"
    );

    // 4. Build the session store
    let store = store::from_config(&config.storage);

    // 5. Create the session manager
    let session = Arc::new(SessionManager::from_config(config.oauth.clone(), store)?);

    // 6. Restore any persisted session from the store
    session.restore().await?;

    // 7. Dispatch the command
    match cli.command {
        Command::Login { path } => run_login(session, &config, &path).await,
        Command::Status => {
            run_status(&session, &config).await;
            Ok(())
        }
        Command::Token => run_token(&session).await,
        Command::Logout => run_logout(&session).await,
    }
}

// ---------------------------------------------------------------------------
// login command
// ---------------------------------------------------------------------------

/// Run the interactive sign-in: print the authorization URL, serve the
/// redirect endpoint on the loopback address the provider is configured to
/// call back, and complete the code exchange.
async fn run_login(
    session: Arc<SessionManager>,
    config: &Config,
    path: &str,
) -> anyhow::Result<()> {
    if session.is_authenticated() {
        println!("Already signed in; run `servex-auth logout` first to switch accounts.");
        return Ok(());
    }

    let url = session.login(path)?;
    let (addr, callback_path) = config.oauth.redirect_addr()?;

    let (done_tx, mut done_rx) = tokio::sync::mpsc::channel(1);
    let app = callback::router(&callback_path, session.clone(), done_tx);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(addr = %addr, path = %callback_path, "Callback listener bound");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
    });

    println!();
    println!("  Open this URL in your browser to sign in:");
    println!();
    println!("  {url}");
    println!();
    println!("  Waiting for the callback on http://{addr}{callback_path} ...");
    println!();

    let outcome = tokio::select! {
        received = done_rx.recv() => match received {
            Some(result) => result,
            None => anyhow::bail!("Callback listener closed unexpectedly"),
        },
        () = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            let _ = server.await;
            anyhow::bail!("Sign-in cancelled");
        }
    };

    // Give the result page a moment to reach the browser before the
    // listener goes away.
    tokio::time::sleep(Duration::from_millis(100)).await;
    let _ = shutdown_tx.send(());
    let _ = server.await;

    outcome?;

    let name = session
        .current_user()
        .and_then(|user| user.display_name().map(str::to_owned));
    match name {
        Some(name) => println!("Signed in as {name}"),
        None => println!("Signed in"),
    }
    println!("Return path: {}", session.consume_redirect_path());
    Ok(())
}

// ---------------------------------------------------------------------------
// status / token / logout commands
// ---------------------------------------------------------------------------

async fn run_status(session: &SessionManager, config: &Config) {
    let status = session.status().await;

    if status.authenticated {
        println!("Session: authenticated");
        if let Some(user) = &status.user {
            if let Some(name) = user.display_name() {
                println!("User: {name}");
            }
            if let Some(email) = &user.email {
                println!("Email: {email}");
            }
        }
        match status.expires_in_secs {
            Some(secs) if !status.expired => println!("Access token expires in {secs}s"),
            _ => println!("Access token has expired"),
        }
        if status.needs_refresh && !status.expired {
            println!("Access token is due for refresh");
        }
        if let Some(secs) = status.refresh_expires_in_secs {
            println!("Refresh token expires in {secs}s");
        }
    } else {
        println!("Session: signed out");
    }

    let overrides = config.env_overrides.all();
    if !overrides.is_empty() {
        let mut entries: Vec<_> = overrides.iter().collect();
        entries.sort();
        println!();
        println!("Settings overridden from the environment:");
        for (setting, var) in entries {
            println!("  {setting} (from {var})");
        }
    }
}

async fn run_token(session: &SessionManager) -> anyhow::Result<()> {
    match session.valid_access_token().await {
        Some(token) => {
            println!("{token}");
            Ok(())
        }
        None => anyhow::bail!("No valid session; run `servex-auth login` first"),
    }
}

async fn run_logout(session: &SessionManager) -> anyhow::Result<()> {
    let url = session.logout().await?;
    println!("Signed out locally.");
    println!("To end the provider session as well, open:");
    println!("  {url}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        // Set our own crate to the configured level, dependencies to warn
        EnvFilter::new(format!("servex_auth={level},tower_http={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_print_usage_does_not_panic() {
        // Just verify it doesn't panic.
        print_usage();
    }
}
