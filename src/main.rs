use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

use ads_refresh_token::prompt::{LinePrompter, TerminalPrompter};
use ads_refresh_token::{InstalledAppFlow, Outcome, RunError, run};
use clap::Parser;
use tracing_subscriber::EnvFilter;

/// Google Ads Refresh Token Helper - Runs the OAuth 2.0 installed application
/// flow and prints (optionally saves) the resulting refresh token
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Env file the refresh token is saved to when confirmed
    #[arg(long, env = "ADS_TOKEN_ENV_FILE", default_value = ".env")]
    env_file: PathBuf,

    /// Only print the authorization URL instead of opening a browser
    #[arg(long)]
    no_browser: bool,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Ctrl-C anywhere in the run (including while waiting on the browser) is a
/// clean cancellation.
///
/// The signal is registered before returning so an interrupt that lands
/// before the task is first polled is not lost.
fn spawn_interrupt_handler() -> io::Result<()> {
    #[cfg(unix)]
    let mut interrupt =
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())?;
    #[cfg(windows)]
    let mut interrupt = tokio::signal::windows::ctrl_c()?;

    tokio::spawn(async move {
        if interrupt.recv().await.is_some() {
            println!("\n\nOperation cancelled by user.");
            std::process::exit(0);
        }
    });
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    if let Err(e) = spawn_interrupt_handler() {
        tracing::warn!(error = %e, "could not listen for Ctrl-C");
    }

    let source = InstalledAppFlow::from_env(!args.no_browser);
    let mut stdout = io::stdout();

    let result = if io::stdin().is_terminal() && io::stderr().is_terminal() {
        run(&mut TerminalPrompter, &source, &args.env_file, &mut stdout).await
    } else {
        let mut prompter = LinePrompter::new(io::stdin().lock(), io::stderr());
        run(&mut prompter, &source, &args.env_file, &mut stdout).await
    };

    match result {
        Ok(Outcome::Cancelled) => {
            println!("\n\nOperation cancelled by user.");
            ExitCode::SUCCESS
        }
        Ok(Outcome::NoRefreshToken) => {
            tracing::warn!("authorization finished without a refresh token");
            ExitCode::SUCCESS
        }
        Ok(outcome) => {
            tracing::debug!(?outcome, "finished");
            ExitCode::SUCCESS
        }
        Err(e @ RunError::Auth(_)) => {
            eprintln!("ERROR: {}", e);
            eprintln!();
            eprintln!("Possible causes:");
            eprintln!("  - Invalid credentials");
            eprintln!("  - Google Ads API not enabled for the project");
            eprintln!("  - Connection problems");
            ExitCode::FAILURE
        }
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}
