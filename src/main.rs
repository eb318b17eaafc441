use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;

use mailgraph::auth::listen_for_callback;
use mailgraph::{AuthStatus, Config, GraphClient, MailgraphError, TokenManager};

#[derive(Parser)]
#[command(
    name = "mailgraph",
    version,
    about = "An MCP server exposing Microsoft 365 mail, calendar, and contacts"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server on stdio
    Serve,

    /// Sign in interactively via the system browser
    Auth {
        /// Seconds to wait for the browser callback
        #[arg(long, env = "MAILGRAPH_AUTH_TIMEOUT_SECS", default_value_t = 300)]
        timeout: u64,

        /// Print the sign-in URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Show the current sign-in state
    Status,

    /// Forget the persisted credentials
    Reset,
}

#[tokio::main]
async fn main() {
    // stdout belongs to the MCP protocol; all diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{}: {e}", "Error".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), MailgraphError> {
    let config = Config::from_env()?;
    let tokens = Arc::new(TokenManager::new(&config));

    match cli.command {
        Commands::Serve => {
            let client = GraphClient::new(&config.graph_url, tokens);
            mailgraph::server::serve(client).await
        }
        Commands::Auth {
            timeout,
            no_browser,
        } => auth_command(&config, &tokens, Duration::from_secs(timeout), no_browser).await,
        Commands::Status => {
            print_status(&tokens.status().await);
            Ok(())
        }
        Commands::Reset => {
            tokens.clear().await?;
            println!("Credentials forgotten.");
            Ok(())
        }
    }
}

async fn auth_command(
    config: &Config,
    tokens: &Arc<TokenManager>,
    timeout: Duration,
    no_browser: bool,
) -> Result<(), MailgraphError> {
    let url = tokens.begin_interactive_authorization().await;
    println!("Visit this URL to sign in:\n\n  {url}\n");
    if !no_browser && webbrowser::open(&url).is_err() {
        tracing::warn!("Could not open a browser automatically; use the URL above");
    }

    let port = config.redirect_port()?;
    println!("Waiting for the sign-in callback on port {port}...");
    let callback = listen_for_callback(port, timeout).await?;

    // The state parameter correlates the callback with the attempt we
    // started; a mismatch means the code is not ours to redeem.
    if let Some(expected) = tokens.expected_state().await {
        if callback.state.as_deref() != Some(expected.as_str()) {
            return Err(MailgraphError::Protocol(
                "authorization callback state mismatch".into(),
            ));
        }
    }

    tokens.complete_interactive_authorization(&callback.code).await?;
    println!("{}", "Signed in.".green().bold());
    print_status(&tokens.status().await);
    Ok(())
}

fn print_status(status: &AuthStatus) {
    let label = match status {
        AuthStatus::Authenticated { .. } => "authenticated".green().bold(),
        AuthStatus::NeedsRefresh | AuthStatus::RefreshInFlight => "needs refresh".yellow().bold(),
        AuthStatus::AuthorizationPending => "authorization pending".yellow().bold(),
        AuthStatus::Unauthenticated => "not signed in".red().bold(),
    };
    println!("{label}: {}", status.describe());
}
