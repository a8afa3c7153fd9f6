//! socialgate - terminal front-end for the social app's session layer.
//!
//! Logs in, keeps the session in the OS keychain (or a cache file), and
//! makes authenticated API calls that refresh expired tokens on their own.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use socialgate_core::{AuthContext, CallOutcome, Config, Navigator};

const USAGE: &str = "\
Usage: socialgate <command>

Commands:
  login [email]   Log in and remember the session
  logout          Forget the stored session
  whoami          Show the logged-in user
  get <path>      GET an API path with the current session and print the JSON";

fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

/// There is no login screen in a terminal; point the user at the command.
struct ConsoleNavigator;

#[async_trait]
impl Navigator for ConsoleNavigator {
    async fn go_to_login(&self) {
        eprintln!("Session expired. Please log in again.");
        eprintln!("Run `socialgate login` to continue.");
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    };

    let mut config = Config::load()?;
    debug!(base_url = %config.base_url, backend = ?config.credential_backend, "Config loaded");
    let ctx = AuthContext::from_config(&config).await?;

    match command.as_str() {
        "login" => login(&ctx, &mut config, args.get(1).cloned()).await?,
        "logout" => {
            ctx.auth.logout().await;
            println!("Logged out.");
        }
        "whoami" => whoami(&ctx),
        "get" => {
            let path = args.get(1).context("get needs an API path, e.g. /api/user/posts")?;
            return get(&ctx, path).await;
        }
        "-h" | "--help" | "help" => println!("{}", USAGE),
        other => bail!("Unknown command '{}'\n\n{}", other, USAGE),
    }
    Ok(ExitCode::SUCCESS)
}

async fn login(ctx: &AuthContext, config: &mut Config, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", email))
        .context("Failed to read password")?;

    match ctx.auth.login(&email, &password).await {
        Ok(session) => {
            let name = session.user.as_ref().map(|u| u.name.as_str()).unwrap_or_default();
            println!("Logged in as {}.", name);
            config.last_email = Some(email);
            config.save()?;
            info!("Login complete");
            Ok(())
        }
        Err(e) => bail!(e.user_message()),
    }
}

fn whoami(ctx: &AuthContext) {
    match ctx.session.current().and_then(|s| s.user.clone()) {
        Some(user) => println!("{} <{}> (id {})", user.name, user.email, user.id),
        None => println!("Not logged in."),
    }
}

/// Exit status when the session could not be recovered and the user must log in.
const EXIT_SESSION_EXPIRED: u8 = 2;

async fn get(ctx: &AuthContext, path: &str) -> Result<ExitCode> {
    let wrapper = ctx.call_wrapper(Arc::new(ConsoleNavigator));
    let outcome = wrapper
        .execute(|| ctx.client.get_json::<Value>(path))
        .await;

    let status = report(outcome)?;
    Ok(ExitCode::from(status))
}

/// Print a call result and pick the process exit status.
fn report(outcome: CallOutcome<Value>) -> Result<u8> {
    match outcome {
        CallOutcome::Ok(body) => {
            println!("{}", serde_json::to_string_pretty(&body)?);
            Ok(0)
        }
        // The navigator already told the user what to do
        CallOutcome::Unauthorized => Ok(EXIT_SESSION_EXPIRED),
        other => {
            let message = other
                .user_message()
                .unwrap_or_else(|| "Request was not sent.".to_string());
            bail!(message)
        }
    }
}

/// Ask for an email, offering the remembered one as the default.
fn prompt_email(remembered: Option<&str>) -> Result<String> {
    match remembered {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;

    match (line.trim(), remembered) {
        ("", Some(last)) => Ok(last.to_string()),
        ("", None) => bail!("No email entered"),
        (entered, _) => Ok(entered.to_string()),
    }
}
