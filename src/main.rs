//! Profile Maintainer command line
//!
//! Composition root: loads configuration, wires the SQLite stores, secret
//! vault, site driver and notifier into a `MaintenanceController`, and then
//! either serves the REST control surface or runs a one-off command.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{info, warn};

use profile_maintainer_lib::api::{ApiState, build_router};
use profile_maintainer_lib::application::BatchSummary;
use profile_maintainer_lib::domain::{
    AccountRepository, NewAccount, Notifier, OutcomeKind, OutcomeQuery, OutcomeRepository,
    SecretVault,
};
use profile_maintainer_lib::infrastructure::{
    AppConfig, ChaChaSecretVault, ConfigManager, DatabaseConnection, HttpSiteDriver, LogNotifier,
    NotificationChannel, SqliteAccountRepository, SqliteOutcomeRepository, WebhookNotifier,
    init_logging_with_config, log_system_info,
};
use profile_maintainer_lib::{MaintenanceController, MaintenanceServices};

const DEFAULT_PASSWORD_ENV: &str = "PROFILE_MAINTAINER_PASSWORD";

#[derive(Debug, Parser)]
#[command(
    name = "profile-maintainer",
    version,
    about = "Weekly therapist-profile maintenance runner"
)]
struct Cli {
    /// Configuration file (JSON, TOML or YAML by extension)
    #[arg(long, global = true, env = "PROFILE_MAINTAINER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the REST control surface until ctrl-c
    Serve,
    /// Run one maintenance batch in the foreground and print its summary
    RunOnce,
    /// Manage maintained accounts
    #[command(subcommand)]
    Accounts(AccountsCommand),
    /// Show recent outcome records
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: u32,
        /// Only records for this account id
        #[arg(long)]
        account: Option<i64>,
        /// Success, Failure, NoChange or Warning
        #[arg(long)]
        outcome: Option<OutcomeKind>,
    },
    /// Print a fresh base64 key for `security.secret_key`
    GenKey,
    /// Write a default configuration file if none exists
    InitConfig {
        /// Target path; defaults to the per-user config location
        path: Option<PathBuf>,
    },
}

#[derive(Debug, Subcommand)]
enum AccountsCommand {
    /// Add an account; the password is read from an env var or stdin
    Add {
        #[arg(long)]
        login: String,
        #[arg(long, default_value = DEFAULT_PASSWORD_ENV)]
        password_env: String,
        #[arg(long)]
        notes: Option<String>,
        /// Store the account without enrolling it in maintenance
        #[arg(long)]
        inactive: bool,
    },
    /// Replace the stored password of an account
    SetPassword {
        id: i64,
        #[arg(long, default_value = DEFAULT_PASSWORD_ENV)]
        password_env: String,
    },
    List,
    Activate { id: i64 },
    Deactivate { id: i64 },
    /// Delete an account that has no outcome history yet
    Remove { id: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::GenKey => {
            println!("{}", ChaChaSecretVault::generate_key());
            Ok(())
        }
        Command::InitConfig { path } => init_config(path),
        command => run(cli.config, command).await,
    }
}

fn init_config(path: Option<PathBuf>) -> Result<()> {
    let path = path
        .or_else(ConfigManager::default_config_path)
        .ok_or_else(|| anyhow!("No configuration directory available on this system"))?;
    if ConfigManager::write_default(&path)? {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists, left unchanged", path.display());
    }
    Ok(())
}

async fn run(config_path: Option<PathBuf>, command: Command) -> Result<()> {
    let config = ConfigManager::new(config_path)
        .load()
        .context("Failed to load configuration")?;
    init_logging_with_config(&config.logging)?;

    let db = DatabaseConnection::with_max_connections(
        &config.database.url,
        config.database.max_connections,
    )
    .await?;
    db.migrate().await?;

    match command {
        Command::Serve => serve(&config, &db).await,
        Command::RunOnce => run_once(&config, &db).await,
        Command::Accounts(command) => accounts(&config, &db, command).await,
        Command::Logs {
            limit,
            account,
            outcome,
        } => logs(&db, limit, account, outcome).await,
        Command::GenKey | Command::InitConfig { .. } => Ok(()),
    }
}

fn build_vault(config: &AppConfig) -> Result<Arc<ChaChaSecretVault>> {
    let key = config.security.secret_key.as_deref().ok_or_else(|| {
        anyhow!("security.secret_key is not configured; create one with `profile-maintainer gen-key`")
    })?;
    Ok(Arc::new(ChaChaSecretVault::from_base64_key(key)?))
}

fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let notifications = &config.notifications;
    match notifications.channel {
        NotificationChannel::Log => Ok(Arc::new(LogNotifier)),
        NotificationChannel::Webhook => {
            let url = notifications
                .webhook_url
                .as_deref()
                .ok_or_else(|| anyhow!("notifications.webhook_url is required"))?;
            Ok(Arc::new(WebhookNotifier::new(
                url,
                notifications.sender_name.clone(),
                Duration::from_secs(notifications.timeout_secs),
            )?))
        }
    }
}

fn build_controller(config: &AppConfig, db: &DatabaseConnection) -> Result<MaintenanceController> {
    let driver = HttpSiteDriver::new(
        &config.site_driver.endpoint,
        Duration::from_secs(config.site_driver.request_timeout_secs),
    )?;
    let services = MaintenanceServices {
        accounts: Arc::new(SqliteAccountRepository::new(db.pool().clone())),
        outcomes: Arc::new(SqliteOutcomeRepository::new(db.pool().clone())),
        driver: Arc::new(driver),
        notifier: build_notifier(config)?,
        vault: build_vault(config)?,
    };
    Ok(MaintenanceController::new(services, config.maintenance_settings()?))
}

async fn serve(config: &AppConfig, db: &DatabaseConnection) -> Result<()> {
    log_system_info();
    let controller = build_controller(config, db)?;
    info!("📅 Schedule: {}", controller.settings().schedule);

    if config.maintenance.autostart {
        controller.start_schedule();
    }
    if config.server.api_token.is_none() {
        warn!("⚠️ server.api_token is not set, the control surface is unauthenticated");
    }

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_address))?;
    info!("🌐 Control surface listening on {}", listener.local_addr()?);

    let router = build_router(ApiState::new(
        controller.clone(),
        config.server.api_token.clone(),
    ));
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    controller.stop();
    info!("👋 Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("⚠️ Could not listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown requested");
}

async fn run_once(config: &AppConfig, db: &DatabaseConnection) -> Result<()> {
    let controller = build_controller(config, db)?;
    let batch = controller.run_batch();
    tokio::pin!(batch);

    let finished: Option<BatchSummary> = tokio::select! {
        result = &mut batch => Some(result?),
        _ = tokio::signal::ctrl_c() => None,
    };
    let summary = match finished {
        Some(summary) => summary,
        None => {
            controller.stop();
            batch.await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn read_password(env_var: &str) -> Result<String> {
    if let Ok(password) = std::env::var(env_var) {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    eprintln!("{env_var} is not set, reading the password from stdin");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Failed to read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        bail!("An empty password cannot be stored");
    }
    Ok(password)
}

async fn accounts(config: &AppConfig, db: &DatabaseConnection, command: AccountsCommand) -> Result<()> {
    let repo = SqliteAccountRepository::new(db.pool().clone());

    match command {
        AccountsCommand::Add {
            login,
            password_env,
            notes,
            inactive,
        } => {
            let vault = build_vault(config)?;
            let sealed = vault.seal(&read_password(&password_env)?)?;
            let account = repo
                .create(NewAccount {
                    login,
                    encrypted_secret: sealed,
                    is_active: !inactive,
                    notes,
                })
                .await
                .context("Failed to create account")?;
            println!("Added account {} ({})", account.id, account.login);
        }
        AccountsCommand::SetPassword { id, password_env } => {
            let vault = build_vault(config)?;
            let sealed = vault.seal(&read_password(&password_env)?)?;
            report(repo.update_secret(id, &sealed).await?, id, "password updated")?;
        }
        AccountsCommand::List => {
            for account in repo.list_all().await? {
                println!(
                    "{:>4}  {:<24} {:<8} {:<10} last run: {}  next run: {}",
                    account.id,
                    account.login,
                    if account.is_active { "active" } else { "inactive" },
                    account.status,
                    account
                        .last_run_at
                        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
                    account
                        .next_run_at
                        .map_or_else(|| "-".to_string(), |t| t.to_rfc3339()),
                );
            }
        }
        AccountsCommand::Activate { id } => {
            report(repo.set_active(id, true).await?, id, "activated")?;
        }
        AccountsCommand::Deactivate { id } => {
            report(repo.set_active(id, false).await?, id, "deactivated")?;
        }
        AccountsCommand::Remove { id } => {
            report(repo.delete(id).await?, id, "removed")?;
        }
    }
    Ok(())
}

fn report(found: bool, id: i64, what: &str) -> Result<()> {
    if !found {
        bail!("No account with id {id}");
    }
    println!("Account {id} {what}");
    Ok(())
}

async fn logs(
    db: &DatabaseConnection,
    limit: u32,
    account: Option<i64>,
    outcome: Option<OutcomeKind>,
) -> Result<()> {
    let repo = SqliteOutcomeRepository::new(db.pool().clone());
    let records = repo
        .query(&OutcomeQuery {
            account_id: account,
            kind: outcome,
            limit: Some(limit),
            ..OutcomeQuery::default()
        })
        .await?;

    for record in records {
        println!(
            "{}  {:<8} {:<8} {:>7}ms  {}",
            record.executed_at.to_rfc3339(),
            record.kind.level(),
            record.account_login.as_deref().unwrap_or("?"),
            record.duration_ms,
            record.detail
        );
    }
    Ok(())
}
