//! # Command Line Interface
//!
//! Operator commands for the credential vault. Every command runs through
//! the Access Gate with the trusted context built from configuration, so
//! the same checks and audit events apply as for the service itself.

pub mod output;

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use crate::config::{load_config, AppConfig};
use crate::domain::{Capability, ConsentActor, OwnerId, ServiceName};
use crate::gate::CredentialGate;
use crate::observability::{init_observability, log_config_info};
use crate::resolver::Resolution;
use crate::startup::Services;
use crate::storage::{
    create_pool, get_migration_version, list_applied_migrations, run_migrations,
    validate_migrations,
};
use output::{print_credentials, print_json, print_migrations, OutputFormat};

#[derive(Parser)]
#[command(name = "credvault")]
#[command(about = "Credential vault and provider resolution tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file (defaults to ./credvault.{toml,yaml} if present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table, global = true)]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply pending migrations and report schema status
    Migrate {
        /// Only report status, apply nothing
        #[arg(long)]
        status: bool,
    },
    /// Team-fallback consent
    Consent {
        #[command(subcommand)]
        command: ConsentCommands,
    },
    /// Per-owner provider credentials
    Keys {
        #[command(subcommand)]
        command: KeyCommands,
    },
    /// Per-owner gateway config
    Gateway {
        #[command(subcommand)]
        command: GatewayCommands,
    },
    /// Run the precedence policy for an owner and service
    Resolve {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        service: ServiceName,
        #[arg(long)]
        model_family: Option<String>,
    },
    /// Finish interrupted deletes and clean orphaned vault entries
    Reconcile,
    /// Audit log tools
    Audit {
        #[command(subcommand)]
        command: AuditCommands,
    },
}

#[derive(Subcommand)]
pub enum ConsentCommands {
    Get {
        #[arg(long)]
        owner: String,
    },
    /// Record a decision on the owner's explicit instruction
    Set {
        #[arg(long)]
        owner: String,
        #[arg(long, action = clap::ArgAction::Set)]
        allow: bool,
    },
}

#[derive(Subcommand)]
pub enum KeyCommands {
    /// List credential metadata (never secrets)
    List {
        #[arg(long)]
        owner: String,
    },
    Remove {
        #[arg(long)]
        owner: String,
        #[arg(long)]
        service: ServiceName,
    },
}

#[derive(Subcommand)]
pub enum GatewayCommands {
    Remove {
        #[arg(long)]
        owner: String,
    },
}

#[derive(Subcommand)]
pub enum AuditCommands {
    /// Verify the audit log hash chain
    Verify,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }
    let metrics = init_observability(&config.observability)?;
    log_config_info(&config);

    match cli.command {
        Commands::Migrate { status } => handle_migrate(&config, status).await,
        command => {
            let services = Services::bootstrap(&config, metrics).await?;
            let result = handle_command(command, &services, cli.format).await;
            services.close().await;
            result
        }
    }
}

async fn handle_migrate(config: &AppConfig, status_only: bool) -> anyhow::Result<()> {
    let mut database = config.database.clone();
    database.auto_migrate = false;
    let pool = create_pool(&database).await?;

    if !status_only {
        println!("Running database migrations...");
        run_migrations(&pool).await?;
    }

    if validate_migrations(&pool).await? {
        println!("Database schema is up to date (version {})", get_migration_version(&pool).await?);
    } else {
        println!("Database schema has pending or modified migrations");
        std::process::exit(1);
    }
    print_migrations(&list_applied_migrations(&pool).await?);
    Ok(())
}

async fn handle_command(
    command: Commands,
    services: &Services,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let ctx = services.trusted_context();
    let gate = services.gate.as_ref();

    match command {
        Commands::Migrate { .. } => bail!("migrate runs without bootstrapped services"),
        Commands::Consent { command: ConsentCommands::Get { owner } } => {
            let flag = gate.get_consent(ctx, &parse_owner(&owner)?).await?;
            match format {
                OutputFormat::Json => print_json(&flag)?,
                OutputFormat::Table => println!(
                    "allow_team_fallback={} version={} updated_by={} updated_at={}",
                    flag.allow_team_fallback,
                    flag.version,
                    flag.updated_by.as_str(),
                    flag.updated_at.to_rfc3339()
                ),
            }
        }
        Commands::Consent { command: ConsentCommands::Set { owner, allow } } => {
            let flag =
                gate.set_consent(ctx, &parse_owner(&owner)?, allow, ConsentActor::Operator).await?;
            println!("Consent recorded (version {})", flag.version);
        }
        Commands::Keys { command: KeyCommands::List { owner } } => {
            let credentials = gate.list_credentials(ctx, &parse_owner(&owner)?).await?;
            print_credentials(&credentials, format)?;
        }
        Commands::Keys { command: KeyCommands::Remove { owner, service } } => {
            gate.delete_credential(ctx, &parse_owner(&owner)?, service).await?;
            println!("Key removed");
        }
        Commands::Gateway { command: GatewayCommands::Remove { owner } } => {
            gate.delete_gateway_config(ctx, &parse_owner(&owner)?).await?;
            println!("Gateway config removed");
        }
        Commands::Resolve { owner, service, model_family } => {
            let mut capability = Capability::new(service);
            if let Some(family) = model_family {
                capability = capability.with_model_family(family);
            }
            let resolution =
                services.resolver.resolve(ctx, &parse_owner(&owner)?, &capability).await?;
            print_resolution(&resolution, format)?;
        }
        Commands::Reconcile => {
            let report = gate.reconcile_pending_deletes(ctx).await?;
            match format {
                OutputFormat::Json => print_json(&report)?,
                OutputFormat::Table => println!(
                    "credentials removed: {}\ngateways removed: {}\norphans cleared: {}\nfailures: {}",
                    report.credentials_removed,
                    report.gateways_removed,
                    report.orphans_cleared,
                    report.failures
                ),
            }
            if !report.is_clean() {
                std::process::exit(2);
            }
        }
        Commands::Audit { command: AuditCommands::Verify } => {
            let verification = services.audit_log.verify_chain().await?;
            match verification.broken_at {
                None => println!("Audit chain intact ({} entries)", verification.entries),
                Some(sequence) => {
                    println!("Audit chain broken at sequence {}", sequence);
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn parse_owner(raw: &str) -> anyhow::Result<OwnerId> {
    match OwnerId::parse(raw) {
        Ok(owner) => Ok(owner),
        Err(e) => bail!("Invalid owner '{}': {}", raw, e),
    }
}

fn print_resolution(resolution: &Resolution, format: OutputFormat) -> anyhow::Result<()> {
    let view = match resolution {
        Resolution::Resolved(credential) => serde_json::json!({
            "outcome": "resolved",
            "tier": credential.tier,
            "service": credential.service,
            "endpoint": credential.endpoint,
        }),
        Resolution::Denied(reason) => serde_json::json!({
            "outcome": "denied",
            "reason": reason,
        }),
    };

    match format {
        OutputFormat::Json => print_json(&view),
        OutputFormat::Table => {
            match resolution {
                Resolution::Resolved(credential) => println!(
                    "Resolved via {} ({}) -> {}",
                    credential.tier, credential.service, credential.endpoint
                ),
                Resolution::Denied(reason) => {
                    println!("Denied: {} ({})", reason, resolution.user_message())
                }
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "credvault", "resolve", "--owner", "u1", "--service", "anthropic", "--format", "json",
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Resolve { owner, service, .. } => {
                assert_eq!(owner, "u1");
                assert_eq!(service, ServiceName::Anthropic);
            }
            _ => panic!("expected resolve"),
        }
    }

    #[test]
    fn test_parse_consent_set() {
        let cli = Cli::try_parse_from(["credvault", "consent", "set", "--owner", "u1", "--allow", "false"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Consent { command: ConsentCommands::Set { allow: false, .. } }
        ));
    }

    #[test]
    fn test_parse_owner_rejects_whitespace() {
        assert!(parse_owner("bad owner").is_err());
    }
}
