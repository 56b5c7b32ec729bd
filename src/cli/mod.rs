//! # Command Line Interface
//!
//! Operator commands against the configured secret store. Reads print
//! outcomes, bundles and previews; raw values are never printed unless a
//! freshly generated secret is explicitly revealed.

pub mod output;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::warn;

use crate::config::AppConfig;
use crate::errors::Error;
use crate::secrets::{
    DomainSecrets, ProviderKind, SecretBroker, SecretKind, SecretLookup, SecretMetadata,
    SecretValidator, SecretValue, SecretsError, PREVIEW_LEN,
};
use output::{print_json, print_presence, OutputFormat};

#[derive(Parser, Debug)]
#[command(name = "secret-broker")]
#[command(about = "Secret lifecycle broker tooling")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Provider override (cluster, kv-store, cloud-kms, composite, env, memory)
    #[arg(long, global = true)]
    pub provider: Option<ProviderKind>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t, global = true)]
    pub output: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Report store health
    Health,

    /// Read one secret and report how it was served (value is previewed only)
    Get { key: String },

    /// Assemble a typed configuration bundle
    Bundle {
        #[arg(value_enum)]
        kind: BundleKind,
    },

    /// Existence and preview for integration secrets
    Preview {
        #[arg(value_enum)]
        kind: IntegrationKind,

        #[arg(required = true)]
        services: Vec<String>,
    },

    /// Check whether keys exist
    Exists {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Store a secret. Reads the value from stdin when omitted.
    Set {
        key: String,
        value: Option<String>,

        /// Treat the value as a JSON object of fields
        #[arg(long)]
        json: bool,

        /// Skip value validation
        #[arg(long)]
        force: bool,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Delete a secret
    Delete { key: String },

    /// Replace a secret with freshly generated material
    Rotate { key: String },

    /// Generate and store a new secret
    Generate {
        key: String,

        /// password, key or token
        #[arg(long, default_value = "token")]
        kind: SecretKind,

        /// Print the full generated value instead of a preview
        #[arg(long)]
        reveal: bool,

        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Check a candidate value against the validation policy for a key
    Validate { key: String, value: Option<String> },

    /// Clear the cache and warm the critical secrets again
    Refresh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BundleKind {
    Database,
    Cache,
    Tls,
    Monitoring,
    Backup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum IntegrationKind {
    ApiKey,
    Webhook,
}

#[derive(clap::Args, Debug, Default)]
pub struct MetadataArgs {
    #[arg(long)]
    pub owner: Option<String>,

    #[arg(long)]
    pub rotation_policy: Option<String>,

    /// Free-form label, repeatable (`--label team=payments`)
    #[arg(long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,
}

impl MetadataArgs {
    fn into_metadata(self) -> Option<SecretMetadata> {
        if self.owner.is_none() && self.rotation_policy.is_none() && self.labels.is_empty() {
            return None;
        }
        let mut metadata = SecretMetadata::new();
        if let Some(owner) = self.owner {
            metadata = metadata.with_owner(owner);
        }
        if let Some(policy) = self.rotation_policy {
            metadata = metadata.with_rotation_policy(policy);
        }
        for (key, value) in self.labels {
            metadata = metadata.with_label(key, value);
        }
        Some(metadata)
    }
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[derive(Debug, Serialize)]
struct GetReport<'a> {
    key: &'a str,
    outcome: &'static str,
    exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    preview: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct MutationReport<'a> {
    key: &'a str,
    operation: &'static str,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<String>,
}

#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    key: &'a str,
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

/// Run one command against a broker built from `config`.
pub async fn run(cli: Cli, config: &AppConfig) -> anyhow::Result<()> {
    let format = cli.output;
    let command = match cli.command {
        Commands::Validate { key, value } => return validate_command(&key, value).await,
        command => command,
    };

    let backend = config.broker.backend_config()?;
    let broker = Arc::new(SecretBroker::from_backend(&backend, config.broker.broker_options()).await?);

    // health must answer even when the store cannot be connected
    if !matches!(command, Commands::Health) {
        broker.initialize().await.context("Failed to initialize secret broker")?;
    }

    let result = execute(command, &broker, config, format).await;

    if let Err(e) = broker.close().await {
        warn!(error = %e, "Failed to close secret broker");
    }
    result
}

async fn execute(
    command: Commands,
    broker: &Arc<SecretBroker>,
    config: &AppConfig,
    format: OutputFormat,
) -> anyhow::Result<()> {
    match command {
        Commands::Health => {
            let status = broker.health().await;
            print_json(&status)?;
            if !status.healthy {
                bail!("{} store is unhealthy", status.provider);
            }
        }
        Commands::Get { key } => {
            let lookup = broker.lookup(&key).await?;
            print_json(&get_report(&key, &lookup))?;
        }
        Commands::Bundle { kind } => {
            let domain = DomainSecrets::new(broker.clone(), config.broker.environment);
            match kind {
                BundleKind::Database => print_json(&domain.database_config().await?)?,
                BundleKind::Cache => print_json(&domain.cache_store_config().await?)?,
                BundleKind::Tls => print_json(&domain.tls_material().await?)?,
                BundleKind::Monitoring => print_json(&domain.monitoring_credentials().await?)?,
                BundleKind::Backup => print_json(&domain.backup_credentials().await?)?,
            }
        }
        Commands::Preview { kind, services } => {
            let domain = DomainSecrets::new(broker.clone(), config.broker.environment);
            let mut rows = Vec::with_capacity(services.len());
            for service in &services {
                rows.push(match kind {
                    IntegrationKind::ApiKey => domain.api_key_status(service).await?,
                    IntegrationKind::Webhook => domain.webhook_secret_status(service).await?,
                });
            }
            print_presence(&rows, format)?;
        }
        Commands::Exists { keys } => {
            let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
            let found = broker.secrets_exist(&refs).await?;
            let rows: Vec<_> = keys
                .iter()
                .map(|key| crate::secrets::SecretPresence {
                    key: key.clone(),
                    exists: found.get(key).copied().unwrap_or(false),
                    preview: None,
                })
                .collect();
            print_presence(&rows, format)?;
        }
        Commands::Set { key, value, json, force, metadata } => {
            let raw = read_value(value).await?;
            let value = parse_value(&raw, json)?;
            if !force {
                check_value(&key, &value)?;
            }
            broker.set_secret(&key, &value, metadata.into_metadata().as_ref()).await?;
            print_json(&MutationReport { key: &key, operation: "set", success: true, value: None })?;
        }
        Commands::Delete { key } => {
            broker.delete_secret(&key).await?;
            print_json(&MutationReport { key: &key, operation: "delete", success: true, value: None })?;
        }
        Commands::Rotate { key } => {
            broker.rotate_secret(&key).await?;
            print_json(&MutationReport { key: &key, operation: "rotate", success: true, value: None })?;
        }
        Commands::Generate { key, kind, reveal, metadata } => {
            let secret =
                broker.generate_secret(&key, kind, metadata.into_metadata().as_ref()).await?;
            let shown = if reveal {
                secret.expose_secret().to_string()
            } else {
                secret.preview(PREVIEW_LEN)
            };
            print_json(&MutationReport { key: &key, operation: "generate", success: true, value: Some(shown) })?;
        }
        Commands::Refresh => {
            let report = broker.refresh_secrets().await?;
            print_json(&report)?;
        }
        Commands::Validate { key, value } => validate_command(&key, value).await?,
    }
    Ok(())
}

fn get_report<'a>(key: &'a str, lookup: &'a SecretLookup) -> GetReport<'a> {
    GetReport {
        key,
        outcome: lookup.outcome(),
        exists: lookup.value().is_some(),
        preview: lookup
            .value()
            .and_then(SecretValue::primary_text)
            .map(|text| text.chars().take(PREVIEW_LEN).collect()),
        error: lookup.error(),
    }
}

async fn validate_command(key: &str, value: Option<String>) -> anyhow::Result<()> {
    let raw = read_value(value).await?;
    let rejection = SecretValidator::new().check(key, &raw).err();
    print_json(&ValidationReport { key, valid: rejection.is_none(), reason: rejection.map(|r| r.to_string()) })?;
    match rejection {
        Some(reason) => Err(Error::validation_field(reason.to_string(), key).into()),
        None => Ok(()),
    }
}

fn check_value(key: &str, value: &SecretValue) -> anyhow::Result<()> {
    if let Some(text) = value.primary_text() {
        SecretValidator::new()
            .check(key, &text)
            .map_err(|reason| Error::validation_field(format!("{key}: {reason}"), key))?;
    }
    Ok(())
}

fn parse_value(raw: &str, json: bool) -> anyhow::Result<SecretValue> {
    if !json {
        return Ok(SecretValue::text(raw));
    }
    match SecretValue::from_payload(raw) {
        fields @ SecretValue::Fields(_) => Ok(fields),
        SecretValue::Text(_) => Err(Error::validation("--json expects a JSON object").into()),
    }
}

async fn read_value(value: Option<String>) -> anyhow::Result<String> {
    if let Some(value) = value {
        return Ok(value);
    }
    let mut buffer = String::new();
    tokio::io::stdin()
        .read_to_string(&mut buffer)
        .await
        .context("Failed to read secret value from stdin")?;
    let trimmed = buffer.trim_end_matches(['\r', '\n']);
    if trimmed.is_empty() {
        bail!(Error::validation("no value given on the command line or stdin"));
    }
    Ok(trimmed.to_string())
}

/// Process exit code for a failed command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    let code = if let Some(e) = err.downcast_ref::<Error>() {
        e.exit_code()
    } else if let Some(e) = err.downcast_ref::<SecretsError>() {
        match e {
            SecretsError::NotFound { .. } => 3,
            SecretsError::InvalidKey { .. }
            | SecretsError::InvalidValue { .. }
            | SecretsError::ConfigError { .. } => 2,
            _ => 1,
        }
    } else {
        1
    };
    u8::try_from(code).unwrap_or(1)
}
