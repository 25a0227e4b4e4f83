// ABOUTME: PostgreSQL connection bootstrapping with TLS negotiation and retries
// ABOUTME: TLS policy (self-signed certificates) is decided once at startup

use crate::utils::{redact_url, retry_with_backoff, validate_postgres_url};
use anyhow::{Context, Result};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_postgres::config::SslMode;
use tokio_postgres::{Client, Config, NoTls};

static ALLOW_SELF_SIGNED: OnceLock<bool> = OnceLock::new();

/// Record whether invalid (self-signed) server certificates are accepted.
///
/// Only the first call has an effect.
pub fn init_tls_policy(allow_self_signed_certs: bool) {
    let _ = ALLOW_SELF_SIGNED.set(allow_self_signed_certs);
    if allow_self_signed_certs {
        tracing::warn!("TLS certificate verification is disabled for PostgreSQL connections");
    }
}

fn allow_self_signed() -> bool {
    ALLOW_SELF_SIGNED.get().copied().unwrap_or(false)
}

/// Connect once, honouring the URL's `sslmode`.
///
/// `prefer` (the default) tries TLS first and falls back to a plain connection.
pub async fn connect(url: &str) -> Result<Client> {
    validate_postgres_url(url)?;
    let config = url
        .parse::<Config>()
        .with_context(|| format!("Invalid PostgreSQL URL: {}", redact_url(url)))?;

    let client = match config.get_ssl_mode() {
        SslMode::Disable => connect_plain(&config).await?,
        SslMode::Prefer => match connect_tls(&config).await {
            Ok(client) => client,
            Err(e) => {
                tracing::debug!("TLS connection failed ({:#}), retrying without TLS", e);
                connect_plain(&config).await?
            }
        },
        _ => connect_tls(&config).await?,
    };

    tracing::debug!("Connected to PostgreSQL at {}", redact_url(url));
    Ok(client)
}

/// Connect with exponential backoff between attempts.
pub async fn connect_with_retry(url: &str, max_retries: u32, delay: Duration) -> Result<Client> {
    retry_with_backoff(|| connect(url), max_retries, delay)
        .await
        .with_context(|| {
            format!(
                "Failed to connect to PostgreSQL at {} after {} attempts",
                redact_url(url),
                max_retries + 1
            )
        })
}

async fn connect_tls(config: &Config) -> Result<Client> {
    let connector = TlsConnector::builder()
        .danger_accept_invalid_certs(allow_self_signed())
        .build()
        .context("Failed to build TLS connector")?;
    let (client, connection) = config
        .connect(MakeTlsConnector::new(connector))
        .await
        .context("Failed to connect to PostgreSQL over TLS")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });
    Ok(client)
}

async fn connect_plain(config: &Config) -> Result<Client> {
    let (client, connection) = config
        .connect(NoTls)
        .await
        .context("Failed to connect to PostgreSQL")?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            tracing::error!("PostgreSQL connection error: {}", e);
        }
    });
    Ok(client)
}
