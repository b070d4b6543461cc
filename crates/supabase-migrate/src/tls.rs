//! Connection strings, TLS and pool construction for both databases.
//!
//! Connection strings may carry an `sslmode` parameter (URL query or
//! `key=value` form). It is stripped here and mapped onto a rustls setup,
//! so the Postgres client only ever sees the remaining parameters.

use std::str::FromStr;
use std::sync::Arc;

use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use rustls::ClientConfig;
use tokio_postgres::Config as PgConfig;
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

use crate::error::{MigrateError, Result};

/// SSL verification modes for PostgreSQL connections.
///
/// These modes match PostgreSQL's standard `sslmode` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SslMode {
    /// No SSL/TLS (plain TCP connection).
    #[default]
    Disable,
    /// Use SSL but don't verify server certificate.
    Require,
    /// Verify server certificate against CA but not hostname.
    VerifyCa,
    /// Full certificate and hostname verification.
    VerifyFull,
}

impl SslMode {
    /// Parse an SSL mode from a string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "disable" | "" => Ok(SslMode::Disable),
            // rustls has no opportunistic mode; prefer behaves like require
            "prefer" | "require" => Ok(SslMode::Require),
            "verify-ca" => Ok(SslMode::VerifyCa),
            "verify-full" => Ok(SslMode::VerifyFull),
            other => Err(MigrateError::Config(format!(
                "Invalid sslmode '{}'. Valid values: disable, prefer, require, verify-ca, verify-full",
                other
            ))),
        }
    }

    /// Check if this mode requires TLS.
    pub fn requires_tls(&self) -> bool {
        !matches!(self, SslMode::Disable)
    }
}

/// Remove `sslmode` from a connection string and return it parsed.
pub fn split_ssl_mode(conn: &str) -> Result<(String, SslMode)> {
    let mut mode = SslMode::Disable;

    if conn.contains("://") {
        let (base, query) = match conn.split_once('?') {
            Some((base, query)) => (base, query),
            None => return Ok((conn.to_string(), mode)),
        };
        let mut kept = Vec::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some(("sslmode", value)) => mode = SslMode::parse(value)?,
                _ => kept.push(pair),
            }
        }
        let cleaned = if kept.is_empty() {
            base.to_string()
        } else {
            format!("{}?{}", base, kept.join("&"))
        };
        Ok((cleaned, mode))
    } else {
        let mut kept = Vec::new();
        for token in conn.split_whitespace() {
            match token.split_once('=') {
                Some(("sslmode", value)) => mode = SslMode::parse(value)?,
                _ => kept.push(token),
            }
        }
        Ok((kept.join(" "), mode))
    }
}

/// Builder for PostgreSQL TLS connections.
pub struct TlsBuilder {
    ssl_mode: SslMode,
}

impl TlsBuilder {
    /// Create a new TLS builder with the given SSL mode.
    pub fn new(ssl_mode: SslMode) -> Self {
        Self { ssl_mode }
    }

    /// Build a MakeRustlsConnect instance for use with deadpool-postgres.
    ///
    /// Returns None if TLS is disabled.
    pub fn build(&self) -> Result<Option<MakeRustlsConnect>> {
        if !self.ssl_mode.requires_tls() {
            return Ok(None);
        }

        let config = self.build_client_config()?;
        Ok(Some(MakeRustlsConnect::new(config)))
    }

    /// Build the underlying rustls ClientConfig.
    pub fn build_client_config(&self) -> Result<ClientConfig> {
        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

        let config = match self.ssl_mode {
            SslMode::Disable => {
                return Err(MigrateError::Config(
                    "Cannot build TLS config for sslmode=disable".into(),
                ));
            }
            SslMode::Require => {
                warn!(
                    "sslmode=require enables TLS but does NOT verify the server certificate. \
                     Use sslmode=verify-full where the server presents a publicly trusted certificate."
                );
                ClientConfig::builder()
                    .dangerous()
                    .with_custom_certificate_verifier(Arc::new(NoVerifier))
                    .with_no_client_auth()
            }
            SslMode::VerifyCa | SslMode::VerifyFull => {
                info!("sslmode={:?}: certificate and hostname verification enabled", self.ssl_mode);
                ClientConfig::builder()
                    .with_root_certificates(root_store)
                    .with_no_client_auth()
            }
        };

        Ok(config)
    }
}

/// Build a single-connection pool and check it with `SELECT 1`.
///
/// `label` names the side ("source" / "target") in errors and logs; the
/// connection string itself never appears in either.
pub async fn connect_pool(conn: &str, label: &str) -> Result<Pool> {
    let (cleaned, ssl_mode) = split_ssl_mode(conn)?;
    let pg_config = PgConfig::from_str(&cleaned).map_err(|e| {
        MigrateError::Config(format!("invalid {} connection string: {}", label, e))
    })?;

    let mgr_config = ManagerConfig {
        recycling_method: RecyclingMethod::Fast,
    };

    let context = format!("creating {} pool", label);
    let pool = match TlsBuilder::new(ssl_mode).build()? {
        Some(tls) => {
            let mgr = Manager::from_config(pg_config.clone(), tls, mgr_config);
            Pool::builder(mgr)
                .max_size(1)
                .build()
                .map_err(|e| MigrateError::pool(e, context))?
        }
        None => {
            warn!("{} connection is not using TLS", label);
            let mgr = Manager::from_config(pg_config.clone(), tokio_postgres::NoTls, mgr_config);
            Pool::builder(mgr)
                .max_size(1)
                .build()
                .map_err(|e| MigrateError::pool(e, context))?
        }
    };

    let client = pool
        .get()
        .await
        .map_err(|e| MigrateError::pool(e, format!("connecting to {} database", label)))?;
    client
        .simple_query("SELECT 1")
        .await
        .map_err(|e| MigrateError::pool(e, format!("testing {} connection", label)))?;

    info!(
        "Connected to {} database: {}/{}",
        label,
        describe_hosts(&pg_config),
        pg_config.get_dbname().unwrap_or("postgres")
    );

    Ok(pool)
}

fn describe_hosts(config: &PgConfig) -> String {
    config
        .get_hosts()
        .iter()
        .map(|h| match h {
            tokio_postgres::config::Host::Tcp(name) => name.clone(),
            #[cfg(unix)]
            tokio_postgres::config::Host::Unix(path) => path.display().to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

/// Custom certificate verifier that accepts any certificate.
///
/// **SECURITY WARNING**: This bypasses all certificate validation.
/// Only used for `sslmode=require`.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
