//! TLS-Setup der Control-Ebene
//!
//! Laedt Zertifikat und Schluessel von der Platte oder generiert ein
//! selbstsigniertes ECDSA-P-256-Paar (1 Jahr gueltig, SANs fuer
//! localhost, 127.0.0.1 und ::1) und legt es im Datenverzeichnis ab.
//! Das Protokoll-Minimum ist TLS 1.3.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rcgen::{CertificateParams, DistinguishedName, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::ServerConfig;
use rustls_pemfile::{certs, private_key};
use tokio_rustls::TlsAcceptor;

/// TLS-Quellen aus der Server-Konfiguration
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Pfad zum Zertifikat (leer = Datenverzeichnis)
    pub cert_file: Option<PathBuf>,
    /// Pfad zum privaten Schluessel (leer = Datenverzeichnis)
    pub key_file: Option<PathBuf>,
    /// Verzeichnis fuer generierte Dateien
    pub data_dir: PathBuf,
}

/// Erstellt den `TlsAcceptor`: vorhandenes Paar laden, sonst generieren.
pub fn acceptor_erstellen(config: &TlsConfig) -> Result<TlsAcceptor> {
    let cert_path = config
        .cert_file
        .clone()
        .unwrap_or_else(|| config.data_dir.join("server.crt"));
    let key_path = config
        .key_file
        .clone()
        .unwrap_or_else(|| config.data_dir.join("server.key"));

    if !cert_path.exists() || !key_path.exists() {
        selbstsigniert_generieren(&cert_path, &key_path)?;
    } else {
        tracing::info!(cert = %cert_path.display(), "TLS-Zertifikat geladen");
    }

    let cert_chain = zertifikate_laden(&cert_path)?;
    let key = schluessel_laden(&key_path)?;

    // Nur TLS 1.3
    let tls_config = ServerConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .context("TLS-Konfiguration")?;

    Ok(TlsAcceptor::from(Arc::new(tls_config)))
}

/// Generiert ein selbstsigniertes Zertifikat und schreibt beide PEMs.
fn selbstsigniert_generieren(cert_path: &Path, key_path: &Path) -> Result<()> {
    tracing::info!("Generiere selbstsigniertes TLS-Zertifikat (ECDSA P-256)");

    let mut params = CertificateParams::new(vec![
        "localhost".to_string(),
        "127.0.0.1".to_string(),
        "::1".to_string(),
    ])
    .map_err(|e| anyhow!("Zertifikat-Parameter: {e}"))?;

    let mut dn = DistinguishedName::new();
    dn.push(rcgen::DnType::OrganizationName, "Sprechfunk Server");
    params.distinguished_name = dn;

    let jetzt = time::OffsetDateTime::now_utc();
    params.not_before = jetzt;
    params.not_after = jetzt + time::Duration::days(365);

    // rcgen-Standard ist PKCS_ECDSA_P256_SHA256
    let key_pair = KeyPair::generate().map_err(|e| anyhow!("Schluessel-Generierung: {e}"))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| anyhow!("Selbstsignierung: {e}"))?;

    if let Some(parent) = cert_path.parent() {
        std::fs::create_dir_all(parent).context("Datenverzeichnis anlegen")?;
    }
    std::fs::write(cert_path, cert.pem()).context("Zertifikat schreiben")?;
    std::fs::write(key_path, key_pair.serialize_pem()).context("Schluessel schreiben")?;

    tracing::info!(
        cert = %cert_path.display(),
        key = %key_path.display(),
        "TLS-Zertifikat generiert"
    );
    Ok(())
}

fn zertifikate_laden(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let pem = std::fs::read(path).with_context(|| format!("{} lesen", path.display()))?;
    let mut cursor = std::io::Cursor::new(pem);
    certs(&mut cursor)
        .collect::<Result<Vec<_>, _>>()
        .context("Zertifikat-Parsing")
}

fn schluessel_laden(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let pem = std::fs::read(path).with_context(|| format!("{} lesen", path.display()))?;
    let mut cursor = std::io::Cursor::new(pem);
    private_key(&mut cursor)
        .context("Schluessel-Parsing")?
        .ok_or_else(|| anyhow!("Kein privater Schluessel in {}", path.display()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
