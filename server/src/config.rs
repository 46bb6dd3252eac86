//! Server-CLI und aufgeloeste Konfiguration
//!
//! Alle Flags haben lauffaehige Standardwerte; `--open` macht den Server
//! tokenfrei betretbar, `--export-users`/`--export-channels` sind
//! Run-and-Exit-Modi.

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use sprechfunk_observability::{log_format_gueltig, log_level_gueltig};
use sprechfunk_protocol::control::EncryptionMethod;

/// Kommandozeilen-Argumente des Servers
#[derive(Parser, Debug)]
#[command(name = "sprechfunk-server")]
#[command(about = "Sprechfunk Voice-Chat Server (SFU)", long_about = None)]
pub struct CliArgs {
    /// Bind-Adresse der Control-Ebene (TCP/TLS)
    #[arg(long, default_value = "0.0.0.0:9600")]
    pub control: String,

    /// Bind-Adresse der Voice-Ebene (UDP)
    #[arg(long, default_value = "0.0.0.0:9601")]
    pub voice: String,

    /// Pfad zur SQLite-Datenbank
    #[arg(long, default_value = "sprechfunk.db")]
    pub db: PathBuf,

    /// TLS-Zertifikat (leer = im Datenverzeichnis generieren/laden)
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Privater TLS-Schluessel
    #[arg(long)]
    pub key: Option<PathBuf>,

    /// Verzeichnis fuer generierte Dateien (Zertifikate)
    #[arg(long, default_value = ".")]
    pub data: PathBuf,

    /// Tokenlosen Beitritt erlauben (offener Server)
    #[arg(long)]
    pub open: bool,

    /// AEAD-Verfahren der Voice-Ebene:
    /// aes128_gcm | aes256_gcm | chacha20_poly1305
    #[arg(long, default_value = "aes128_gcm")]
    pub encryption: String,

    /// YAML-Datei mit Kanalbaum, wird beim Start idempotent importiert
    #[arg(long = "channels-file")]
    pub channels_file: Option<PathBuf>,

    /// Bind-Adresse des /metrics-Endpunkts (leer = deaktiviert)
    #[arg(long, default_value = "0.0.0.0:9602")]
    pub metrics: String,

    /// Alle Benutzer als YAML nach stdout exportieren und beenden
    #[arg(long = "export-users")]
    pub export_users: bool,

    /// Alle Kanaele als YAML nach stdout exportieren und beenden
    #[arg(long = "export-channels")]
    pub export_channels: bool,

    /// Log-Level: trace | debug | info | warn | error
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,

    /// Log-Format: text | json
    #[arg(long = "log-format", default_value = "text")]
    pub log_format: String,
}

/// Aufgeloeste, validierte Server-Konfiguration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub control_addr: SocketAddr,
    pub voice_addr: SocketAddr,
    pub db_url: String,
    pub cert_file: Option<PathBuf>,
    pub key_file: Option<PathBuf>,
    pub data_dir: PathBuf,
    pub open_server: bool,
    pub encryption_method: EncryptionMethod,
    pub channels_file: Option<PathBuf>,
    /// None = Metrics-Endpunkt deaktiviert
    pub metrics_addr: Option<SocketAddr>,
    pub export_users: bool,
    pub export_channels: bool,
    pub log_level: String,
    pub log_format: String,
}

impl ServerConfig {
    /// Loest die CLI-Argumente auf und validiert sie.
    pub fn aus_args(args: CliArgs) -> Result<Self> {
        if !log_level_gueltig(&args.log_level) {
            bail!("Ungueltiger Log-Level: '{}'", args.log_level);
        }
        if !log_format_gueltig(&args.log_format) {
            bail!("Ungueltiges Log-Format: '{}'", args.log_format);
        }

        let control_addr: SocketAddr = args
            .control
            .parse()
            .with_context(|| format!("Ungueltige Control-Adresse '{}'", args.control))?;
        let voice_addr: SocketAddr = args
            .voice
            .parse()
            .with_context(|| format!("Ungueltige Voice-Adresse '{}'", args.voice))?;

        let metrics_addr = if args.metrics.is_empty() {
            None
        } else {
            Some(
                args.metrics
                    .parse()
                    .with_context(|| format!("Ungueltige Metrics-Adresse '{}'", args.metrics))?,
            )
        };

        let encryption_method: EncryptionMethod = args
            .encryption
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        Ok(Self {
            control_addr,
            voice_addr,
            db_url: format!("sqlite://{}", args.db.display()),
            cert_file: args.cert,
            key_file: args.key,
            data_dir: args.data,
            open_server: args.open,
            encryption_method,
            channels_file: args.channels_file,
            metrics_addr,
            export_users: args.export_users,
            export_channels: args.export_channels,
            log_level: args.log_level,
            log_format: args.log_format,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> CliArgs {
        let mut argv = vec!["sprechfunk-server"];
        argv.extend_from_slice(extra);
        CliArgs::parse_from(argv)
    }

    #[test]
    fn standardwerte() {
        let config = ServerConfig::aus_args(args(&[])).unwrap();
        assert_eq!(config.control_addr.port(), 9600);
        assert_eq!(config.voice_addr.port(), 9601);
        assert_eq!(config.metrics_addr.unwrap().port(), 9602);
        assert!(!config.open_server);
        assert_eq!(config.encryption_method, EncryptionMethod::Aes128Gcm);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn metrics_leer_deaktiviert() {
        let config = ServerConfig::aus_args(args(&["--metrics", ""])).unwrap();
        assert!(config.metrics_addr.is_none());
    }

    #[test]
    fn verschluesselung_waehlbar() {
        let config =
            ServerConfig::aus_args(args(&["--encryption", "chacha20_poly1305"])).unwrap();
        assert_eq!(config.encryption_method, EncryptionMethod::ChaCha20Poly1305);

        assert!(ServerConfig::aus_args(args(&["--encryption", "rot13"])).is_err());
    }

    #[test]
    fn ungueltiger_log_level_abgelehnt() {
        assert!(ServerConfig::aus_args(args(&["--log-level", "verbose"])).is_err());
    }

    #[test]
    fn open_und_export_flags() {
        let config = ServerConfig::aus_args(args(&["--open", "--export-users"])).unwrap();
        assert!(config.open_server);
        assert!(config.export_users);
        assert!(!config.export_channels);
    }
}
