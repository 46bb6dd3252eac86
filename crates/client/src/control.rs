//! Control-Verbindung des Clients (TLS)
//!
//! Baut die TLS-1.3-Verbindung zum Server auf und teilt sie in eine
//! Lese- und eine Schreibhaelfte. Die Schreibhaelfte liegt hinter einem
//! Mutex, damit Engine-Operationen aus beliebigen Tasks senden koennen.
//!
//! Zertifikats-Pruefung: fuer das MVP wird jedes Zertifikat akzeptiert
//! (selbstsignierte Server); Pinning/TOFU ist eine spaetere Verschaerfung
//! am selben Protokoll.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use sprechfunk_protocol::control::ControlMessage;
use sprechfunk_protocol::wire::write_frame;

use crate::error::{ClientError, ClientResult};

/// Lesehaelfte der Control-Verbindung (gehoert dem Empfangs-Task)
pub type ControlLeser = ReadHalf<TlsStream<TcpStream>>;

/// Schreibseite der Control-Verbindung
pub struct ControlClient {
    schreiber: tokio::sync::Mutex<WriteHalf<TlsStream<TcpStream>>>,
}

impl ControlClient {
    /// Verbindet via TLS (1.3, beliebiges Zertifikat) und teilt den Stream.
    pub async fn verbinden(addr: SocketAddr) -> ClientResult<(Arc<Self>, ControlLeser)> {
        let tls_config =
            rustls::ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS13])
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
                .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(tls_config));

        let tcp = TcpStream::connect(addr)
            .await
            .map_err(|e| ClientError::Verbindung(format!("TCP {addr}: {e}")))?;

        // SNI ist beim Akzeptieren beliebiger Zertifikate nur Formsache
        let server_name = rustls::pki_types::ServerName::try_from("sprechfunk")
            .map_err(|e| ClientError::Verbindung(format!("Servername: {e}")))?;
        let tls = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| ClientError::Verbindung(format!("TLS {addr}: {e}")))?;

        let (leser, schreiber) = tokio::io::split(tls);
        Ok((
            Arc::new(Self {
                schreiber: tokio::sync::Mutex::new(schreiber),
            }),
            leser,
        ))
    }

    /// Sendet eine Control-Nachricht (serialisiert unter dem Schreib-Lock)
    pub async fn senden(&self, msg: &ControlMessage) -> ClientResult<()> {
        let mut schreiber = self.schreiber.lock().await;
        write_frame(&mut *schreiber, msg).await?;
        Ok(())
    }
}

/// Akzeptiert jedes Server-Zertifikat (MVP fuer selbstsignierte Server)
#[derive(Debug)]
struct InsecureCertVerifier;

impl rustls::client::danger::ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA256,
        ]
    }
}
