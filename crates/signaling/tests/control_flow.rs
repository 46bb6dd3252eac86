//! End-to-End-Tests der Control-Ebene ueber echtes TLS
//!
//! Faehrt den Signaling-Server mit In-Memory-Datenbank hoch und spricht
//! das Draht-Protokoll direkt (laengen-praefigierte JSON-Frames).

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use sprechfunk_core::Role;
use sprechfunk_crypto::hash_token;
use sprechfunk_db::{
    ChannelRepository, NeuerKanal, NeuerToken, SqliteDb, TokenRepository, UserRepository,
};
use sprechfunk_observability::ServerMetrics;
use sprechfunk_protocol::control::{
    AuthRequest, AuthResponse, ControlMessage, JoinChannelRequest, KickUserRequest,
};
use sprechfunk_protocol::wire::{read_frame, write_frame};
use sprechfunk_signaling::{
    acceptor_erstellen, SignalingConfig, SignalingServer, SignalingState, TlsConfig,
};
use sprechfunk_voice::{ChannelMembership, SessionManager};

// ---------------------------------------------------------------------------
// Test-Infrastruktur
// ---------------------------------------------------------------------------

struct TestServer {
    addr: SocketAddr,
    state: Arc<SignalingState>,
    _shutdown_tx: tokio::sync::watch::Sender<bool>,
}

fn crypto_provider_installieren() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

fn test_datendir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "sprechfunk-test-{}-{}",
        name,
        std::process::id()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn server_starten(name: &str, open_server: bool) -> TestServer {
    crypto_provider_installieren();

    let store = SqliteDb::in_memory().await.unwrap();
    // Lobby anlegen (id = 1, erste Zeile)
    store.create_channel(NeuerKanal::default()).await.unwrap();

    let config = SignalingConfig {
        open_server,
        ..SignalingConfig::default()
    };
    let state = SignalingState::neu(
        config,
        store,
        SessionManager::neu(),
        ChannelMembership::neu(),
        ServerMetrics::neu().unwrap(),
        vec![0x42u8; 16],
    );

    let acceptor = acceptor_erstellen(&TlsConfig {
        cert_file: None,
        key_file: None,
        data_dir: test_datendir(name),
    })
    .unwrap();

    let server = SignalingServer::binden(
        Arc::clone(&state),
        acceptor,
        "127.0.0.1:0".parse().unwrap(),
    )
    .await
    .unwrap();
    let addr = server.lokale_adresse().unwrap();

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        server.accept_loop(shutdown_rx).await;
    });

    TestServer {
        addr,
        state,
        _shutdown_tx: shutdown_tx,
    }
}

/// Akzeptiert jedes Zertifikat (Testclient fuer selbstsignierte Server)
#[derive(Debug)]
struct AllesAkzeptieren;

impl rustls::client::danger::ServerCertVerifier for AllesAkzeptieren {
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
            rustls::SignatureScheme::ED25519,
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
        ]
    }
}

async fn tls_verbinden(addr: SocketAddr) -> TlsStream<TcpStream> {
    let tls_config = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AllesAkzeptieren))
        .with_no_client_auth();
    let connector = TlsConnector::from(Arc::new(tls_config));

    let tcp = TcpStream::connect(addr).await.unwrap();
    let server_name = rustls::pki_types::ServerName::try_from("localhost").unwrap();
    connector.connect(server_name, tcp).await.unwrap()
}

/// Verbindet und authentifiziert; gibt Stream + AuthResponse zurueck.
async fn anmelden(
    addr: SocketAddr,
    username: &str,
    token: &str,
) -> (TlsStream<TcpStream>, AuthResponse) {
    let mut stream = tls_verbinden(addr).await;
    write_frame(
        &mut stream,
        &ControlMessage::AuthRequest(AuthRequest {
            token: token.into(),
            username: username.into(),
        }),
    )
    .await
    .unwrap();

    match lese(&mut stream).await {
        ControlMessage::AuthResponse(r) => (stream, r),
        other => panic!("Erwartet auth_response, war: {other:?}"),
    }
}

async fn lese(stream: &mut TlsStream<TcpStream>) -> ControlMessage {
    tokio::time::timeout(Duration::from_secs(2), read_frame(stream))
        .await
        .expect("Frame-Timeout")
        .expect("Frame-Lesefehler")
}

/// Liest Frames bis das Praedikat zutrifft (Broadcasts duerfen dazwischen
/// liegen).
async fn warte_auf<F>(stream: &mut TlsStream<TcpStream>, mut passt: F) -> ControlMessage
where
    F: FnMut(&ControlMessage) -> bool,
{
    for _ in 0..20 {
        let msg = lese(stream).await;
        if passt(&msg) {
            return msg;
        }
    }
    panic!("Erwartete Nachricht nie angekommen");
}

// ---------------------------------------------------------------------------
// Szenarien
// ---------------------------------------------------------------------------

/// Offener Server: tokenloser Beitritt liefert auto_token; Reconnect mit
/// (username, auto_token) findet denselben Benutzer wieder.
#[tokio::test]
async fn offener_beitritt_und_wiedererkennung() {
    let server = server_starten("s1", true).await;

    let (stream, antwort) = anmelden(server.addr, "alice", "").await;
    assert_eq!(antwort.role, "user");
    assert_eq!(antwort.auto_token.len(), 64, "auto_token muss 64 Hex-Zeichen haben");
    assert!(antwort.auto_token.chars().all(|c| c.is_ascii_hexdigit()));
    assert!(!antwort.channels.is_empty(), "Kanalbaum muss mitkommen");
    assert_ne!(antwort.session_id, 0);

    let erste_user_id = server
        .state
        .store
        .get_user_by_username("alice")
        .await
        .unwrap()
        .unwrap()
        .id;

    drop(stream);
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Reconnect mit dem Personal-Token
    let (_stream2, antwort2) = anmelden(server.addr, "alice", &antwort.auto_token).await;
    assert_eq!(antwort2.role, "user");
    assert!(antwort2.auto_token.is_empty(), "bestehender Benutzer bekommt keinen neuen Token");

    // Derselbe Datensatz, kein Duplikat
    let benutzer = server.state.store.list_users().await.unwrap();
    assert_eq!(benutzer.len(), 1);
    assert_eq!(benutzer[0].id, erste_user_id);
}

/// Geschlossener Server lehnt tokenlosen Beitritt mit Code 2 ab.
#[tokio::test]
async fn geschlossener_server_verlangt_token() {
    let server = server_starten("closed", false).await;

    let mut stream = tls_verbinden(server.addr).await;
    write_frame(
        &mut stream,
        &ControlMessage::AuthRequest(AuthRequest {
            token: String::new(),
            username: "alice".into(),
        }),
    )
    .await
    .unwrap();

    match lese(&mut stream).await {
        ControlMessage::ErrorResponse(e) => {
            assert_eq!(e.code, 2);
            assert!(e.message.contains("token required"));
        }
        other => panic!("Erwartet error_response, war: {other:?}"),
    }
}

/// Ungueltige Benutzernamen scheitern vor allem anderen.
#[tokio::test]
async fn ungueltiger_benutzername_abgelehnt() {
    let server = server_starten("uname", true).await;

    for name in ["", "ä-umlaut", "zu lang und mit leerzeichen dazu noch!!"] {
        let mut stream = tls_verbinden(server.addr).await;
        write_frame(
            &mut stream,
            &ControlMessage::AuthRequest(AuthRequest {
                token: String::new(),
                username: name.into(),
            }),
        )
        .await
        .unwrap();

        match lese(&mut stream).await {
            ControlMessage::ErrorResponse(e) => assert_eq!(e.code, 2, "Name: {name:?}"),
            other => panic!("Erwartet error_response, war: {other:?}"),
        }
    }
}

/// Erste Nachricht != auth_request ergibt Code 1 und Schluss.
#[tokio::test]
async fn auth_zuerst_regel() {
    let server = server_starten("authfirst", true).await;

    let mut stream = tls_verbinden(server.addr).await;
    write_frame(&mut stream, &ControlMessage::ping(123)).await.unwrap();

    match lese(&mut stream).await {
        ControlMessage::ErrorResponse(e) => {
            assert_eq!(e.code, 1);
            assert!(e.message.contains("auth_request"));
        }
        other => panic!("Erwartet error_response, war: {other:?}"),
    }

    // Danach ist die Verbindung zu
    assert!(read_frame(&mut stream).await.is_err());
}

/// Join-Broadcasts: der Beitretende sieht den vollen Zustand, die
/// bestehenden Mitglieder sehen channel_joined_event plus Zustand.
#[tokio::test]
async fn join_broadcasts_an_alle_seiten() {
    let server = server_starten("s2", true).await;

    let (mut bob, _) = anmelden(server.addr, "bob", "").await;
    write_frame(
        &mut bob,
        &ControlMessage::JoinChannelRequest(JoinChannelRequest { channel_id: 1 }),
    )
    .await
    .unwrap();
    // Bobs eigenen Zustand abwarten
    warte_auf(&mut bob, |m| matches!(m, ControlMessage::ServerStateEvent(_))).await;

    let (mut alice, _) = anmelden(server.addr, "alice", "").await;
    write_frame(
        &mut alice,
        &ControlMessage::JoinChannelRequest(JoinChannelRequest { channel_id: 1 }),
    )
    .await
    .unwrap();

    // Alice: ServerStateEvent in dem Lobby beide enthaelt
    let zustand = warte_auf(&mut alice, |m| {
        matches!(m, ControlMessage::ServerStateEvent(ev)
            if ev.channels.iter().any(|c| c.id == 1 && c.users.len() == 2))
    })
    .await;
    if let ControlMessage::ServerStateEvent(ev) = zustand {
        let lobby = ev.channels.iter().find(|c| c.id == 1).unwrap();
        let namen: Vec<_> = lobby.users.iter().map(|u| u.username.as_str()).collect();
        assert!(namen.contains(&"alice") && namen.contains(&"bob"));
    }

    // Bob: channel_joined_event mit Alice ...
    let joined = warte_auf(&mut bob, |m| {
        matches!(m, ControlMessage::ChannelJoinedEvent(_))
    })
    .await;
    if let ControlMessage::ChannelJoinedEvent(ev) = joined {
        assert_eq!(ev.channel_id, 1);
        assert_eq!(ev.user.username, "alice");
    }
    // ... und ein aktualisierter Zustand
    warte_auf(&mut bob, |m| {
        matches!(m, ControlMessage::ServerStateEvent(ev)
            if ev.channels.iter().any(|c| c.id == 1 && c.users.len() == 2))
    })
    .await;
}

/// Kanal-Kapazitaet: voller Kanal liefert Code 11.
#[tokio::test]
async fn voller_kanal_abgewiesen() {
    let server = server_starten("full", true).await;
    let eng = server
        .state
        .store
        .create_channel(NeuerKanal {
            name: "eng",
            description: "",
            max_users: 1,
            parent_id: 0,
            is_temp: false,
            allow_sub_channels: false,
        })
        .await
        .unwrap();

    let (mut a, _) = anmelden(server.addr, "a1", "").await;
    write_frame(
        &mut a,
        &ControlMessage::JoinChannelRequest(JoinChannelRequest { channel_id: eng.id }),
    )
    .await
    .unwrap();
    warte_auf(&mut a, |m| matches!(m, ControlMessage::ServerStateEvent(_))).await;

    let (mut b, _) = anmelden(server.addr, "b1", "").await;
    write_frame(
        &mut b,
        &ControlMessage::JoinChannelRequest(JoinChannelRequest { channel_id: eng.id }),
    )
    .await
    .unwrap();
    let fehler = warte_auf(&mut b, |m| matches!(m, ControlMessage::ErrorResponse(_))).await;
    if let ControlMessage::ErrorResponse(e) = fehler {
        assert_eq!(e.code, 11);
    }
}

/// Kick: Ziel bekommt Code 99 mit "kicked", die Verbindung schliesst,
/// der verbleibende Zustand listet das Ziel nicht mehr.
#[tokio::test]
async fn kick_ist_terminal() {
    let server = server_starten("s6", true).await;

    // Admin-Token direkt im Store hinterlegen
    let roh = "cafe".repeat(16);
    server
        .state
        .store
        .create_token(NeuerToken {
            hash: &hash_token(&roh),
            role: Role::Admin,
            channel_scope: 0,
            created_by: 0,
            max_uses: 0,
            expires_at: None,
        })
        .await
        .unwrap();

    let (mut root, root_antwort) = anmelden(server.addr, "root", &roh).await;
    assert_eq!(root_antwort.role, "admin");

    let (mut bob, _) = anmelden(server.addr, "bob", "").await;
    write_frame(
        &mut bob,
        &ControlMessage::JoinChannelRequest(JoinChannelRequest { channel_id: 1 }),
    )
    .await
    .unwrap();
    warte_auf(&mut bob, |m| matches!(m, ControlMessage::ServerStateEvent(_))).await;

    let bob_user_id = server
        .state
        .store
        .get_user_by_username("bob")
        .await
        .unwrap()
        .unwrap()
        .id;

    write_frame(
        &mut root,
        &ControlMessage::KickUserRequest(KickUserRequest {
            user_id: bob_user_id,
            reason: "Regelverstoss".into(),
        }),
    )
    .await
    .unwrap();

    // Bob sieht den terminalen Fehler ...
    let terminal = warte_auf(&mut bob, |m| matches!(m, ControlMessage::ErrorResponse(_))).await;
    if let ControlMessage::ErrorResponse(e) = terminal {
        assert_eq!(e.code, 99);
        assert!(e.message.contains("kicked"));
        assert!(e.message.contains("Regelverstoss"));
    }
    // ... und danach EOF
    assert!(read_frame(&mut bob).await.is_err());

    // Root sieht einen Zustand ohne Bob
    warte_auf(&mut root, |m| {
        matches!(m, ControlMessage::ServerStateEvent(ev)
            if ev.channels.iter().all(|c| c.users.iter().all(|u| u.username != "bob")))
    })
    .await;
}

/// Erschoepfter Einladungs-Token: die Draht-Meldung traegt "exhausted".
#[tokio::test]
async fn erschoepfter_token_meldet_exhausted() {
    let server = server_starten("s4", false).await;

    let roh = "beef".repeat(16);
    server
        .state
        .store
        .create_token(NeuerToken {
            hash: &hash_token(&roh),
            role: Role::User,
            channel_scope: 0,
            created_by: 0,
            max_uses: 2,
            expires_at: None,
        })
        .await
        .unwrap();

    // Zwei Beitritte verbrauchen den Token
    let (_c1, _) = anmelden(server.addr, "u1", &roh).await;
    let (_c2, _) = anmelden(server.addr, "u2", &roh).await;

    // Der dritte scheitert mit Erschoepfung
    let mut stream = tls_verbinden(server.addr).await;
    write_frame(
        &mut stream,
        &ControlMessage::AuthRequest(AuthRequest {
            token: roh.clone(),
            username: "u3".into(),
        }),
    )
    .await
    .unwrap();

    match lese(&mut stream).await {
        ControlMessage::ErrorResponse(e) => {
            assert_eq!(e.code, 2);
            assert!(e.message.contains("exhausted"), "Meldung war: {}", e.message);
        }
        other => panic!("Erwartet error_response, war: {other:?}"),
    }

    let token = server
        .state
        .store
        .get_token_by_hash(&hash_token(&roh))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(token.use_count, 2);
}

/// Temp-Subkanal: jeder darf unter einem erlaubenden Parent, aber nur
/// einmal pro Rate-Limit-Fenster.
#[tokio::test]
async fn temp_subkanal_mit_rate_limit() {
    let server = server_starten("s5", true).await;

    let (mut alice, _) = anmelden(server.addr, "alice", "").await;

    // Lobby (id 1) erlaubt Subkanaele
    write_frame(
        &mut alice,
        &ControlMessage::CreateChannelRequest(
            sprechfunk_protocol::control::CreateChannelRequest {
                name: "team".into(),
                description: String::new(),
                max_users: 0,
                parent_id: 1,
                is_temp: true,
                allow_sub_channels: false,
            },
        ),
    )
    .await
    .unwrap();

    // Der neue Kanal taucht im Zustand auf
    warte_auf(&mut alice, |m| {
        matches!(m, ControlMessage::ServerStateEvent(ev)
            if ev.channels.iter().any(|c| c.name == "team" && c.is_temp && c.parent_id == 1))
    })
    .await;

    // Sofortiger zweiter Versuch prallt am Rate-Limit ab
    write_frame(
        &mut alice,
        &ControlMessage::CreateChannelRequest(
            sprechfunk_protocol::control::CreateChannelRequest {
                name: "team2".into(),
                description: String::new(),
                max_users: 0,
                parent_id: 1,
                is_temp: true,
                allow_sub_channels: false,
            },
        ),
    )
    .await
    .unwrap();

    let fehler = warte_auf(&mut alice, |m| matches!(m, ControlMessage::ErrorResponse(_))).await;
    if let ControlMessage::ErrorResponse(e) = fehler {
        assert_eq!(e.code, 31);
        assert!(e.message.contains("wait"));
    }
}

/// Nicht-Admins prallen an privilegierten Operationen ab (Code 30).
#[tokio::test]
async fn berechtigung_verweigert_fuer_user() {
    let server = server_starten("perm", true).await;

    let (mut alice, _) = anmelden(server.addr, "alice", "").await;
    write_frame(
        &mut alice,
        &ControlMessage::KickUserRequest(KickUserRequest {
            user_id: 999,
            reason: String::new(),
        }),
    )
    .await
    .unwrap();

    let fehler = warte_auf(&mut alice, |m| matches!(m, ControlMessage::ErrorResponse(_))).await;
    if let ControlMessage::ErrorResponse(e) = fehler {
        assert_eq!(e.code, 30);
        assert!(e.message.contains("permission denied"));
    }
}

/// Chat wird mit Absender-Stempel an alle Kanal-Mitglieder inklusive
/// Absender verteilt.
#[tokio::test]
async fn chat_an_kanal_inklusive_absender() {
    let server = server_starten("chat", true).await;

    let (mut alice, _) = anmelden(server.addr, "alice", "").await;
    write_frame(
        &mut alice,
        &ControlMessage::JoinChannelRequest(JoinChannelRequest { channel_id: 1 }),
    )
    .await
    .unwrap();
    warte_auf(&mut alice, |m| matches!(m, ControlMessage::ServerStateEvent(_))).await;

    write_frame(
        &mut alice,
        &ControlMessage::ChatMessage(sprechfunk_protocol::control::ChatMessage {
            channel_id: 1,
            sender_id: 0,
            sender_name: "gefaelscht".into(),
            text: "hallo\x07welt".into(),
            timestamp: 0,
        }),
    )
    .await
    .unwrap();

    let event = warte_auf(&mut alice, |m| matches!(m, ControlMessage::ChatEvent(_))).await;
    if let ControlMessage::ChatEvent(ev) = event {
        assert_eq!(ev.sender_name, "alice", "Absender setzt der Server");
        assert_eq!(ev.text, "hallowelt", "Steuerzeichen sind entfernt");
        assert!(ev.timestamp > 0);
        assert_eq!(ev.channel_id, 1);
    }
}
