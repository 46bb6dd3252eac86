//! UDP Voice SFU
//!
//! Eine Task liest den UDP-Socket und leitet jedes gueltige Paket
//! unveraendert an alle anderen Kanal-Mitglieder weiter. Keine
//! Entschluesselung, kein Reordering, kein Mixing.
//!
//! ## Pruefkette pro Paket
//!
//! ```text
//! recv_from
//!   |> Header parsen            (< 14 Bytes -> verworfen)
//!   |> Session nachschlagen     (unbekannt -> verworfen)
//!   |> Quelladresse pinnen/pruefen (Abweichung -> verworfen)
//!   |> Mute-Status              (gemutet -> verworfen)
//!   |> Kanal-Anspruch vs. Mitgliedschafts-Map (Spoof -> verworfen)
//!   |> Fan-Out an Mitglieder mit gepinnter Adresse, nicht deafened
//! ```
//!
//! Die Quell-Pinning-Regel verhindert Session-Hijacking: nur das erste
//! Paket einer Session registriert (ip, port); alles andere muss exakt
//! passen.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;

use sprechfunk_observability::ServerMetrics;
use sprechfunk_protocol::voice::{VoiceHeader, MAX_VOICE_PAYLOAD, VOICE_HEADER_SIZE};

use crate::membership::ChannelMembership;
use crate::session::SessionManager;

/// Maximale UDP-Paketgroesse (Header + Max-Payload)
const UDP_BUFFER_SIZE: usize = VOICE_HEADER_SIZE + MAX_VOICE_PAYLOAD;

// ---------------------------------------------------------------------------
// VoiceServer
// ---------------------------------------------------------------------------

/// UDP-Voice-Server (SFU)
pub struct VoiceServer {
    socket: Arc<UdpSocket>,
    sessions: SessionManager,
    membership: ChannelMembership,
    metrics: ServerMetrics,
}

impl VoiceServer {
    /// Bindet den UDP-Socket
    pub async fn binden(
        bind_addr: SocketAddr,
        sessions: SessionManager,
        membership: ChannelMembership,
        metrics: ServerMetrics,
    ) -> std::io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr).await?;
        tracing::info!(addr = %bind_addr, "Voice-Ebene gebunden");

        Ok(Self {
            socket: Arc::new(socket),
            sessions,
            membership,
            metrics,
        })
    }

    /// Tatsaechliche Bind-Adresse (Port 0 -> vom OS vergeben)
    pub fn lokale_adresse(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Empfangs-Loop; laeuft bis zum Shutdown-Signal.
    pub async fn empfangs_loop(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        // Wiederverwendeter Empfangspuffer, kein Heap pro Paket
        let mut buf = [0u8; UDP_BUFFER_SIZE];

        tracing::info!("Voice-Empfangs-Loop gestartet");

        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => {
                    match result {
                        Ok((len, absender)) => {
                            self.paket_verarbeiten(&buf[..len], absender).await;
                        }
                        Err(e) => {
                            tracing::error!(fehler = %e, "UDP-Empfangsfehler");
                            // kurze Pause gegen Busy-Loop bei persistentem Fehler
                            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                        }
                    }
                }

                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        tracing::info!("Voice-Server: Shutdown-Signal empfangen");
                        break;
                    }
                }
            }
        }

        tracing::info!("Voice-Empfangs-Loop beendet");
    }

    // -----------------------------------------------------------------------
    // Internes Paket-Processing (Hot Path)
    // -----------------------------------------------------------------------

    async fn paket_verarbeiten(&self, daten: &[u8], absender: SocketAddr) {
        self.metrics.voice_packets_in.inc();
        self.metrics.voice_bytes_in.inc_by(daten.len() as u64);

        let header = match VoiceHeader::decode(daten) {
            Ok(h) => h,
            Err(_) => {
                self.metrics.voice_packets_dropped.inc();
                return;
            }
        };

        let session = match self.sessions.snapshot(header.session_id) {
            Some(s) => s,
            None => {
                self.metrics.voice_packets_dropped.inc();
                tracing::debug!(session = header.session_id, absender = %absender, "Unbekannter Absender");
                return;
            }
        };

        // Quelladresse pinnen bzw. exakt pruefen (IP und Port)
        match session.udp_addr {
            None => self.sessions.set_udp_addr(header.session_id, absender),
            Some(gepinnt) if gepinnt != absender => {
                self.metrics.voice_packets_dropped.inc();
                tracing::debug!(
                    session = header.session_id,
                    gepinnt = %gepinnt,
                    absender = %absender,
                    "Quelladresse weicht ab"
                );
                return;
            }
            Some(_) => {}
        }

        if session.muted {
            self.metrics.voice_packets_dropped.inc();
            return;
        }

        // Kanal-Anspruch gegen die Mitgliedschafts-Map pruefen
        let aktueller_kanal = self.membership.channel_of(header.session_id);
        if aktueller_kanal == 0 || aktueller_kanal != i64::from(header.channel_id) {
            self.metrics.voice_packets_dropped.inc();
            tracing::debug!(
                session = header.session_id,
                beansprucht = header.channel_id,
                tatsaechlich = aktueller_kanal,
                "Kanal-Anspruch abgewiesen"
            );
            return;
        }

        // Fan-Out: Rohbytes unveraendert an alle anderen Mitglieder
        for mitglied in self.membership.members(aktueller_kanal) {
            if mitglied == header.session_id {
                continue;
            }
            let Some(ziel) = self.sessions.snapshot(mitglied) else {
                continue;
            };
            if ziel.deafened {
                continue;
            }
            let Some(ziel_addr) = ziel.udp_addr else {
                continue;
            };

            match self.socket.send_to(daten, ziel_addr).await {
                Ok(_) => {
                    self.metrics.voice_packets_out.inc();
                    self.metrics.voice_bytes_out.inc_by(daten.len() as u64);
                }
                Err(e) => {
                    // Einzel-Sendefehler stoppen den Fan-Out nicht
                    tracing::debug!(ziel = mitglied, fehler = %e, "Voice-Weiterleitungsfehler");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sprechfunk_core::Role;
    use sprechfunk_protocol::voice::VoicePacket;
    use std::time::Duration;
    use tokio::time::timeout;

    struct TestUmgebung {
        server_addr: SocketAddr,
        sessions: SessionManager,
        membership: ChannelMembership,
        metrics: ServerMetrics,
        _shutdown_tx: tokio::sync::watch::Sender<bool>,
    }

    async fn server_starten() -> TestUmgebung {
        let sessions = SessionManager::neu();
        let membership = ChannelMembership::neu();
        let metrics = ServerMetrics::neu().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

        let server = VoiceServer::binden(
            "127.0.0.1:0".parse().unwrap(),
            sessions.clone(),
            membership.clone(),
            metrics.clone(),
        )
        .await
        .expect("Server muss binden koennen");
        let server_addr = server.lokale_adresse().unwrap();

        tokio::spawn(async move {
            server.empfangs_loop(shutdown_rx).await;
        });

        TestUmgebung {
            server_addr,
            sessions,
            membership,
            metrics,
            _shutdown_tx: shutdown_tx,
        }
    }

    fn paket(session_id: u32, seq: u32, channel_id: u16, payload_len: usize) -> Vec<u8> {
        VoicePacket {
            session_id,
            seq_num: seq,
            timestamp: seq * 960,
            channel_id,
            payload: vec![0xAB; payload_len],
        }
        .encode()
    }

    async fn empfangen(sock: &UdpSocket) -> Option<Vec<u8>> {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        match timeout(Duration::from_millis(500), sock.recv(&mut buf)).await {
            Ok(Ok(n)) => Some(buf[..n].to_vec()),
            _ => None,
        }
    }

    async fn nichts_empfangen(sock: &UdpSocket) -> bool {
        let mut buf = [0u8; UDP_BUFFER_SIZE];
        timeout(Duration::from_millis(150), sock.recv(&mut buf))
            .await
            .is_err()
    }

    #[tokio::test]
    async fn fan_out_bytes_unveraendert_und_kanal_isoliert() {
        let env = server_starten().await;

        let a = env.sessions.create(1, "a", Role::User);
        let b = env.sessions.create(2, "b", Role::User);
        let c = env.sessions.create(3, "c", Role::User);
        env.membership.join(a.id, 1);
        env.membership.join(b.id, 1);
        env.membership.join(c.id, 2);

        let sock_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_c = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock_a.connect(env.server_addr).await.unwrap();
        sock_b.connect(env.server_addr).await.unwrap();
        sock_c.connect(env.server_addr).await.unwrap();

        // Empfaenger-Adressen pinnen (sonst gibt es kein Ziel)
        env.sessions.set_udp_addr(a.id, sock_a.local_addr().unwrap());
        env.sessions.set_udp_addr(c.id, sock_c.local_addr().unwrap());

        // B sendet ein 120-Byte-Paket in Kanal 1
        let gesendet = paket(b.id, 1, 1, 120);
        sock_b.send(&gesendet).await.unwrap();

        // A empfaengt die Bytes identisch; C (Kanal 2) nicht
        let erhalten = empfangen(&sock_a).await.expect("A muss empfangen");
        assert_eq!(erhalten, gesendet, "Bytes muessen unveraendert sein");
        assert!(nichts_empfangen(&sock_c).await, "C darf nichts empfangen");

        // B wurde beim ersten Paket gepinnt
        assert_eq!(
            env.sessions.snapshot(b.id).unwrap().udp_addr,
            Some(sock_b.local_addr().unwrap())
        );
    }

    #[tokio::test]
    async fn gemutete_session_wird_nicht_weitergeleitet() {
        let env = server_starten().await;

        let a = env.sessions.create(1, "a", Role::User);
        let b = env.sessions.create(2, "b", Role::User);
        env.membership.join(a.id, 1);
        env.membership.join(b.id, 1);
        env.sessions.update_user_state(a.id, true, false);

        let sock_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock_a.connect(env.server_addr).await.unwrap();
        sock_b.connect(env.server_addr).await.unwrap();
        env.sessions.set_udp_addr(b.id, sock_b.local_addr().unwrap());

        sock_a.send(&paket(a.id, 1, 1, 60)).await.unwrap();
        assert!(nichts_empfangen(&sock_b).await, "gemutet darf nicht ankommen");

        // Mute aufheben -> Weiterleitung laeuft
        env.sessions.update_user_state(a.id, false, false);
        sock_a.send(&paket(a.id, 2, 1, 60)).await.unwrap();
        assert!(empfangen(&sock_b).await.is_some());
    }

    #[tokio::test]
    async fn quelladresse_pinning_blockt_hijack() {
        let env = server_starten().await;

        let a = env.sessions.create(1, "a", Role::User);
        let b = env.sessions.create(2, "b", Role::User);
        env.membership.join(a.id, 1);
        env.membership.join(b.id, 1);

        let sock_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_angreifer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock_a.connect(env.server_addr).await.unwrap();
        sock_b.connect(env.server_addr).await.unwrap();
        sock_angreifer.connect(env.server_addr).await.unwrap();
        env.sessions.set_udp_addr(b.id, sock_b.local_addr().unwrap());

        // Erstes Paket von A pinnt (ip, port) von sock_a
        sock_a.send(&paket(a.id, 1, 1, 60)).await.unwrap();
        assert!(empfangen(&sock_b).await.is_some());

        // Angreifer behauptet dieselbe Session von anderem Port
        sock_angreifer.send(&paket(a.id, 2, 1, 60)).await.unwrap();
        assert!(
            nichts_empfangen(&sock_b).await,
            "abweichende Quelle darf nicht weitergeleitet werden"
        );
    }

    #[tokio::test]
    async fn kanal_spoof_wird_verworfen() {
        let env = server_starten().await;

        let a = env.sessions.create(1, "a", Role::User);
        let b = env.sessions.create(2, "b", Role::User);
        // A ist in Kanal 2, behauptet aber Kanal 1 (wo B sitzt)
        env.membership.join(a.id, 2);
        env.membership.join(b.id, 1);

        let sock_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock_a.connect(env.server_addr).await.unwrap();
        sock_b.connect(env.server_addr).await.unwrap();
        env.sessions.set_udp_addr(b.id, sock_b.local_addr().unwrap());

        sock_a.send(&paket(a.id, 1, 1, 60)).await.unwrap();
        assert!(nichts_empfangen(&sock_b).await, "Spoof darf nicht durchkommen");
    }

    #[tokio::test]
    async fn session_ohne_kanal_wird_verworfen() {
        let env = server_starten().await;

        let a = env.sessions.create(1, "a", Role::User);
        let b = env.sessions.create(2, "b", Role::User);
        env.membership.join(b.id, 1);

        let sock_a = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let sock_b = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock_a.connect(env.server_addr).await.unwrap();
        sock_b.connect(env.server_addr).await.unwrap();
        env.sessions.set_udp_addr(b.id, sock_b.local_addr().unwrap());

        sock_a.send(&paket(a.id, 1, 1, 60)).await.unwrap();
        assert!(nichts_empfangen(&sock_b).await);
    }

    #[tokio::test]
    async fn zu_kurzes_paket_erhoeht_drop_zaehler() {
        let env = server_starten().await;

        let sock = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sock.connect(env.server_addr).await.unwrap();
        sock.send(&[0u8; 8]).await.unwrap();

        // kurz warten bis der Server das Paket gesehen hat
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(env.metrics.voice_packets_dropped.get() >= 1);
    }
}
