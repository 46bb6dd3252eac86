//! Voice-Verbindung des Clients (UDP)
//!
//! Sendet verschluesselte Opus-Frames mit 14-Byte-Header und nimmt
//! eingehende Pakete entgegen. Die Sequenznummer ist strikt monoton pro
//! Session; sie traegt die AEAD-Nonce und darf nie wiederverwendet werden.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use sprechfunk_core::ChannelId;
use sprechfunk_crypto::VoiceCipher;
use sprechfunk_protocol::voice::{VoicePacket, MAX_VOICE_PAYLOAD, VOICE_HEADER_SIZE};

use crate::error::ClientResult;

/// Kapazitaet der Eingangs-Queue (Pakete); Ueberlauf verwirft
const EINGANGS_QUEUE: usize = 100;

/// UDP-Voice-Client
pub struct VoiceClient {
    socket: Arc<UdpSocket>,
    session_id: u32,
    cipher: VoiceCipher,
    seq_num: AtomicU32,
    channel_id: AtomicI64,
}

impl VoiceClient {
    /// Bindet einen lokalen Socket und verbindet ihn mit dem Server.
    pub async fn verbinden(
        server_addr: SocketAddr,
        session_id: u32,
        cipher: VoiceCipher,
    ) -> ClientResult<Arc<Self>> {
        let bind: SocketAddr = if server_addr.is_ipv4() {
            "0.0.0.0:0".parse().expect("gueltige Adresse")
        } else {
            "[::]:0".parse().expect("gueltige Adresse")
        };
        let socket = UdpSocket::bind(bind).await?;
        socket.connect(server_addr).await?;

        Ok(Arc::new(Self {
            socket: Arc::new(socket),
            session_id,
            cipher,
            seq_num: AtomicU32::new(0),
            channel_id: AtomicI64::new(0),
        }))
    }

    /// Setzt den Kanal fuer ausgehende Pakete
    pub fn set_channel(&self, channel_id: ChannelId) {
        self.channel_id.store(channel_id, Ordering::Relaxed);
    }

    /// Verschluesselt und sendet einen Opus-Frame.
    ///
    /// Header zuerst bauen: er ist die Additional Data der AEAD.
    pub async fn voice_senden(&self, opus: &[u8], timestamp: u32) -> ClientResult<()> {
        let seq = self.seq_num.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        let channel_id = self.channel_id.load(Ordering::Relaxed) as u16;

        let mut paket = VoicePacket {
            session_id: self.session_id,
            seq_num: seq,
            timestamp,
            channel_id,
            payload: Vec::new(),
        };
        let header = paket.encode_header();
        paket.payload = self.cipher.encrypt(self.session_id, seq, &header, opus)?;

        self.socket.send(&paket.encode()).await?;
        Ok(())
    }

    /// Empfangs-Loop: dekodierte Pakete landen in der Queue.
    ///
    /// Laeuft bis der Socket schliesst oder das Shutdown-Signal kommt.
    /// Ueberlauf der Queue verwirft das Paket (UDP-Semantik).
    pub async fn empfangs_loop(
        self: Arc<Self>,
        tx: mpsc::Sender<VoicePacket>,
        mut shutdown_rx: tokio::sync::watch::Receiver<bool>,
    ) {
        let mut buf = [0u8; VOICE_HEADER_SIZE + MAX_VOICE_PAYLOAD];
        loop {
            tokio::select! {
                result = self.socket.recv(&mut buf) => {
                    match result {
                        Ok(len) => {
                            let Ok(paket) = VoicePacket::decode(&buf[..len]) else {
                                continue; // zu kurz oder zu gross
                            };
                            // Back-Pressure: bei voller Queue verwerfen
                            let _ = tx.try_send(paket);
                        }
                        Err(e) => {
                            tracing::debug!(fehler = %e, "Voice-Empfangsfehler");
                            break;
                        }
                    }
                }
                Ok(()) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Voice-Empfangs-Loop beendet");
    }

    /// Erstellt die Eingangs-Queue mit Standard-Kapazitaet
    pub fn eingangs_queue() -> (mpsc::Sender<VoicePacket>, mpsc::Receiver<VoicePacket>) {
        mpsc::channel(EINGANGS_QUEUE)
    }

    /// Entschluesselt die Nutzdaten eines empfangenen Pakets
    pub fn entschluesseln(&self, paket: &VoicePacket) -> ClientResult<Vec<u8>> {
        let header = paket.encode_header();
        Ok(self
            .cipher
            .decrypt(paket.session_id, paket.seq_num, &header, &paket.payload)?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
