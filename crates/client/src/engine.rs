//! Client-Engine
//!
//! Ereignis-getriebene Fassade ueber Netzwerk und Audio. `verbinden`
//! laeuft auf dem Aufrufer-Task: TLS-Auth, UDP-Socket, Chiffre aus der
//! Antwort, sofort `Connected` melden; die Audio-Geraete initialisieren
//! sich danach asynchron (langsame Geraete-Enumeration blockiert so nie
//! die Oberflaeche).
//!
//! ## Tasks nach dem Verbinden
//! - Control-Empfang: Frames lesen, Events emittieren
//! - Voice-Empfang: UDP -> Queue
//! - Wiedergabe: Queue -> entschluesseln -> Jitter -> Opus/PLC -> Ausgabe
//! - Capture: Mikrofon -> RMS/VAD -> Opus -> AEAD -> UDP
//!
//! Alle Tasks beobachten ein gemeinsames Abbruch-Signal; `disconnect`
//! kippt es und schliesst damit beide Ebenen.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};

use sprechfunk_audio::{
    frame_entnehmen, frame_schreiben, open_capture_stream, open_playback_stream, rms,
    standard_ausgabegeraet, standard_eingabegeraet, CaptureConfig, CaptureConsumer,
    OpusVoiceDecoder, OpusVoiceEncoder, PlaybackConfig, PlaybackProducer, Vad, VoiceDecoder,
    VoiceEncoder,
};
use sprechfunk_core::{ChannelId, UserId};
use sprechfunk_crypto::{key_from_base64, VoiceCipher};
use sprechfunk_protocol::control::{
    ChannelInfo, ChatMessage, ControlMessage, CreateChannelRequest, CreateTokenRequest,
    DeleteChannelRequest, ExportDataRequest, ImportChannelsRequest, JoinChannelRequest,
    KickUserRequest, LeaveChannelRequest, SetUserRoleRequest, UserStateUpdate,
};
use sprechfunk_protocol::voice::{VoicePacket, FRAME_SAMPLES};
use sprechfunk_protocol::wire::read_frame;

use crate::control::ControlClient;
use crate::error::{ClientError, ClientResult};
use crate::event::{ClientState, EngineEvent};
use crate::jitter::{JitterBuffer, PopErgebnis};
use crate::voice::VoiceClient;

/// Standard-VAD-Parameter: Schwelle 200, Hold 300 ms, Pre-Buffer 60 ms
const VAD_SCHWELLE: f64 = 200.0;
const VAD_HOLD_FRAMES: u32 = 15;
const VAD_PRE_BUFFER: usize = 3;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Client-Engine; `Clone` teilt den Zustand.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    events: mpsc::UnboundedSender<EngineEvent>,
    zustand: Mutex<Zustand>,
    vad: Mutex<Vad>,
    /// Pro-Sprecher-Zustand, lazy angelegt, bei Disconnect geleert
    sprecher: Mutex<HashMap<u32, Sprecher>>,
    /// Wiedergabe-Producer; None solange die Audio-Init laeuft
    playback: Mutex<Option<PlaybackProducer>>,
}

struct Zustand {
    state: ClientState,
    session_id: u32,
    username: String,
    role: String,
    channel_id: ChannelId,
    muted: bool,
    deafened: bool,
    channels: Vec<ChannelInfo>,
    control: Option<Arc<ControlClient>>,
    voice: Option<Arc<VoiceClient>>,
    abbruch: Option<watch::Sender<bool>>,
}

/// Decoder + Jitter-Buffer eines entfernten Sprechers
struct Sprecher {
    decoder: OpusVoiceDecoder,
    jitter: JitterBuffer,
}

impl Sprecher {
    fn neu() -> ClientResult<Self> {
        Ok(Self {
            decoder: OpusVoiceDecoder::neu()?,
            jitter: JitterBuffer::neu(),
        })
    }
}

impl Engine {
    /// Erstellt die Engine und die Ereignis-Subscription
    pub fn neu() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, empfaenger) = mpsc::unbounded_channel();
        let engine = Self {
            inner: Arc::new(EngineInner {
                events,
                zustand: Mutex::new(Zustand {
                    state: ClientState::Disconnected,
                    session_id: 0,
                    username: String::new(),
                    role: String::new(),
                    channel_id: 0,
                    muted: false,
                    deafened: false,
                    channels: Vec::new(),
                    control: None,
                    voice: None,
                    abbruch: None,
                }),
                vad: Mutex::new(Vad::neu(VAD_SCHWELLE, VAD_HOLD_FRAMES, VAD_PRE_BUFFER)),
                sprecher: Mutex::new(HashMap::new()),
                playback: Mutex::new(None),
            }),
        };
        (engine, empfaenger)
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.inner.events.send(event);
    }

    // -----------------------------------------------------------------------
    // Verbindungsaufbau
    // -----------------------------------------------------------------------

    /// Verbindet, authentifiziert und startet alle Pipelines.
    pub async fn verbinden(
        &self,
        control_addr: SocketAddr,
        voice_addr: SocketAddr,
        token: &str,
        username: &str,
    ) -> ClientResult<()> {
        {
            let mut z = self.inner.zustand.lock();
            if z.state != ClientState::Disconnected {
                return Err(ClientError::BereitsVerbunden);
            }
            z.state = ClientState::Connecting;
        }
        self.emit(EngineEvent::StateChange(ClientState::Connecting));

        match self
            .verbindung_aufbauen(control_addr, voice_addr, token, username)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) => {
                self.inner.zustand.lock().state = ClientState::Disconnected;
                self.emit(EngineEvent::StateChange(ClientState::Disconnected));
                Err(e)
            }
        }
    }

    async fn verbindung_aufbauen(
        &self,
        control_addr: SocketAddr,
        voice_addr: SocketAddr,
        token: &str,
        username: &str,
    ) -> ClientResult<()> {
        let (control, mut leser) = ControlClient::verbinden(control_addr).await?;

        // Auth-Round-Trip
        control
            .senden(&ControlMessage::AuthRequest(
                sprechfunk_protocol::control::AuthRequest {
                    token: token.into(),
                    username: username.into(),
                },
            ))
            .await?;

        let antwort = match read_frame(&mut leser).await? {
            ControlMessage::AuthResponse(r) => r,
            ControlMessage::ErrorResponse(e) => {
                return Err(ClientError::Auth(e.message));
            }
            _ => return Err(ClientError::Verbindung("unerwartete Antwort".into())),
        };

        tracing::info!(
            session = antwort.session_id,
            benutzer = %antwort.username,
            rolle = %antwort.role,
            "Authentifiziert"
        );

        // Chiffre aus der Antwort
        let key = key_from_base64(&antwort.encryption_info.encryption_key)
            .map_err(|e| ClientError::Verbindung(format!("Schluessel: {e}")))?;
        let cipher = VoiceCipher::new(antwort.encryption_info.encryption_method, &key)?;

        let voice = VoiceClient::verbinden(voice_addr, antwort.session_id, cipher).await?;

        let (abbruch_tx, abbruch_rx) = watch::channel(false);
        {
            let mut z = self.inner.zustand.lock();
            z.state = ClientState::Connected;
            z.session_id = antwort.session_id;
            z.username = antwort.username.clone();
            z.role = antwort.role.clone();
            z.channel_id = 0;
            z.channels = antwort.channels.clone();
            z.control = Some(Arc::clone(&control));
            z.voice = Some(Arc::clone(&voice));
            z.abbruch = Some(abbruch_tx);
        }

        // Connected sofort melden; Audio kommt asynchron hinterher
        self.emit(EngineEvent::StateChange(ClientState::Connected));
        self.emit(EngineEvent::ChannelsUpdate(antwort.channels));
        if !antwort.auto_token.is_empty() {
            self.emit(EngineEvent::AutoToken(antwort.auto_token));
        }

        // Control-Empfang
        let engine = self.clone();
        let mut abbruch = abbruch_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    frame = read_frame(&mut leser) => {
                        match frame {
                            Ok(msg) => engine.server_nachricht(msg),
                            Err(e) => {
                                tracing::debug!(fehler = %e, "Control-Verbindung beendet");
                                engine.handle_disconnect("connection lost");
                                break;
                            }
                        }
                    }
                    Ok(()) = abbruch.changed() => {
                        if *abbruch.borrow() {
                            break;
                        }
                    }
                }
            }
        });

        // Voice-Empfang + Wiedergabe
        let (paket_tx, paket_rx) = VoiceClient::eingangs_queue();
        tokio::spawn(Arc::clone(&voice).empfangs_loop(paket_tx, abbruch_rx.clone()));

        let engine = self.clone();
        let voice_fuer_playback = Arc::clone(&voice);
        let abbruch_fuer_playback = abbruch_rx.clone();
        tokio::spawn(async move {
            engine
                .playback_loop(voice_fuer_playback, paket_rx, abbruch_fuer_playback)
                .await;
        });

        // Audio-Geraete asynchron initialisieren, dann Capture starten
        let engine = self.clone();
        tokio::spawn(async move {
            engine.audio_starten(voice, abbruch_rx).await;
        });

        Ok(())
    }

    // -----------------------------------------------------------------------
    // Audio-Pipelines
    // -----------------------------------------------------------------------

    /// Oeffnet Capture- und Playback-Geraete auf einem dedizierten Thread
    /// (cpal-Streams sind nicht Send) und startet danach die Capture-Loop.
    /// Scheitert die Geraete-Initialisierung, laeuft die Engine ohne
    /// Audio weiter.
    async fn audio_starten(&self, voice: Arc<VoiceClient>, abbruch: watch::Receiver<bool>) {
        let (bereit_tx, bereit_rx) =
            tokio::sync::oneshot::channel::<(CaptureConsumer, PlaybackProducer)>();

        let stop = abbruch.clone();
        std::thread::spawn(move || {
            let geoeffnet = (|| -> sprechfunk_audio::AudioResult<_> {
                let eingabe = standard_eingabegeraet()?;
                let (capture_stream, consumer) =
                    open_capture_stream(&eingabe, CaptureConfig::default())?;
                let ausgabe = standard_ausgabegeraet()?;
                let (playback_stream, producer) =
                    open_playback_stream(&ausgabe, PlaybackConfig::default())?;
                Ok((capture_stream, consumer, playback_stream, producer))
            })();

            match geoeffnet {
                Ok((capture_stream, consumer, playback_stream, producer)) => {
                    if bereit_tx.send((consumer, producer)).is_err() {
                        return; // Engine ist schon weg
                    }
                    // Streams leben bis zum Abbruch auf diesem Thread
                    while !*stop.borrow() {
                        std::thread::sleep(Duration::from_millis(100));
                    }
                    drop(capture_stream);
                    drop(playback_stream);
                }
                Err(e) => {
                    tracing::error!(fehler = %e, "Audio-Init fehlgeschlagen (weiter ohne Audio)");
                }
            }
        });

        let Ok((consumer, producer)) = bereit_rx.await else {
            return; // kein Audio verfuegbar
        };
        *self.inner.playback.lock() = Some(producer);

        self.capture_loop(voice, consumer, abbruch).await;
    }

    /// Capture-Loop: 20-ms-Frames -> RMS -> VAD -> Opus -> AEAD -> UDP
    async fn capture_loop(
        &self,
        voice: Arc<VoiceClient>,
        mut consumer: CaptureConsumer,
        mut abbruch: watch::Receiver<bool>,
    ) {
        let mut encoder = match OpusVoiceEncoder::neu() {
            Ok(e) => e,
            Err(e) => {
                tracing::error!(fehler = %e, "Opus-Encoder nicht erstellbar");
                return;
            }
        };

        let mut timestamp: u32 = 0;
        let mut letzte_aktivitaet = false;
        let mut takt = tokio::time::interval(Duration::from_millis(20));

        loop {
            tokio::select! {
                _ = takt.tick() => {}
                Ok(()) = abbruch.changed() => {
                    if *abbruch.borrow() {
                        break;
                    }
                }
            }

            // Alle anliegenden Frames abarbeiten (holt nach Pausen auf)
            while let Some(frame) = frame_entnehmen(&mut consumer) {
                debug_assert_eq!(frame.len(), FRAME_SAMPLES);

                let pegel = rms(&frame);
                self.emit(EngineEvent::Rms(pegel));

                let aktiv = self.inner.vad.lock().process(&frame);
                if aktiv != letzte_aktivitaet {
                    self.emit(EngineEvent::VoiceActivity(aktiv));
                    letzte_aktivitaet = aktiv;
                }

                let (muted, kanal) = {
                    let z = self.inner.zustand.lock();
                    (z.muted, z.channel_id)
                };

                // Inaktiv, gemutet oder ohne Kanal: Zeit laeuft weiter,
                // gesendet wird nichts.
                if !aktiv || muted || kanal == 0 {
                    timestamp = timestamp.wrapping_add(FRAME_SAMPLES as u32);
                    continue;
                }

                match encoder.encode(&frame) {
                    Ok(opus) => {
                        if let Err(e) = voice.voice_senden(&opus, timestamp).await {
                            tracing::debug!(fehler = %e, "Voice-Senden fehlgeschlagen");
                        }
                    }
                    Err(e) => tracing::debug!(fehler = %e, "Opus-Encode fehlgeschlagen"),
                }
                timestamp = timestamp.wrapping_add(FRAME_SAMPLES as u32);
            }
        }
    }

    /// Wiedergabe-Loop: Queue -> entschluesseln -> Jitter -> Opus/PLC
    async fn playback_loop(
        &self,
        voice: Arc<VoiceClient>,
        mut paket_rx: mpsc::Receiver<VoicePacket>,
        mut abbruch: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                paket = paket_rx.recv() => {
                    match paket {
                        Some(p) => self.eingehendes_paket(&voice, p),
                        None => break,
                    }
                }
                Ok(()) = abbruch.changed() => {
                    if *abbruch.borrow() {
                        break;
                    }
                }
            }
        }
    }

    /// Ein empfangenes Voice-Paket durch die Empfangskette schieben
    fn eingehendes_paket(&self, voice: &VoiceClient, paket: VoicePacket) {
        if self.inner.zustand.lock().deafened {
            return;
        }

        // Krypto-Fehler sind stumm: zaehlt als Drop, niemand wird gestoert
        let Ok(opus) = voice.entschluesseln(&paket) else {
            tracing::trace!(session = paket.session_id, "Voice-Entschluesselung fehlgeschlagen");
            return;
        };

        let mut sprecher_map = self.inner.sprecher.lock();
        let sprecher = match sprecher_map.entry(paket.session_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(platz) => match Sprecher::neu() {
                Ok(s) => platz.insert(s),
                Err(e) => {
                    tracing::error!(fehler = %e, "Sprecher-Decoder nicht erstellbar");
                    return;
                }
            },
        };

        sprecher.jitter.push(paket.seq_num, opus);

        loop {
            let pcm = match sprecher.jitter.pop() {
                PopErgebnis::Frame(daten, _) => sprecher.decoder.decode(&daten),
                PopErgebnis::Verloren(_) => sprecher.decoder.decode_plc(),
                PopErgebnis::NochNichtBereit => break,
            };
            match pcm {
                Ok(pcm) => {
                    if let Some(producer) = self.inner.playback.lock().as_mut() {
                        frame_schreiben(producer, &pcm);
                    }
                }
                Err(e) => tracing::debug!(fehler = %e, "Opus-Decode fehlgeschlagen"),
            }
        }
    }

    // -----------------------------------------------------------------------
    // Server-Ereignisse
    // -----------------------------------------------------------------------

    pub(crate) fn server_nachricht(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::ServerStateEvent(ev) => {
                self.inner.zustand.lock().channels = ev.channels.clone();
                self.emit(EngineEvent::ChannelsUpdate(ev.channels));
            }

            ControlMessage::ChannelJoinedEvent(ev) => {
                tracing::info!(benutzer = %ev.user.username, kanal = ev.channel_id, "Benutzer beigetreten");
            }

            ControlMessage::ChannelLeftEvent(ev) => {
                tracing::info!(benutzer = %ev.username, kanal = ev.channel_id, "Benutzer gegangen");
            }

            ControlMessage::ErrorResponse(e) => {
                tracing::error!(code = e.code, meldung = %e.message, "Server-Fehler");
                let terminal = e.code == sprechfunk_protocol::control::error_code::TERMINAL;
                self.emit(EngineEvent::Error(e.message.clone()));
                if terminal {
                    // Kick/Bann: Verbindung ist vom Server aus beendet
                    self.handle_disconnect(&e.message);
                }
            }

            ControlMessage::CreateTokenResponse(r) => {
                self.emit(EngineEvent::TokenCreated(r.token));
            }

            ControlMessage::ChatEvent(ev) => {
                self.emit(EngineEvent::Chat {
                    channel_id: ev.channel_id,
                    sender: ev.sender_name,
                    text: ev.text,
                    timestamp: ev.timestamp,
                });
            }

            ControlMessage::SetUserRoleResponse(r) => {
                self.emit(EngineEvent::RoleChanged {
                    success: r.success,
                    message: r.message,
                });
            }

            ControlMessage::ExportDataResponse(r) => {
                self.emit(EngineEvent::ExportData {
                    data_type: r.r#type,
                    data: r.data,
                });
            }

            ControlMessage::ImportChannelsResponse(r) => {
                self.emit(EngineEvent::ImportResult {
                    success: r.success,
                    message: r.message,
                });
            }

            ControlMessage::Ping(p) => {
                // Server-Keepalive beantworten
                let engine = self.clone();
                tokio::spawn(async move {
                    let _ = engine.senden(ControlMessage::pong(p.timestamp)).await;
                });
            }

            ControlMessage::Pong(_) => {}

            other => {
                tracing::debug!("Unerwartete Server-Nachricht ignoriert: {other:?}");
            }
        }
    }

    // -----------------------------------------------------------------------
    // Operationen
    // -----------------------------------------------------------------------

    async fn senden(&self, msg: ControlMessage) -> ClientResult<()> {
        let control = self
            .inner
            .zustand
            .lock()
            .control
            .clone()
            .ok_or(ClientError::NichtVerbunden)?;
        control.senden(&msg).await
    }

    /// Kanal beitreten
    pub async fn join_channel(&self, channel_id: ChannelId) -> ClientResult<()> {
        self.senden(ControlMessage::JoinChannelRequest(JoinChannelRequest {
            channel_id,
        }))
        .await?;

        let voice = {
            let mut z = self.inner.zustand.lock();
            z.channel_id = channel_id;
            z.voice.clone()
        };
        if let Some(v) = voice {
            v.set_channel(channel_id);
        }
        Ok(())
    }

    /// Aktuellen Kanal verlassen
    pub async fn leave_channel(&self) -> ClientResult<()> {
        self.senden(ControlMessage::LeaveChannelRequest(LeaveChannelRequest {}))
            .await?;
        self.inner.zustand.lock().channel_id = 0;
        Ok(())
    }

    /// Mikrofonstummschaltung setzen und dem Server melden
    pub async fn set_muted(&self, muted: bool) -> ClientResult<()> {
        let deafened = {
            let mut z = self.inner.zustand.lock();
            z.muted = muted;
            z.deafened
        };
        self.senden(ControlMessage::UserStateUpdate(UserStateUpdate {
            muted,
            deafened,
        }))
        .await
    }

    /// Ausgabe-Stummschaltung setzen und dem Server melden
    pub async fn set_deafened(&self, deafened: bool) -> ClientResult<()> {
        let muted = {
            let mut z = self.inner.zustand.lock();
            z.deafened = deafened;
            z.muted
        };
        self.senden(ControlMessage::UserStateUpdate(UserStateUpdate {
            muted,
            deafened,
        }))
        .await
    }

    /// VAD-Schwelle anpassen
    pub fn set_vad_threshold(&self, threshold: f64) {
        self.inner.vad.lock().set_threshold(threshold);
    }

    /// Permanenten Kanal erstellen (admin)
    pub async fn create_channel(
        &self,
        name: &str,
        description: &str,
        max_users: i32,
    ) -> ClientResult<()> {
        self.create_channel_advanced(name, description, max_users, 0, false, false)
            .await
    }

    /// Kanal mit allen Optionen erstellen
    pub async fn create_channel_advanced(
        &self,
        name: &str,
        description: &str,
        max_users: i32,
        parent_id: ChannelId,
        is_temp: bool,
        allow_sub_channels: bool,
    ) -> ClientResult<()> {
        self.senden(ControlMessage::CreateChannelRequest(CreateChannelRequest {
            name: name.into(),
            description: description.into(),
            max_users,
            parent_id,
            is_temp,
            allow_sub_channels,
        }))
        .await
    }

    /// Temporaeren Subkanal unter einem Parent erstellen
    pub async fn create_sub_channel(&self, parent_id: ChannelId, name: &str) -> ClientResult<()> {
        self.create_channel_advanced(name, "", 0, parent_id, true, false)
            .await
    }

    /// Kanal loeschen (admin)
    pub async fn delete_channel(&self, channel_id: ChannelId) -> ClientResult<()> {
        self.senden(ControlMessage::DeleteChannelRequest(DeleteChannelRequest {
            channel_id,
        }))
        .await
    }

    /// Einladungs-Token erstellen (admin); der Rohwert kommt als
    /// `TokenCreated`-Ereignis zurueck.
    pub async fn create_token(
        &self,
        role: &str,
        max_uses: i32,
        expires_in_seconds: i64,
    ) -> ClientResult<()> {
        self.senden(ControlMessage::CreateTokenRequest(CreateTokenRequest {
            role: role.into(),
            channel_scope: 0,
            max_uses,
            expires_in_seconds,
        }))
        .await
    }

    /// Rolle eines Benutzers aendern (admin)
    pub async fn set_user_role(&self, target_user_id: UserId, new_role: &str) -> ClientResult<()> {
        self.senden(ControlMessage::SetUserRoleRequest(SetUserRoleRequest {
            target_user_id,
            new_role: new_role.into(),
        }))
        .await
    }

    /// Benutzer kicken (moderator/admin)
    pub async fn kick_user(&self, user_id: UserId, reason: &str) -> ClientResult<()> {
        self.senden(ControlMessage::KickUserRequest(KickUserRequest {
            user_id,
            reason: reason.into(),
        }))
        .await
    }

    /// Benutzer bannen (admin); 0 Sekunden = permanent
    pub async fn ban_user(
        &self,
        user_id: UserId,
        reason: &str,
        duration_seconds: i64,
    ) -> ClientResult<()> {
        self.senden(ControlMessage::BanUserRequest(
            sprechfunk_protocol::control::BanUserRequest {
                user_id,
                reason: reason.into(),
                duration_seconds,
            },
        ))
        .await
    }

    /// Chat-Nachricht in den aktuellen Kanal senden
    pub async fn send_chat(&self, text: &str) -> ClientResult<()> {
        let channel_id = self.inner.zustand.lock().channel_id;
        if channel_id == 0 {
            return Err(ClientError::KeinKanal);
        }
        self.senden(ControlMessage::ChatMessage(ChatMessage {
            channel_id,
            sender_id: 0,
            sender_name: String::new(),
            text: text.into(),
            timestamp: 0,
        }))
        .await
    }

    /// Server-Export anfordern ("channels" oder "users")
    pub async fn export_data(&self, data_type: &str) -> ClientResult<()> {
        self.senden(ControlMessage::ExportDataRequest(ExportDataRequest {
            r#type: data_type.into(),
        }))
        .await
    }

    /// YAML-Kanalbaum zum Import an den Server schicken
    pub async fn import_channels(&self, yaml: &str) -> ClientResult<()> {
        self.senden(ControlMessage::ImportChannelsRequest(ImportChannelsRequest {
            yaml: yaml.into(),
        }))
        .await
    }

    /// Verbindung trennen
    pub fn disconnect(&self) {
        self.handle_disconnect("user disconnected");
    }

    // -----------------------------------------------------------------------
    // Zustands-Abfragen
    // -----------------------------------------------------------------------

    pub fn state(&self) -> ClientState {
        self.inner.zustand.lock().state
    }

    pub fn username(&self) -> String {
        self.inner.zustand.lock().username.clone()
    }

    pub fn role(&self) -> String {
        self.inner.zustand.lock().role.clone()
    }

    pub fn channel_id(&self) -> ChannelId {
        self.inner.zustand.lock().channel_id
    }

    pub fn session_id(&self) -> u32 {
        self.inner.zustand.lock().session_id
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.inner.zustand.lock().channels.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.inner.zustand.lock().muted
    }

    pub fn is_deafened(&self) -> bool {
        self.inner.zustand.lock().deafened
    }

    // -----------------------------------------------------------------------
    // Trennung
    // -----------------------------------------------------------------------

    pub(crate) fn handle_disconnect(&self, grund: &str) {
        let (control, voice, abbruch) = {
            let mut z = self.inner.zustand.lock();
            if z.state == ClientState::Disconnected {
                return;
            }
            z.state = ClientState::Disconnected;
            z.channel_id = 0;
            (z.control.take(), z.voice.take(), z.abbruch.take())
        };

        // Abbruch-Signal kippt alle Tasks; Sockets schliessen mit den Arcs
        if let Some(tx) = abbruch {
            let _ = tx.send(true);
        }
        drop(control);
        drop(voice);

        self.inner.sprecher.lock().clear();
        *self.inner.playback.lock() = None;

        tracing::info!(grund = %grund, "Getrennt");
        self.emit(EngineEvent::StateChange(ClientState::Disconnected));
        self.emit(EngineEvent::Disconnect(grund.to_string()));
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use sprechfunk_protocol::control::{error_code, ErrorResponse, ServerStateEvent};

    fn verbunden_markieren(engine: &Engine) {
        let mut z = engine.inner.zustand.lock();
        z.state = ClientState::Connected;
    }

    #[tokio::test]
    async fn server_state_aktualisiert_kanaele() {
        let (engine, mut events) = Engine::neu();
        verbunden_markieren(&engine);

        engine.server_nachricht(ControlMessage::ServerStateEvent(ServerStateEvent {
            channels: vec![ChannelInfo {
                id: 1,
                name: "Lobby".into(),
                description: String::new(),
                max_users: 0,
                parent_id: 0,
                is_temp: false,
                allow_sub_channels: true,
                users: vec![],
            }],
        }));

        assert_eq!(engine.channels().len(), 1);
        assert!(matches!(
            events.try_recv().unwrap(),
            EngineEvent::ChannelsUpdate(ch) if ch.len() == 1
        ));
    }

    #[tokio::test]
    async fn terminaler_fehler_trennt_mit_grund() {
        let (engine, mut events) = Engine::neu();
        verbunden_markieren(&engine);

        engine.server_nachricht(ControlMessage::ErrorResponse(ErrorResponse {
            code: error_code::TERMINAL,
            message: "you have been kicked: test".into(),
        }));

        assert_eq!(engine.state(), ClientState::Disconnected);

        let mut gesehen_error = false;
        let mut gesehen_disconnect = false;
        while let Ok(ev) = events.try_recv() {
            match ev {
                EngineEvent::Error(m) => {
                    assert!(m.contains("kicked"));
                    gesehen_error = true;
                }
                EngineEvent::Disconnect(m) => {
                    assert!(m.contains("kicked"));
                    gesehen_disconnect = true;
                }
                _ => {}
            }
        }
        assert!(gesehen_error && gesehen_disconnect);
    }

    #[tokio::test]
    async fn normaler_fehler_trennt_nicht() {
        let (engine, mut events) = Engine::neu();
        verbunden_markieren(&engine);

        engine.server_nachricht(ControlMessage::error(
            error_code::PERMISSION_DENIED,
            "permission denied: kick_user requires higher role",
        ));

        assert_eq!(engine.state(), ClientState::Connected);
        assert!(matches!(events.try_recv().unwrap(), EngineEvent::Error(_)));
        assert!(events.try_recv().is_err(), "kein Disconnect-Ereignis");
    }

    #[tokio::test]
    async fn chat_event_durchgereicht() {
        let (engine, mut events) = Engine::neu();
        verbunden_markieren(&engine);

        engine.server_nachricht(ControlMessage::ChatEvent(ChatMessage {
            channel_id: 1,
            sender_id: 5,
            sender_name: "alice".into(),
            text: "hallo".into(),
            timestamp: 1700000000,
        }));

        match events.try_recv().unwrap() {
            EngineEvent::Chat {
                channel_id,
                sender,
                text,
                timestamp,
            } => {
                assert_eq!(channel_id, 1);
                assert_eq!(sender, "alice");
                assert_eq!(text, "hallo");
                assert_eq!(timestamp, 1700000000);
            }
            other => panic!("unerwartet: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ops_ohne_verbindung_schlagen_fehl() {
        let (engine, _events) = Engine::neu();
        assert!(matches!(
            engine.join_channel(1).await,
            Err(ClientError::NichtVerbunden)
        ));
        assert!(matches!(
            engine.send_chat("x").await,
            Err(ClientError::KeinKanal)
        ));
    }

    #[tokio::test]
    async fn doppeltes_disconnect_ist_idempotent() {
        let (engine, mut events) = Engine::neu();
        verbunden_markieren(&engine);

        engine.disconnect();
        engine.disconnect(); // zweiter Aufruf ist ein No-op

        let mut disconnects = 0;
        while let Ok(ev) = events.try_recv() {
            if matches!(ev, EngineEvent::Disconnect(_)) {
                disconnects += 1;
            }
        }
        assert_eq!(disconnects, 1);
    }
}
