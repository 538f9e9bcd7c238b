//! Command router: the per-user state machine and device dispatcher.
//!
//! Consumes normalized inbound text (or a button/list selection id) plus the
//! user's session state, decides the action, mutates the session, and either
//! dispatches a device command to the broker or issues a direct reply. All
//! replies go through the send queue, so the router never blocks on a
//! disconnected chat transport.

use crate::config::Config;
use crate::device::{Device, DeviceCommand, SwitchAction};
use crate::extract::{extract_text, normalize_command};
use crate::lifecycle::ConnectionReadiness;
use crate::queue::{OutboundTask, SendQueue};
use crate::session::{Expectation, SessionMode, SessionState, SessionStore};
use crate::transport::{BrokerPublisher, ChatTransport, InboundMessage, STATUS_BROADCAST};
use std::sync::Arc;

/// Greeting/menu keywords recognized from the idle state.
const GREETINGS: [&str; 5] = ["menu", "mulai", "halo", "hi", "p"];

/// User-visible reply texts. Kept byte-compatible with the deployed bot,
/// including its Indonesian phrasing and emoji markers.
pub mod texts {
    use crate::device::{Device, DeviceCommand};

    pub fn main_menu(name: &str, passphrase: &str) -> String {
        format!(
            "👋 Halo {name}!\nSelamat datang di Bot Smart Home Skariga. Pilih mode interaksi:\n\n\
             1. Chat Biasa\n2. Kontrol IoT\n\n\
             Ketik nomor (1/2) atau ketik \"menu\" lagi. \
             Jika ingin kirim perintah cepat gunakan passphrase, contoh:\n\"{passphrase} lampu1 on\""
        )
    }

    pub fn iot_menu(passphrase: &str) -> String {
        let mut out = String::from("Kontrol Perangkat IoT:\n\n");
        let rows = [
            ("Lampu 1", Device::Lampu1),
            ("Lampu 2", Device::Lampu2),
            ("Stop Kontak 1", Device::Stopkontak1),
            ("Stop Kontak 2", Device::Stopkontak2),
        ];
        let mut idx = 1;
        for (label, device) in rows {
            out.push_str(&format!(
                "{idx}. {label} ON  -> {passphrase} {device} on\n"
            ));
            idx += 1;
            out.push_str(&format!(
                "{idx}. {label} OFF -> {passphrase} {device} off\n"
            ));
            idx += 1;
        }
        out.push_str(&format!("\nKetik contoh: \"{passphrase} lampu1 on\""));
        out
    }

    pub fn iot_manual_instructions(passphrase: &str) -> String {
        format!(
            "Kontrol IoT - Mode Manual\n\
             Tolong ketik perintah lengkap: <device> <on|off>\n\
             Contoh: \"lampu1 on\" atau gunakan passphrase: \"{passphrase} lampu1 on\"\n\
             Daftar device: lampu1, lampu2, stopkontak1, stopkontak2\n\n\
             Perintah tambahan: ketik \"kembali\" untuk lihat daftar device lagi, \
             atau \"keluar\" untuk kembali ke menu utama."
        )
    }

    pub fn device_list(passphrase: &str) -> String {
        let mut out = String::from("Daftar device:\n");
        for device in Device::ALL {
            out.push_str(&format!("- {device}\n"));
        }
        out.push_str(&format!(
            "\nKetik perintah lengkap: \"lampu1 on\" atau \"{passphrase} lampu1 on\""
        ));
        out
    }

    pub fn chat_mode() -> String {
        "Mode Chat Biasa Aktif. Ketik \"menu\" utk kembali.".to_owned()
    }

    pub fn exit_iot() -> String {
        "Keluar dari mode Kontrol IoT. Kembali ke menu utama.".to_owned()
    }

    pub fn format_correction(passphrase: &str) -> String {
        format!(
            "Perintah tidak dikenali. Format yg valid: \"lampu1 on\" atau \
             \"{passphrase} lampu1 on\". Ketik \"kembali\" atau \"keluar\"."
        )
    }

    pub fn command_hint() -> String {
        "Ketik perintah lain, atau ketik \"kembali\" untuk lihat daftar device, \
         ketik \"keluar\" utk kembali ke menu."
            .to_owned()
    }

    pub fn ping() -> String {
        "Pong! 🏓".to_owned()
    }

    pub fn status(chat_ready: bool, broker_ready: bool) -> String {
        let word = |ready: bool| if ready { "Terhubung" } else { "Terputus" };
        format!(
            "Status Koneksi:\n- WhatsApp: {}\n- MQTT Broker: {}",
            word(chat_ready),
            word(broker_ready)
        )
    }

    pub fn echo(name: &str, text: &str) -> String {
        format!("Hai {name}! Pesan Anda \"{text}\" diterima. Ketik \"menu\" utk opsi. 🤖")
    }

    pub fn passphrase_format(passphrase: &str) -> String {
        format!("Format passphrase salah. Contoh: \"{passphrase} lampu1 on\"")
    }

    pub fn unknown_device(token: &str) -> String {
        format!(
            "Channel \"{token}\" tdk dikenal. Tersedia: lampu1, lampu2, stopkontak1, stopkontak2."
        )
    }

    pub fn invalid_action(token: &str) -> String {
        format!("Aksi \"{token}\" tdk valid. Gunakan \"on\" atau \"off\".")
    }

    pub fn passphrase_ok(command: DeviceCommand) -> String {
        format!(
            "✅ OK, perintah \"{} {}\" terkirim.",
            command.device, command.action
        )
    }

    pub fn passphrase_failed(command: DeviceCommand) -> String {
        format!(
            "❌ Gagal kirim perintah \"{} {}\".",
            command.device, command.action
        )
    }

    pub fn manual_ok(command: DeviceCommand) -> String {
        format!(
            "✅ Perintah {} {} terkirim.",
            command.device, command.action
        )
    }

    pub fn manual_failed(device: Device) -> String {
        format!("❌ Gagal kirim perintah ke {device}.")
    }

    pub fn broker_not_connected() -> String {
        "⚠️ Gagal mengirim perintah: Tdk terhubung ke server IoT.".to_owned()
    }

    pub fn selection_ok(display: &str) -> String {
        format!("✅ Perintah \"{display}\" terkirim!")
    }

    pub fn unknown_selection(display: &str) -> String {
        format!("Maaf, tombol \"{display}\" blm saya kenali.")
    }
}

async fn reply(queue: &mut SendQueue, chat: &dyn ChatTransport, to: &str, text: String) {
    queue
        .enqueue(
            chat,
            OutboundTask {
                to: to.to_owned(),
                text,
            },
        )
        .await;
}

/// Map an `iot_<device>_<action>` selection id to a device command.
fn parse_selection_command(id: &str) -> Option<DeviceCommand> {
    let rest = id.strip_prefix("iot_")?;
    let (device, action) = rest.rsplit_once('_')?;
    Some(DeviceCommand {
        device: Device::parse(device)?,
        action: SwitchAction::parse(action)?,
    })
}

/// The command router. Owns the session store; transports are injected per
/// call so the single bridge task keeps exclusive mutable access.
pub struct Router<S> {
    config: Arc<Config>,
    sessions: S,
}

impl<S: SessionStore> Router<S> {
    pub fn new(config: Arc<Config>, sessions: S) -> Self {
        Self { config, sessions }
    }

    /// Handle one inbound message end to end. Runs to completion before the
    /// bridge picks up the next event, so within one message the reply
    /// sequence is preserved.
    pub async fn handle_message(
        &mut self,
        message: &InboundMessage,
        own_id: Option<&str>,
        readiness: ConnectionReadiness,
        broker: &dyn BrokerPublisher,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) {
        if message.sender == STATUS_BROADCAST {
            return;
        }
        // Self-originated messages count as incoming only in the self-chat.
        if message.from_me && own_id != Some(message.sender.as_str()) {
            tracing::debug!("skipping self-originated message outside self-chat");
            return;
        }

        let jid = message.sender.as_str();
        let name = message.push_name.as_deref().unwrap_or("Pengguna");

        let raw = extract_text(&message.payload);
        let text = raw.as_deref().map(normalize_command).unwrap_or_default();
        let selection = message.payload.selection_id();

        if text.is_empty() && selection.is_none() {
            tracing::debug!("no extractable text in message from {jid}; skipping");
            return;
        }
        tracing::info!("inbound from {name} ({jid}): \"{text}\"");

        if let Some(id) = selection {
            let id = id.to_owned();
            self.handle_selection(&id, &text, jid, broker, chat, queue)
                .await;
            return;
        }

        self.handle_text(&text, jid, name, readiness, broker, chat, queue)
            .await;
    }

    /// Button/list/template replies carry an opaque selection id mapped to
    /// the same menu and device actions as the text grammar.
    async fn handle_selection(
        &mut self,
        id: &str,
        display: &str,
        jid: &str,
        broker: &dyn BrokerPublisher,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) {
        let display_text = display;
        tracing::info!("selection from {jid}: id \"{id}\", text \"{display_text}\"");
        match id {
            "id_chat_biasa" => {
                reply(queue, chat, jid, texts::chat_mode()).await;
            }
            "id_menu_iot" => {
                reply(queue, chat, jid, texts::iot_menu(&self.config.passphrase)).await;
            }
            _ => {
                if let Some(command) = parse_selection_command(id) {
                    let ok = self.dispatch(command, jid, broker, chat, queue).await;
                    let text = if ok {
                        texts::selection_ok(display)
                    } else {
                        texts::manual_failed(command.device)
                    };
                    reply(queue, chat, jid, text).await;
                } else {
                    tracing::warn!("unrecognized selection id \"{id}\"");
                    reply(queue, chat, jid, texts::unknown_selection(display)).await;
                }
            }
        }
    }

    async fn handle_text(
        &mut self,
        text: &str,
        jid: &str,
        name: &str,
        readiness: ConnectionReadiness,
        broker: &dyn BrokerPublisher,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) {
        if GREETINGS.contains(&text) {
            reply(
                queue,
                chat,
                jid,
                texts::main_menu(name, &self.config.passphrase),
            )
            .await;
            return;
        }

        if text == "1" {
            reply(queue, chat, jid, texts::chat_mode()).await;
            self.sessions.set(jid, SessionState::chat());
            return;
        }

        if text == "2" {
            reply(
                queue,
                chat,
                jid,
                texts::iot_manual_instructions(&self.config.passphrase),
            )
            .await;
            self.sessions.set(jid, SessionState::iot_manual());
            return;
        }

        if let Some(rest) = text.strip_prefix(self.config.passphrase.as_str()) {
            let rest = rest.to_owned();
            self.handle_passphrase(&rest, jid, broker, chat, queue).await;
            return;
        }

        // Diagnostics work in any state, including mid-flow.
        if text == "ping" {
            reply(queue, chat, jid, texts::ping()).await;
            return;
        }
        if text == "status" {
            reply(queue, chat, jid, texts::status(readiness.chat, readiness.broker)).await;
            return;
        }

        let in_iot_manual = matches!(
            self.sessions.get(jid),
            Some(state)
                if state.mode == SessionMode::IotManual
                    && state.expecting == Some(Expectation::IotManual)
        );
        if in_iot_manual {
            self.handle_iot_manual(text, jid, name, broker, chat, queue)
                .await;
            return;
        }

        reply(queue, chat, jid, texts::echo(name, text)).await;
    }

    /// The passphrase command is an any-state shortcut:
    /// `<passphrase> <device> <on|off>`.
    async fn handle_passphrase(
        &mut self,
        rest: &str,
        jid: &str,
        broker: &dyn BrokerPublisher,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) {
        let parts: Vec<&str> = rest.split_whitespace().collect();
        let [device_token, action_token] = parts.as_slice() else {
            reply(
                queue,
                chat,
                jid,
                texts::passphrase_format(&self.config.passphrase),
            )
            .await;
            return;
        };

        let Some(action) = SwitchAction::parse(action_token) else {
            reply(
                queue,
                chat,
                jid,
                texts::invalid_action(&action_token.to_uppercase()),
            )
            .await;
            return;
        };
        let Some(device) = Device::parse(device_token) else {
            reply(queue, chat, jid, texts::unknown_device(device_token)).await;
            return;
        };

        let command = DeviceCommand { device, action };
        tracing::info!("[passphrase] device: {device}, action: {action}");
        let ok = self.dispatch(command, jid, broker, chat, queue).await;
        let text = if ok {
            texts::passphrase_ok(command)
        } else {
            texts::passphrase_failed(command)
        };
        reply(queue, chat, jid, text).await;
    }

    /// Manual IoT flow: full `<device> <on|off>` commands plus the
    /// `kembali`/`list` and `keluar`/`exit` keywords.
    async fn handle_iot_manual(
        &mut self,
        text: &str,
        jid: &str,
        name: &str,
        broker: &dyn BrokerPublisher,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) {
        if text == "kembali" || text == "list" {
            reply(queue, chat, jid, texts::device_list(&self.config.passphrase)).await;
            return;
        }

        if text == "keluar" || text == "exit" {
            reply(queue, chat, jid, texts::exit_iot()).await;
            self.sessions.delete(jid);
            reply(
                queue,
                chat,
                jid,
                texts::main_menu(name, &self.config.passphrase),
            )
            .await;
            return;
        }

        if let Some(command) = DeviceCommand::parse(text) {
            let ok = self.dispatch(command, jid, broker, chat, queue).await;
            let outcome = if ok {
                texts::manual_ok(command)
            } else {
                texts::manual_failed(command.device)
            };
            reply(queue, chat, jid, outcome).await;
            // Stay in manual mode; remind the user how to leave.
            reply(queue, chat, jid, texts::command_hint()).await;
            return;
        }

        reply(
            queue,
            chat,
            jid,
            texts::format_correction(&self.config.passphrase),
        )
        .await;
    }

    /// Device command dispatcher: topic lookup, publish, outcome. The topic
    /// lookup is total over validated input; transport internals never reach
    /// the user, only the log.
    async fn dispatch(
        &self,
        command: DeviceCommand,
        jid: &str,
        broker: &dyn BrokerPublisher,
        chat: &dyn ChatTransport,
        queue: &mut SendQueue,
    ) -> bool {
        let topic = self.config.topic(command.device);

        if !broker.is_connected() {
            tracing::warn!(
                "broker not connected; command for {} not sent",
                command.device
            );
            reply(queue, chat, jid, texts::broker_not_connected()).await;
            return false;
        }

        tracing::info!("[publish] topic: {topic}, payload: {}", command.action);
        match broker.publish(topic, command.action.payload()).await {
            Ok(()) => true,
            Err(err) => {
                tracing::error!("failed to publish to {topic}: {err}");
                false
            }
        }
    }
}
