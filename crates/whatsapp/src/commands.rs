//! Chat command table and reply texts.

use wabridge_channels::Jid;

/// Text split into a lowercase command token and the untouched remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCommand {
    pub conversation_id: Jid,
    pub command_token: String,
    pub argument_text: String,
}

impl NormalizedCommand {
    pub fn parse(conversation_id: Jid, text: &str) -> Self {
        let text = text.trim();
        let (token, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));
        Self {
            conversation_id,
            command_token: token.to_lowercase(),
            argument_text: rest.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ping,
    Menu,
    Info,
    Time,
    Id,
    Echo(String),
    Photo(String),
}

impl Command {
    /// Match a normalized command against the table. Single-word commands
    /// only match when nothing follows them.
    pub fn from_normalized(cmd: &NormalizedCommand) -> Option<Self> {
        let arg = cmd.argument_text.as_str();
        let bare = arg.is_empty();
        match cmd.command_token.as_str() {
            "ping" if bare => Some(Self::Ping),
            "menu" | "help" | "!help" if bare => Some(Self::Menu),
            "info" if bare => Some(Self::Info),
            "waktu" if bare => Some(Self::Time),
            "id" if bare => Some(Self::Id),
            "balas" if !bare => Some(Self::Echo(arg.to_string())),
            "foto" if !bare => Some(Self::Photo(arg.to_string())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ping => "ping",
            Self::Menu => "menu",
            Self::Info => "info",
            Self::Time => "waktu",
            Self::Id => "id",
            Self::Echo(_) => "balas",
            Self::Photo(_) => "foto",
        }
    }
}

// ── Replies ─────────────────────────────────────────────────────────────────

pub const PONG: &str = "pong";

pub const MENU_TEXT: &str = "📋 *Menu Perintah*\n\
- `ping` → tes bot\n\
- `info` → info singkat\n\
- `waktu` → jam server\n\
- `id` → JID kamu\n\
- `balas <teks>` → bot membalas teks\n\
- `foto <url>` → kirim gambar dari URL\n\
\n\
Catatan: di *grup*, bot hanya merespons jika *di-mention*.";

pub const INVALID_URL_TEXT: &str = "❌ URL tidak valid. Contoh: foto https://picsum.photos/600";

pub fn info_text(display_name: Option<&str>) -> String {
    let name = display_name.filter(|n| !n.trim().is_empty()).unwrap_or("teman");
    format!(
        "👋 Hai *{name}*!\nBot ini berjalan pakai WhatsApp Web.\nKetik *menu* untuk lihat perintah."
    )
}

pub fn time_text(now_wib: &str) -> String {
    format!("⏰ {now_wib} (WIB)")
}

pub fn id_text(sender: &Jid) -> String {
    format!("🆔 JID kamu: {sender}")
}

pub fn photo_caption(url: &str) -> String {
    format!("📷 dari URL: {url}")
}

pub fn fetch_failed_text(reason: &str) -> String {
    format!("❌ Gagal ambil gambar: {reason}")
}

/// Whether `url` is an absolute http(s) URL.
pub fn is_http_url(url: &str) -> bool {
    match reqwest::Url::parse(url) {
        Ok(parsed) => matches!(parsed.scheme(), "http" | "https") && parsed.has_host(),
        Err(_) => false,
    }
}
