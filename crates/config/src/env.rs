//! Environment variable overrides.
//!
//! Variable names follow the deployment this bridge replaces so existing
//! `.env` files keep working.

use std::path::PathBuf;

use tracing::warn;

use crate::schema::BridgeConfig;

/// Apply overrides from the process environment.
pub fn apply_process_env(config: &mut BridgeConfig) {
    apply_env(config, |name| std::env::var(name).ok());
}

/// Apply overrides using `lookup` to resolve variable names.
///
/// Empty values are treated as unset.
pub fn apply_env(config: &mut BridgeConfig, lookup: impl Fn(&str) -> Option<String>) {
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(port) = get("PORT") {
        match port.trim().parse() {
            Ok(port) => config.server.port = port,
            Err(e) => warn!(value = %port, error = %e, "ignoring invalid PORT"),
        }
    }
    if let Some(dir) = get("SESSION_DIR") {
        config.session.store_dir = PathBuf::from(dir);
    }
    if let Some(url) = get("N8N_INCOMING_URL").or_else(|| get("WEBHOOK_URL")) {
        config.webhook.url = Some(url);
    }
    if let Some(token) = get("WEBHOOK_TOKEN") {
        config.webhook.token = Some(token);
    }
    if let Some(token) = get("SEND_TOKEN") {
        config.send.token = Some(token);
    }
    if let Some(target) = get("UP_PRIVATE") {
        config.announce.private_target = Some(target);
    }
    if let Some(target) = get("UP_GROUP") {
        config.announce.group_target = Some(target);
    }
    if let Some(name) = get("SERVER_NAME").or_else(|| get("APP_NAME")) {
        config.announce.server_name = Some(name);
    }
    if let Some(flag) = get("FALLBACK_TEXT_MENTION") {
        config.routing.fallback_text_mention = !flag.trim().eq_ignore_ascii_case("false");
    }
    if let Some(cmd) = get("WABRIDGE_TRANSPORT_CMD") {
        config.transport.command = Some(cmd);
    }
    if let Some(args) = get("WABRIDGE_TRANSPORT_ARGS") {
        config.transport.args = args.split_whitespace().map(str::to_string).collect();
    }
}
