use {anyhow::Result, tracing::info};

use {wabridge_config::BridgeConfig, wabridge_whatsapp::CredentialStore};

/// Wipe the credential store while the bridge is not running.
pub async fn reset_session(config: &BridgeConfig) -> Result<()> {
    let store = CredentialStore::new(&config.session.store_dir);
    store.reset().await?;
    info!(dir = %store.dir().display(), "session credentials removed");
    println!(
        "Session cleared at {}. Start the bridge and open /qr to pair again.",
        store.dir().display()
    );
    Ok(())
}
