//! One-shot "server is up" notice sent after the first successful connect.

use std::path::{Path, PathBuf};

use {
    sysinfo::{Disks, System},
    tracing::{info, warn},
};

use wabridge_channels::Jid;

use crate::{clock, send::SendGateway};

/// Host figures included in the boot notice.
#[derive(Debug, Clone, PartialEq)]
pub struct SystemStats {
    pub cpu_cores: usize,
    pub load_one: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    pub storage: Option<(u64, u64)>,
}

impl SystemStats {
    /// Sample the host. Storage is measured on the filesystem holding `path`.
    pub async fn collect(path: PathBuf) -> Self {
        let sampled = tokio::task::spawn_blocking(move || Self::collect_blocking(&path)).await;
        match sampled {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "system stats sampling failed");
                Self {
                    cpu_cores: 1,
                    load_one: 0.0,
                    memory_used: 0,
                    memory_total: 0,
                    storage: None,
                }
            },
        }
    }

    fn collect_blocking(path: &Path) -> Self {
        let sys = System::new_all();
        let storage = storage_for(path);
        if storage.is_none() {
            warn!(path = %path.display(), "failed to read storage stats");
        }
        Self {
            cpu_cores: sys.cpus().len().max(1),
            load_one: System::load_average().one,
            memory_used: sys.used_memory(),
            memory_total: sys.total_memory(),
            storage,
        }
    }
}

/// (used, total) bytes of the disk with the longest mount point containing `path`.
fn storage_for(path: &Path) -> Option<(u64, u64)> {
    let path = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| {
            let total = d.total_space();
            (total.saturating_sub(d.available_space()), total)
        })
}

/// Human-readable byte size: integer from 10 upward (and for plain bytes),
/// two decimals below.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value >= 10.0 || unit == 0 {
        format!("{value:.0} {}", UNITS[unit])
    } else {
        format!("{value:.2} {}", UNITS[unit])
    }
}

pub fn build_status_message(server_name: &str, now_wib: &str, stats: &SystemStats) -> String {
    let mut lines = vec![
        "*Server Up and Running*".to_string(),
        format!("Server : {server_name}"),
        format!("Waktu  : {now_wib} (WIB)"),
        "Status : RUNNING".to_string(),
        format!("CPU    : {} core | load {:.2}", stats.cpu_cores, stats.load_one),
        format!(
            "Memory : {} / {}",
            format_bytes(stats.memory_used),
            format_bytes(stats.memory_total)
        ),
    ];
    if let Some((used, total)) = stats.storage {
        lines.push(format!("Storage: {} / {}", format_bytes(used), format_bytes(total)));
    }
    lines.join("\n")
}

pub struct BootAnnouncer {
    gateway: SendGateway,
    targets: Vec<Jid>,
    server_name: String,
    storage_path: PathBuf,
}

impl BootAnnouncer {
    pub fn new(gateway: SendGateway, targets: Vec<Jid>, server_name: String, storage_path: PathBuf) -> Self {
        Self {
            gateway,
            targets,
            server_name,
            storage_path,
        }
    }

    /// Send the status message to every target. Failures are logged per target.
    pub async fn announce(&self) {
        if self.targets.is_empty() {
            return;
        }
        let stats = SystemStats::collect(self.storage_path.clone()).await;
        let message = build_status_message(&self.server_name, &clock::now_wib(), &stats);
        for target in &self.targets {
            match self.gateway.send_text(target, message.clone()).await {
                Ok(()) => info!(target = %target, "boot announcement sent"),
                Err(e) => warn!(target = %target, error = %e, "boot announcement failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::send::{Jitter, tests::{RecordingSession, ready_conn}},
        std::{sync::Arc, time::Duration},
    };

    #[test]
    fn bytes_formatting() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(1023), "1023 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(10 * 1024), "10 KB");
        assert_eq!(format_bytes(8 * 1024 * 1024 * 1024), "8.00 GB");
        assert_eq!(format_bytes(512 * 1024 * 1024 * 1024), "512 GB");
        assert_eq!(format_bytes(3 * 1024u64.pow(5)), "3.00 PB");
    }

    #[test]
    fn status_message_layout() {
        let stats = SystemStats {
            cpu_cores: 4,
            load_one: 0.5,
            memory_used: 2 * 1024 * 1024 * 1024,
            memory_total: 8 * 1024 * 1024 * 1024,
            storage: Some((20 * 1024 * 1024 * 1024, 100 * 1024 * 1024 * 1024)),
        };
        let msg = build_status_message("srv-1", "17 Okt 2026, 14.05.09", &stats);
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[0], "*Server Up and Running*");
        assert_eq!(lines[1], "Server : srv-1");
        assert_eq!(lines[2], "Waktu  : 17 Okt 2026, 14.05.09 (WIB)");
        assert_eq!(lines[3], "Status : RUNNING");
        assert_eq!(lines[4], "CPU    : 4 core | load 0.50");
        assert_eq!(lines[5], "Memory : 2.00 GB / 8.00 GB");
        assert_eq!(lines[6], "Storage: 20 GB / 100 GB");
    }

    #[test]
    fn storage_line_is_optional() {
        let stats = SystemStats {
            cpu_cores: 1,
            load_one: 0.0,
            memory_used: 0,
            memory_total: 0,
            storage: None,
        };
        assert!(!build_status_message("s", "t", &stats).contains("Storage"));
    }

    #[tokio::test]
    async fn announces_to_every_target() {
        let session = Arc::new(RecordingSession::default());
        let conn = ready_conn(session.clone()).await;
        let gateway = SendGateway::new(conn, Duration::from_secs(1), Jitter::none());
        let announcer = BootAnnouncer::new(
            gateway,
            vec![Jid::from("62811@s.whatsapp.net"), Jid::from("1203@g.us")],
            "srv".into(),
            std::env::temp_dir(),
        );
        announcer.announce().await;

        let sent = session.sent.lock().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1].0, Jid::from("1203@g.us"));
    }
}
