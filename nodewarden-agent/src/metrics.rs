//! Lightweight system sampling for the heartbeat payload
//!
//! Keeps the payload keys stable (cpu, ram, disk, uptime, uptime_sec);
//! the kernel treats them as opaque and only the views render them.

use serde::Serialize;
use sysinfo::{Disks, System};

/// One stats snapshot, sent with every heartbeat
#[derive(Debug, Clone, Serialize)]
pub struct NodeStats {
    pub cpu: f32,
    pub ram: f32,
    pub disk: f32,
    pub uptime: String,
    pub uptime_sec: u64,
}

impl NodeStats {
    /// Sample from a persistent `System`: CPU usage needs the previous
    /// refresh as a baseline, so the caller keeps one across cycles
    pub fn sample(sys: &mut System) -> Self {
        sys.refresh_cpu_usage();
        sys.refresh_memory();

        let cpu = sys.global_cpu_info().cpu_usage();

        let total = sys.total_memory();
        let ram = if total > 0 {
            (sys.used_memory() as f32 / total as f32) * 100.0
        } else {
            0.0
        };

        let uptime_sec = System::uptime();

        Self {
            cpu,
            ram,
            disk: root_disk_percent(),
            uptime: format_uptime(uptime_sec),
            uptime_sec,
        }
    }
}

/// Usage of the root filesystem (largest disk as fallback)
fn root_disk_percent() -> f32 {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .find(|d| d.mount_point() == std::path::Path::new("/"))
        .or_else(|| disks.iter().max_by_key(|d| d.total_space()));

    match disk {
        Some(d) if d.total_space() > 0 => {
            let used = d.total_space() - d.available_space();
            (used as f32 / d.total_space() as f32) * 100.0
        }
        _ => 0.0,
    }
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3_600;
    let minutes = (secs % 3_600) / 60;
    format!("{days}d {hours}h {minutes}m")
}
