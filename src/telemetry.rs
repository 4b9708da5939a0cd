//! Host resource figures reported verbatim inside `ServerInfo`.

use serde::{Deserialize, Serialize};
use sysinfo::System;

/// Memory/CPU snapshot of the host running the server.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ResourceUsage {
    pub total_memory_bytes: u64,
    pub used_memory_bytes: u64,
    pub cpu_usage_percent: f32,
}

/// Collect current memory and CPU figures from sysinfo.
pub fn collect() -> ResourceUsage {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.refresh_cpu_usage();

    let cpu_usage_percent = if sys.cpus().is_empty() {
        0.0
    } else {
        sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / sys.cpus().len() as f32
    };

    ResourceUsage {
        total_memory_bytes: sys.total_memory(),
        used_memory_bytes: sys.used_memory(),
        cpu_usage_percent,
    }
}
