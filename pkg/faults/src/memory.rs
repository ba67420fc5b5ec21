use sysinfo::{ProcessRefreshKind, ProcessesToUpdate, System};

use crate::buffer::BYTES_PER_MB;

/// Point-in-time memory counters for this process and its host.
///
/// `used_bytes` is the process resident set; `max_bytes` is the cgroup limit
/// when one is set, otherwise the host total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemorySnapshot {
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub total_bytes: u64,
    pub max_bytes: u64,
}

impl MemorySnapshot {
    pub fn used_mb(&self) -> u64 {
        self.used_bytes / BYTES_PER_MB as u64
    }

    pub fn free_mb(&self) -> u64 {
        self.free_bytes / BYTES_PER_MB as u64
    }

    pub fn total_mb(&self) -> u64 {
        self.total_bytes / BYTES_PER_MB as u64
    }

    pub fn max_mb(&self) -> u64 {
        self.max_bytes / BYTES_PER_MB as u64
    }

    pub fn usage_percent(&self) -> u64 {
        if self.max_bytes == 0 {
            return 0;
        }
        (u128::from(self.used_bytes) * 100 / u128::from(self.max_bytes)) as u64
    }
}

pub fn sample() -> MemorySnapshot {
    let mut system = System::new();
    system.refresh_memory();

    let mut used_bytes = 0;
    if let Ok(pid) = sysinfo::get_current_pid() {
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[pid]),
            true,
            ProcessRefreshKind::nothing().with_memory(),
        );
        used_bytes = system.process(pid).map_or(0, |process| process.memory());
    }

    let total_bytes = system.total_memory();
    let (max_bytes, free_bytes) = match system.cgroup_limits() {
        Some(limits) if limits.total_memory > 0 && limits.total_memory < total_bytes => {
            (limits.total_memory, limits.free_memory)
        }
        _ => (total_bytes, system.available_memory()),
    };

    MemorySnapshot {
        used_bytes,
        free_bytes,
        total_bytes,
        max_bytes,
    }
}
