use std::sync::Mutex;

use shared::{MemoryReport, MemoryStatus};
use sysinfo::{Pid, ProcessesToUpdate, System};
use uuid::Uuid;

use crate::config::MemoryConfig;

const MB: f64 = 1024.0 * 1024.0;

pub fn memory_status(rss_mb: f64, ceiling_mb: f64, critical_mb: f64) -> MemoryStatus {
    if rss_mb > critical_mb {
        MemoryStatus::Critical
    } else if rss_mb > ceiling_mb {
        MemoryStatus::Warning
    } else {
        MemoryStatus::Normal
    }
}

/// Releases a request's buffers as soon as its result exists and checks the
/// resident set against the memory ceiling.
pub struct ResourceReclaimer {
    ceiling_mb: f64,
    critical_mb: f64,
    pid: Option<Pid>,
    system: Mutex<System>,
}

impl ResourceReclaimer {
    pub fn new(config: &MemoryConfig) -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| log::warn!("Process memory sampling disabled: {}", e))
            .ok();
        Self {
            ceiling_mb: config.ceiling_mb,
            critical_mb: config.critical_mb,
            pid,
            system: Mutex::new(System::new()),
        }
    }

    pub fn sample(&self) -> MemoryReport {
        let rss_bytes = self.pid.and_then(|pid| {
            let mut system = match self.system.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
            system.process(pid).map(|process| process.memory())
        });

        match rss_bytes {
            Some(bytes) => {
                let rss_mb = bytes as f64 / MB;
                MemoryReport {
                    status: memory_status(rss_mb, self.ceiling_mb, self.critical_mb),
                    rss_mb: shared::round2(rss_mb),
                    threshold_mb: self.ceiling_mb,
                    critical_mb: self.critical_mb,
                }
            }
            None => MemoryReport {
                status: MemoryStatus::Unavailable,
                rss_mb: 0.0,
                threshold_mb: self.ceiling_mb,
                critical_mb: self.critical_mb,
            },
        }
    }

    /// Drops everything the request still owns, then samples memory.
    pub fn reclaim<T>(&self, request_id: Uuid, buffers: T) -> MemoryReport {
        drop(buffers);
        let report = self.sample();
        match report.status {
            MemoryStatus::Critical => log::error!(
                "[{}] Resident memory {:.1} MB above critical limit {:.0} MB",
                request_id,
                report.rss_mb,
                report.critical_mb
            ),
            MemoryStatus::Warning => log::warn!(
                "[{}] Resident memory {:.1} MB above ceiling {:.0} MB",
                request_id,
                report.rss_mb,
                report.threshold_mb
            ),
            _ => log::debug!("[{}] Resident memory {:.1} MB", request_id, report.rss_mb),
        }
        report
    }
}
