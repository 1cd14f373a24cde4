use crate::registry::DeviceRegistry;
use serde::Serialize;
use std::time::Instant;

#[derive(Debug, Serialize)]
pub struct KernelHealth {
    pub uptime_seconds: u64,
    pub devices_tracked: usize,
    pub online_devices: usize,
    pub commands_pending: usize,
    pub commands_delivered: u64,
    pub activity_records: usize,
    pub memory_usage_mb: f32,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self { start_time: Instant::now() }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    pub fn get_health(&self, registry: &DeviceRegistry) -> KernelHealth {
        let counters = registry.counters();
        KernelHealth {
            uptime_seconds: self.uptime_seconds(),
            devices_tracked: counters.devices_tracked,
            online_devices: counters.online_devices,
            commands_pending: counters.commands_pending,
            commands_delivered: counters.commands_delivered,
            activity_records: counters.activity_records,
            memory_usage_mb: get_memory_usage_mb(),
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Resident set size from /proc; 0 where unavailable.
fn get_memory_usage_mb() -> f32 {
    #[cfg(target_os = "linux")]
    {
        if let Ok(status) = std::fs::read_to_string("/proc/self/status") {
            if let Some(kb) = parse_vm_rss_kb(&status) {
                return kb as f32 / 1024.0;
            }
        }
    }
    0.0
}

fn parse_vm_rss_kb(status: &str) -> Option<u64> {
    status
        .lines()
        .find(|line| line.starts_with("VmRSS:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|kb| kb.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KernelConfig;
    use crate::models::{CommandKind, HeartbeatIn};

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tfleet-kernel\nVmPeak:\t  9000 kB\nVmRSS:\t  2048 kB\n";
        assert_eq!(parse_vm_rss_kb(status), Some(2048));
        assert_eq!(parse_vm_rss_kb("Name: x\n"), None);
    }

    #[test]
    fn test_health_reflects_registry_counters() {
        let registry = DeviceRegistry::new(&KernelConfig::default());
        registry.record_heartbeat("bot_a", HeartbeatIn::default());
        registry.enqueue_command("bot_a", CommandKind::Stop, serde_json::json!({}));
        registry.enqueue_command("bot_b", CommandKind::Stop, serde_json::json!({}));
        registry.fetch_pending_commands("bot_b");

        let health = HealthTracker::new().get_health(&registry);
        assert_eq!(health.devices_tracked, 1);
        assert_eq!(health.online_devices, 1);
        assert_eq!(health.commands_pending, 1);
        assert_eq!(health.commands_delivered, 1);
        assert!(health.memory_usage_mb >= 0.0);
    }
}
