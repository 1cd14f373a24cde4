//! Fleet analytics: heartbeat counters and the activity log folded into one report.

use crate::models::{
    saturating_total, ActionCounts, ActivityRecord, DeviceRecord, DeviceStatus, Liveness,
};
use serde::Serialize;
use std::collections::BTreeMap;

const TOP_PERFORMERS: usize = 3;

/// Running totals over activity records, filled while each ledger is locked.
#[derive(Debug, Default, Clone)]
pub struct ActivityTally {
    total: u64,
    successful: u64,
    by_action: BTreeMap<String, u64>,
}

impl ActivityTally {
    pub fn add(&mut self, record: &ActivityRecord) {
        self.total += 1;
        if record.success {
            self.successful += 1;
        }
        *self.by_action.entry(record.action.clone()).or_default() += 1;
    }
}

#[derive(Debug, Serialize)]
pub struct Analytics {
    pub fleet_overview: FleetOverview,
    pub action_breakdown: ActionBreakdown,
    pub activity_summary: ActivitySummary,
    pub device_details: Vec<DeviceDetail>,
    pub performance_metrics: PerformanceMetrics,
    pub top_performers: Vec<DeviceDetail>,
}

#[derive(Debug, Serialize)]
pub struct FleetOverview {
    pub total_devices: usize,
    pub online_devices: usize,
    pub offline_devices: usize,
    pub total_uptime_hours: f64,
    pub average_uptime_hours: f64,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ActionShare {
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Serialize)]
pub struct ActionBreakdown {
    pub total_actions: u64,
    pub by_action: BTreeMap<String, ActionShare>,
}

#[derive(Debug, Serialize)]
pub struct ActivitySummary {
    pub total_records: u64,
    pub successful_records: u64,
    pub success_percentage: f64,
    pub by_action: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceDetail {
    pub id: String,
    pub name: String,
    pub status: DeviceStatus,
    pub liveness: Liveness,
    pub uptime_hours: f64,
    pub actions_today: ActionCounts,
    pub total_actions: u64,
    pub last_activity: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
}

#[derive(Debug, Serialize)]
pub struct PerformanceMetrics {
    pub avg_actions_per_device: f64,
    pub uptime_percentage: f64,
    pub action_efficiency: f64,
    pub device_health_score: f64,
}

fn ratio(part: f64, whole: f64) -> f64 {
    if whole > 0.0 { part / whole } else { 0.0 }
}

fn percent(part: f64, whole: f64) -> f64 {
    ratio(part, whole) * 100.0
}

fn display_name(id: &str) -> String {
    id.strip_prefix("bot_").unwrap_or(id).to_string()
}

pub fn compute(devices: &[DeviceRecord], tally: &ActivityTally) -> Analytics {
    let total_devices = devices.len();
    let online_devices = devices.iter().filter(|d| d.liveness == Liveness::Online).count();
    let total_uptime: f64 = devices.iter().map(|d| d.uptime_hours).sum();

    let mut per_action: BTreeMap<String, u64> = BTreeMap::new();
    for device in devices {
        for (action, count) in &device.actions_today {
            let total = per_action.entry(action.clone()).or_default();
            *total = total.saturating_add(*count);
        }
    }
    let total_actions = saturating_total(per_action.values());
    let by_action = per_action
        .into_iter()
        .map(|(action, count)| {
            let percentage = percent(count as f64, total_actions as f64);
            (action, ActionShare { count, percentage })
        })
        .collect();

    let mut device_details: Vec<DeviceDetail> = devices
        .iter()
        .map(|d| DeviceDetail {
            id: d.device_id.clone(),
            name: display_name(&d.device_id),
            status: d.status,
            liveness: d.liveness,
            uptime_hours: d.uptime_hours,
            actions_today: d.actions_today.clone(),
            total_actions: d.total_actions(),
            last_activity: d.last_activity_label(),
            cpu_usage: d.cpu_usage,
            memory_usage: d.memory_usage,
        })
        .collect();
    device_details.sort_by(|a, b| {
        b.total_actions
            .cmp(&a.total_actions)
            .then_with(|| a.id.cmp(&b.id))
    });
    let top_performers = device_details.iter().take(TOP_PERFORMERS).cloned().collect();

    let health = percent(online_devices as f64, total_devices as f64);
    Analytics {
        fleet_overview: FleetOverview {
            total_devices,
            online_devices,
            offline_devices: total_devices - online_devices,
            total_uptime_hours: total_uptime,
            average_uptime_hours: ratio(total_uptime, total_devices as f64),
        },
        action_breakdown: ActionBreakdown { total_actions, by_action },
        activity_summary: ActivitySummary {
            total_records: tally.total,
            successful_records: tally.successful,
            success_percentage: percent(tally.successful as f64, tally.total as f64),
            by_action: tally.by_action.clone(),
        },
        device_details,
        performance_metrics: PerformanceMetrics {
            avg_actions_per_device: ratio(total_actions as f64, total_devices as f64),
            uptime_percentage: health,
            action_efficiency: ratio(total_actions as f64, total_uptime),
            device_health_score: health,
        },
        top_performers,
    }
}
