use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

/// Action name -> count, as reported by a device for the current day.
pub type ActionCounts = BTreeMap<String, u64>;

/// Sum of reported counts, pinned at `u64::MAX`.
pub fn saturating_total<'a>(counts: impl IntoIterator<Item = &'a u64>) -> u64 {
    counts.into_iter().fold(0u64, |acc, c| acc.saturating_add(*c))
}

pub fn rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_default()
}

/// Run state reported by the device itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Running,
    Stopped,
    #[serde(other)]
    Unknown,
}

/// Liveness as judged by the kernel from heartbeat age.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    Online,
    Offline,
}

// Body of POST /api/device/{id}/heartbeat. Every field is optional on the wire.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct HeartbeatIn {
    pub uptime_hours: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub actions_today: ActionCounts,
    pub status: Option<DeviceStatus>,
    pub next_scheduled: Option<String>,
    pub content_version: Option<String>,
    #[serde(alias = "twitter_logged_in")]
    pub logged_in: bool,
}

// Body of POST /api/device/{id}/activity.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActivityIn {
    pub action: Option<String>,
    pub success: bool,
    pub details: String,
    pub content_preview: String,
}

#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub device_id: String,
    pub status: DeviceStatus,
    pub liveness: Liveness,
    pub last_seen: OffsetDateTime,
    pub uptime_hours: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub actions_today: ActionCounts,
    pub next_scheduled: Option<String>,
    pub content_version: String,
    pub logged_in: bool,
    pub last_activity: Option<OffsetDateTime>,
}

impl DeviceRecord {
    pub fn from_heartbeat(
        device_id: &str,
        hb: HeartbeatIn,
        last_activity: Option<OffsetDateTime>,
        now: OffsetDateTime,
    ) -> Self {
        Self {
            device_id: device_id.to_string(),
            status: hb.status.unwrap_or_default(),
            liveness: Liveness::Online,
            last_seen: now,
            uptime_hours: hb.uptime_hours,
            cpu_usage: hb.cpu_usage,
            memory_usage: hb.memory_usage,
            actions_today: hb.actions_today,
            next_scheduled: hb.next_scheduled,
            content_version: hb.content_version.unwrap_or_else(|| "unknown".into()),
            logged_in: hb.logged_in,
            last_activity,
        }
    }

    pub fn total_actions(&self) -> u64 {
        saturating_total(self.actions_today.values())
    }

    pub fn last_activity_label(&self) -> String {
        self.last_activity
            .map(rfc3339)
            .unwrap_or_else(|| "Never".to_string())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceView {
    pub device_id: String,
    pub status: DeviceStatus,
    pub liveness: Liveness,
    pub last_seen: String,
    pub seen_seconds_ago: i64,
    pub uptime_hours: f64,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub actions_today: ActionCounts,
    pub next_scheduled: Option<String>,
    pub content_version: String,
    pub logged_in: bool,
    pub last_activity: String,
}

pub fn to_view(d: &DeviceRecord, now: OffsetDateTime) -> DeviceView {
    DeviceView {
        device_id: d.device_id.clone(),
        status: d.status,
        liveness: d.liveness,
        last_seen: rfc3339(d.last_seen),
        seen_seconds_ago: (now - d.last_seen).whole_seconds().max(0),
        uptime_hours: d.uptime_hours,
        cpu_usage: d.cpu_usage,
        memory_usage: d.memory_usage,
        actions_today: d.actions_today.clone(),
        next_scheduled: d.next_scheduled.clone(),
        content_version: d.content_version.clone(),
        logged_in: d.logged_in,
        last_activity: d.last_activity_label(),
    }
}

/// Instruction kinds understood by devices. The wire names are the ones the
/// bots already poll for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    #[serde(rename = "stop_bot")]
    Stop,
    #[serde(rename = "restart_bot")]
    Restart,
    #[serde(rename = "emergency_stop")]
    EmergencyStop,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Stop => "stop_bot",
            CommandKind::Restart => "restart_bot",
            CommandKind::EmergencyStop => "emergency_stop",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub command_id: String,
    pub action: CommandKind,
    pub parameters: serde_json::Value,
    pub timestamp: String,
}

impl Command {
    pub fn new(action: CommandKind, parameters: serde_json::Value, now: OffsetDateTime) -> Self {
        // devices expect an object, never null
        let parameters = if parameters.is_object() {
            parameters
        } else {
            serde_json::Value::Object(Default::default())
        };
        Self {
            command_id: Uuid::new_v4().to_string(),
            action,
            parameters,
            timestamp: rfc3339(now),
        }
    }
}

/// Immutable once built; the ledger only ever appends these.
#[derive(Debug, Clone)]
pub struct ActivityRecord {
    pub timestamp: OffsetDateTime,
    pub action: String,
    pub success: bool,
    pub details: String,
    pub content_preview: String,
}

impl ActivityRecord {
    pub fn from_input(input: ActivityIn, preview_max_chars: usize, now: OffsetDateTime) -> Self {
        Self {
            timestamp: now,
            action: input.action.unwrap_or_else(|| "unknown".into()),
            success: input.success,
            details: input.details,
            content_preview: input.content_preview.chars().take(preview_max_chars).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityView {
    pub timestamp: String,
    pub action: String,
    pub success: bool,
    pub details: String,
    pub content_preview: String,
}

impl From<&ActivityRecord> for ActivityView {
    fn from(a: &ActivityRecord) -> Self {
        Self {
            timestamp: rfc3339(a.timestamp),
            action: a.action.clone(),
            success: a.success,
            details: a.details.clone(),
            content_preview: a.content_preview.clone(),
        }
    }
}
