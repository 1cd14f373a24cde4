/**
 * DEVICE REGISTRY - Liveness records, command queues and activity history per device
 *
 * ROLE: single owner of all fleet state. Each device id maps to one ledger
 * (liveness record + pending command queue + append-only activity log) behind
 * its own lock, so devices never contend with each other.
 *
 * LIFECYCLE: record created on first heartbeat, replaced on each heartbeat,
 * marked offline then evicted by the sweeper. Queues and activity logs survive
 * eviction. A ledger leaves the map only once it is idle (no record, no queued
 * command, no activity) and no handle to it is held outside the map.
 */

use crate::analytics::{self, ActivityTally, Analytics};
use crate::config::{ActivityConf, KernelConfig, LivenessConf};
use crate::models::{
    rfc3339, to_view, ActivityIn, ActivityRecord, ActivityView, Command, CommandKind,
    DeviceRecord, DeviceView, HeartbeatIn, Liveness,
};
use crate::state::{shared, Shared};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct DeviceLedger {
    record: Option<DeviceRecord>,
    queue: VecDeque<Command>,
    activities: Vec<ActivityRecord>,
}

impl DeviceLedger {
    fn is_idle(&self) -> bool {
        self.record.is_none() && self.queue.is_empty() && self.activities.is_empty()
    }
}

#[derive(Debug, Serialize)]
pub struct FleetStatus {
    pub timestamp: String,
    pub devices: BTreeMap<String, DeviceView>,
    pub recent_activities: BTreeMap<String, Vec<ActivityView>>,
    pub total_devices: usize,
    pub online_devices: usize,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub marked_offline: usize,
    pub evicted: usize,
    pub pruned: usize,
}

#[derive(Debug, Default, Clone, Copy, Serialize)]
pub struct RegistryCounters {
    pub devices_tracked: usize,
    pub online_devices: usize,
    pub commands_pending: usize,
    pub commands_delivered: u64,
    pub activity_records: usize,
}

pub struct DeviceRegistry {
    devices: RwLock<HashMap<String, Shared<DeviceLedger>>>,
    delivered: AtomicU64,
    liveness: LivenessConf,
    activity: ActivityConf,
}

pub type SharedDeviceRegistry = Arc<DeviceRegistry>;

impl DeviceRegistry {
    pub fn new(cfg: &KernelConfig) -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            delivered: AtomicU64::new(0),
            liveness: cfg.liveness.clone(),
            activity: cfg.activity.clone(),
        }
    }

    /// Ledger for `device_id`, created on first use.
    fn ledger(&self, device_id: &str) -> Shared<DeviceLedger> {
        if let Some(ledger) = self.devices.read().get(device_id) {
            return ledger.clone();
        }
        self.devices
            .write()
            .entry(device_id.to_string())
            .or_insert_with(|| shared(DeviceLedger::default()))
            .clone()
    }

    fn existing(&self, device_id: &str) -> Option<Shared<DeviceLedger>> {
        self.devices.read().get(device_id).cloned()
    }

    /// Snapshot of every ledger handle, ordered by device id. The map lock is
    /// released before any ledger is locked.
    fn ledgers(&self) -> Vec<(String, Shared<DeviceLedger>)> {
        let mut all: Vec<_> = self
            .devices
            .read()
            .iter()
            .map(|(id, ledger)| (id.clone(), ledger.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Drops idle ledgers nobody holds. Handles are only cloned out of the map
    /// under one of its locks, so with the write lock held a strong count of 1
    /// means no one else can reach the ledger.
    fn prune_idle(&self) -> usize {
        let mut devices = self.devices.write();
        let before = devices.len();
        devices.retain(|_, ledger| {
            Arc::strong_count(ledger) > 1
                || ledger.try_lock().map_or(true, |ledger| !ledger.is_idle())
        });
        before - devices.len()
    }

    pub fn record_heartbeat(&self, device_id: &str, hb: HeartbeatIn) -> DeviceView {
        self.record_heartbeat_at(device_id, hb, OffsetDateTime::now_utc())
    }

    pub fn record_heartbeat_at(
        &self,
        device_id: &str,
        hb: HeartbeatIn,
        now: OffsetDateTime,
    ) -> DeviceView {
        let ledger = self.ledger(device_id);
        let mut ledger = ledger.lock();
        let first_seen = ledger.record.is_none();
        let last_activity = ledger.activities.last().map(|a| a.timestamp);
        let record = DeviceRecord::from_heartbeat(device_id, hb, last_activity, now);
        let view = to_view(&record, now);
        ledger.record = Some(record);

        if first_seen {
            info!("[registry] device {device_id} registered");
        }
        debug!("[registry] heartbeat from {device_id}: {:?}", view.actions_today);
        view
    }

    /// Drains the queue: every returned command counts as delivered.
    pub fn fetch_pending_commands(&self, device_id: &str) -> Vec<Command> {
        let Some(ledger) = self.existing(device_id) else {
            return Vec::new();
        };
        let mut ledger = ledger.lock();
        let commands: Vec<Command> = ledger.queue.drain(..).collect();
        self.delivered.fetch_add(commands.len() as u64, Ordering::Relaxed);
        if !commands.is_empty() {
            info!("[registry] delivering {} commands to {device_id}", commands.len());
        }
        commands
    }

    pub fn log_activity(&self, device_id: &str, input: ActivityIn) -> ActivityView {
        self.log_activity_at(device_id, input, OffsetDateTime::now_utc())
    }

    pub fn log_activity_at(
        &self,
        device_id: &str,
        input: ActivityIn,
        now: OffsetDateTime,
    ) -> ActivityView {
        let record = ActivityRecord::from_input(input, self.activity.preview_max_chars, now);
        let view = ActivityView::from(&record);

        let ledger = self.ledger(device_id);
        let mut ledger = ledger.lock();
        if let Some(device) = ledger.record.as_mut() {
            device.last_activity = Some(record.timestamp);
        }
        ledger.activities.push(record);

        info!("[registry] activity from {device_id}: {}", view.action);
        view
    }

    pub fn enqueue_command(
        &self,
        device_id: &str,
        kind: CommandKind,
        parameters: serde_json::Value,
    ) -> Command {
        self.enqueue_command_at(device_id, kind, parameters, OffsetDateTime::now_utc())
    }

    pub fn enqueue_command_at(
        &self,
        device_id: &str,
        kind: CommandKind,
        parameters: serde_json::Value,
        now: OffsetDateTime,
    ) -> Command {
        let command = Command::new(kind, parameters, now);
        let ledger = self.ledger(device_id);
        let mut ledger = ledger.lock();
        if ledger.record.is_none() {
            debug!("[registry] queueing {} for unseen device {device_id}", kind.as_str());
        }
        ledger.queue.push_back(command.clone());
        command
    }

    /// Queues an emergency stop for every device holding a liveness record.
    pub fn emergency_stop_all(&self) -> Vec<String> {
        self.emergency_stop_all_at(OffsetDateTime::now_utc())
    }

    pub fn emergency_stop_all_at(&self, now: OffsetDateTime) -> Vec<String> {
        let mut stopped = Vec::new();
        for (device_id, ledger) in self.ledgers() {
            let mut ledger = ledger.lock();
            if ledger.record.is_none() {
                continue;
            }
            let params = serde_json::json!({ "priority": "critical" });
            ledger.queue.push_back(Command::new(CommandKind::EmergencyStop, params, now));
            stopped.push(device_id);
        }
        warn!("[registry] EMERGENCY STOP queued for {} devices", stopped.len());
        stopped
    }

    /// Marks devices offline, evicts the ones silent for too long, then prunes
    /// idle ledgers.
    pub fn sweep(&self, now: OffsetDateTime) -> SweepReport {
        let offline_after = self.liveness.offline_after();
        let evict_after = self.liveness.evict_after();
        let mut report = SweepReport::default();

        for (device_id, ledger) in self.ledgers() {
            let mut guard = ledger.lock();
            let ledger = &mut *guard;
            let Some(device) = ledger.record.as_mut() else {
                continue;
            };
            let age = now - device.last_seen;
            if age > evict_after {
                ledger.record = None;
                report.evicted += 1;
                info!("[registry] evicted device {device_id} (silent {}s)", age.whole_seconds());
            } else if age > offline_after && device.liveness == Liveness::Online {
                device.liveness = Liveness::Offline;
                report.marked_offline += 1;
                info!("[registry] marked device {device_id} offline");
            }
        }

        report.pruned = self.prune_idle();
        report
    }

    pub fn fleet_status(&self) -> FleetStatus {
        self.fleet_status_at(OffsetDateTime::now_utc())
    }

    pub fn fleet_status_at(&self, now: OffsetDateTime) -> FleetStatus {
        self.sweep(now);

        let mut devices = BTreeMap::new();
        let mut recent_activities = BTreeMap::new();
        for (device_id, ledger) in self.ledgers() {
            let ledger = ledger.lock();
            if let Some(device) = &ledger.record {
                devices.insert(device_id.clone(), to_view(device, now));
            }
            if !ledger.activities.is_empty() {
                let recent: Vec<ActivityView> = ledger
                    .activities
                    .iter()
                    .rev()
                    .take(self.activity.recent_limit)
                    .map(ActivityView::from)
                    .collect();
                recent_activities.insert(device_id, recent);
            }
        }

        let online_devices = devices.values().filter(|d| d.liveness == Liveness::Online).count();
        FleetStatus {
            timestamp: rfc3339(now),
            total_devices: devices.len(),
            online_devices,
            devices,
            recent_activities,
        }
    }

    pub fn analytics(&self) -> Analytics {
        self.analytics_at(OffsetDateTime::now_utc())
    }

    pub fn analytics_at(&self, now: OffsetDateTime) -> Analytics {
        self.sweep(now);

        let mut devices = Vec::new();
        let mut tally = ActivityTally::default();
        for (_, ledger) in self.ledgers() {
            let ledger = ledger.lock();
            if let Some(device) = &ledger.record {
                devices.push(device.clone());
            }
            ledger.activities.iter().for_each(|a| tally.add(a));
        }
        analytics::compute(&devices, &tally)
    }

    pub fn device(&self, device_id: &str) -> Option<DeviceView> {
        self.device_at(device_id, OffsetDateTime::now_utc())
    }

    pub fn device_at(&self, device_id: &str, now: OffsetDateTime) -> Option<DeviceView> {
        self.sweep(now);
        let ledger = self.existing(device_id)?;
        let ledger = ledger.lock();
        ledger.record.as_ref().map(|d| to_view(d, now))
    }

    #[cfg(test)]
    pub fn activity_count(&self, device_id: &str) -> usize {
        self.existing(device_id)
            .map(|ledger| ledger.lock().activities.len())
            .unwrap_or(0)
    }

    #[cfg(test)]
    fn ledger_count(&self) -> usize {
        self.devices.read().len()
    }

    pub fn counters(&self) -> RegistryCounters {
        let mut counters = RegistryCounters {
            commands_delivered: self.delivered.load(Ordering::Relaxed),
            ..RegistryCounters::default()
        };
        for (_, ledger) in self.ledgers() {
            let ledger = ledger.lock();
            if let Some(device) = &ledger.record {
                counters.devices_tracked += 1;
                if device.liveness == Liveness::Online {
                    counters.online_devices += 1;
                }
            }
            counters.commands_pending += ledger.queue.len();
            counters.activity_records += ledger.activities.len();
        }
        counters
    }

    /// Periodically sweeps the registry on the configured interval. Sweep time
    /// follows the runtime clock, anchored to the wall clock at start.
    pub fn start_device_monitoring(registry: SharedDeviceRegistry) -> JoinHandle<()> {
        let every = registry.liveness.sweep_interval();
        info!(
            "[registry] starting device monitoring (offline after {}s, evict after {}s)",
            registry.liveness.offline_after_secs, registry.liveness.evict_after_secs
        );
        let wall_start = OffsetDateTime::now_utc();
        let clock_start = tokio::time::Instant::now();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let report = registry.sweep(wall_start + clock_start.elapsed());
                if report != SweepReport::default() {
                    debug!("[registry] sweep: {report:?}");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;
    use std::collections::HashSet;
    use time::macros::datetime;
    use time::Duration;

    fn registry() -> DeviceRegistry {
        DeviceRegistry::new(&KernelConfig::default())
    }

    fn heartbeat(json: serde_json::Value) -> HeartbeatIn {
        serde_json::from_value(json).unwrap()
    }

    fn activity(action: &str, success: bool) -> ActivityIn {
        ActivityIn { action: Some(action.into()), success, ..ActivityIn::default() }
    }

    #[test]
    fn test_heartbeat_creates_then_updates_record() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.record_heartbeat_at("bot_a", heartbeat(serde_json::json!({"uptime_hours": 1})), t0);
        reg.record_heartbeat_at(
            "bot_a",
            heartbeat(serde_json::json!({"uptime_hours": 2, "actions_today": {"tweets": 5}})),
            t0 + Duration::seconds(30),
        );

        let status = reg.fleet_status_at(t0 + Duration::seconds(31));
        assert_eq!(status.total_devices, 1);
        let view = &status.devices["bot_a"];
        assert_eq!(view.uptime_hours, 2.0);
        assert_eq!(view.actions_today["tweets"], 5);
        assert_eq!(view.status, DeviceStatus::Running);
        assert_eq!(view.seen_seconds_ago, 1);
    }

    #[test]
    fn test_fetch_returns_commands_in_enqueue_order_and_drains() {
        let reg = registry();
        let first = reg.enqueue_command("bot_a", CommandKind::Stop, serde_json::json!({}));
        let params = serde_json::json!({"delay": 5});
        let second = reg.enqueue_command("bot_a", CommandKind::Restart, params);
        reg.record_heartbeat("bot_a", HeartbeatIn::default());

        let commands = reg.fetch_pending_commands("bot_a");
        assert_eq!(commands, vec![first, second]);
        assert!(reg.fetch_pending_commands("bot_a").is_empty());
        assert_eq!(reg.counters().commands_delivered, 2);
    }

    #[test]
    fn test_enqueue_for_unseen_device_is_accepted() {
        let reg = registry();
        let cmd = reg.enqueue_command("ghost", CommandKind::Stop, serde_json::Value::Null);
        assert_eq!(cmd.action, CommandKind::Stop);
        assert!(reg.device("ghost").is_none());
        assert_eq!(reg.fetch_pending_commands("ghost"), vec![cmd]);
    }

    #[test]
    fn test_fetch_for_unknown_device_is_empty() {
        let reg = registry();
        assert!(reg.fetch_pending_commands("nobody").is_empty());
    }

    #[test]
    fn test_emergency_stop_reaches_every_registered_device() {
        let reg = registry();
        for id in ["bot_a", "bot_b", "bot_c"] {
            reg.record_heartbeat(id, HeartbeatIn::default());
        }
        reg.enqueue_command("queued_only", CommandKind::Restart, serde_json::json!({}));

        let stopped = reg.emergency_stop_all();
        assert_eq!(stopped, vec!["bot_a", "bot_b", "bot_c"]);
        for id in ["bot_a", "bot_b", "bot_c"] {
            let cmds = reg.fetch_pending_commands(id);
            assert_eq!(cmds.len(), 1);
            assert_eq!(cmds[0].action, CommandKind::EmergencyStop);
            assert_eq!(cmds[0].parameters["priority"], "critical");
        }
        // no liveness record, so only its own restart is pending
        let other = reg.fetch_pending_commands("queued_only");
        assert_eq!(other.len(), 1);
        assert_eq!(other[0].action, CommandKind::Restart);
    }

    #[test]
    fn test_activity_log_is_append_only() {
        let reg = registry();
        let mut last = 0;
        for i in 0..60 {
            let action = if i % 2 == 0 { "tweets" } else { "replies" };
            reg.log_activity("bot_a", activity(action, true));
            let count = reg.activity_count("bot_a");
            assert!(count > last);
            last = count;
        }
        assert_eq!(reg.counters().activity_records, 60);
    }

    #[test]
    fn test_recent_activities_newest_first_and_limited() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), t0);
        for i in 0..55 {
            let at = t0 + Duration::seconds(i);
            reg.log_activity_at("bot_a", activity(&format!("a{i}"), true), at);
        }
        let status = reg.fleet_status_at(t0 + Duration::seconds(60));
        let recent = &status.recent_activities["bot_a"];
        assert_eq!(recent.len(), 50);
        assert_eq!(recent[0].action, "a54");
        assert_eq!(reg.activity_count("bot_a"), 55);
        assert_eq!(status.devices["bot_a"].last_activity, rfc3339(t0 + Duration::seconds(54)));
    }

    #[test]
    fn test_heartbeat_keeps_last_activity() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.log_activity_at("bot_a", activity("tweets", true), t0);
        let later = t0 + Duration::seconds(5);
        let view = reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), later);
        assert_eq!(view.last_activity, rfc3339(t0));
    }

    #[test]
    fn test_sweep_marks_offline_then_evicts_without_dropping_commands() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), t0);
        reg.enqueue_command_at("bot_a", CommandKind::Stop, serde_json::json!({}), t0);

        assert_eq!(reg.sweep(t0 + Duration::seconds(60)), SweepReport::default());

        let report = reg.sweep(t0 + Duration::seconds(121));
        assert_eq!(report, SweepReport { marked_offline: 1, ..SweepReport::default() });
        let status = reg.fleet_status_at(t0 + Duration::seconds(122));
        assert_eq!(status.total_devices, 1);
        assert_eq!(status.online_devices, 0);

        let report = reg.sweep(t0 + Duration::seconds(601));
        assert_eq!(report, SweepReport { evicted: 1, ..SweepReport::default() });
        assert!(reg.device("bot_a").is_none());
        assert_eq!(reg.fetch_pending_commands("bot_a").len(), 1);
    }

    #[test]
    fn test_heartbeat_brings_device_back_online() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), t0);
        reg.sweep(t0 + Duration::seconds(200));
        let later = t0 + Duration::seconds(201);
        let view = reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), later);
        assert_eq!(view.liveness, Liveness::Online);
    }

    #[test]
    fn test_heartbeat_after_eviction_restores_record_and_keeps_history() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), t0);
        reg.log_activity_at("bot_a", activity("tweets", true), t0 + Duration::seconds(10));
        let cmd = reg.enqueue_command_at(
            "bot_a",
            CommandKind::Restart,
            serde_json::json!({}),
            t0 + Duration::seconds(20),
        );

        let report = reg.sweep(t0 + Duration::seconds(611));
        assert_eq!(report, SweepReport { evicted: 1, ..SweepReport::default() });
        assert!(reg.device_at("bot_a", t0 + Duration::seconds(611)).is_none());

        let back = t0 + Duration::seconds(612);
        let hb = heartbeat(serde_json::json!({"uptime_hours": 1}));
        let view = reg.record_heartbeat_at("bot_a", hb, back);
        assert_eq!(view.liveness, Liveness::Online);
        assert_eq!(view.last_activity, rfc3339(t0 + Duration::seconds(10)));

        let restored = reg.device_at("bot_a", back).unwrap();
        assert_eq!(restored.uptime_hours, 1.0);
        assert_eq!(reg.activity_count("bot_a"), 1);
        assert_eq!(reg.fetch_pending_commands("bot_a"), vec![cmd]);
    }

    #[test]
    fn test_device_lookup_reports_offline_past_threshold() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), t0);

        let fresh = reg.device_at("bot_a", t0 + Duration::seconds(30)).unwrap();
        assert_eq!(fresh.liveness, Liveness::Online);
        let stale = reg.device_at("bot_a", t0 + Duration::seconds(121)).unwrap();
        assert_eq!(stale.liveness, Liveness::Offline);
    }

    #[test]
    fn test_sweep_prunes_only_idle_ledgers() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        reg.enqueue_command_at("drained", CommandKind::Stop, serde_json::json!({}), t0);
        reg.fetch_pending_commands("drained");
        reg.enqueue_command_at("queued", CommandKind::Stop, serde_json::json!({}), t0);
        reg.log_activity_at("chatty", activity("tweets", true), t0);
        reg.record_heartbeat_at("bot_a", HeartbeatIn::default(), t0);
        reg.record_heartbeat_at("gone", HeartbeatIn::default(), t0 - Duration::seconds(700));
        assert_eq!(reg.ledger_count(), 5);

        let report = reg.sweep(t0 + Duration::seconds(1));
        assert_eq!(report.evicted, 1);
        assert_eq!(report.pruned, 2);
        assert_eq!(reg.ledger_count(), 3);
        assert_eq!(reg.counters().commands_delivered, 1);
        assert_eq!(reg.fetch_pending_commands("queued").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_monitoring_marks_silent_device_offline() {
        let mut cfg = KernelConfig::default();
        cfg.liveness = LivenessConf {
            offline_after_secs: 30,
            evict_after_secs: 600,
            sweep_interval_secs: 10,
        };
        let reg = Arc::new(DeviceRegistry::new(&cfg));
        reg.record_heartbeat("bot_a", HeartbeatIn::default());
        let monitor = DeviceRegistry::start_device_monitoring(reg.clone());

        tokio::time::sleep(std::time::Duration::from_secs(15)).await;
        assert_eq!(reg.counters().online_devices, 1);

        tokio::time::sleep(std::time::Duration::from_secs(30)).await;
        let counters = reg.counters();
        assert_eq!(counters.online_devices, 0);
        assert_eq!(counters.devices_tracked, 1);
        monitor.abort();
    }

    #[test]
    fn test_huge_action_counts_saturate_in_analytics() {
        let reg = registry();
        let t0 = datetime!(2025-03-01 10:00 UTC);
        let huge = serde_json::json!({"actions_today": {"tweets": u64::MAX, "replies": 1}});
        reg.record_heartbeat_at("bot_a", heartbeat(huge), t0);
        let small = serde_json::json!({"actions_today": {"tweets": 5}});
        reg.record_heartbeat_at("bot_b", heartbeat(small), t0);

        let a = reg.analytics_at(t0 + Duration::seconds(1));
        assert_eq!(a.action_breakdown.total_actions, u64::MAX);
        assert_eq!(a.action_breakdown.by_action["tweets"].count, u64::MAX);
        assert_eq!(a.device_details[0].total_actions, u64::MAX);
    }

    #[test]
    fn test_concurrent_fetches_deliver_each_command_once() {
        let reg = registry();
        let per_producer = 200;
        let producers = 4;
        let delivered = parking_lot::Mutex::new(Vec::new());

        std::thread::scope(|s| {
            for _ in 0..producers {
                s.spawn(|| {
                    for _ in 0..per_producer {
                        reg.enqueue_command("bot_a", CommandKind::Restart, serde_json::json!({}));
                    }
                });
            }
            for _ in 0..3 {
                s.spawn(|| {
                    for _ in 0..500 {
                        let batch = reg.fetch_pending_commands("bot_a");
                        delivered.lock().extend(batch.into_iter().map(|c| c.command_id));
                    }
                });
            }
        });
        let rest = reg.fetch_pending_commands("bot_a");
        delivered.lock().extend(rest.into_iter().map(|c| c.command_id));

        let delivered = delivered.into_inner();
        let unique: HashSet<_> = delivered.iter().collect();
        assert_eq!(delivered.len(), producers * per_producer);
        assert_eq!(unique.len(), delivered.len());
    }

    #[test]
    fn test_concurrent_heartbeats_on_distinct_devices() {
        let reg = registry();
        std::thread::scope(|s| {
            for t in 0..8 {
                let reg = &reg;
                s.spawn(move || {
                    for i in 0..50 {
                        reg.record_heartbeat(&format!("bot_{t}_{i}"), HeartbeatIn::default());
                    }
                });
            }
        });
        assert_eq!(reg.counters().devices_tracked, 400);
    }
}
