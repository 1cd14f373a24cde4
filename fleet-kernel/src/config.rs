use serde::{Deserialize, Serialize};
use std::{path::Path, time::Duration};
use tokio::fs;
use tracing::{info, warn};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct KernelConfig {
    pub server: ServerConf,
    pub liveness: LivenessConf,
    pub activity: ActivityConf,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConf {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LivenessConf {
    /// Heartbeat age after which a device is reported offline.
    pub offline_after_secs: u64,
    /// Heartbeat age after which the device record is dropped from the fleet.
    pub evict_after_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ActivityConf {
    pub recent_limit: usize,
    pub preview_max_chars: usize,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0".into(), port: 5000 }
    }
}

impl Default for LivenessConf {
    fn default() -> Self {
        Self {
            offline_after_secs: 120,
            evict_after_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for ActivityConf {
    fn default() -> Self {
        Self { recent_limit: 50, preview_max_chars: 100 }
    }
}

impl LivenessConf {
    pub fn offline_after(&self) -> time::Duration {
        time::Duration::seconds(self.offline_after_secs as i64)
    }

    pub fn evict_after(&self) -> time::Duration {
        time::Duration::seconds(self.evict_after_secs as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl KernelConfig {
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.server.bind, self.server.port)
    }

    /// `FLEET_BIND` and `PORT` win over the file.
    fn apply_env_overrides(&mut self, bind: Option<String>, port: Option<String>) {
        if let Some(bind) = bind.filter(|b| !b.trim().is_empty()) {
            self.server.bind = bind;
        }
        if let Some(port) = port {
            match port.parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => warn!("[config] ignoring invalid PORT value {port:?}"),
            }
        }
    }
}

fn parse_config(txt: &str) -> KernelConfig {
    if txt.trim().is_empty() {
        return KernelConfig::default();
    }
    serde_yaml::from_str(txt).unwrap_or_else(|e| {
        warn!("[config] invalid config: {e}");
        KernelConfig::default()
    })
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("FLEET_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        info!("[config] loaded {path}");
        parse_config(&txt)
    } else {
        warn!("[config] no {path}, using defaults");
        KernelConfig::default()
    };
    cfg.apply_env_overrides(std::env::var("FLEET_BIND").ok(), std::env::var("PORT").ok());
    cfg
}
