use serde::Deserialize;

// =======================================================
// GLOBAL CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub log_level: String,
    pub worker_connections: u16,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            worker_connections: 1024,
        }
    }
}

impl GlobalConfig {
    pub(crate) fn apply_defaults(&mut self) {
        let def = GlobalConfig::default();
        if self.log_level.is_empty() {
            self.log_level = def.log_level;
        }
        if self.worker_connections == 0 {
            self.worker_connections = def.worker_connections;
        }
    }
}
