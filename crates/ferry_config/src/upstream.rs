use serde::Deserialize;

// =======================================================
// UPSTREAM CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum UpstreamServers {
    One(String),
    Many(Vec<String>),
}

impl UpstreamServers {
    /// Render the configured servers as the comma-separated form the
    /// upstream parser consumes.
    pub fn to_csv(&self) -> String {
        match self {
            UpstreamServers::One(s) => s.clone(),
            UpstreamServers::Many(list) => list.join(","),
        }
    }
}

impl std::fmt::Display for UpstreamServers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpstreamServers::One(s) => write!(f, "{s}"),
            UpstreamServers::Many(list) => write!(f, "{:?}", list),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Origin servers as absolute URLs; a single comma-separated string or a
    /// list.
    pub servers: UpstreamServers,
    /// Balancing algorithm: "rr" (round-robin) or "lc" (least-connections).
    pub algo: String,
    /// Health probe path; empty disables active probing.
    pub health_path: String,
    /// Interval between probe sweeps in seconds; 0 disables active probing.
    pub health_interval_secs: u64,
    /// Per-probe timeout in seconds; 0 disables active probing.
    pub health_timeout_secs: u64,
    /// Cooldown after a forwarding failure in milliseconds; 0 disables
    /// passive marking.
    pub passive_cooldown_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            servers: UpstreamServers::Many(vec![
                "http://localhost:9000".into(),
                "http://localhost:9001".into(),
                "http://localhost:9002".into(),
            ]),
            algo: "lc".into(),
            health_path: String::new(),
            health_interval_secs: 0,
            health_timeout_secs: 0,
            passive_cooldown_ms: 10_000,
        }
    }
}

impl UpstreamConfig {
    pub(crate) fn apply_defaults(&mut self) {
        if self.algo.is_empty() {
            self.algo = UpstreamConfig::default().algo;
        }
    }
}
