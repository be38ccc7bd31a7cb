use serde::Deserialize;

use crate::validation::{validate, ConfigReport};
use crate::{GlobalConfig, ServerConfig, UpstreamConfig};

// =======================================================
// FERRY CONFIG — main config
// =======================================================
#[derive(Debug, Deserialize)]
pub struct FerryConfig {
    #[serde(default)]
    pub global: GlobalConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub upstream: UpstreamConfig,
}

impl Default for FerryConfig {
    fn default() -> Self {
        let mut cfg = Self {
            global: GlobalConfig::default(),
            server: ServerConfig::default(),
            upstream: UpstreamConfig::default(),
        };
        cfg.apply_defaults();
        cfg
    }
}

impl FerryConfig {
    pub fn from_file(file_name: &str) -> Result<Self, config::ConfigError> {
        let built = config::Config::builder()
            .add_source(config::File::new(file_name, config::FileFormat::Ini).required(false))
            .build()?;

        let mut cfg: FerryConfig = built.try_deserialize()?;

        cfg.apply_defaults();
        Ok(cfg)
    }

    pub fn from_file_or_default(file_name: &str) -> Self {
        match Self::from_file(file_name) {
            Ok(cfg) => {
                let report = cfg.validate();
                if report.has_errors() {
                    eprintln!("Invalid config in '{file_name}':");
                    eprintln!("{}", report.format());
                    eprintln!("Using default config (in-memory)...");
                    FerryConfig::default()
                } else {
                    if !report.warnings().is_empty() {
                        eprintln!("Config warnings in '{file_name}':");
                        eprintln!("{}", report.format());
                    }
                    cfg
                }
            }
            Err(e) => {
                eprintln!("Error reading config '{file_name}': {e}");
                eprintln!("Using default config (in-memory)...");
                FerryConfig::default()
            }
        }
    }

    /// Validate the configuration and return a report of warnings and errors.
    pub fn validate(&self) -> ConfigReport {
        validate(self)
    }

    fn apply_defaults(&mut self) {
        self.global.apply_defaults();
        self.server.apply_defaults();
        self.upstream.apply_defaults();
    }

    pub fn print(&self) {
        println!("================ FERRY CONFIG ================");

        println!("\n[global]");
        println!("  log_level          = {}", self.global.log_level);
        println!("  worker_connections = {}", self.global.worker_connections);

        println!("\n[server]");
        println!("  listen             = {}", self.server.listen);
        if let Some(tls) = self.server.tls() {
            println!("  tls_listen         = {}", tls.listen);
            println!("  tls_cert_path      = {}", tls.cert_path);
            println!("  tls_key_path       = {}", tls.key_path);
            println!("  tls_http2          = {}", tls.http2);
        }

        println!("\n[upstream]");
        println!("  servers            = {}", self.upstream.servers);
        println!("  algo               = {}", self.upstream.algo);
        println!("  health_path        = {}", self.upstream.health_path);
        println!(
            "  health_interval_secs = {}",
            self.upstream.health_interval_secs
        );
        println!(
            "  health_timeout_secs  = {}",
            self.upstream.health_timeout_secs
        );
        println!(
            "  passive_cooldown_ms  = {}",
            self.upstream.passive_cooldown_ms
        );

        println!("==============================================");
    }
}
