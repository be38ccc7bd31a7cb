use std::net::SocketAddr;
use std::path::Path;

use crate::{FerryConfig, UpstreamServers};

/// Validation output for a loaded ferry configuration.
#[derive(Debug, Default)]
pub struct ConfigReport {
    warnings: Vec<String>,
    errors: Vec<String>,
}

impl ConfigReport {
    /// Returns true when no errors were found.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns true when at least one error was found.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Returns the collected warning messages.
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Returns the collected error messages.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render warnings and errors into a readable, multi-line string.
    pub fn format(&self) -> String {
        let mut out = String::new();
        if !self.errors.is_empty() {
            out.push_str("Errors:\n");
            for err in &self.errors {
                out.push_str("  - ");
                out.push_str(err);
                out.push('\n');
            }
        }
        if !self.warnings.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str("Warnings:\n");
            for warn in &self.warnings {
                out.push_str("  - ");
                out.push_str(warn);
                out.push('\n');
            }
        }
        out
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }
}

/// Validate a ferry configuration and return a report of issues.
pub fn validate(cfg: &FerryConfig) -> ConfigReport {
    let mut report = ConfigReport::default();

    validate_server(cfg, &mut report);
    validate_upstream(cfg, &mut report);

    report
}

fn validate_server(cfg: &FerryConfig, report: &mut ConfigReport) {
    if cfg.server.listen.trim().is_empty() {
        report.error("server.listen is empty");
    } else if cfg.server.listen.parse::<SocketAddr>().is_err() {
        report.warn(format!(
            "server.listen '{listen}' is not a socket address; DNS resolution will be used",
            listen = cfg.server.listen
        ));
    }

    let Some(tls) = cfg.server.tls() else {
        return;
    };

    if tls.listen == cfg.server.listen {
        report.error(format!(
            "TLS listen '{listen}' conflicts with the HTTP listen; use separate ports",
            listen = tls.listen
        ));
    }

    if tls.cert_path.trim().is_empty() || tls.key_path.trim().is_empty() {
        report.error("TLS config requires cert_path and key_path");
    } else {
        if !Path::new(&tls.cert_path).is_file() {
            report.error(format!(
                "TLS cert_path '{path}' not found",
                path = tls.cert_path
            ));
        }
        if !Path::new(&tls.key_path).is_file() {
            report.error(format!(
                "TLS key_path '{path}' not found",
                path = tls.key_path
            ));
        }
    }
}

fn validate_upstream(cfg: &FerryConfig, report: &mut ConfigReport) {
    match &cfg.upstream.servers {
        UpstreamServers::One(server) => {
            if server.trim().is_empty() {
                report.error("upstream has an empty server list");
            }
        }
        UpstreamServers::Many(servers) => {
            if servers.is_empty() {
                report.error("upstream has no servers configured");
            }
            for (idx, server) in servers.iter().enumerate() {
                if server.trim().is_empty() {
                    report.error(format!("upstream server entry at index {idx} is empty"));
                }
            }
        }
    }

    if cfg.upstream.algo != "rr" && cfg.upstream.algo != "lc" {
        report.error(format!(
            "upstream.algo '{algo}' is not one of 'rr' or 'lc'",
            algo = cfg.upstream.algo
        ));
    }

    let probing_enabled = !cfg.upstream.health_path.is_empty()
        && cfg.upstream.health_interval_secs > 0
        && cfg.upstream.health_timeout_secs > 0;
    if !cfg.upstream.health_path.is_empty() && !probing_enabled {
        report.warn(
            "upstream.health_path is set but interval or timeout is 0; active probing is disabled",
        );
    }

    if cfg.upstream.passive_cooldown_ms == 0 {
        report.warn("upstream.passive_cooldown_ms is 0; passive failure marking is disabled");
    }
}
