use serde::Deserialize;

// =======================================================
// SERVER CONFIG + DEFAULTS
// =======================================================
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,

    /// TLS listen address; empty disables the TLS listener.
    pub tls_listen: String,
    /// Path to PEM-encoded certificate chain.
    pub tls_cert_path: String,
    /// Path to PEM-encoded private key.
    pub tls_key_path: String,
    /// Enable HTTP/2 via ALPN on the TLS listener.
    pub tls_http2: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".into(),
            tls_listen: String::new(),
            tls_cert_path: String::new(),
            tls_key_path: String::new(),
            tls_http2: false,
        }
    }
}

impl ServerConfig {
    /// The TLS listener settings, when one is configured.
    pub fn tls(&self) -> Option<TlsConfig> {
        if self.tls_listen.is_empty() {
            return None;
        }
        Some(TlsConfig {
            listen: self.tls_listen.clone(),
            cert_path: self.tls_cert_path.clone(),
            key_path: self.tls_key_path.clone(),
            http2: self.tls_http2,
        })
    }

    pub(crate) fn apply_defaults(&mut self) {
        if self.listen.is_empty() {
            self.listen = ServerConfig::default().listen;
        }
    }
}

/// Assembled TLS listener configuration.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    pub listen: String,
    pub cert_path: String,
    pub key_path: String,
    pub http2: bool,
}
