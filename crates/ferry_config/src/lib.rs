mod ferry;
mod global;
mod server;
mod upstream;
mod validation;

pub use ferry::FerryConfig;
pub use global::GlobalConfig;
pub use server::{ServerConfig, TlsConfig};
pub use upstream::{UpstreamConfig, UpstreamServers};
pub use validation::ConfigReport;
