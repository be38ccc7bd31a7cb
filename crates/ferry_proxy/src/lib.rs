mod balance;
mod body;
mod client;
mod headers;
mod health;
mod options;
mod path;
mod proxy;
mod upstream;

pub use balance::{Balancer, DoneToken, Pick};
pub use health::HealthState;
pub use options::{LbAlgo, ProxyOptions};
pub use proxy::Proxy;
pub use upstream::{parse_upstreams, Upstream};
