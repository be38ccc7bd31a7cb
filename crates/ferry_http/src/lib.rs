pub mod responses;

pub use responses::{full_body, text_response, ProxyBody};
