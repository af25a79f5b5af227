pub mod clock;
pub mod http_client;

pub use clock::{Clock, SystemClock};
pub use http_client::HttpClientFactory;
