pub mod routes;

pub use routes::{run_server, AppState};
