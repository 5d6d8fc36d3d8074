pub mod health;
pub mod routes;
pub mod server;

pub use routes::{build_router, ApiState};
pub use server::{shutdown_signal, start_api_server};
