//! HTTP transport over the server facade.

pub mod error;
pub mod models;
pub mod server;
pub mod services;
pub mod state;
pub mod utils;

pub use server::{router, run};
pub use state::AppState;
