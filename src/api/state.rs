use std::sync::Arc;

use crate::server::Server;

#[derive(Clone)]
pub struct AppState {
    pub server: Arc<Server>,
}

impl AppState {
    pub fn new(server: Arc<Server>) -> Self {
        Self { server }
    }
}
