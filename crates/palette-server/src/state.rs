use palette::chat::ChatBridge;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub bridge: ChatBridge,
}

impl AppState {
    pub fn new(bridge: ChatBridge) -> Self {
        Self { bridge }
    }
}
