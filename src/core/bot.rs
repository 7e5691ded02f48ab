use crate::config::{BotConfig, SentinelField};
use super::Request;

/// Flags automated traffic from the first request of a session
#[derive(Debug, Clone)]
pub struct BotClassifier {
    user_agent_markers: Vec<String>,
    sentinel: String,
    sentinel_field: SentinelField,
}

impl BotClassifier {
    pub fn new(config: &BotConfig) -> Self {
        Self {
            user_agent_markers: config.user_agent_markers.clone(),
            sentinel: config.sentinel.clone(),
            sentinel_field: config.sentinel_field,
        }
    }

    pub fn is_bot(&self, request: &Request) -> bool {
        let sentinel_target = match self.sentinel_field {
            SentinelField::ClientAddress => &request.client_address,
            SentinelField::Path => &request.path,
        };
        if !self.sentinel.is_empty() && sentinel_target.contains(self.sentinel.as_str()) {
            return true;
        }

        self.user_agent_markers
            .iter()
            .any(|marker| request.user_agent.contains(marker.as_str()))
    }
}
