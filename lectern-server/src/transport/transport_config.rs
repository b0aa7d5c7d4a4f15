use crate::config::ServerConfig;

/// WebRTC settings for relay peer connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub stun_urls: Vec<String>,
    /// Externally reachable address substituted into host candidates when
    /// the relay runs behind NAT.
    pub public_ip: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            stun_urls: vec!["stun:stun.l.google.com:19302".to_owned()],
            public_ip: None,
        }
    }
}

impl From<&ServerConfig> for TransportConfig {
    fn from(cfg: &ServerConfig) -> Self {
        Self {
            stun_urls: vec![cfg.stun_url.clone()],
            public_ip: cfg.public_ip.clone(),
        }
    }
}
