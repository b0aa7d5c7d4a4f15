use crate::topology::Topology;
use anyhow::{Context, Result};
use lectern_core::QualityTier;
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Negotiation and supervision deadlines. Integration tests shrink these to
/// keep timeout scenarios fast.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// How long a link may sit without an answer before it fails.
    pub answer_timeout: Duration,
    /// Pause before the single post-failure retry.
    pub retry_backoff: Duration,
    /// A `connected` link with no activity for this long is closed.
    pub idle_timeout: Duration,
    /// Supervisor sweep interval.
    pub sweep_interval: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(10),
        }
    }
}

/// Deployment configuration, read from the environment at startup. The core
/// keeps no on-disk state; this is the entire external surface.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listening address for the signaling endpoint.
    pub bind_addr: SocketAddr,
    /// Externally reachable address advertised in relay connectivity
    /// candidates (forwarding topology behind NAT). `None` means candidates
    /// use whatever the host interfaces report.
    pub public_ip: Option<String>,
    /// Mesh or forwarding, fixed per deployment.
    pub topology: Topology,
    /// STUN server handed to relay peer connections.
    pub stun_url: String,
    /// Ceiling applied to client-declared tiers (downgrade only).
    pub max_tier: QualityTier,
    pub timings: Timings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            public_ip: None,
            topology: Topology::Mesh,
            stun_url: "stun:stun.l.google.com:19302".to_owned(),
            max_tier: QualityTier::Normal,
            timings: Timings::default(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();

        if let Ok(addr) = env::var("LECTERN_BIND_ADDR") {
            cfg.bind_addr = addr
                .parse()
                .with_context(|| format!("invalid LECTERN_BIND_ADDR: {addr}"))?;
        }
        if let Ok(ip) = env::var("LECTERN_PUBLIC_ADDR") {
            cfg.public_ip = Some(ip);
        }
        if let Ok(mode) = env::var("LECTERN_TOPOLOGY") {
            cfg.topology = mode
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("invalid LECTERN_TOPOLOGY: {mode}"))?;
        }
        if let Ok(url) = env::var("LECTERN_STUN_URL") {
            cfg.stun_url = url;
        }
        if let Ok(tier) = env::var("LECTERN_MAX_TIER") {
            cfg.max_tier = match tier.as_str() {
                "ultra-low" => QualityTier::UltraLow,
                "low" => QualityTier::Low,
                "normal" => QualityTier::Normal,
                other => anyhow::bail!("invalid LECTERN_MAX_TIER: {other}"),
            };
        }

        Ok(cfg)
    }
}
