//! Shared HTTP client construction.
//!
//! Playlists, segments and catalog requests all go through a pooled
//! reqwest client built here:
//! - HTTP/2 negotiated via ALPN, HTTP/1.1 fallback
//! - TLS 1.3 via rustls
//! - Brotli / Gzip / Deflate response decompression
//! - Keep-alive pooling sized for parallel segment fetches

use std::time::Duration;

use reqwest::Client;

/// User-Agent sent with every request.
pub const USER_AGENT: &str = concat!("vodplay/", env!("CARGO_PKG_VERSION"));

/// Build a client with the given per-request timeout.
pub fn build_client(timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        // ═══════════════════════════════════════════════════════════════
        // CONNECTIONS
        // ═══════════════════════════════════════════════════════════════
        // Let the server negotiate HTTP/2; segment servers are often 1.1
        .http2_adaptive_window(true)
        // Keep more connections alive for parallel segment fetches
        .pool_max_idle_per_host(16)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(60))
        // Reduce latency on small playlist requests
        .tcp_nodelay(true)
        // ═══════════════════════════════════════════════════════════════
        // TLS + COMPRESSION
        // ═══════════════════════════════════════════════════════════════
        .use_rustls_tls()
        .brotli(true)
        .gzip(true)
        .deflate(true)
        // ═══════════════════════════════════════════════════════════════
        // TIMEOUTS
        // ═══════════════════════════════════════════════════════════════
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .user_agent(USER_AGENT)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        assert!(build_client(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(USER_AGENT.starts_with("vodplay/"));
        assert!(USER_AGENT.len() > "vodplay/".len());
    }
}
