use std::{sync::OnceLock, time::Duration};

use reqwest::Client;
use tracing::debug;

use crate::{Error, Result};

/// Upper bound for a single HTTP request. Senders apply their own, usually
/// shorter, timeout on top.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            // Safe to ignore: can happen if another crate installed it first.
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Shared HTTP client configuration for the Bot API and the Frigate API.
pub fn build_client() -> Result<Client> {
    install_rustls_provider();
    Client::builder()
        .user_agent(concat!("frigate-notify/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| Error::other(format!("Failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client() {
        assert!(build_client().is_ok());
        // Installing twice is harmless.
        install_rustls_provider();
        assert!(build_client().is_ok());
    }
}
