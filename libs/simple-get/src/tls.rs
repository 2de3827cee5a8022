//! TLS setup for the default `https` transport.
//!
//! The OS certificate store is read at most once per process; every client
//! built with [`TlsRootConfig::Native`](crate::TlsRootConfig::Native) after
//! that reuses the cached certificates.

use rustls::crypto::CryptoProvider;
use rustls_pki_types::CertificateDer;
use std::sync::{Arc, OnceLock};

static NATIVE_ROOTS: OnceLock<Vec<CertificateDer<'static>>> = OnceLock::new();

#[cfg(test)]
static NATIVE_LOADS: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(0);

fn load_native_roots() -> Vec<CertificateDer<'static>> {
    #[cfg(test)]
    NATIVE_LOADS.fetch_add(1, std::sync::atomic::Ordering::SeqCst);

    let loaded = rustls_native_certs::load_native_certs();
    for err in &loaded.errors {
        tracing::warn!(error = %err, "failed to read native root certificate");
    }

    if loaded.certs.is_empty() {
        tracing::warn!("OS certificate store has no root certificates");
    } else {
        tracing::debug!(count = loaded.certs.len(), "native root certificates loaded");
    }
    loaded.certs
}

/// Native root certificates, loaded on first call (possibly empty).
pub fn native_root_certs() -> &'static [CertificateDer<'static>] {
    NATIVE_ROOTS.get_or_init(load_native_roots)
}

/// Crypto provider for TLS connections.
///
/// A process-wide default installed by the application wins; otherwise an
/// aws-lc-rs provider is created without installing it globally.
pub fn get_crypto_provider() -> Arc<CryptoProvider> {
    CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
}

/// Build a rustls `ClientConfig` trusting the OS certificate store.
///
/// # Errors
///
/// Fails when the store yields no usable root certificate, so a broken trust
/// store is reported when the client is built rather than on the first
/// handshake.
pub fn native_roots_client_config() -> Result<rustls::ClientConfig, String> {
    let certs = native_root_certs();
    if certs.is_empty() {
        return Err("no root certificates in the OS certificate store".to_owned());
    }

    let mut roots = rustls::RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs.iter().cloned());
    if ignored > 0 {
        tracing::warn!(added, ignored, "skipped unparsable native root certificates");
    }
    if added == 0 {
        return Err(format!(
            "none of the {} native root certificates could be parsed",
            certs.len()
        ));
    }

    rustls::ClientConfig::builder_with_provider(get_crypto_provider())
        .with_safe_default_protocol_versions()
        .map(|builder| {
            builder
                .with_root_certificates(roots)
                .with_no_client_auth()
        })
        .map_err(|e| format!("unsupported TLS protocol versions: {e}"))
}
