//! Shared helpers for in-process test servers.

use std::net::SocketAddr;
use std::sync::Arc;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivatePkcs8KeyDer};

/// Route `tracing` output through the test harness. Safe to call repeatedly.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Serve `app` on an ephemeral localhost port and return its address.
pub(crate) async fn serve(app: axum::Router) -> SocketAddr {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("test listener addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("test server failed");
    });
    addr
}

/// Serve `app` over TLS with a freshly generated self-signed certificate
/// for `localhost`. No client trusts it.
pub(crate) async fn serve_tls(app: axum::Router) -> SocketAddr {
    init_tracing();
    let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_owned()]).expect("self-signed cert");
    let key = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());
    let chain = vec![CertificateDer::from(cert.cert)];

    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let tls = rustls::ServerConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .expect("tls protocol versions")
        .with_no_client_auth()
        .with_single_cert(chain, key.into())
        .expect("server certificate");

    let handle = axum_server::Handle::new();
    let server = axum_server::bind_rustls(SocketAddr::from(([127, 0, 0, 1], 0)), RustlsConfig::from_config(Arc::new(tls)))
        .handle(handle.clone());
    tokio::spawn(async move {
        server
            .serve(app.into_make_service())
            .await
            .expect("tls test server failed");
    });
    handle.listening().await.expect("tls test server addr")
}

/// An address nothing is listening on.
pub(crate) async fn closed_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe listener");
    listener.local_addr().expect("probe listener addr")
}
