//! QUIC transport for the core's two consumed RPCs (C1 and C2).
//!
//! The core never hosts a server: the cluster-state authority and the
//! data nodes are external collaborators that own the server side of
//! these connections. This module only builds the client endpoint and
//! wraps a QUIC bidirectional stream for `tokio::io` so tarpc can ride on
//! top of it, the same shape the donor codebase uses for its own RPC client.

use crate::config::TlsConfig;
use crate::error::{ClusterError, Result};
use quinn::{ClientConfig, Endpoint};
use rustls::pki_types::CertificateDer;
use std::fs::File;
use std::io;
use std::io::BufReader;
use std::sync::Arc;
use tracing::{debug, warn};

/// Create a client-only QUIC endpoint bound to an ephemeral local port.
pub fn make_client_endpoint(tls: &TlsConfig) -> Result<Endpoint> {
    let bind_addr: std::net::SocketAddr = "0.0.0.0:0".parse().unwrap();

    let client_config = build_client_config(tls)?;
    let mut endpoint = Endpoint::client(bind_addr)
        .map_err(|e| ClusterError::Transport(format!("failed to create client endpoint: {e}")))?;
    endpoint.set_default_client_config(client_config);

    debug!("created data-node/authority client endpoint");
    Ok(endpoint)
}

fn build_client_config(tls: &TlsConfig) -> Result<ClientConfig> {
    let crypto = if tls.skip_verify {
        warn!("TLS verification disabled for cluster RPC - INSECURE");
        rustls::ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(SkipServerVerification))
            .with_no_client_auth()
    } else {
        let mut roots = rustls::RootCertStore::empty();
        if let Some(ref ca_path) = tls.ca_cert_path {
            let ca_file = File::open(ca_path)
                .map_err(|e| ClusterError::Transport(format!("failed to open CA cert {ca_path:?}: {e}")))?;
            let mut reader = BufReader::new(ca_file);
            let certs = rustls_pemfile::certs(&mut reader)
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ClusterError::Transport(format!("failed to parse CA certs: {e}")))?;
            for cert in certs {
                roots
                    .add(cert)
                    .map_err(|e| ClusterError::Transport(format!("failed to add CA cert: {e}")))?;
            }
        } else {
            let native = rustls_native_certs::load_native_certs();
            for cert in native.certs {
                let _ = roots.add(cert);
            }
        }
        rustls::ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth()
    };

    let client_config = ClientConfig::new(Arc::new(
        quinn::crypto::rustls::QuicClientConfig::try_from(crypto)
            .map_err(|e| ClusterError::Transport(format!("failed to build QUIC client config: {e}")))?,
    ));
    Ok(client_config)
}

#[derive(Debug)]
struct SkipServerVerification;

impl rustls::client::danger::ServerCertVerifier for SkipServerVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Adapts a QUIC bidirectional stream to `tokio::io::{AsyncRead, AsyncWrite}`
/// so a tarpc transport can be framed on top of it.
pub struct QuicBiStream {
    pub send: quinn::SendStream,
    pub recv: quinn::RecvStream,
}

impl tokio::io::AsyncRead for QuicBiStream {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.recv).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for QuicBiStream {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<io::Result<usize>> {
        std::pin::Pin::new(&mut self.send).poll_write(cx, buf).map_err(io::Error::other)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.send).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<io::Result<()>> {
        std::pin::Pin::new(&mut self.send).poll_shutdown(cx)
    }
}

/// Resolve a `host:port` string to a dialable address plus the hostname to
/// use for TLS SNI.
pub async fn resolve_addr(addr: &str) -> Result<(std::net::SocketAddr, String)> {
    let server_name = addr
        .rsplit_once(':')
        .map(|(host, _)| host.to_string())
        .unwrap_or_else(|| addr.to_string());

    if let Ok(sa) = addr.parse::<std::net::SocketAddr>() {
        return Ok((sa, server_name));
    }

    let mut addrs = tokio::net::lookup_host(addr)
        .await
        .map_err(|e| ClusterError::Transport(format!("DNS resolution failed for '{addr}': {e}")))?;
    let socket_addr = addrs
        .next()
        .ok_or_else(|| ClusterError::Transport(format!("no addresses resolved for '{addr}'")))?;
    Ok((socket_addr, server_name))
}
