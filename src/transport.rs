//! Inter-hop transport construction
//!
//! The envelope transport between the two hops is TLS-protected TCP in
//! deployments; a plaintext mode exists for tests and trusted networks.
//! Session handlers are generic over the stream, so both variants share
//! the same code paths behind [`BoxedStream`].

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpSocket};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

use crate::Result;

/// Upper bound on one negotiation ciphertext frame. The handshake
/// message is assumed to fit in a single read; anything larger is a
/// protocol violation.
pub const NEGOTIATION_FRAME_LIMIT: usize = 4096;

/// Object-safe alias for either a raw TCP stream or a TLS stream.
pub trait IoStream: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> IoStream for T {}

pub type BoxedStream = Box<dyn IoStream>;

/// Bind a listener with an explicit backlog, the only admission control
/// either hop applies.
pub fn listen(addr: SocketAddr, backlog: u32) -> Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    socket.set_reuseaddr(true)?;
    socket.bind(addr)?;
    Ok(socket.listen(backlog)?)
}

/// Build the server-side acceptor from PEM certificate and key files.
pub fn build_acceptor(cert_file: &Path, key_file: &Path) -> Result<TlsAcceptor> {
    let certs = load_certs(cert_file)?;
    let key = rustls_pemfile::private_key(&mut pem_reader(key_file)?)
        .with_context(|| format!("failed to parse key file {}", key_file.display()))?
        .ok_or_else(|| anyhow!("no private key found in {}", key_file.display()))?;

    let config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("invalid TLS certificate/key pair")?;
    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Build the client-side connector. Trust anchors are the bundled web
/// roots plus, when configured, an extra CA file for self-signed relays.
pub fn build_connector(ca_file: Option<&Path>) -> Result<TlsConnector> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    if let Some(path) = ca_file {
        for cert in load_certs(path)? {
            roots
                .add(cert)
                .with_context(|| format!("invalid CA certificate in {}", path.display()))?;
        }
    }

    let config = ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

/// The SNI / verification name for the relay endpoint.
pub fn server_name(host: &str) -> Result<ServerName<'static>> {
    ServerName::try_from(host.to_owned()).map_err(|e| anyhow!("invalid relay host {host:?}: {e}"))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let certs: std::io::Result<Vec<_>> = rustls_pemfile::certs(&mut pem_reader(path)?).collect();
    let certs = certs.with_context(|| format!("failed to parse certificates in {}", path.display()))?;
    if certs.is_empty() {
        return Err(anyhow!("no certificates found in {}", path.display()));
    }
    Ok(certs)
}

fn pem_reader(path: &Path) -> Result<BufReader<File>> {
    Ok(BufReader::new(File::open(path).with_context(|| {
        format!("failed to open {}", path.display())
    })?))
}
