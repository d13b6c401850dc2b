//! Remote relay server

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::envelope::{BindResult, Envelope, SymmetricKey, TargetDescriptor};
use crate::error::TunnelError;
use crate::relay::RelayEngine;
use crate::transport::{self, listen, IoStream, NEGOTIATION_FRAME_LIMIT};
use crate::Result;

/// The destination-facing hop. Accepts one negotiation envelope per
/// inbound transport connection, always answers with a bind tuple, and
/// relays only when the outbound connection succeeded.
pub struct RemoteRelay {
    key: SymmetricKey,
    acceptor: Option<TlsAcceptor>,
    engine: RelayEngine,
    listener: TcpListener,
    total_accepted: AtomicU64,
    current_active: AtomicU64,
}

impl RemoteRelay {
    pub async fn bind(config: Arc<Config>) -> Result<Self> {
        let key = SymmetricKey::new(&config.general.key)?;
        let acceptor = match config.remote.tls {
            true => {
                let cert = config
                    .remote
                    .cert_file
                    .as_deref()
                    .ok_or_else(|| anyhow!("remote.cert_file is required when TLS is enabled"))?;
                let pkey = config
                    .remote
                    .key_file
                    .as_deref()
                    .ok_or_else(|| anyhow!("remote.key_file is required when TLS is enabled"))?;
                Some(transport::build_acceptor(cert, pkey)?)
            }
            false => None,
        };

        let listener = listen(config.remote.listen_addr, config.remote.backlog)?;
        Ok(Self {
            key,
            acceptor,
            engine: RelayEngine::with_idle_timeout(config.relay.idle_timeout),
            listener,
            total_accepted: AtomicU64::new(0),
            current_active: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self) -> Result<()> {
        let this = Arc::new(self);
        info!(addr = %this.listener.local_addr()?, "remote relay listening");
        loop {
            let (stream, peer) = this.listener.accept().await?;
            let relay = Arc::clone(&this);
            tokio::spawn(async move { relay.handle_connection(stream, peer).await });
        }
    }

    /// Counter bookkeeping wrapper, mirroring the local hop.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let session = self.total_accepted.fetch_add(1, Ordering::Relaxed);
        let active = self.current_active.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session, active, %peer, "accepted transport connection");

        let result = match &self.acceptor {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(tls) => self.handle_session(tls, session).await,
                Err(e) => Err(anyhow::Error::new(e).context("TLS accept failed")),
            },
            None => self.handle_session(stream, session).await,
        };
        if let Err(e) = result {
            warn!(session, error = %e, "session aborted");
        }

        let remaining = self.current_active.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(session, active = remaining, "session finished");
        if remaining == 0 {
            debug!("no active sessions remain");
        }
    }

    async fn handle_session<S: IoStream>(&self, mut stream: S, session: u64) -> Result<()> {
        // One bounded read; the negotiation message must fit in a single
        // frame or the session aborts.
        let mut buf = [0u8; NEGOTIATION_FRAME_LIMIT];
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Err(
                TunnelError::Protocol("transport closed before negotiation".into()).into(),
            );
        }

        let envelope = Envelope::open(&self.key, &buf[..n]).map_err(TunnelError::Decrypt)?;
        let target = TargetDescriptor::from_payload(envelope.payload())?;
        debug!(session, request = envelope.id(), %target, "negotiation request");

        if target.is_empty() {
            return Err(
                TunnelError::Protocol("neither ip nor domain was provided".into()).into(),
            );
        }

        // Whatever happens to the outbound dial, the local hop always
        // gets an answer; silence would leave it waiting forever.
        let outbound = match self.connect_target(&target).await {
            Ok(outbound) => Some(outbound),
            Err(e) => {
                warn!(session, %target, error = %e, "outbound connection failed");
                None
            }
        };
        let bind = match &outbound {
            Some((_, local)) => BindResult::new(local.ip().to_string(), local.port()),
            None => BindResult::failure(),
        };

        let response = Envelope::new(&self.key, bind.to_payload());
        stream.write_all(&response.seal(&self.key)).await?;
        stream.flush().await?;

        let Some((target_stream, local)) = outbound else {
            return Ok(());
        };
        debug!(session, bind = %local, "relay established");
        self.engine.relay(stream, target_stream).await;
        Ok(())
    }

    /// Resolve and dial the real destination. Domain targets resolve to
    /// an IPv4 address only; resolution never falls back silently. The
    /// outbound socket's local address becomes the reported bind tuple.
    async fn connect_target(&self, target: &TargetDescriptor) -> Result<(TcpStream, SocketAddr)> {
        let addr = if !target.ip.is_empty() {
            let ip: Ipv4Addr = target
                .ip
                .parse()
                .with_context(|| format!("target ip is not IPv4: {:?}", target.ip))?;
            SocketAddr::from((ip, target.port))
        } else {
            resolve_ipv4(&target.domain, target.port).await?
        };

        let stream = TcpStream::connect(addr)
            .await
            .with_context(|| format!("failed to connect to {addr}"))?;
        let local = stream.local_addr()?;
        Ok((stream, local))
    }
}

async fn resolve_ipv4(domain: &str, port: u16) -> Result<SocketAddr> {
    let mut addrs = lookup_host((domain, port))
        .await
        .with_context(|| format!("DNS resolution failed for {domain}"))?;
    addrs
        .find(|addr| addr.is_ipv4())
        .ok_or_else(|| anyhow!("no IPv4 address for {domain}"))
}
