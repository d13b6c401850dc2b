//! SOCKS5 front end

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsConnector;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::envelope::SymmetricKey;
use crate::error::TunnelError;
use crate::protocol::constants::*;
use crate::protocol::Socks5Handler;
use crate::relay::RelayEngine;
use crate::transport::{self, listen};
use crate::Result;

use super::Upstream;

/// The client-facing hop. One accepted connection is one session; there
/// is no cross-session shared mutable state beyond the diagnostic
/// counters owned by this listener.
pub struct LocalBroker {
    config: Arc<Config>,
    key: SymmetricKey,
    connector: Option<TlsConnector>,
    engine: RelayEngine,
    listener: TcpListener,
    total_accepted: AtomicU64,
    current_active: AtomicU64,
}

impl LocalBroker {
    /// Bind the SOCKS5 listener. The configured backlog is the only
    /// admission control the broker applies.
    pub async fn bind(config: Arc<Config>) -> Result<Self> {
        let key = SymmetricKey::new(&config.general.key)?;
        let connector = match config.local.tls {
            true => Some(transport::build_connector(config.local.ca_file.as_deref())?),
            false => None,
        };

        let listener = listen(config.local.listen_addr, config.local.backlog)?;
        Ok(Self {
            engine: RelayEngine::with_idle_timeout(config.relay.idle_timeout),
            config,
            key,
            connector,
            listener,
            total_accepted: AtomicU64::new(0),
            current_active: AtomicU64::new(0),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop. Each connection runs as its own task; a failed
    /// session never affects other sessions or the listener.
    pub async fn run(self) -> Result<()> {
        let this = Arc::new(self);
        info!(addr = %this.listener.local_addr()?, "socks5 broker listening");
        loop {
            let (stream, peer) = this.listener.accept().await?;
            let broker = Arc::clone(&this);
            tokio::spawn(async move { broker.handle_connection(stream, peer).await });
        }
    }

    /// Bookkeeping wrapper around the session handler: increments the
    /// counters on accept, decrements on terminal cleanup, and never
    /// lets a session error escape the task.
    async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        let session = self.total_accepted.fetch_add(1, Ordering::Relaxed);
        let active = self.current_active.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(session, active, %peer, "accepted socks5 client");

        if let Err(e) = self.handle_session(stream, session).await {
            warn!(session, error = %e, "session aborted");
        }

        let remaining = self.current_active.fetch_sub(1, Ordering::Relaxed) - 1;
        debug!(session, active = remaining, "session finished");
        if remaining == 0 {
            debug!("no active sessions remain");
        }
    }

    async fn handle_session(&self, stream: TcpStream, session: u64) -> Result<()> {
        let mut socks = Socks5Handler::new(stream);

        socks.handle_greeting().await?;
        socks
            .authenticate(&self.config.local.username, &self.config.local.password)
            .await?;
        let (command, target) = socks.read_request().await?;
        info!(session, %target, "client request");

        let mut upstream = Upstream::open(&self.config.local, self.connector.as_ref()).await?;
        let bind = upstream.negotiate(&self.key, &target).await?;

        if bind.is_failure() {
            socks
                .send_reply(SOCKS5_REPLY_CONNECTION_REFUSED, Ipv4Addr::UNSPECIFIED, 0)
                .await?;
            return Err(TunnelError::RemoteRelay.into());
        }

        if command != SOCKS5_CMD_CONNECT {
            socks
                .send_reply(SOCKS5_REPLY_COMMAND_NOT_SUPPORTED, Ipv4Addr::UNSPECIFIED, 0)
                .await?;
            return Err(TunnelError::Protocol(format!("unsupported command {command}")).into());
        }

        socks
            .send_reply(SOCKS5_REPLY_SUCCESS, bind.ipv4()?, bind.port)
            .await?;
        debug!(session, bind = %bind.address, port = bind.port, "relay established");

        // Both streams are closed by drop after the engine shuts down
        // their write sides; teardown never raises.
        self.engine
            .relay(socks.into_stream(), upstream.into_stream())
            .await;
        Ok(())
    }
}
