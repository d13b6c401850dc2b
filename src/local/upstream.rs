//! The broker's connection to the remote relay
//!
//! One transport connection per client session; exactly one request
//! envelope followed by exactly one response envelope, then the same
//! connection becomes the relay data path.

use anyhow::{anyhow, Context};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::config::LocalConfig;
use crate::envelope::{BindResult, Envelope, SymmetricKey, TargetDescriptor};
use crate::error::TunnelError;
use crate::transport::{self, BoxedStream, NEGOTIATION_FRAME_LIMIT};
use crate::Result;

pub struct Upstream {
    stream: BoxedStream,
}

impl Upstream {
    /// Dial the configured relay endpoint, TLS-wrapping unless the
    /// transport runs in plaintext mode.
    pub async fn open(config: &LocalConfig, connector: Option<&TlsConnector>) -> Result<Self> {
        let tcp = TcpStream::connect((config.remote_host.as_str(), config.remote_port))
            .await
            .with_context(|| {
                format!(
                    "failed to connect to remote relay {}:{}",
                    config.remote_host, config.remote_port
                )
            })?;

        let stream: BoxedStream = match connector {
            Some(connector) => {
                let name = transport::server_name(&config.remote_host)?;
                Box::new(
                    connector
                        .connect(name, tcp)
                        .await
                        .context("TLS handshake with remote relay failed")?,
                )
            }
            None => Box::new(tcp),
        };
        Ok(Self { stream })
    }

    /// Run the pre-relay negotiation: send the target descriptor in one
    /// envelope, read one bounded response frame, extract the bind
    /// tuple. A zeroed tuple is returned as-is; the broker decides how
    /// to surface it to the client.
    pub async fn negotiate(
        &mut self,
        key: &SymmetricKey,
        target: &TargetDescriptor,
    ) -> Result<BindResult> {
        let request = Envelope::new(key, target.to_payload());
        self.stream.write_all(&request.seal(key)).await?;
        self.stream.flush().await?;

        let mut buf = [0u8; NEGOTIATION_FRAME_LIMIT];
        let n = self.stream.read(&mut buf).await?;
        if n == 0 {
            return Err(anyhow!("remote relay closed the transport during negotiation"));
        }

        let response = Envelope::open(key, &buf[..n]).map_err(TunnelError::Decrypt)?;
        BindResult::from_payload(response.payload())
    }

    /// Hand the transport over for the relay phase.
    pub fn into_stream(self) -> BoxedStream {
        self.stream
    }
}
