//! SOCKS5 Protocol Handler

use std::net::Ipv4Addr;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::*;
use crate::envelope::TargetDescriptor;
use crate::error::TunnelError;
use crate::Result;

/// Drives the strictly sequential SOCKS5 state machine for one client
/// connection: greeting, username/password sub-negotiation, request,
/// reply. Generic over the stream so tests can exercise it directly.
pub struct Socks5Handler<S> {
    stream: S,
}

impl<S: AsyncRead + AsyncWrite + Unpin> Socks5Handler<S> {
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Read the client greeting and select the username/password method.
    ///
    /// Aborts with a protocol error when the version is not 5, when no
    /// methods are offered, or when method 0x02 is not among them; no
    /// method-selection reply is sent in the abort cases.
    pub async fn handle_greeting(&mut self) -> Result<()> {
        let mut header = [0u8; 2];
        self.stream.read_exact(&mut header).await?;
        let (version, n_methods) = (header[0], header[1]);

        if version != SOCKS5_VERSION {
            return Err(TunnelError::Protocol(format!("unsupported version {version}")).into());
        }
        if n_methods == 0 {
            return Err(TunnelError::Protocol("no auth methods offered".into()).into());
        }

        let mut methods = vec![0u8; n_methods as usize];
        self.stream.read_exact(&mut methods).await?;

        if !methods.contains(&SOCKS5_AUTH_USERPASS) {
            return Err(
                TunnelError::Protocol("client does not offer username/password".into()).into(),
            );
        }

        self.stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_USERPASS])
            .await?;
        Ok(())
    }

    /// RFC 1929 sub-negotiation. Compares the submitted credentials
    /// byte-for-byte against the configured pair, answers with the
    /// success or failure status, and aborts the session on mismatch.
    pub async fn authenticate(&mut self, username: &str, password: &str) -> Result<()> {
        let mut header = [0u8; 2];
        self.stream.read_exact(&mut header).await?;
        let (version, username_len) = (header[0], header[1] as usize);

        if version != SOCKS5_USERPASS_VERSION {
            return Err(TunnelError::Protocol(format!("bad auth version {version}")).into());
        }

        let mut submitted_user = vec![0u8; username_len];
        self.stream.read_exact(&mut submitted_user).await?;

        let mut len_buf = [0u8; 1];
        self.stream.read_exact(&mut len_buf).await?;
        let mut submitted_pass = vec![0u8; len_buf[0] as usize];
        self.stream.read_exact(&mut submitted_pass).await?;

        if submitted_user == username.as_bytes() && submitted_pass == password.as_bytes() {
            self.stream
                .write_all(&[version, SOCKS5_USERPASS_SUCCESS])
                .await?;
            Ok(())
        } else {
            self.stream
                .write_all(&[version, SOCKS5_USERPASS_FAILURE])
                .await?;
            self.stream.flush().await?;
            Err(TunnelError::Authentication.into())
        }
    }

    /// Read the connection request. Returns the raw command byte and the
    /// target descriptor; only IPv4 and domain address types are
    /// supported, IPv6 aborts with a protocol error.
    pub async fn read_request(&mut self) -> Result<(u8, TargetDescriptor)> {
        let mut header = [0u8; 4];
        self.stream.read_exact(&mut header).await?;
        let (version, command, _reserved, address_type) =
            (header[0], header[1], header[2], header[3]);

        if version != SOCKS5_VERSION {
            return Err(TunnelError::Protocol(format!("unsupported version {version}")).into());
        }

        let target = match address_type {
            SOCKS5_ADDR_IPV4 => {
                let mut addr = [0u8; 4];
                self.stream.read_exact(&mut addr).await?;
                let port = self.read_port().await?;
                TargetDescriptor::from_ipv4(Ipv4Addr::from(addr), port)
            }
            SOCKS5_ADDR_DOMAIN => {
                let mut len_buf = [0u8; 1];
                self.stream.read_exact(&mut len_buf).await?;
                let mut domain = vec![0u8; len_buf[0] as usize];
                self.stream.read_exact(&mut domain).await?;
                let domain = String::from_utf8(domain)
                    .map_err(|_| TunnelError::Protocol("domain is not UTF-8".into()))?;
                let port = self.read_port().await?;
                TargetDescriptor::from_domain(domain, port)
            }
            other => {
                return Err(
                    TunnelError::Protocol(format!("unsupported address type {other}")).into(),
                );
            }
        };

        Ok((command, target))
    }

    async fn read_port(&mut self) -> Result<u16> {
        let mut port = [0u8; 2];
        self.stream.read_exact(&mut port).await?;
        Ok(u16::from_be_bytes(port))
    }

    /// Reply `(5, status, 0, 1, bind_addr_be32, bind_port_be16)`. The
    /// reply always carries address type 1 with a 4-byte address.
    pub async fn send_reply(&mut self, status: u8, bind: Ipv4Addr, port: u16) -> Result<()> {
        let mut reply = Vec::with_capacity(10);
        reply.extend_from_slice(&[SOCKS5_VERSION, status, SOCKS5_RESERVED, SOCKS5_ADDR_IPV4]);
        reply.extend_from_slice(&bind.octets());
        reply.extend_from_slice(&port.to_be_bytes());
        self.stream.write_all(&reply).await?;
        self.stream.flush().await?;
        Ok(())
    }

    /// Hand the stream back for the relay phase.
    pub fn into_stream(self) -> S {
        self.stream
    }
}
