// # Transports
//
// UDP and TCP implementations of [`Transport`].
//
// Each call opens its own socket, so concurrent exchanges never share state.
// The timeout covers the whole attempt: resolving, connecting, sending and
// receiving.

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::error::{Error, Result};
use crate::traits::Transport;

/// Largest message accepted over UDP (EDNS-sized buffer)
const MAX_UDP_MESSAGE: usize = 4096;

/// One datagram out, one datagram in
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

/// Length-prefixed messages over a fresh TCP connection
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpTransport;

#[async_trait]
impl Transport for UdpTransport {
    async fn send(&self, server: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        with_timeout(server, timeout, async {
            let addr = resolve(server).await?;
            let local: SocketAddr = if addr.is_ipv4() {
                ([0, 0, 0, 0], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };

            let socket = UdpSocket::bind(local).await?;
            socket.connect(addr).await?;
            socket.send(request).await?;

            let mut buf = vec![0u8; MAX_UDP_MESSAGE];
            let len = socket.recv(&mut buf).await?;
            buf.truncate(len);
            Ok(buf)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "udp"
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn send(&self, server: &str, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let len = u16::try_from(request.len())
            .map_err(|_| Error::invalid_input("message too large for TCP framing"))?;

        with_timeout(server, timeout, async {
            let addr = resolve(server).await?;
            let mut stream = TcpStream::connect(addr).await?;

            let mut framed = Vec::with_capacity(request.len() + 2);
            framed.extend_from_slice(&len.to_be_bytes());
            framed.extend_from_slice(request);
            stream.write_all(&framed).await?;
            stream.flush().await?;

            let response_len = stream.read_u16().await?;
            let mut buf = vec![0u8; usize::from(response_len)];
            stream.read_exact(&mut buf).await?;
            Ok(buf)
        })
        .await
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}

async fn resolve(server: &str) -> Result<SocketAddr> {
    tokio::net::lookup_host(server)
        .await
        .map_err(|e| Error::transport(format!("Failed to resolve {}: {}", server, e)))?
        .next()
        .ok_or_else(|| Error::transport(format!("No addresses found for {}", server)))
}

async fn with_timeout<F>(server: &str, timeout: Duration, attempt: F) -> Result<Vec<u8>>
where
    F: std::future::Future<Output = Result<Vec<u8>>>,
{
    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            server: server.to_string(),
            timeout,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_udp_round_trip() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = server.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, peer) = server.recv_from(&mut buf).await.unwrap();
            let mut reply = buf[..len].to_vec();
            reply.reverse();
            server.send_to(&reply, peer).await.unwrap();
        });

        let response = UdpTransport
            .send(&addr.to_string(), b"abc", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response, b"cba");
    }

    #[tokio::test]
    async fn test_udp_timeout_is_retryable() {
        // Bound but never answers
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = silent.local_addr().unwrap();

        let err = UdpTransport
            .send(&addr.to_string(), b"abc", Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_tcp_uses_length_prefix() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let len = stream.read_u16().await.unwrap();
            let mut buf = vec![0u8; usize::from(len)];
            stream.read_exact(&mut buf).await.unwrap();
            assert_eq!(buf, b"query");

            stream.write_all(&[0, 6]).await.unwrap();
            stream.write_all(b"answer").await.unwrap();
        });

        let response = TcpTransport
            .send(&addr.to_string(), b"query", Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(response, b"answer");
    }

    #[tokio::test]
    async fn test_tcp_connection_refused_is_retryable() {
        // Grab a free port, then close it
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpTransport
            .send(&addr.to_string(), b"query", Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(err.is_retryable(), "unexpected error: {}", err);
    }
}
