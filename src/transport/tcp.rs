//! TCP connection setup.
//!
//! # Example
//!
//! ```ignore
//! use pine_client::transport::{connect, DEFAULT_HOST, DEFAULT_PORT};
//!
//! let stream = connect(DEFAULT_HOST, DEFAULT_PORT).await?;
//! ```

use tokio::net::TcpStream;

use crate::error::Result;

/// Default PINE host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default PINE port.
pub const DEFAULT_PORT: u16 = 28011;

/// Open a TCP connection to a PINE server.
///
/// Nagle is disabled; requests are small and latency bound.
pub async fn connect(host: &str, port: u16) -> Result<TcpStream> {
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    tracing::debug!("Connected to PINE server at {}:{}", host, port);
    Ok(stream)
}

/// Drop any bytes already waiting on the socket.
///
/// Leftovers from a previous client on the same server-side session would
/// otherwise be matched to our first request. Returns the number of bytes
/// discarded. Never waits for more data to arrive.
pub fn discard_stale(stream: &TcpStream) -> Result<usize> {
    let mut buf = [0u8; 1024];
    let mut discarded = 0;

    loop {
        match stream.try_read(&mut buf) {
            Ok(0) => break,
            Ok(n) => discarded += n,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
            Err(e) => return Err(e.into()),
        }
    }

    if discarded > 0 {
        tracing::warn!("Discarded {} stale bytes from the connection", discarded);
    }
    Ok(discarded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connect_and_discard_stale() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let accept = tokio::spawn(async move {
            let (mut peer, _) = listener.accept().await.unwrap();
            peer.write_all(b"left over").await.unwrap();
            peer
        });

        let stream = connect("127.0.0.1", port).await.unwrap();
        assert!(stream.nodelay().unwrap());
        let _peer = accept.await.unwrap();

        // Give the bytes time to land in the receive buffer.
        let mut discarded = 0;
        for _ in 0..50 {
            stream.readable().await.unwrap();
            discarded += discard_stale(&stream).unwrap();
            if discarded == 9 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(discarded, 9);
        assert_eq!(discard_stale(&stream).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(connect("127.0.0.1", port).await.is_err());
    }
}
