//! Plain HTTP on the WebSocket port
//!
//! Requests without a WebSocket upgrade are answered directly: `GET /` gets a
//! 200 liveness response, anything else a 404. Upgrade requests are left
//! untouched for the handshake.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Largest request head inspected before handing the stream to the handshake.
const MAX_HEAD: usize = 8 * 1024;
/// Wait between peeks while the request head is still arriving.
const HEAD_POLL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum RequestHead {
    Upgrade,
    Plain {
        method: String,
        path: String,
        len: usize,
    },
}

/// Classifies a complete request head, or returns `None` if the head has not
/// fully arrived yet.
pub(crate) fn classify(data: &[u8]) -> Option<RequestHead> {
    let end = data.windows(4).position(|w| w == b"\r\n\r\n")? + 4;
    let head = String::from_utf8_lossy(&data[..end]);
    let mut lines = head.split("\r\n");

    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let target = request_line.next().unwrap_or_default();

    let upgrade = lines.any(|line| {
        line.split_once(':').is_some_and(|(name, value)| {
            name.trim().eq_ignore_ascii_case("upgrade")
                && value.to_ascii_lowercase().contains("websocket")
        })
    });
    if upgrade {
        return Some(RequestHead::Upgrade);
    }

    let path = target.split('?').next().unwrap_or_default().to_string();
    Some(RequestHead::Plain {
        method,
        path,
        len: end,
    })
}

/// Peeks at the request head without consuming it. `None` means the peer
/// closed before sending anything.
pub(crate) async fn peek_head(stream: &TcpStream) -> io::Result<Option<RequestHead>> {
    let mut buf = vec![0u8; MAX_HEAD];
    loop {
        let n = stream.peek(&mut buf).await?;
        if n == 0 {
            return Ok(None);
        }
        if let Some(head) = classify(&buf[..n]) {
            return Ok(Some(head));
        }
        if n == MAX_HEAD {
            // let the handshake reject it
            return Ok(Some(RequestHead::Upgrade));
        }
        tokio::time::sleep(HEAD_POLL).await;
    }
}

/// Consumes the request head and writes a minimal response, then closes.
pub(crate) async fn respond(stream: &mut TcpStream, method: &str, path: &str, len: usize) -> io::Result<u16> {
    let mut head = vec![0u8; len];
    stream.read_exact(&mut head).await?;

    let (status, reason, body) = if method == "GET" && path == "/" {
        (200, "OK", "ok\n")
    } else {
        (404, "Not Found", "not found\n")
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(status)
}
