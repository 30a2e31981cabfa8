/// Per-connection handler: read one request head, answer it from the
/// responder, close.
use decoy_core::{InboundRequest, Responder, Response};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::Duration;

/// Handle a single client connection end-to-end.
pub async fn handle_client(
    mut client: TcpStream,
    client_addr: SocketAddr,
    responder: Arc<Responder>,
    timeout: Duration,
    max_head: usize,
) -> io::Result<()> {
    let mut buf = vec![0u8; max_head];
    let mut filled = 0;

    let request = loop {
        let n = tokio::time::timeout(timeout, client.read(&mut buf[filled..]))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "request head timeout"))??;

        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "client closed"));
        }
        filled += n;

        match InboundRequest::parse(&buf[..filled], client_addr) {
            Ok(Some((request, _))) => break request,
            Ok(None) => {
                if filled == buf.len() {
                    tracing::debug!("Request head from {} exceeds {} bytes", client_addr, max_head);
                    return send_and_close(&mut client, responder.bad_request()).await;
                }
                continue;
            }
            Err(e) => {
                tracing::debug!("Unparseable request from {}: {}", client_addr, e);
                return send_and_close(&mut client, responder.bad_request()).await;
            }
        }
    };

    let response = responder.handle(&request);
    send_and_close(&mut client, response).await
}

async fn send_and_close(client: &mut TcpStream, response: Response) -> io::Result<()> {
    client.write_all(&response.to_bytes()).await?;
    client.shutdown().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use decoy_core::config::RuntimeOptions;
    use decoy_core::observation::MemorySink;
    use decoy_core::ServerIdentity;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn make_responder(root: &std::path::Path) -> (Arc<Responder>, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let responder = Responder::new(
            root,
            ServerIdentity::fixed("Microsoft-IIS/8.5"),
            RuntimeOptions::default(),
            sink.clone(),
        )
        .unwrap();
        (Arc::new(responder), sink)
    }

    /// Serve exactly one connection, send `raw`, return everything the server wrote.
    async fn roundtrip(responder: Arc<Responder>, raw: &[u8], max_head: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let _ = handle_client(stream, peer, responder, TIMEOUT, max_head).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(raw).await.unwrap();

        let mut out = Vec::new();
        timeout(TIMEOUT, client.read_to_end(&mut out))
            .await
            .expect("response timeout")
            .unwrap();
        server.await.unwrap();
        String::from_utf8_lossy(&out).into_owned()
    }

    #[tokio::test]
    async fn test_serves_file_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("index.html"), "<h1>Intranet</h1>").unwrap();
        let (responder, sink) = make_responder(dir.path());

        let wire = roundtrip(responder, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n", 4096).await;
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("Server: Microsoft-IIS/8.5\r\n"));
        assert!(wire.contains("Content-Type: text/html\r\n"));
        assert!(wire.contains("Content-Length: 17\r\n"));
        assert!(wire.ends_with("\r\n\r\n<h1>Intranet</h1>"));

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].src_ip, "127.0.0.1");
    }

    #[tokio::test]
    async fn test_head_split_across_writes() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("about.html"), "about").unwrap();
        let (responder, _) = make_responder(dir.path());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            handle_client(stream, peer, responder, TIMEOUT, 4096).await
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"GET /abo").await.unwrap();
        client.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.write_all(b"ut HTTP/1.1\r\n\r\n").await.unwrap();

        let mut out = Vec::new();
        timeout(TIMEOUT, client.read_to_end(&mut out)).await.unwrap().unwrap();
        server.await.unwrap().unwrap();

        let wire = String::from_utf8(out).unwrap();
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.ends_with("about"));
    }

    #[tokio::test]
    async fn test_post_rejected_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (responder, sink) = make_responder(dir.path());

        let raw = b"POST /login HTTP/1.1\r\nContent-Length: 9\r\n\r\nuser=root";
        let wire = roundtrip(responder, raw, 4096).await;
        assert!(wire.starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
        assert!(wire.ends_with("<html><body>Method not allowed</body></html>"));
        assert_eq!(sink.records()[0].action, "POST");
    }

    #[tokio::test]
    async fn test_garbage_gets_bad_request() {
        let dir = tempfile::tempdir().unwrap();
        let (responder, sink) = make_responder(dir.path());

        let wire = roundtrip(responder, b"\x16\x03\x01\x00\xa5\x01\x00\x00\xa1", 4096).await;
        assert!(wire.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(wire.contains("Server: Microsoft-IIS/8.5\r\n"));
        assert!(sink.records().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_head_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (responder, sink) = make_responder(dir.path());

        // Exactly fills the head buffer without ever terminating the head.
        let mut raw = b"GET / HTTP/1.1\r\nX-Pad: ".to_vec();
        raw.resize(128, b'a');
        let wire = roundtrip(responder, &raw, 128).await;
        assert!(wire.starts_with("HTTP/1.1 400 Bad Request\r\n"));
        assert!(sink.records().is_empty());
    }
}
