//! TCP ingestion feed
//!
//! Each reporting agent keeps a connection open and writes one JSON line per
//! report. Every connection gets its own task; a bad line or record is logged
//! and skipped without closing the connection.

use anyhow::{Context, Result};
use chrono::Utc;
use memwatch_lib::{
    codec::decode_line,
    observability::{EngineMetrics, StructuredLogger},
    Engine, EngineError,
};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Handles shared by every feed connection
#[derive(Clone)]
pub struct FeedContext {
    pub engine: Arc<Engine>,
    pub metrics: EngineMetrics,
    pub logger: StructuredLogger,
}

/// Counts for one connection's lifetime
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionStats {
    pub lines: usize,
    pub accepted: usize,
    pub rejected: usize,
}

/// Bind the feed port and serve connections until shutdown
pub async fn listen(
    port: u16,
    ctx: FeedContext,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind feed listener on {}", addr))?;
    info!(addr = %addr, "Starting ingestion feed listener");

    serve(listener, ctx, shutdown).await
}

/// Accept loop over an already bound listener
pub async fn serve(
    listener: TcpListener,
    ctx: FeedContext,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept feed connection");
                        continue;
                    }
                };

                let ctx = ctx.clone();
                let mut conn_shutdown = shutdown.resubscribe();
                tokio::spawn(async move {
                    let peer = peer.to_string();
                    ctx.metrics.inc_feed_connections();
                    ctx.logger.log_feed_connection(&peer, true);

                    let reader = BufReader::new(stream);
                    tokio::select! {
                        stats = handle_connection(reader, &peer, &ctx) => {
                            debug!(
                                peer = %peer,
                                lines = stats.lines,
                                accepted = stats.accepted,
                                rejected = stats.rejected,
                                "Feed connection drained"
                            );
                        }
                        _ = conn_shutdown.recv() => {}
                    }

                    ctx.logger.log_feed_connection(&peer, false);
                    ctx.metrics.dec_feed_connections();
                });
            }
            _ = shutdown.recv() => {
                info!("Shutting down ingestion feed listener");
                break;
            }
        }
    }

    Ok(())
}

/// Longest accepted feed line in bytes, newline included
pub const MAX_LINE_BYTES: usize = 64 * 1024;

/// Read lines until EOF, feeding every decoded record to the engine
///
/// Lines longer than [`MAX_LINE_BYTES`] or not valid UTF-8 are rejected
/// as malformed and the connection keeps reading.
pub async fn handle_connection<R>(mut reader: R, peer: &str, ctx: &FeedContext) -> ConnectionStats
where
    R: AsyncBufRead + Unpin,
{
    let mut stats = ConnectionStats::default();
    let mut buf = Vec::with_capacity(1024);

    loop {
        buf.clear();
        let read = (&mut reader)
            .take(MAX_LINE_BYTES as u64)
            .read_until(b'\n', &mut buf)
            .await;
        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!(peer = %peer, error = %e, "Feed connection read failed");
                break;
            }
        };
        stats.lines += 1;

        let decoded = if n == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
            if let Err(e) = skip_rest_of_line(&mut reader).await {
                warn!(peer = %peer, error = %e, "Feed connection read failed");
                break;
            }
            Err(EngineError::malformed(format!(
                "line exceeds {} bytes",
                MAX_LINE_BYTES
            )))
        } else {
            match std::str::from_utf8(&buf) {
                Ok(line) => decode_line(line, Utc::now().timestamp()),
                Err(e) => Err(EngineError::malformed(format!("line is not UTF-8: {}", e))),
            }
        };

        let records = match decoded {
            Ok(records) => records,
            Err(e) => {
                stats.rejected += 1;
                ctx.metrics.inc_records_rejected();
                ctx.logger.log_record_rejected(peer, &e.to_string());
                continue;
            }
        };

        for record in &records {
            match ctx.engine.ingest(record) {
                Ok(_) => stats.accepted += 1,
                Err(e) => {
                    stats.rejected += 1;
                    ctx.logger.log_record_rejected(peer, &e.to_string());
                }
            }
        }
    }

    stats
}

/// Discard input up to and including the next newline
async fn skip_rest_of_line<R>(reader: &mut R) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let (used, done) = {
            let chunk = reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(());
            }
            match chunk.iter().position(|b| *b == b'\n') {
                Some(i) => (i + 1, true),
                None => (chunk.len(), false),
            }
        };
        reader.consume(used);
        if done {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    fn context() -> FeedContext {
        FeedContext {
            engine: Arc::new(Engine::default()),
            metrics: EngineMetrics::new(),
            logger: StructuredLogger::new("test-node"),
        }
    }

    #[tokio::test]
    async fn test_handles_objects_and_arrays() {
        let ctx = context();
        let feed = concat!(
            r#"{"SystemId":"sys-1","AllocKB":2048,"FreeKB":1024,"TimeStamp":100}"#,
            "\n",
            r#"[{"SystemId":"sys-1","AllocKB":4096,"FreeKB":1024,"TimeStamp":101},{"SystemId":"sys-2","Ratio":42.0,"TimeStamp":101}]"#,
            "\n",
        );

        let stats = handle_connection(BufReader::new(feed.as_bytes()), "peer", &ctx).await;

        assert_eq!(stats.lines, 2);
        assert_eq!(stats.accepted, 3);
        assert_eq!(stats.rejected, 0);
        assert_eq!(ctx.engine.known_systems(), vec!["sys-1", "sys-2"]);
        assert_eq!(ctx.engine.latest("sys-1").unwrap().allocated_kb, 4096);
    }

    #[tokio::test]
    async fn test_bad_lines_do_not_stop_the_feed() {
        let ctx = context();
        let feed = concat!(
            "this is not json\n",
            "\n",
            r#"{"SystemId":"","AllocKB":10,"TimeStamp":1}"#,
            "\n",
            r#"{"SystemId":"sys-1","AllocKB":10,"FreeKB":10,"TimeStamp":2}"#,
            "\n",
        );

        let stats = handle_connection(BufReader::new(feed.as_bytes()), "peer", &ctx).await;

        assert_eq!(stats.lines, 4);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 2);
        assert_eq!(ctx.engine.latest("sys-1").unwrap().ratio, 100.0);
    }

    #[tokio::test]
    async fn test_non_utf8_line_does_not_stop_the_feed() {
        let ctx = context();
        let mut feed = Vec::new();
        feed.extend_from_slice(b"{\"SystemId\":\"a\",\"Ratio\":10.0,\"TimeStamp\":1}\n");
        feed.extend_from_slice(b"\xff\xfe garbage\n");
        feed.extend_from_slice(b"{\"SystemId\":\"b\",\"Ratio\":20.0,\"TimeStamp\":2}\n");

        let stats = handle_connection(BufReader::new(feed.as_slice()), "peer", &ctx).await;

        assert_eq!(
            stats,
            ConnectionStats {
                lines: 3,
                accepted: 2,
                rejected: 1,
            }
        );
        assert_eq!(ctx.engine.known_systems(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_oversized_line_is_rejected_and_skipped() {
        let ctx = context();
        let mut feed = Vec::new();
        feed.extend_from_slice(b"{\"SystemId\":\"big\",\"Process\":\"");
        feed.extend(std::iter::repeat(b'x').take(3 * MAX_LINE_BYTES));
        feed.extend_from_slice(b"\",\"Ratio\":1.0,\"TimeStamp\":1}\n");
        feed.extend_from_slice(b"{\"SystemId\":\"small\",\"Ratio\":2.0,\"TimeStamp\":2}\n");

        let stats = handle_connection(BufReader::new(feed.as_slice()), "peer", &ctx).await;

        assert_eq!(stats.lines, 2);
        assert_eq!(stats.accepted, 1);
        assert_eq!(stats.rejected, 1);
        assert_eq!(ctx.engine.known_systems(), vec!["small"]);
    }

    #[tokio::test]
    async fn test_line_at_the_limit_is_accepted() {
        let ctx = context();
        let head = b"{\"SystemId\":\"edge\",\"Ratio\":3.0,\"TimeStamp\":3}";
        let mut feed = head.to_vec();
        feed.extend(std::iter::repeat(b' ').take(MAX_LINE_BYTES - head.len() - 1));
        feed.push(b'\n');
        assert_eq!(feed.len(), MAX_LINE_BYTES);

        let stats = handle_connection(BufReader::new(feed.as_slice()), "peer", &ctx).await;

        assert_eq!(stats.accepted, 1);
        assert_eq!(ctx.engine.latest("edge").unwrap().ratio, 3.0);
    }

    #[tokio::test]
    async fn test_missing_timestamp_is_stamped() {
        let ctx = context();
        let before = Utc::now().timestamp();
        let feed = "{\"SystemId\":\"sys-1\",\"AllocKB\":10,\"FreeKB\":10,\"TimeStamp\":0}\n";

        handle_connection(BufReader::new(feed.as_bytes()), "peer", &ctx).await;

        let snapshot = ctx.engine.latest("sys-1").unwrap();
        assert!(snapshot.timestamp_secs >= before);
    }

    #[tokio::test]
    async fn test_serves_tcp_connections_until_shutdown() {
        let ctx = context();
        let engine = Arc::clone(&ctx.engine);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let server = tokio::spawn(serve(listener, ctx, shutdown_rx));

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"{\"SystemId\":\"tcp-1\",\"Ratio\":12.5,\"TimeStamp\":5}\n")
            .await
            .unwrap();
        stream.shutdown().await.unwrap();

        let mut attempts = 0;
        while engine.latest("tcp-1").is_none() && attempts < 100 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            attempts += 1;
        }
        assert_eq!(engine.latest("tcp-1").unwrap().ratio, 12.5);

        shutdown_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
    }
}
