//! Per-link socket task.
//!
//! Owns the framed stream for one connection. Decoded lines go to the
//! event loop; lines the loop wants written arrive on an unbounded queue so
//! the loop never waits on a slow peer.

use futures_util::{SinkExt, StreamExt};
use slirc_wire::{LineCodec, ProtocolError};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tracing::{Instrument, debug, warn};

use crate::sync::ConnId;
use crate::telemetry::spans;

use super::stream::LinkStream;

/// What the event loop asks a link task to do.
#[derive(Debug)]
pub(crate) enum Outbound {
    Line(String),
    /// Flush what is queued and hang up.
    Close,
}

/// What a link task reports back.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    Line { conn: ConnId, line: String },
    /// The peer broke framing (overlong line, bad UTF-8).
    Violation { conn: ConnId, reason: String },
    Closed { conn: ConnId, reason: String },
}

pub(crate) type Writer = mpsc::UnboundedSender<Outbound>;

/// Start the task for `stream`, returning the queue that feeds it.
pub(crate) fn spawn(
    conn: ConnId,
    stream: LinkStream,
    label: String,
    max_line: usize,
    events: mpsc::Sender<LinkEvent>,
) -> Writer {
    let (tx, rx) = mpsc::unbounded_channel();
    let span = spans::link(conn.0, &label);
    tokio::spawn(run(conn, stream, max_line, rx, events).instrument(span));
    tx
}

async fn run(
    conn: ConnId,
    stream: LinkStream,
    max_line: usize,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::Sender<LinkEvent>,
) {
    let mut framed = Framed::new(stream, LineCodec::with_max_len(max_line));
    let reason = loop {
        tokio::select! {
            next = outbound.recv() => match next {
                Some(Outbound::Line(line)) => {
                    if let Err(e) = framed.send(line).await {
                        break Some(e.to_string());
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = SinkExt::<String>::close(&mut framed).await;
                    debug!("link closed locally");
                    break None;
                }
            },
            read = framed.next() => match read {
                Some(Ok(line)) => {
                    if events.send(LinkEvent::Line { conn, line }).await.is_err() {
                        break None;
                    }
                }
                Some(Err(ProtocolError::Io(e))) => break Some(e.to_string()),
                Some(Err(e)) => {
                    warn!(error = %e, "framing violation");
                    let _ = events.send(LinkEvent::Violation { conn, reason: e.to_string() }).await;
                    // Wait for the loop to queue ERROR and Close.
                    while let Some(next) = outbound.recv().await {
                        match next {
                            Outbound::Line(line) => {
                                let _ = framed.send(line).await;
                            }
                            Outbound::Close => break,
                        }
                    }
                    break None;
                }
                None => break Some("Connection closed".to_string()),
            },
        }
    };
    if let Some(reason) = reason {
        let _ = events.send(LinkEvent::Closed { conn, reason }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (LinkStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).await.unwrap();
        let (server, _) = listener.accept().await.unwrap();
        (LinkStream::Plain(server), client)
    }

    #[tokio::test]
    async fn lines_flow_both_ways() {
        let (stream, client) = pair().await;
        let (events_tx, mut events) = mpsc::channel(8);
        let writer = spawn(ConnId(1), stream, "test".into(), 512, events_tx);

        let (read, mut write) = client.into_split();
        write.write_all(b":leaf PING leaf\r\n").await.unwrap();
        match events.recv().await.unwrap() {
            LinkEvent::Line { conn, line } => {
                assert_eq!(conn, ConnId(1));
                assert_eq!(line, ":leaf PING leaf");
            }
            other => panic!("unexpected {other:?}"),
        }

        writer.send(Outbound::Line(":hub PONG leaf".into())).unwrap();
        let mut lines = BufReader::new(read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), ":hub PONG leaf");

        writer.send(Outbound::Close).unwrap();
        assert!(lines.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn remote_close_is_reported() {
        let (stream, client) = pair().await;
        let (events_tx, mut events) = mpsc::channel(8);
        let _writer = spawn(ConnId(2), stream, "test".into(), 512, events_tx);
        drop(client);
        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::Closed { conn: ConnId(2), .. }
        ));
    }

    #[tokio::test]
    async fn overlong_line_is_a_violation() {
        let (stream, mut client) = pair().await;
        let (events_tx, mut events) = mpsc::channel(8);
        let _writer = spawn(ConnId(3), stream, "test".into(), 32, events_tx);
        client.write_all(&[b'x'; 64]).await.unwrap();
        client.write_all(b"\r\n").await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            LinkEvent::Violation { conn: ConnId(3), .. }
        ));
    }
}
