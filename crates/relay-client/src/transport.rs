//! TCP transport for the client.
//!
//! Provides [`ConnectedClient`], which handles socket I/O for a joined
//! session. Outbound text goes in on a channel and inbound lines come out on
//! another, so any front-end can sit on top.

use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::mpsc,
};

use crate::{ClientError, line};

/// Something the relay sent, or the end of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundEvent {
    /// One line from the relay, terminator stripped
    Line(String),
    /// The relay closed the connection
    Closed,
    /// Reading from the relay failed
    Failed(String),
}

/// Handle to a joined relay session.
///
/// An internal task owns the socket; dropping the handle or calling
/// [`ConnectedClient::stop`] ends it.
pub struct ConnectedClient {
    /// Lines to send, unterminated
    to_server: mpsc::Sender<String>,
    /// Lines received
    from_server: mpsc::Receiver<InboundEvent>,
    /// Name sent in the `JOIN` line
    display_name: String,
    /// Abort handle to stop the connection task.
    abort_handle: tokio::task::AbortHandle,
}

impl ConnectedClient {
    /// Send one line of text. Empty text is ignored.
    pub async fn send_line(&self, text: &str) -> Result<(), ClientError> {
        if text.is_empty() {
            return Ok(());
        }

        let line = line::chat_line(text)?;
        self.to_server.send(line).await.map_err(|_| ClientError::Closed)
    }

    /// Next inbound event. `None` once the connection task has finished and
    /// every event has been taken.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        self.from_server.recv().await
    }

    /// Name this session joined under.
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Stop the connection.
    pub fn stop(&self) {
        self.abort_handle.abort();
    }
}

impl Drop for ConnectedClient {
    fn drop(&mut self) {
        self.abort_handle.abort();
    }
}

impl std::fmt::Debug for ConnectedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectedClient")
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Connect to a relay and join as `name`.
///
/// The name is trimmed and capped before it is sent; the `JOIN` line is
/// written before this returns.
pub async fn connect(server_addr: &str, name: &str) -> Result<ConnectedClient, ClientError> {
    let display_name = line::display_name(name)?;

    let stream = TcpStream::connect(server_addr)
        .await
        .map_err(|e| ClientError::Connection(format!("connect to {server_addr} failed: {e}")))?;
    stream.set_nodelay(true).map_err(|e| ClientError::Connection(e.to_string()))?;

    let (reader, mut writer) = stream.into_split();

    writer
        .write_all(line::join_line(&display_name).as_bytes())
        .await
        .map_err(|e| ClientError::Connection(format!("sending JOIN failed: {e}")))?;

    tracing::debug!("joined {} as {}", server_addr, display_name);

    let (to_server_tx, to_server_rx) = mpsc::channel::<String>(32);
    let (from_server_tx, from_server_rx) = mpsc::channel::<InboundEvent>(32);

    let handle = tokio::spawn(run_connection(reader, writer, to_server_rx, from_server_tx));

    Ok(ConnectedClient {
        to_server: to_server_tx,
        from_server: from_server_rx,
        display_name,
        abort_handle: handle.abort_handle(),
    })
}

/// Run the connection until the relay closes it.
async fn run_connection(
    reader: OwnedReadHalf,
    writer: OwnedWriteHalf,
    to_server: mpsc::Receiver<String>,
    from_server: mpsc::Sender<InboundEvent>,
) {
    let write_handle = tokio::spawn(write_loop(writer, to_server));

    let end = read_loop(reader, &from_server).await;
    write_handle.abort();

    // Receiver may already be gone
    let _ = from_server.send(end).await;
}

/// Forward inbound lines until EOF or a read error, which is returned.
async fn read_loop(reader: OwnedReadHalf, from_server: &mpsc::Sender<InboundEvent>) -> InboundEvent {
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => return InboundEvent::Closed,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                }
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }

                let line = String::from_utf8_lossy(&buf).into_owned();
                if from_server.send(InboundEvent::Line(line)).await.is_err() {
                    return InboundEvent::Closed;
                }
            },
            Err(e) => {
                tracing::debug!("read failed: {}", e);
                return InboundEvent::Failed(e.to_string());
            },
        }
    }
}

/// Write outbound lines until the handle is dropped or a write fails.
async fn write_loop(mut writer: OwnedWriteHalf, mut to_server: mpsc::Receiver<String>) {
    while let Some(line) = to_server.recv().await {
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            tracing::debug!("write failed: {}", e);
            return;
        }
    }

    let _ = writer.shutdown().await;
}
