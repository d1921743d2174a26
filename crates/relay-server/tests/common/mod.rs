//! Loopback test helpers.
//!
//! [`TestServer`] runs a real relay on an ephemeral port in a background
//! thread; [`TestClient`] is a blocking line client with read timeouts so a
//! missing line fails the test instead of hanging it.

#![allow(dead_code)]

use std::{
    io::{self, BufRead, BufReader, Write},
    net::{SocketAddr, TcpStream},
    thread::JoinHandle,
    time::Duration,
};

use relay_server::{RelayConfig, Server, ServerError, ServerRuntimeConfig, ShutdownHandle};
use socket2::SockRef;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Relay running on a background thread. Shut down on drop.
pub struct TestServer {
    addr: SocketAddr,
    handle: ShutdownHandle,
    thread: Option<JoinHandle<Result<(), ServerError>>>,
}

impl TestServer {
    pub fn start() -> Self {
        Self::with_config(RelayConfig::default())
    }

    pub fn with_config(driver: RelayConfig) -> Self {
        let server = Server::bind(ServerRuntimeConfig {
            bind_address: "127.0.0.1:0".to_string(),
            driver,
            ..Default::default()
        })
        .unwrap();

        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let thread = std::thread::spawn(move || server.run());

        Self { addr, handle, thread: Some(thread) }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Connect and complete the handshake, consuming the welcome banner.
    pub fn join(&self, name: &str) -> TestClient {
        let mut client = TestClient::connect(self.addr);
        client.send(&format!("JOIN {name}\n"));
        assert_eq!(client.read_line(), "[server] Welcome!");
        client
    }

    /// Stop the loop and wait for it.
    pub fn stop(mut self) -> Result<(), ServerError> {
        self.handle.shutdown().unwrap();
        self.thread.take().map_or(Ok(()), |t| t.join().unwrap())
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.handle.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Blocking line client.
pub struct TestClient {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl TestClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        stream.set_nodelay(true).unwrap();
        let writer = stream.try_clone().unwrap();

        Self { reader: BufReader::new(stream), writer }
    }

    pub fn send(&mut self, text: &str) {
        self.send_bytes(text.as_bytes());
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) {
        self.writer.write_all(bytes).unwrap();
        self.writer.flush().unwrap();
    }

    /// Next line without its terminator. Panics on timeout or EOF.
    pub fn read_line(&mut self) -> String {
        let mut line = String::new();
        let n = self.reader.read_line(&mut line).unwrap();
        assert!(n > 0, "connection closed while waiting for a line");
        assert!(line.ends_with('\n'), "partial line: {line:?}");
        line.pop();
        line
    }

    /// Next line, or the read error (a timeout included).
    pub fn read_line_result(&mut self) -> io::Result<String> {
        let mut line = String::new();
        self.reader.read_line(&mut line)?;
        Ok(line.trim_end_matches('\n').to_string())
    }

    /// Independent handle to the write half, for writing from another thread.
    pub fn writer(&self) -> TcpStream {
        self.writer.try_clone().unwrap()
    }

    /// Abort the connection with a TCP reset instead of a clean close.
    pub fn reset(self) {
        SockRef::from(&self.writer).set_linger(Some(Duration::ZERO)).unwrap();
    }

    /// Next line, or `None` if the relay closed the connection first.
    pub fn try_read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches('\n').to_string()),
            Err(e) if e.kind() == io::ErrorKind::ConnectionReset => None,
            Err(e) => panic!("read failed: {e}"),
        }
    }

    /// Wait until the relay closes this connection. Returns any lines that
    /// arrived first.
    pub fn expect_closed(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.try_read_line() {
            lines.push(line);
        }
        lines
    }
}
