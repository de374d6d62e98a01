//! Line-oriented JSON-RPC client used by the end-to-end suites.

use std::io::{self, BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;

use serde_json::{Value, json};

const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Blocking client over a single TCP connection.
pub struct RpcClient {
    writer: TcpStream,
    reader: BufReader<TcpStream>,
    stash: Vec<Value>,
}

impl RpcClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect to server");
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .expect("set read timeout");
        let reader = BufReader::new(stream.try_clone().expect("clone client stream"));
        Self {
            writer: stream,
            reader,
            stash: Vec::new(),
        }
    }

    pub fn send_line(&mut self, line: &str) {
        self.writer
            .write_all(format!("{line}\n").as_bytes())
            .expect("write request line");
    }

    pub fn send_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.writer.write_all(bytes)
    }

    pub fn call(&mut self, id: u64, method: &str, params: Value) {
        let request = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});
        self.send_line(&request.to_string());
    }

    pub fn notify(&mut self, method: &str, params: Value) {
        let request = json!({"jsonrpc": "2.0", "method": method, "params": params});
        self.send_line(&request.to_string());
    }

    /// Next message off the wire, or `None` once the server closed the
    /// connection.
    pub fn try_read_message(&mut self) -> io::Result<Option<Value>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let value = serde_json::from_str(&line)
            .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, error))?;
        Ok(Some(value))
    }

    /// Next message in arrival order, including stashed ones.
    pub fn read_message(&mut self) -> Value {
        if !self.stash.is_empty() {
            return self.stash.remove(0);
        }
        self.try_read_message()
            .expect("read message")
            .expect("server closed the connection")
    }

    /// The response for `id`, keeping any other messages for later reads.
    pub fn read_response(&mut self, id: u64) -> Value {
        if let Some(position) = self.stash.iter().position(|message| message["id"] == json!(id)) {
            return self.stash.remove(position);
        }
        loop {
            let message = self
                .try_read_message()
                .expect("read message")
                .expect("server closed the connection");
            if message["id"] == json!(id) {
                return message;
            }
            self.stash.push(message);
        }
    }

    /// Whether the server has closed this connection.
    pub fn is_closed_by_server(&mut self) -> bool {
        matches!(self.try_read_message(), Ok(None) | Err(_))
    }
}

pub fn error_code(message: &Value) -> Option<i64> {
    message["error"]["code"].as_i64()
}
