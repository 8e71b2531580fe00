//! Line transport: byte streams in, sanitized text lines out.
//!
//! Three backends share one trait. The address in `transport.port` selects
//! the backend: `tcp://host:port` connects a socket, an existing regular
//! file replays captured output, anything else is treated as a serial
//! device. All backends feed the same newline scanner, so the reassembly
//! logic upstream never knows which one it is reading from.

#![allow(missing_docs)]

pub mod serial;

use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use memchr::memchr;

use crate::core::config::TransportConfig;
use crate::core::errors::{Result, ScrError};

/// Outcome of one blocking line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineRead {
    /// A complete sanitized line (no terminator, no trailing CR).
    Line(String),
    /// The read window elapsed with no complete line. Not an error.
    Timeout,
    /// The stream ended. Replay files and closed sockets reach this.
    Eof,
}

/// A blocking source of text lines.
pub trait LineSource {
    /// Block up to the configured timeout for the next complete line.
    fn read_line(&mut self) -> Result<LineRead>;

    /// Human-readable address, for logging.
    fn describe(&self) -> String;
}

/// Open the backend selected by the configured address.
pub fn open_line_source(cfg: &TransportConfig) -> Result<Box<dyn LineSource>> {
    if let Some(addr) = cfg.port.strip_prefix("tcp://") {
        return Ok(Box::new(TcpLineSource::connect(addr, cfg.read_timeout_ms)?));
    }

    let path = Path::new(&cfg.port);
    if path.is_file() {
        return Ok(Box::new(FileLineSource::open(path)?));
    }

    Ok(Box::new(serial::SerialLineSource::open(cfg)?))
}

// ──────────────────── line buffer ────────────────────

/// Pending bytes tolerated without a line terminator. A healthy telemetry
/// line is tens of bytes; anything past this is noise, typically from a
/// mismatched baud rate producing binary garbage.
const MAX_PENDING_BYTES: usize = 8 * 1024;

/// Accumulates raw bytes and yields one sanitized line per newline found.
///
/// Partial lines survive across reads: a cycle marker split over two read
/// windows is still detected once its terminator arrives. Bytes that are not
/// valid UTF-8 are replaced, never dropped wholesale. Unterminated input is
/// bounded: once the pending bytes exceed [`MAX_PENDING_BYTES`] with no
/// newline in sight, they are discarded with a diagnostic.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Append freshly read bytes.
    pub(crate) fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
        if self.buf.len() > MAX_PENDING_BYTES && memchr(b'\n', &self.buf).is_none() {
            eprintln!(
                "[SCR-TRANSPORT] discarding {} pending bytes with no line terminator",
                self.buf.len()
            );
            self.buf.clear();
        }
    }

    /// Pop the next complete line, if one is buffered.
    pub(crate) fn next_line(&mut self) -> Option<String> {
        let pos = memchr(b'\n', &self.buf)?;
        let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
        line.pop(); // the newline itself
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        let text = String::from_utf8_lossy(&line).trim_end().to_string();
        Some(text)
    }

    /// Bytes held without a terminator yet.
    pub(crate) fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

// ──────────────────── tcp backend ────────────────────

/// Reads lines from a TCP stream, typically a serial-over-network bridge.
#[derive(Debug)]
pub struct TcpLineSource {
    stream: TcpStream,
    addr: String,
    buffer: LineBuffer,
}

impl TcpLineSource {
    pub fn connect(addr: &str, read_timeout_ms: u64) -> Result<Self> {
        let stream = TcpStream::connect(addr).map_err(|error| ScrError::TransportOpen {
            port: format!("tcp://{addr}"),
            details: error.to_string(),
        })?;
        stream
            .set_read_timeout(Some(Duration::from_millis(read_timeout_ms)))
            .map_err(|error| ScrError::TransportOpen {
                port: format!("tcp://{addr}"),
                details: format!("set_read_timeout: {error}"),
            })?;
        Ok(Self {
            stream,
            addr: addr.to_string(),
            buffer: LineBuffer::new(),
        })
    }
}

impl LineSource for TcpLineSource {
    fn read_line(&mut self) -> Result<LineRead> {
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(LineRead::Line(line));
            }

            let mut chunk = [0u8; 512];
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(LineRead::Eof),
                Ok(n) => self.buffer.push(&chunk[..n]),
                Err(error)
                    if matches!(error.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
                {
                    return Ok(LineRead::Timeout);
                }
                Err(error) => {
                    return Err(ScrError::TransportRead {
                        port: self.describe(),
                        source: error,
                    });
                }
            }
        }
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

// ──────────────────── file replay backend ────────────────────

/// Replays a captured log file line by line, then reports `Eof`.
#[derive(Debug)]
pub struct FileLineSource {
    reader: BufReader<File>,
    path: String,
    buffer: LineBuffer,
}

impl FileLineSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|error| ScrError::TransportOpen {
            port: path.display().to_string(),
            details: error.to_string(),
        })?;
        Ok(Self {
            reader: BufReader::new(file),
            path: path.display().to_string(),
            buffer: LineBuffer::new(),
        })
    }
}

impl LineSource for FileLineSource {
    fn read_line(&mut self) -> Result<LineRead> {
        loop {
            if let Some(line) = self.buffer.next_line() {
                return Ok(LineRead::Line(line));
            }

            let mut chunk = [0u8; 4096];
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    // A final unterminated line is still delivered.
                    if self.buffer.pending_len() > 0 {
                        self.buffer.push(b"\n");
                        continue;
                    }
                    return Ok(LineRead::Eof);
                }
                Ok(n) => self.buffer.push(&chunk[..n]),
                Err(error) => {
                    return Err(ScrError::TransportRead {
                        port: self.path.clone(),
                        source: error,
                    });
                }
            }
        }
    }

    fn describe(&self) -> String {
        self.path.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    #[test]
    fn line_buffer_splits_on_newline() {
        let mut buf = LineBuffer::new();
        buf.push(b"Humedad: 42%\nLuz: 80%\n");
        assert_eq!(buf.next_line().as_deref(), Some("Humedad: 42%"));
        assert_eq!(buf.next_line().as_deref(), Some("Luz: 80%"));
        assert_eq!(buf.next_line(), None);
    }

    #[test]
    fn line_buffer_strips_carriage_return() {
        let mut buf = LineBuffer::new();
        buf.push(b"Modo: Manual\r\n");
        assert_eq!(buf.next_line().as_deref(), Some("Modo: Manual"));
    }

    #[test]
    fn partial_line_survives_across_pushes() {
        let mut buf = LineBuffer::new();
        buf.push(b"---FIN_");
        assert_eq!(buf.next_line(), None);
        assert_eq!(buf.pending_len(), 7);
        buf.push(b"CICLO---\n");
        assert_eq!(buf.next_line().as_deref(), Some("---FIN_CICLO---"));
    }

    #[test]
    fn runaway_unterminated_input_is_bounded() {
        let mut buf = LineBuffer::new();
        // Baud-mismatch garbage: no newline ever arrives.
        buf.push(&[0x55u8; MAX_PENDING_BYTES + 512]);
        assert_eq!(buf.pending_len(), 0, "oversized junk must be discarded");

        // The buffer keeps working after the discard.
        buf.push(b"Modo: Manual\n");
        assert_eq!(buf.next_line().as_deref(), Some("Modo: Manual"));
    }

    #[test]
    fn large_buffered_input_with_newlines_is_kept() {
        let mut buf = LineBuffer::new();
        let mut chunk = vec![b'a'; MAX_PENDING_BYTES + 512];
        chunk[0] = b'\n';
        buf.push(&chunk);
        // A terminator anywhere means real lines are in flight.
        assert_eq!(buf.next_line().as_deref(), Some(""));
        assert!(buf.pending_len() > MAX_PENDING_BYTES);
    }

    #[test]
    fn invalid_utf8_is_replaced_not_dropped() {
        let mut buf = LineBuffer::new();
        buf.push(b"Temp: 23.5C \xff\xfe\n");
        let line = buf.next_line().unwrap();
        assert!(line.starts_with("Temp: 23.5C"));
    }

    #[test]
    fn empty_line_yields_empty_string() {
        let mut buf = LineBuffer::new();
        buf.push(b"\n");
        assert_eq!(buf.next_line().as_deref(), Some(""));
    }

    #[test]
    fn file_source_replays_then_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.log");
        std::fs::write(&path, "Modo: Manual\nPIR: Detectado Buzzer: Encendido\n").unwrap();

        let mut source = FileLineSource::open(&path).unwrap();
        assert_eq!(
            source.read_line().unwrap(),
            LineRead::Line("Modo: Manual".to_string())
        );
        assert_eq!(
            source.read_line().unwrap(),
            LineRead::Line("PIR: Detectado Buzzer: Encendido".to_string())
        );
        assert_eq!(source.read_line().unwrap(), LineRead::Eof);
    }

    #[test]
    fn file_source_delivers_final_unterminated_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.log");
        std::fs::write(&path, "Modo: Manual").unwrap();

        let mut source = FileLineSource::open(&path).unwrap();
        assert_eq!(
            source.read_line().unwrap(),
            LineRead::Line("Modo: Manual".to_string())
        );
        assert_eq!(source.read_line().unwrap(), LineRead::Eof);
    }

    #[test]
    fn open_line_source_dispatches_to_file_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.log");
        std::fs::write(&path, "Modo: Manual\n").unwrap();

        let cfg = TransportConfig {
            port: path.display().to_string(),
            ..TransportConfig::default()
        };
        let mut source = open_line_source(&cfg).unwrap();
        assert_eq!(
            source.read_line().unwrap(),
            LineRead::Line("Modo: Manual".to_string())
        );
    }

    #[test]
    fn tcp_source_reads_lines_and_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            conn.write_all(b"Modo: Manual\n").unwrap();
            // Hold the connection open past the client timeout.
            std::thread::sleep(Duration::from_millis(300));
        });

        let mut source = TcpLineSource::connect(&addr.to_string(), 100).unwrap();
        assert_eq!(
            source.read_line().unwrap(),
            LineRead::Line("Modo: Manual".to_string())
        );
        assert_eq!(source.read_line().unwrap(), LineRead::Timeout);

        server.join().unwrap();
    }

    #[test]
    fn tcp_source_reports_eof_on_close() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let server = std::thread::spawn(move || {
            let (conn, _) = listener.accept().unwrap();
            drop(conn);
        });

        let mut source = TcpLineSource::connect(&addr.to_string(), 1_000).unwrap();
        assert_eq!(source.read_line().unwrap(), LineRead::Eof);
        server.join().unwrap();
    }

    #[test]
    fn tcp_connect_failure_is_transport_open() {
        // Port 1 is essentially never listening.
        let err = TcpLineSource::connect("127.0.0.1:1", 100).expect_err("must fail");
        assert_eq!(err.code(), "SCR-2001");
    }
}
