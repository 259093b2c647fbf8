// src/gps/link.rs
//! Byte transport between the receiver and the decoder

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
    task::JoinHandle,
};
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, error, info, trace, warn};

use crate::error::{GpsError, Result};

/// Duplex byte channel the controller reads from and writes commands to
pub trait Transport {
    /// Whether a byte can be read without waiting
    fn available(&self) -> bool;

    fn read_byte(&mut self) -> Option<u8>;

    /// Send `line` followed by CRLF
    fn write_line(&mut self, line: &str) -> Result<()>;
}

/// Bounded byte queue handed from the receive task to the decoder.
///
/// One producer pushes, one consumer pops; the mutex guarantees a byte is
/// never observed half-written. Bytes arriving while the queue is full are
/// dropped.
#[derive(Debug, Clone)]
pub struct ByteQueue {
    inner: Arc<Mutex<VecDeque<u8>>>,
    capacity: usize,
}

impl ByteQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Append as many bytes as fit; returns how many were dropped
    pub fn push(&self, bytes: &[u8]) -> usize {
        let mut queue = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let room = self.capacity.saturating_sub(queue.len());
        let accepted = room.min(bytes.len());
        queue.extend(&bytes[..accepted]);
        bytes.len() - accepted
    }

    pub fn pop(&self) -> Option<u8> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

const ECHO_CAPACITY: usize = 128;

/// Collects received bytes into printable lines for the wire trace.
///
/// A line closes at `\r` or `\n`, or when a `$` starts the next sentence.
#[derive(Debug, Default)]
pub struct LineEcho {
    line: String,
}

impl LineEcho {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the completed line, if `byte` closed one
    pub fn push(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' | b'\n' => self.take(),
            b'$' => {
                let done = self.take();
                self.line.push('$');
                done
            }
            0x20..=0x7e => {
                if self.line.len() < ECHO_CAPACITY {
                    self.line.push(char::from(byte));
                }
                None
            }
            _ => None,
        }
    }

    fn take(&mut self) -> Option<String> {
        if self.line.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.line))
        }
    }
}

/// Serial port link backed by a reader and a writer task.
///
/// Dropping the link stops both tasks and closes the port.
pub struct SerialLink {
    port: String,
    received: ByteQueue,
    outgoing: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl SerialLink {
    /// Open `port`. Must be called from within a tokio runtime.
    pub fn open(port: &str, baudrate: u32, queue_capacity: usize) -> Result<Self> {
        info!(port, baudrate, "opening serial link");

        let serial = tokio_serial::new(port, baudrate)
            .timeout(Duration::from_millis(1000))
            .open_native_async()?;

        let (mut rx, mut tx) = tokio::io::split(serial);
        let received = ByteQueue::new(queue_capacity);
        let (outgoing, mut lines) = mpsc::unbounded_channel::<String>();

        let queue = received.clone();
        let reader = tokio::spawn(async move {
            let mut buf = [0u8; 256];
            loop {
                match rx.read(&mut buf).await {
                    Ok(0) => {
                        debug!("serial link reached EOF");
                        break;
                    }
                    Ok(n) => {
                        let dropped = queue.push(&buf[..n]);
                        if dropped > 0 {
                            warn!(dropped, "receive queue full, bytes dropped");
                        }
                    }
                    Err(e) => {
                        error!("Error reading from serial port: {}", e);
                        break;
                    }
                }
            }
        });

        let writer = tokio::spawn(async move {
            while let Some(line) = lines.recv().await {
                let framed = format!("{}\r\n", line);
                if let Err(e) = tx.write_all(framed.as_bytes()).await {
                    error!("Error writing to serial port: {}", e);
                    break;
                }
                if let Err(e) = tx.flush().await {
                    error!("Error flushing serial port: {}", e);
                    break;
                }
            }
        });

        Ok(Self {
            port: port.to_string(),
            received,
            outgoing,
            reader,
            writer,
        })
    }

    pub fn port(&self) -> &str {
        &self.port
    }
}

impl Transport for SerialLink {
    fn available(&self) -> bool {
        !self.received.is_empty()
    }

    fn read_byte(&mut self) -> Option<u8> {
        self.received.pop()
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        trace!(target: "mt3339_gps::wire", "-> {}", line);
        self.outgoing
            .send(line.to_string())
            .map_err(|_| GpsError::Connection(format!("Serial writer for {} has stopped", self.port)))
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        self.reader.abort();
        self.writer.abort();
        info!(port = %self.port, "serial link released");
    }
}

/// List available serial ports
pub fn list_serial_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports()?;

    Ok(ports
        .into_iter()
        .map(|port| format!("{} - {:?}", port.port_name, port.port_type))
        .collect())
}
