// SPDX-FileCopyrightText: 2025 Stanislaw Grams <stanislawgrams@gmail.com>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Serial link with lazy open, retries and reconnect.
//!
//! The port is opened on first use and reopened after any transport-level
//! failure. Timeouts leave the connection alone, so pending input is
//! discarded before every write; a late answer to an earlier command must not
//! be read as the answer to the next one. A whole query, including its
//! retries, runs under the link mutex.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, DuplexStream,
};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};
use tracing::{debug, error, info, warn};

use strig_core::rig::policies::{FixedDelay, RetryPolicy};
use strig_core::{QueryOptions, RigError, RigResult, Transport, TransportFuture};

const MAX_LINE_LEN: usize = 1024;

/// Byte stream a connector hands to the transport.
pub trait AsyncStream: AsyncRead + AsyncWrite + Unpin + Send {
    /// Drop input buffered below the stream, e.g. in the OS serial driver.
    fn discard_input(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl AsyncStream for SerialStream {
    fn discard_input(&mut self) -> std::io::Result<()> {
        self.clear(ClearBuffer::Input).map_err(std::io::Error::from)
    }
}

impl AsyncStream for DuplexStream {}

pub type BoxedStream = Box<dyn AsyncStream>;

/// Opens the underlying byte stream of a link.
pub trait Connector: Send + Sync {
    /// Human readable endpoint, used in log messages.
    fn endpoint(&self) -> String;

    fn connect<'a>(&'a self) -> TransportFuture<'a, RigResult<BoxedStream>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

impl TryFrom<u8> for DataBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            other => Err(format!("unsupported data bits: {}", other)),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

impl TryFrom<u8> for StopBits {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(format!("unsupported stop bits: {}", other)),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl From<DataBits> for tokio_serial::DataBits {
    fn from(value: DataBits) -> Self {
        match value {
            DataBits::Five => tokio_serial::DataBits::Five,
            DataBits::Six => tokio_serial::DataBits::Six,
            DataBits::Seven => tokio_serial::DataBits::Seven,
            DataBits::Eight => tokio_serial::DataBits::Eight,
        }
    }
}

impl From<Parity> for tokio_serial::Parity {
    fn from(value: Parity) -> Self {
        match value {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }
}

impl From<StopBits> for tokio_serial::StopBits {
    fn from(value: StopBits) -> Self {
        match value {
            StopBits::One => tokio_serial::StopBits::One,
            StopBits::Two => tokio_serial::StopBits::Two,
        }
    }
}

/// Serial line parameters plus query behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Device path (e.g. "/dev/ttyUSB0")
    pub port: String,
    pub baud: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    /// Driver-level read timeout in milliseconds
    pub read_timeout_ms: u64,
    /// Time to wait for a response line in milliseconds
    pub query_timeout_ms: u64,
    /// Extra attempts after the first one
    pub max_retries: u32,
    /// Pause between attempts in milliseconds
    pub retry_backoff_ms: u64,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud: 19200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            read_timeout_ms: 800,
            query_timeout_ms: 1500,
            max_retries: 2,
            retry_backoff_ms: 300,
        }
    }
}

impl SerialSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn retry_policy(&self) -> FixedDelay {
        FixedDelay::new(self.max_retries, Duration::from_millis(self.retry_backoff_ms))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.port.trim().is_empty() {
            return Err("serial port path must not be empty".to_string());
        }
        if self.baud == 0 {
            return Err("serial baud must be > 0".to_string());
        }
        if self.query_timeout_ms == 0 {
            return Err("serial query_timeout_ms must be > 0".to_string());
        }
        Ok(())
    }
}

/// Opens real serial ports through tokio-serial.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    settings: SerialSettings,
}

impl SerialConnector {
    pub fn new(settings: SerialSettings) -> Self {
        Self { settings }
    }
}

impl Connector for SerialConnector {
    fn endpoint(&self) -> String {
        format!("{}@{}", self.settings.port, self.settings.baud)
    }

    fn connect<'a>(&'a self) -> TransportFuture<'a, RigResult<BoxedStream>> {
        Box::pin(async move {
            let s = &self.settings;
            let port = tokio_serial::new(&s.port, s.baud)
                .data_bits(s.data_bits.into())
                .parity(s.parity.into())
                .stop_bits(s.stop_bits.into())
                .timeout(Duration::from_millis(s.read_timeout_ms))
                .open_native_async()
                .map_err(|e| {
                    RigError::communication(format!("failed to open {}: {}", s.port, e))
                })?;
            Ok(Box::new(port) as BoxedStream)
        })
    }
}

type Connection = BufReader<BoxedStream>;

/// A serial link shared by one or more drivers.
pub struct SerialTransport<C: Connector = SerialConnector> {
    name: String,
    connector: C,
    query_timeout: Duration,
    policy: FixedDelay,
    link: Mutex<Option<Connection>>,
}

impl SerialTransport<SerialConnector> {
    pub fn from_settings(name: impl Into<String>, settings: &SerialSettings) -> Self {
        Self::new(
            name,
            SerialConnector::new(settings.clone()),
            settings.query_timeout(),
            settings.retry_policy(),
        )
    }
}

impl<C: Connector> SerialTransport<C> {
    pub fn new(
        name: impl Into<String>,
        connector: C,
        query_timeout: Duration,
        policy: FixedDelay,
    ) -> Self {
        Self {
            name: name.into(),
            connector,
            query_timeout,
            policy,
            link: Mutex::new(None),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    async fn ensure_open<'l>(
        &self,
        link: &'l mut Option<Connection>,
    ) -> RigResult<&'l mut Connection> {
        if link.is_none() {
            let stream = self.connector.connect().await.inspect_err(|e| {
                warn!("{}: failed to open {}: {}", self.name, self.connector.endpoint(), e);
            })?;
            info!("{}: opened {}", self.name, self.connector.endpoint());
            *link = Some(BufReader::new(stream));
        }
        link.as_mut()
            .ok_or_else(|| RigError::communication("link not open"))
    }

    async fn attempt(
        &self,
        link: &mut Option<Connection>,
        command: &str,
        wait: Duration,
    ) -> RigResult<String> {
        let conn = self.ensure_open(link).await?;
        let stale = discard_pending(conn).await?;
        if stale > 0 {
            debug!("{}: discarded {} stale bytes before {:?}", self.name, stale, command);
        }
        conn.write_all(command.as_bytes()).await?;
        conn.flush().await?;
        timeout(wait, read_line(conn))
            .await
            .map_err(|_| RigError::timeout())?
    }
}

/// Throw away everything already received: the driver-level buffer, the
/// `BufReader` contents and whatever the stream yields without waiting.
async fn discard_pending(conn: &mut Connection) -> RigResult<usize> {
    conn.get_mut().discard_input()?;
    let mut discarded = 0;
    loop {
        let pending = match timeout(Duration::ZERO, conn.fill_buf()).await {
            Ok(Ok(buf)) if !buf.is_empty() => buf.len(),
            Ok(Err(e)) => return Err(e.into()),
            _ => return Ok(discarded),
        };
        conn.consume(pending);
        discarded += pending;
    }
}

/// Read one non-empty line terminated by `\r` or `\n`.
async fn read_line(conn: &mut Connection) -> RigResult<String> {
    let mut buf = Vec::new();
    loop {
        let byte = conn.read_u8().await?;
        if byte == b'\r' || byte == b'\n' {
            if buf.is_empty() {
                continue;
            }
            return Ok(String::from_utf8_lossy(&buf).into_owned());
        }
        if buf.len() >= MAX_LINE_LEN {
            return Err(RigError::communication("response line too long"));
        }
        buf.push(byte);
    }
}

impl<C: Connector> Transport for SerialTransport<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn query<'a>(
        &'a self,
        command: &'a str,
        opts: QueryOptions,
    ) -> TransportFuture<'a, RigResult<String>> {
        Box::pin(async move {
            let wait = opts.timeout.unwrap_or(self.query_timeout);
            let policy = opts
                .retries
                .map_or(self.policy, |r| self.policy.with_retries(r));

            let mut link = self.link.lock().await;
            let mut attempt = 0;
            loop {
                let err = match self.attempt(&mut link, command, wait).await {
                    Ok(line) => return Ok(line),
                    Err(err) => err,
                };
                if err.invalidates_connection() {
                    warn!(
                        "{}: transport error on attempt {}/{}: {}",
                        self.name,
                        attempt + 1,
                        policy.max_attempts(),
                        err
                    );
                    *link = None;
                } else {
                    debug!(
                        "{}: {} on attempt {}/{}: {:?}",
                        self.name,
                        err,
                        attempt + 1,
                        policy.max_attempts(),
                        command
                    );
                }
                if !policy.should_retry(attempt, &err) {
                    warn!(
                        "{}: all {} attempts failed for {:?}",
                        self.name,
                        attempt + 1,
                        command
                    );
                    return Err(err);
                }
                tokio::time::sleep(policy.delay(attempt)).await;
                attempt += 1;
            }
        })
    }

    fn write_only<'a>(&'a self, command: &'a str) -> TransportFuture<'a, bool> {
        Box::pin(async move {
            let mut link = self.link.lock().await;
            let result = async {
                let conn = self.ensure_open(&mut link).await?;
                conn.write_all(command.as_bytes()).await?;
                conn.flush().await?;
                Ok::<(), RigError>(())
            }
            .await;
            match result {
                Ok(()) => true,
                Err(e) => {
                    error!("{}: write failed: {}", self.name, e);
                    *link = None;
                    false
                }
            }
        })
    }

    fn close<'a>(&'a self) -> TransportFuture<'a, ()> {
        Box::pin(async move {
            let mut link = self.link.lock().await;
            if let Some(mut conn) = link.take() {
                if let Err(e) = conn.shutdown().await {
                    debug!("{}: error while closing: {}", self.name, e);
                }
                info!("{}: closed {}", self.name, self.connector.endpoint());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use tokio::io::DuplexStream;
    use tokio::task::JoinHandle;

    use strig_core::RigErrorKind;

    const WAIT: Duration = Duration::from_millis(100);

    /// Hands out pre-made in-memory streams; fails when none are left.
    struct ScriptedConnector {
        connects: AtomicUsize,
        failing_opens: AtomicUsize,
        streams: std::sync::Mutex<VecDeque<DuplexStream>>,
    }

    impl ScriptedConnector {
        fn new(streams: Vec<DuplexStream>) -> Self {
            Self {
                connects: AtomicUsize::new(0),
                failing_opens: AtomicUsize::new(0),
                streams: std::sync::Mutex::new(streams.into()),
            }
        }

        fn connects(&self) -> usize {
            self.connects.load(Ordering::SeqCst)
        }
    }

    impl Connector for ScriptedConnector {
        fn endpoint(&self) -> String {
            "scripted".to_string()
        }

        fn connect<'a>(&'a self) -> TransportFuture<'a, RigResult<BoxedStream>> {
            Box::pin(async move {
                if self.failing_opens.load(Ordering::SeqCst) > 0 {
                    self.failing_opens.fetch_sub(1, Ordering::SeqCst);
                    return Err(RigError::communication("no such device"));
                }
                let stream = self.streams.lock().unwrap().pop_front();
                match stream {
                    Some(s) => {
                        self.connects.fetch_add(1, Ordering::SeqCst);
                        Ok(Box::new(s) as BoxedStream)
                    }
                    None => Err(RigError::communication("no device left")),
                }
            })
        }
    }

    async fn read_command(stream: &mut DuplexStream) -> Option<String> {
        let mut buf = Vec::new();
        loop {
            let byte = stream.read_u8().await.ok()?;
            if byte == b'\r' {
                return Some(String::from_utf8_lossy(&buf).into_owned());
            }
            buf.push(byte);
        }
    }

    /// Device that stays silent for the first `silent` commands, then
    /// answers every command with "OK".
    fn silent_then_ok(mut dev: DuplexStream, silent: usize) -> JoinHandle<usize> {
        tokio::spawn(async move {
            let mut seen = 0;
            while read_command(&mut dev).await.is_some() {
                seen += 1;
                if seen > silent {
                    dev.write_all(b"OK\r").await.unwrap();
                }
            }
            seen
        })
    }

    fn transport(
        connector: ScriptedConnector,
        retries: u32,
    ) -> SerialTransport<ScriptedConnector> {
        SerialTransport::new(
            "test",
            connector,
            WAIT,
            FixedDelay::new(retries, Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn test_two_timeouts_then_success_within_retry_budget() {
        let (client, dev) = tokio::io::duplex(256);
        let device = silent_then_ok(dev, 2);
        let t = transport(ScriptedConnector::new(vec![client]), 2);

        let line = t.query("A\r", QueryOptions::default()).await.unwrap();
        assert_eq!(line, "OK");
        assert_eq!(t.connector().connects(), 1, "timeouts must not reconnect");

        t.close().await;
        assert_eq!(device.await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_two_timeouts_exhaust_single_retry() {
        let (client, dev) = tokio::io::duplex(256);
        let _device = silent_then_ok(dev, 2);
        let t = transport(ScriptedConnector::new(vec![client]), 1);

        let err = t.query("A\r", QueryOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, RigErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_query_options_override_retries() {
        let (client, dev) = tokio::io::duplex(256);
        let _device = silent_then_ok(dev, 1);
        let t = transport(ScriptedConnector::new(vec![client]), 0);

        let opts = QueryOptions::default().with_retries(1);
        assert_eq!(t.query("A\r", opts).await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_reconnects_after_transport_error() {
        let (first, mut first_dev) = tokio::io::duplex(256);
        let (second, second_dev) = tokio::io::duplex(256);
        // First device reads the command and hangs up.
        tokio::spawn(async move {
            let _ = read_command(&mut first_dev).await;
        });
        let _device = silent_then_ok(second_dev, 0);
        let t = transport(ScriptedConnector::new(vec![first, second]), 2);

        assert_eq!(t.query("B\r", QueryOptions::default()).await.unwrap(), "OK");
        assert_eq!(t.connector().connects(), 2);
    }

    #[tokio::test]
    async fn test_failed_open_is_retried() {
        let (client, dev) = tokio::io::duplex(256);
        let _device = silent_then_ok(dev, 0);
        let connector = ScriptedConnector::new(vec![client]);
        connector.failing_opens.store(1, Ordering::SeqCst);
        let t = transport(connector, 1);

        assert_eq!(t.query("A\r", QueryOptions::default()).await.unwrap(), "OK");
    }

    #[tokio::test]
    async fn test_open_failure_exhausts_to_error() {
        let t = transport(ScriptedConnector::new(Vec::new()), 2);
        let err = t.query("A\r", QueryOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, RigErrorKind::Communication);
        assert!(!t.write_only("Z\r\n").await);
    }

    #[tokio::test]
    async fn test_empty_lines_are_skipped() {
        let (client, mut dev) = tokio::io::duplex(256);
        tokio::spawn(async move {
            while read_command(&mut dev).await.is_some() {
                dev.write_all(b"\r\n\nA +001.00\r\n").await.unwrap();
            }
        });
        let t = transport(ScriptedConnector::new(vec![client]), 0);
        assert_eq!(
            t.query("A\r", QueryOptions::default()).await.unwrap(),
            "A +001.00"
        );
    }

    #[tokio::test]
    async fn test_concurrent_queries_do_not_interleave() {
        let (client, mut dev) = tokio::io::duplex(256);
        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let device_log = Arc::clone(&log);
        tokio::spawn(async move {
            while let Some(cmd) = read_command(&mut dev).await {
                device_log.lock().unwrap().push(format!("cmd {}", cmd));
                tokio::time::sleep(Duration::from_millis(10)).await;
                device_log.lock().unwrap().push(format!("resp {}", cmd));
                dev.write_all(format!("{} +000.00\r", cmd).as_bytes())
                    .await
                    .unwrap();
            }
        });
        let t = Arc::new(transport(ScriptedConnector::new(vec![client]), 0));

        let mut handles = Vec::new();
        for id in ["A", "B", "C", "D"] {
            let t = Arc::clone(&t);
            handles.push(tokio::spawn(async move {
                let cmd = format!("{}\r", id);
                let line = t.query(&cmd, QueryOptions::default()).await.unwrap();
                (id, line)
            }));
        }
        for h in handles {
            let (id, line) = h.await.unwrap();
            assert_eq!(line, format!("{} +000.00", id));
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 8);
        for pair in log.chunks(2) {
            let cmd = pair[0].strip_prefix("cmd ").unwrap();
            let resp = pair[1].strip_prefix("resp ").unwrap();
            assert_eq!(cmd, resp);
        }
    }

    #[tokio::test]
    async fn test_late_reply_is_not_taken_for_next_command() {
        let (client, mut dev) = tokio::io::duplex(256);
        // Answers the first poll after the query timeout, later ones promptly.
        tokio::spawn(async move {
            let mut first = true;
            while let Some(cmd) = read_command(&mut dev).await {
                if first {
                    tokio::time::sleep(WAIT + Duration::from_millis(50)).await;
                    first = false;
                }
                let reply = if cmd == "B" { "B +099.00\r" } else { "C +001.00\r" };
                dev.write_all(reply.as_bytes()).await.unwrap();
            }
        });
        let t = transport(ScriptedConnector::new(vec![client]), 0);

        let err = t.query("B\r", QueryOptions::default()).await.unwrap_err();
        assert_eq!(err.kind, RigErrorKind::Timeout);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(
            t.query("C\r", QueryOptions::default()).await.unwrap(),
            "C +001.00"
        );
        assert_eq!(t.connector().connects(), 1);
    }

    #[tokio::test]
    async fn test_write_only_reaches_device() {
        let (client, mut dev) = tokio::io::duplex(256);
        let t = transport(ScriptedConnector::new(vec![client]), 0);
        assert!(t.write_only("Z\r").await);
        assert_eq!(read_command(&mut dev).await.as_deref(), Some("Z"));
    }

    #[test]
    fn test_settings_defaults() {
        let s = SerialSettings::default();
        assert_eq!(s.baud, 19200);
        assert_eq!(s.parity, Parity::None);
        assert_eq!(s.query_timeout(), Duration::from_millis(1500));
        assert_eq!(s.retry_policy().max_attempts(), 3);
        assert!(s.validate().is_ok());
    }
}
