//! Single AT transaction over the raw serial link.
//!
//! The modem is driven with plain request/response transactions. A command is
//! written, then response bytes are collected until an expected fragment or
//! a terminal result code shows up, the receive buffer fills, or the time
//! runs out.

use embassy_time::{with_timeout, Duration, Instant, Timer};
use heapless::Vec;

use crate::command::{self, responses, ESCAPE_SEQUENCE, MAX_CMD_LEN};
use crate::config::Transport;

/// Size of the receive assembly buffer, matching the UART driver buffers.
pub const RX_BUF_SIZE: usize = 2048;

/// Bytes kept free at the end of the receive buffer.
const HEADROOM: usize = 2;

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(1);
const TERMINAL_POLL_INTERVAL: Duration = Duration::from_millis(10);
const TERMINAL_POLLS: usize = 25;
const READ_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionResult {
    /// The expected fragment (or, without one, a terminal result code) was
    /// received.
    Matched,
    NotMatched,
    /// The receive buffer filled up, more data may be pending.
    Overflowed,
    /// The command was sent as part of a multi-part payload, no response was
    /// collected.
    ContinuationAccepted,
}

impl TransactionResult {
    pub fn is_matched(self) -> bool {
        self == Self::Matched
    }
}

pub(crate) async fn write_bytes<T: Transport>(transport: &mut T, data: &[u8]) -> usize {
    let mut written = 0;
    while written < data.len() {
        match transport.write(&data[written..]).await {
            Ok(0) => break,
            Ok(n) => written += n,
            Err(_) => {
                warn!("Serial write failed after {} bytes", written);
                break;
            }
        }
    }
    written
}

/// Wait until everything written so far has left the transmitter.
pub(crate) async fn flush_until_sent<T: Transport>(transport: &mut T, timeout: Duration) -> bool {
    match with_timeout(timeout, transport.flush()).await {
        Ok(Ok(())) => true,
        Ok(Err(_)) => {
            warn!("Serial flush failed");
            false
        }
        Err(_) => {
            warn!("Serial flush timed out");
            false
        }
    }
}

/// Timeout-bounded read. Failures read as zero bytes.
pub(crate) async fn read_bytes<T: Transport>(
    transport: &mut T,
    buf: &mut [u8],
    timeout: Duration,
) -> usize {
    match with_timeout(timeout, transport.read(buf)).await {
        Ok(Ok(n)) => n,
        Ok(Err(_)) => {
            warn!("Serial read failed");
            0
        }
        Err(_) => 0,
    }
}

/// Sends AT commands and assembles their responses.
///
/// Owns the transport and the receive buffer. At most one transaction is in
/// flight, as every transaction borrows the engine mutably.
pub struct AtEngine<T, const N: usize = RX_BUF_SIZE> {
    transport: T,
    rx: Vec<u8, N>,
}

impl<T: Transport, const N: usize> AtEngine<T, N> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            rx: Vec::new(),
        }
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Bytes collected by the last transaction.
    pub fn response(&self) -> &[u8] {
        &self.rx
    }

    pub async fn send_and_wait(
        &mut self,
        cmd: &[u8],
        timeout: Duration,
        expected: Option<&[u8]>,
        allow_continuation: bool,
    ) -> TransactionResult {
        if !allow_continuation || cmd.starts_with(b"AT") {
            self.transport.discard_buffered_input();
        }
        self.rx.clear();

        if cmd.len() < 50 {
            trace!("Sending command: {:?}", atat::helpers::LossyStr(cmd));
        } else {
            trace!("Sending command with long payload ({} bytes)", cmd.len());
        }

        write_bytes(&mut self.transport, cmd).await;
        if cmd != ESCAPE_SEQUENCE {
            write_bytes(&mut self.transport, b"\r").await;
        }
        flush_until_sent(&mut self.transport, timeout).await;

        if allow_continuation {
            return TransactionResult::ContinuationAccepted;
        }

        let result = self.collect(expected, timeout).await;
        trace!(
            "{:?}: {:?}",
            result,
            atat::helpers::LossyStr(self.response())
        );
        result
    }

    /// Collect a response without sending anything first.
    pub async fn wait_response(&mut self, expected: &[u8], timeout: Duration) -> TransactionResult {
        self.rx.clear();
        self.collect(Some(expected), timeout).await
    }

    /// Send a typed command, waiting up to its own timeout.
    pub async fn send_cmd<Cmd: atat::AtatCmd>(
        &mut self,
        cmd: &Cmd,
        expected: &[u8],
    ) -> TransactionResult {
        let timeout = Duration::from_millis(Cmd::MAX_TIMEOUT_MS.into());
        self.send_cmd_with_timeout(cmd, expected, timeout).await
    }

    pub async fn send_cmd_with_timeout<Cmd: atat::AtatCmd>(
        &mut self,
        cmd: &Cmd,
        expected: &[u8],
        timeout: Duration,
    ) -> TransactionResult {
        let mut buf = [0u8; MAX_CMD_LEN];
        let len = command::encode(cmd, &mut buf);
        self.send_and_wait(&buf[..len], timeout, Some(expected), false)
            .await
    }

    /// Poll until input is available, for at most `timeout`.
    async fn wait_for_input(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.transport.available() > 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            Timer::after(INPUT_POLL_INTERVAL).await;
        }
    }

    /// Wait a bounded number of short intervals for more input.
    async fn linger(&mut self) -> bool {
        for _ in 0..TERMINAL_POLLS {
            Timer::after(TERMINAL_POLL_INTERVAL).await;
            if self.transport.available() > 0 {
                return true;
            }
        }
        false
    }

    async fn collect(&mut self, expected: Option<&[u8]>, timeout: Duration) -> TransactionResult {
        if !self.wait_for_input(timeout).await {
            return TransactionResult::NotMatched;
        }

        let limit = N.saturating_sub(HEADROOM);
        loop {
            let available = self.transport.available();
            if available == 0 {
                if responses::has_terminal_marker(&self.rx) {
                    break;
                }
                if !self.linger().await {
                    break;
                }
                continue;
            }

            let start = self.rx.len();
            let want = available.min(limit - start);
            if self.rx.resize(start + want, 0).is_err() {
                return TransactionResult::Overflowed;
            }
            let n = read_bytes(&mut self.transport, &mut self.rx[start..], READ_TIMEOUT).await;
            self.rx.truncate(start + n);
            if n == 0 {
                break;
            }

            if self.rx.len() >= limit {
                warn!("Response overflowed the receive buffer");
                return TransactionResult::Overflowed;
            }
            if let Some(expected) = expected {
                if responses::contains(&self.rx, expected) {
                    return TransactionResult::Matched;
                }
            }
        }

        match expected {
            None if responses::has_terminal_marker(&self.rx) => TransactionResult::Matched,
            _ => TransactionResult::NotMatched,
        }
    }
}
