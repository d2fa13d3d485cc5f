//! Byte relay between the modem link and a PPP protocol engine.

use embassy_time::Duration;
use heapless::Vec;

use super::at::{flush_until_sent, read_bytes, write_bytes};
use super::state::{self, PppLinkStatus};
use crate::config::Transport;
use crate::connection::PppConnection;

/// Outbound staging capacity, matching the UART driver buffers.
pub const STAGING_BUF_SIZE: usize = 2048;

const PUMP_CHUNK: usize = 256;
/// Most bytes read from the link in one pump iteration.
const PUMP_BUDGET: usize = 2048;
const TX_TIMEOUT: Duration = Duration::from_millis(500);
const RX_TIMEOUT: Duration = Duration::from_millis(10);

/// Error codes reported by the PPP engine when a session ends or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PppError {
    None,
    Param,
    Open,
    Device,
    Alloc,
    User,
    /// The connection was lost.
    Connect,
    AuthFail,
    Protocol,
    PeerDead,
    IdleTimeout,
    ConnectTime,
    Loopback,
    Unknown(i8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PppStatus {
    Up(PppConnection),
    Down(PppError),
}

/// A PPP protocol engine.
///
/// The engine is passive: the driver feeds it received bytes, then polls it
/// for frames to transmit and for status changes.
pub trait PppEngine {
    /// Start negotiating a session over the serial link.
    fn connect(&mut self);
    fn close(&mut self);
    fn feed_input(&mut self, data: &[u8]);
    /// Next chunk the engine wants to transmit.
    ///
    /// The chunk stays pending until `output_done` is called with the number
    /// of bytes the link accepted.
    fn poll_output(&mut self) -> Option<&[u8]>;
    fn output_done(&mut self, accepted: usize);
    fn poll_status(&mut self) -> Option<PppStatus>;
}

/// Relays bytes between the transport and the PPP engine, staging outbound
/// bytes while the session is suspended.
pub struct PppBridge<const S: usize = STAGING_BUF_SIZE> {
    staging: Vec<u8, S>,
    was_up: bool,
}

impl<const S: usize> PppBridge<S> {
    pub fn new() -> Self {
        Self {
            staging: Vec::new(),
            was_up: false,
        }
    }

    pub fn staged(&self) -> &[u8] {
        &self.staging
    }

    /// Forget any staged bytes and return the link status to `Idle`.
    pub(crate) fn reset(&mut self, state: &state::Runner<'_>) {
        self.staging.clear();
        self.was_up = false;
        state.set_ppp_status(PppLinkStatus::Idle);
    }

    /// Output hook: transmit `data` or stage it, returning the number of bytes
    /// accepted.
    pub(crate) async fn output<T: Transport>(
        &mut self,
        transport: &mut T,
        state: &state::Runner<'_>,
        data: &[u8],
    ) -> usize {
        match state.ppp_status() {
            PppLinkStatus::Suspended => {
                if self.staging.extend_from_slice(data).is_err() {
                    warn!(
                        "PPP staging full, dropping {} bytes ({} staged)",
                        data.len(),
                        self.staging.len()
                    );
                    return 0;
                }
                data.len()
            }
            PppLinkStatus::Idle | PppLinkStatus::Resumed => {
                if !self.flush_staged(transport).await {
                    // Queue behind the bytes still staged.
                    if self.staging.extend_from_slice(data).is_err() {
                        return 0;
                    }
                    return data.len();
                }
                let written = write_bytes(transport, data).await;
                flush_until_sent(transport, TX_TIMEOUT).await;
                written
            }
        }
    }

    /// Replay staged bytes, returning `true` once nothing is left staged.
    ///
    /// Bytes the link did not take stay staged for the next attempt.
    async fn flush_staged<T: Transport>(&mut self, transport: &mut T) -> bool {
        if self.staging.is_empty() {
            return true;
        }
        debug!("Replaying {} staged PPP bytes", self.staging.len());
        let written = write_bytes(transport, &self.staging).await;
        flush_until_sent(transport, TX_TIMEOUT).await;

        let remaining = self.staging.len() - written;
        self.staging.copy_within(written.., 0);
        self.staging.truncate(remaining);
        if remaining > 0 {
            warn!("{} staged PPP bytes not sent", remaining);
        }
        remaining == 0
    }

    /// Status hook.
    pub(crate) fn on_status(&mut self, state: &state::Runner<'_>, status: PppStatus) {
        match status {
            PppStatus::Up(connection) => {
                info!("PPP up: {:?}", connection);
                state.set_connection(Some(connection));
            }
            PppStatus::Down(err) => {
                state.set_connection(None);
                match err {
                    PppError::Connect | PppError::Unknown(_) => {
                        warn!("PPP session down: {:?}", err);
                        self.staging.clear();
                        state.set_ppp_status(PppLinkStatus::Idle);
                    }
                    PppError::None | PppError::User => debug!("PPP closed: {:?}", err),
                    _ => error!("PPP error: {:?}", err),
                }
            }
        }
    }

    /// Deliver pending engine output and status changes, returning the
    /// number of bytes accepted.
    pub(crate) async fn drain_engine<T: Transport, P: PppEngine>(
        &mut self,
        transport: &mut T,
        engine: &mut P,
        state: &state::Runner<'_>,
    ) -> usize {
        let mut total = 0;
        while let Some(frame) = engine.poll_output() {
            let accepted = self.output(transport, state, frame).await;
            engine.output_done(accepted);
            if accepted == 0 {
                break;
            }
            total += accepted;
        }
        while let Some(status) = engine.poll_status() {
            self.on_status(state, status);
        }
        total
    }

    /// One iteration of the data-mode relay, returning the number of bytes
    /// moved in either direction.
    ///
    /// Input is read while the link has any, up to `PUMP_BUDGET` bytes.
    pub(crate) async fn pump<T: Transport, P: PppEngine>(
        &mut self,
        transport: &mut T,
        engine: &mut P,
        state: &state::Runner<'_>,
    ) -> usize {
        if state.ppp_status() != PppLinkStatus::Suspended {
            self.flush_staged(transport).await;
        }

        let mut received = 0;
        let mut buf = [0u8; PUMP_CHUNK];
        while received < PUMP_BUDGET {
            let available = transport.available();
            if available == 0 {
                break;
            }
            let len = available.min(PUMP_CHUNK).min(PUMP_BUDGET - received);
            let n = read_bytes(transport, &mut buf[..len], RX_TIMEOUT).await;
            if n == 0 {
                break;
            }
            engine.feed_input(&buf[..n]);
            received += n;
        }
        if received > 0 {
            trace!("PPP rx {} bytes", received);
        }

        let sent = self.drain_engine(transport, engine, state).await;

        let up = state.is_ppp_up();
        if up != self.was_up {
            if up {
                info!("PPP session established");
            } else {
                info!("PPP session lost");
            }
            self.was_up = up;
        }
        received + sent
    }
}

impl<const S: usize> Default for PppBridge<S> {
    fn default() -> Self {
        Self::new()
    }
}
