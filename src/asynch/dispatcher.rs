//! Request/response hand-off between the foreground and the driver task.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_sync::mutex::Mutex;
use embassy_time::Duration;
use heapless::Vec;

use super::at::RX_BUF_SIZE;
use crate::command::{self, responses, MAX_CMD_LEN};
use crate::error::Error;

/// An AT command waiting to be executed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PendingCommand {
    payload: Vec<u8, MAX_CMD_LEN>,
    timeout: Duration,
    expect_continuation: bool,
}

impl PendingCommand {
    pub fn new(payload: &[u8], timeout: Duration) -> Result<Self, Error> {
        Ok(Self {
            payload: Vec::from_slice(payload).map_err(|_| Error::CommandTooLong)?,
            timeout,
            expect_continuation: false,
        })
    }

    /// Part of a multi-part payload. The driver sends it without collecting
    /// a response, and no [`CommandResponse`] is produced.
    pub fn continuation(payload: &[u8], timeout: Duration) -> Result<Self, Error> {
        let mut cmd = Self::new(payload, timeout)?;
        cmd.expect_continuation = true;
        Ok(cmd)
    }

    pub fn from_cmd<Cmd: atat::AtatCmd>(cmd: &Cmd) -> Result<Self, Error> {
        let mut buf = [0u8; MAX_CMD_LEN];
        let len = command::encode(cmd, &mut buf);
        Self::new(
            &buf[..len],
            Duration::from_millis(Cmd::MAX_TIMEOUT_MS.into()),
        )
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn expect_continuation(&self) -> bool {
        self.expect_continuation
    }
}

/// Raw bytes answered by the modem to a [`PendingCommand`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CommandResponse {
    payload: Vec<u8, RX_BUF_SIZE>,
    more_data_pending: bool,
}

impl CommandResponse {
    pub fn new(payload: &[u8], more_data_pending: bool) -> Self {
        let mut resp = Self {
            more_data_pending,
            ..Default::default()
        };
        let len = payload.len().min(RX_BUF_SIZE);
        if len < payload.len() {
            resp.more_data_pending = true;
        }
        // Cannot fail, `len` is within capacity.
        let _ = resp.payload.extend_from_slice(&payload[..len]);
        resp
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The receive buffer filled up before the response ended.
    pub fn more_data_pending(&self) -> bool {
        self.more_data_pending
    }

    pub fn contains(&self, fragment: &[u8]) -> bool {
        responses::contains(&self.payload, fragment)
    }

    pub fn is_ok(&self) -> bool {
        self.contains(responses::OK)
    }

    /// The response as text, empty if it is not valid UTF-8.
    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.payload).unwrap_or_default()
    }
}

/// Work items for the driver task.
#[derive(Debug)]
pub(crate) enum Request {
    At(PendingCommand),
    /// Collect unsolicited output until `expected` shows up, without sending
    /// anything.
    Await {
        expected: &'static [u8],
        timeout: Duration,
    },
    /// Hand the link to the PPP engine.
    EnterPpp,
    /// Close the PPP session and take the link back.
    ExitPpp,
}

impl Request {
    fn expects_response(&self) -> bool {
        !matches!(self, Request::At(cmd) if cmd.expect_continuation())
    }
}

/// Identifies a submission. The driver echoes it with the response.
pub(crate) type Tag = u16;

pub(crate) type RequestChannel = embassy_sync::channel::Channel<NoopRawMutex, (Tag, Request), 1>;
pub(crate) type ResponseChannel =
    embassy_sync::channel::Channel<NoopRawMutex, (Tag, CommandResponse), 1>;

pub(crate) struct Dispatcher<'a> {
    req_sender: Sender<'a, NoopRawMutex, (Tag, Request), 1>,
    res_receiver: Receiver<'a, NoopRawMutex, (Tag, CommandResponse), 1>,
    lock: Mutex<NoopRawMutex, ()>,
    last_tag: Cell<Tag>,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(req: &'a RequestChannel, res: &'a ResponseChannel) -> Self {
        Self {
            req_sender: req.sender(),
            res_receiver: res.receiver(),
            lock: Mutex::new(()),
            last_tag: Cell::new(0),
        }
    }

    /// Queue `request` for the driver and wait for its response, if any.
    ///
    /// Submissions are serialized. A caller dropped while waiting leaves its
    /// request with the driver; the late response carries the old tag and is
    /// discarded by the next submission.
    pub(crate) async fn submit(&self, request: Request) -> Option<CommandResponse> {
        let _guard = self.lock.lock().await;

        let tag = self.last_tag.get().wrapping_add(1);
        self.last_tag.set(tag);

        let expects_response = request.expects_response();
        self.req_sender.send((tag, request)).await;
        if !expects_response {
            return None;
        }
        loop {
            let (answered, response) = self.res_receiver.receive().await;
            if answered == tag {
                return Some(response);
            }
            debug!("Dropping stale response to request {}", answered);
        }
    }
}
