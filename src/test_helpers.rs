//! In-memory modem and PPP engine used by the unit tests.
//!
//! Both mocks are cheap handles around shared state, so a test can keep one
//! handle for inspection while the driver owns the other.
extern crate std;

use std::boxed::Box;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Once;
use std::vec::Vec;

use core::convert::Infallible;
use core::future::poll_fn;
use core::task::Poll;

use embedded_io_async::{ErrorType, Read, Write};

use crate::asynch::ppp::{PppEngine, PppStatus};
use crate::config::Transport;

static INIT: Once = Once::new();

pub(crate) fn init_logger() {
    INIT.call_once(|| {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .is_test(true)
            .init();
    });
}

/// Produces the modem's answer to a command line (without `\r`), given the
/// current baud rate.
pub(crate) type Responder = Box<dyn FnMut(&[u8], u32) -> Option<Vec<u8>>>;

pub(crate) struct MockModem {
    pub rx: VecDeque<u8>,
    /// Every byte written to the modem.
    pub written: Vec<u8>,
    /// Command lines seen by the responder, in order.
    pub commands: Vec<Vec<u8>>,
    pub baudrate: u32,
    pub baud_changes: Vec<u32>,
    pub flow_control: Option<(bool, u8)>,
    pub flushes: usize,
    pub discards: usize,
    /// Bytes the link still accepts before writes stall, unlimited if `None`.
    pub write_limit: Option<usize>,
    pending: Vec<u8>,
    responder: Option<Responder>,
}

#[derive(Clone)]
pub(crate) struct MockTransport(pub Rc<RefCell<MockModem>>);

impl MockTransport {
    pub fn new(responder: impl FnMut(&[u8], u32) -> Option<Vec<u8>> + 'static) -> Self {
        Self(Rc::new(RefCell::new(MockModem {
            rx: VecDeque::new(),
            written: Vec::new(),
            commands: Vec::new(),
            baudrate: 921_600,
            baud_changes: Vec::new(),
            flow_control: None,
            flushes: 0,
            discards: 0,
            write_limit: None,
            pending: Vec::new(),
            responder: Some(Box::new(responder)),
        })))
    }

    /// A modem that never answers.
    pub fn silent() -> Self {
        Self::new(|_, _| None)
    }

    /// A modem that answers `OK` to everything.
    pub fn ok() -> Self {
        Self::new(|_, _| Some(b"\r\nOK\r\n".to_vec()))
    }

    pub fn push_rx(&self, data: &[u8]) {
        self.0.borrow_mut().rx.extend(data.iter().copied());
    }

    pub fn commands(&self) -> Vec<Vec<u8>> {
        self.0.borrow().commands.clone()
    }

    pub fn count_commands(&self, cmd: &[u8]) -> usize {
        self.0.borrow().commands.iter().filter(|c| c == &cmd).count()
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    fn dispatch(m: &mut MockModem) {
        let line = if m.pending.ends_with(b"\r") {
            let mut line = core::mem::take(&mut m.pending);
            line.pop();
            line
        } else if m.pending.ends_with(b"+++") {
            m.pending.clear();
            b"+++".to_vec()
        } else {
            return;
        };

        m.commands.push(line.clone());
        let baudrate = m.baudrate;
        if let Some(responder) = m.responder.as_mut() {
            if let Some(reply) = responder(&line, baudrate) {
                m.rx.extend(reply);
            }
        }
    }
}

impl ErrorType for MockTransport {
    type Error = Infallible;
}

impl Read for MockTransport {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        poll_fn(|_cx| {
            let mut m = self.0.borrow_mut();
            if m.rx.is_empty() || buf.is_empty() {
                return Poll::Pending;
            }
            let n = buf.len().min(m.rx.len());
            for (dst, src) in buf.iter_mut().zip(m.rx.drain(..n)) {
                *dst = src;
            }
            Poll::Ready(Ok(n))
        })
        .await
    }
}

impl Write for MockTransport {
    async fn write(&mut self, buf: &[u8]) -> Result<usize, Self::Error> {
        let mut m = self.0.borrow_mut();
        let n = match m.write_limit.as_mut() {
            Some(left) => {
                let n = buf.len().min(*left);
                *left -= n;
                n
            }
            None => buf.len(),
        };
        m.written.extend_from_slice(&buf[..n]);
        m.pending.extend_from_slice(&buf[..n]);
        Self::dispatch(&mut m);
        Ok(n)
    }

    async fn flush(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().flushes += 1;
        Ok(())
    }
}

impl Transport for MockTransport {
    fn available(&mut self) -> usize {
        self.0.borrow().rx.len()
    }

    fn discard_buffered_input(&mut self) {
        let mut m = self.0.borrow_mut();
        m.discards += 1;
        m.rx.clear();
    }

    fn set_baudrate(&mut self, baudrate: u32) {
        let mut m = self.0.borrow_mut();
        m.baudrate = baudrate;
        m.baud_changes.push(baudrate);
    }

    fn set_flow_control(&mut self, enabled: bool, rx_threshold: u8) {
        self.0.borrow_mut().flow_control = Some((enabled, rx_threshold));
    }
}

#[derive(Default)]
pub(crate) struct MockSession {
    pub connected: bool,
    pub connects: usize,
    pub closes: usize,
    pub input: Vec<u8>,
    pub outbound: VecDeque<Vec<u8>>,
    /// Accepted byte counts reported back by the driver.
    pub accepted: Vec<usize>,
    pub statuses: VecDeque<PppStatus>,
}

#[derive(Clone, Default)]
pub(crate) struct MockPpp {
    pub session: Rc<RefCell<MockSession>>,
    current: Option<Vec<u8>>,
}

impl MockPpp {
    pub fn queue_output(&self, frame: &[u8]) {
        self.session.borrow_mut().outbound.push_back(frame.to_vec());
    }

    pub fn queue_status(&self, status: PppStatus) {
        self.session.borrow_mut().statuses.push_back(status);
    }

    pub fn input(&self) -> Vec<u8> {
        self.session.borrow().input.clone()
    }
}

impl PppEngine for MockPpp {
    fn connect(&mut self) {
        let mut s = self.session.borrow_mut();
        s.connected = true;
        s.connects += 1;
    }

    fn close(&mut self) {
        let mut s = self.session.borrow_mut();
        s.connected = false;
        s.closes += 1;
    }

    fn feed_input(&mut self, data: &[u8]) {
        self.session.borrow_mut().input.extend_from_slice(data);
    }

    fn poll_output(&mut self) -> Option<&[u8]> {
        if self.current.is_none() {
            self.current = self.session.borrow_mut().outbound.pop_front();
        }
        self.current.as_deref()
    }

    fn output_done(&mut self, accepted: usize) {
        self.current = None;
        self.session.borrow_mut().accepted.push(accepted);
    }

    fn poll_status(&mut self) -> Option<PppStatus> {
        self.session.borrow_mut().statuses.pop_front()
    }
}
