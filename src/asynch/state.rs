use core::cell::RefCell;
use core::future::poll_fn;
use core::task::{Context, Poll};

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::WakerRegistration;

use crate::connection::PppConnection;

/// Logical session state seen by the host.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Init,
    Idle,
    Attaching,
    Attached,
    /// The serial link is handed to the PPP engine.
    Ppp,
    /// A PPP session exists, but the link is back in command mode.
    Suspended,
}

/// Reachability of the modem itself, independent of [`LinkState`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemConnState {
    Connected,
    Connecting,
    Disconnected,
    /// The modem only answers at the fallback baud rate.
    Recovery,
}

/// Whether outbound PPP bytes go straight to the modem or are staged.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PppLinkStatus {
    Idle,
    Resumed,
    Suspended,
}

pub(crate) struct State {
    shared: Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl State {
    pub(crate) const fn new() -> Self {
        Self {
            shared: Mutex::new(RefCell::new(Shared::new())),
        }
    }
}

pub(crate) struct Shared {
    initialized: bool,
    link_state: LinkState,
    modem_state: ModemConnState,
    ppp_status: PppLinkStatus,
    legacy: bool,
    /// Attached, but the last registration query reported no coverage.
    out_of_coverage: bool,
    connection: Option<PppConnection>,
    state_waker: WakerRegistration,
}

impl Shared {
    const fn new() -> Self {
        Self {
            initialized: false,
            link_state: LinkState::Init,
            modem_state: ModemConnState::Disconnected,
            ppp_status: PppLinkStatus::Idle,
            legacy: false,
            out_of_coverage: false,
            connection: None,
            state_waker: WakerRegistration::new(),
        }
    }
}

#[derive(Clone, Copy)]
pub(crate) struct Runner<'d> {
    shared: &'d Mutex<NoopRawMutex, RefCell<Shared>>,
}

impl<'d> Runner<'d> {
    pub(crate) fn new(state: &'d State) -> Self {
        Self {
            shared: &state.shared,
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut Shared) -> R) -> R {
        self.shared.lock(|s| f(&mut *s.borrow_mut()))
    }

    fn update(&self, f: impl FnOnce(&mut Shared)) {
        self.with(|s| {
            f(s);
            s.state_waker.wake();
        })
    }

    pub(crate) fn is_initialized(&self) -> bool {
        self.with(|s| s.initialized)
    }

    /// Marks the link initialized, returning `false` if it already was.
    pub(crate) fn mark_initialized(&self) -> bool {
        self.with(|s| !core::mem::replace(&mut s.initialized, true))
    }

    /// Back to the power-on state, keeping the legacy flag.
    pub(crate) fn reset(&self) {
        self.update(|s| {
            s.initialized = false;
            s.link_state = LinkState::Init;
            s.modem_state = ModemConnState::Disconnected;
            s.ppp_status = PppLinkStatus::Idle;
            s.out_of_coverage = false;
            s.connection = None;
        })
    }

    pub(crate) fn link_state(&self) -> LinkState {
        self.with(|s| s.link_state)
    }

    pub(crate) fn set_link_state(&self, link_state: LinkState) {
        self.update(|s| {
            if s.link_state != link_state {
                debug!("Link state {:?} -> {:?}", s.link_state, link_state);
            }
            s.link_state = link_state;
        })
    }

    pub(crate) fn modem_state(&self, cx: Option<&mut Context>) -> ModemConnState {
        self.with(|s| {
            if let Some(cx) = cx {
                s.state_waker.register(cx.waker());
            }
            s.modem_state
        })
    }

    pub(crate) fn set_modem_state(&self, modem_state: ModemConnState) {
        self.update(|s| {
            if s.modem_state != modem_state {
                info!("Modem state {:?} -> {:?}", s.modem_state, modem_state);
            }
            s.modem_state = modem_state;
        })
    }

    pub(crate) async fn wait_for_modem_state(
        &self,
        f: impl Fn(ModemConnState) -> bool,
    ) -> ModemConnState {
        poll_fn(|cx| {
            let state = self.modem_state(Some(cx));
            if f(state) {
                return Poll::Ready(state);
            }
            Poll::Pending
        })
        .await
    }

    pub(crate) fn ppp_status(&self) -> PppLinkStatus {
        self.with(|s| s.ppp_status)
    }

    pub(crate) fn set_ppp_status(&self, status: PppLinkStatus) {
        self.update(|s| s.ppp_status = status)
    }

    pub(crate) fn legacy(&self) -> bool {
        self.with(|s| s.legacy)
    }

    pub(crate) fn set_legacy(&self, legacy: bool) {
        self.with(|s| s.legacy = legacy)
    }

    pub(crate) fn out_of_coverage(&self) -> bool {
        self.with(|s| s.out_of_coverage)
    }

    pub(crate) fn set_out_of_coverage(&self, out_of_coverage: bool) {
        self.with(|s| s.out_of_coverage = out_of_coverage)
    }

    pub(crate) fn connection(&self) -> Option<PppConnection> {
        self.with(|s| s.connection)
    }

    pub(crate) fn set_connection(&self, connection: Option<PppConnection>) {
        self.update(|s| s.connection = connection)
    }

    /// In PPP mode with an address assigned.
    pub(crate) fn is_ppp_up(&self) -> bool {
        self.with(|s| {
            s.link_state == LinkState::Ppp && s.connection.is_some_and(|c| c.is_up())
        })
    }
}
