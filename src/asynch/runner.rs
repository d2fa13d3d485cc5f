use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::channel::{Receiver, Sender};
use embassy_time::{Duration, Timer};

use super::at::{AtEngine, TransactionResult};
use super::bringup::{self, Trigger};
use super::dispatcher::{CommandResponse, Request, Tag};
use super::ppp::{PppBridge, PppEngine};
use super::state::{self, LinkState, ModemConnState};
use crate::config::{ModemConfig, Transport};

/// Idle time between iterations of the steady-state loop.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Background runner for the modem.
///
/// You must call `.run()` in a background task for the modem to operate.
pub struct Runner<'d, T: Transport, P: PppEngine, C: ModemConfig> {
    at: AtEngine<T>,
    ppp: P,
    bridge: PppBridge,
    config: C,
    ch: state::Runner<'d>,
    req_receiver: Receiver<'d, NoopRawMutex, (Tag, Request), 1>,
    res_sender: Sender<'d, NoopRawMutex, (Tag, CommandResponse), 1>,
    trigger: &'d Trigger,
}

impl<'d, T: Transport, P: PppEngine, C: ModemConfig> Runner<'d, T, P, C> {
    pub(crate) fn new(
        at: AtEngine<T>,
        ppp: P,
        config: C,
        ch: state::Runner<'d>,
        req_receiver: Receiver<'d, NoopRawMutex, (Tag, Request), 1>,
        res_sender: Sender<'d, NoopRawMutex, (Tag, CommandResponse), 1>,
        trigger: &'d Trigger,
    ) -> Self {
        Self {
            at,
            ppp,
            bridge: PppBridge::new(),
            config,
            ch,
            req_receiver,
            res_sender,
            trigger,
        }
    }

    pub async fn run(mut self) -> ! {
        loop {
            if self.ch.modem_state(None) != ModemConnState::Connected {
                bringup::bring_up(&mut self.at, &self.config, &self.ch, self.trigger).await;
                continue;
            }
            self.step().await;
        }
    }

    /// One iteration of the steady-state loop.
    ///
    /// Sleeps only when there was nothing to do, so a busy PPP link is
    /// relayed back to back.
    async fn step(&mut self) {
        let mut busy = false;
        if let Ok((tag, request)) = self.req_receiver.try_receive() {
            self.handle(tag, request).await;
            busy = true;
        }

        match self.ch.link_state() {
            LinkState::Ppp => {
                let moved = self
                    .bridge
                    .pump(self.at.transport(), &mut self.ppp, &self.ch)
                    .await;
                busy |= moved > 0;
            }
            LinkState::Suspended => {
                self.bridge
                    .drain_engine(self.at.transport(), &mut self.ppp, &self.ch)
                    .await;
            }
            _ => {}
        }

        if !busy {
            Timer::after(POLL_INTERVAL).await;
        }
    }

    async fn handle(&mut self, tag: Tag, request: Request) {
        match request {
            Request::At(cmd) => {
                let result = self
                    .at
                    .send_and_wait(
                        cmd.payload(),
                        cmd.timeout(),
                        None,
                        cmd.expect_continuation(),
                    )
                    .await;
                if result == TransactionResult::ContinuationAccepted {
                    return;
                }
                let response = CommandResponse::new(
                    self.at.response(),
                    result == TransactionResult::Overflowed,
                );
                self.res_sender.send((tag, response)).await;
            }
            Request::Await { expected, timeout } => {
                let result = self.at.wait_response(expected, timeout).await;
                let response = CommandResponse::new(
                    self.at.response(),
                    result == TransactionResult::Overflowed,
                );
                self.res_sender.send((tag, response)).await;
            }
            Request::EnterPpp => {
                info!("Entering PPP mode");
                self.bridge.reset(&self.ch);
                self.ppp.connect();
                self.ch.set_link_state(LinkState::Ppp);
                self.res_sender.send((tag, CommandResponse::default())).await;
            }
            Request::ExitPpp => {
                info!("Leaving PPP mode");
                self.ppp.close();
                self.bridge
                    .drain_engine(self.at.transport(), &mut self.ppp, &self.ch)
                    .await;
                self.bridge.reset(&self.ch);
                self.ch.set_connection(None);
                self.res_sender.send((tag, CommandResponse::default())).await;
            }
        }
    }
}
