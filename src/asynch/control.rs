use core::cell::Cell;
use core::fmt::Write;
use core::marker::PhantomData;

use atat::AtatCmd;
use embassy_time::{Duration, Timer};
use heapless::String;

use crate::command::general::{GetImei, Hangup, ReturnToDataMode};
use crate::command::mobile_control::types::Functionality;
use crate::command::mobile_control::{GetModuleFunctionality, SetModuleFunctionality};
use crate::command::psn::types::{AttachState, RegistrationStatus};
use crate::command::psn::{EnterDataState, GetAttachStatus, GetEpsRegistration, SetPdpContext};
use crate::command::responses::{parse_response, CONNECT, OK, SYSSTART};
use crate::command::vendor::{GetIccid, ResetModem};
use crate::command::{AT, ESCAPE_SEQUENCE};
use crate::config::ModemConfig;
use crate::error::Error;

use super::bringup::Trigger;
use super::dispatcher::{CommandResponse, Dispatcher, PendingCommand, Request};
use super::state::{self, LinkState, ModemConnState, PppLinkStatus};

const DEFAULT_CID: u8 = 1;
const DEFAULT_PDP_TYPE: &str = "IP";

/// Number of `AT` attempts while waiting for the modem to return to command
/// mode.
const COMMAND_MODE_TRIALS: usize = 10;

/// Foreground handle to the modem.
///
/// Every operation is a sequence of AT transactions executed by the
/// [`Runner`](super::runner::Runner), which must be running.
pub struct Control<'a, C: ModemConfig> {
    state_ch: state::Runner<'a>,
    dispatcher: Dispatcher<'a>,
    trigger: &'a Trigger,
    cid: Cell<u8>,
    _config: PhantomData<C>,
}

impl<'a, C: ModemConfig> Control<'a, C> {
    pub(crate) fn new(
        state_ch: state::Runner<'a>,
        dispatcher: Dispatcher<'a>,
        trigger: &'a Trigger,
    ) -> Self {
        Self {
            state_ch,
            dispatcher,
            trigger,
            cid: Cell::new(DEFAULT_CID),
            _config: PhantomData,
        }
    }

    /// Bring up the modem link and get the modem ready for attaching.
    ///
    /// Calling it again once initialized does nothing.
    pub async fn init(&self) -> Result<(), Error> {
        if self.state_ch.is_initialized() {
            return Ok(());
        }

        match self.state_ch.modem_state(None) {
            ModemConnState::Disconnected => self.start_link(),
            ModemConnState::Connecting | ModemConnState::Connected => {}
            ModemConnState::Recovery => return Err(Error::ModemNotReady),
        }
        self.wait_for_modem_ready().await?;

        // At least enable access to the SIM.
        let resp = self.send(&GetModuleFunctionality).await?;
        if matches!(
            parse_response(&GetModuleFunctionality, resp.payload()).map(|r| r.fun),
            Ok(Functionality::Minimum | Functionality::AirplaneMode)
        ) {
            self.send(&SetModuleFunctionality {
                fun: Functionality::AirplaneMode,
            })
            .await?;
            self.send(&AT).await?;
        }

        if self.state_ch.link_state() == LinkState::Init {
            self.state_ch.set_link_state(LinkState::Idle);
        }
        self.state_ch.mark_initialized();
        info!("Modem initialized");
        Ok(())
    }

    /// Leave any data session, turn the radio off and return to the power-on
    /// state.
    pub async fn deinit(&self) -> Result<(), Error> {
        if self.ensure_ready().is_ok() {
            if matches!(
                self.state_ch.link_state(),
                LinkState::Ppp | LinkState::Suspended
            ) {
                if let Err(e) = self.disconnect().await {
                    warn!("Disconnect during deinit failed: {:?}", e);
                }
            }
            if !self
                .send(&SetModuleFunctionality {
                    fun: Functionality::AirplaneMode,
                })
                .await?
                .is_ok()
            {
                warn!("Failed to turn off the radio");
            }
        }
        self.state_ch.reset();
        Ok(())
    }

    /// Wake the driver task to (re)run the modem bring-up.
    pub fn start_link(&self) {
        self.state_ch.set_modem_state(ModemConnState::Connecting);
        self.trigger.signal(());
    }

    /// Wait for a bring-up in progress to finish.
    pub async fn wait_for_modem_ready(&self) -> Result<(), Error> {
        match self
            .state_ch
            .wait_for_modem_state(|s| s != ModemConnState::Connecting)
            .await
        {
            ModemConnState::Connected => Ok(()),
            state => {
                warn!("Couldn't connect to modem: {:?}", state);
                Err(Error::ModemNotReady)
            }
        }
    }

    /// Hand a raw command to the driver.
    ///
    /// Returns `None` for continuation commands, which produce no response.
    pub async fn submit_at_command(
        &self,
        cmd: PendingCommand,
    ) -> Result<Option<CommandResponse>, Error> {
        self.ensure_ready()?;
        self.ensure_command_mode()?;
        Ok(self.dispatcher.submit(Request::At(cmd)).await)
    }

    /// Send an AT command and return the modem's answer.
    pub async fn send_at_cmd(&self, cmd: &str) -> Result<CommandResponse, Error> {
        self.ensure_ready()?;
        self.ensure_command_mode()?;
        self.command(cmd.as_bytes(), C::CONFIG_TIMEOUT).await
    }

    pub async fn imei(&self) -> Result<String<15>, Error> {
        self.ensure_ready()?;
        self.ensure_command_mode()?;
        let resp = self.send(&GetImei).await?;
        let imei = parse_response(&GetImei, resp.payload())
            .map_err(|_| Error::Failed)?
            .imei;

        let mut s = String::new();
        write!(s, "{:015}", imei).map_err(|_| Error::Failed)?;
        Ok(s)
    }

    /// ICCID of the SIM card, `None` if the modem reports none.
    pub async fn iccid(&self) -> Result<Option<String<24>>, Error> {
        self.ensure_ready()?;
        self.ensure_command_mode()?;
        let resp = self.send(&GetIccid).await?;
        match parse_response(&GetIccid, resp.payload()) {
            Ok(iccid) if !iccid.iccid.is_empty() => Ok(Some(iccid.iccid)),
            Ok(_) => Ok(None),
            Err(e) => {
                debug!("No ICCID: {:?}", e);
                Ok(None)
            }
        }
    }

    /// Whether the modem is attached and in network coverage.
    ///
    /// Loss of coverage is only tracked with the legacy attach procedure,
    /// where the modem can stay attached while out of coverage.
    pub async fn ue_coverage(&self) -> Result<bool, Error> {
        self.ensure_ready()?;
        self.ensure_command_mode()?;
        if self.is_attached().await? {
            Ok(!self.state_ch.out_of_coverage())
        } else {
            Ok(false)
        }
    }

    /// Reboot the modem, closing any data session first.
    ///
    /// The link is `Idle` afterwards.
    pub async fn reset(&self) -> Result<(), Error> {
        self.ensure_ready()?;
        self.disconnect().await?;

        let resp = self.send(&ResetModem).await?;
        self.state_ch.set_link_state(LinkState::Idle);
        self.state_ch.set_out_of_coverage(false);

        if !resp.contains(SYSSTART) {
            Timer::after(C::AT_TIMEOUT).await;
            for _ in 0..2 {
                if self.await_output(SYSSTART, C::CONFIG_TIMEOUT).await?.contains(SYSSTART) {
                    break;
                }
            }
        }

        self.at_ok(C::CONFIG_TIMEOUT).await?;
        if !self.at_ok(C::CONFIG_TIMEOUT).await? {
            error!("Modem not answering after reset");
            return Err(Error::Failed);
        }
        info!("Modem reset");
        Ok(())
    }

    /// Enable the radio and start attaching to the network.
    ///
    /// A PDP context is defined first when `apn` is given.
    pub async fn attach(&self, apn: Option<&str>, cid: Option<u8>) -> Result<(), Error> {
        self.ensure_ready()?;
        self.is_attached().await?;

        if self.state_ch.link_state() >= LinkState::Attaching {
            return Ok(());
        }
        if let Some(cid) = cid {
            self.cid.set(cid);
        }
        if let Some(apn) = apn {
            let resp = self
                .send(&SetPdpContext {
                    cid: self.cid.get(),
                    pdp_type: DEFAULT_PDP_TYPE,
                    apn,
                })
                .await?;
            if !resp.is_ok() {
                return Err(Error::Failed);
            }
        }

        self.state_ch.set_link_state(LinkState::Attaching);
        let resp = self
            .send(&SetModuleFunctionality {
                fun: Functionality::Full,
            })
            .await?;
        if !resp.is_ok() {
            return Err(Error::Failed);
        }
        Ok(())
    }

    /// Query the attach status, updating the link state to match.
    pub async fn is_attached(&self) -> Result<bool, Error> {
        self.ensure_ready()?;

        if self.state_ch.link_state() == LinkState::Ppp {
            return Ok(self.state_ch.is_ppp_up());
        }

        self.send(&AT).await?;
        let resp = self.send(&GetAttachStatus).await?;
        let cgatt = matches!(
            parse_response(&GetAttachStatus, resp.payload()),
            Ok(status) if status.state == AttachState::Attached
        );

        let attached = if self.state_ch.legacy() {
            let resp = self.send(&GetEpsRegistration).await?;
            let status = parse_response(&GetEpsRegistration, resp.payload()).map(|r| r.stat);
            if cgatt {
                self.state_ch
                    .set_out_of_coverage(status == Ok(RegistrationStatus::Unknown));
            }
            match status {
                Ok(status) if status.is_registered() => true,
                // Out of coverage, but still attached.
                Ok(RegistrationStatus::Unknown) => cgatt,
                _ => false,
            }
        } else {
            cgatt
        };

        let resp = self.send(&GetModuleFunctionality).await?;
        let radio_on = matches!(
            parse_response(&GetModuleFunctionality, resp.payload()),
            Ok(r) if r.fun == Functionality::Full
        );
        if self.state_ch.link_state() >= LinkState::Attaching {
            if !radio_on {
                warn!("Radio is off while attaching, enabling it again");
                self.send(&SetModuleFunctionality {
                    fun: Functionality::Full,
                })
                .await?;
            }
        } else if radio_on {
            self.state_ch.set_link_state(LinkState::Attaching);
        } else {
            self.state_ch.set_link_state(LinkState::Idle);
        }

        let link = self.state_ch.link_state();
        if attached && link < LinkState::Ppp {
            self.state_ch.set_link_state(LinkState::Attached);
        } else if !attached && link > LinkState::Idle && link < LinkState::Ppp {
            self.state_ch.set_link_state(LinkState::Attaching);
        }
        Ok(attached)
    }

    /// Turn the radio off, closing any data session first.
    pub async fn detach(&self) -> Result<(), Error> {
        self.ensure_ready()?;
        if matches!(
            self.state_ch.link_state(),
            LinkState::Ppp | LinkState::Suspended
        ) {
            self.disconnect().await?;
        }

        let resp = self
            .send(&SetModuleFunctionality {
                fun: Functionality::AirplaneMode,
            })
            .await?;
        if !resp.is_ok() {
            return Err(Error::Failed);
        }
        self.state_ch.set_link_state(LinkState::Idle);
        Ok(())
    }

    /// Dial a data session and hand the link to the PPP engine.
    pub async fn connect(&self, cid: Option<u8>) -> Result<(), Error> {
        self.ensure_ready()?;
        if self.state_ch.is_ppp_up() {
            return Ok(());
        }
        if let Some(cid) = cid {
            self.cid.set(cid);
        }

        self.is_attached().await?;
        let legacy = self.state_ch.legacy();
        if legacy {
            self.send(&Hangup).await?;
            self.wait_for_command_mode().await?;
        }

        match self.state_ch.link_state() {
            LinkState::Attached => {}
            LinkState::Suspended if legacy => {}
            LinkState::Ppp => return Err(Error::AlreadyConnected),
            LinkState::Suspended => return Err(Error::Suspended),
            _ => return Err(Error::NotAttached),
        }

        // Resume a data session the modem may still hold before dialing a
        // new one.
        let resumed = !legacy && self.send(&ReturnToDataMode).await?.contains(CONNECT);
        if !resumed {
            let resp = self
                .send(&EnterDataState {
                    l2p: "PPP",
                    cid: self.cid.get(),
                })
                .await?;
            if !resp.contains(CONNECT) {
                return Err(Error::Failed);
            }
        }

        self.dispatcher.submit(Request::EnterPpp).await;
        Ok(())
    }

    /// Pause the data session, keeping it alive in the modem.
    ///
    /// Outbound PPP traffic is staged until [`resume`](Self::resume).
    pub async fn suspend(&self) -> Result<(), Error> {
        if self.state_ch.legacy() {
            return Err(Error::Unsupported);
        }
        self.ensure_ready()?;

        if self.state_ch.link_state() == LinkState::Ppp {
            self.suspend_ppp();
            self.pause_data_mode().await?;
            self.state_ch.set_link_state(LinkState::Suspended);
            self.wait_for_command_mode().await?;
            self.is_attached().await?;
        }
        Ok(())
    }

    /// Return to a suspended data session, or dial a new one if the modem
    /// lost it.
    pub async fn resume(&self, cid: Option<u8>) -> Result<(), Error> {
        self.ensure_ready()?;
        if self.state_ch.link_state() == LinkState::Ppp {
            return Err(Error::AlreadyConnected);
        }
        self.is_attached().await?;

        let link = self.state_ch.link_state();
        if !matches!(link, LinkState::Suspended | LinkState::Attached) {
            return Ok(());
        }
        if link == LinkState::Attached && self.state_ch.legacy() {
            return Err(Error::Unsupported);
        }
        if let Some(cid) = cid {
            self.cid.set(cid);
        }

        if self.send(&ReturnToDataMode).await?.contains(CONNECT) {
            if link == LinkState::Suspended {
                self.resume_ppp();
                self.state_ch.set_link_state(LinkState::Ppp);
            } else {
                self.dispatcher.submit(Request::EnterPpp).await;
            }
            return Ok(());
        }

        warn!("Data session lost, dialing again");
        self.dispatcher.submit(Request::ExitPpp).await;
        self.state_ch.set_link_state(LinkState::Attached);
        self.is_attached().await?;
        self.connect(None).await
    }

    /// Close the data session and hang up.
    pub async fn disconnect(&self) -> Result<(), Error> {
        self.ensure_ready()?;

        let link = self.state_ch.link_state();
        if matches!(link, LinkState::Ppp | LinkState::Suspended) {
            self.dispatcher.submit(Request::ExitPpp).await;
            if link == LinkState::Ppp {
                self.pause_data_mode().await?;
            }
            self.state_ch.set_link_state(LinkState::Attached);
            self.send(&Hangup).await?;
            self.wait_for_command_mode().await?;
            self.is_attached().await?;
        }
        Ok(())
    }

    pub fn link_state(&self) -> LinkState {
        self.state_ch.link_state()
    }

    pub fn set_link_state(&self, link_state: LinkState) {
        self.state_ch.set_link_state(link_state)
    }

    pub fn modem_conn_state(&self) -> ModemConnState {
        self.state_ch.modem_state(None)
    }

    pub fn set_modem_conn_state(&self, modem_state: ModemConnState) {
        self.state_ch.set_modem_state(modem_state)
    }

    /// Stage outbound PPP bytes instead of transmitting them.
    pub fn suspend_ppp(&self) {
        self.state_ch.set_ppp_status(PppLinkStatus::Suspended)
    }

    /// Transmit outbound PPP bytes again, staged bytes first.
    pub fn resume_ppp(&self) {
        self.state_ch.set_ppp_status(PppLinkStatus::Resumed)
    }

    /// Address assigned to the PPP session as a host-order integer, `0` if
    /// there is none.
    pub fn ipv4_address(&self) -> u32 {
        self.state_ch.connection().map_or(0, |c| c.ipv4_u32())
    }

    pub fn is_ppp_up(&self) -> bool {
        self.state_ch.is_ppp_up()
    }

    pub fn legacy(&self) -> bool {
        self.state_ch.legacy()
    }

    /// Use the legacy attach and dial procedure of older modem firmware.
    pub fn set_legacy(&self, legacy: bool) {
        self.state_ch.set_legacy(legacy)
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        if !self.state_ch.is_initialized() {
            return Err(Error::NotInitialized);
        }
        if self.state_ch.modem_state(None) != ModemConnState::Connected {
            return Err(Error::ModemNotReady);
        }
        Ok(())
    }

    fn ensure_command_mode(&self) -> Result<(), Error> {
        if self.state_ch.link_state() == LinkState::Ppp {
            return Err(Error::DataMode);
        }
        Ok(())
    }

    async fn command(&self, payload: &[u8], timeout: Duration) -> Result<CommandResponse, Error> {
        let cmd = PendingCommand::new(payload, timeout)?;
        self.dispatcher
            .submit(Request::At(cmd))
            .await
            .ok_or(Error::Failed)
    }

    async fn send<Cmd: AtatCmd>(&self, cmd: &Cmd) -> Result<CommandResponse, Error> {
        let cmd = PendingCommand::from_cmd(cmd)?;
        self.dispatcher
            .submit(Request::At(cmd))
            .await
            .ok_or(Error::Failed)
    }

    /// Collect unsolicited output until `expected` shows up or `timeout`
    /// passes.
    async fn await_output(
        &self,
        expected: &'static [u8],
        timeout: Duration,
    ) -> Result<CommandResponse, Error> {
        self.dispatcher
            .submit(Request::Await { expected, timeout })
            .await
            .ok_or(Error::Failed)
    }

    async fn at_ok(&self, timeout: Duration) -> Result<bool, Error> {
        Ok(self.command(b"AT", timeout).await?.is_ok())
    }

    /// Poll with `AT` until the modem answers in command mode.
    async fn wait_for_command_mode(&self) -> Result<(), Error> {
        for _ in 0..COMMAND_MODE_TRIALS {
            Timer::after(C::AT_TIMEOUT).await;
            if self.at_ok(C::CONFIG_TIMEOUT).await? {
                return Ok(());
            }
        }
        Err(Error::Timeout)
    }

    /// Drop the modem from data mode to command mode.
    ///
    /// Alternates the escape sequence with `AT` polls, backing off before
    /// each attempt.
    async fn pause_data_mode(&self) -> Result<(), Error> {
        let back_off = C::ESCAPE_TIMEOUT;
        for _ in 0..2 {
            Timer::after(back_off).await;
            if self.command(ESCAPE_SEQUENCE, back_off).await?.contains(OK) {
                return Ok(());
            }
            for _ in 0..2 {
                Timer::after(back_off).await;
                if self.at_ok(C::AT_TIMEOUT).await? {
                    return Ok(());
                }
            }
        }
        error!("Modem did not leave data mode");
        Err(Error::Timeout)
    }
}
