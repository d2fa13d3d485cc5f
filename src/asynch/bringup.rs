//! Modem bring-up: take the modem from an unknown state to an idle command
//! mode with a known configuration.

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::{Duration, Timer};

use super::at::AtEngine;
use super::state::{self, LinkState, ModemConnState};
use crate::command::general::SetEcho;
use crate::command::mobile_control::types::Functionality;
use crate::command::mobile_control::{
    GetModuleFunctionality, GetPinStatus, SetModuleFunctionality,
};
use crate::command::psn::types::{PowerSavingMode, RegistrationUrc};
use crate::command::psn::{SetEpsRegistrationUrc, SetPowerSavingMode};
use crate::command::responses::{self, parse_response, OK};
use crate::command::vendor::responses::BreakConfig;
use crate::command::vendor::{
    EnableLowPowerAirplane, GetBreakConfig, GetLowPowerMode, SetBreakConfig,
};
use crate::command::{OnOff, AT, ESCAPE_SEQUENCE};
use crate::config::{ModemConfig, ResetCause, Transport};

pub(crate) type Trigger = Signal<NoopRawMutex, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BringUpState {
    AwaitTrigger,
    ExitDataMode,
    VerifyLiveness,
    CheckFallbackBaud,
    Configure,
    Connected,
    Recovery,
}

/// Run the bring-up sequence, starting with the wait for the trigger.
///
/// Returns once the modem is `Connected` or in `Recovery`. A modem that does
/// not answer at all goes back to waiting for the next trigger.
pub(crate) async fn bring_up<T: Transport, C: ModemConfig, const N: usize>(
    at: &mut AtEngine<T, N>,
    config: &C,
    state: &state::Runner<'_>,
    trigger: &Trigger,
) -> ModemConnState {
    let mut step = BringUpState::AwaitTrigger;
    loop {
        trace!("Bring-up: {:?}", step);
        step = match step {
            BringUpState::AwaitTrigger => {
                trigger.wait().await;
                state.set_modem_state(ModemConnState::Connecting);

                let transport = at.transport();
                transport.set_baudrate(C::BAUD_RATE);
                transport.set_flow_control(C::FLOW_CONTROL, C::RX_FLOW_THRESHOLD);
                BringUpState::ExitDataMode
            }
            BringUpState::ExitDataMode => {
                exit_data_mode::<T, C, N>(at).await;
                BringUpState::VerifyLiveness
            }
            BringUpState::VerifyLiveness => {
                if verify_liveness::<T, C, N>(at).await {
                    BringUpState::Configure
                } else {
                    BringUpState::CheckFallbackBaud
                }
            }
            BringUpState::CheckFallbackBaud => {
                warn!(
                    "Modem not answering, probing {} baud",
                    C::FALLBACK_BAUD_RATE
                );
                at.transport().set_baudrate(C::FALLBACK_BAUD_RATE);
                if at
                    .send_cmd_with_timeout(&AT, OK, C::AT_TIMEOUT)
                    .await
                    .is_matched()
                {
                    BringUpState::Recovery
                } else {
                    error!("Couldn't connect to modem");
                    at.transport().set_baudrate(C::BAUD_RATE);
                    state.set_modem_state(ModemConnState::Disconnected);
                    BringUpState::AwaitTrigger
                }
            }
            BringUpState::Configure => {
                configure(at, config).await;
                BringUpState::Connected
            }
            BringUpState::Connected => {
                state.set_modem_state(ModemConnState::Connected);
                if state.link_state() == LinkState::Init {
                    state.set_link_state(LinkState::Idle);
                }
                return ModemConnState::Connected;
            }
            BringUpState::Recovery => {
                warn!("Modem is in firmware recovery mode");
                state.set_modem_state(ModemConnState::Recovery);
                return ModemConnState::Recovery;
            }
        }
    }
}

/// Leave a data session that may have survived a host restart.
async fn exit_data_mode<T: Transport, C: ModemConfig, const N: usize>(at: &mut AtEngine<T, N>) {
    if at
        .send_and_wait(ESCAPE_SEQUENCE, C::ESCAPE_TIMEOUT, Some(OK), false)
        .await
        .is_matched()
    {
        debug!("Modem left data mode");
        Timer::after(C::ESCAPE_GUARD_TIME).await;
    }
}

/// Send `AT` until it is acknowledged, at most `AT_TRIALS` times.
pub(crate) async fn verify_liveness<T: Transport, C: ModemConfig, const N: usize>(
    at: &mut AtEngine<T, N>,
) -> bool {
    for attempt in 1..=C::AT_TRIALS {
        if at
            .send_cmd_with_timeout(&AT, OK, C::AT_TIMEOUT)
            .await
            .is_matched()
        {
            return true;
        }
        debug!("AT attempt {}/{} unanswered", attempt, C::AT_TRIALS);
    }
    false
}

/// Issue one configuration command, logging a failure.
async fn advisory<T: Transport, Cmd: atat::AtatCmd, const N: usize>(
    at: &mut AtEngine<T, N>,
    cmd: &Cmd,
    timeout: Duration,
) -> bool {
    let ok = at.send_cmd_with_timeout(cmd, OK, timeout).await.is_matched();
    if !ok {
        warn!(
            "{} failed: {:?}",
            core::any::type_name::<Cmd>(),
            atat::helpers::LossyStr(at.response())
        );
    }
    ok
}

async fn configure<T: Transport, C: ModemConfig, const N: usize>(
    at: &mut AtEngine<T, N>,
    config: &C,
) {
    let timeout = C::CONFIG_TIMEOUT;

    advisory(at, &SetEcho { on: OnOff::Off }, timeout).await;
    advisory(
        at,
        &SetPowerSavingMode {
            mode: PowerSavingMode::Disabled,
        },
        timeout,
    )
    .await;
    advisory(
        at,
        &SetEpsRegistrationUrc {
            n: RegistrationUrc::EnabledWithLocation,
        },
        timeout,
    )
    .await;

    // Keep the radio as it is when it is on or in airplane mode, at least
    // enable access to the SIM otherwise.
    advisory(at, &GetModuleFunctionality, timeout).await;
    match parse_response(&GetModuleFunctionality, at.response()) {
        Ok(resp) if resp.fun != Functionality::Minimum => {}
        _ => {
            advisory(
                at,
                &SetModuleFunctionality {
                    fun: Functionality::AirplaneMode,
                },
                timeout,
            )
            .await;
        }
    }

    if !sim_present(at, timeout).await {
        warn!("No SIM card present");
        if C::DISABLE_RADIO_WITHOUT_SIM && config.reset_cause() == ResetCause::PowerOn {
            advisory(
                at,
                &SetModuleFunctionality {
                    fun: Functionality::Minimum,
                },
                timeout,
            )
            .await;
        }
    }

    // The low-power settings are a free-form list of `key=value` flags.
    if C::LOW_POWER_AIRPLANE {
        advisory(at, &GetLowPowerMode, timeout).await;
        if !responses::contains(at.response(), b"airplane=1") {
            advisory(at, &EnableLowPowerAirplane, timeout).await;
        }
    }

    if let Some((enabled, duration_ms)) = C::BREAK_ON_URC {
        advisory(at, &GetBreakConfig, timeout).await;
        let wanted = BreakConfig {
            enabled: enabled.into(),
            duration_ms,
        };
        if parse_response(&GetBreakConfig, at.response()).ok() != Some(wanted) {
            advisory(
                at,
                &SetBreakConfig {
                    enabled: enabled.into(),
                    duration_ms,
                },
                timeout,
            )
            .await;
        }
    }
}

/// Query the SIM state, asking twice before concluding there is none.
///
/// Only a refused query means the SIM is missing. A card waiting for its PIN
/// is still present.
async fn sim_present<T: Transport, const N: usize>(
    at: &mut AtEngine<T, N>,
    timeout: Duration,
) -> bool {
    for _ in 0..2 {
        at.send_cmd_with_timeout(&GetPinStatus, OK, timeout).await;
        match parse_response(&GetPinStatus, at.response()) {
            Err(atat::Error::Error | atat::Error::CmeError(_)) => {}
            _ => return true,
        }
    }
    false
}
