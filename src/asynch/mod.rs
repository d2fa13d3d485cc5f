pub mod at;
pub(crate) mod bringup;
pub mod control;
pub mod dispatcher;
pub mod notify;
pub mod ppp;
mod resources;
pub mod runner;
pub mod state;

pub use bringup::BringUpState;
pub use resources::Resources;

use crate::config::{ModemConfig, Transport};

use self::at::AtEngine;
use self::control::Control;
use self::dispatcher::Dispatcher;
use self::ppp::PppEngine;
use self::runner::Runner;

/// Split the driver into its foreground handle and the background task.
///
/// `runner.run()` must be polled in a background task for the modem to
/// operate; it takes ownership of the transport and the PPP engine.
pub fn new<'a, T: Transport, P: PppEngine, C: ModemConfig>(
    resources: &'a mut Resources,
    transport: T,
    ppp: P,
    config: C,
) -> (Control<'a, C>, Runner<'a, T, P, C>) {
    let resources: &'a Resources = resources;
    let state_ch = state::Runner::new(&resources.ch);

    let control = Control::new(
        state_ch,
        Dispatcher::new(&resources.req_slot, &resources.res_slot),
        &resources.trigger,
    );

    let runner = Runner::new(
        AtEngine::new(transport),
        ppp,
        config,
        state_ch,
        resources.req_slot.receiver(),
        resources.res_slot.sender(),
        &resources.trigger,
    );

    (control, runner)
}

#[cfg(test)]
mod tests {
    use core::future::Future;
    use std::cell::Cell;
    use std::rc::Rc;
    use std::vec::Vec;

    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_futures::select::{select, Either};
    use embassy_time::{Duration, Timer};
    use no_std_net::Ipv4Addr;

    use super::bringup::tests::FastConfig;
    use super::dispatcher::PendingCommand;
    use super::ppp::PppStatus;
    use super::state::{LinkState, ModemConnState};
    use super::*;
    use crate::connection::PppConnection;
    use crate::error::Error;
    use crate::test_helpers::{init_logger, MockPpp, MockTransport};

    /// Modem model tracking the radio, data mode and the data session.
    fn lte_modem() -> MockTransport {
        lte_modem_in(Rc::new(Cell::new(true)))
    }

    /// Same, registered only while `coverage` is set.
    fn lte_modem_in(coverage: Rc<Cell<bool>>) -> MockTransport {
        let data_mode = Rc::new(Cell::new(false));
        let session = Rc::new(Cell::new(false));
        let radio = Rc::new(Cell::new(4u8));

        MockTransport::new(move |line, _| {
            let reply: Vec<u8> = if data_mode.get() {
                if line != b"+++" {
                    return None;
                }
                data_mode.set(false);
                b"\r\nOK\r\n".to_vec()
            } else {
                match line {
                    b"+++" => return None,
                    b"AT+CFUN?" => std::format!("\r\n+CFUN: {}\r\n\r\nOK\r\n", radio.get()).into(),
                    b"AT+CFUN=1" => {
                        radio.set(1);
                        b"\r\nOK\r\n".to_vec()
                    }
                    b"AT+CFUN=4" => {
                        radio.set(4);
                        b"\r\nOK\r\n".to_vec()
                    }
                    b"AT+CGATT?" => {
                        std::format!("\r\n+CGATT: {}\r\n\r\nOK\r\n", u8::from(radio.get() == 1))
                            .into()
                    }
                    b"AT+CEREG?" => match (radio.get(), coverage.get()) {
                        (1, true) => b"\r\n+CEREG: 2,1,\"2008\",\"0135BF02\",7\r\n\r\nOK\r\n".to_vec(),
                        (1, false) => b"\r\n+CEREG: 2,4\r\n\r\nOK\r\n".to_vec(),
                        _ => b"\r\n+CEREG: 2,0\r\n\r\nOK\r\n".to_vec(),
                    },
                    b"AT+CPIN?" => b"\r\n+CPIN: READY\r\n\r\nOK\r\n".to_vec(),
                    b"AT+SQNCCID?" => {
                        b"\r\n+SQNCCID: \"89882280666027595893\",\"\"\r\n\r\nOK\r\n".to_vec()
                    }
                    // Answered, but never terminated.
                    b"AT+SLOW" => b"\r\n+SLOW: stale\r\n".to_vec(),
                    b"AT^RESET" => {
                        radio.set(4);
                        session.set(false);
                        b"\r\nOK\r\n".to_vec()
                    }
                    b"AT!=\"getlpm\"" => b"\r\nairplane=1 enable=1\r\n\r\nOK\r\n".to_vec(),
                    b"AT+SQNIBRCFG?" => b"\r\n+SQNIBRCFG: 1,100\r\n\r\nOK\r\n".to_vec(),
                    b"AT+CGSN" => b"\r\n354347094000000\r\n\r\nOK\r\n".to_vec(),
                    b"ATO" if session.get() => {
                        data_mode.set(true);
                        b"\r\nCONNECT\r\n".to_vec()
                    }
                    b"ATO" => b"\r\nERROR\r\n".to_vec(),
                    b"AT+CGDATA=\"PPP\",1" if radio.get() == 1 => {
                        data_mode.set(true);
                        session.set(true);
                        b"\r\nCONNECT\r\n".to_vec()
                    }
                    b"ATH" => {
                        session.set(false);
                        b"\r\nOK\r\n".to_vec()
                    }
                    _ => b"\r\nOK\r\n".to_vec(),
                }
            };
            Some(reply)
        })
    }

    /// Run `test` in the foreground while the driver runs in the background.
    fn with_driver<'a, R>(
        runner: runner::Runner<'a, MockTransport, MockPpp, FastConfig>,
        test: impl Future<Output = R>,
    ) -> R {
        match block_on(select(runner.run(), test)) {
            Either::First(_) => unreachable!(),
            Either::Second(r) => r,
        }
    }

    async fn eventually(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            Timer::after(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    fn count(haystack: &[u8], needle: &[u8]) -> usize {
        haystack.windows(needle.len()).filter(|w| w == &needle).count()
    }

    #[test]
    fn operations_require_init() {
        init_logger();
        let mut resources = Resources::new();
        let (control, _runner) = new(
            &mut resources,
            MockTransport::ok(),
            MockPpp::default(),
            FastConfig,
        );

        assert_eq!(block_on(control.attach(None, None)), Err(Error::NotInitialized));
        assert_eq!(block_on(control.imei()), Err(Error::NotInitialized));
        assert_eq!(block_on(control.reset()), Err(Error::NotInitialized));

        // Refused right away instead of waiting on a driver that isn't running.
        let cmd = PendingCommand::new(b"AT", Duration::from_millis(50)).unwrap();
        assert_eq!(
            block_on(control.submit_at_command(cmd)),
            Err(Error::NotInitialized)
        );
        assert_eq!(control.link_state(), LinkState::Init);
        assert_eq!(control.modem_conn_state(), ModemConnState::Disconnected);
        assert_eq!(control.ipv4_address(), 0);
    }

    #[test]
    fn init_is_idempotent_and_commands_pair_in_order() {
        init_logger();
        let modem = lte_modem();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, modem.clone(), MockPpp::default(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();
            assert_eq!(control.modem_conn_state(), ModemConnState::Connected);
            assert_eq!(control.link_state(), LinkState::Idle);

            let bring_ups = modem.count_commands(b"ATE0");
            control.set_link_state(LinkState::Attaching);
            control.init().await.unwrap();
            assert_eq!(control.link_state(), LinkState::Attaching);
            assert_eq!(modem.count_commands(b"ATE0"), bring_ups);

            let part = PendingCommand::continuation(b"part", Duration::from_millis(50)).unwrap();
            assert_eq!(control.submit_at_command(part).await, Ok(None));

            let first = control.send_at_cmd("AT+CFUN?").await.unwrap();
            let second = control.send_at_cmd("AT+CGSN").await.unwrap();
            assert!(first.as_str().contains("+CFUN: 4"));
            assert!(second.as_str().contains("354347094000000"));
            assert_eq!(control.imei().await.unwrap().as_str(), "354347094000000");
        });
    }

    #[test]
    fn deinit_returns_to_power_on_state() {
        init_logger();
        let modem = lte_modem();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, modem.clone(), MockPpp::default(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();
            control.deinit().await.unwrap();
            assert_eq!(control.link_state(), LinkState::Init);
            assert_eq!(control.modem_conn_state(), ModemConnState::Disconnected);
            assert_eq!(
                control.attach(None, None).await,
                Err(Error::NotInitialized)
            );

            // Deinit twice is harmless, init brings the modem up again.
            control.deinit().await.unwrap();
            control.init().await.unwrap();
            assert_eq!(control.modem_conn_state(), ModemConnState::Connected);
            assert_eq!(modem.count_commands(b"ATE0"), 2);
        });
    }

    #[test]
    fn attach_connect_suspend_resume_disconnect() {
        init_logger();
        let modem = lte_modem();
        let ppp = MockPpp::default();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, modem.clone(), ppp.clone(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();
            assert_eq!(control.connect(None).await, Err(Error::NotAttached));

            control.attach(Some("internet"), None).await.unwrap();
            assert_eq!(modem.count_commands(b"AT+CGDCONT=1,\"IP\",\"internet\""), 1);
            assert!(control.is_attached().await.unwrap());
            assert_eq!(control.link_state(), LinkState::Attached);

            control.connect(None).await.unwrap();
            assert_eq!(control.link_state(), LinkState::Ppp);
            assert_eq!(ppp.session.borrow().connects, 1);
            assert_eq!(control.send_at_cmd("AT").await, Err(Error::DataMode));
            let cmd = PendingCommand::new(b"AT+CGSN", Duration::from_millis(50)).unwrap();
            assert_eq!(control.submit_at_command(cmd).await, Err(Error::DataMode));
            assert_eq!(modem.count_commands(b"AT+CGSN"), 0);
            assert_eq!(control.iccid().await, Err(Error::DataMode));

            ppp.queue_status(PppStatus::Up(PppConnection {
                address: Ipv4Addr::new(10, 0, 0, 2),
                gateway: None,
                netmask: None,
                dns_servers: Default::default(),
            }));
            eventually(|| control.is_ppp_up()).await;
            assert_eq!(control.ipv4_address(), 0x0a00_0002);
            assert!(control.is_attached().await.unwrap());

            ppp.queue_output(b"~first~");
            eventually(|| count(&modem.written(), b"~first~") == 1).await;

            control.suspend().await.unwrap();
            assert_eq!(control.link_state(), LinkState::Suspended);

            ppp.queue_output(b"~staged~");
            Timer::after(Duration::from_millis(50)).await;
            assert_eq!(count(&modem.written(), b"~staged~"), 0);

            control.resume(None).await.unwrap();
            assert_eq!(control.link_state(), LinkState::Ppp);
            eventually(|| count(&modem.written(), b"~staged~") == 1).await;
            Timer::after(Duration::from_millis(50)).await;
            assert_eq!(count(&modem.written(), b"~staged~"), 1);

            control.disconnect().await.unwrap();
            assert_eq!(control.link_state(), LinkState::Attached);
            assert_eq!(ppp.session.borrow().closes, 1);
            assert!(!control.is_ppp_up());
            assert_eq!(control.ipv4_address(), 0);
        });
    }

    #[test]
    fn resume_redials_a_lost_session() {
        init_logger();
        let modem = lte_modem();
        let ppp = MockPpp::default();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, modem.clone(), ppp.clone(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();
            control.attach(None, None).await.unwrap();
            control.connect(None).await.unwrap();
            control.suspend().await.unwrap();

            // The modem drops the session while suspended.
            control.send_at_cmd("ATH").await.unwrap();

            control.resume(None).await.unwrap();
            assert_eq!(control.link_state(), LinkState::Ppp);
            assert_eq!(ppp.session.borrow().closes, 1);
            assert_eq!(ppp.session.borrow().connects, 2);
            assert_eq!(modem.count_commands(b"AT+CGDATA=\"PPP\",1"), 2);
        });
    }

    #[test]
    fn suspend_is_unsupported_in_legacy_mode() {
        init_logger();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, lte_modem(), MockPpp::default(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();
            control.set_legacy(true);
            assert_eq!(control.suspend().await, Err(Error::Unsupported));
        });
    }

    #[test]
    fn abandoned_command_does_not_answer_the_next_one() {
        init_logger();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, lte_modem(), MockPpp::default(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();

            let abandoned = select(
                control.send_at_cmd("AT+SLOW"),
                Timer::after(Duration::from_millis(10)),
            )
            .await;
            assert!(matches!(abandoned, Either::Second(())));

            let resp = control.send_at_cmd("AT+CFUN?").await.unwrap();
            assert!(resp.as_str().contains("+CFUN: 4"));
            assert!(!resp.as_str().contains("+SLOW"));
        });
    }

    #[test]
    fn reset_closes_the_session_and_reboots_into_idle() {
        init_logger();
        let modem = lte_modem();
        let ppp = MockPpp::default();
        let mut resources = Resources::new();
        let (control, runner) = new(&mut resources, modem.clone(), ppp.clone(), FastConfig);

        with_driver(runner, async {
            control.init().await.unwrap();
            control.attach(None, None).await.unwrap();
            control.connect(None).await.unwrap();
            assert_eq!(control.link_state(), LinkState::Ppp);

            let boot = async {
                eventually(|| modem.count_commands(b"AT^RESET") == 1).await;
                modem.push_rx(b"\r\n+SYSSTART\r\n");
            };
            let (result, _) = join(control.reset(), boot).await;
            result.unwrap();

            assert_eq!(control.link_state(), LinkState::Idle);
            assert_eq!(ppp.session.borrow().closes, 1);
            assert_eq!(modem.count_commands(b"ATH"), 1);
            let commands = modem.commands();
            let reset_at = commands.iter().position(|c| c == b"AT^RESET").unwrap();
            assert_eq!(commands[reset_at + 1..], [b"AT".to_vec(), b"AT".to_vec()]);
        });
    }

    #[test]
    fn coverage_follows_registration_in_legacy_mode() {
        init_logger();
        let coverage = Rc::new(Cell::new(true));
        let mut resources = Resources::new();
        let (control, runner) = new(
            &mut resources,
            lte_modem_in(coverage.clone()),
            MockPpp::default(),
            FastConfig,
        );

        with_driver(runner, async {
            control.init().await.unwrap();
            control.set_legacy(true);
            assert!(!control.ue_coverage().await.unwrap());

            control.attach(None, None).await.unwrap();
            assert!(control.ue_coverage().await.unwrap());

            // Attached, but the cell is gone.
            coverage.set(false);
            assert!(!control.ue_coverage().await.unwrap());
            assert!(control.is_attached().await.unwrap());
            assert_eq!(control.link_state(), LinkState::Attached);

            assert_eq!(
                control.iccid().await.unwrap().as_deref(),
                Some("89882280666027595893")
            );
        });
    }
}
