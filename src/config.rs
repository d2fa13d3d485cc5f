use embassy_time::Duration;
use embedded_io_async::{Read, Write};

/// Why the host is (re)starting the modem link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ResetCause {
    PowerOn,
    /// The host was restarted by its watchdog, the modem kept running.
    Watchdog,
}

pub trait ModemConfig {
    // Transport settings
    const BAUD_RATE: u32 = 921_600;
    /// Baud rate the modem falls back to in its firmware recovery mode.
    const FALLBACK_BAUD_RATE: u32 = 115_200;
    const FLOW_CONTROL: bool = true;
    const RX_FLOW_THRESHOLD: u8 = 64;

    // Bring-up
    /// Number of `AT` attempts before the fallback baud rate is tried.
    const AT_TRIALS: u8 = 5;
    const AT_TIMEOUT: Duration = Duration::from_millis(250);
    const CONFIG_TIMEOUT: Duration = Duration::from_millis(7500);
    /// Timeout for the `+++` escape, also used as the back-off around it.
    const ESCAPE_TIMEOUT: Duration = Duration::from_millis(1150);
    /// Silence required after an acknowledged `+++` before the next command.
    const ESCAPE_GUARD_TIME: Duration = Duration::from_millis(1050);

    // Feature configuration
    /// Turn the radio off during a cold boot when no SIM card is found.
    const DISABLE_RADIO_WITHOUT_SIM: bool = true;
    /// Enable the vendor low-power airplane mode.
    const LOW_POWER_AIRPLANE: bool = true;
    /// Break signal on URC: `(enabled, duration_ms)`.
    const BREAK_ON_URC: Option<(bool, u16)> = Some((true, 100));

    fn reset_cause(&self) -> ResetCause {
        ResetCause::PowerOn
    }
}

/// Serial link to the modem.
///
/// Reads must be cancel-safe: the driver bounds every read with a timeout.
pub trait Transport: Read + Write {
    /// Number of received bytes that can be read without waiting.
    fn available(&mut self) -> usize;
    /// Drop everything received but not yet read.
    fn discard_buffered_input(&mut self);
    fn set_baudrate(&mut self, baudrate: u32);
    fn set_flow_control(&mut self, enabled: bool, rx_threshold: u8);
}
