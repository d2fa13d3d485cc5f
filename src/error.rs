use embassy_time::TimeoutError;

/// Errors returned by the foreground [`Control`](crate::asynch::control::Control) handle.
///
/// The driver task itself never fails: every failure there ends in a
/// well-defined [`ModemConnState`](crate::asynch::state::ModemConnState).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// `init()` has not been called, or `deinit()` was called since.
    NotInitialized,
    /// The modem has not completed bring-up (or is in recovery).
    ModemNotReady,
    /// The link is in PPP data mode, AT commands cannot be sent.
    DataMode,
    /// The modem is not attached to the network.
    NotAttached,
    /// A PPP session is already established.
    AlreadyConnected,
    /// The PPP session is suspended.
    Suspended,
    /// Operation not available with the legacy modem firmware.
    Unsupported,
    /// The command does not fit in a single AT transaction.
    CommandTooLong,
    /// The modem did not answer in time.
    Timeout,
    /// The modem answered, but not with the expected result.
    Failed,
}

impl From<TimeoutError> for Error {
    fn from(_: TimeoutError) -> Self {
        Error::Timeout
    }
}
