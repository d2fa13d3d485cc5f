//! Notifications raised from interrupt context, such as the UART break the
//! modem sends ahead of unsolicited result codes.

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::channel::Channel;
use portable_atomic::{AtomicU32, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ModemEvent {
    /// A break condition was detected on the serial line.
    Break,
    /// The host was woken by an alarm while the modem was asleep.
    Alarm,
}

/// Bounded queue of [`ModemEvent`]s.
///
/// The producer side never blocks: when the queue is full the event is
/// dropped and counted.
pub struct Notifier<M: RawMutex, const N: usize> {
    channel: Channel<M, ModemEvent, N>,
    dropped: AtomicU32,
}

impl<M: RawMutex, const N: usize> Notifier<M, N> {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue `event`, returning `false` if it was dropped.
    pub fn notify(&self, event: ModemEvent) -> bool {
        if self.channel.try_send(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        true
    }

    pub async fn next(&self) -> ModemEvent {
        self.channel.receive().await
    }

    pub fn try_next(&self) -> Option<ModemEvent> {
        self.channel.try_receive().ok()
    }

    /// Number of events lost to a full queue.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl<M: RawMutex, const N: usize> Default for Notifier<M, N> {
    fn default() -> Self {
        Self::new()
    }
}
