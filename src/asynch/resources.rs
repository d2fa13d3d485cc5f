use super::bringup::Trigger;
use super::dispatcher::{RequestChannel, ResponseChannel};
use super::state;

/// Memory shared between [`Control`](super::control::Control) and
/// [`Runner`](super::runner::Runner). Must outlive both.
pub struct Resources {
    pub(crate) ch: state::State,

    pub(crate) req_slot: RequestChannel,
    pub(crate) res_slot: ResponseChannel,
    pub(crate) trigger: Trigger,
}

impl Default for Resources {
    fn default() -> Self {
        Self::new()
    }
}

impl Resources {
    pub const fn new() -> Self {
        Self {
            ch: state::State::new(),

            req_slot: RequestChannel::new(),
            res_slot: ResponseChannel::new(),
            trigger: Trigger::new(),
        }
    }
}
