//! Bus transport: per-category queues, the outbound service routine and
//! inbound decoding.
//!
//! ```text
//!  Device ──submit──▶ [Binary][Dimmer][Color][Curtain][Thermostat]
//!                                   │ service_tick (one frame, link idle)
//!                                   ▼
//!                                BusLink
//!
//!  RxMailbox ──frame──▶ on_frame_received ──BusEvent──▶ dispatch ──▶ handlers
//! ```

use log::{debug, warn};

use super::address::AddressingMode;
use super::command::{Command, CommandCategory};
use super::frame::{BusEvent, decode_event, encode_command};
use super::queue::CommandQueue;
use crate::app::ports::BusLink;

/// Where device modules put outbound commands.
pub trait CommandSink {
    /// The system-wide wire protocol.
    fn addressing(&self) -> AddressingMode;

    /// Queue `cmd`.  `false` means it was dropped.
    fn submit(&mut self, cmd: Command) -> bool;

    /// Commands `category` can still accept.
    fn room(&self, category: CommandCategory) -> usize;

    /// Record a command for `category` refused before it reached the queue.
    fn count_drop(&mut self, category: CommandCategory);
}

/// A module that reacts to bus feedback.
pub trait BusEventHandler {
    /// Handle `event` if the source address belongs to this module.
    /// Returns `true` when claimed; unrelated events return `false` at once.
    /// Follow-up commands go to `sink`.
    fn on_bus_event(
        &mut self,
        event: &BusEvent,
        now_ms: u64,
        sink: &mut dyn CommandSink,
    ) -> bool;
}

/// Counters for the diagnostics page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BusStats {
    pub sent: u32,
    pub link_errors: u32,
    pub decode_errors: u32,
    pub dropped: [u32; CommandCategory::COUNT],
}

pub struct BusTransport {
    mode: AddressingMode,
    queues: [CommandQueue; CommandCategory::COUNT],
    stats: BusStats,
    reported_drops: [u32; CommandCategory::COUNT],
}

impl BusTransport {
    pub fn new(mode: AddressingMode) -> Self {
        Self {
            mode,
            queues: core::array::from_fn(|_| CommandQueue::new()),
            stats: BusStats::default(),
            reported_drops: [0; CommandCategory::COUNT],
        }
    }

    pub fn mode(&self) -> AddressingMode {
        self.mode
    }

    /// Switch protocol.  Pending commands carry old-format addresses and are
    /// discarded.
    pub fn set_addressing(&mut self, mode: AddressingMode) {
        if mode == self.mode {
            return;
        }
        let pending: usize = self.queues.iter().map(CommandQueue::len).sum();
        for q in &mut self.queues {
            q.clear();
        }
        warn!(
            "bus addressing {:?} -> {:?}, {pending} pending commands discarded",
            self.mode, mode
        );
        self.mode = mode;
    }

    /// Build and queue a raw command.  Oversized payloads and full queues
    /// both return `false`.
    pub fn enqueue(&mut self, category: CommandCategory, data: &[u8]) -> bool {
        match Command::new(category, data) {
            Ok(cmd) => self.submit(cmd),
            Err(e) => {
                warn!("{category:?} command rejected: {e}");
                let slot = &mut self.stats.dropped[category.index()];
                *slot = slot.saturating_add(1);
                false
            }
        }
    }

    /// Transmit at most one queued command, in fixed category order, if the
    /// link is idle.  Returns the category that was sent.
    ///
    /// A command the link refuses is dropped, not re-queued.
    pub fn service_tick<L: BusLink>(&mut self, link: &mut L) -> Option<CommandCategory> {
        if !link.is_idle() {
            return None;
        }
        let category = CommandCategory::ALL
            .into_iter()
            .find(|c| !self.queues[c.index()].is_empty())?;
        let cmd = self.queues[category.index()].dequeue()?;

        let Some(frame) = encode_command(&cmd) else {
            warn!("{category:?} command could not be framed, dropped");
            self.stats.dropped[category.index()] += 1;
            return None;
        };
        match link.transmit(&frame) {
            Ok(()) => {
                self.stats.sent = self.stats.sent.wrapping_add(1);
                Some(category)
            }
            Err(e) => {
                warn!("bus transmit failed ({e:?}), {category:?} command dropped");
                self.stats.link_errors = self.stats.link_errors.saturating_add(1);
                None
            }
        }
    }

    /// Decode a raw inbound frame under the active protocol.
    pub fn on_frame_received(&mut self, frame: &[u8]) -> Option<BusEvent> {
        match decode_event(frame, self.mode) {
            Ok(ev) => Some(ev),
            Err(e) => {
                debug!("inbound frame rejected: {e}");
                self.stats.decode_errors = self.stats.decode_errors.saturating_add(1);
                None
            }
        }
    }

    pub fn queue(&self, category: CommandCategory) -> &CommandQueue {
        &self.queues[category.index()]
    }

    pub fn pending(&self) -> usize {
        self.queues.iter().map(CommandQueue::len).sum()
    }

    pub fn stats(&self) -> BusStats {
        let mut stats = self.stats;
        for c in CommandCategory::ALL {
            stats.dropped[c.index()] += self.queues[c.index()].dropped();
        }
        stats
    }

    /// Report drops that happened since the previous call.
    pub fn drain_drops(&mut self, mut report: impl FnMut(CommandCategory, u32)) {
        let totals = self.stats().dropped;
        for c in CommandCategory::ALL {
            let i = c.index();
            let fresh = totals[i].wrapping_sub(self.reported_drops[i]);
            if fresh > 0 {
                report(c, fresh);
                self.reported_drops[i] = totals[i];
            }
        }
    }
}

impl CommandSink for BusTransport {
    fn addressing(&self) -> AddressingMode {
        self.mode
    }

    fn submit(&mut self, cmd: Command) -> bool {
        let category = cmd.category;
        self.queues[category.index()].enqueue(cmd)
    }

    fn room(&self, category: CommandCategory) -> usize {
        let q = &self.queues[category.index()];
        q.capacity() - q.len()
    }

    fn count_drop(&mut self, category: CommandCategory) {
        self.queues[category.index()].record_drop();
    }
}

/// Offer `event` to every handler.  Returns how many claimed it.
pub fn dispatch(
    event: &BusEvent,
    now_ms: u64,
    sink: &mut dyn CommandSink,
    handlers: &mut [&mut dyn BusEventHandler],
) -> usize {
    let mut claimed = 0;
    for handler in handlers.iter_mut() {
        if handler.on_bus_event(event, now_ms, sink) {
            claimed += 1;
        }
    }
    if claimed == 0 {
        debug!(
            "event 0x{:02x} from {} unclaimed",
            event.kind.code(),
            event.source
        );
    }
    claimed
}
