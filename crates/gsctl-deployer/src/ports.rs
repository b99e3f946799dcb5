//! Port pair allocation from a bounded range.
//!
//! A shared counter is atomically advanced by 2 per allocation and mapped
//! into `[base, max)`. Pairs are not tracked or released; after the range
//! wraps, a pair may collide with one still in use, so a bind failure on
//! the game server side is treated as retryable.

use tracing::debug;

use gsctl_state::StateStore;

use crate::error::{DeployError, DeployResult};

pub const DEFAULT_BASE_PORT: u16 = 30500;
pub const DEFAULT_MAX_PORT: u16 = 35000;
pub const PORT_COUNTER_KEY: &str = "gameserver_port_counter";

/// Game port and SourceTV port for one server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub game: u16,
    pub tv: u16,
}

#[derive(Clone)]
pub struct PortAllocator {
    state: StateStore,
    base: u16,
    max: u16,
}

impl PortAllocator {
    /// Rejects an empty range (`max <= base`).
    pub fn new(state: StateStore, base: u16, max: u16) -> DeployResult<Self> {
        if max <= base {
            return Err(DeployError::InvalidPortRange { base, max });
        }
        Ok(Self { state, base, max })
    }

    pub fn range(&self) -> (u16, u16) {
        (self.base, self.max)
    }

    /// Draw the next pair. Fails only if the counter store fails.
    pub fn allocate(&self) -> DeployResult<PortPair> {
        let value = self.state.incr_counter(PORT_COUNTER_KEY, 2)?;
        let pair = pair_for(value, self.base, self.max);
        debug!(counter = value, game = pair.game, tv = pair.tv, "ports allocated");
        Ok(pair)
    }
}

/// Map a counter value into the range. `max` must exceed `base`.
pub fn pair_for(counter: u64, base: u16, max: u16) -> PortPair {
    let range = u64::from(max - base);
    let offset = (counter % range) as u16;
    let game = base + offset;
    let tv = if game + 1 >= max { base } else { game + 1 };
    PortPair { game, tv }
}
