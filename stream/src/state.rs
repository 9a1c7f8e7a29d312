use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [Channel](crate::channel::Channel).
///
/// ```text
/// Created -> Initialized -> Active <-> Inactive
///    \            \           \          \
///     +------------+-----------+----------+--> Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ChannelState {
    /// Constructed, nothing allocated
    Created = 0,
    /// Transport resource exists, no health check passed yet
    Initialized = 1,
    /// Passed a health check, may carry requests
    Active = 2,
    /// Failed a health check or hit a transport error
    Inactive = 3,
    /// Terminal
    Closed = 4,
}

impl ChannelState {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Created,
            1 => Self::Initialized,
            2 => Self::Active,
            3 => Self::Inactive,
            _ => Self::Closed,
        }
    }

    pub fn can_transition_to(self, to: Self) -> bool {
        use ChannelState::*;
        match (self, to) {
            (Closed, _) => false,
            (_, Closed) => true,
            (Created, Initialized) | (Initialized, Active) => true,
            (Active, Inactive) | (Inactive, Active) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Atomic holder of a [ChannelState], only legal transitions are applied.
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(ChannelState::Created as u8))
    }

    #[inline]
    pub fn get(&self) -> ChannelState {
        ChannelState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move to `to`, returning the previous state.
    ///
    /// On an illegal edge the current state is returned as the error.
    pub fn transition(&self, to: ChannelState) -> Result<ChannelState, ChannelState> {
        let mut cur = self.0.load(Ordering::Acquire);
        loop {
            let from = ChannelState::from_u8(cur);
            if !from.can_transition_to(to) {
                return Err(from);
            }
            match self.0.compare_exchange_weak(cur, to as u8, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return Ok(from),
                Err(actual) => cur = actual,
            }
        }
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StateCell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self.get())
    }
}
