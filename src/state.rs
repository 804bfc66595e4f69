//! Running / needs-provision flags for the managed VM.
//!
//! `StateFlags` is pure data. Whoever mutates it publishes a
//! [`StateTransition`] so observers (CLI status line, prompts) can react.

use std::fmt;

/// One bit per flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flag {
    Running = 1,
    NeedsProvision = 2,
}

impl Flag {
    const ALL_BITS: u8 = Flag::Running as u8 | Flag::NeedsProvision as u8;

    fn bit(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateFlags(u8);

impl StateFlags {
    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn set(&mut self, flag: Flag) {
        self.0 |= flag.bit();
    }

    pub fn clear(&mut self, flag: Flag) {
        self.0 &= !flag.bit();
    }

    /// Set or clear depending on `on`.
    pub fn assign(&mut self, flag: Flag, on: bool) {
        if on {
            self.set(flag);
        } else {
            self.clear(flag);
        }
    }

    pub fn has(self, flag: Flag) -> bool {
        self.0 & flag.bit() != 0
    }

    /// Drop any bit that does not belong to a known flag.
    pub fn normalize(&mut self) {
        self.0 &= Flag::ALL_BITS;
    }

    pub fn running(self) -> bool {
        self.has(Flag::Running)
    }

    pub fn needs_provision(self) -> bool {
        self.has(Flag::NeedsProvision)
    }
}

impl fmt::Display for StateFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.running() { "running" } else { "stopped" })?;
        if self.needs_provision() {
            f.write_str(" (needs provision)")?;
        }
        Ok(())
    }
}

/// Published after every register mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateTransition {
    pub old: StateFlags,
    pub new: StateFlags,
}

impl StateTransition {
    pub fn changed(&self) -> bool {
        self.old != self.new
    }
}
