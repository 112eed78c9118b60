//! Cycle-accurate Z80 emulator with SMC tracking (spec §4.7).
//!
//! [`Cpu`] composes a [`Registers`] file, a flat 64 KiB [`Memory`], an
//! [`SmcTracker`] that watches writes into caller-marked regions, and a
//! [`Hooks`] implementation supplying platform behavior (character I/O,
//! CP/M BDOS dispatch) the emulator core has no opinion about.

mod cpu;
mod error;
mod flags;
mod hooks;
mod io;
mod memory;
mod registers;
mod smc;

pub use cpu::{Cpu, ExitReason};
pub use error::{EmulatorFault, EmulatorResult};
pub use flags::Flags;
pub use hooks::{Hooks, NullHooks, RST_VECTORS};
pub use memory::Memory;
pub use registers::{InterruptMode, Registers};
pub use smc::{SmcEvent, SmcTracker};
