//! Register access seam.
//!
//! The firmware core never dereferences device addresses itself; every
//! register touch goes through [`Mmio`]. On the device this is a volatile
//! pointer read/write, in tests it is a hash map. The combinator methods
//! mirror the classic `orl`/`andl`/`xorl`/`incl` register idioms.

use crate::regs;

pub trait Mmio {
    fn get(&self, addr: u32) -> u32;
    fn set(&mut self, addr: u32, val: u32);

    fn orl(&mut self, addr: u32, val: u32) {
        self.set(addr, self.get(addr) | val);
    }

    fn andl(&mut self, addr: u32, val: u32) {
        self.set(addr, self.get(addr) & val);
    }

    fn xorl(&mut self, addr: u32, val: u32) {
        self.set(addr, self.get(addr) ^ val);
    }

    fn incl(&mut self, addr: u32) {
        self.set(addr, self.get(addr).wrapping_add(1));
    }
}

/// Ticks of the free-running clock per microsecond.
pub const TICKS_PER_USEC: u32 = 80;

/// Upper bound for busy-wait loops, so a stuck clock cannot wedge the
/// firmware inside a delay.
const SPIN_LIMIT: u32 = 1_000_000;

/// The free-running clock counter, assembled from its two half registers.
pub fn clock_counter<M: Mmio>(mmio: &M) -> u32 {
    (mmio.get(regs::TIMER_CLOCK_HIGH) << 16) | (mmio.get(regs::TIMER_CLOCK_LOW) & 0xffff)
}

/// Whether more than `msecs` milliseconds have passed since the clock read
/// `t0`. Wrap-safe.
pub fn is_after_msecs<M: Mmio>(mmio: &M, t0: u32, msecs: u32) -> bool {
    clock_counter(mmio).wrapping_sub(t0) / (TICKS_PER_USEC * 1000) > msecs
}

/// Bounded busy-wait for `msec` milliseconds.
pub fn delay<M: Mmio>(mmio: &M, msec: u32) {
    let t0 = clock_counter(mmio);
    let mut spins = 0;
    loop {
        let dt = clock_counter(mmio).wrapping_sub(t0) / TICKS_PER_USEC / 1000;
        if dt >= msec {
            break;
        }
        spins += 1;
        if spins > SPIN_LIMIT {
            warning!("delay: clock not advancing, giving up");
            break;
        }
    }
}
