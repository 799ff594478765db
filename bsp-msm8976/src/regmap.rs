//! Register access and busy-wait primitives.
//!
//! Every register sequence in this crate runs under the caller's lock and may
//! run where sleeping is not allowed, so waiting is always a bounded spin over
//! an injected [`Delay`].

use core::ptr::NonNull;

use crate::error::ClkError;

/// 32-bit register file with a 4-byte stride.
pub trait Regmap {
    fn read(&self, reg: u32) -> Result<u32, ClkError>;

    fn write(&mut self, reg: u32, val: u32) -> Result<(), ClkError>;

    /// Read-modify-write of the bits in `mask`. Skips the write when nothing
    /// changes.
    fn update_bits(&mut self, reg: u32, mask: u32, val: u32) -> Result<(), ClkError> {
        let old = self.read(reg)?;
        let new = (old & !mask) | (val & mask);
        if new != old {
            self.write(reg, new)?;
        }
        Ok(())
    }
}

impl<R: Regmap + ?Sized> Regmap for &mut R {
    fn read(&self, reg: u32) -> Result<u32, ClkError> {
        (**self).read(reg)
    }

    fn write(&mut self, reg: u32, val: u32) -> Result<(), ClkError> {
        (**self).write(reg, val)
    }

    fn update_bits(&mut self, reg: u32, mask: u32, val: u32) -> Result<(), ClkError> {
        (**self).update_bits(reg, mask, val)
    }
}

/// Microsecond busy-wait.
pub trait Delay {
    fn udelay(&self, us: u64);
}

/// Bounded retry budget for hardware acknowledgements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollBudget {
    pub retries: u32,
    pub delay_us: u64,
}

impl PollBudget {
    /// Reads `reg` until `done` accepts its value, spinning `delay_us` between
    /// reads. Returns `Ok(false)` once the budget is exhausted.
    pub fn poll<R, D, F>(&self, regmap: &R, delay: &D, reg: u32, done: F) -> Result<bool, ClkError>
    where
        R: Regmap + ?Sized,
        D: Delay + ?Sized,
        F: Fn(u32) -> bool,
    {
        for _ in 0..self.retries {
            if done(regmap.read(reg)?) {
                return Ok(true);
            }
            delay.udelay(self.delay_us);
        }
        Ok(false)
    }
}

/// Memory-mapped register window.
pub struct MmioRegmap {
    base: NonNull<u8>,
    max_register: u32,
}

// The window is only touched through volatile accesses serialized by the
// controller owning it.
unsafe impl Send for MmioRegmap {}

impl MmioRegmap {
    /// # Safety
    ///
    /// `base` must map at least `max_register + 4` bytes of device registers
    /// for the lifetime of the returned value.
    pub unsafe fn new(base: NonNull<u8>, max_register: u32) -> Self {
        MmioRegmap { base, max_register }
    }

    fn check(&self, reg: u32) -> Result<*mut u32, ClkError> {
        if reg > self.max_register || reg % 4 != 0 {
            return Err(ClkError::Bus { reg });
        }
        // SAFETY: `reg` is aligned and within the window promised to `new`.
        Ok(unsafe { self.base.as_ptr().add(reg as usize).cast::<u32>() })
    }
}

impl Regmap for MmioRegmap {
    fn read(&self, reg: u32) -> Result<u32, ClkError> {
        let ptr = self.check(reg)?;
        // SAFETY: see `check`.
        Ok(unsafe { ptr.read_volatile() })
    }

    fn write(&mut self, reg: u32, val: u32) -> Result<(), ClkError> {
        let ptr = self.check(reg)?;
        // SAFETY: see `check`.
        unsafe { ptr.write_volatile(val) };
        Ok(())
    }
}
