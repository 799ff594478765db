//! APCS mux/half-integer-divider (RCG) register protocol.
//!
//! A configuration write lands in the CFG shadow and only takes effect once
//! the update bit in CMD is set; hardware clears the bit when the new source
//! and divider are latched.

use log::{error, trace};

use crate::error::ClkError;
use crate::regmap::{Delay, PollBudget, Regmap};

pub const CMD_RCGR: u32 = 0x0;
pub const CFG_RCGR: u32 = 0x4;
pub const CMD_RCGR_UPDATE: u32 = 1 << 0;
pub const CMD_RCGR_DIRTY_CFG: u32 = 1 << 4;

/// Field placement of one mux/divider block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxDivLayout {
    pub reg_offset: u32,
    pub hid_width: u32,
    pub hid_shift: u32,
    pub src_width: u32,
    pub src_shift: u32,
}

impl MuxDivLayout {
    /// Largest encodable half-divider field.
    pub const fn hid_max(&self) -> u32 {
        (1 << self.hid_width) - 1
    }

    pub const fn src_max(&self) -> u32 {
        (1 << self.src_width) - 1
    }

    fn cmd(&self) -> u32 {
        CMD_RCGR + self.reg_offset
    }

    fn cfg(&self) -> u32 {
        CFG_RCGR + self.reg_offset
    }

    fn mask(&self) -> u32 {
        (self.hid_max() << self.hid_shift) | (self.src_max() << self.src_shift)
    }

    fn encode(&self, sel: MuxSel) -> u32 {
        ((sel.div & self.hid_max()) << self.hid_shift) | ((sel.src & self.src_max()) << self.src_shift)
    }

    fn decode(&self, cfg: u32) -> MuxSel {
        MuxSel {
            src: (cfg >> self.src_shift) & self.src_max(),
            div: (cfg >> self.hid_shift) & self.hid_max(),
        }
    }
}

/// Source code and raw half-divider field as programmed into CFG.
///
/// The field holds `2 * divisor - 1`, so `div = 1` passes the parent
/// through and `div = 3` halves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxSel {
    pub src: u32,
    pub div: u32,
}

/// Rate produced by a half-divider field. A zero field bypasses the divider.
pub const fn hid_rate(parent_rate: u64, div: u32) -> u64 {
    if div == 0 {
        parent_rate
    } else {
        parent_rate * 2 / (div as u64 + 1)
    }
}

/// Smallest half-divider field whose output does not exceed `rate`, clamped
/// to what the field can hold.
pub fn hid_for_rate(parent_rate: u64, rate: u64, hid_max: u32) -> u32 {
    let div = (2 * parent_rate).div_ceil(rate).saturating_sub(1);
    div.min(hid_max as u64) as u32
}

/// One mux/divider block behind a register map.
pub struct MuxDiv<R> {
    name: &'static str,
    layout: MuxDivLayout,
    regmap: R,
}

impl<R: Regmap> MuxDiv<R> {
    pub fn new(name: &'static str, layout: MuxDivLayout, regmap: R) -> Self {
        MuxDiv {
            name,
            layout,
            regmap,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn layout(&self) -> &MuxDivLayout {
        &self.layout
    }

    /// Programs `sel`, latches it and waits for the hardware to acknowledge.
    pub fn set_src_div<D: Delay + ?Sized>(
        &mut self,
        sel: MuxSel,
        delay: &D,
        budget: &PollBudget,
    ) -> Result<(), ClkError> {
        trace!("{}: src {} div {}", self.name, sel.src, sel.div);
        let layout = self.layout;

        self.regmap
            .update_bits(layout.cfg(), layout.mask(), layout.encode(sel))?;
        self.regmap
            .update_bits(layout.cmd(), CMD_RCGR_UPDATE, CMD_RCGR_UPDATE)?;

        if budget.poll(&self.regmap, delay, layout.cmd(), |v| v & CMD_RCGR_UPDATE == 0)? {
            return Ok(());
        }

        error!("{}: RCG did not update its configuration", self.name);
        Err(ClkError::UpdateTimeout { name: self.name })
    }

    /// Reads back the latched source and divider.
    pub fn get_src_div(&self) -> Result<MuxSel, ClkError> {
        let cmd = self.regmap.read(self.layout.cmd())?;
        if cmd & CMD_RCGR_DIRTY_CFG != 0 {
            error!("{}: RCG configuration is pending", self.name);
            return Err(ClkError::ConfigPending { name: self.name });
        }

        let cfg = self.regmap.read(self.layout.cfg())?;
        Ok(self.layout.decode(cfg))
    }
}
