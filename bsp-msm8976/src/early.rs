//! Early A72 RCG setup, run before the controller probes.

use log::info;

use crate::error::ClkError;
use crate::mux_div::{MuxDiv, MuxDivLayout, MuxSel};
use crate::regmap::{Delay, PollBudget, Regmap};

/// Physical address of the A72 RCG alias window.
pub const APCS_ALIAS1_CMD_RCGR: usize = 0x0b01_1050;
/// Size of the alias window.
pub const APCS_ALIAS1_SIZE: usize = 0xc;
pub const APCS_ALIAS1_CORE_CBCR: u32 = 0x8;
const CBCR_BRANCH_EN: u32 = 1 << 0;

/// GPLL0 at its full rate.
const EARLY_SEL: MuxSel = MuxSel { src: 4, div: 1 };

/// Points the A72 cluster at GPLL0 and ungates its core branch.
///
/// `regs` is the alias window at [`APCS_ALIAS1_CMD_RCGR`]. `layout` is the
/// A72 mux layout; its register offset is ignored.
pub fn a72_early_init<R, D>(
    regs: &mut R,
    layout: MuxDivLayout,
    delay: &D,
    budget: &PollBudget,
) -> Result<(), ClkError>
where
    R: Regmap,
    D: Delay + ?Sized,
{
    let layout = MuxDivLayout {
        reg_offset: 0,
        ..layout
    };
    let mut rcg = MuxDiv::new("a72-alias", layout, &mut *regs);
    rcg.set_src_div(EARLY_SEL, delay, budget)?;

    regs.update_bits(APCS_ALIAS1_CORE_CBCR, CBCR_BRANCH_EN, CBCR_BRANCH_EN)?;
    info!("A72 Power clocks configured");
    Ok(())
}
