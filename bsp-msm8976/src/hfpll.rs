//! Cluster high-frequency PLLs (A53 SR, A72 HF, CCI SR).

use log::{debug, error};

use crate::error::ClkError;
use crate::regmap::{Delay, PollBudget, Regmap};

pub const MODE_REG: u32 = 0x0;
pub const L_REG: u32 = 0x4;
pub const M_REG: u32 = 0x8;
pub const N_REG: u32 = 0xc;
pub const USER_REG: u32 = 0x10;
pub const CONFIG_REG: u32 = 0x14;
pub const STATUS_REG: u32 = 0x1c;
pub const LOCK_BIT: u32 = 16;

pub const PLL_OUTCTRL: u32 = 1 << 0;
pub const PLL_BYPASSNL: u32 = 1 << 1;
pub const PLL_RESET_N: u32 = 1 << 2;

/// Bypass release to reset de-assert settle time.
const BYPASS_SETTLE_US: u64 = 10;

/// Static description of one PLL instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HfpllConfig {
    pub name: &'static str,
    pub config_val: u32,
    pub user_vco_mask: u32,
    pub pre_div_mask: u32,
    pub pre_div_masked: u32,
    pub post_div_mask: u32,
    pub post_div_masked: u32,
    pub early_output_mask: u32,
    pub main_output_mask: u32,
    pub min_rate: u64,
    pub max_rate: u64,
    /// Upper bound of the low VCO band, 0 when the PLL has a single band.
    pub low_vco_max_rate: u64,
    /// L value programmed at init.
    pub l_val: u32,
}

impl HfpllConfig {
    /// Closest rate the PLL can produce from `xo_rate` for a request.
    pub fn determine_rate(&self, xo_rate: u64, rate: u64) -> u64 {
        let rate = rate.clamp(self.min_rate, self.max_rate);
        (rate / xo_rate) * xo_rate
    }

    fn high_vco(&self, rate: u64) -> bool {
        rate > self.low_vco_max_rate
    }
}

pub struct Hfpll<R> {
    config: HfpllConfig,
    xo_rate: u64,
    regmap: R,
    init_done: bool,
}

impl<R: Regmap> Hfpll<R> {
    pub fn new(config: HfpllConfig, xo_rate: u64, regmap: R) -> Self {
        Hfpll {
            config,
            xo_rate,
            regmap,
            init_done: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &HfpllConfig {
        &self.config
    }

    pub fn xo_rate(&self) -> u64 {
        self.xo_rate
    }

    /// One-time integer-mode setup. Later calls do nothing.
    pub fn init(&mut self) -> Result<(), ClkError> {
        if self.init_done {
            return Ok(());
        }
        let c = self.config;

        if c.config_val != 0 {
            self.regmap.write(CONFIG_REG, c.config_val)?;
        }
        self.regmap.write(M_REG, 0)?;
        self.regmap.write(N_REG, 1)?;

        let mut user = self.regmap.read(USER_REG)?;
        user = (user & !c.pre_div_mask) | c.pre_div_masked;
        user = (user & !c.post_div_mask) | c.post_div_masked;
        user |= c.early_output_mask | c.main_output_mask;
        if c.high_vco(c.l_val as u64 * self.xo_rate) {
            user |= c.user_vco_mask;
        } else {
            user &= !c.user_vco_mask;
        }
        self.regmap.write(USER_REG, user)?;

        if c.l_val != 0 {
            self.regmap.write(L_REG, c.l_val)?;
        }

        self.init_done = true;
        debug!("{}: initialized, L {:#x}", c.name, c.l_val);
        Ok(())
    }

    pub fn is_enabled(&self) -> Result<bool, ClkError> {
        Ok(self.regmap.read(MODE_REG)? & PLL_OUTCTRL != 0)
    }

    pub fn recalc_rate(&self) -> Result<u64, ClkError> {
        Ok(self.regmap.read(L_REG)? as u64 * self.xo_rate)
    }

    /// Releases bypass and reset, waits for lock, then enables the output.
    pub fn enable<D: Delay + ?Sized>(&mut self, delay: &D, budget: &PollBudget) -> Result<(), ClkError> {
        self.init()?;

        self.regmap.update_bits(MODE_REG, PLL_BYPASSNL, PLL_BYPASSNL)?;
        delay.udelay(BYPASS_SETTLE_US);
        self.regmap.update_bits(MODE_REG, PLL_RESET_N, PLL_RESET_N)?;

        let locked = budget.poll(&self.regmap, delay, STATUS_REG, |v| v & (1 << LOCK_BIT) != 0)?;
        if !locked {
            error!("{}: PLL did not lock", self.config.name);
            return Err(ClkError::PllLockTimeout {
                name: self.config.name,
            });
        }

        self.regmap.update_bits(MODE_REG, PLL_OUTCTRL, PLL_OUTCTRL)
    }

    pub fn disable(&mut self) -> Result<(), ClkError> {
        self.regmap
            .update_bits(MODE_REG, PLL_BYPASSNL | PLL_RESET_N | PLL_OUTCTRL, 0)
    }

    /// Reprograms L (and the VCO band). A running PLL is stopped for the
    /// update and relocked afterwards.
    pub fn set_rate<D: Delay + ?Sized>(
        &mut self,
        rate: u64,
        delay: &D,
        budget: &PollBudget,
    ) -> Result<(), ClkError> {
        self.init()?;
        let l_val = (rate / self.xo_rate) as u32;
        let enabled = self.is_enabled()?;
        debug!("{}: rate {} L {:#x}", self.config.name, rate, l_val);

        if enabled {
            self.disable()?;
        }

        if self.config.user_vco_mask != 0 {
            let vco = if self.config.high_vco(rate) {
                self.config.user_vco_mask
            } else {
                0
            };
            self.regmap
                .update_bits(USER_REG, self.config.user_vco_mask, vco)?;
        }
        self.regmap.write(L_REG, l_val)?;

        if enabled {
            self.enable(delay, budget)?;
        }
        Ok(())
    }
}
