//! Static hardware descriptors of the MSM8976 CPU clock controller.
//!
//! The values come from `msm8976.toml`, turned into Rust by `build.rs`.

use crate::domain::{DomainConfig, ParentMap, RatePolicy};
use crate::hfpll::HfpllConfig;
use crate::mux_div::{MuxDivLayout, MuxSel};
use crate::policy::AuxRates;
use crate::qos::CpuMask;
use crate::regmap::PollBudget;

/// A53 cluster, A72 cluster, CCI bus.
pub const DOMAIN_COUNT: usize = 3;

/// Highest register offset of a mux or PLL window.
pub const MAX_REGISTER: u32 = 0x34;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuccConfig {
    pub xo_rate: u64,
    pub qos_latency_us: u32,
    pub poll: PollBudget,
    pub aux: AuxRates,
    pub domains: [DomainConfig; DOMAIN_COUNT],
}

include!(concat!(env!("OUT_DIR"), "/msm8976_config.rs"));
