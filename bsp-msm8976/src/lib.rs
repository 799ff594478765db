//! CPU clock controller of the Qualcomm MSM8976.
//!
//! The A53 cluster, A72 cluster and CCI bus are each clocked by a mux/divider
//! fed from a dedicated high-frequency PLL or from buffered GPLL0/GPLL4
//! outputs. [`CpuClockController`] picks the source for a requested rate,
//! parks the mux on a safe source while its PLL is reprogrammed, and holds a
//! CPU latency vote while a cluster mux switches.

#![cfg_attr(not(test), no_std)]

pub mod clk;
pub mod config;
pub mod domain;
pub mod early;
pub mod error;
pub mod hfpll;
pub mod ids;
pub mod mux_div;
pub mod policy;
pub mod qos;
pub mod regmap;

#[cfg(test)]
mod testutil;

pub use clk::{CpuClockController, DomainRegs};
pub use config::{CpuccConfig, DOMAIN_COUNT, MAX_REGISTER, MSM8976};
pub use error::ClkError;
pub use ids::{CpuClock, DomainId};
pub use qos::{CpuMask, PmQos};
pub use regmap::{Delay, MmioRegmap, PollBudget, Regmap};
