//! MSM8976 board glue for the rdrive driver registry.

#![no_std]

extern crate alloc;

mod clk;
mod qos;

pub use clk::BusyWait;
pub use qos::{CpuLatencyQos, cpu_latency_ceiling, take_idle_recheck};
