use alloc::{format, vec::Vec};
use core::time::Duration;

use axklib::{mem::iomap, time::busy_wait};
use bsp_msm8976::early::{
    APCS_ALIAS1_CMD_RCGR, APCS_ALIAS1_CORE_CBCR, APCS_ALIAS1_SIZE, a72_early_init,
};
use bsp_msm8976::{
    CpuClockController, DOMAIN_COUNT, Delay, DomainRegs, MAX_REGISTER, MSM8976, MmioRegmap,
};
use log::{debug, info, warn};
use rdrive::{PlatformDevice, module_driver, probe::OnProbeError, register::FdtInfo};

use crate::qos::CpuLatencyQos;

/// Size of each mux and PLL register window.
const WINDOW_SIZE: usize = 0x1000;

/// Order of the `reg` entries: the three muxes, then the three PLLs.
const REG_NAMES: [&str; 2 * DOMAIN_COUNT] = ["c0-mux", "c1-mux", "cci-mux", "c0-pll", "c1-pll", "cci-pll"];

pub struct BusyWait;

impl Delay for BusyWait {
    fn udelay(&self, us: u64) {
        busy_wait(Duration::from_micros(us));
    }
}

module_driver!(
    name: "MSM8976 CPU Clock",
    level: ProbeLevel::PostKernel,
    priority: ProbePriority::CLK,
    probe_kinds: &[
        ProbeKind::Fdt {
            compatibles: &["qcom,cpu-msm8976"],
            on_probe: probe_cpu_clk
        }
    ],
);

fn map_window(
    name: &str,
    addr: usize,
    size: usize,
    max_register: u32,
) -> Result<MmioRegmap, OnProbeError> {
    let base = iomap(addr.into(), size)
        .map_err(|e| OnProbeError::other(format!("[{}] iomap {:#x} failed: {:?}", name, addr, e)))?;
    debug!("{}: addr={:#x} -> {:p}", name, addr, base.as_ptr());
    // SAFETY: `iomap` mapped `size` bytes of device memory, which covers
    // every register up to `max_register`.
    Ok(unsafe { MmioRegmap::new(base, max_register) })
}

fn probe_cpu_clk(info: FdtInfo<'_>, plat_dev: PlatformDevice) -> Result<(), OnProbeError> {
    info!("Probing MSM8976 CPU clock...");

    let regs: Vec<_> = info
        .node
        .reg()
        .ok_or(OnProbeError::other(format!(
            "[{}] has no reg",
            info.node.name()
        )))?
        .collect();
    if regs.len() < DOMAIN_COUNT {
        return Err(OnProbeError::other(format!(
            "[{}] needs {} mux windows, found {}",
            info.node.name(),
            DOMAIN_COUNT,
            regs.len()
        )));
    }

    let mut windows = Vec::with_capacity(REG_NAMES.len());
    for (name, reg) in REG_NAMES.iter().zip(regs.iter()) {
        let size = reg.size.unwrap_or(WINDOW_SIZE);
        windows.push(map_window(name, reg.address as usize, size, MAX_REGISTER)?);
    }
    if windows.len() < REG_NAMES.len() {
        warn!("cluster PLL windows missing, muxes will stay on GPLL0");
    }

    let mut alias = map_window(
        "a72-alias",
        APCS_ALIAS1_CMD_RCGR,
        APCS_ALIAS1_SIZE,
        APCS_ALIAS1_CORE_CBCR,
    )?;
    a72_early_init(&mut alias, MSM8976.domains[1].mux, &BusyWait, &MSM8976.poll)
        .map_err(|e| OnProbeError::other(format!("A72 RCG configuration didn't update: {}", e)))?;

    let mut plls = windows.split_off(DOMAIN_COUNT).into_iter();
    let mut muxes = windows.into_iter();
    let domain_regs = [0; DOMAIN_COUNT].map(|_| {
        muxes.next().map(|mux| DomainRegs {
            mux,
            pll: plls.next(),
        })
    });
    let [Some(a53), Some(a72), Some(cci)] = domain_regs else {
        return Err(OnProbeError::other(format!(
            "[{}] mux windows incomplete",
            info.node.name()
        )));
    };

    let mut ctl = CpuClockController::new(&MSM8976, [a53, a72, cci], BusyWait, CpuLatencyQos);
    ctl.bring_up()
        .map_err(|e| OnProbeError::other(format!("CPU clock bring-up failed: {}", e)))?;
    ctl.dump_rates();

    plat_dev.register(rdif_clk::Clk::new(ctl));
    info!("MSM8976 CPU clock registered");
    Ok(())
}
