//! Per-CPU wakeup latency ceilings consulted by the idle path.

use core::sync::atomic::{AtomicU32, Ordering};

use bsp_msm8976::{CpuMask, PmQos};
use log::trace;
use spin::Mutex;

const MAX_CPUS: usize = 8;

static CEILINGS: Mutex<[Option<u32>; MAX_CPUS]> = Mutex::new([None; MAX_CPUS]);
/// CPUs that must re-read their ceiling before staying in idle.
static RECHECK: AtomicU32 = AtomicU32::new(0);

/// Deepest idle exit latency `cpu` may currently take, `None` when
/// unconstrained.
pub fn cpu_latency_ceiling(cpu: usize) -> Option<u32> {
    CEILINGS.lock().get(cpu).copied().flatten()
}

/// Consumes the re-evaluation flag of `cpu`. The idle loop calls this after
/// each wakeup and re-selects its idle state when it returns `true`.
pub fn take_idle_recheck(cpu: usize) -> bool {
    if cpu >= MAX_CPUS {
        return false;
    }
    let bit = 1 << cpu;
    RECHECK.fetch_and(!bit, Ordering::AcqRel) & bit != 0
}

/// [`PmQos`] backed by the global ceiling table.
#[derive(Default)]
pub struct CpuLatencyQos;

impl PmQos for CpuLatencyQos {
    fn add_request(&mut self, cpus: CpuMask, latency_us: u32) {
        let mut ceilings = CEILINGS.lock();
        for cpu in cpus.iter() {
            if let Some(slot) = ceilings.get_mut(cpu as usize) {
                *slot = Some(slot.map_or(latency_us, |cur| cur.min(latency_us)));
            }
        }
        trace!("latency ceiling {}us on {:#x}", latency_us, cpus.bits());
    }

    fn remove_request(&mut self, cpus: CpuMask) {
        let mut ceilings = CEILINGS.lock();
        for cpu in cpus.iter() {
            if let Some(slot) = ceilings.get_mut(cpu as usize) {
                *slot = None;
            }
        }
    }

    /// Flags the lowest CPU of `cpus` for idle re-evaluation. There is no
    /// cross-CPU kick here; the flag is picked up on that CPU's next wakeup.
    fn wake_any(&mut self, cpus: CpuMask) {
        if let Some(cpu) = cpus.iter().find(|&cpu| (cpu as usize) < MAX_CPUS) {
            RECHECK.fetch_or(1 << cpu, Ordering::AcqRel);
            trace!("idle recheck on cpu{}", cpu);
        }
    }
}
