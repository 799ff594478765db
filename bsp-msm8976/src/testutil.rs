//! Recording fakes of the APCS register blocks and the QoS service.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use spin::Mutex;

use crate::error::ClkError;
use crate::hfpll::{LOCK_BIT, MODE_REG, PLL_RESET_N, STATUS_REG};
use crate::mux_div::{CMD_RCGR, CMD_RCGR_UPDATE};
use crate::qos::{CpuMask, PmQos};
use crate::regmap::{Delay, Regmap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Write {
        dev: &'static str,
        reg: u32,
        val: u32,
    },
    QosAdd {
        cpus: CpuMask,
        latency_us: u32,
    },
    QosWake {
        cpus: CpuMask,
    },
    QosRemove {
        cpus: CpuMask,
    },
}

/// Ordered log shared by every fake in one test.
#[derive(Clone, Default)]
pub struct Hw {
    log: Arc<Mutex<Vec<Event>>>,
}

impl Hw {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: Event) {
        self.log.lock().push(event);
    }

    pub fn clear_log(&self) {
        self.log.lock().clear();
    }

    pub fn events(&self) -> Vec<Event> {
        self.log.lock().clone()
    }

    pub fn writes(&self) -> Vec<(&'static str, u32, u32)> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Write { dev, reg, val } => Some((dev, reg, val)),
                _ => None,
            })
            .collect()
    }

    /// Position of the first logged write matching `pred`.
    pub fn first_write(&self, pred: impl Fn(&'static str, u32, u32) -> bool) -> Option<usize> {
        self.events().iter().position(|e| match e {
            Event::Write { dev, reg, val } => pred(dev, *reg, *val),
            _ => false,
        })
    }

    /// Position of the last logged write matching `pred`.
    pub fn last_write(&self, pred: impl Fn(&'static str, u32, u32) -> bool) -> Option<usize> {
        self.events().iter().rposition(|e| match e {
            Event::Write { dev, reg, val } => pred(dev, *reg, *val),
            _ => false,
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Plain,
    Mux,
    Pll,
}

struct Dev {
    kind: Kind,
    regs: BTreeMap<u32, u32>,
    stuck_update: bool,
    lock_fails: bool,
}

/// Register block that behaves like the hardware it stands in for: a mux
/// acknowledges its update bit immediately, a PLL reports lock once reset is
/// released.
#[derive(Clone)]
pub struct FakeRegs {
    hw: Hw,
    name: &'static str,
    dev: Arc<Mutex<Dev>>,
}

impl FakeRegs {
    fn with_kind(hw: &Hw, name: &'static str, kind: Kind) -> Self {
        FakeRegs {
            hw: hw.clone(),
            name,
            dev: Arc::new(Mutex::new(Dev {
                kind,
                regs: BTreeMap::new(),
                stuck_update: false,
                lock_fails: false,
            })),
        }
    }

    pub fn plain(hw: &Hw, name: &'static str) -> Self {
        Self::with_kind(hw, name, Kind::Plain)
    }

    pub fn mux(hw: &Hw, name: &'static str) -> Self {
        Self::with_kind(hw, name, Kind::Mux)
    }

    pub fn pll(hw: &Hw, name: &'static str) -> Self {
        Self::with_kind(hw, name, Kind::Pll)
    }

    /// Sets a register without logging or side effects.
    pub fn poke(&self, reg: u32, val: u32) {
        self.dev.lock().regs.insert(reg, val);
    }

    pub fn peek(&self, reg: u32) -> u32 {
        self.dev.lock().regs.get(&reg).copied().unwrap_or(0)
    }

    pub fn set_stuck_update(&self, stuck: bool) {
        self.dev.lock().stuck_update = stuck;
    }

    pub fn set_lock_fails(&self, fails: bool) {
        self.dev.lock().lock_fails = fails;
    }
}

impl Regmap for FakeRegs {
    fn read(&self, reg: u32) -> Result<u32, ClkError> {
        if reg % 4 != 0 {
            return Err(ClkError::Bus { reg });
        }
        let dev = self.dev.lock();
        let val = dev.regs.get(&reg).copied().unwrap_or(0);
        if dev.kind == Kind::Pll && reg == STATUS_REG {
            let mode = dev.regs.get(&MODE_REG).copied().unwrap_or(0);
            let locked = mode & PLL_RESET_N != 0 && !dev.lock_fails;
            return Ok(if locked { val | (1 << LOCK_BIT) } else { val & !(1 << LOCK_BIT) });
        }
        Ok(val)
    }

    fn write(&mut self, reg: u32, val: u32) -> Result<(), ClkError> {
        if reg % 4 != 0 {
            return Err(ClkError::Bus { reg });
        }
        self.hw.push(Event::Write {
            dev: self.name,
            reg,
            val,
        });

        let mut dev = self.dev.lock();
        let mut stored = val;
        if dev.kind == Kind::Mux && reg == CMD_RCGR && !dev.stuck_update {
            stored &= !CMD_RCGR_UPDATE;
        }
        dev.regs.insert(reg, stored);
        Ok(())
    }
}

/// Delay that only accounts for the requested time.
#[derive(Clone, Default)]
pub struct FakeDelay {
    total: Arc<AtomicU64>,
}

impl FakeDelay {
    pub fn total_us(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Delay for FakeDelay {
    fn udelay(&self, us: u64) {
        self.total.fetch_add(us, Ordering::Relaxed);
    }
}

/// QoS service logging votes into the shared event log.
#[derive(Clone)]
pub struct FakeQos {
    hw: Hw,
    active: Arc<AtomicUsize>,
}

impl FakeQos {
    pub fn new(hw: &Hw) -> Self {
        FakeQos {
            hw: hw.clone(),
            active: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Votes currently held.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }
}

impl PmQos for FakeQos {
    fn add_request(&mut self, cpus: CpuMask, latency_us: u32) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.hw.push(Event::QosAdd { cpus, latency_us });
    }

    fn remove_request(&mut self, cpus: CpuMask) {
        self.active.fetch_sub(1, Ordering::Relaxed);
        self.hw.push(Event::QosRemove { cpus });
    }

    fn wake_any(&mut self, cpus: CpuMask) {
        self.hw.push(Event::QosWake { cpus });
    }
}
