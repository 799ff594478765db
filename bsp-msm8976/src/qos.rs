//! CPU latency votes held around cluster mux switches.

use log::trace;

/// Set of logical CPUs, one bit per CPU.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuMask(u32);

impl CpuMask {
    pub const fn from_bits(bits: u32) -> Self {
        CpuMask(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(self, cpu: u32) -> bool {
        cpu < 32 && self.0 & (1 << cpu) != 0
    }

    pub fn iter(self) -> impl Iterator<Item = u32> {
        (0..32).filter(move |cpu| self.contains(*cpu))
    }
}

/// Latency constraint service of the power-management layer.
pub trait PmQos {
    /// Keeps `cpus` out of idle states whose exit latency exceeds
    /// `latency_us`.
    fn add_request(&mut self, cpus: CpuMask, latency_us: u32);

    /// Drops the constraint previously placed on `cpus`.
    fn remove_request(&mut self, cpus: CpuMask);

    /// Kicks one CPU of `cpus` so it re-evaluates its idle state.
    fn wake_any(&mut self, _cpus: CpuMask) {}
}

/// Latency vote scoped to one cluster. Released on drop, on success and
/// failure paths alike.
pub struct QosVote<'a, Q: PmQos + ?Sized> {
    qos: &'a mut Q,
    cpus: CpuMask,
}

impl<'a, Q: PmQos + ?Sized> QosVote<'a, Q> {
    pub fn acquire(qos: &'a mut Q, cpus: CpuMask, latency_us: u32) -> Self {
        trace!("qos vote {:#x} <= {}us", cpus.bits(), latency_us);
        qos.add_request(cpus, latency_us);
        qos.wake_any(cpus);
        QosVote { qos, cpus }
    }
}

impl<Q: PmQos + ?Sized> Drop for QosVote<'_, Q> {
    fn drop(&mut self) {
        trace!("qos release {:#x}", self.cpus.bits());
        self.qos.remove_request(self.cpus);
    }
}
