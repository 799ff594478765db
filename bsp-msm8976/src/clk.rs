//! The CPU clock controller: three mux domains, their cluster PLLs and the
//! clock-provider surface.

use log::{debug, error, info, warn};
use rdif_clk::{ClockId, Interface};
use rdrive::{DriverGeneric, KError};

use crate::config::{CpuccConfig, DOMAIN_COUNT};
use crate::domain::{ClockDomain, Parent, RateChangeEvent, SwitchCtx};
use crate::error::ClkError;
use crate::ids::{CpuClock, DomainId};
use crate::policy::{AuxRates, RateRequest};
use crate::qos::PmQos;
use crate::regmap::{Delay, PollBudget, Regmap};

/// Register windows of one domain.
pub struct DomainRegs<R> {
    pub mux: R,
    /// `None` when the cluster PLL is not available yet.
    pub pll: Option<R>,
}

enum PllChange {
    Done,
    Aborted,
}

pub struct CpuClockController<R, D, Q> {
    domains: [ClockDomain<R>; DOMAIN_COUNT],
    xo_rate: u64,
    aux: AuxRates,
    poll: PollBudget,
    qos_latency_us: u32,
    delay: D,
    qos: Q,
}

impl<R, D, Q> CpuClockController<R, D, Q>
where
    R: Regmap,
    D: Delay,
    Q: PmQos,
{
    pub fn new(config: &CpuccConfig, regs: [DomainRegs<R>; DOMAIN_COUNT], delay: D, qos: Q) -> Self {
        let mut index = 0;
        let domains = regs.map(|regs| {
            let domain = ClockDomain::new(config.domains[index], regs.mux, regs.pll, config.xo_rate);
            index += 1;
            domain
        });
        CpuClockController {
            domains,
            xo_rate: config.xo_rate,
            aux: config.aux,
            poll: config.poll,
            qos_latency_us: config.qos_latency_us,
            delay,
            qos,
        }
    }

    pub fn domain(&self, id: DomainId) -> &ClockDomain<R> {
        &self.domains[id.index()]
    }

    pub fn domain_mut(&mut self, id: DomainId) -> &mut ClockDomain<R> {
        &mut self.domains[id.index()]
    }

    pub fn aux_rates(&self) -> &AuxRates {
        &self.aux
    }

    fn split(&mut self, id: DomainId) -> (&mut ClockDomain<R>, SwitchCtx<'_, D, Q>) {
        (
            &mut self.domains[id.index()],
            SwitchCtx {
                delay: &self.delay,
                qos: &mut self.qos,
                poll: self.poll,
                latency_us: self.qos_latency_us,
            },
        )
    }

    pub fn determine_rate(&mut self, id: DomainId, rate: u64) -> Result<RateRequest, ClkError> {
        let (xo_rate, aux) = (self.xo_rate, self.aux);
        self.domain_mut(id).determine_rate(xo_rate, &aux, rate)
    }

    /// Moves a mux to `rate`, reprogramming its cluster PLL when the decision
    /// needs a different PLL rate. Returns the rate read back afterwards.
    ///
    /// A failed PLL reprogram leaves the mux parked on its safe source and is
    /// not reported as an error.
    pub fn set_rate(&mut self, id: DomainId, rate: u64) -> Result<u64, ClkError> {
        let req = self.determine_rate(id, rate)?;

        if req.parent.is_cluster_pll() {
            if let PllChange::Aborted = self.prepare_pll(id, req.parent_rate, true)? {
                return Ok(self.recalc_rate(id));
            }
        }

        let (domain, mut ctx) = self.split(id);
        if domain.current_parent() == Some(req.parent) {
            domain.set_rate(&mut ctx)?;
        } else {
            let index = domain
                .config()
                .parents
                .index_of(req.parent)
                .ok_or(ClkError::MissingParent(req.parent))?;
            domain.set_rate_and_parent(index, &mut ctx)?;
        }

        if !req.parent.is_cluster_pll() {
            self.domain_mut(id).release_pll()?;
        }
        Ok(self.recalc_rate(id))
    }

    /// Brings the cluster PLL of `id` to `rate`, and running when `power_on`
    /// is set. Otherwise the PLL keeps its enable state. The mux is parked
    /// around the reprogram.
    fn prepare_pll(&mut self, id: DomainId, rate: u64, power_on: bool) -> Result<PllChange, ClkError> {
        let poll = self.poll;
        let domain = &mut self.domains[id.index()];
        let delay = &self.delay;
        let name = domain.name();
        let Some(pll) = domain.pll_mut() else {
            return Err(ClkError::MissingParent(Parent::ClusterPllMain));
        };

        if pll.recalc_rate()? == rate {
            if power_on && !pll.is_enabled()? {
                pll.enable(delay, &poll)?;
            }
            return Ok(PllChange::Done);
        }

        domain.on_pll_rate_change(RateChangeEvent::PreRateChange, delay, &poll)?;

        let Some(pll) = domain.pll_mut() else {
            return Err(ClkError::MissingParent(Parent::ClusterPllMain));
        };
        let programmed = pll.set_rate(rate, delay, &poll).and_then(|()| {
            if !power_on || pll.is_enabled()? {
                Ok(())
            } else {
                pll.enable(delay, &poll)
            }
        });

        match programmed {
            Ok(()) => {
                domain.on_pll_rate_change(RateChangeEvent::PostRateChange, delay, &poll)?;
                Ok(PllChange::Done)
            }
            Err(e) => {
                error!("{}: PLL reprogram to {} Hz failed: {}", name, rate, e);
                domain.on_pll_rate_change(RateChangeEvent::AbortRateChange, delay, &poll)?;
                Ok(PllChange::Aborted)
            }
        }
    }

    /// Direct rate change of a cluster PLL. The mux returns to the selection
    /// it had before it was parked, and a stopped PLL stays stopped.
    pub fn set_pll_rate(&mut self, id: DomainId, rate: u64) -> Result<u64, ClkError> {
        let target = match self.domain(id).pll() {
            Some(pll) => pll.config().determine_rate(self.xo_rate, rate),
            None => return Err(ClkError::MissingParent(Parent::ClusterPllMain)),
        };

        if let PllChange::Done = self.prepare_pll(id, target, false)? {
            let (domain, mut ctx) = self.split(id);
            domain.restore(&mut ctx)?;
        }

        match self.domain(id).pll() {
            Some(pll) => pll.recalc_rate(),
            None => Ok(0),
        }
    }

    pub fn recalc_rate(&self, id: DomainId) -> u64 {
        self.domain(id).recalc_rate(&self.aux)
    }

    pub fn get_parent(&self, id: DomainId) -> usize {
        self.domain(id).get_parent()
    }

    pub fn enable(&mut self, id: DomainId) -> Result<(), ClkError> {
        let poll = self.poll;
        self.domains[id.index()].enable(&self.delay, &poll)
    }

    pub fn disable(&mut self, id: DomainId) -> Result<(), ClkError> {
        let poll = self.poll;
        self.domains[id.index()].disable(&self.delay, &poll)
    }

    /// Rate of any provider clock.
    pub fn clock_rate(&self, clock: CpuClock) -> Result<u64, ClkError> {
        let Some(id) = clock.domain() else {
            return Ok(match clock {
                CpuClock::SysApcsauxClk2 => self.aux.gpll4,
                _ => self.aux.gpll0,
            });
        };
        if clock.is_mux() {
            return Ok(self.recalc_rate(id));
        }
        match self.domain(id).pll() {
            Some(pll) => pll.recalc_rate(),
            None => Err(ClkError::UnsupportedClock(clock.id())),
        }
    }

    /// Rate change through the provider: muxes and cluster PLLs only.
    pub fn set_clock_rate(&mut self, clock: CpuClock, rate: u64) -> Result<u64, ClkError> {
        info!("{}: set rate {} Hz", clock.name(), rate);
        match clock.domain() {
            Some(id) if clock.is_mux() => self.set_rate(id, rate),
            Some(id) => self.set_pll_rate(id, rate),
            None => Err(ClkError::UnsupportedClock(clock.id())),
        }
    }

    /// Probe-time sequence: every mux ends up enabled at a known rate and only
    /// the PLLs a mux sources from keep running.
    ///
    /// A failing domain is logged and skipped so the others still come up;
    /// the first failure is returned at the end.
    pub fn bring_up(&mut self) -> Result<(), ClkError> {
        let poll = self.poll;
        let mut first_err = None;
        let mut note = |name: &str, what: &str, e: ClkError| {
            error!("{}: {}: {}", name, what, e);
            first_err.get_or_insert(e);
        };

        for domain in self.domains.iter_mut() {
            domain.set_pll_proxy(true);
            let name = domain.name();
            if let Some(pll) = domain.pll_mut() {
                if let Err(e) = pll.enable(&self.delay, &poll) {
                    note(name, "Can't enable PLL", e);
                }
            }
        }

        for id in DomainId::ALL {
            if self.recalc_rate(id) == 0 {
                let name = self.domain(id).name();
                let safe_freq = self.domain(id).config().safe_freq;
                warn!("{}: unknown boot rate, reconfiguring to {} Hz", name, safe_freq);
                if let Err(e) = self.set_rate(id, safe_freq) {
                    note(name, "Can't set safe rate", e);
                }
            }
        }

        for id in DomainId::ALL {
            if let Err(e) = self.enable(id) {
                note(self.domain(id).name(), "Unable to turn on CPU clock", e);
            }
        }

        for domain in self.domains.iter_mut() {
            domain.set_pll_proxy(false);
            if let Err(e) = domain.release_pll() {
                note(domain.name(), "Can't release PLL", e);
            }
        }

        for id in DomainId::ALL {
            debug!("{}: {} Hz after bring-up", self.domain(id).name(), self.recalc_rate(id));
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Logs the rate of every mux, 0 for the disabled ones.
    pub fn dump_rates(&self) {
        for domain in self.domains.iter() {
            let rate = if domain.is_enabled() {
                domain.recalc_rate(&self.aux)
            } else {
                0
            };
            info!("{} frequency: {:>10} Hz", domain.name(), rate);
        }
    }
}

impl<R, D, Q> DriverGeneric for CpuClockController<R, D, Q>
where
    R: Regmap + Send + 'static,
    D: Delay + Send + 'static,
    Q: PmQos + Send + 'static,
{
    fn open(&mut self) -> Result<(), KError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), KError> {
        Ok(())
    }
}

impl<R, D, Q> Interface for CpuClockController<R, D, Q>
where
    R: Regmap + Send + 'static,
    D: Delay + Send + 'static,
    Q: PmQos + Send + 'static,
{
    fn perper_enable(&mut self) {
        debug!("perper_enable");
    }

    fn get_rate(&self, id: ClockId) -> Result<u64, KError> {
        let id: usize = id.into();
        let clock = provider_clock(id)?;
        Ok(self.clock_rate(clock)?)
    }

    fn set_rate(&mut self, id: ClockId, rate: u64) -> Result<(), KError> {
        let id: usize = id.into();
        let clock = provider_clock(id)?;
        self.set_clock_rate(clock, rate)?;
        Ok(())
    }
}

fn provider_clock(id: usize) -> Result<CpuClock, ClkError> {
    CpuClock::from_id(id).ok_or_else(|| {
        warn!("Unsupported clock ID: {}", id);
        ClkError::UnsupportedClock(id)
    })
}
