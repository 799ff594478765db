//! Per-domain mux state and the glitch-free switch protocol.
//!
//! Before the upstream cluster PLL is reprogrammed the mux is parked on its
//! safe GPLL0-derived source. The final source and divider are committed by
//! the following rate change; an aborted PLL reprogram leaves the mux parked.

use log::{debug, error, trace, warn};

use crate::error::ClkError;
use crate::hfpll::{Hfpll, HfpllConfig};
use crate::mux_div::{MuxDiv, MuxDivLayout, MuxSel, hid_rate};
use crate::policy::{self, AuxRates, RateRequest};
use crate::qos::{CpuMask, PmQos, QosVote};
use crate::regmap::{Delay, PollBudget, Regmap};

/// Logical mux inputs, in parent-index order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    /// Cluster PLL main output.
    ClusterPllMain,
    /// Cluster PLL early output.
    ClusterPll,
    Gpll0Aux,
    Gpll4Aux,
}

impl Parent {
    pub const ALL: [Parent; 4] = [
        Parent::ClusterPllMain,
        Parent::ClusterPll,
        Parent::Gpll0Aux,
        Parent::Gpll4Aux,
    ];

    pub const fn is_cluster_pll(self) -> bool {
        matches!(self, Parent::ClusterPllMain | Parent::ClusterPll)
    }
}

/// Mux-select encoding of each parent a domain has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentMap([Option<u32>; 4]);

impl ParentMap {
    pub const fn new(cfg: [Option<u32>; 4]) -> Self {
        ParentMap(cfg)
    }

    pub fn cfg(&self, parent: Parent) -> Option<u32> {
        self.0[parent as usize]
    }

    /// Parent selected by a mux-select code.
    pub fn lookup(&self, src: u32) -> Option<Parent> {
        Parent::ALL
            .into_iter()
            .find(|p| self.cfg(*p) == Some(src))
    }

    /// Number of parents present.
    pub fn len(&self) -> usize {
        self.0.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Framework parent index of `parent`.
    pub fn index_of(&self, parent: Parent) -> Option<usize> {
        self.cfg(parent)?;
        Some(self.0[..parent as usize].iter().flatten().count())
    }

    pub fn parent_at(&self, index: usize) -> Option<Parent> {
        Parent::ALL
            .into_iter()
            .filter(|p| self.cfg(*p).is_some())
            .nth(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatePolicy {
    /// Auxiliary sources below their ceiling, cluster PLL above.
    AuxOrPll,
    /// Always the cluster PLL.
    PllOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainConfig {
    pub name: &'static str,
    pub policy: RatePolicy,
    /// CPUs clocked by this mux. Empty for the CCI bus.
    pub cpus: CpuMask,
    /// Selection of a disabled mux.
    pub safe: MuxSel,
    /// Divider field on the safe source while the cluster PLL changes.
    pub park_div: u32,
    pub safe_freq: u64,
    pub parents: ParentMap,
    pub mux: MuxDivLayout,
    pub pll: HfpllConfig,
}

impl DomainConfig {
    /// Selection held while the cluster PLL is reprogrammed.
    pub const fn park(&self) -> MuxSel {
        MuxSel {
            src: self.safe.src,
            div: self.park_div,
        }
    }
}

/// Upstream PLL rate change notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateChangeEvent {
    PreRateChange,
    PostRateChange,
    AbortRateChange,
}

/// Selection in effect before the mux was parked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafeSwitchState {
    pub saved: Option<MuxSel>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchState {
    Stable,
    /// Parked on the safe source until the next commit.
    Transitioning(SafeSwitchState),
}

/// What a mux commit needs besides the domain itself.
pub struct SwitchCtx<'a, D: ?Sized, Q: ?Sized> {
    pub delay: &'a D,
    pub qos: &'a mut Q,
    pub poll: PollBudget,
    pub latency_us: u32,
}

pub struct ClockDomain<R> {
    config: DomainConfig,
    mux: MuxDiv<R>,
    pll: Option<Hfpll<R>>,
    /// Selection requested by the last rate decision.
    sel: Option<MuxSel>,
    /// Selection the hardware last acknowledged, `None` when unknown.
    hw: Option<MuxSel>,
    state: SwitchState,
    enabled: bool,
    pll_proxy: bool,
}

impl<R: Regmap> ClockDomain<R> {
    pub fn new(config: DomainConfig, mux: R, pll: Option<R>, xo_rate: u64) -> Self {
        ClockDomain {
            config,
            mux: MuxDiv::new(config.name, config.mux, mux),
            pll: pll.map(|regs| Hfpll::new(config.pll, xo_rate, regs)),
            sel: None,
            hw: None,
            state: SwitchState::Stable,
            enabled: false,
            pll_proxy: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.config.name
    }

    pub fn config(&self) -> &DomainConfig {
        &self.config
    }

    pub fn pll(&self) -> Option<&Hfpll<R>> {
        self.pll.as_ref()
    }

    pub fn pll_mut(&mut self) -> Option<&mut Hfpll<R>> {
        self.pll.as_mut()
    }

    pub fn state(&self) -> SwitchState {
        self.state
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Keeps the cluster PLL running regardless of the mux source.
    pub fn set_pll_proxy(&mut self, proxy: bool) {
        self.pll_proxy = proxy;
    }

    /// Rate decision for `rate`; the resulting selection is remembered for the
    /// commit that follows.
    pub fn determine_rate(
        &mut self,
        xo_rate: u64,
        aux: &AuxRates,
        rate: u64,
    ) -> Result<RateRequest, ClkError> {
        let pll = self.pll.as_ref().map(|pll| pll.config());
        let req = policy::determine_rate(&self.config, pll, xo_rate, aux, rate)?;
        self.sel = Some(req.sel);
        Ok(req)
    }

    /// Parent the hardware was last seen sourcing from.
    pub fn current_parent(&self) -> Option<Parent> {
        self.hw.and_then(|sel| self.config.parents.lookup(sel.src))
    }

    pub fn parent_rate(&self, parent: Parent, aux: &AuxRates) -> Result<u64, ClkError> {
        match parent {
            Parent::ClusterPllMain | Parent::ClusterPll => self
                .pll
                .as_ref()
                .ok_or(ClkError::MissingParent(parent))?
                .recalc_rate(),
            Parent::Gpll0Aux => Ok(aux.gpll0),
            Parent::Gpll4Aux => Ok(aux.gpll4),
        }
    }

    /// Rate read back from the hardware. A source code outside the parent
    /// map is a driver inconsistency and reports 0.
    pub fn recalc_rate(&self, aux: &AuxRates) -> u64 {
        let Ok(sel) = self.mux.get_src_div() else {
            return 0;
        };
        let Some(parent) = self.config.parents.lookup(sel.src) else {
            error!("{}: Can't find parent {}", self.name(), sel.src);
            return 0;
        };
        match self.parent_rate(parent, aux) {
            Ok(rate) => hid_rate(rate, sel.div),
            Err(e) => {
                error!("{}: {}", self.name(), e);
                0
            }
        }
    }

    /// Parent index of the source the hardware reports.
    pub fn get_parent(&self) -> usize {
        let src = match self.mux.get_src_div() {
            Ok(sel) => sel.src,
            Err(_) => return 0,
        };
        match self
            .config
            .parents
            .lookup(src)
            .and_then(|p| self.config.parents.index_of(p))
        {
            Some(index) => index,
            None => {
                error!("{}: Can't find parent with src {}", self.name(), src);
                0
            }
        }
    }

    /// Parent and rate always change together through
    /// [`set_rate_and_parent`](Self::set_rate_and_parent).
    pub fn set_parent(&mut self, _index: usize) -> Result<(), ClkError> {
        Ok(())
    }

    fn commit<D: Delay + ?Sized>(
        &mut self,
        sel: MuxSel,
        delay: &D,
        poll: &PollBudget,
    ) -> Result<(), ClkError> {
        match self.mux.set_src_div(sel, delay, poll) {
            Ok(()) => {
                self.hw = Some(sel);
                Ok(())
            }
            Err(e) => {
                self.hw = None;
                Err(e)
            }
        }
    }

    /// Notifier callback for rate changes of the cluster PLL.
    pub fn on_pll_rate_change<D: Delay + ?Sized>(
        &mut self,
        event: RateChangeEvent,
        delay: &D,
        poll: &PollBudget,
    ) -> Result<(), ClkError> {
        match event {
            RateChangeEvent::PreRateChange => {
                let saved = match self.state {
                    SwitchState::Transitioning(parked) => parked,
                    SwitchState::Stable => SafeSwitchState {
                        saved: self.hw.or(self.sel),
                    },
                };
                debug!("{}: parking on safe source", self.name());
                self.commit(self.config.park(), delay, poll)?;
                self.state = SwitchState::Transitioning(saved);
            }
            RateChangeEvent::PostRateChange => {
                trace!("{}: PLL settled", self.name());
            }
            RateChangeEvent::AbortRateChange => {
                error!("{}: Error in configuring PLL - stay at safe src only", self.name());
            }
        }
        Ok(())
    }

    /// Commits the pending selection with the parent at `index`.
    pub fn set_rate_and_parent<D, Q>(
        &mut self,
        index: usize,
        ctx: &mut SwitchCtx<'_, D, Q>,
    ) -> Result<(), ClkError>
    where
        D: Delay + ?Sized,
        Q: PmQos + ?Sized,
    {
        let Some(parent) = self.config.parents.parent_at(index) else {
            error!("{}: Can't find parent with index {}", self.name(), index);
            return Err(ClkError::UnknownParent { src: index as u32 });
        };
        let src = self
            .config
            .parents
            .cfg(parent)
            .ok_or(ClkError::MissingParent(parent))?;
        let div = self.sel.map_or(1, |sel| sel.div);
        self.switch_to(MuxSel { src, div }, ctx)
    }

    /// Commits the pending selection on the current parent.
    pub fn set_rate<D, Q>(&mut self, ctx: &mut SwitchCtx<'_, D, Q>) -> Result<(), ClkError>
    where
        D: Delay + ?Sized,
        Q: PmQos + ?Sized,
    {
        let sel = match self.sel {
            Some(sel) => sel,
            None => self.mux.get_src_div()?,
        };
        self.switch_to(sel, ctx)
    }

    /// Moves a parked mux back to the selection saved when it was parked.
    pub fn restore<D, Q>(&mut self, ctx: &mut SwitchCtx<'_, D, Q>) -> Result<(), ClkError>
    where
        D: Delay + ?Sized,
        Q: PmQos + ?Sized,
    {
        let SwitchState::Transitioning(parked) = self.state else {
            return Ok(());
        };
        match parked.saved.or(self.sel) {
            Some(sel) => self.switch_to(sel, ctx),
            None => {
                warn!("{}: no selection to restore, staying on safe source", self.name());
                Ok(())
            }
        }
    }

    fn switch_to<D, Q>(&mut self, target: MuxSel, ctx: &mut SwitchCtx<'_, D, Q>) -> Result<(), ClkError>
    where
        D: Delay + ?Sized,
        Q: PmQos + ?Sized,
    {
        self.sel = Some(target);
        if self.state == SwitchState::Stable && self.hw == Some(target) {
            trace!("{}: src {} div {} already set", self.name(), target.src, target.div);
            return Ok(());
        }

        let _vote = (!self.config.cpus.is_empty())
            .then(|| QosVote::acquire(&mut *ctx.qos, self.config.cpus, ctx.latency_us));
        self.commit(target, ctx.delay, &ctx.poll)?;
        self.state = SwitchState::Stable;
        Ok(())
    }

    /// Ungates the mux at its selection. A parked mux stays parked.
    pub fn enable<D: Delay + ?Sized>(&mut self, delay: &D, poll: &PollBudget) -> Result<(), ClkError> {
        let sel = match (self.state, self.sel) {
            (SwitchState::Transitioning(_), _) => self.config.park(),
            (SwitchState::Stable, Some(sel)) => sel,
            (SwitchState::Stable, None) => self.mux.get_src_div()?,
        };
        if self.state == SwitchState::Stable {
            self.sel = Some(sel);
        }
        self.commit(sel, delay, poll)?;
        self.enabled = true;
        Ok(())
    }

    /// Parks the mux on its safe source. The selection is kept for the next
    /// enable.
    pub fn disable<D: Delay + ?Sized>(&mut self, delay: &D, poll: &PollBudget) -> Result<(), ClkError> {
        self.commit(self.config.safe, delay, poll)?;
        self.enabled = false;
        Ok(())
    }

    /// Stops the cluster PLL when nothing needs it.
    pub fn release_pll(&mut self) -> Result<(), ClkError> {
        if self.pll_proxy || self.current_parent().is_some_and(Parent::is_cluster_pll) {
            return Ok(());
        }
        match self.pll.as_mut() {
            Some(pll) if pll.is_enabled()? => {
                debug!("{}: stopping {}", self.config.name, pll.name());
                pll.disable()
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MSM8976;
    use crate::hfpll::L_REG;
    use crate::mux_div::{CFG_RCGR, CMD_RCGR};
    use crate::testutil::{Event, FakeDelay, FakeQos, FakeRegs, Hw};

    const AUX: AuxRates = AuxRates {
        gpll0: 800_000_000,
        gpll4: 1_152_000_000,
    };
    const XO: u64 = 19_200_000;

    struct Rig {
        hw: Hw,
        mux: FakeRegs,
        pll: FakeRegs,
        delay: FakeDelay,
        qos: FakeQos,
        domain: ClockDomain<FakeRegs>,
    }

    fn rig(index: usize) -> Rig {
        let hw = Hw::new();
        let mux = FakeRegs::mux(&hw, "mux");
        let pll = FakeRegs::pll(&hw, "pll");
        let domain = ClockDomain::new(MSM8976.domains[index], mux.clone(), Some(pll.clone()), XO);
        Rig {
            delay: FakeDelay::default(),
            qos: FakeQos::new(&hw),
            hw,
            mux,
            pll,
            domain,
        }
    }

    impl Rig {
        fn ctx(&mut self) -> (&mut ClockDomain<FakeRegs>, SwitchCtx<'_, FakeDelay, FakeQos>) {
            (
                &mut self.domain,
                SwitchCtx {
                    delay: &self.delay,
                    qos: &mut self.qos,
                    poll: MSM8976.poll,
                    latency_us: MSM8976.qos_latency_us,
                },
            )
        }

        fn set_rate(&mut self, rate: u64) -> Result<RateRequest, ClkError> {
            let req = self.domain.determine_rate(XO, &AUX, rate)?;
            let (domain, mut ctx) = self.ctx();
            domain.set_rate(&mut ctx)?;
            Ok(req)
        }
    }

    #[test]
    fn parent_map_indices() {
        let a53 = MSM8976.domains[0].parents;
        assert_eq!(a53.index_of(Parent::Gpll4Aux), Some(3));
        assert_eq!(a53.parent_at(2), Some(Parent::Gpll0Aux));
        assert_eq!(a53.lookup(5), Some(Parent::ClusterPll));
        assert_eq!(a53.lookup(7), None);

        let cci = MSM8976.domains[2].parents;
        assert_eq!(cci.index_of(Parent::Gpll4Aux), None);
        assert_eq!(cci.parent_at(3), None);
    }

    #[test]
    fn commit_and_read_back() {
        let mut rig = rig(0);
        let req = rig.set_rate(200_000_000).unwrap();
        assert_eq!(req.sel, MuxSel { src: 4, div: 7 });
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x407);
        assert_eq!(rig.domain.recalc_rate(&AUX), 200_000_000);
        assert_eq!(rig.domain.get_parent(), 2);
        assert_eq!(rig.domain.state(), SwitchState::Stable);

        rig.hw.clear_log();
        rig.domain.set_parent(0).unwrap();
        assert!(rig.hw.events().is_empty());
        assert_eq!(rig.domain.get_parent(), 2);
    }

    #[test]
    fn repeated_rate_is_a_register_noop() {
        let mut rig = rig(0);
        rig.set_rate(300_000_000).unwrap();
        rig.hw.clear_log();

        rig.set_rate(300_000_000).unwrap();
        assert!(rig.hw.events().is_empty());
        assert_eq!(rig.qos.active(), 0);
    }

    #[test]
    fn cluster_commit_holds_a_qos_vote() {
        let mut rig = rig(1);
        rig.set_rate(400_000_000).unwrap();

        let events = rig.hw.events();
        let cpus = CpuMask::from_bits(0xf0);
        assert_eq!(
            events.first(),
            Some(&Event::QosAdd {
                cpus,
                latency_us: 280
            })
        );
        assert_eq!(events.last(), Some(&Event::QosRemove { cpus }));
        let cfg = rig
            .hw
            .first_write(|dev, reg, _| dev == "mux" && reg == CFG_RCGR)
            .unwrap();
        assert!(cfg > 0 && cfg < events.len() - 1);
    }

    #[test]
    fn cci_commit_takes_no_vote() {
        let mut rig = rig(2);
        rig.set_rate(595_200_000).unwrap();
        assert!(
            rig.hw
                .events()
                .iter()
                .all(|e| matches!(e, Event::Write { .. }))
        );
    }

    #[test]
    fn vote_released_when_commit_times_out() {
        let mut rig = rig(0);
        rig.mux.set_stuck_update(true);

        let err = rig.set_rate(200_000_000).unwrap_err();
        assert_eq!(err, ClkError::UpdateTimeout { name: "a53ssmux" });
        assert_eq!(rig.qos.active(), 0);
        assert!(matches!(
            rig.hw.events().last(),
            Some(Event::QosRemove { .. })
        ));
    }

    #[test]
    fn pre_rate_change_parks_and_remembers() {
        let mut rig = rig(0);
        rig.set_rate(200_000_000).unwrap();

        rig.domain
            .on_pll_rate_change(RateChangeEvent::PreRateChange, &rig.delay, &MSM8976.poll)
            .unwrap();

        // GPLL0 undivided, whatever the disable divider is.
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x401);
        assert_eq!(rig.domain.recalc_rate(&AUX), 800_000_000);
        assert_eq!(
            rig.domain.state(),
            SwitchState::Transitioning(SafeSwitchState {
                saved: Some(MuxSel { src: 4, div: 7 })
            })
        );

        let (domain, mut ctx) = rig.ctx();
        domain.restore(&mut ctx).unwrap();
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x407);
        assert_eq!(rig.domain.state(), SwitchState::Stable);
    }

    #[test]
    fn cci_parks_at_divide_by_four_field() {
        let mut rig = rig(2);
        rig.domain
            .on_pll_rate_change(RateChangeEvent::PreRateChange, &rig.delay, &MSM8976.poll)
            .unwrap();
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x404);
        assert_eq!(rig.domain.recalc_rate(&AUX), 320_000_000);
    }

    #[test]
    fn abort_keeps_mux_parked() {
        let mut rig = rig(0);
        rig.set_rate(200_000_000).unwrap();
        let poll = MSM8976.poll;
        rig.domain
            .on_pll_rate_change(RateChangeEvent::PreRateChange, &rig.delay, &poll)
            .unwrap();
        rig.hw.clear_log();

        rig.domain
            .on_pll_rate_change(RateChangeEvent::AbortRateChange, &rig.delay, &poll)
            .unwrap();

        assert!(rig.hw.events().is_empty());
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x401);
        assert!(matches!(rig.domain.state(), SwitchState::Transitioning(_)));

        rig.domain.enable(&rig.delay, &poll).unwrap();
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x401);
        assert_eq!(rig.domain.recalc_rate(&AUX), 800_000_000);
    }

    #[test]
    fn unknown_parent_index_is_rejected_without_writes() {
        let mut rig = rig(2);
        rig.hw.clear_log();
        let (domain, mut ctx) = rig.ctx();
        assert_eq!(
            domain.set_rate_and_parent(3, &mut ctx),
            Err(ClkError::UnknownParent { src: 3 })
        );
        assert!(rig.hw.events().is_empty());
    }

    #[test]
    fn rate_is_read_from_hardware_not_from_last_commit() {
        let mut rig = rig(0);
        rig.set_rate(200_000_000).unwrap();
        rig.mux.poke(CFG_RCGR, 0x403);
        assert_eq!(rig.domain.recalc_rate(&AUX), 400_000_000);
        assert_eq!(rig.domain.get_parent(), 2);
    }

    #[test]
    fn parked_mux_is_committed_even_for_same_selection() {
        let mut rig = rig(0);
        rig.set_rate(200_000_000).unwrap();
        rig.domain
            .on_pll_rate_change(RateChangeEvent::PreRateChange, &rig.delay, &MSM8976.poll)
            .unwrap();
        rig.hw.clear_log();

        rig.set_rate(200_000_000).unwrap();
        assert!(
            rig.hw
                .first_write(|_, reg, val| reg == CFG_RCGR && val == 0x407)
                .is_some()
        );
        assert_eq!(rig.domain.state(), SwitchState::Stable);
    }

    #[test]
    fn disable_parks_and_enable_restores() {
        let mut rig = rig(0);
        rig.set_rate(400_000_000).unwrap();
        let poll = MSM8976.poll;

        rig.domain.disable(&rig.delay, &poll).unwrap();
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x402);
        assert!(!rig.domain.is_enabled());

        rig.domain.enable(&rig.delay, &poll).unwrap();
        assert_eq!(rig.mux.peek(CFG_RCGR), 0x403);
        assert!(rig.domain.is_enabled());
    }

    #[test]
    fn unknown_source_reports_zero() {
        let rig = rig(0);
        rig.mux.poke(CFG_RCGR, 0x703);
        assert_eq!(rig.domain.recalc_rate(&AUX), 0);
        assert_eq!(rig.domain.get_parent(), 0);
    }

    #[test]
    fn pending_configuration_reports_zero() {
        let rig = rig(0);
        rig.mux.poke(CFG_RCGR, 0x403);
        rig.mux.poke(CMD_RCGR, 1 << 4);
        assert_eq!(rig.domain.recalc_rate(&AUX), 0);
    }

    #[test]
    fn rate_through_pll_follows_l_value() {
        let rig = rig(0);
        rig.mux.poke(CFG_RCGR, 0x301);
        rig.pll.poke(L_REG, 73);
        assert_eq!(rig.domain.recalc_rate(&AUX), 1_401_600_000);
        assert_eq!(rig.domain.get_parent(), 0);

        rig.mux.poke(CFG_RCGR, 0x503);
        assert_eq!(rig.domain.recalc_rate(&AUX), 700_800_000);
    }

    #[test]
    fn missing_pll_yields_zero_for_pll_sources() {
        let hw = Hw::new();
        let mux = FakeRegs::mux(&hw, "mux");
        mux.poke(CFG_RCGR, 0x301);
        let domain = ClockDomain::new(MSM8976.domains[0], mux, None, XO);
        assert_eq!(domain.recalc_rate(&AUX), 0);
    }
}
