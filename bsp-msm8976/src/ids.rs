//! Clock identifiers exported to consumers, matching the
//! `qcom,cpu-msm8976` device-tree binding.

/// One of the three mux domains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainId {
    A53,
    A72,
    Cci,
}

impl DomainId {
    pub const ALL: [DomainId; 3] = [DomainId::A53, DomainId::A72, DomainId::Cci];

    pub const fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuClock {
    SysApcsauxClk2 = 0,
    SysApcsauxClk3 = 1,
    A53ssSrPll = 2,
    A72ssHfPll = 3,
    CciSrPll = 4,
    A53ssSrPllMain = 5,
    A72ssHfPllMain = 6,
    CciSrPllMain = 7,
    A53ssMux = 8,
    A72ssMux = 9,
    CcissMux = 10,
}

impl CpuClock {
    pub const ALL: [CpuClock; 11] = [
        CpuClock::SysApcsauxClk2,
        CpuClock::SysApcsauxClk3,
        CpuClock::A53ssSrPll,
        CpuClock::A72ssHfPll,
        CpuClock::CciSrPll,
        CpuClock::A53ssSrPllMain,
        CpuClock::A72ssHfPllMain,
        CpuClock::CciSrPllMain,
        CpuClock::A53ssMux,
        CpuClock::A72ssMux,
        CpuClock::CcissMux,
    ];

    pub fn from_id(id: usize) -> Option<Self> {
        Self::ALL.get(id).copied()
    }

    pub const fn id(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            CpuClock::SysApcsauxClk2 => "sys_apcsaux_clk_2",
            CpuClock::SysApcsauxClk3 => "sys_apcsaux_clk_3",
            CpuClock::A53ssSrPll => "a53ss_sr_pll",
            CpuClock::A72ssHfPll => "a72ss_hf_pll",
            CpuClock::CciSrPll => "cci_sr_pll",
            CpuClock::A53ssSrPllMain => "a53ss_sr_pll_main",
            CpuClock::A72ssHfPllMain => "a72ss_hf_pll_main",
            CpuClock::CciSrPllMain => "cci_sr_pll_main",
            CpuClock::A53ssMux => "a53ssmux",
            CpuClock::A72ssMux => "a72ssmux",
            CpuClock::CcissMux => "ccissmux",
        }
    }

    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.name() == name)
    }

    /// Domain owning this clock, `None` for the fixed auxiliary outputs.
    pub const fn domain(self) -> Option<DomainId> {
        match self {
            CpuClock::SysApcsauxClk2 | CpuClock::SysApcsauxClk3 => None,
            CpuClock::A53ssSrPll | CpuClock::A53ssSrPllMain | CpuClock::A53ssMux => {
                Some(DomainId::A53)
            }
            CpuClock::A72ssHfPll | CpuClock::A72ssHfPllMain | CpuClock::A72ssMux => {
                Some(DomainId::A72)
            }
            CpuClock::CciSrPll | CpuClock::CciSrPllMain | CpuClock::CcissMux => Some(DomainId::Cci),
        }
    }

    pub const fn is_mux(self) -> bool {
        matches!(
            self,
            CpuClock::A53ssMux | CpuClock::A72ssMux | CpuClock::CcissMux
        )
    }
}
