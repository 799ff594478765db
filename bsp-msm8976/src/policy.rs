//! Source and divider selection for a requested CPU rate.
//!
//! Low rates are served from the buffered GPLL0/GPLL4 outputs through the mux
//! divider so the cluster PLL can stay off. Rates above what the auxiliary
//! sources reach go to the cluster PLL, which is asked for the exact rate.

use log::debug;

use crate::domain::{DomainConfig, Parent, RatePolicy};
use crate::error::ClkError;
use crate::hfpll::HfpllConfig;
use crate::mux_div::{MuxSel, hid_for_rate, hid_rate};

/// Rates of the auxiliary mux inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuxRates {
    /// sys_apcsaux_clk_3
    pub gpll0: u64,
    /// sys_apcsaux_clk_2
    pub gpll4: u64,
}

/// Outcome of rate selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateRequest {
    /// Rate the mux will produce.
    pub rate: u64,
    pub parent: Parent,
    pub parent_rate: u64,
    /// Mux encoding to commit; `rate == hid_rate(parent_rate, sel.div)`.
    pub sel: MuxSel,
}

/// Picks parent and divider for `rate` on one domain.
///
/// `pll` is `None` while the cluster PLL is not registered; the GPLL0 path is
/// then used for every rate.
pub fn determine_rate(
    domain: &DomainConfig,
    pll: Option<&HfpllConfig>,
    xo_rate: u64,
    aux: &AuxRates,
    rate: u64,
) -> Result<RateRequest, ClkError> {
    if rate == 0 {
        return Err(ClkError::InvalidRate);
    }

    let Some(pll) = pll else {
        debug!("{}: no cluster PLL, forcing GPLL0", domain.name);
        return aux_path(domain, Parent::Gpll0Aux, aux.gpll0, rate);
    };

    if domain.policy == RatePolicy::PllOnly {
        return pll_path(domain, pll, xo_rate, rate);
    }

    let mut parent = Parent::Gpll0Aux;
    let mut ceiling = aux.gpll0;
    // GPLL0 is too coarse above half its rate; GPLL4 covers that band.
    if rate > aux.gpll0 / 2 && rate != aux.gpll0 && domain.parents.cfg(Parent::Gpll4Aux).is_some() {
        parent = Parent::Gpll4Aux;
        ceiling = aux.gpll4;
    }

    if rate <= ceiling {
        aux_path(domain, parent, ceiling, rate)
    } else {
        pll_path(domain, pll, xo_rate, rate)
    }
}

fn aux_path(
    domain: &DomainConfig,
    parent: Parent,
    parent_rate: u64,
    rate: u64,
) -> Result<RateRequest, ClkError> {
    let src = domain
        .parents
        .cfg(parent)
        .ok_or(ClkError::MissingParent(parent))?;
    let div = hid_for_rate(parent_rate, rate, domain.mux.hid_max());
    let req = RateRequest {
        rate: hid_rate(parent_rate, div),
        parent,
        parent_rate,
        sel: MuxSel { src, div },
    };
    debug!(
        "{}: {} Hz -> {:?} {} Hz div {} = {} Hz",
        domain.name, rate, parent, parent_rate, div, req.rate
    );
    Ok(req)
}

fn pll_path(
    domain: &DomainConfig,
    pll: &HfpllConfig,
    xo_rate: u64,
    rate: u64,
) -> Result<RateRequest, ClkError> {
    let parent = Parent::ClusterPllMain;
    let src = domain
        .parents
        .cfg(parent)
        .ok_or(ClkError::MissingParent(parent))?;
    let parent_rate = pll.determine_rate(xo_rate, rate);
    debug!("{}: {} Hz -> {} at {} Hz", domain.name, rate, pll.name, parent_rate);
    Ok(RateRequest {
        rate: parent_rate,
        parent,
        parent_rate,
        sel: MuxSel { src, div: 1 },
    })
}
