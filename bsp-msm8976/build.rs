use std::{env, fmt::Write as _, fs, path::PathBuf};

use serde::Deserialize;

const CONFIG_FILE: &str = "msm8976.toml";
const DOMAIN_COUNT: usize = 3;

#[derive(Deserialize)]
struct Platform {
    xo_rate: u64,
    qos_latency_us: u32,
    poll: Poll,
    aux: Aux,
    domain: Vec<Domain>,
}

#[derive(Deserialize)]
struct Poll {
    retries: u32,
    delay_us: u64,
}

#[derive(Deserialize)]
struct Aux {
    gpll0_rate: u64,
    gpll4_rate: u64,
}

#[derive(Deserialize)]
struct Domain {
    name: String,
    policy: String,
    cpus: Vec<u32>,
    safe_src: u32,
    safe_div: u32,
    park_div: u32,
    safe_freq: u64,
    parents: Parents,
    mux: Mux,
    pll: Pll,
}

#[derive(Deserialize)]
struct Parents {
    pll_main: Option<u32>,
    pll: Option<u32>,
    gpll0: Option<u32>,
    gpll4: Option<u32>,
}

#[derive(Deserialize)]
struct Mux {
    reg_offset: u32,
    hid_width: u32,
    hid_shift: u32,
    src_width: u32,
    src_shift: u32,
}

#[derive(Deserialize)]
struct Pll {
    name: String,
    config_val: u32,
    user_vco_mask: u32,
    pre_div_mask: u32,
    pre_div_masked: u32,
    post_div_mask: u32,
    post_div_masked: u32,
    early_output_mask: u32,
    main_output_mask: u32,
    min_rate: u64,
    max_rate: u64,
    low_vco_max_rate: u64,
    l_val: u32,
}

fn main() {
    println!("cargo:rerun-if-changed={CONFIG_FILE}");
    println!("cargo:rerun-if-changed=build.rs");

    let text = fs::read_to_string(CONFIG_FILE)
        .unwrap_or_else(|e| panic!("failed to read {CONFIG_FILE}: {e}"));
    let platform: Platform =
        toml::from_str(&text).unwrap_or_else(|e| panic!("failed to parse {CONFIG_FILE}: {e}"));

    if platform.domain.len() != DOMAIN_COUNT {
        panic!(
            "{CONFIG_FILE}: expected {DOMAIN_COUNT} domains, found {}",
            platform.domain.len()
        );
    }

    let mut out = String::new();
    emit_platform(&mut out, &platform).expect("formatting generated config");

    let dest = PathBuf::from(env::var("OUT_DIR").unwrap()).join("msm8976_config.rs");
    fs::write(&dest, out).unwrap_or_else(|e| panic!("failed to write {}: {e}", dest.display()));
}

fn emit_platform(out: &mut String, p: &Platform) -> std::fmt::Result {
    writeln!(out, "/// Descriptors generated from `{CONFIG_FILE}`.")?;
    writeln!(out, "pub const MSM8976: CpuccConfig = CpuccConfig {{")?;
    writeln!(out, "    xo_rate: {},", p.xo_rate)?;
    writeln!(out, "    qos_latency_us: {},", p.qos_latency_us)?;
    writeln!(
        out,
        "    poll: PollBudget {{ retries: {}, delay_us: {} }},",
        p.poll.retries, p.poll.delay_us
    )?;
    writeln!(
        out,
        "    aux: AuxRates {{ gpll0: {}, gpll4: {} }},",
        p.aux.gpll0_rate, p.aux.gpll4_rate
    )?;
    writeln!(out, "    domains: [")?;
    for d in &p.domain {
        emit_domain(out, d)?;
    }
    writeln!(out, "    ],")?;
    writeln!(out, "}};")
}

fn emit_domain(out: &mut String, d: &Domain) -> std::fmt::Result {
    let policy = match d.policy.as_str() {
        "aux-or-pll" => "RatePolicy::AuxOrPll",
        "pll-only" => "RatePolicy::PllOnly",
        other => panic!("{}: unknown rate policy `{other}`", d.name),
    };
    let mut cpus = 0u32;
    for cpu in &d.cpus {
        if *cpu >= 32 {
            panic!("{}: cpu {cpu} out of range", d.name);
        }
        cpus |= 1 << cpu;
    }

    writeln!(out, "        DomainConfig {{")?;
    writeln!(out, "            name: {:?},", d.name)?;
    writeln!(out, "            policy: {policy},")?;
    writeln!(out, "            cpus: CpuMask::from_bits({cpus:#x}),")?;
    writeln!(
        out,
        "            safe: MuxSel {{ src: {}, div: {} }},",
        d.safe_src, d.safe_div
    )?;
    writeln!(out, "            park_div: {},", d.park_div)?;
    writeln!(out, "            safe_freq: {},", d.safe_freq)?;
    writeln!(
        out,
        "            parents: ParentMap::new([{}, {}, {}, {}]),",
        opt(d.parents.pll_main),
        opt(d.parents.pll),
        opt(d.parents.gpll0),
        opt(d.parents.gpll4)
    )?;
    writeln!(
        out,
        "            mux: MuxDivLayout {{ reg_offset: {:#x}, hid_width: {}, hid_shift: {}, src_width: {}, src_shift: {} }},",
        d.mux.reg_offset, d.mux.hid_width, d.mux.hid_shift, d.mux.src_width, d.mux.src_shift
    )?;
    let pll = &d.pll;
    writeln!(out, "            pll: HfpllConfig {{")?;
    writeln!(out, "                name: {:?},", pll.name)?;
    writeln!(out, "                config_val: {:#x},", pll.config_val)?;
    writeln!(out, "                user_vco_mask: {:#x},", pll.user_vco_mask)?;
    writeln!(out, "                pre_div_mask: {:#x},", pll.pre_div_mask)?;
    writeln!(out, "                pre_div_masked: {:#x},", pll.pre_div_masked)?;
    writeln!(out, "                post_div_mask: {:#x},", pll.post_div_mask)?;
    writeln!(out, "                post_div_masked: {:#x},", pll.post_div_masked)?;
    writeln!(out, "                early_output_mask: {:#x},", pll.early_output_mask)?;
    writeln!(out, "                main_output_mask: {:#x},", pll.main_output_mask)?;
    writeln!(out, "                min_rate: {},", pll.min_rate)?;
    writeln!(out, "                max_rate: {},", pll.max_rate)?;
    writeln!(out, "                low_vco_max_rate: {},", pll.low_vco_max_rate)?;
    writeln!(out, "                l_val: {:#x},", pll.l_val)?;
    writeln!(out, "            }},")?;
    writeln!(out, "        }},")
}

fn opt(v: Option<u32>) -> String {
    match v {
        Some(v) => format!("Some({v})"),
        None => "None".into(),
    }
}
