use core::fmt;

use rdrive::KError;

use crate::domain::Parent;

/// Failures of the CPU clock controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClkError {
    /// A rate of zero was requested.
    InvalidRate,
    /// The mux reports a source code that no parent map entry carries.
    UnknownParent { src: u32 },
    /// The domain's parent map has no entry for the decided parent.
    MissingParent(Parent),
    /// The mux never acknowledged its update bit.
    UpdateTimeout { name: &'static str },
    /// The mux configuration is dirty and cannot be read back.
    ConfigPending { name: &'static str },
    /// The cluster PLL never reported lock.
    PllLockTimeout { name: &'static str },
    /// The provider does not know this clock ID.
    UnsupportedClock(usize),
    /// Register access rejected by the bus.
    Bus { reg: u32 },
}

impl fmt::Display for ClkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClkError::InvalidRate => write!(f, "Requested rate must be non-zero"),
            ClkError::UnknownParent { src } => write!(f, "Can't find parent with src {}", src),
            ClkError::MissingParent(parent) => write!(f, "No mux encoding for parent {:?}", parent),
            ClkError::UpdateTimeout { name } => {
                write!(f, "{}: RCG did not update its configuration", name)
            }
            ClkError::ConfigPending { name } => write!(f, "{}: RCG configuration is pending", name),
            ClkError::PllLockTimeout { name } => write!(f, "{}: PLL did not lock", name),
            ClkError::UnsupportedClock(id) => write!(f, "Unsupported clock ID: {}", id),
            ClkError::Bus { reg } => write!(f, "Register {:#x} is not accessible", reg),
        }
    }
}

impl core::error::Error for ClkError {}

impl From<ClkError> for KError {
    fn from(err: ClkError) -> Self {
        let name = match err {
            ClkError::InvalidRate => "rate",
            ClkError::UnknownParent { .. } | ClkError::MissingParent(_) => "parent",
            ClkError::UpdateTimeout { .. } | ClkError::ConfigPending { .. } => "mux",
            ClkError::PllLockTimeout { .. } => "pll",
            ClkError::UnsupportedClock(_) => "clock_id",
            ClkError::Bus { .. } => "reg",
        };
        KError::InvalidArg { name }
    }
}
