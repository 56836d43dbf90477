//! Simulated time: units, precision and step conversion.

use std::fmt;
use std::str::FromStr;

use num_format::{Locale, ToFormattedString};
use serde::{Deserialize, Serialize};

use crate::error::HarnessError;
use crate::TbResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeUnit {
    Fs,
    Ps,
    Ns,
    Us,
    Ms,
    #[serde(alias = "s")]
    Sec,
}

impl TimeUnit {
    /// Base-10 exponent of the unit relative to one second.
    pub fn exponent(self) -> i8 {
        match self {
            TimeUnit::Fs => -15,
            TimeUnit::Ps => -12,
            TimeUnit::Ns => -9,
            TimeUnit::Us => -6,
            TimeUnit::Ms => -3,
            TimeUnit::Sec => 0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeUnit::Fs => "fs",
            TimeUnit::Ps => "ps",
            TimeUnit::Ns => "ns",
            TimeUnit::Us => "us",
            TimeUnit::Ms => "ms",
            TimeUnit::Sec => "sec",
        }
    }
}

impl FromStr for TimeUnit {
    type Err = HarnessError;

    fn from_str(unit: &str) -> Result<Self, Self::Err> {
        match unit {
            "fs" => Ok(TimeUnit::Fs),
            "ps" => Ok(TimeUnit::Ps),
            "ns" => Ok(TimeUnit::Ns),
            "us" => Ok(TimeUnit::Us),
            "ms" => Ok(TimeUnit::Ms),
            "sec" | "s" => Ok(TimeUnit::Sec),
            _ => Err(HarnessError::TimeUnit {
                unit: unit.to_string(),
            }),
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A point in simulated time, counted in simulator steps.
///
/// The length of one step is the simulator precision; see [`Precision`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimTime(pub u64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub fn steps(self) -> u64 {
        self.0
    }

    pub fn saturating_add(self, steps: u64) -> SimTime {
        SimTime(self.0.saturating_add(steps))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} steps", self.0)
    }
}

/// Resolution of one simulator step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Precision(pub TimeUnit);

impl Default for Precision {
    fn default() -> Self {
        Precision(TimeUnit::Ps)
    }
}

impl Precision {
    /// Converts `time` in `unit` to steps. Fails rather than rounding.
    pub fn to_steps(self, time: u64, unit: TimeUnit) -> TbResult<u64> {
        let exp = unit.exponent() - self.0.exponent();
        let err = || HarnessError::TimePrecision {
            time,
            unit: unit.to_string(),
            precision: self.0.to_string(),
        };
        if exp >= 0 {
            10u64
                .checked_pow(exp as u32)
                .and_then(|scale| time.checked_mul(scale))
                .ok_or_else(err)
        } else {
            let div = 10u64.pow((-exp) as u32);
            if time % div == 0 {
                Ok(time / div)
            } else {
                Err(err())
            }
        }
    }

    /// Lossy conversion of a step count into `unit`.
    pub fn to_unit(self, t: SimTime, unit: TimeUnit) -> f64 {
        ldexp10(t.0 as f64, self.0.exponent() - unit.exponent())
    }

    /// Formats `t` as nanoseconds with thousands separators, e.g. `1,250.000ns`.
    pub fn format_ns(self, t: SimTime) -> String {
        let thousandths = (self.to_unit(t, TimeUnit::Ns) * 1000.0).round() as u64;
        format!(
            "{}.{:03}ns",
            (thousandths / 1000).to_formatted_string(&Locale::en),
            thousandths % 1000
        )
    }
}

fn ldexp10(frac: f64, exp: i8) -> f64 {
    // Like math.ldexp, but base 10
    if exp >= 0 {
        frac * 10_u64.pow(exp as u32) as f64
    } else {
        frac / 10_u64.pow(-exp as u32) as f64
    }
}
