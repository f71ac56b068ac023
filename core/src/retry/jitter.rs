//! Randomisation of retry delays so tasks that failed together do not retry
//! in lock-step.

use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JitterMode {
    /// Exact computed delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2 + uniform[0, delay/2]`; keeps roughly three quarters of the delay.
    Equal,
}

impl JitterMode {
    pub fn apply(self, delay: Duration) -> Duration {
        let ms = delay.as_millis() as u64;
        if ms == 0 {
            return Duration::ZERO;
        }

        let mut rng = rand::thread_rng();
        match self {
            JitterMode::None => delay,
            JitterMode::Full => Duration::from_millis(rng.gen_range(0..=ms)),
            JitterMode::Equal => {
                let half = ms / 2;
                let jitter = if half == 0 { 0 } else { rng.gen_range(0..=half) };
                Duration::from_millis(ms - half + jitter)
            }
        }
    }
}

impl FromStr for JitterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(JitterMode::None),
            "full" => Ok(JitterMode::Full),
            "equal" => Ok(JitterMode::Equal),
            other => Err(format!("unknown jitter mode '{other}'")),
        }
    }
}
