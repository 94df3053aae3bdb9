//! Send pacing: inter-message delays and human-like reply timing.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::ReplyPacing;

/// Probability that a burst delay is short.
const BURST_SHORT_PROBABILITY: f64 = 0.7;
const BURST_SHORT_FACTOR: f64 = 0.5;
const BURST_LONG_FACTOR: f64 = 2.5;

/// Shape of the delay between consecutive sends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionPattern {
    /// Constant base delay.
    Even,
    /// Base delay scaled by U(0.5, 1.5).
    Random,
    /// Mostly short gaps with occasional long pauses.
    Burst,
}

impl fmt::Display for DistributionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Even => "even",
            Self::Random => "random",
            Self::Burst => "burst",
        };
        write!(f, "{s}")
    }
}

impl FromStr for DistributionPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "even" => Ok(Self::Even),
            "random" => Ok(Self::Random),
            "burst" => Ok(Self::Burst),
            other => Err(format!("unknown distribution pattern '{other}'")),
        }
    }
}

/// Base delay for a given hourly budget: `3_600_000 / max_per_hour` ms.
pub fn base_delay(max_per_hour: u32) -> Duration {
    Duration::from_millis(3_600_000 / u64::from(max_per_hour.max(1)))
}

/// Delay before the next send under `pattern`.
pub fn compute_delay<R: Rng + ?Sized>(
    pattern: DistributionPattern,
    base: Duration,
    rng: &mut R,
) -> Duration {
    match pattern {
        DistributionPattern::Even => base,
        DistributionPattern::Random => base.mul_f64(0.5 + rng.r#gen::<f64>()),
        DistributionPattern::Burst => {
            if rng.gen_bool(BURST_SHORT_PROBABILITY) {
                base.mul_f64(BURST_SHORT_FACTOR)
            } else {
                base.mul_f64(BURST_LONG_FACTOR)
            }
        }
    }
}

/// Simulated typing time for a reply of `text`, clamped to the pacing window.
///
/// Typing speed varies uniformly around the configured rate; longer replies
/// get extra thinking time, and some get a random distraction pause.
pub fn typing_delay<R: Rng + ?Sized>(text: &str, pacing: &ReplyPacing, rng: &mut R) -> Duration {
    let length = text.chars().count();
    if length == 0 {
        return pacing.min_delay;
    }

    let variance = pacing.typing_variance.max(0.0);
    let cpm = (pacing.typing_cpm + rng.gen_range(-variance..=variance)).max(1.0);
    let ms_per_char = 60_000.0 / cpm;

    let mut millis = length as f64 * ms_per_char;
    if length > 100 {
        millis += 3_000.0;
    } else if length > 50 {
        millis += 1_500.0;
    }
    if length > 30 && rng.gen_bool(0.2) {
        millis += rng.gen_range(0.0..5_000.0);
    }

    Duration::from_millis(millis as u64).clamp(pacing.min_delay, pacing.max_delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_even_is_constant() {
        let mut rng = StdRng::seed_from_u64(42);
        let base = base_delay(60);
        assert_eq!(base, Duration::from_millis(60_000));
        for _ in 0..100 {
            assert_eq!(compute_delay(DistributionPattern::Even, base, &mut rng), base);
        }
    }

    #[test]
    fn test_random_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(42);
        let base = base_delay(120);
        for _ in 0..1_000 {
            let delay = compute_delay(DistributionPattern::Random, base, &mut rng);
            assert!(delay >= base.mul_f64(0.5));
            assert!(delay <= base.mul_f64(1.5));
        }
    }

    #[test]
    fn test_burst_distribution() {
        let mut rng = StdRng::seed_from_u64(7);
        let base = base_delay(60);
        let short = base.mul_f64(0.5);
        let long = base.mul_f64(2.5);

        let samples = 10_000;
        let mut short_count = 0;
        for _ in 0..samples {
            let delay = compute_delay(DistributionPattern::Burst, base, &mut rng);
            assert!(delay == short || delay == long, "unexpected delay {delay:?}");
            if delay == short {
                short_count += 1;
            }
        }

        let ratio = short_count as f64 / samples as f64;
        assert!((0.67..=0.73).contains(&ratio), "short ratio {ratio}");
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!("Burst".parse(), Ok(DistributionPattern::Burst));
        assert_eq!(" even ".parse(), Ok(DistributionPattern::Even));
        assert!("wave".parse::<DistributionPattern>().is_err());
    }

    #[test]
    fn test_typing_delay_bounds() {
        let pacing = ReplyPacing::default();
        let mut rng = StdRng::seed_from_u64(3);

        assert_eq!(typing_delay("", &pacing, &mut rng), pacing.min_delay);
        assert_eq!(typing_delay("ok", &pacing, &mut rng), pacing.min_delay);

        let long = "a".repeat(400);
        for _ in 0..50 {
            assert_eq!(typing_delay(&long, &pacing, &mut rng), pacing.max_delay);
        }

        let medium = "b".repeat(20);
        for _ in 0..50 {
            let delay = typing_delay(&medium, &pacing, &mut rng);
            // 20 chars at 100..=200 cpm is 6..=12 seconds.
            assert!(delay >= Duration::from_secs(6) && delay <= Duration::from_secs(12));
        }
    }
}
