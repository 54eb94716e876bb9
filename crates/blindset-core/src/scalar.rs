//! Blinding scalar sampling
//!
//! Scalars are drawn from `[0, p)` and used unreduced as multipliers. A
//! [`ScalarBias`] can shorten them to trade entropy for compute cost in test
//! deployments; it is a cost knob, not a security guarantee.

use num_bigint::{BigUint, RandBigInt};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Probability of drawing a short scalar, and how short it is
///
/// A short scalar lies below `10^(digits(p) * digits_num / digits_den)`, where
/// `digits(p)` is the decimal length of the field prime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarBias {
    pub probability: f64,
    pub digits_num: usize,
    pub digits_den: usize,
}

impl ScalarBias {
    /// Always uniform over `[0, p)`
    pub const fn uniform() -> Self {
        Self {
            probability: 0.0,
            digits_num: 1,
            digits_den: 2,
        }
    }

    /// Owner's global scalar `r`
    pub const fn setup_default() -> Self {
        Self {
            probability: 0.0,
            digits_num: 2,
            digits_den: 3,
        }
    }

    /// Client session scalar `m`
    pub const fn client_default() -> Self {
        Self {
            probability: 1.0,
            digits_num: 4,
            digits_den: 5,
        }
    }

    /// Intermediary nonce `t`
    pub const fn nonce_default() -> Self {
        Self::uniform()
    }

    /// Exclusive bound for short scalars under modulus `p`
    pub fn short_bound(&self, p: &BigUint) -> BigUint {
        let digits = p.to_str_radix(10).len();
        let short_digits = digits * self.digits_num / self.digits_den.max(1);
        BigUint::from(10u32).pow(short_digits as u32)
    }
}

impl Default for ScalarBias {
    fn default() -> Self {
        Self::uniform()
    }
}

/// Draw a scalar below `p`, or below the short bound with the configured probability
pub fn sample_scalar<R: Rng + ?Sized>(rng: &mut R, p: &BigUint, bias: &ScalarBias) -> BigUint {
    if bias.probability > 0.0 && rng.gen::<f64>() < bias.probability {
        let bound = bias.short_bound(p);
        rng.gen_biguint_below(&bound)
    } else {
        rng.gen_biguint_below(p)
    }
}
