//! Prime field helpers over `BigUint`
//!
//! Values are taken modulo `p` on entry; every result lies in `[0, p)`.

use num_bigint::BigUint;
use num_traits::{One, Zero};

use crate::error::ArithmeticError;

/// Primes used for trial division and as Miller-Rabin witnesses
const SMALL_PRIMES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// `k^(p-2) mod p`, the inverse of `k` when `p` is prime
pub fn mod_inverse(k: &BigUint, p: &BigUint) -> Result<BigUint, ArithmeticError> {
    let k = k % p;
    if k.is_zero() {
        return Err(ArithmeticError::ZeroDivisor);
    }
    let exponent = p - BigUint::from(2u32);
    Ok(k.modpow(&exponent, p))
}

/// `(a - b) mod p` without leaving the unsigned domain
pub fn mod_sub(a: &BigUint, b: &BigUint, p: &BigUint) -> BigUint {
    ((a % p) + p - (b % p)) % p
}

/// Euler criterion: `n^((p-1)/2) mod p == 1`
///
/// Zero is not reported as a square.
pub fn is_square(n: &BigUint, p: &BigUint) -> bool {
    let exponent = (p - BigUint::one()) >> 1usize;
    n.modpow(&exponent, p).is_one()
}

/// `n^((p+1)/4) mod p`
///
/// Only valid for `p ≡ 3 (mod 4)`; other moduli are rejected.
pub fn sqrt_mod(n: &BigUint, p: &BigUint) -> Result<BigUint, ArithmeticError> {
    check_sqrt_modulus(p)?;
    let exponent = (p + BigUint::one()) >> 2usize;
    Ok(n.modpow(&exponent, p))
}

/// Reject moduli the square-root shortcut does not cover
pub fn check_sqrt_modulus(p: &BigUint) -> Result<(), ArithmeticError> {
    if p % BigUint::from(4u32) != BigUint::from(3u32) {
        return Err(ArithmeticError::CurvePreconditionViolated(format!(
            "field prime {} is not 3 mod 4",
            p
        )));
    }
    Ok(())
}

/// Trial division by small primes followed by Miller-Rabin with fixed witnesses.
///
/// Deterministic below ~3.3 * 10^24, probabilistic above.
pub fn is_probable_prime(n: &BigUint) -> bool {
    if n < &BigUint::from(2u32) {
        return false;
    }

    for &small in SMALL_PRIMES.iter() {
        let small = BigUint::from(small);
        if n == &small {
            return true;
        }
        if (n % &small).is_zero() {
            return false;
        }
    }

    let n_minus_one = n - BigUint::one();
    let s = n_minus_one.trailing_zeros().unwrap_or(0) as usize;
    let d = &n_minus_one >> s;

    'witness: for &base in SMALL_PRIMES.iter() {
        let mut x = BigUint::from(base).modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..s {
            x = (&x * &x) % n;
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}
