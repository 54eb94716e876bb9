//! Short-Weierstrass curve arithmetic: `y^2 = x^3 + a*x + b (mod p)`
//!
//! Points are affine with an explicit identity. Every addition path handles the
//! identity-producing cases (`Q = -P`, doubling a point with `y = 0`) before a
//! modular inverse is taken, so a well-formed point never hits
//! [`ArithmeticError::ZeroDivisor`].

use std::fmt;

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ArithmeticError;
use crate::field::{check_sqrt_modulus, is_probable_prime, is_square, mod_inverse, mod_sub, sqrt_mod};

/// Random `x` draws before `random_point` falls back to a scan
pub const RANDOM_POINT_ATTEMPTS: usize = 64;

/// secp256k1 field prime
const SECP256K1_P: [u8; 32] = [
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE, 0xFF, 0xFF, 0xFC, 0x2F,
];

/// secp256k1 generator x coordinate
const SECP256K1_GX: [u8; 32] = [
    0x79, 0xBE, 0x66, 0x7E, 0xF9, 0xDC, 0xBB, 0xAC, 0x55, 0xA0, 0x62, 0x95, 0xCE, 0x87, 0x0B, 0x07,
    0x02, 0x9B, 0xFC, 0xDB, 0x2D, 0xCE, 0x28, 0xD9, 0x59, 0xF2, 0x81, 0x5B, 0x16, 0xF8, 0x17, 0x98,
];

/// secp256k1 generator y coordinate
const SECP256K1_GY: [u8; 32] = [
    0x48, 0x3A, 0xDA, 0x77, 0x26, 0xA3, 0xC4, 0x65, 0x5D, 0xA4, 0xFB, 0xFC, 0x0E, 0x11, 0x08, 0xA8,
    0xFD, 0x17, 0xB4, 0x48, 0xA6, 0x85, 0x54, 0x19, 0x9C, 0x47, 0xD0, 0x8F, 0xFB, 0x10, 0xD4, 0xB8,
];

/// A curve point or the group identity
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "WirePoint", try_from = "WirePoint")]
pub enum Point {
    Infinity,
    Affine { x: BigUint, y: BigUint },
}

impl Point {
    pub fn affine(x: impl Into<BigUint>, y: impl Into<BigUint>) -> Self {
        Point::Affine {
            x: x.into(),
            y: y.into(),
        }
    }

    pub fn is_infinity(&self) -> bool {
        matches!(self, Point::Infinity)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Point::Infinity => write!(f, "Infinity"),
            Point::Affine { x, y } => write!(f, "({:x}, {:x})", x, y),
        }
    }
}

/// Serialized point: two hex coordinates or an explicit identity marker
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum WirePoint {
    Infinity,
    Affine { x: String, y: String },
}

impl From<Point> for WirePoint {
    fn from(point: Point) -> Self {
        match point {
            Point::Infinity => WirePoint::Infinity,
            Point::Affine { x, y } => WirePoint::Affine {
                x: format!("{:x}", x),
                y: format!("{:x}", y),
            },
        }
    }
}

impl TryFrom<WirePoint> for Point {
    type Error = String;

    fn try_from(wire: WirePoint) -> Result<Self, Self::Error> {
        match wire {
            WirePoint::Infinity => Ok(Point::Infinity),
            WirePoint::Affine { x, y } => {
                let parse = |s: &str| {
                    BigUint::parse_bytes(s.as_bytes(), 16)
                        .ok_or_else(|| format!("invalid hex coordinate: {:?}", s))
                };
                Ok(Point::Affine {
                    x: parse(&x)?,
                    y: parse(&y)?,
                })
            }
        }
    }
}

/// Curve constants `(p, a, b)`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurveParams {
    p: BigUint,
    a: BigUint,
    b: BigUint,
}

impl CurveParams {
    /// Validate and build a curve.
    ///
    /// `p` must be prime and `≡ 3 (mod 4)` so that points can be sampled with
    /// the square-root shortcut.
    pub fn new(p: BigUint, a: BigUint, b: BigUint) -> Result<Self, ArithmeticError> {
        if !is_probable_prime(&p) {
            return Err(ArithmeticError::CurvePreconditionViolated(format!(
                "field modulus {} is not prime",
                p
            )));
        }
        check_sqrt_modulus(&p)?;
        let a = a % &p;
        let b = b % &p;
        Ok(Self { p, a, b })
    }

    /// secp256k1: `y^2 = x^3 + 7`
    pub fn secp256k1() -> Self {
        Self {
            p: BigUint::from_bytes_be(&SECP256K1_P),
            a: BigUint::zero(),
            b: BigUint::from(7u32),
        }
    }

    /// Standard secp256k1 base point
    pub fn secp256k1_generator() -> Point {
        Point::Affine {
            x: BigUint::from_bytes_be(&SECP256K1_GX),
            y: BigUint::from_bytes_be(&SECP256K1_GY),
        }
    }

    pub fn p(&self) -> &BigUint {
        &self.p
    }

    pub fn a(&self) -> &BigUint {
        &self.a
    }

    pub fn b(&self) -> &BigUint {
        &self.b
    }

    /// `x^3 + a*x + b mod p`
    fn rhs(&self, x: &BigUint) -> BigUint {
        (x * x * x + &self.a * x + &self.b) % &self.p
    }

    /// Curve equation check; the identity is always on the curve
    pub fn contains(&self, point: &Point) -> bool {
        match point {
            Point::Infinity => true,
            Point::Affine { x, y } => {
                x < &self.p && y < &self.p && (y * y) % &self.p == self.rhs(x)
            }
        }
    }

    pub fn negate(&self, point: &Point) -> Point {
        match point {
            Point::Infinity => Point::Infinity,
            Point::Affine { x, y } => Point::Affine {
                x: x.clone(),
                y: mod_sub(&BigUint::zero(), y, &self.p),
            },
        }
    }

    /// Group law
    pub fn add(&self, lhs: &Point, rhs: &Point) -> Result<Point, ArithmeticError> {
        let (x1, y1, x2, y2) = match (lhs, rhs) {
            (Point::Infinity, q) => return Ok(q.clone()),
            (p, Point::Infinity) => return Ok(p.clone()),
            (Point::Affine { x: x1, y: y1 }, Point::Affine { x: x2, y: y2 }) => (x1, y1, x2, y2),
        };
        let p = &self.p;

        let slope = if x1 == x2 && y1 == y2 {
            if y1.is_zero() {
                return Ok(Point::Infinity);
            }
            let numerator = (BigUint::from(3u32) * x1 * x1 + &self.a) % p;
            let denominator = (BigUint::from(2u32) * y1) % p;
            (numerator * mod_inverse(&denominator, p)?) % p
        } else {
            if x1 == x2 {
                // Q = -P
                return Ok(Point::Infinity);
            }
            let numerator = mod_sub(y2, y1, p);
            let denominator = mod_sub(x2, x1, p);
            (numerator * mod_inverse(&denominator, p)?) % p
        };

        let x3 = mod_sub(&mod_sub(&(&slope * &slope), x1, p), x2, p);
        let y3 = mod_sub(&((&slope * mod_sub(x1, &x3, p)) % p), y1, p);
        Ok(Point::Affine { x: x3, y: y3 })
    }

    pub fn double(&self, point: &Point) -> Result<Point, ArithmeticError> {
        self.add(point, point)
    }

    /// Double-and-add from the least significant bit.
    ///
    /// `k` is used as a plain integer; it is never reduced modulo the group order.
    pub fn scalar_multiply(&self, k: &BigUint, point: &Point) -> Result<Point, ArithmeticError> {
        if k.is_zero() {
            return Ok(Point::Infinity);
        }
        if k.is_one() {
            return Ok(point.clone());
        }

        let mut acc = Point::Infinity;
        let mut addend = point.clone();
        let bits = k.bits();
        for i in 0..bits {
            if k.bit(i) {
                acc = if acc.is_infinity() {
                    addend.clone()
                } else {
                    self.add(&acc, &addend)?
                };
            }
            if i + 1 < bits {
                addend = self.double(&addend)?;
            }
        }
        Ok(acc)
    }

    /// Fold points with `add`, seeded at the identity
    pub fn sum<'a, I>(&self, points: I) -> Result<Point, ArithmeticError>
    where
        I: IntoIterator<Item = &'a Point>,
    {
        points
            .into_iter()
            .try_fold(Point::Infinity, |acc, point| self.add(&acc, point))
    }

    /// Sample `x` from `[1, p)` until the right-hand side is a non-zero square.
    ///
    /// After [`RANDOM_POINT_ATTEMPTS`] misses, scans `x` upward from 1 instead. Fails when
    /// the curve has no affine point with `y != 0`.
    pub fn random_point<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Point, ArithmeticError> {
        let one = BigUint::one();
        for _ in 0..RANDOM_POINT_ATTEMPTS {
            let x = rng.gen_biguint_range(&one, &self.p);
            if let Some(point) = self.lift_x(x)? {
                return Ok(point);
            }
        }

        let mut x = one;
        while x < self.p {
            if let Some(point) = self.lift_x(x.clone())? {
                return Ok(point);
            }
            x += 1u32;
        }
        Err(ArithmeticError::CurvePreconditionViolated(
            "curve has no point with non-zero y".into(),
        ))
    }

    fn lift_x(&self, x: BigUint) -> Result<Option<Point>, ArithmeticError> {
        let y_squared = self.rhs(&x);
        if !is_square(&y_squared, &self.p) {
            return Ok(None);
        }
        let y = sqrt_mod(&y_squared, &self.p)?;
        Ok(Some(Point::Affine { x, y }))
    }
}
