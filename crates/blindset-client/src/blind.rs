//! Client blind phase

use std::fmt;

use blindset_core::{
    sample_scalar, AggregateResult, ArithmeticError, BigUint, BlindedUniverse, BucketDigests,
    CryptoError, CurveParams, QueryToken, RevealValue, ScalarBias, TokenKey, Universe,
    WorkerPool,
};
use rand::{CryptoRng, Rng};

use crate::verify::{verify, Verdict};

/// One client session, holding the secret scalar `m`
pub struct ClientSession {
    m: BigUint,
}

impl ClientSession {
    pub fn new<R: Rng + CryptoRng>(curve: &CurveParams, bias: &ScalarBias, rng: &mut R) -> Self {
        Self {
            m: sample_scalar(rng, curve.p(), bias),
        }
    }

    /// Session with a caller-chosen `m`
    pub fn with_secret(m: BigUint) -> Self {
        Self { m }
    }

    pub fn secret(&self) -> &BigUint {
        &self.m
    }

    /// `m * UniversePoint[i]` for every index, in index order
    pub fn blind_universe(
        &self,
        curve: &CurveParams,
        pool: &WorkerPool,
        universe: &Universe,
    ) -> Result<BlindedUniverse, ArithmeticError> {
        let points = pool.try_map(universe.points(), |point| {
            curve.scalar_multiply(&self.m, point)
        })?;
        tracing::debug!(points = points.len(), "Blinded universe");
        Ok(BlindedUniverse::new(points))
    }

    /// Seal the probe index for the intermediary
    pub fn query_token<R: Rng + CryptoRng>(
        &self,
        key: &TokenKey,
        probe: u64,
        rng: &mut R,
    ) -> Result<QueryToken, CryptoError> {
        key.encrypt(probe, rng)
    }

    pub fn verify(
        &self,
        curve: &CurveParams,
        digests: &BucketDigests,
        aggregate: &AggregateResult,
        reveal: &RevealValue,
    ) -> Result<Verdict, ArithmeticError> {
        verify(curve, &self.m, digests, aggregate, reveal)
    }
}

impl fmt::Debug for ClientSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientSession").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindset_core::Point;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_curve() -> CurveParams {
        CurveParams::new(23u32.into(), 1u32.into(), 1u32.into()).unwrap()
    }

    #[test]
    fn test_blind_small_universe() {
        let session = ClientSession::with_secret(BigUint::from(5u32));
        let universe = Universe::new(vec![
            Point::affine(0u32, 1u32),
            Point::affine(1u32, 16u32),
            Point::affine(3u32, 10u32),
            Point::affine(9u32, 7u32),
        ]);
        let blinded = session
            .blind_universe(&toy_curve(), &WorkerPool::new(3).unwrap(), &universe)
            .unwrap();
        assert_eq!(
            blinded.points(),
            &[
                Point::affine(18u32, 3u32),
                Point::affine(0u32, 22u32),
                Point::affine(9u32, 16u32),
                Point::affine(19u32, 5u32),
            ]
        );
    }

    #[test]
    fn test_session_scalar_respects_bias() {
        let curve = CurveParams::secp256k1();
        let bias = ScalarBias::client_default();
        let bound = bias.short_bound(curve.p());
        let mut rng = StdRng::seed_from_u64(21);
        for _ in 0..10 {
            assert!(ClientSession::new(&curve, &bias, &mut rng).secret() < &bound);
        }
    }

    #[test]
    fn test_query_token_opens_with_shared_key() {
        let mut rng = StdRng::seed_from_u64(22);
        let key = TokenKey::generate(&mut rng);
        let session = ClientSession::with_secret(BigUint::from(5u32));
        let token = session.query_token(&key, 17, &mut rng).unwrap();
        assert_eq!(key.decrypt(&token).unwrap(), 17);
    }

    #[test]
    fn test_debug_hides_secret() {
        let session = ClientSession::with_secret(BigUint::from(123456789u32));
        assert!(!format!("{:?}", session).contains("123456789"));
    }
}
