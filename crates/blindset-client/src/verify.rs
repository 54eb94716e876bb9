//! Verifier phase
//!
//! Buckets are scanned in ascending id order. For each one the digest is
//! re-blinded with the session scalar `m` and compared against the aggregate:
//!
//! - `Match0` when `-aggregate == -(m * digest)`
//! - `Match1` when `-(m * digest) + aggregate == reveal`
//!
//! The scan stops at the first match.

use blindset_core::{
    AggregateResult, ArithmeticError, BigUint, BucketDigests, CurveParams, Decision,
    ProtocolError, RevealValue,
};
use serde::{Deserialize, Serialize};

/// Outcome for one examined bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCheck {
    pub bucket_id: u64,
    pub decision: Decision,
}

/// Terminal decision plus the per-bucket trail that led to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub matched_bucket: Option<u64>,
    pub checks: Vec<BucketCheck>,
}

impl Verdict {
    /// The recovered bit, or `Inconclusive` as an error
    pub fn bit(&self) -> Result<u8, ProtocolError> {
        self.decision.bit().ok_or(ProtocolError::Inconclusive {
            examined: self.checks.len(),
        })
    }
}

pub fn verify(
    curve: &CurveParams,
    m: &BigUint,
    digests: &BucketDigests,
    aggregate: &AggregateResult,
    reveal: &RevealValue,
) -> Result<Verdict, ArithmeticError> {
    let negated_aggregate = curve.negate(&aggregate.0);
    let mut checks = Vec::with_capacity(digests.len());

    for (bucket_id, digest) in digests.iter() {
        let blinded_digest = curve.scalar_multiply(m, digest)?;
        let negated_digest = curve.negate(&blinded_digest);

        let decision = if negated_aggregate == negated_digest {
            Decision::Match0
        } else if curve.add(&negated_digest, &aggregate.0)? == reveal.0 {
            Decision::Match1
        } else {
            Decision::Inconclusive
        };

        checks.push(BucketCheck {
            bucket_id,
            decision,
        });

        if decision.is_match() {
            tracing::debug!(bucket_id, ?decision, examined = checks.len(), "Verifier matched");
            return Ok(Verdict {
                decision,
                matched_bucket: Some(bucket_id),
                checks,
            });
        }
    }

    tracing::debug!(examined = checks.len(), "Verifier found no match");
    Ok(Verdict {
        decision: Decision::Inconclusive,
        matched_bucket: None,
        checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindset_core::Point;

    fn toy_curve() -> CurveParams {
        CurveParams::new(23u32.into(), 1u32.into(), 1u32.into()).unwrap()
    }

    fn toy_digests() -> BucketDigests {
        [(0, Point::Infinity), (1, Point::affine(5u32, 19u32))]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_match1_in_second_bucket() {
        let verdict = verify(
            &toy_curve(),
            &BigUint::from(5u32),
            &toy_digests(),
            &AggregateResult(Point::affine(7u32, 12u32)),
            &RevealValue(Point::affine(12u32, 4u32)),
        )
        .unwrap();

        assert_eq!(verdict.decision, Decision::Match1);
        assert_eq!(verdict.matched_bucket, Some(1));
        assert_eq!(
            verdict.checks,
            vec![
                BucketCheck {
                    bucket_id: 0,
                    decision: Decision::Inconclusive
                },
                BucketCheck {
                    bucket_id: 1,
                    decision: Decision::Match1
                },
            ]
        );
        assert_eq!(verdict.bit(), Ok(1));
    }

    #[test]
    fn test_match0_stops_at_first_bucket() {
        let verdict = verify(
            &toy_curve(),
            &BigUint::from(5u32),
            &toy_digests(),
            &AggregateResult(Point::Infinity),
            &RevealValue(Point::affine(12u32, 4u32)),
        )
        .unwrap();

        assert_eq!(verdict.decision, Decision::Match0);
        assert_eq!(verdict.matched_bucket, Some(0));
        assert_eq!(verdict.checks.len(), 1);
        assert_eq!(verdict.bit(), Ok(0));
    }

    #[test]
    fn test_inconclusive_after_all_buckets() {
        let verdict = verify(
            &toy_curve(),
            &BigUint::from(5u32),
            &toy_digests(),
            &AggregateResult(Point::affine(0u32, 1u32)),
            &RevealValue(Point::affine(3u32, 10u32)),
        )
        .unwrap();

        assert_eq!(verdict.decision, Decision::Inconclusive);
        assert_eq!(verdict.matched_bucket, None);
        assert_eq!(verdict.checks.len(), 2);
        assert_eq!(verdict.bit(), Err(ProtocolError::Inconclusive { examined: 2 }));
    }

    #[test]
    fn test_no_digests_is_inconclusive() {
        let verdict = verify(
            &toy_curve(),
            &BigUint::from(5u32),
            &BucketDigests::new(),
            &AggregateResult(Point::Infinity),
            &RevealValue(Point::Infinity),
        )
        .unwrap();
        assert_eq!(verdict.bit(), Err(ProtocolError::Inconclusive { examined: 0 }));
    }

    #[test]
    fn test_verdict_json() {
        let verdict = Verdict {
            decision: Decision::Match0,
            matched_bucket: Some(3),
            checks: vec![BucketCheck {
                bucket_id: 3,
                decision: Decision::Match0,
            }],
        };
        let json = serde_json::to_string(&verdict).unwrap();
        assert_eq!(
            json,
            r#"{"decision":"match0","matched_bucket":3,"checks":[{"bucket_id":3,"decision":"match0"}]}"#
        );
    }
}
