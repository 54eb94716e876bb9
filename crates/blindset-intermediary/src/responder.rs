//! Intermediary response state machine
//!
//! ```text
//! ReceiveToken -> Decrypt -> ResolveBucketPosition -> SampleNonce
//!              -> ComputeResponses -> Reencrypt -> Publish
//! ```
//!
//! Decrypt and lookup failures end the current record only. Response points are
//! computed as tagged tasks on the worker pool and scattered back by index.

use std::fmt;
use std::sync::Arc;

use blindset_core::artifacts::position_to_index;
use blindset_core::pool::place_by_index;
use blindset_core::{
    sample_scalar, BatchReport, BigUint, BlindedUniverse, CurveParams, Error, KeyedStore,
    LookupError, Point, PoolError, QueryToken, ResponseArray, RevealValue, ScalarBias, SlotRef,
    TokenKey, WorkerPool,
};
use rand::{CryptoRng, Rng};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ReceiveToken,
    Decrypt,
    ResolveBucketPosition,
    SampleNonce,
    ComputeResponses,
    Reencrypt,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::ReceiveToken => "receive_token",
            Stage::Decrypt => "decrypt",
            Stage::ResolveBucketPosition => "resolve_bucket_position",
            Stage::SampleNonce => "sample_nonce",
            Stage::ComputeResponses => "compute_responses",
            Stage::Reencrypt => "reencrypt",
            Stage::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Which scalar a task applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskRole {
    /// `r * BlindedUniverse[i]`, published
    Uniform,
    /// `(r + t) * BlindedUniverse[i]`, published
    Target,
    /// `t * BlindedUniverse[i]`, kept for the verifier
    Reveal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseTask {
    /// 1-based universe index
    pub index: u64,
    pub role: TaskRole,
}

impl ResponseTask {
    /// One published task per index plus the reveal task for `target`
    pub fn build(universe_len: usize, target: u64) -> Vec<ResponseTask> {
        let mut tasks: Vec<ResponseTask> = (1..=universe_len as u64)
            .map(|index| ResponseTask {
                index,
                role: if index == target {
                    TaskRole::Target
                } else {
                    TaskRole::Uniform
                },
            })
            .collect();
        tasks.push(ResponseTask {
            index: target,
            role: TaskRole::Reveal,
        });
        tasks
    }
}

/// Where the per-record nonce `t` comes from
#[derive(Debug, Clone, PartialEq)]
pub enum NonceSource {
    /// Fresh draw per record
    Sampled(ScalarBias),
    /// Same `t` for every record, for reproducible test deployments
    Fixed(BigUint),
}

impl NonceSource {
    fn draw<R: Rng + ?Sized>(&self, p: &BigUint, rng: &mut R) -> BigUint {
        match self {
            NonceSource::Sampled(bias) => sample_scalar(rng, p, bias),
            NonceSource::Fixed(t) => t.clone(),
        }
    }
}

impl Default for NonceSource {
    fn default() -> Self {
        NonceSource::Sampled(ScalarBias::nonce_default())
    }
}

/// Output of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Published to the server
    pub responses: ResponseArray,
    /// `bucket_id` sealed for the server
    pub routing: QueryToken,
    /// Routed to the verifier only
    pub reveal: RevealValue,
}

pub struct Responder<S> {
    curve: CurveParams,
    r: BigUint,
    lookup: S,
    pool: Arc<WorkerPool>,
    client_key: TokenKey,
    server_key: TokenKey,
    nonce: NonceSource,
}

impl<S: KeyedStore<u64, SlotRef>> Responder<S> {
    pub fn new(
        curve: CurveParams,
        r: BigUint,
        lookup: S,
        pool: Arc<WorkerPool>,
        client_key: TokenKey,
        server_key: TokenKey,
    ) -> Self {
        Self {
            curve,
            r,
            lookup,
            pool,
            client_key,
            server_key,
            nonce: NonceSource::default(),
        }
    }

    pub fn with_nonce(mut self, nonce: NonceSource) -> Self {
        self.nonce = nonce;
        self
    }

    fn enter(&self, stage: Stage) {
        tracing::trace!(%stage, "Intermediary stage");
    }

    /// Answer one query token with a nonce from the configured source
    pub fn respond<R: Rng + CryptoRng>(
        &self,
        blinded: &BlindedUniverse,
        token: &QueryToken,
        rng: &mut R,
    ) -> Result<Response, Error> {
        self.process(blinded, token, None, rng)
    }

    /// Answer one query token with a caller-chosen nonce `t`
    pub fn respond_with_nonce<R: Rng + CryptoRng>(
        &self,
        blinded: &BlindedUniverse,
        token: &QueryToken,
        t: BigUint,
        rng: &mut R,
    ) -> Result<Response, Error> {
        self.process(blinded, token, Some(t), rng)
    }

    /// Answer every token; crypto and lookup failures skip the record only
    pub fn respond_batch<R: Rng + CryptoRng>(
        &self,
        blinded: &BlindedUniverse,
        tokens: &[QueryToken],
        rng: &mut R,
    ) -> Result<BatchReport<Response>, Error> {
        let mut report = BatchReport::new();
        for (record, token) in tokens.iter().enumerate() {
            match self.respond(blinded, token, rng) {
                Ok(response) => report.push(record, Ok(response)),
                Err(e) => report.push(record, Err(e.into_record_error()?)),
            }
        }
        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            "Intermediary batch done"
        );
        Ok(report)
    }

    fn process<R: Rng + CryptoRng>(
        &self,
        blinded: &BlindedUniverse,
        token: &QueryToken,
        nonce: Option<BigUint>,
        rng: &mut R,
    ) -> Result<Response, Error> {
        self.enter(Stage::ReceiveToken);

        self.enter(Stage::Decrypt);
        let probe = self.client_key.decrypt(token)?;

        self.enter(Stage::ResolveBucketPosition);
        let slot_ref = self
            .lookup
            .get(&probe)
            .ok_or(LookupError::NotFound(probe))?;
        let target = position_to_index(slot_ref.position, blinded.len())
            .ok_or(LookupError::NotFound(probe))?;

        self.enter(Stage::SampleNonce);
        let t = match nonce {
            Some(t) => t,
            None => self.nonce.draw(self.curve.p(), rng),
        };

        self.enter(Stage::ComputeResponses);
        let tasks = ResponseTask::build(blinded.len(), target);
        let (responses, reveal) = self.run_tasks(blinded, &tasks, &t)?;

        self.enter(Stage::Reencrypt);
        let routing = self.server_key.encrypt(slot_ref.bucket_id, rng)?;

        self.enter(Stage::Publish);
        tracing::debug!(
            bucket_id = slot_ref.bucket_id,
            responses = responses.len(),
            "Response ready"
        );

        Ok(Response {
            responses,
            routing,
            reveal,
        })
    }

    /// Run tagged tasks in any order; published points land at their index
    pub fn run_tasks(
        &self,
        blinded: &BlindedUniverse,
        tasks: &[ResponseTask],
        t: &BigUint,
    ) -> Result<(ResponseArray, RevealValue), Error> {
        let r_plus_t = &self.r + t;
        let len = blinded.len();

        let outputs = self.pool.try_map(tasks, |task| {
            let scalar = match task.role {
                TaskRole::Uniform => &self.r,
                TaskRole::Target => &r_plus_t,
                TaskRole::Reveal => t,
            };
            let point = blinded
                .get(task.index)
                .ok_or(PoolError::IndexOutOfRange {
                    index: task.index as usize,
                    len,
                })?;
            Ok::<_, Error>((*task, self.curve.scalar_multiply(scalar, point)?))
        })?;

        let mut reveal: Option<Point> = None;
        let mut published = Vec::with_capacity(len);
        for (task, point) in outputs {
            match task.role {
                TaskRole::Reveal => {
                    if reveal.replace(point).is_some() {
                        return Err(PoolError::DuplicateIndex(task.index as usize).into());
                    }
                }
                TaskRole::Uniform | TaskRole::Target => {
                    published.push((task.index as usize - 1, point));
                }
            }
        }

        let reveal = reveal.ok_or(PoolError::MissingIndex(len))?;
        let responses = place_by_index(len, published)?;
        Ok((ResponseArray::new(responses), RevealValue(reveal)))
    }
}

impl<S> fmt::Debug for Responder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("curve", &self.curve)
            .field("workers", &self.pool.workers())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindset_core::{CryptoError, MemoryStore, RecordError};
    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    struct Fixture {
        responder: Responder<MemoryStore<u64, SlotRef>>,
        client_key: TokenKey,
        server_key: TokenKey,
        blinded: BlindedUniverse,
    }

    // p = 23, y^2 = x^3 + x + 1, r = 3, blinded with m = 5
    fn fixture(rng: &mut StdRng) -> Fixture {
        let curve = CurveParams::new(23u32.into(), 1u32.into(), 1u32.into()).unwrap();
        let lookup: MemoryStore<u64, SlotRef> = [
            (1, SlotRef { bucket_id: 1, position: 1 }),
            (2, SlotRef { bucket_id: 0, position: 1 }),
            (3, SlotRef { bucket_id: 1, position: 2 }),
            (4, SlotRef { bucket_id: 0, position: 2 }),
        ]
        .into_iter()
        .collect();
        let client_key = TokenKey::generate(rng);
        let server_key = TokenKey::generate(rng);
        let responder = Responder::new(
            curve,
            BigUint::from(3u32),
            lookup,
            Arc::new(WorkerPool::new(4).unwrap()),
            client_key.clone(),
            server_key.clone(),
        );
        let blinded = BlindedUniverse::new(vec![
            Point::affine(18u32, 3u32),
            Point::affine(0u32, 22u32),
            Point::affine(9u32, 16u32),
            Point::affine(19u32, 5u32),
        ]);
        Fixture {
            responder,
            client_key,
            server_key,
            blinded,
        }
    }

    #[test]
    fn test_build_tasks_tags_target_and_reveal() {
        let tasks = ResponseTask::build(4, 2);
        assert_eq!(tasks.len(), 5);
        assert_eq!(tasks[0].role, TaskRole::Uniform);
        assert_eq!(tasks[1], ResponseTask { index: 2, role: TaskRole::Target });
        assert_eq!(tasks[4], ResponseTask { index: 2, role: TaskRole::Reveal });
    }

    #[test]
    fn test_respond_first_position() {
        let mut rng = StdRng::seed_from_u64(31);
        let fx = fixture(&mut rng);
        let token = fx.client_key.encrypt(1, &mut rng).unwrap();

        let response = fx
            .responder
            .respond_with_nonce(&fx.blinded, &token, BigUint::from(2u32), &mut rng)
            .unwrap();

        assert_eq!(
            response.responses.points(),
            &[
                Point::affine(3u32, 10u32),
                Point::affine(3u32, 10u32),
                Point::affine(1u32, 16u32),
                Point::affine(0u32, 1u32),
            ]
        );
        assert_eq!(response.reveal, RevealValue(Point::affine(12u32, 4u32)));
        assert_eq!(fx.server_key.decrypt(&response.routing).unwrap(), 1);
    }

    #[test]
    fn test_respond_second_position() {
        let mut rng = StdRng::seed_from_u64(32);
        let fx = fixture(&mut rng);
        let token = fx.client_key.encrypt(4, &mut rng).unwrap();

        let response = fx
            .responder
            .respond_with_nonce(&fx.blinded, &token, BigUint::from(2u32), &mut rng)
            .unwrap();

        assert_eq!(
            response.responses.points(),
            &[
                Point::affine(9u32, 7u32),
                Point::affine(18u32, 20u32),
                Point::affine(1u32, 16u32),
                Point::affine(0u32, 1u32),
            ]
        );
        assert_eq!(response.reveal, RevealValue(Point::affine(6u32, 4u32)));
        assert_eq!(fx.server_key.decrypt(&response.routing).unwrap(), 0);
    }

    #[test]
    fn test_task_order_does_not_change_positions() {
        let mut rng = StdRng::seed_from_u64(33);
        let fx = fixture(&mut rng);
        let t = BigUint::from(2u32);

        let ordered = ResponseTask::build(4, 2);
        let mut reversed = ordered.clone();
        reversed.reverse();
        let mut shuffled = ordered.clone();
        shuffled.shuffle(&mut rng);

        let expected = fx.responder.run_tasks(&fx.blinded, &ordered, &t).unwrap();
        assert_eq!(fx.responder.run_tasks(&fx.blinded, &reversed, &t).unwrap(), expected);
        assert_eq!(fx.responder.run_tasks(&fx.blinded, &shuffled, &t).unwrap(), expected);
    }

    #[test]
    fn test_run_tasks_rejects_missing_index() {
        let mut rng = StdRng::seed_from_u64(34);
        let fx = fixture(&mut rng);
        let mut tasks = ResponseTask::build(4, 1);
        tasks.retain(|task| task.index != 3);

        let result = fx.responder.run_tasks(&fx.blinded, &tasks, &BigUint::from(2u32));
        assert!(matches!(result, Err(Error::Pool(PoolError::MissingIndex(2)))));
    }

    #[test]
    fn test_batch_isolates_corrupted_token() {
        let mut rng = StdRng::seed_from_u64(35);
        let fx = fixture(&mut rng);

        let mut tokens: Vec<QueryToken> = (0..10u64)
            .map(|i| fx.client_key.encrypt(i % 4 + 1, &mut rng).unwrap())
            .collect();
        let mut corrupted = tokens[6].as_bytes().to_vec();
        let last = corrupted.len() - 1;
        corrupted[last] ^= 0xff;
        tokens[6] = QueryToken::from_bytes(corrupted);

        let report = fx
            .responder
            .respond_batch(&fx.blinded, &tokens, &mut rng)
            .unwrap();

        assert_eq!(report.completed.len(), 9);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].record, 6);
        assert_eq!(
            report.skipped[0].reason,
            RecordError::Crypto(CryptoError::AuthenticationFailed)
        );
        let records: Vec<usize> = report.completed.iter().map(|(r, _)| *r).collect();
        assert_eq!(records, vec![0, 1, 2, 3, 4, 5, 7, 8, 9]);
    }

    #[test]
    fn test_batch_reports_lookup_miss() {
        let mut rng = StdRng::seed_from_u64(36);
        let fx = fixture(&mut rng);
        let tokens = vec![
            fx.client_key.encrypt(99, &mut rng).unwrap(),
            fx.client_key.encrypt(2, &mut rng).unwrap(),
        ];

        let report = fx
            .responder
            .respond_batch(&fx.blinded, &tokens, &mut rng)
            .unwrap();

        assert_eq!(report.completed.len(), 1);
        assert_eq!(
            report.skipped[0].reason,
            RecordError::Lookup(LookupError::NotFound(99))
        );
    }

    #[test]
    fn test_fixed_nonce_source_matches_explicit_nonce() {
        let mut rng = StdRng::seed_from_u64(38);
        let Fixture {
            responder,
            client_key,
            blinded,
            ..
        } = fixture(&mut rng);
        let responder = responder.with_nonce(NonceSource::Fixed(BigUint::from(2u32)));
        let tokens = vec![client_key.encrypt(3, &mut rng).unwrap()];

        let report = responder.respond_batch(&blinded, &tokens, &mut rng).unwrap();
        let (_, response) = &report.completed[0];
        assert_eq!(response.reveal, RevealValue(Point::affine(6u32, 4u32)));
    }

    #[test]
    fn test_sampled_nonce_stays_below_p() {
        let mut rng = StdRng::seed_from_u64(39);
        let source = NonceSource::default();
        let p = BigUint::from(23u32);
        for _ in 0..50 {
            assert!(source.draw(&p, &mut rng) < p);
        }
    }

    #[test]
    fn test_token_for_other_role_is_rejected() {
        let mut rng = StdRng::seed_from_u64(37);
        let fx = fixture(&mut rng);
        let token = fx.server_key.encrypt(1, &mut rng).unwrap();
        let result = fx.responder.respond(&fx.blinded, &token, &mut rng);
        assert!(matches!(
            result,
            Err(Error::Crypto(CryptoError::AuthenticationFailed))
        ));
    }
}
