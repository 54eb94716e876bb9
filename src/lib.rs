//! blindset: blinded bucket membership queries across four roles
//!
//! [`Deployment`] wires the owner, client, intermediary and server together in
//! one process. Roles only see each other through keyed stores and sealed
//! tokens:
//!
//! | Store | Key | Written by | Read by |
//! |-------|-----|------------|---------|
//! | universe | index | owner | client |
//! | lookup | index | owner | intermediary |
//! | buckets | bucket id | owner | server |
//! | digests | bucket id | owner | client (verifier) |

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use blindset_client::{ClientSession, Verdict};
use blindset_core::{
    AggregateResult, BucketDigests, ConfigError, CurveParams, Error, KeyedStore, MemoryStore, Point,
    ProtocolConfig, QueryToken, RecordError, RecordFailure, ResponseArray, RevealValue,
    ScalarBias, Slot, SlotRef, TokenKey, Universe, WorkerPool,
};
use blindset_intermediary::{NonceSource, Responder};
use blindset_owner::{SetupOutput, SetupParams};
use blindset_server::Aggregator;
use rand::{CryptoRng, Rng};
use serde::{Serialize, Serializer};

pub type Result<T> = std::result::Result<T, Error>;

type Store<V> = Arc<MemoryStore<u64, V>>;

/// Which role dropped a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Intermediary,
    Server,
}

/// A probe that produced no verdict
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedProbe {
    pub probe: u64,
    pub phase: Phase,
    pub record: usize,
    #[serde(serialize_with = "serialize_display")]
    pub reason: RecordError,
}

fn serialize_display<S: Serializer>(
    value: &RecordError,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Everything produced for one answered probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryOutcome {
    pub record: usize,
    pub probe: u64,
    pub responses: ResponseArray,
    pub reveal: RevealValue,
    pub aggregate: AggregateResult,
    pub verdict: Verdict,
}

/// Owner-side cost of a deployment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SetupStats {
    pub setup_time_ms: f64,
    /// JSON size of the published universe
    pub universe_bytes: usize,
    /// JSON size of the published digests
    pub digest_bytes: usize,
}

/// Wall time and JSON hand-off size of each phase of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub blind_time_ms: f64,
    /// Client to intermediary: blinded universe
    pub blinded_universe_bytes: usize,
    /// Client to intermediary: sealed query tokens
    pub query_token_bytes: usize,
    pub intermediary_time_ms: f64,
    /// Intermediary out: response arrays, routing tokens and reveal values
    pub response_bytes: usize,
    pub server_time_ms: f64,
    /// Server to verifier
    pub aggregate_bytes: usize,
    pub verify_time_ms: f64,
}

impl RunStats {
    pub fn total_time_ms(&self) -> f64 {
        self.blind_time_ms + self.intermediary_time_ms + self.server_time_ms + self.verify_time_ms
    }

    pub fn total_bytes(&self) -> usize {
        self.blinded_universe_bytes + self.query_token_bytes + self.response_bytes + self.aggregate_bytes
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryReport {
    pub outcomes: Vec<QueryOutcome>,
    pub skipped: Vec<SkippedProbe>,
    pub stats: RunStats,
}

impl QueryReport {
    pub fn outcome(&self, probe: u64) -> Option<&QueryOutcome> {
        self.outcomes.iter().find(|o| o.probe == probe)
    }
}

/// One in-process deployment of all roles
pub struct Deployment {
    curve: CurveParams,
    pool: Arc<WorkerPool>,
    client_bias: ScalarBias,
    universe: Store<Point>,
    digests: Store<Point>,
    responder: Responder<Store<SlotRef>>,
    aggregator: Aggregator<Store<Vec<Slot>>>,
    client_key: TokenKey,
    setup_stats: SetupStats,
}

/// Size of `value` as a JSON artifact
fn json_len<T: Serialize + ?Sized>(value: &T) -> Result<usize> {
    let bytes = serde_json::to_vec(value).map_err(ConfigError::Json)?;
    Ok(bytes.len())
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

impl Deployment {
    /// Generate a fresh deployment from a validated config
    pub fn provision<R: Rng + CryptoRng>(config: &ProtocolConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let curve = config.curve.params()?;
        let pool = Arc::new(WorkerPool::new(config.workers)?);

        let params = SetupParams {
            dataset_size: config.dataset_size,
            bucket_count: config.bucket_count,
            bias: config.setup_bias,
        };
        let setup = blindset_owner::run_setup(&curve, &pool, &params, rng)?;

        Self::from_setup(
            curve,
            pool,
            setup,
            config.client_bias,
            NonceSource::Sampled(config.nonce_bias),
            rng,
        )
    }

    /// Publish a finished setup and provision the role keys
    pub fn from_setup<R: Rng + CryptoRng>(
        curve: CurveParams,
        pool: Arc<WorkerPool>,
        setup: SetupOutput,
        client_bias: ScalarBias,
        nonce: NonceSource,
        rng: &mut R,
    ) -> Result<Self> {
        let setup_stats = SetupStats {
            setup_time_ms: setup.setup_time_ms,
            universe_bytes: json_len(&setup.universe)?,
            digest_bytes: json_len(&setup.digests)?,
        };

        let universe: Store<Point> = Arc::default();
        let lookup: Store<SlotRef> = Arc::default();
        let buckets: Store<Vec<Slot>> = Arc::default();
        let digests: Store<Point> = Arc::default();
        setup.publish(&universe, &lookup, &buckets, &digests);

        let client_key = TokenKey::generate(rng);
        let server_key = TokenKey::generate(rng);

        let responder = Responder::new(
            curve.clone(),
            setup.blinding_scalar,
            lookup,
            Arc::clone(&pool),
            client_key.clone(),
            server_key.clone(),
        )
        .with_nonce(nonce);
        let aggregator = Aggregator::new(curve.clone(), buckets, Arc::clone(&pool), server_key);

        tracing::info!(
            universe = universe.len(),
            buckets = digests.len(),
            workers = pool.workers(),
            setup_time_ms = setup_stats.setup_time_ms,
            universe_bytes = setup_stats.universe_bytes,
            digest_bytes = setup_stats.digest_bytes,
            "Deployment ready"
        );

        Ok(Self {
            curve,
            pool,
            client_bias,
            universe,
            digests,
            responder,
            aggregator,
            client_key,
            setup_stats,
        })
    }

    pub fn curve(&self) -> &CurveParams {
        &self.curve
    }

    pub fn setup_stats(&self) -> &SetupStats {
        &self.setup_stats
    }

    /// Key shared by client and intermediary
    pub fn client_key(&self) -> &TokenKey {
        &self.client_key
    }

    /// Universe points in index order
    pub fn universe(&self) -> Universe {
        let points = self
            .universe
            .keys()
            .into_iter()
            .filter_map(|index| self.universe.get(&index))
            .collect();
        Universe::new(points)
    }

    /// Bucket digests in bucket order
    pub fn digests(&self) -> BucketDigests {
        self.digests
            .keys()
            .into_iter()
            .filter_map(|id| self.digests.get(&id).map(|digest| (id, digest)))
            .collect()
    }

    pub fn new_session<R: Rng + CryptoRng>(&self, rng: &mut R) -> ClientSession {
        ClientSession::new(&self.curve, &self.client_bias, rng)
    }

    /// Query one probe in its own session
    pub fn query<R: Rng + CryptoRng>(&self, probe: u64, rng: &mut R) -> Result<QueryReport> {
        self.query_many(&[probe], rng)
    }

    /// Query several probes under one client session
    pub fn query_many<R: Rng + CryptoRng>(
        &self,
        probes: &[u64],
        rng: &mut R,
    ) -> Result<QueryReport> {
        let session = self.new_session(rng);
        self.query_with(&session, probes, rng)
    }

    /// Query several probes under a caller-supplied session
    pub fn query_with<R: Rng + CryptoRng>(
        &self,
        session: &ClientSession,
        probes: &[u64],
        rng: &mut R,
    ) -> Result<QueryReport> {
        let mut requests = Vec::with_capacity(probes.len());
        for &probe in probes {
            requests.push((probe, session.query_token(&self.client_key, probe, rng)?));
        }
        self.run(session, &requests, rng)
    }

    /// Run already sealed `(probe, token)` requests through every role
    pub fn run<R: Rng + CryptoRng>(
        &self,
        session: &ClientSession,
        requests: &[(u64, QueryToken)],
        rng: &mut R,
    ) -> Result<QueryReport> {
        let universe = self.universe();
        let digests = self.digests();
        tracing::info!(
            probes = requests.len(),
            universe = universe.len(),
            "Running queries"
        );

        let mut report = QueryReport::default();

        // Client blind
        let start = Instant::now();
        let blinded = session.blind_universe(&self.curve, &self.pool, &universe)?;
        report.stats.blind_time_ms = elapsed_ms(start);
        report.stats.blinded_universe_bytes = json_len(&blinded)?;

        // Intermediary
        let tokens: Vec<QueryToken> = requests.iter().map(|(_, token)| token.clone()).collect();
        report.stats.query_token_bytes = json_len(&tokens)?;
        let start = Instant::now();
        let responded = self.responder.respond_batch(&blinded, &tokens, rng)?;
        report.stats.intermediary_time_ms = elapsed_ms(start);
        for (_, response) in &responded.completed {
            report.stats.response_bytes += json_len(&response.responses)?
                + json_len(&response.routing)?
                + json_len(&response.reveal)?;
        }

        let skip = |phase: Phase, failure: RecordFailure, records: &[usize]| SkippedProbe {
            probe: requests[records[failure.record]].0,
            phase,
            record: records[failure.record],
            reason: failure.reason,
        };

        let identity: Vec<usize> = (0..requests.len()).collect();
        for failure in responded.skipped {
            report.skipped.push(skip(Phase::Intermediary, failure, &identity));
        }

        // Server
        let answered: Vec<usize> = responded.completed.iter().map(|(record, _)| *record).collect();
        let start = Instant::now();
        let aggregated = self.aggregator.aggregate_batch(
            responded
                .completed
                .iter()
                .map(|(_, response)| (&response.routing, &response.responses)),
        )?;
        report.stats.server_time_ms = elapsed_ms(start);
        for failure in aggregated.skipped {
            report.skipped.push(skip(Phase::Server, failure, &answered));
        }

        // Verifier
        let start = Instant::now();
        for (server_record, aggregate) in aggregated.completed {
            let response = &responded.completed[server_record].1;
            let record = answered[server_record];
            report.stats.aggregate_bytes += json_len(&aggregate)?;
            let verdict = session.verify(&self.curve, &digests, &aggregate, &response.reveal)?;
            tracing::info!(
                record,
                decision = ?verdict.decision,
                matched_bucket = ?verdict.matched_bucket,
                "Query verified"
            );
            report.outcomes.push(QueryOutcome {
                record,
                probe: requests[record].0,
                responses: response.responses.clone(),
                reveal: response.reveal.clone(),
                aggregate,
                verdict,
            });
        }
        report.stats.verify_time_ms = elapsed_ms(start);

        let stats = &report.stats;
        tracing::info!(
            blind_time_ms = stats.blind_time_ms,
            intermediary_time_ms = stats.intermediary_time_ms,
            server_time_ms = stats.server_time_ms,
            verify_time_ms = stats.verify_time_ms,
            blinded_universe_bytes = stats.blinded_universe_bytes,
            query_token_bytes = stats.query_token_bytes,
            response_bytes = stats.response_bytes,
            aggregate_bytes = stats.aggregate_bytes,
            "Run complete"
        );

        report.skipped.sort_by_key(|skipped| skipped.record);
        Ok(report)
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deployment")
            .field("curve", &self.curve)
            .field("universe", &self.universe.len())
            .field("workers", &self.pool.workers())
            .finish_non_exhaustive()
    }
}
