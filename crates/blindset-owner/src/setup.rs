//! Setup phase
//!
//! ```text
//! universe (N points) ──┐
//! bits (N)  ── buckets ─┼── r * U[i] (parallel) ── digests per bucket (parallel)
//! r ────────────────────┘
//! ```

use std::collections::HashSet;
use std::fmt;
use std::time::Instant;

use blindset_core::artifacts::BlindedUniverse;
use blindset_core::{
    distribute_entries, sample_scalar, ArithmeticError, BigUint, BucketDigests, BucketTable,
    ConfigError, CurveParams, DatasetEntry, Error, KeyedStore, Point, ScalarBias, Slot, SlotRef,
    Universe, WorkerPool,
};
use rand::{CryptoRng, Rng};

/// Sizes and sampling knobs for a generated deployment
#[derive(Debug, Clone, PartialEq)]
pub struct SetupParams {
    pub dataset_size: usize,
    pub bucket_count: usize,
    pub bias: ScalarBias,
}

/// Everything the owner hands off after setup
pub struct SetupOutput {
    pub universe: Universe,
    pub table: BucketTable,
    pub digests: BucketDigests,
    /// Global blinding scalar `r`, shared with the intermediary only
    pub blinding_scalar: BigUint,
    /// Owner compute time: distribution, blinded base and digests
    pub setup_time_ms: f64,
}

impl fmt::Debug for SetupOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupOutput")
            .field("universe", &self.universe.len())
            .field("buckets", &self.table.num_buckets())
            .field("slot_len", &self.table.slot_len())
            .field("digests", &self.digests.len())
            .field("setup_time_ms", &self.setup_time_ms)
            .finish_non_exhaustive()
    }
}

impl SetupOutput {
    /// Write the hand-off views into the role stores
    pub fn publish<U, L, B, D>(&self, universe: &U, lookup: &L, buckets: &B, digests: &D)
    where
        U: KeyedStore<u64, Point> + ?Sized,
        L: KeyedStore<u64, SlotRef> + ?Sized,
        B: KeyedStore<u64, Vec<Slot>> + ?Sized,
        D: KeyedStore<u64, Point> + ?Sized,
    {
        for (index, point) in self.universe.iter() {
            universe.put(index, point.clone());
        }
        self.table.publish_lookup(lookup);
        self.table.publish_buckets(buckets);
        for (bucket_id, digest) in self.digests.iter() {
            digests.put(bucket_id, digest.clone());
        }
    }
}

/// Sample `n` points on the curve, assigned to indices `1..=n` in draw order
pub fn generate_universe<R: Rng + ?Sized>(
    curve: &CurveParams,
    n: usize,
    rng: &mut R,
) -> Result<Universe, ArithmeticError> {
    let points = (0..n)
        .map(|_| curve.random_point(rng))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Universe::new(points))
}

/// Placeholder workload: one uniform bit per index
pub fn generate_entries<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Vec<DatasetEntry> {
    (1..=n as u64)
        .map(|index| DatasetEntry::new(index, rng.gen_range(0..=1)))
        .collect()
}

/// `r * UniversePoint[i]` for every index
pub fn compute_blinded_base(
    curve: &CurveParams,
    pool: &WorkerPool,
    r: &BigUint,
    universe: &Universe,
) -> Result<BlindedUniverse, ArithmeticError> {
    let points = pool.try_map(universe.points(), |point| curve.scalar_multiply(r, point))?;
    Ok(BlindedUniverse::new(points))
}

/// Fold `bit * BlindedBase[position]` over each bucket, one bucket per job
pub fn compute_digests(
    curve: &CurveParams,
    pool: &WorkerPool,
    table: &BucketTable,
    blinded_base: &BlindedUniverse,
) -> Result<BucketDigests, ArithmeticError> {
    let buckets: Vec<(u64, &[Slot])> = table.iter().collect();

    let digests = pool.try_map(&buckets, |(bucket_id, slots)| {
        let mut digest = Point::Infinity;
        for (offset, slot) in slots.iter().enumerate() {
            let Some(base) = blinded_base.position_point(offset as u64 + 1) else {
                continue;
            };
            let term = curve.scalar_multiply(&BigUint::from(slot.bit), base)?;
            digest = curve.add(&digest, &term)?;
        }
        Ok::<_, ArithmeticError>((*bucket_id, digest))
    })?;

    Ok(digests.into_iter().collect())
}

/// Full setup with freshly generated universe, bits and `r`
pub fn run_setup<R: Rng + CryptoRng>(
    curve: &CurveParams,
    pool: &WorkerPool,
    params: &SetupParams,
    rng: &mut R,
) -> Result<SetupOutput, Error> {
    tracing::info!(
        dataset_size = params.dataset_size,
        bucket_count = params.bucket_count,
        "Generating universe"
    );
    let universe = generate_universe(curve, params.dataset_size, rng)?;
    let entries = generate_entries(params.dataset_size, rng);
    let r = sample_scalar(rng, curve.p(), &params.bias);
    run_setup_with(curve, pool, universe, &entries, params.bucket_count, r)
}

/// Every entry must name a distinct universe index in `[1, N]` and carry a 0/1 bit
pub fn validate_entries(entries: &[DatasetEntry], universe_len: usize) -> Result<(), ConfigError> {
    let mut seen = HashSet::with_capacity(entries.len());
    for entry in entries {
        if entry.index == 0 || entry.index > universe_len as u64 {
            return Err(ConfigError::Invalid(format!(
                "entry index {} outside universe [1, {}]",
                entry.index, universe_len
            )));
        }
        if entry.bit > 1 {
            return Err(ConfigError::Invalid(format!(
                "entry {} has bit {}, expected 0 or 1",
                entry.index, entry.bit
            )));
        }
        if !seen.insert(entry.index) {
            return Err(ConfigError::Invalid(format!(
                "duplicate entry index {}",
                entry.index
            )));
        }
    }
    Ok(())
}

/// Setup from caller-supplied universe, entries and `r`
pub fn run_setup_with(
    curve: &CurveParams,
    pool: &WorkerPool,
    universe: Universe,
    entries: &[DatasetEntry],
    bucket_count: usize,
    r: BigUint,
) -> Result<SetupOutput, Error> {
    let start = Instant::now();
    validate_entries(entries, universe.len())?;
    let table = distribute_entries(entries, bucket_count)
        .ok_or_else(|| ConfigError::Invalid("bucket_count must be at least 1".into()))?;

    let blinded_base = compute_blinded_base(curve, pool, &r, &universe)?;
    let digests = compute_digests(curve, pool, &table, &blinded_base)?;
    let setup_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    tracing::info!(
        universe = universe.len(),
        buckets = table.num_buckets(),
        slot_len = table.slot_len(),
        setup_time_ms,
        "Setup complete"
    );

    Ok(SetupOutput {
        universe,
        table,
        digests,
        blinding_scalar: r,
        setup_time_ms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use blindset_core::MemoryStore;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn toy_curve() -> CurveParams {
        CurveParams::new(23u32.into(), 1u32.into(), 1u32.into()).unwrap()
    }

    fn toy_universe() -> Universe {
        Universe::new(vec![
            Point::affine(0u32, 1u32),
            Point::affine(1u32, 16u32),
            Point::affine(3u32, 10u32),
            Point::affine(9u32, 7u32),
        ])
    }

    fn toy_entries() -> Vec<DatasetEntry> {
        [1u8, 0, 1, 0]
            .iter()
            .enumerate()
            .map(|(i, &bit)| DatasetEntry::new(i as u64 + 1, bit))
            .collect()
    }

    #[test]
    fn test_blinded_base_small_curve() {
        let pool = WorkerPool::new(2).unwrap();
        let base = compute_blinded_base(&toy_curve(), &pool, &BigUint::from(3u32), &toy_universe())
            .unwrap();
        assert_eq!(
            base.points(),
            &[
                Point::affine(3u32, 13u32),
                Point::affine(18u32, 3u32),
                Point::affine(19u32, 5u32),
                Point::affine(1u32, 7u32),
            ]
        );
    }

    #[test]
    fn test_digests_small_curve() {
        let pool = WorkerPool::new(2).unwrap();
        let output = run_setup_with(
            &toy_curve(),
            &pool,
            toy_universe(),
            &toy_entries(),
            2,
            BigUint::from(3u32),
        )
        .unwrap();

        assert_eq!(output.table.slot_len(), 2);
        assert_eq!(output.digests.get(0), Some(&Point::Infinity));
        assert_eq!(output.digests.get(1), Some(&Point::affine(5u32, 19u32)));
    }

    #[test]
    fn test_zero_buckets_is_config_error() {
        let pool = WorkerPool::new(1).unwrap();
        let result = run_setup_with(
            &toy_curve(),
            &pool,
            toy_universe(),
            &toy_entries(),
            0,
            BigUint::from(3u32),
        );
        assert!(matches!(result, Err(Error::Config(ConfigError::Invalid(_)))));
    }

    #[test]
    fn test_out_of_domain_entries_rejected() {
        let pool = WorkerPool::new(1).unwrap();
        let cases = [
            vec![DatasetEntry::new(0, 1), DatasetEntry::new(2, 0)],
            vec![DatasetEntry::new(1, 1), DatasetEntry::new(5, 0)],
            vec![DatasetEntry::new(1, 2), DatasetEntry::new(2, 0)],
            vec![DatasetEntry::new(3, 1), DatasetEntry::new(3, 0)],
        ];
        for entries in cases {
            let result = run_setup_with(
                &toy_curve(),
                &pool,
                toy_universe(),
                &entries,
                2,
                BigUint::from(3u32),
            );
            assert!(
                matches!(result, Err(Error::Config(ConfigError::Invalid(_)))),
                "{:?}",
                entries
            );
        }
    }

    #[test]
    fn test_partial_entries_accepted() {
        let entries = [DatasetEntry::new(4, 1), DatasetEntry::new(2, 0)];
        assert!(validate_entries(&entries, 4).is_ok());
    }

    #[test]
    fn test_generated_universe_on_curve() {
        let curve = CurveParams::secp256k1();
        let mut rng = StdRng::seed_from_u64(3);
        let universe = generate_universe(&curve, 6, &mut rng).unwrap();
        assert_eq!(universe.len(), 6);
        assert!(universe.points().iter().all(|p| curve.contains(p)));
    }

    #[test]
    fn test_generated_entries_cover_indices() {
        let mut rng = StdRng::seed_from_u64(4);
        let entries = generate_entries(25, &mut rng);
        let indices: Vec<u64> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, (1..=25).collect::<Vec<_>>());
        assert!(entries.iter().all(|e| e.bit <= 1));
    }

    #[test]
    fn test_digest_is_independent_of_pool_size() {
        let curve = toy_curve();
        let mut rng = StdRng::seed_from_u64(5);
        let universe = generate_universe(&curve, 12, &mut rng).unwrap();
        let entries = generate_entries(12, &mut rng);

        let one = run_setup_with(
            &curve,
            &WorkerPool::new(1).unwrap(),
            universe.clone(),
            &entries,
            5,
            BigUint::from(7u32),
        )
        .unwrap();
        let many = run_setup_with(
            &curve,
            &WorkerPool::new(8).unwrap(),
            universe,
            &entries,
            5,
            BigUint::from(7u32),
        )
        .unwrap();
        assert_eq!(one.digests, many.digests);
    }

    #[test]
    fn test_publish_views() {
        let pool = WorkerPool::new(2).unwrap();
        let mut rng = StdRng::seed_from_u64(6);
        let params = SetupParams {
            dataset_size: 9,
            bucket_count: 3,
            bias: ScalarBias::setup_default(),
        };
        let output = run_setup(&toy_curve(), &pool, &params, &mut rng).unwrap();

        let universe: MemoryStore<u64, Point> = MemoryStore::new();
        let lookup: MemoryStore<u64, SlotRef> = MemoryStore::new();
        let buckets: MemoryStore<u64, Vec<Slot>> = MemoryStore::new();
        let digests: MemoryStore<u64, Point> = MemoryStore::new();
        output.publish(&universe, &lookup, &buckets, &digests);

        assert_eq!(universe.len(), 9);
        assert_eq!(lookup.len(), 9);
        assert_eq!(buckets.keys(), vec![0, 1, 2]);
        assert_eq!(digests.keys(), vec![0, 1, 2]);
        assert_eq!(universe.get(&1), output.universe.get(1).cloned());
    }
}
