//! Server aggregation phase
//!
//! ```text
//! routing token ── decrypt ── bucket_id ── bucket view (bits)
//!                                              │
//! ResponseArray ───────────────── Σ bit * Resp[position] ── AggregateResult
//! ```
//!
//! The server never sees the queried index, only the bucket it was routed to.

use std::fmt;
use std::sync::Arc;

use blindset_core::{
    AggregateResult, BatchReport, BigUint, CurveParams, Error, KeyedStore, LookupError, Point,
    QueryToken, ResponseArray, Slot, TokenKey, WorkerPool,
};

/// Recombines response arrays against stored bucket bits
pub struct Aggregator<S> {
    curve: CurveParams,
    buckets: S,
    pool: Arc<WorkerPool>,
    key: TokenKey,
}

impl<S: KeyedStore<u64, Vec<Slot>>> Aggregator<S> {
    pub fn new(curve: CurveParams, buckets: S, pool: Arc<WorkerPool>, key: TokenKey) -> Self {
        Self {
            curve,
            buckets,
            pool,
            key,
        }
    }

    /// `Σ bit * responses[position]` over the routed bucket's slots.
    ///
    /// Positions outside the response array are skipped.
    pub fn aggregate(
        &self,
        routing: &QueryToken,
        responses: &ResponseArray,
    ) -> Result<AggregateResult, Error> {
        let bucket_id = self.key.decrypt(routing)?;
        let slots = self
            .buckets
            .get(&bucket_id)
            .ok_or(LookupError::BucketNotFound(bucket_id))?;

        let pairs: Vec<(u8, &Point)> = slots
            .iter()
            .enumerate()
            .filter_map(|(offset, slot)| {
                responses
                    .get(offset as u64 + 1)
                    .map(|point| (slot.bit, point))
            })
            .collect();

        // Terms in parallel, fold sequentially
        let terms = self.pool.try_map(&pairs, |(bit, point)| {
            self.curve.scalar_multiply(&BigUint::from(*bit), point)
        })?;
        let aggregate = self.curve.sum(&terms)?;

        tracing::debug!(bucket_id, terms = terms.len(), "Aggregated bucket");
        Ok(AggregateResult(aggregate))
    }

    /// Aggregate every `(routing, responses)` record; crypto and lookup failures skip the record only
    pub fn aggregate_batch<'a, I>(&self, records: I) -> Result<BatchReport<AggregateResult>, Error>
    where
        I: IntoIterator<Item = (&'a QueryToken, &'a ResponseArray)>,
    {
        let mut report = BatchReport::new();
        for (record, (routing, responses)) in records.into_iter().enumerate() {
            match self.aggregate(routing, responses) {
                Ok(result) => report.push(record, Ok(result)),
                Err(e) => report.push(record, Err(e.into_record_error()?)),
            }
        }
        tracing::info!(
            completed = report.completed.len(),
            skipped = report.skipped.len(),
            "Server batch done"
        );
        Ok(report)
    }
}

impl<S> fmt::Debug for Aggregator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Aggregator")
            .field("curve", &self.curve)
            .field("workers", &self.pool.workers())
            .finish_non_exhaustive()
    }
}
