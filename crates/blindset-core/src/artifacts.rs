//! Hand-off artifacts exchanged between roles
//!
//! Point arrays are 1-based to match universe indices and slot positions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::curve::Point;

macro_rules! point_array {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Vec<Point>);

        impl $name {
            pub fn new(points: Vec<Point>) -> Self {
                Self(points)
            }

            pub fn len(&self) -> usize {
                self.0.len()
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Point at 1-based `index`
            pub fn get(&self, index: u64) -> Option<&Point> {
                let offset = usize::try_from(index).ok()?.checked_sub(1)?;
                self.0.get(offset)
            }

            pub fn points(&self) -> &[Point] {
                &self.0
            }

            /// `(index, point)` with 1-based indices
            pub fn iter(&self) -> impl Iterator<Item = (u64, &Point)> {
                self.0.iter().enumerate().map(|(i, p)| (i as u64 + 1, p))
            }

            pub fn into_points(self) -> Vec<Point> {
                self.0
            }
        }

        impl From<Vec<Point>> for $name {
            fn from(points: Vec<Point>) -> Self {
                Self(points)
            }
        }
    };
}

point_array!(
    /// Committed universe points, `UniversePoint[1..=N]`
    Universe
);

point_array!(
    /// Universe points under a blinding scalar, e.g. `m * UniversePoint[i]`
    BlindedUniverse
);

point_array!(
    /// Published intermediary output, one point per universe index
    ResponseArray
);

/// Universe index addressed by a 1-based slot position
pub fn position_to_index(position: u64, universe_len: usize) -> Option<u64> {
    if position == 0 || universe_len == 0 {
        return None;
    }
    Some((position - 1) % universe_len as u64 + 1)
}

impl Universe {
    /// Point addressed by a slot position, wrapping modulo `N`
    pub fn position_point(&self, position: u64) -> Option<&Point> {
        self.get(position_to_index(position, self.len())?)
    }
}

impl BlindedUniverse {
    /// Point addressed by a slot position, wrapping modulo `N`
    pub fn position_point(&self, position: u64) -> Option<&Point> {
        self.get(position_to_index(position, self.len())?)
    }
}

/// Private `t * BlindedUniverse[target]`, routed to the verifier only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevealValue(pub Point);

/// Server output for one query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateResult(pub Point);

/// Setup-time digest per bucket, iterated in ascending bucket order
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketDigests(BTreeMap<u64, Point>);

impl BucketDigests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bucket_id: u64, digest: Point) {
        self.0.insert(bucket_id, digest);
    }

    pub fn get(&self, bucket_id: u64) -> Option<&Point> {
        self.0.get(&bucket_id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u64, &Point)> {
        self.0.iter().map(|(&id, p)| (id, p))
    }
}

impl FromIterator<(u64, Point)> for BucketDigests {
    fn from_iter<I: IntoIterator<Item = (u64, Point)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Per-bucket verifier outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Aggregate equals the blinded digest: bit 0
    Match0,
    /// Aggregate minus the blinded digest equals the reveal value: bit 1
    Match1,
    Inconclusive,
}

impl Decision {
    pub fn bit(&self) -> Option<u8> {
        match self {
            Decision::Match0 => Some(0),
            Decision::Match1 => Some(1),
            Decision::Inconclusive => None,
        }
    }

    pub fn is_match(&self) -> bool {
        self.bit().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn universe() -> Universe {
        Universe::new(vec![
            Point::affine(0u32, 1u32),
            Point::affine(1u32, 16u32),
            Point::affine(3u32, 10u32),
            Point::affine(9u32, 7u32),
        ])
    }

    #[test]
    fn test_one_based_access() {
        let u = universe();
        assert_eq!(u.get(0), None);
        assert_eq!(u.get(1), Some(&Point::affine(0u32, 1u32)));
        assert_eq!(u.get(4), Some(&Point::affine(9u32, 7u32)));
        assert_eq!(u.get(5), None);
        let indices: Vec<u64> = u.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_position_wraps_modulo_universe() {
        assert_eq!(position_to_index(1, 4), Some(1));
        assert_eq!(position_to_index(4, 4), Some(4));
        assert_eq!(position_to_index(5, 4), Some(1));
        assert_eq!(position_to_index(0, 4), None);
        assert_eq!(position_to_index(3, 0), None);
        assert_eq!(universe().position_point(6), Some(&Point::affine(1u32, 16u32)));
    }

    #[test]
    fn test_digests_iterate_in_bucket_order() {
        let digests: BucketDigests = [
            (2, Point::Infinity),
            (0, Point::affine(5u32, 19u32)),
            (1, Point::Infinity),
        ]
        .into_iter()
        .collect();
        let ids: Vec<u64> = digests.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[test]
    fn test_artifact_json() {
        let responses = ResponseArray::new(vec![Point::Infinity, Point::affine(3u32, 10u32)]);
        let json = serde_json::to_string(&responses).unwrap();
        assert_eq!(
            json,
            r#"[{"kind":"infinity"},{"kind":"affine","x":"3","y":"a"}]"#
        );
        assert_eq!(serde_json::from_str::<ResponseArray>(&json).unwrap(), responses);

        let digests: BucketDigests = [(1, Point::affine(5u32, 19u32))].into_iter().collect();
        let json = serde_json::to_string(&digests).unwrap();
        assert_eq!(json, r#"{"1":{"kind":"affine","x":"5","y":"13"}}"#);
        assert_eq!(serde_json::from_str::<BucketDigests>(&json).unwrap(), digests);

        assert_eq!(
            serde_json::to_string(&Decision::Match1).unwrap(),
            r#""match1""#
        );
    }

    #[test]
    fn test_decision_bit() {
        assert_eq!(Decision::Match0.bit(), Some(0));
        assert_eq!(Decision::Match1.bit(), Some(1));
        assert_eq!(Decision::Inconclusive.bit(), None);
        assert!(!Decision::Inconclusive.is_match());
    }
}
