//! Temporal position index: a sorted timestamp → location map answering
//! exact, clamped, and linearly interpolated lookups.

use std::collections::BTreeMap;

use plume_parser::PositionSample;

use crate::error::TransformError;
use crate::types::Position;

/// Rounds a coordinate to 4 decimal places (~11 m of latitude). Applied at
/// storage time and at output time; applying it twice is a no-op.
pub fn round_coord(n: f64) -> f64 {
    (n * 10_000.0).round() / 10_000.0
}

fn lerp(x: i64, x0: i64, x1: i64, y0: f64, y1: f64) -> f64 {
    y0 + (x - x0) as f64 * ((y1 - y0) / (x1 - x0) as f64)
}

/// Built fresh for each flow ingestion job and discarded once the job's
/// transform completes; never shared across jobs.
#[derive(Debug, Clone)]
pub struct PositionIndex {
    samples: BTreeMap<i64, Position>,
}

impl PositionIndex {
    /// Duplicate timestamps keep the last sample seen, matching the raw
    /// export where later rows supersede earlier ones.
    pub fn new(samples: impl IntoIterator<Item = PositionSample>) -> Result<Self, TransformError> {
        let samples: BTreeMap<i64, Position> = samples
            .into_iter()
            .map(|s| {
                (
                    s.timestamp,
                    Position {
                        latitude: round_coord(s.latitude),
                        longitude: round_coord(s.longitude),
                    },
                )
            })
            .collect();
        if samples.is_empty() {
            return Err(TransformError::EmptyPositionIndex);
        }
        Ok(Self { samples })
    }

    pub fn upsert(&mut self, timestamp: i64, position: Position) {
        self.samples.insert(
            timestamp,
            Position {
                latitude: round_coord(position.latitude),
                longitude: round_coord(position.longitude),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Resolves a location for `timestamp`: exact samples are returned
    /// unchanged, queries outside the sampled interval clamp to the nearest
    /// end, and anything in between is interpolated from the bracketing
    /// samples. Bracketing samples at an identical position short-circuit,
    /// so coincident positions never reach the division.
    pub fn get(&self, timestamp: i64) -> Position {
        if let Some(position) = self.samples.get(&timestamp) {
            return *position;
        }

        let (&t_min, &earliest) = self
            .samples
            .first_key_value()
            .expect("constructor rejects empty sample sets");
        if timestamp < t_min {
            return earliest;
        }
        let (&t_max, &latest) = self
            .samples
            .last_key_value()
            .expect("constructor rejects empty sample sets");
        if timestamp > t_max {
            return latest;
        }

        let (&t0, &p0) = self
            .samples
            .range(..timestamp)
            .next_back()
            .expect("timestamp is above t_min");
        let (&t1, &p1) = self
            .samples
            .range(timestamp..)
            .next()
            .expect("timestamp is below t_max");
        if p0 == p1 {
            return p0;
        }
        Position {
            latitude: round_coord(lerp(timestamp, t0, t1, p0.latitude, p1.latitude)),
            longitude: round_coord(lerp(timestamp, t0, t1, p0.longitude, p1.longitude)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(timestamp: i64, latitude: f64, longitude: f64) -> PositionSample {
        PositionSample {
            timestamp,
            latitude,
            longitude,
        }
    }

    fn index() -> PositionIndex {
        PositionIndex::new([sample(100, 1.0, 1.0), sample(200, 2.0, 2.0)]).expect("non-empty")
    }

    #[test]
    fn exact_timestamps_return_stored_positions() {
        let index = index();
        assert_eq!(
            index.get(100),
            Position {
                latitude: 1.0,
                longitude: 1.0
            }
        );
        assert_eq!(
            index.get(200),
            Position {
                latitude: 2.0,
                longitude: 2.0
            }
        );
    }

    #[test]
    fn interpolates_between_bracketing_samples() {
        let position = index().get(150);
        assert_eq!(position.latitude, 1.5);
        assert_eq!(position.longitude, 1.5);
    }

    #[test]
    fn clamps_outside_the_sampled_interval() {
        let index = index();
        assert_eq!(index.get(50).latitude, 1.0);
        assert_eq!(index.get(250).latitude, 2.0);
    }

    #[test]
    fn identical_bracketing_positions_short_circuit() {
        let index =
            PositionIndex::new([sample(100, 1.0, 1.0), sample(200, 1.0, 1.0)]).expect("non-empty");
        let position = index.get(150);
        assert_eq!(position.latitude, 1.0);
        assert_eq!(position.longitude, 1.0);
    }

    #[test]
    fn coordinate_rounding_is_idempotent() {
        for x in [39.103_141_59, -84.512_777, 0.000_049_9, 12.34565] {
            let once = round_coord(x);
            assert_eq!(round_coord(once), once);
        }
    }

    #[test]
    fn positions_are_stored_at_four_decimals() {
        let index = PositionIndex::new([sample(100, 39.103_141_59, -84.512_777)]).expect("one");
        let position = index.get(100);
        assert_eq!(position.latitude, 39.1031);
        assert_eq!(position.longitude, -84.5128);
    }

    #[test]
    fn upsert_reorders_the_index() {
        let mut index = index();
        index.upsert(
            150,
            Position {
                latitude: 5.0,
                longitude: 5.0,
            },
        );
        assert_eq!(index.len(), 3);
        assert_eq!(index.get(150).latitude, 5.0);
        // 125 now brackets between 100 and the new 150 sample
        assert_eq!(index.get(125).latitude, 3.0);
    }

    #[test]
    fn empty_sample_sets_are_rejected() {
        assert_eq!(
            PositionIndex::new(Vec::<PositionSample>::new()).unwrap_err(),
            TransformError::EmptyPositionIndex
        );
    }
}
