//! Synthetic wearable data for local runs.

use crate::core::sample::SensorSample;
use rand::Rng;
use std::collections::BTreeMap;

/// Spacing between generated samples, in milliseconds.
pub const SAMPLE_SPACING_MS: i64 = 10_000;

/// Id of the n-th simulated subject.
pub fn subject_id(n: usize) -> String {
    format!("account{n}@example.com")
}

/// Generate `samples_per_subject` readings for each of `subjects` subjects.
///
/// Timestamps are spaced ten seconds apart and end before `now_ms`. With
/// `locations > 0` every sample is placed on one of a fixed pool of random
/// points, so repeated runs hit the same hotspot coordinates.
pub fn generate_batch<R: Rng>(
    rng: &mut R,
    subjects: usize,
    samples_per_subject: usize,
    now_ms: i64,
    locations: usize,
) -> BTreeMap<String, Vec<SensorSample>> {
    let pool: Vec<(f64, f64)> = (0..locations).map(|_| random_point(rng)).collect();
    let start = now_ms - SAMPLE_SPACING_MS * samples_per_subject as i64;

    (0..subjects)
        .map(|n| {
            let samples = (0..samples_per_subject)
                .map(|i| {
                    let (lat, long) = if pool.is_empty() {
                        random_point(rng)
                    } else {
                        pool[rng.gen_range(0..pool.len())]
                    };
                    SensorSample::new(
                        rng.gen_range(60..=100) as f64,
                        rng.gen_range(32.0..37.0),
                        rng.gen_range(0.1..5.0),
                        start + SAMPLE_SPACING_MS * i as i64,
                    )
                    .at(lat, long)
                })
                .collect();
            (subject_id(n), samples)
        })
        .collect()
}

fn random_point<R: Rng>(rng: &mut R) -> (f64, f64) {
    (rng.gen_range(-90.0..=90.0), rng.gen_range(-180.0..=180.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    #[test]
    fn test_value_ranges() {
        let mut rng = StdRng::seed_from_u64(5);
        let batch = generate_batch(&mut rng, 3, 200, 1_700_000_000_000, 0);

        assert_eq!(batch.len(), 3);
        assert!(batch.contains_key("account0@example.com"));
        for samples in batch.values() {
            assert_eq!(samples.len(), 200);
            for s in samples {
                assert!((60.0..=100.0).contains(&s.heart_rate));
                assert_eq!(s.heart_rate.fract(), 0.0);
                assert!((32.0..37.0).contains(&s.skin_temp));
                assert!((0.1..5.0).contains(&s.eda));
                assert!(s.timestamp < 1_700_000_000_000);
            }
        }
    }

    #[test]
    fn test_timestamps_evenly_spaced() {
        let mut rng = StdRng::seed_from_u64(6);
        let batch = generate_batch(&mut rng, 1, 4, 100_000, 0);
        let times: Vec<i64> = batch[&subject_id(0)].iter().map(|s| s.timestamp).collect();
        assert_eq!(times, vec![60_000, 70_000, 80_000, 90_000]);
    }

    #[test]
    fn test_location_pool_limits_coordinates() {
        let mut rng = StdRng::seed_from_u64(7);
        let batch = generate_batch(&mut rng, 2, 100, 0, 3);
        let points: BTreeSet<String> = batch
            .values()
            .flatten()
            .map(|s| format!("{},{}", s.lat, s.long))
            .collect();
        assert!(points.len() <= 3);
    }
}
