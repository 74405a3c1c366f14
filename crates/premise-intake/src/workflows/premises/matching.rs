//! Duplicate detection: geospatial shortlist first, semantic best-match second.

use std::cmp::Ordering;

use super::domain::{CandidateMatch, Coordinates, Neighbor, PremiseAttributes, PremiseId};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two points, in kilometers.
pub fn haversine_km(a: Coordinates, b: Coordinates) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// A stored premise as held by a proximity index.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPremise {
    pub premise_id: PremiseId,
    pub coordinates: Coordinates,
    pub attributes: PremiseAttributes,
}

/// The `max_k` stored premises within `radius_km` of `origin`, ordered by
/// ascending distance and then premise id so equal distances stay deterministic.
pub fn nearest_within<'a, I>(
    premises: I,
    origin: Coordinates,
    radius_km: f64,
    max_k: usize,
) -> Vec<Neighbor>
where
    I: IntoIterator<Item = &'a StoredPremise>,
{
    let mut neighbors: Vec<Neighbor> = premises
        .into_iter()
        .filter_map(|premise| {
            let distance_km = haversine_km(origin, premise.coordinates);
            (distance_km <= radius_km).then(|| Neighbor {
                premise_id: premise.premise_id,
                latitude: premise.coordinates.latitude,
                longitude: premise.coordinates.longitude,
                name: premise.attributes.name.clone(),
                address: premise.attributes.address.clone(),
                business_type: premise.attributes.business_type.clone(),
                distance_km,
            })
        })
        .collect();

    neighbors.sort_by(|a, b| {
        a.distance_km
            .total_cmp(&b.distance_km)
            .then_with(|| a.premise_id.cmp(&b.premise_id))
    });
    neighbors.truncate(max_k);
    neighbors
}

/// Ranks two scored candidates; `Greater` means `a` is the better match.
fn rank(a: &CandidateMatch, b: &CandidateMatch) -> Ordering {
    a.score
        .total_cmp(&b.score)
        .then_with(|| b.distance_km().total_cmp(&a.distance_km()))
        .then_with(|| b.premise_id().cmp(&a.premise_id()))
}

/// Highest score wins; ties go to the nearest neighbor, then the smallest premise id.
pub fn select_best_match(candidates: Vec<CandidateMatch>) -> Option<CandidateMatch> {
    candidates.into_iter().max_by(rank)
}

/// Whether the winning candidate crosses the duplicate threshold.
pub fn is_duplicate(best: &CandidateMatch, threshold: f64) -> bool {
    best.score >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    fn neighbor(id: i64, distance_km: f64) -> Neighbor {
        Neighbor {
            premise_id: PremiseId(id),
            latitude: 38.9,
            longitude: -121.07,
            name: format!("premise {id}"),
            address: "1 Main St, Auburn, CA".to_string(),
            business_type: "Retail".to_string(),
            distance_km,
        }
    }

    fn stored(id: i64, latitude: f64, longitude: f64) -> StoredPremise {
        StoredPremise {
            premise_id: PremiseId(id),
            coordinates: Coordinates {
                latitude,
                longitude,
            },
            attributes: PremiseAttributes {
                name: format!("premise {id}"),
                address: String::new(),
                business_type: String::new(),
            },
        }
    }

    #[test]
    fn haversine_matches_known_distance() {
        let sacramento = Coordinates {
            latitude: 38.5816,
            longitude: -121.4944,
        };
        let san_francisco = Coordinates {
            latitude: 37.7749,
            longitude: -122.4194,
        };
        let distance = haversine_km(sacramento, san_francisco);
        assert!((distance - 120.0).abs() < 2.0, "got {distance}");
        assert_eq!(haversine_km(sacramento, sacramento), 0.0);
    }

    #[test]
    fn highest_score_wins() {
        let best = select_best_match(vec![
            CandidateMatch::new(neighbor(1, 0.01), 0.4),
            CandidateMatch::new(neighbor(2, 0.09), 0.92),
            CandidateMatch::new(neighbor(3, 0.05), 0.7),
        ])
        .expect("candidates present");
        assert_eq!(best.premise_id(), PremiseId(2));
    }

    #[test]
    fn equal_scores_prefer_the_nearest_neighbor() {
        let best = select_best_match(vec![
            CandidateMatch::new(neighbor(1, 1.2), 0.9),
            CandidateMatch::new(neighbor(2, 0.8), 0.9),
        ])
        .expect("candidates present");
        assert_eq!(best.premise_id(), PremiseId(2));
        assert_eq!(best.distance_km(), 0.8);
    }

    #[test]
    fn equal_score_and_distance_prefer_the_smallest_id() {
        let forward = select_best_match(vec![
            CandidateMatch::new(neighbor(9, 0.5), 0.9),
            CandidateMatch::new(neighbor(4, 0.5), 0.9),
        ])
        .expect("candidates present");
        let reversed = select_best_match(vec![
            CandidateMatch::new(neighbor(4, 0.5), 0.9),
            CandidateMatch::new(neighbor(9, 0.5), 0.9),
        ])
        .expect("candidates present");
        assert_eq!(forward.premise_id(), PremiseId(4));
        assert_eq!(reversed.premise_id(), PremiseId(4));
    }

    #[test]
    fn no_candidates_means_no_match() {
        assert!(select_best_match(Vec::new()).is_none());
    }

    #[test]
    fn threshold_is_inclusive() {
        let candidate = CandidateMatch::new(neighbor(1, 0.1), 0.85);
        assert!(is_duplicate(&candidate, 0.85));
        assert!(!is_duplicate(&candidate, 0.86));
    }

    #[test]
    fn nearest_within_filters_orders_and_truncates() {
        let origin = Coordinates {
            latitude: 38.9,
            longitude: -121.07,
        };
        let premises = vec![
            stored(5, 38.9005, -121.07),
            stored(3, 38.9, -121.07),
            stored(8, 38.9005, -121.07),
            stored(1, 39.5, -121.07),
        ];

        let neighbors = nearest_within(&premises, origin, 0.1, 10);
        let ids: Vec<_> = neighbors.iter().map(|n| n.premise_id.0).collect();
        assert_eq!(ids, vec![3, 5, 8]);

        let capped = nearest_within(&premises, origin, 0.1, 2);
        assert_eq!(capped.len(), 2);

        let isolated = nearest_within(&premises, origin, 0.001, 10);
        assert_eq!(isolated.len(), 1);
    }
}
