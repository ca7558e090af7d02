//! On-demand district statistics.
//!
//! Runs in O(n) over the loaded points: a bounding-box check rejects most
//! points cheaply, and only the survivors go through exact ray casting.
//! Results are never cached; callers recompute per request.

use std::collections::BTreeMap;

use signal_map_signal_models::{
    Classified, DistrictStats, NetworkType, Operator, OperatorDistrictStats, Point,
};

use crate::Boundary;

/// Running sums for one group of points.
///
/// Signal is accumulated as a magnitude because raw dBm values are
/// negative; averages are negated back on the way out.
#[derive(Debug, Default, Clone, Copy)]
struct Accumulator {
    count: u64,
    signal_magnitude: f64,
    speed: f64,
}

impl Accumulator {
    fn add(&mut self, point: &Point) {
        self.count += 1;
        self.signal_magnitude += f64::from(point.signal).abs();
        self.speed += point.speed;
    }

    #[allow(clippy::cast_precision_loss)]
    fn average_signal(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            -(self.signal_magnitude / self.count as f64)
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn average_speed(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.speed / self.count as f64
        }
    }
}

/// Aggregates the points that fall inside `boundary`.
///
/// Points are first checked against the boundary's bounding box, then
/// against the exterior rings with even-odd ray casting. Operators and
/// network types that match no known value are counted in the total and
/// in the `unclassified_*` counters only.
pub fn compute_district_stats<'a, I>(points: I, boundary: &Boundary) -> DistrictStats
where
    I: IntoIterator<Item = &'a Point>,
{
    let mut stats = empty_stats();
    let Some(bbox) = boundary.bounding_box() else {
        return stats;
    };

    let mut overall = Accumulator::default();
    let mut by_operator: BTreeMap<Operator, Accumulator> = BTreeMap::new();

    let inside = points
        .into_iter()
        .filter(|p| bbox.contains(p.latitude, p.longitude))
        .filter(|p| boundary.contains(p.latitude, p.longitude));

    for point in inside {
        overall.add(point);

        match point.operator_class() {
            Classified::Known(op) => by_operator.entry(op).or_default().add(point),
            Classified::Unknown => stats.unclassified_operators += 1,
        }

        match point.network_class() {
            Classified::Known(ty) => *stats.network_types.entry(ty).or_default() += 1,
            Classified::Unknown => stats.unclassified_network_types += 1,
        }
    }

    stats.total = overall.count;
    stats.average_signal = overall.average_signal();
    stats.average_speed = overall.average_speed();
    for (op, acc) in by_operator {
        stats.operators.insert(
            op,
            OperatorDistrictStats {
                count: acc.count,
                avg_signal: acc.average_signal(),
                avg_speed: acc.average_speed(),
            },
        );
    }

    log::debug!(
        "District stats: {} points inside ({} unclassified operators)",
        stats.total,
        stats.unclassified_operators
    );

    stats
}

/// Stats with every known operator and network type present at zero.
fn empty_stats() -> DistrictStats {
    DistrictStats {
        operators: Operator::ALL
            .iter()
            .map(|op| (*op, OperatorDistrictStats::default()))
            .collect(),
        network_types: NetworkType::ALL.iter().map(|ty| (*ty, 0)).collect(),
        ..DistrictStats::default()
    }
}
