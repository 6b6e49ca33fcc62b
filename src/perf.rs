use crate::error::{PlanError, Result};
use crate::types::CommType;
use serde::{Deserialize, Serialize};

const BYTES_IN_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Algorithmic and bus bandwidth in GB/s, rounded to two decimals
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Bandwidth {
    pub algbw: f64,
    pub busbw: f64,
}

/// Two decimals, ties to even
fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}

/// Convert one timed operation into algorithmic and bus bandwidth.
///
/// `group_size` of `None` (or zero) counts as a single participant. Bus bandwidth
/// scales the payload rate by the per-link traffic of the collective:
/// `(n-1)/n` for all-gather and reduce-scatter, `2(n-1)/n` for all-reduce.
/// Point-to-point, barrier and compute entries report zero.
pub fn compute_bandwidth(
    comm_type: CommType,
    size_bytes: u64,
    duration_ms: f64,
    group_size: Option<usize>,
) -> Result<Bandwidth> {
    let n = group_size.filter(|&g| g > 0).unwrap_or(1) as f64;
    let bus_factor = match comm_type {
        CommType::AllGather | CommType::ReduceScatter => (n - 1.0) / n,
        CommType::AllReduce => 2.0 * (n - 1.0) / n,
        CommType::Isend
        | CommType::Irecv
        | CommType::Barrier
        | CommType::Computation
        | CommType::EpochEnd => return Ok(Bandwidth::default()),
        CommType::Broadcast
        | CommType::Reduce
        | CommType::Gather
        | CommType::Scatter
        | CommType::AllToAll
        | CommType::ReduceScatterTensor
        | CommType::AllGatherIntoTensor => 1.0,
    };

    if !(duration_ms.is_finite() && duration_ms > 0.0) {
        return Err(PlanError::NonPositiveDuration(duration_ms));
    }

    let algbw = size_bytes as f64 / (duration_ms / 1000.0);
    let busbw = algbw * bus_factor;

    Ok(Bandwidth {
        algbw: round2(algbw / BYTES_IN_GB),
        busbw: round2(busbw / BYTES_IN_GB),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn test_all_reduce() {
        let bw = compute_bandwidth(CommType::AllReduce, GIB, 100.0, Some(4)).unwrap();
        assert_eq!(bw, Bandwidth { algbw: 10.0, busbw: 15.0 });
    }

    #[test]
    fn test_all_gather_and_reduce_scatter() {
        let expected = Bandwidth { algbw: 10.0, busbw: 7.5 };
        assert_eq!(compute_bandwidth(CommType::AllGather, GIB, 100.0, Some(4)).unwrap(), expected);
        assert_eq!(compute_bandwidth(CommType::ReduceScatter, GIB, 100.0, Some(4)).unwrap(), expected);
    }

    #[test]
    fn test_zero_bandwidth_types() {
        for comm_type in [CommType::Barrier, CommType::Isend, CommType::Irecv, CommType::Computation] {
            let bw = compute_bandwidth(comm_type, GIB, 3.0, Some(8)).unwrap();
            assert_eq!(bw, Bandwidth { algbw: 0.0, busbw: 0.0 });
        }
    }

    #[test]
    fn test_zero_bandwidth_ignores_duration() {
        let bw = compute_bandwidth(CommType::Barrier, 0, 0.0, None).unwrap();
        assert_eq!(bw, Bandwidth::default());
    }

    #[test]
    fn test_rooted_and_tensor_variants_use_algbw() {
        for comm_type in [
            CommType::Broadcast,
            CommType::AllToAll,
            CommType::AllGatherIntoTensor,
            CommType::ReduceScatterTensor,
        ] {
            let bw = compute_bandwidth(comm_type, GIB, 200.0, Some(16)).unwrap();
            assert_eq!(bw, Bandwidth { algbw: 5.0, busbw: 5.0 });
        }
    }

    #[test]
    fn test_missing_group_size_counts_as_one() {
        let bw = compute_bandwidth(CommType::AllReduce, GIB, 100.0, None).unwrap();
        assert_eq!(bw.busbw, 0.0);
        assert_eq!(bw.algbw, 10.0);
    }

    #[test]
    fn test_rounding() {
        // 1 MiB in 1 ms = 0.9765625 GB/s
        let bw = compute_bandwidth(CommType::Broadcast, 1024 * 1024, 1.0, None).unwrap();
        assert_eq!(bw.algbw, 0.98);
    }

    #[test]
    fn test_rounding_ties_to_even() {
        // 128 MiB in 1 s = 0.125 GB/s exactly
        let bw = compute_bandwidth(CommType::Broadcast, 128 * 1024 * 1024, 1000.0, None).unwrap();
        assert_eq!(bw.algbw, 0.12);
        // 0.375 GB/s rounds up to the even neighbour
        let bw = compute_bandwidth(CommType::Broadcast, 3 * 128 * 1024 * 1024, 1000.0, None).unwrap();
        assert_eq!(bw.algbw, 0.38);
    }

    #[test]
    fn test_rejects_degenerate_duration() {
        for duration in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            assert!(matches!(
                compute_bandwidth(CommType::AllReduce, GIB, duration, Some(2)),
                Err(PlanError::NonPositiveDuration(_))
            ));
        }
    }
}
