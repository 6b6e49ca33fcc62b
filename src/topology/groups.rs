use super::radix::{checked_product, decompose, inner_product, prefix_product};
use crate::error::{PlanError, Result};
use tracing::debug;

/// Ordered list of global ranks that communicate along one axis
pub type RankGroup = Vec<usize>;

/// Partition `0..world_size` into the groups selected by `mask`.
///
/// `dim_sizes` lists the parallel dimensions in mapping order, innermost
/// first. Dimensions whose mask entry is `true` vary inside a group, the
/// others vary across groups. For `dim_sizes = [tp, pp, dp]` the mask
/// `[true, false, true]` yields the `tp-dp` groups and `[false, true, false]`
/// the `pp` groups.
///
/// Every rank lands in exactly one group and all groups have
/// `product(masked sizes)` members. Inconsistent inputs are rejected before
/// any group is built.
pub fn generate_orthogonal_rank_groups(
    world_size: usize,
    dim_sizes: &[usize],
    mask: &[bool],
) -> Result<Vec<RankGroup>> {
    if dim_sizes.len() != mask.len() {
        return Err(PlanError::ShapeMismatch(format!(
            "{} dimension sizes but {} mask entries",
            dim_sizes.len(),
            mask.len()
        )));
    }
    if let Some(pos) = dim_sizes.iter().position(|&s| s == 0) {
        return Err(PlanError::ShapeMismatch(format!(
            "dimension {} has size 0 in {:?}",
            pos, dim_sizes
        )));
    }

    let Some(total) = checked_product(dim_sizes) else {
        return Err(PlanError::ShapeMismatch(format!(
            "product of {:?} overflows",
            dim_sizes
        )));
    };
    if total != world_size {
        return Err(PlanError::ShapeMismatch(format!(
            "product of {:?} is {}, expected world size {}",
            dim_sizes, total, world_size
        )));
    }

    let global_stride = prefix_product(dim_sizes);

    let mut masked_shape = Vec::new();
    let mut masked_stride = Vec::new();
    let mut unmasked_shape = Vec::new();
    let mut unmasked_stride = Vec::new();
    for ((&size, &stride), &selected) in dim_sizes.iter().zip(&global_stride).zip(mask) {
        if selected {
            masked_shape.push(size);
            masked_stride.push(stride);
        } else {
            unmasked_shape.push(size);
            unmasked_stride.push(stride);
        }
    }

    let group_size: usize = masked_shape.iter().product();
    if world_size % group_size != 0 {
        return Err(PlanError::Indivisible {
            what: "world size by group size",
            numerator: world_size,
            denominator: group_size,
        });
    }
    let num_groups = world_size / group_size;

    debug!(
        world_size,
        ?dim_sizes,
        ?mask,
        group_size,
        num_groups,
        "generating rank groups"
    );

    let groups = (0..num_groups)
        .map(|group_index| {
            let group_digits = decompose(group_index, &unmasked_shape, None);
            let base = inner_product(&group_digits, &unmasked_stride);
            (0..group_size)
                .map(|rank_in_group| {
                    let rank_digits = decompose(rank_in_group, &masked_shape, None);
                    inner_product(&rank_digits, &masked_stride) + base
                })
                .collect()
        })
        .collect();

    Ok(groups)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tp_groups_tp_pp_dp() {
        let groups = generate_orthogonal_rank_groups(8, &[2, 2, 2], &[true, false, false]).unwrap();
        assert_eq!(groups, vec![vec![0, 1], vec![2, 3], vec![4, 5], vec![6, 7]]);
    }

    #[test]
    fn test_pp_groups_tp_pp_dp() {
        let groups = generate_orthogonal_rank_groups(8, &[2, 2, 2], &[false, true, false]).unwrap();
        assert_eq!(groups, vec![vec![0, 2], vec![1, 3], vec![4, 6], vec![5, 7]]);
    }

    #[test]
    fn test_dp_groups_tp_pp_dp() {
        let groups = generate_orthogonal_rank_groups(8, &[2, 2, 2], &[false, false, true]).unwrap();
        assert_eq!(groups, vec![vec![0, 4], vec![1, 5], vec![2, 6], vec![3, 7]]);
    }

    #[test]
    fn test_combined_mask() {
        // tp-dp over [2, 3, 2]: tp varies fastest, dp stride is 6
        let groups =
            generate_orthogonal_rank_groups(12, &[2, 3, 2], &[true, false, true]).unwrap();
        assert_eq!(
            groups,
            vec![vec![0, 1, 6, 7], vec![2, 3, 8, 9], vec![4, 5, 10, 11]]
        );
    }

    #[test]
    fn test_all_masked_is_single_group() {
        let groups = generate_orthogonal_rank_groups(4, &[2, 2], &[true, true]).unwrap();
        assert_eq!(groups, vec![vec![0, 1, 2, 3]]);
    }

    #[test]
    fn test_nothing_masked_is_singletons() {
        let groups = generate_orthogonal_rank_groups(3, &[3], &[false]).unwrap();
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_rejects_world_size_mismatch() {
        let err = generate_orthogonal_rank_groups(6, &[2, 2], &[true, false]).unwrap_err();
        assert!(matches!(err, PlanError::ShapeMismatch(_)));
    }

    #[test]
    fn test_rejects_mask_length_mismatch() {
        let err = generate_orthogonal_rank_groups(4, &[2, 2], &[true]).unwrap_err();
        assert!(matches!(err, PlanError::ShapeMismatch(_)));
    }

    #[test]
    fn test_rejects_overflowing_shape() {
        let err = generate_orthogonal_rank_groups(0, &[1 << 32, 1 << 32], &[true, false]).unwrap_err();
        assert!(matches!(err, PlanError::ShapeMismatch(_)));
    }

    #[test]
    fn test_rejects_zero_size() {
        let err = generate_orthogonal_rank_groups(0, &[0, 2], &[true, false]).unwrap_err();
        assert!(matches!(err, PlanError::ShapeMismatch(_)));
    }
}
