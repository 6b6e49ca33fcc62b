/// Cumulative products of `sizes`, starting at 1.
///
/// These are the strides of a mixed-radix number whose digit bases are
/// `sizes`. The result has `sizes.len() + 1` entries and ends with the
/// total product.
///
/// # Panics
///
/// Panics when the product overflows `usize`; check with
/// [`checked_product`] first.
pub fn prefix_product(sizes: &[usize]) -> Vec<usize> {
    let mut acc: usize = 1;
    let mut strides = Vec::with_capacity(sizes.len() + 1);
    strides.push(acc);
    for &size in sizes {
        acc = acc
            .checked_mul(size)
            .unwrap_or_else(|| panic!("product of {:?} overflows usize", sizes));
        strides.push(acc);
    }
    strides
}

/// Product of `sizes`, `None` on overflow
pub fn checked_product(sizes: &[usize]) -> Option<usize> {
    sizes.iter().try_fold(1usize, |acc, &size| acc.checked_mul(size))
}

/// Dot product of two equal-length sequences
pub fn inner_product(a: &[usize], b: &[usize]) -> usize {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Recover the per-dimension digits of a flat `index`.
///
/// Solves `index = sum(idx[i] * stride[i])` for `idx`, where `stride`
/// defaults to `prefix_product(shape)`. Only the first `shape.len()`
/// strides act as digit weights.
///
/// # Panics
///
/// Panics when the digits do not reproduce `index`, which means the caller
/// passed an index outside the shape or a stride that does not belong to it.
pub fn decompose(index: usize, shape: &[usize], stride: Option<&[usize]>) -> Vec<usize> {
    let owned;
    let stride = match stride {
        Some(s) => s,
        None => {
            owned = prefix_product(shape);
            &owned
        }
    };

    let idx: Vec<usize> = shape
        .iter()
        .zip(stride)
        .map(|(&s, &d)| (index / d) % s)
        .collect();

    let weights = &stride[..idx.len()];
    assert_eq!(
        inner_product(&idx, weights),
        index,
        "index {} with shape {:?} mismatches the decomposed digits {:?}",
        index,
        shape,
        idx
    );
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_product() {
        assert_eq!(prefix_product(&[]), vec![1]);
        assert_eq!(prefix_product(&[2, 3, 4]), vec![1, 2, 6, 24]);
        assert_eq!(prefix_product(&[1, 8, 1]), vec![1, 1, 8, 8]);
    }

    #[test]
    fn test_checked_product() {
        assert_eq!(checked_product(&[]), Some(1));
        assert_eq!(checked_product(&[2, 3, 4]), Some(24));
        assert_eq!(checked_product(&[1 << 32, 1 << 32]), None);
    }

    #[test]
    #[should_panic(expected = "overflows usize")]
    fn test_prefix_product_overflow_panics() {
        prefix_product(&[usize::MAX, 2]);
    }

    #[test]
    fn test_inner_product() {
        assert_eq!(inner_product(&[], &[]), 0);
        assert_eq!(inner_product(&[1, 2, 3], &[1, 2, 6]), 1 + 4 + 18);
    }

    #[test]
    fn test_decompose_default_stride() {
        // 2x3x4 grid: 23 = 1*1 + 2*2 + 3*6
        assert_eq!(decompose(23, &[2, 3, 4], None), vec![1, 2, 3]);
        assert_eq!(decompose(0, &[2, 3, 4], None), vec![0, 0, 0]);
        assert_eq!(decompose(5, &[2, 3, 4], None), vec![1, 2, 0]);
    }

    #[test]
    fn test_decompose_empty_shape() {
        assert!(decompose(0, &[], None).is_empty());
    }

    #[test]
    fn test_decompose_identity_exhaustive() {
        let shape = [3, 1, 2, 4];
        let stride = prefix_product(&shape);
        for index in 0..stride[shape.len()] {
            let idx = decompose(index, &shape, Some(&stride));
            assert_eq!(inner_product(&idx, &stride[..shape.len()]), index);
        }
    }

    #[test]
    #[should_panic(expected = "mismatches the decomposed digits")]
    fn test_decompose_out_of_range_panics() {
        decompose(8, &[2, 2], None);
    }

    #[test]
    #[should_panic]
    fn test_decompose_foreign_stride_panics() {
        // Strides of a different shape cannot reproduce every index.
        decompose(3, &[2, 2], Some(&[1, 4, 8]));
    }
}
