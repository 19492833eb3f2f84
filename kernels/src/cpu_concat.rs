use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// Concatenates two `[N, *, D]` buffers along axis 1.
///
/// `lhs` is `[N, A, D]`, `rhs` is `[N, B, D]`; the result is `[N, A + B, D]`
/// with each sample's `lhs` rows first.
pub fn cpu_concat_rows<T>(
    lhs: &[T],
    lhs_shape: &[usize; 3],
    rhs: &[T],
    rhs_shape: &[usize; 3],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    check_len(lhs.len(), lhs_shape)?;
    check_len(rhs.len(), rhs_shape)?;

    let [n, a, d] = *lhs_shape;
    if rhs_shape[0] != n || rhs_shape[2] != d {
        return Err(KernelError::ShapeMismatch {
            expected: vec![n, rhs_shape[1], d],
            got: rhs_shape.to_vec(),
        });
    }
    let b = rhs_shape[1];

    let row = (a + b) * d;
    if n * row == 0 {
        return Ok(Vec::new());
    }

    let mut out = vec![T::zero(); n * row];
    out.par_chunks_mut(row)
        .enumerate()
        .for_each(|(i, out_sample)| {
            let (head, tail) = out_sample.split_at_mut(a * d);
            head.copy_from_slice(&lhs[i * a * d..(i + 1) * a * d]);
            tail.copy_from_slice(&rhs[i * b * d..(i + 1) * b * d]);
        });

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concat_rows() {
        let lhs = vec![1.0f32, 2.0, 3.0, 4.0]; // [2, 1, 2]
        let rhs = vec![9.0f32, 9.0, 8.0, 8.0]; // [2, 1, 2]
        let out = cpu_concat_rows(&lhs, &[2, 1, 2], &rhs, &[2, 1, 2]).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 9.0, 9.0, 3.0, 4.0, 8.0, 8.0]);
    }

    #[test]
    fn test_concat_with_empty_side() {
        let lhs = vec![1.0f32, 2.0];
        let out = cpu_concat_rows(&lhs, &[2, 1, 1], &[], &[2, 0, 1]).unwrap();
        assert_eq!(out, lhs);
    }

    #[test]
    fn test_concat_feature_mismatch() {
        let err = cpu_concat_rows(&[1.0f32; 2], &[1, 1, 2], &[1.0f32; 3], &[1, 1, 3]);
        assert!(matches!(err, Err(KernelError::ShapeMismatch { .. })));
    }
}
