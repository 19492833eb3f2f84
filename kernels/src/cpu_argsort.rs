use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Row-wise stable argsort, ascending.
///
/// `data` is viewed as `[rows, cols]`. Each output row holds the column
/// indices of the input row ordered by value; equal values keep their
/// original index order. Values that compare unordered with themselves (NaN)
/// sort after every other value, in index order among themselves.
pub fn cpu_argsort<T>(data: &[T], shape: &[usize; 2]) -> Result<Vec<usize>>
where
    T: KernelElem,
{
    check_len(data.len(), shape)?;
    let cols = shape[1];
    if data.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = vec![0usize; data.len()];
    out.par_chunks_mut(cols)
        .zip(data.par_chunks(cols))
        .for_each(|(out_row, in_row)| {
            for (i, slot) in out_row.iter_mut().enumerate() {
                *slot = i;
            }
            // `sort_by` is stable, so ties resolve by position.
            out_row.sort_by(|&a, &b| total_cmp(&in_row[a], &in_row[b]));
        });

    Ok(out)
}

/// Total order over a `PartialOrd` element: NaN-like values (unequal to
/// themselves) are equal to each other and greater than everything else.
#[allow(clippy::eq_op)]
fn total_cmp<T: PartialOrd>(a: &T, b: &T) -> Ordering {
    match a.partial_cmp(b) {
        Some(ord) => ord,
        None => (a != a).cmp(&(b != b)),
    }
}

/// Row-wise inverse of a permutation.
///
/// For every row, `out[perm[i]] = i`. Fails if a row contains an index
/// outside `0..cols` or repeats an index.
pub fn cpu_inverse_permutation(perm: &[usize], shape: &[usize; 2]) -> Result<Vec<usize>> {
    check_len(perm.len(), shape)?;
    let cols = shape[1];
    if perm.is_empty() {
        return Ok(Vec::new());
    }

    let mut out = vec![usize::MAX; perm.len()];
    out.par_chunks_mut(cols)
        .zip(perm.par_chunks(cols))
        .enumerate()
        .try_for_each(|(row, (out_row, perm_row))| {
            for (i, &p) in perm_row.iter().enumerate() {
                if p >= cols {
                    return Err(KernelError::IndexOutOfBounds {
                        index: p,
                        bound: cols,
                    });
                }
                if out_row[p] != usize::MAX {
                    return Err(KernelError::InvalidPermutation { row });
                }
                out_row[p] = i;
            }
            Ok(())
        })?;

    Ok(out)
}
