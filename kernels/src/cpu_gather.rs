use crate::{KernelElem, KernelError, Result, check_len};
use rayon::prelude::*;

/// Gathers rows along axis 1 (`take_along_axis` on the sequence axis).
///
/// `data` has shape `[N, L, D]` and `indices` has shape `[N, K]`. The output
/// has shape `[N, K, D]`, where `out[b, k, :] = data[b, indices[b, k], :]`.
/// Every index must be in `0..L`.
///
/// A rank-2 gather is the same call with `D = 1`.
pub fn cpu_gather_rows<T>(
    data: &[T],
    shape: &[usize; 3],
    indices: &[usize],
    index_shape: &[usize; 2],
) -> Result<Vec<T>>
where
    T: KernelElem,
{
    check_len(data.len(), shape)?;
    check_len(indices.len(), index_shape)?;

    let [n, l, d] = *shape;
    let [index_n, k] = *index_shape;
    if n != index_n {
        return Err(KernelError::ShapeMismatch {
            expected: vec![n, k],
            got: index_shape.to_vec(),
        });
    }

    if let Some(&bad) = indices.iter().find(|&&i| i >= l) {
        return Err(KernelError::IndexOutOfBounds {
            index: bad,
            bound: l,
        });
    }

    let size = n * k * d;
    if size == 0 {
        return Ok(Vec::new());
    }

    let mut out = vec![T::zero(); size];
    out.par_chunks_mut(k * d)
        .zip(indices.par_chunks(k))
        .zip(data.par_chunks(l * d))
        .for_each(|((out_sample, idx_row), in_sample)| {
            for (out_row, &src) in out_sample.chunks_mut(d).zip(idx_row) {
                out_row.copy_from_slice(&in_sample[src * d..(src + 1) * d]);
            }
        });

    Ok(out)
}
