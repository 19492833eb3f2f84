//! Tensor operations.
//!
//! # Overview
//!
//! - **Element-wise Arithmetic**: `+`, `-`, `*` on references, with strict shape checking.
//! - **Sequence-axis indexing**: row-wise argsort, inverse permutation, gather and
//!   concatenation along axis 1, backed by the `maskvit-kernels` crate.
//! - **Parallelism**: Everything runs on `rayon`, one task per batch row.
//!
//! Shapes must match exactly for element-wise operations. The only broadcast is
//! [`Tensor::add_rows`], which adds a `[L, D]` table to every sample of a
//! `[N, L, D]` batch.
//!
//! # Examples
//!
//! ```rust
//! use maskvit::tensor::Tensor;
//!
//! let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
//! let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();
//!
//! // Element-wise addition
//! let c = (&a + &b).unwrap();
//! assert_eq!(c.data(), &[4.0, 6.0]);
//! ```

use super::{Result, Tensor, TensorElem, TensorError};

use rayon::prelude::*;
use std::ops::{Add, Mul, Sub};

/// Implements a binary arithmetic operation trait (e.g., `Add`, `Sub`) for `&Tensor`.
macro_rules! impl_bin_op {
    ($trait:ident, $method:ident) => {
        impl<T, const RANK: usize> $trait for &Tensor<T, RANK>
        where
            T: TensorElem,
        {
            type Output = Result<Tensor<T, RANK>>;

            fn $method(self, rhs: Self) -> Self::Output {
                if self.shape != rhs.shape {
                    return Err(TensorError::ShapeMismatch {
                        expected: self.shape.to_vec(),
                        got: rhs.shape.to_vec(),
                    });
                }

                let mut out = Tensor::zeros(self.shape);
                out.data
                    .par_iter_mut()
                    .zip(self.data.par_iter())
                    .zip(rhs.data.par_iter())
                    .for_each(|((o, a), b)| {
                        *o = a.$method(*b);
                    });

                Ok(out)
            }
        }
    };
}

impl_bin_op!(Add, add);
impl_bin_op!(Sub, sub);
impl_bin_op!(Mul, mul);

impl<T, const RANK: usize> Tensor<T, RANK>
where
    T: TensorElem,
{
    /// Applies a function element-wise.
    ///
    /// ```rust
    /// use maskvit::tensor::Tensor;
    /// let t = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
    /// let squared = t.map(|x| x * x);
    /// assert_eq!(squared.data(), &[1.0, 4.0, 9.0]);
    /// ```
    pub fn map<F>(&self, f: F) -> Self
    where
        F: Fn(T) -> T + Sync + Send,
    {
        let mut out = Tensor::zeros(self.shape);
        out.data
            .par_iter_mut()
            .zip(self.data.par_iter())
            .for_each(|(o, i)| *o = f(*i));
        out
    }
}

impl<T> Tensor<T, 2>
where
    T: TensorElem,
{
    /// Stable ascending argsort of every row.
    ///
    /// # Shapes
    /// - `self`: `[N, L]`
    /// - returns: `[N, L]` of column indices
    pub fn argsort_rows(&self) -> Result<Tensor<usize, 2>> {
        let out = maskvit_kernels::cpu_argsort(&self.data, &self.shape)?;
        Tensor::new(out, self.shape)
    }

    /// Gathers columns per row: `out[b, k] = self[b, indices[b, k]]`.
    ///
    /// # Shapes
    /// - `self`: `[N, L]`
    /// - `indices`: `[N, K]`
    /// - returns: `[N, K]`
    pub fn gather_cols(&self, indices: &Tensor<usize, 2>) -> Result<Tensor<T, 2>> {
        let [n, l] = self.shape;
        let out = maskvit_kernels::cpu_gather_rows(
            &self.data,
            &[n, l, 1],
            &indices.data,
            &indices.shape,
        )?;
        Tensor::new(out, indices.shape)
    }

    /// Keeps the first `len` columns of every row.
    ///
    /// # Errors
    ///
    /// Returns `TensorError::IndexOutOfBounds` if `len` exceeds the row length.
    pub fn narrow_cols(&self, len: usize) -> Result<Tensor<T, 2>> {
        let [n, l] = self.shape;
        if len > l {
            return Err(TensorError::IndexOutOfBounds {
                index: vec![len],
                shape: self.shape.to_vec(),
            });
        }
        let mut out = Vec::with_capacity(n * len);
        for row in self.data.chunks(l.max(1)).take(n) {
            out.extend_from_slice(&row[..len]);
        }
        Tensor::new(out, [n, len])
    }
}

impl Tensor<usize, 2> {
    /// Row-wise inverse permutation: `out[b, self[b, i]] = i`.
    ///
    /// # Errors
    ///
    /// Fails if any row is not a permutation of `0..L`.
    pub fn inverse_permutation(&self) -> Result<Tensor<usize, 2>> {
        let out = maskvit_kernels::cpu_inverse_permutation(&self.data, &self.shape)?;
        Tensor::new(out, self.shape)
    }
}

impl<T> Tensor<T, 3>
where
    T: TensorElem,
{
    /// Gathers along the sequence axis: `out[b, k, :] = self[b, indices[b, k], :]`.
    ///
    /// # Shapes
    /// - `self`: `[N, L, D]`
    /// - `indices`: `[N, K]`
    /// - returns: `[N, K, D]`
    pub fn gather_rows(&self, indices: &Tensor<usize, 2>) -> Result<Tensor<T, 3>> {
        let out = maskvit_kernels::cpu_gather_rows(
            &self.data,
            &self.shape,
            &indices.data,
            &indices.shape,
        )?;
        let [n, k] = indices.shape;
        Tensor::new(out, [n, k, self.shape[2]])
    }

    /// Concatenates `other` after `self` along the sequence axis.
    ///
    /// # Shapes
    /// - `self`: `[N, A, D]`
    /// - `other`: `[N, B, D]`
    /// - returns: `[N, A + B, D]`
    pub fn concat_rows(&self, other: &Tensor<T, 3>) -> Result<Tensor<T, 3>> {
        let out =
            maskvit_kernels::cpu_concat_rows(&self.data, &self.shape, &other.data, &other.shape)?;
        let [n, a, d] = self.shape;
        Tensor::new(out, [n, a + other.shape[1], d])
    }

    /// Repeats a `[D]` vector into every position of an `[N, M, D]` tensor.
    pub fn tile_rows(row: &Tensor<T, 1>, n: usize, m: usize) -> Tensor<T, 3> {
        let d = row.shape[0];
        let mut data = Vec::with_capacity(n * m * d);
        for _ in 0..n * m {
            data.extend_from_slice(&row.data);
        }
        Tensor {
            shape: [n, m, d],
            data,
        }
    }

    /// Adds a `[L, D]` table to every sample of a `[N, L, D]` batch.
    pub fn add_rows(&self, table: &Tensor<T, 2>) -> Result<Tensor<T, 3>> {
        let [_, l, d] = self.shape;
        if table.shape != [l, d] {
            return Err(TensorError::ShapeMismatch {
                expected: vec![l, d],
                got: table.shape.to_vec(),
            });
        }

        let mut out = self.clone();
        let stride = l * d;
        if stride == 0 {
            return Ok(out);
        }
        out.data.par_chunks_mut(stride).for_each(|sample| {
            for (val, &t) in sample.iter_mut().zip(table.data.iter()) {
                *val += t;
            }
        });
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        let a = Tensor::<f32, 1>::new(vec![1.0, 2.0], [2]).unwrap();
        let b = Tensor::<f32, 1>::new(vec![3.0, 4.0], [2]).unwrap();

        let c = (&a + &b).unwrap();
        assert_eq!(c.data(), &[4.0, 6.0]);

        let d = (&b - &a).unwrap();
        assert_eq!(d.data(), &[2.0, 2.0]);

        let e = (&a * &b).unwrap();
        assert_eq!(e.data(), &[3.0, 8.0]);

        // Mismatch
        let f = Tensor::<f32, 1>::new(vec![1.0, 2.0, 3.0], [3]).unwrap();
        let err = &a + &f;
        assert!(matches!(err, Err(TensorError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_argsort_and_inverse() {
        let noise = crate::tensor!([0.2f32, 0.9, 0.1, 0.5], [1, 4]);
        let shuffle = noise.argsort_rows().unwrap();
        assert_eq!(shuffle.data(), &[2, 0, 3, 1]);

        let restore = shuffle.inverse_permutation().unwrap();
        assert_eq!(restore.data(), &[1, 3, 0, 2]);
    }

    #[test]
    fn test_gather_cols_and_narrow() {
        let t = crate::tensor!([0.0f32, 0.0, 1.0, 1.0], [1, 4]);
        let idx = Tensor::<usize, 2>::new(vec![1, 3, 0, 2], [1, 4]).unwrap();
        assert_eq!(t.gather_cols(&idx).unwrap().data(), &[0.0, 1.0, 0.0, 1.0]);

        let head = idx.narrow_cols(2).unwrap();
        assert_eq!(head.shape(), &[1, 2]);
        assert_eq!(head.data(), &[1, 3]);

        assert!(matches!(
            idx.narrow_cols(5),
            Err(TensorError::IndexOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_gather_concat_rows() {
        // [2, 2, 1]
        let x = crate::tensor!([1.0f32, 2.0, 3.0, 4.0], [2, 2, 1]);
        let idx = Tensor::<usize, 2>::new(vec![1, 0], [2, 1]).unwrap();
        let picked = x.gather_rows(&idx).unwrap();
        assert_eq!(picked.shape(), &[2, 1, 1]);
        assert_eq!(picked.data(), &[2.0, 3.0]);

        let tail = Tensor::tile_rows(&Tensor::<f32, 1>::new(vec![9.0], [1]).unwrap(), 2, 1);
        let joined = picked.concat_rows(&tail).unwrap();
        assert_eq!(joined.shape(), &[2, 2, 1]);
        assert_eq!(joined.data(), &[2.0, 9.0, 3.0, 9.0]);
    }

    #[test]
    fn test_add_rows() {
        let x = Tensor::<f32, 3>::ones([2, 2, 2]);
        let table = crate::tensor!([0.0f32, 1.0, 2.0, 3.0], [2, 2]);
        let out = x.add_rows(&table).unwrap();
        assert_eq!(out.data(), &[1.0, 2.0, 3.0, 4.0, 1.0, 2.0, 3.0, 4.0]);

        let bad = Tensor::<f32, 2>::zeros([3, 2]);
        assert!(matches!(
            x.add_rows(&bad),
            Err(TensorError::ShapeMismatch { .. })
        ));
    }
}
