//! Utility functions: random initialization of aligned vectors and result verification helpers.

use crate::{
    consts::VECTOR_ALIGNMENT,
    error::{BenchError, Result},
};

use aligned_vec::{AVec, ConstAlign};
use rand::{distributions::Uniform, prelude::*, rngs::SmallRng};

use std::alloc::Layout;

/// Heap-allocated vector of `f32` whose first element is aligned on [`VECTOR_ALIGNMENT`] bytes.
///
/// The vector dereferences to a slice, so kernels only ever see `&[f32]`.
pub type AlignedVec = AVec<f32, ConstAlign<VECTOR_ALIGNMENT>>;

/// Creates the process-wide random number generator, seeded for reproducible runs.
pub fn seeded_rng(seed: Option<u64>) -> SmallRng {
    SmallRng::seed_from_u64(seed.unwrap_or(crate::consts::SEED))
}

/// Produces an aligned vector of length `n`, filled with independent draws in the range
/// [0.0, 1.0) taken from `rng`.
///
/// Lengths whose aligned allocation would exceed `isize::MAX` bytes are rejected before any
/// allocation is attempted.
pub fn rand_vector<R: Rng + ?Sized>(n: usize, rng: &mut R) -> Result<AlignedVec> {
    Layout::array::<f32>(n)
        .and_then(|l| l.align_to(VECTOR_ALIGNMENT))
        .map_err(|_| BenchError::Alloc {
            len: n,
            align: VECTOR_ALIGNMENT,
        })?;

    let between = Uniform::new(0.0_f32, 1.0_f32);
    Ok(AVec::from_iter(
        VECTOR_ALIGNMENT,
        (0..n).map(|_| rng.sample(&between)),
    ))
}

/// Greatest common divisor.
pub fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

/// Least common multiple, with `lcm(0, x) == 0`.
pub fn lcm(a: usize, b: usize) -> usize {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}

/// Dot product accumulated in double precision, used as the reference for kernel results.
pub fn reference_dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| f64::from(x) * f64::from(y))
        .sum()
}

/// Relative difference between a kernel result and a reference value.
pub fn relative_difference(value: f64, reference: f64) -> f64 {
    if reference == 0.0 {
        value.abs()
    } else {
        ((value - reference) / reference).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_vector_honors_alignment() {
        let mut rng = seeded_rng(Some(1));
        for len in [1, 7, 1000, 4096] {
            let v = rand_vector(len, &mut rng).unwrap();
            assert_eq!(v.as_ptr() as usize % VECTOR_ALIGNMENT, 0);
            assert_eq!(v.len(), len);
        }
    }

    #[test]
    fn empty_random_vector() {
        let mut rng = seeded_rng(None);
        let v = rand_vector(0, &mut rng).unwrap();
        assert!(v.is_empty());
    }

    #[test]
    fn absurd_length_is_an_error() {
        let mut rng = seeded_rng(None);
        assert!(matches!(
            rand_vector(usize::MAX / 2, &mut rng),
            Err(BenchError::Alloc {
                align: VECTOR_ALIGNMENT,
                ..
            })
        ));
    }

    #[test]
    fn random_values_are_in_unit_interval() {
        let mut rng = seeded_rng(Some(42));
        let v = rand_vector(10_000, &mut rng).unwrap();
        assert!(v.iter().all(|&x| (0.0..1.0).contains(&x)));
    }

    #[test]
    fn random_vectors_are_reproducible_and_independent() {
        let mut rng = seeded_rng(Some(7));
        let a = rand_vector(256, &mut rng).unwrap();
        let b = rand_vector(256, &mut rng).unwrap();

        let mut rng = seeded_rng(Some(7));
        let a2 = rand_vector(256, &mut rng).unwrap();

        assert_eq!(&a[..], &a2[..]);
        assert_ne!(&a[..], &b[..]);
    }

    #[test]
    fn lcm_of_kernel_widths() {
        assert_eq!(lcm(1, 4), 4);
        assert_eq!(lcm(4, 8), 8);
        assert_eq!(lcm(8, 16), 16);
        assert_eq!(lcm(6, 4), 12);
        assert_eq!(lcm(0, 4), 0);
    }

    #[test]
    fn relative_difference_handles_zero_reference() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert_eq!(relative_difference(0.5, 0.0), 0.5);
        assert!((relative_difference(101.0, 100.0) - 0.01).abs() < 1e-12);
    }
}
