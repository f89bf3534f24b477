//! Host kernel drivers.
//!
//! This module implements the driver function responsible for profiling the dot-product kernels
//! on the host (CPU).

use crate::{
    error::Result,
    kernels::host,
    perf_report::*,
    timer::{measure, Clock},
};

use tracing::debug;

/// Host driver for the single-precision dot product.
///
/// This function selects the correct host kernel given `variant` and profiles it.
#[allow(clippy::too_many_arguments)]
pub fn sdot<C: Clock + ?Sized>(
    clock: &C,
    a: &[f32],
    b: &[f32],
    meta_reps: u8,
    tight_reps: u16,
    prefetch_distance: usize,
    variant: HostKernelVariant,
) -> Result<PerfReport> {
    assert_eq!(a.len(), b.len());

    // Match on given kernel variant
    let kernel: Box<dyn Fn(&[f32], &[f32]) -> f32> = match variant {
        HostKernelVariant::Simple => Box::new(host::simple_dot),
        HostKernelVariant::Prefetch => Box::new(move |a: &[f32], b: &[f32]| {
            host::prefetch_dot(a, b, prefetch_distance)
        }),
        HostKernelVariant::Unrolled => Box::new(host::unrolled_dot),
        HostKernelVariant::Simd4 => Box::new(host::simd4_dot),
        HostKernelVariant::Simd8 => Box::new(host::simd8_dot),
        HostKernelVariant::Simd8Unrolled => Box::new(host::simd8_unrolled_dot),
        HostKernelVariant::Simd8UnrolledPrefetch => Box::new(host::simd8_unrolled_prefetch_dot),
        #[cfg(feature = "blas")]
        HostKernelVariant::Blas => Box::new(host::blas_dot),
    };

    // Measure execution time of kernel
    let measurement = measure(clock, meta_reps, tight_reps, || Ok(kernel(a, b)))?;
    debug!(
        kernel = %variant,
        mean = measurement.mean(),
        result = measurement.result,
        "host kernel profiled"
    );

    PerfReport::new(KernelVariant::Host(variant), a.len(), measurement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::tests::SteppingClock;

    use approx::assert_relative_eq;

    #[test]
    fn every_variant_is_profiled() {
        let ones = vec![1.0_f32; 64];
        for &variant in HostKernelVariant::all() {
            let report = sdot(&SteppingClock::new(10), &ones, &ones, 3, 2, 8, variant).unwrap();
            assert_eq!(report.variant(), KernelVariant::Host(variant));
            assert_eq!(report.nb_elems(), 64);
            assert_eq!(report.result(), 64.0);
            assert_relative_eq!(report.avg_time(), 5e-6, max_relative = 1e-9);
        }
    }

    #[test]
    #[should_panic]
    fn mismatched_lengths_panic() {
        let _ = sdot(
            &SteppingClock::new(1),
            &[1.0; 8],
            &[1.0; 16],
            2,
            1,
            0,
            HostKernelVariant::Simple,
        );
    }
}
