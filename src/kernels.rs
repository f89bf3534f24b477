//! Kernel implementations.
//!
//! This modules contains the actual implementation of the host and device dot-product kernels.
//! Every kernel computes `sum(a[i] * b[i])` over two slices of equal length.

#[cfg(any(feature = "opencl", feature = "cuda"))]
pub mod device {
    //! Device kernel implementations.
    //!
    //! Each device backend copies both operands into device memory on every call, runs a
    //! grid-stride dot product in which every device thread writes one partial sum, and reads back
    //! those partial sums only; the host folds them into the scalar result.
    //!
    //! These are hand-written kernels (OpenCL C and PTX), not a vendor GPU BLAS `sdot`: neither
    //! `ocl` nor `cust` exposes a device BLAS. Timings therefore compare the transfer and launch
    //! costs of each framework running the same simple reduction.

    /// Represents a device kernel.
    ///
    /// As there is no generic way of writing of function that will execute on an accelerator in
    /// Rust, kernels are expressed with static string slices (`&'static str`) in the syntax of the
    /// target framework: either OpenCL C or NVIDIA PTX, directly imported as raw text.
    pub struct DeviceKernel {
        kernel_name: &'static str,
        kernel_source: &'static str,
    }

    impl DeviceKernel {
        /// Creates a `DeviceKernel` from a kernel name (actual name of the kernel function in the
        /// source code) and a kernel source code (generally a file's contents).
        pub const fn new(kernel_name: &'static str, kernel_source: &'static str) -> Self {
            Self {
                kernel_name,
                kernel_source,
            }
        }

        /// Returns the function name of the given kernel.
        pub fn name(&self) -> &'static str {
            self.kernel_name
        }

        /// Returns the source code for the given kernel.
        pub fn source(&self) -> &'static str {
            self.kernel_source
        }
    }

    /// Name and source code of the OpenCL SDOT.
    #[cfg(feature = "opencl")]
    pub static CL_SDOT: DeviceKernel =
        DeviceKernel::new("sdot", include_str!("../kernels/opencl/sdot.cl"));

    /// Name and source code of the NVIDIA CUDA SDOT (as hand-written PTX).
    #[cfg(feature = "cuda")]
    pub static CUDA_SDOT: DeviceKernel =
        DeviceKernel::new("sdot", include_str!("../kernels/cuda/sdot.ptx"));

    /// Number of partial sums produced by one device dot product.
    pub const NB_PARTIALS: usize = crate::consts::GRID_SIZE_1D * crate::consts::BLOCK_SIZE_1D;

    #[cfg(feature = "opencl")]
    pub use self::opencl::ClDot;

    #[cfg(feature = "opencl")]
    mod opencl {
        use super::{DeviceKernel, NB_PARTIALS};
        use crate::consts::BLOCK_SIZE_1D;

        use ocl::ProQue;

        /// OpenCL dot product.
        ///
        /// The program is compiled once at creation; device buffers live for one call to
        /// [`ClDot::dot`].
        pub struct ClDot {
            pro_que: ProQue,
            kernel_name: &'static str,
        }

        impl ClDot {
            /// Builds the OpenCL program-queue object for `kernel_info`.
            pub fn new(kernel_info: &DeviceKernel) -> ocl::Result<Self> {
                let pro_que = ProQue::builder()
                    .src(kernel_info.source())
                    .dims(NB_PARTIALS)
                    .build()?;

                Ok(Self {
                    pro_que,
                    kernel_name: kernel_info.name(),
                })
            }

            /// Computes the dot product of `h_x` and `h_y` on the device.
            pub fn dot(&self, h_x: &[f32], h_y: &[f32]) -> ocl::Result<f32> {
                debug_assert_eq!(h_x.len(), h_y.len());
                if h_x.is_empty() {
                    return Ok(0.0);
                }

                // Create device vectors
                let d_x = self
                    .pro_que
                    .buffer_builder::<f32>()
                    .len(h_x.len())
                    .copy_host_slice(h_x)
                    .build()?;
                let d_y = self
                    .pro_que
                    .buffer_builder::<f32>()
                    .len(h_y.len())
                    .copy_host_slice(h_y)
                    .build()?;
                let d_partials = self
                    .pro_que
                    .buffer_builder::<f32>()
                    .len(NB_PARTIALS)
                    .fill_val(0.0)
                    .build()?;

                let kernel = self
                    .pro_que
                    .kernel_builder(self.kernel_name)
                    .local_work_size(BLOCK_SIZE_1D)
                    .arg(h_x.len() as u64)
                    .arg(&d_x)
                    .arg(&d_y)
                    .arg(&d_partials)
                    .build()?;

                unsafe {
                    kernel.enq()?;
                }

                let mut partials = vec![0.0_f32; NB_PARTIALS];
                d_partials.read(&mut partials).enq()?;
                self.pro_que.finish()?;

                Ok(partials.iter().sum())
            }
        }
    }

    #[cfg(feature = "cuda")]
    pub use self::cuda::CudaDot;

    #[cfg(feature = "cuda")]
    mod cuda {
        use super::{DeviceKernel, NB_PARTIALS};
        use crate::consts::{BLOCK_SIZE_1D, GRID_SIZE_1D};

        use cust::{context::Context, prelude::*};

        /// NVIDIA CUDA dot product.
        // NOTE: fields drop in declaration order, the context must go last.
        pub struct CudaDot {
            kernel_name: &'static str,
            module: Module,
            stream: Stream,
            _ctx: Context,
        }

        impl CudaDot {
            /// Initializes a CUDA context, loads the PTX module of `kernel_info` and creates the
            /// stream the kernel is launched on.
            pub fn new(kernel_info: &DeviceKernel) -> cust::error::CudaResult<Self> {
                let _ctx = cust::quick_init()?;
                let module = Module::from_ptx(kernel_info.source(), &[])?;
                let stream = Stream::new(StreamFlags::NON_BLOCKING, None)?;

                Ok(Self {
                    kernel_name: kernel_info.name(),
                    module,
                    stream,
                    _ctx,
                })
            }

            /// Computes the dot product of `h_x` and `h_y` on the device.
            pub fn dot(&self, h_x: &[f32], h_y: &[f32]) -> cust::error::CudaResult<f32> {
                debug_assert_eq!(h_x.len(), h_y.len());
                if h_x.is_empty() {
                    return Ok(0.0);
                }

                // Create device-side vectors
                let d_x = DeviceBuffer::from_slice(h_x)?;
                let d_y = DeviceBuffer::from_slice(h_y)?;
                let d_partials = DeviceBuffer::<f32>::zeroed(NB_PARTIALS)?;

                let kernel = self.module.get_function(self.kernel_name)?;
                let stream = &self.stream;

                unsafe {
                    launch!(
                        kernel<<<GRID_SIZE_1D as u32, BLOCK_SIZE_1D as u32, 0, stream>>>(
                            h_x.len(),
                            d_x.as_device_ptr(),
                            d_y.as_device_ptr(),
                            d_partials.as_device_ptr(),
                        )
                    )?;
                }
                stream.synchronize()?;

                let mut partials = vec![0.0_f32; NB_PARTIALS];
                d_partials.copy_to(&mut partials)?;

                Ok(partials.iter().sum())
            }
        }
    }
}

pub mod host {
    //! Host kernel implementations.
    //!
    //! Each kernel isolates one optimization axis: prefetching, unrolling, vector width or
    //! delegation to a tuned BLAS. The SIMD kernels use `std::arch` intrinsics on x86_64 (AVX is
    //! detected at runtime) and fall back to a portable implementation with the same accumulator
    //! layout, hence the same reduction order, everywhere else.
    //!
    //! Kernels accept any length. Elements past the last full vector width are folded in with
    //! scalar code, so a length that is not a multiple of the kernel's width costs a few extra
    //! scalar operations but never reads out of bounds.

    use crate::consts::{SIMD_PREFETCH_DISTANCE, WIDE_LANES};

    /// Hints the memory subsystem to bring the cache line holding `p` into every cache level.
    ///
    /// `p` may point past the end of an allocation: it is never dereferenced. Callers compute it
    /// with wrapping arithmetic, so any prefetch distance is accepted.
    #[inline(always)]
    fn prefetch(p: *const f32) {
        #[cfg(target_arch = "x86_64")]
        {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            // SAFETY: a prefetch is a hint, it never faults whatever the address.
            unsafe { _mm_prefetch::<_MM_HINT_T0>(p.cast::<i8>()) }
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = p;
    }

    /// Scalar dot product of the elements left over by a vectorized loop.
    #[inline(always)]
    fn tail_dot(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b).map(|(x, y)| x * y).sum()
    }

    // Naive implementation of the dot product: one accumulator, sequential pass.
    pub fn simple_dot(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        a.iter().zip(b).fold(0.0, |dot, (x, y)| dot + x * y)
    }

    // Naive implementation with a software prefetch of both operands `distance` elements ahead.
    pub fn prefetch_dot(a: &[f32], b: &[f32], distance: usize) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let mut dot = 0.0;
        for (i, (x, y)) in a.iter().zip(b).enumerate() {
            let ahead = i.wrapping_add(distance);
            prefetch(a.as_ptr().wrapping_add(ahead));
            prefetch(b.as_ptr().wrapping_add(ahead));
            dot += x * y;
        }
        dot
    }

    // Four independent accumulators covering strides of 4, summed at the end.
    pub fn unrolled_dot(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        let a_chunks = a.chunks_exact(4);
        let b_chunks = b.chunks_exact(4);
        let tail = tail_dot(a_chunks.remainder(), b_chunks.remainder());

        let (mut d0, mut d1, mut d2, mut d3) = (0.0, 0.0, 0.0, 0.0);
        for (x, y) in a_chunks.zip(b_chunks) {
            d0 += x[0] * y[0];
            d1 += x[1] * y[1];
            d2 += x[2] * y[2];
            d3 += x[3] * y[3];
        }

        d0 + d1 + d2 + d3 + tail
    }

    // One 4-lane vector accumulator, summed horizontally at the end.
    pub fn simd4_dot(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        #[cfg(target_arch = "x86_64")]
        let dot = x86::sse_dot(a, b);
        #[cfg(not(target_arch = "x86_64"))]
        let dot = portable::lanes_dot::<{ crate::consts::NARROW_LANES }>(a, b);

        dot
    }

    // One 8-lane vector accumulator, summed horizontally at the end.
    pub fn simd8_dot(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx") {
                // SAFETY: AVX support was checked above.
                return unsafe { x86::avx_dot(a, b) };
            }
        }

        portable::lanes_dot::<WIDE_LANES>(a, b)
    }

    // Two 8-lane vector accumulators advancing in lockstep.
    pub fn simd8_unrolled_dot(a: &[f32], b: &[f32]) -> f32 {
        simd8_unrolled(a, b, None)
    }

    // Two 8-lane vector accumulators, prefetching two vector widths ahead every iteration.
    pub fn simd8_unrolled_prefetch_dot(a: &[f32], b: &[f32]) -> f32 {
        simd8_unrolled(a, b, Some(SIMD_PREFETCH_DISTANCE))
    }

    fn simd8_unrolled(a: &[f32], b: &[f32], prefetch_distance: Option<usize>) -> f32 {
        debug_assert_eq!(a.len(), b.len());

        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx") {
                // SAFETY: AVX support was checked above.
                return unsafe { x86::avx_unrolled_dot(a, b, prefetch_distance) };
            }
        }

        portable::unrolled_lanes_dot::<WIDE_LANES>(a, b, prefetch_distance)
    }

    // Delegates to the vendor BLAS `sdot` with unit strides.
    #[cfg(feature = "blas")]
    pub fn blas_dot(a: &[f32], b: &[f32]) -> f32 {
        debug_assert_eq!(a.len(), b.len());
        // `cblas_sdot` counts elements with a 32-bit signed integer.
        let max_len = i32::MAX as usize;
        a.chunks(max_len)
            .zip(b.chunks(max_len))
            // SAFETY: both chunks hold `x.len()` elements and the strides are 1.
            .map(|(x, y)| unsafe { cblas::sdot(x.len() as i32, x, 1, y, 1) })
            .sum()
    }

    /// Describes the SIMD instruction sets the wide kernels will use on this machine.
    pub fn simd_support() -> &'static str {
        #[cfg(target_arch = "x86_64")]
        let support = if is_x86_feature_detected!("avx") {
            "SSE (4-wide), AVX (8-wide)"
        } else {
            "SSE (4-wide), portable (8-wide)"
        };
        #[cfg(not(target_arch = "x86_64"))]
        let support = "portable (4-wide, 8-wide)";

        support
    }

    mod portable {
        //! Fixed-size lane arrays standing in for vector registers.

        use super::{prefetch, tail_dot};

        pub fn lanes_dot<const L: usize>(a: &[f32], b: &[f32]) -> f32 {
            let a_chunks = a.chunks_exact(L);
            let b_chunks = b.chunks_exact(L);
            let tail = tail_dot(a_chunks.remainder(), b_chunks.remainder());

            let mut acc = [0.0_f32; L];
            for (x, y) in a_chunks.zip(b_chunks) {
                for l in 0..L {
                    acc[l] += x[l] * y[l];
                }
            }

            acc.iter().sum::<f32>() + tail
        }

        pub fn unrolled_lanes_dot<const L: usize>(
            a: &[f32],
            b: &[f32],
            prefetch_distance: Option<usize>,
        ) -> f32 {
            let a_chunks = a.chunks_exact(2 * L);
            let b_chunks = b.chunks_exact(2 * L);
            let tail = tail_dot(a_chunks.remainder(), b_chunks.remainder());

            let mut acc0 = [0.0_f32; L];
            let mut acc1 = [0.0_f32; L];
            for (i, (x, y)) in a_chunks.zip(b_chunks).enumerate() {
                if let Some(distance) = prefetch_distance {
                    let offset = (i * 2 * L).wrapping_add(distance);
                    prefetch(a.as_ptr().wrapping_add(offset));
                    prefetch(b.as_ptr().wrapping_add(offset));
                }
                for l in 0..L {
                    acc0[l] += x[l] * y[l];
                    acc1[l] += x[L + l] * y[L + l];
                }
            }

            acc0.iter().sum::<f32>() + acc1.iter().sum::<f32>() + tail
        }
    }

    #[cfg(target_arch = "x86_64")]
    mod x86 {
        //! x86_64 intrinsics. Loads are unaligned so the kernels also accept plain slices; on the
        //! aligned vectors of the benchmark they run at the speed of aligned loads.

        use super::{prefetch, tail_dot};

        use std::arch::x86_64::*;

        /// Sums the lanes of a 128-bit register, lane 0 first.
        #[inline(always)]
        unsafe fn hsum128(v: __m128) -> f32 {
            let mut lanes = [0.0_f32; 4];
            _mm_storeu_ps(lanes.as_mut_ptr(), v);
            lanes.iter().sum()
        }

        /// Sums the lanes of a 256-bit register, lane 0 first.
        #[inline]
        #[target_feature(enable = "avx")]
        unsafe fn hsum256(v: __m256) -> f32 {
            let mut lanes = [0.0_f32; 8];
            _mm256_storeu_ps(lanes.as_mut_ptr(), v);
            lanes.iter().sum()
        }

        pub fn sse_dot(a: &[f32], b: &[f32]) -> f32 {
            let len = a.len().min(b.len());
            let body = len - len % 4;

            // SAFETY: SSE is part of the x86_64 baseline and every load stays below `body`.
            unsafe {
                let mut acc = _mm_setzero_ps();
                let mut i = 0;
                while i < body {
                    let va = _mm_loadu_ps(a.as_ptr().add(i));
                    let vb = _mm_loadu_ps(b.as_ptr().add(i));
                    acc = _mm_add_ps(acc, _mm_mul_ps(va, vb));
                    i += 4;
                }

                hsum128(acc) + tail_dot(&a[body..len], &b[body..len])
            }
        }

        #[target_feature(enable = "avx")]
        pub unsafe fn avx_dot(a: &[f32], b: &[f32]) -> f32 {
            let len = a.len().min(b.len());
            let body = len - len % 8;

            let mut acc = _mm256_setzero_ps();
            let mut i = 0;
            while i < body {
                let va = _mm256_loadu_ps(a.as_ptr().add(i));
                let vb = _mm256_loadu_ps(b.as_ptr().add(i));
                acc = _mm256_add_ps(acc, _mm256_mul_ps(va, vb));
                i += 8;
            }

            hsum256(acc) + tail_dot(&a[body..len], &b[body..len])
        }

        #[target_feature(enable = "avx")]
        pub unsafe fn avx_unrolled_dot(
            a: &[f32],
            b: &[f32],
            prefetch_distance: Option<usize>,
        ) -> f32 {
            let len = a.len().min(b.len());
            let body = len - len % 16;

            let mut acc0 = _mm256_setzero_ps();
            let mut acc1 = _mm256_setzero_ps();
            let mut i = 0;
            while i < body {
                if let Some(distance) = prefetch_distance {
                    let ahead = i.wrapping_add(distance);
                    prefetch(a.as_ptr().wrapping_add(ahead));
                    prefetch(b.as_ptr().wrapping_add(ahead));
                }
                let va0 = _mm256_loadu_ps(a.as_ptr().add(i));
                let vb0 = _mm256_loadu_ps(b.as_ptr().add(i));
                let va1 = _mm256_loadu_ps(a.as_ptr().add(i + 8));
                let vb1 = _mm256_loadu_ps(b.as_ptr().add(i + 8));
                acc0 = _mm256_add_ps(acc0, _mm256_mul_ps(va0, vb0));
                acc1 = _mm256_add_ps(acc1, _mm256_mul_ps(va1, vb1));
                i += 16;
            }

            hsum256(acc0) + hsum256(acc1) + tail_dot(&a[body..len], &b[body..len])
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::consts::NARROW_LANES;
        use crate::utils::{rand_vector, reference_dot, seeded_rng};

        use approx::assert_relative_eq;
        use proptest::prelude::*;

        fn prefetch_64_dot(a: &[f32], b: &[f32]) -> f32 {
            prefetch_dot(a, b, 64)
        }

        #[allow(unused_mut)]
        fn all_kernels() -> Vec<(&'static str, fn(&[f32], &[f32]) -> f32)> {
            let mut kernels: Vec<(&'static str, fn(&[f32], &[f32]) -> f32)> = vec![
                ("simple", simple_dot),
                ("prefetch", prefetch_64_dot),
                ("unrolled", unrolled_dot),
                ("simd4", simd4_dot),
                ("simd8", simd8_dot),
                ("simd8_unrolled", simd8_unrolled_dot),
                ("simd8_unrolled_prefetch", simd8_unrolled_prefetch_dot),
            ];
            #[cfg(feature = "blas")]
            kernels.push(("blas", blas_dot));
            kernels
        }

        #[test]
        fn simple_small_vector() {
            assert_eq!(simple_dot(&[1.0, 2.0, 3.0, 4.0], &[1.0, 1.0, 1.0, 1.0]), 10.0);
        }

        #[test]
        fn ones_are_exact_for_every_kernel() {
            let ones = vec![1.0_f32; 1024];
            for (name, kernel) in all_kernels() {
                assert_eq!(kernel(&ones, &ones), 1024.0, "kernel `{name}`");
            }
        }

        #[test]
        fn empty_vectors_give_zero() {
            for (name, kernel) in all_kernels() {
                assert_eq!(kernel(&[], &[]), 0.0, "kernel `{name}`");
            }
        }

        #[test]
        fn tails_are_folded_in() {
            // 19 is a multiple of none of the vector widths.
            let a: Vec<f32> = (1..=19).map(|x| x as f32).collect();
            let b = vec![2.0_f32; 19];
            for (name, kernel) in all_kernels() {
                assert_eq!(kernel(&a, &b), 380.0, "kernel `{name}`");
            }
        }

        #[test]
        fn kernels_are_idempotent() {
            let mut rng = seeded_rng(Some(3));
            let a = rand_vector(4096, &mut rng).unwrap();
            let b = rand_vector(4096, &mut rng).unwrap();
            for (name, kernel) in all_kernels() {
                let first = kernel(&a, &b);
                let second = kernel(&a, &b);
                assert_eq!(first.to_bits(), second.to_bits(), "kernel `{name}`");
            }
        }

        #[test]
        fn prefetching_does_not_change_the_result() {
            let mut rng = seeded_rng(Some(11));
            let a = rand_vector(1 << 12, &mut rng).unwrap();
            let b = rand_vector(1 << 12, &mut rng).unwrap();
            assert_eq!(simple_dot(&a, &b), prefetch_dot(&a, &b, 1 << 20));
            assert_eq!(simd8_unrolled_dot(&a, &b), simd8_unrolled_prefetch_dot(&a, &b));
        }

        #[test]
        fn huge_prefetch_distance_wraps_around() {
            let a: Vec<f32> = (1..=40).map(|x| x as f32).collect();
            let b = vec![0.5_f32; 40];
            for distance in [usize::MAX, usize::MAX - 3, usize::MAX / 2 + 1] {
                assert_eq!(prefetch_dot(&a, &b, distance), 410.0);
                assert_eq!(
                    portable::unrolled_lanes_dot::<WIDE_LANES>(&a, &b, Some(distance)),
                    410.0
                );
                #[cfg(target_arch = "x86_64")]
                if is_x86_feature_detected!("avx") {
                    // SAFETY: AVX support was checked above.
                    let dot = unsafe { x86::avx_unrolled_dot(&a, &b, Some(distance)) };
                    assert_eq!(dot, 410.0);
                }
            }
        }

        #[test]
        fn intrinsics_match_portable_lanes() {
            let mut rng = seeded_rng(Some(5));
            let a = rand_vector(1000, &mut rng).unwrap();
            let b = rand_vector(1000, &mut rng).unwrap();
            assert_eq!(simd4_dot(&a, &b), portable::lanes_dot::<NARROW_LANES>(&a, &b));
            assert_eq!(simd8_dot(&a, &b), portable::lanes_dot::<WIDE_LANES>(&a, &b));
            assert_eq!(
                simd8_unrolled_dot(&a, &b),
                portable::unrolled_lanes_dot::<WIDE_LANES>(&a, &b, None)
            );
        }

        #[test]
        fn large_random_vectors_agree() {
            let mut rng = seeded_rng(Some(2024));
            let a = rand_vector(1 << 20, &mut rng).unwrap();
            let b = rand_vector(1 << 20, &mut rng).unwrap();

            let unrolled = unrolled_dot(&a, &b);
            let simd4 = simd4_dot(&a, &b);
            let simd8 = simd8_dot(&a, &b);
            assert_relative_eq!(unrolled, simd4, max_relative = 1e-4);
            assert_relative_eq!(unrolled, simd8, max_relative = 1e-4);
            assert_relative_eq!(simd4, simd8, max_relative = 1e-4);

            // A single accumulator loses more bits over a million additions.
            let simple = simple_dot(&a, &b);
            assert_relative_eq!(simple, simd8, max_relative = 1e-3);

            let reference = reference_dot(&a, &b);
            assert_relative_eq!(f64::from(simd8), reference, max_relative = 1e-4);
        }

        #[test]
        fn simd_support_is_reported() {
            assert!(simd_support().contains("4-wide"));
        }

        proptest! {
            #[test]
            fn kernels_match_reference(
                values in (1_usize..32).prop_flat_map(|blocks| {
                    proptest::collection::vec((0.0_f32..1.0, 0.0_f32..1.0), blocks * 16)
                })
            ) {
                let (a, b): (Vec<f32>, Vec<f32>) = values.into_iter().unzip();
                let reference = reference_dot(&a, &b);
                for (name, kernel) in all_kernels() {
                    let dot = f64::from(kernel(&a, &b));
                    prop_assert!(
                        (dot - reference).abs() <= 1e-4 * reference.abs() + 1e-5,
                        "kernel `{}`: {} vs {}", name, dot, reference
                    );
                }
            }
        }
    }
}
