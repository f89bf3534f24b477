//! Crate-level constants.

/// Default number of meta repetitions (trials) performed when benchmarking a kernel.
pub const META_REPETITIONS: u8 = 100;

/// Default number of tight loop repetitions performed when benchmarking a kernel.
pub const TIGHT_LOOP_REPETITIONS: u16 = 1;

/// Size in bytes of each generated vector in a default run (128 MiB).
pub const VECTOR_BYTES: usize = 128 << 20;

/// Default number of elements per vector.
pub const VECTOR_LENGTH: usize = VECTOR_BYTES / std::mem::size_of::<f32>();

/// Alignment in bytes of generated vectors, the width of a 256-bit register.
pub const VECTOR_ALIGNMENT: usize = 32;

/// Default seed for the random number generator (RNG).
pub const SEED: u64 = 0;

/// Default distance, in elements, between the current read position and the prefetched address
/// in the scalar prefetching kernel.
pub const PREFETCH_DISTANCE: usize = 256;

/// Number of `f32` lanes in a 128-bit register.
pub const NARROW_LANES: usize = 4;

/// Number of `f32` lanes in a 256-bit register.
pub const WIDE_LANES: usize = 8;

/// Distance, in elements, of the prefetch issued by the unrolled wide SIMD kernel: two vector
/// widths ahead.
pub const SIMD_PREFETCH_DISTANCE: usize = 2 * WIDE_LANES;

/// Relative difference to the reference result above which a kernel result is reported as
/// suspicious.
pub const RESULT_TOLERANCE: f64 = 1e-3;

/// Number of threads per block (or work-items per work-group) of the device dot product.
pub const BLOCK_SIZE_1D: usize = 256;

/// Number of blocks (or work-groups) of the device dot product.
// NOTE: each device thread writes one partial sum, summed on the host afterwards.
pub const GRID_SIZE_1D: usize = 256;
