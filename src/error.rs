//! Error types.
//!
//! Every error in the benchmark is fatal: drivers propagate them up to `main`, which logs them and
//! exits.

use thiserror::Error;

/// Result type used throughout the benchmark.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can abort a benchmark run.
#[derive(Debug, Error)]
pub enum BenchError {
    /// An aligned vector could not be allocated.
    #[error("failed to allocate {len} floats aligned on {align} bytes")]
    Alloc { len: usize, align: usize },

    /// A vector length does not satisfy the width requirement of the selected kernels.
    #[error("vector length {len} is not a multiple of {multiple}, required by the selected kernels")]
    IndivisibleLength { len: usize, multiple: usize },

    /// A performance report was requested without any recorded duration.
    #[error("no execution time was recorded")]
    NoSamples,

    /// OpenCL reported a non-success status.
    #[cfg(feature = "opencl")]
    #[error("OpenCL error: {0}")]
    OpenCl(#[from] ocl::Error),

    /// CUDA reported a non-success status.
    #[cfg(feature = "cuda")]
    #[error("CUDA error: {0}")]
    Cuda(#[from] cust::error::CudaError),

    /// Failed to write the benchmark output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
