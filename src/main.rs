//! SDOT-BENCH - Single-precision dot product micro-benchmarks
//!
//! # About
//! SDOT-BENCH measures the wall-clock time of a dot product over large single-precision vectors
//! (128 MiB each by default), using progressively more aggressive optimization strategies. Each
//! strategy isolates one axis so that relative timings reveal which one matters most for this
//! memory-bound access pattern:
//! - a naive scalar loop;
//! - the same loop with software prefetching;
//! - four independent scalar accumulators;
//! - 4-wide (SSE) and 8-wide (AVX) SIMD accumulators;
//! - two 8-wide accumulators, with and without software prefetching;
//! - a vendor CPU BLAS `sdot` (feature `blas`);
//! - a device dot product on a GPU through OpenCL (feature `opencl`) or CUDA (feature `cuda`).
//!
//! # Quickstart
//! ## Build
//! ```sh
//! cargo build --release
//! cargo build --release --features blas,opencl,cuda
//! ```
//!
//! The `blas` feature links against OpenBLAS, `opencl` against an [OpenCL][1] library and `cuda`
//! requires the [NVIDIA CUDA Toolkit][2] driver.
//!
//! ## Example run
//! Without any argument, every kernel is benchmarked over 100 trials on 33554432-element vectors.
//! Each line holds the kernel label and its average time in seconds, separated by a tab:
//! ```sh
//! cargo run --release
//!
//! Generating 33554432 element vectors.
//! Simple	0.0301
//! Prefetch	0.0297
//! ...
//! ```
//!
//! To profile only the SIMD kernels on several lengths and get a full CSV report:
//! ```sh
//! cargo run --release -- -k simd4 simd8 -l 1048576 16777216 -f csv -o sdot.csv
//! ```
//!
//! Progress is logged to `stderr`; set `RUST_LOG=debug` for per-kernel details.
//!
//! [1]: https://www.khronos.org/opencl/
//! [2]: https://developer.nvidia.com/cuda-downloads

// Links the BLAS implementation `cblas` calls into.
#[cfg(feature = "blas")]
extern crate blas_src;

pub mod cli;
pub mod consts;
pub mod drivers;
pub mod error;
pub mod kernels;
pub mod perf_report;
pub mod timer;
pub mod utils;

use crate::cli::CliArgs;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    if let Err(err) = drivers::sdot(&args) {
        error!("{err}");
        std::process::exit(1);
    }
}
