//! Performance report related structures and functions.
//!
//! This module defines all the necessary data structures and functions needed to generate
//! performance reports out of the recorded execution times of the benchmarked kernels.

use crate::{
    error::{BenchError, Result},
    timer::Measurement,
};

use clap::ValueEnum;
use statistical::{mean, standard_deviation};

use std::{fmt, io::Write, mem::size_of};

/// Enum defining the target of kernel.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TargetKind {
    Host,
    Device,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Device => write!(f, "device"),
        }
    }
}

/// Host-specific possible dot-product implementations, in registration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum HostKernelVariant {
    /// Single accumulator, sequential pass.
    Simple,
    /// Single accumulator with software prefetching.
    Prefetch,
    /// Four scalar accumulators.
    Unrolled,
    /// 4-wide SIMD accumulator.
    Simd4,
    /// 8-wide SIMD accumulator.
    Simd8,
    /// Two 8-wide SIMD accumulators.
    Simd8Unrolled,
    /// Two 8-wide SIMD accumulators with software prefetching.
    Simd8UnrolledPrefetch,
    /// Vendor CPU BLAS `sdot`.
    #[cfg(feature = "blas")]
    Blas,
}

impl HostKernelVariant {
    /// Every compiled-in host variant, in the order they are benchmarked.
    pub fn all() -> &'static [Self] {
        Self::value_variants()
    }

    /// Number of elements the vector length must be a multiple of for the kernel's vectorized
    /// loop to cover the whole input.
    pub fn required_multiple(&self) -> usize {
        match self {
            Self::Simple | Self::Prefetch => 1,
            Self::Unrolled | Self::Simd4 => 4,
            Self::Simd8 => 8,
            Self::Simd8Unrolled | Self::Simd8UnrolledPrefetch => 16,
            #[cfg(feature = "blas")]
            Self::Blas => 1,
        }
    }
}

impl fmt::Display for HostKernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple => write!(f, "Simple"),
            Self::Prefetch => write!(f, "Prefetch"),
            Self::Unrolled => write!(f, "Unrolled"),
            Self::Simd4 => write!(f, "SIMD4"),
            Self::Simd8 => write!(f, "SIMD8"),
            Self::Simd8Unrolled => write!(f, "SIMD8 unrolled"),
            Self::Simd8UnrolledPrefetch => write!(f, "SIMD8 unrolled prefetch"),
            #[cfg(feature = "blas")]
            Self::Blas => write!(f, "BLAS"),
        }
    }
}

/// Device-specific possible dot-product implementations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKernelVariant {
    OpenCl,
    Cuda,
}

impl fmt::Display for DeviceKernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenCl => write!(f, "OpenCL"),
            Self::Cuda => write!(f, "CUDA"),
        }
    }
}

/// A benchmarked kernel implementation, on either target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelVariant {
    Host(HostKernelVariant),
    Device(DeviceKernelVariant),
}

impl KernelVariant {
    pub fn target(&self) -> TargetKind {
        match self {
            Self::Host(_) => TargetKind::Host,
            Self::Device(_) => TargetKind::Device,
        }
    }
}

impl fmt::Display for KernelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host(v) => fmt::Display::fmt(v, f),
            Self::Device(v) => fmt::Display::fmt(v, f),
        }
    }
}

/// Performance information and statistics of a benchmark.
#[derive(Clone, Debug)]
pub struct PerfReport {
    /// Implementation variant of the kernel.
    variant: KernelVariant,
    /// Number of elements per vector.
    nb_elems: usize,
    /// Size in bytes of the data read by the kernel.
    nb_bytes: usize,
    /// Number of floating-point operations.
    nb_flops: usize,
    /// Minimum recorded runtime in seconds.
    min_time: f64,
    /// Median recorded runtime in seconds.
    median_time: f64,
    /// Maximum recorded runtime in seconds.
    max_time: f64,
    /// Average runtime in seconds.
    avg_time: f64,
    /// Runtime standard deviation.
    stddev_time: f64,
    /// Arithmetic intensity in FLOPs/byte.
    arithmetic_intensity: f64,
    /// Memory bandwidth in GiB/s.
    memory_bandwidth: f64,
    /// Computational performance in GFLOP/s.
    computational_performance: f64,
    /// Dot product computed by the last run of the kernel.
    result: f32,
}

impl PerfReport {
    pub fn print_csv_header(output: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            output,
            "target,kernel,variant,elems,Bytes,FLOPs,min_runtime,median_runtime,max_runtime,avg_runtime,stddev,FLOPs/Byte,GiB/s,GFLOP/s,result"
        )
    }

    /// Creates a new `PerfReport` given a kernel variant, the number of elements per vector and
    /// the measurement recorded by the timing harness.
    pub fn new(variant: KernelVariant, nb_elems: usize, measurement: Measurement) -> Result<Self> {
        let Measurement {
            mut durations,
            result,
        } = measurement;
        if durations.is_empty() {
            return Err(BenchError::NoSamples);
        }

        // Sort durations to avoid having to do two passes to get both min and max elements
        durations.sort_by(f64::total_cmp);

        let min_time = durations[0];
        let median_time = durations[durations.len() / 2];
        let max_time = durations[durations.len() - 1];
        let avg_time = mean(&durations);
        let stddev_time = if durations.len() > 1 {
            standard_deviation(&durations, Some(avg_time))
        } else {
            0.0
        };

        // Both vectors are read once; each element costs one multiplication and one addition.
        let nb_bytes = 2 * size_of::<f32>() * nb_elems;
        let nb_flops = 2 * nb_elems;

        let memory_bandwidth = nb_bytes as f64 / 1024_f64.powi(3) / avg_time;
        let arithmetic_intensity = nb_flops as f64 / nb_bytes as f64;
        let computational_performance = nb_flops as f64 / (1e9 * avg_time);

        Ok(Self {
            variant,
            nb_elems,
            nb_bytes,
            nb_flops,
            min_time,
            median_time,
            max_time,
            avg_time,
            stddev_time,
            arithmetic_intensity,
            memory_bandwidth,
            computational_performance,
            result,
        })
    }

    pub fn variant(&self) -> KernelVariant {
        self.variant
    }

    pub fn nb_elems(&self) -> usize {
        self.nb_elems
    }

    /// Average runtime in seconds.
    pub fn avg_time(&self) -> f64 {
        self.avg_time
    }

    pub fn min_time(&self) -> f64 {
        self.min_time
    }

    pub fn median_time(&self) -> f64 {
        self.median_time
    }

    pub fn max_time(&self) -> f64 {
        self.max_time
    }

    pub fn result(&self) -> f32 {
        self.result
    }

    /// Writes the report as `label<TAB>mean seconds`.
    pub fn print_text(&self, output: &mut dyn Write) -> std::io::Result<()> {
        writeln!(output, "{}\t{}", self.variant, self.avg_time)
    }
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},sdot,{},{},{},{},{:18.15},{:18.15},{:18.15},{:18.15},{},{},{},{},{}",
            self.variant.target(),
            self.variant,
            self.nb_elems,
            self.nb_bytes,
            self.nb_flops,
            self.min_time * 1e3,
            self.median_time * 1e3,
            self.max_time * 1e3,
            self.avg_time * 1e3,
            self.stddev_time * 1e3,
            self.arithmetic_intensity,
            self.memory_bandwidth,
            self.computational_performance,
            self.result,
        )
    }
}
