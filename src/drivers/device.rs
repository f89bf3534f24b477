//! Device kernel drivers.
//!
//! This module implements the driver functions responsible for profiling the dot product on
//! available devices (GPUs, FPGAs, etc...).
//!
//! # Crates used for calling kernels on a device
//! - [`ocl`][1] for an idiomatic Rust implementation of OpenCL bindings (feature `opencl`);
//! - [`cust`][2] for an ecosystem of libraries and tools enabling the launch of CUDA kernels from
//!   Rust (feature `cuda`).
//!
//! Device setup (context, program or module, queue or stream) happens once before the trials and
//! is torn down after the last one. Every timed call copies both vectors to the device, so the
//! measured time includes host-to-device transfers.
//!
//! [1]: https://crates.io/crates/ocl
//! [2]: https://crates.io/crates/cust

use crate::{error::Result, perf_report::PerfReport, timer::Clock};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use crate::{
    kernels::device::DeviceKernel,
    perf_report::{DeviceKernelVariant, KernelVariant},
    timer::measure,
};

#[cfg(any(feature = "opencl", feature = "cuda"))]
use tracing::{debug, info};

/// Profiles every compiled-in device dot product.
pub fn sdot<C: Clock + ?Sized>(
    clock: &C,
    h_x: &[f32],
    h_y: &[f32],
    meta_reps: u8,
    tight_reps: u16,
) -> Result<Vec<PerfReport>> {
    #[allow(unused_mut)]
    let mut reports = Vec::new();

    #[cfg(feature = "opencl")]
    reports.push(ocl_sdot(
        clock,
        &crate::kernels::device::CL_SDOT,
        h_x,
        h_y,
        meta_reps,
        tight_reps,
    )?);

    #[cfg(feature = "cuda")]
    reports.push(cuda_sdot(
        clock,
        &crate::kernels::device::CUDA_SDOT,
        h_x,
        h_y,
        meta_reps,
        tight_reps,
    )?);

    #[cfg(not(any(feature = "opencl", feature = "cuda")))]
    let _ = (clock, h_x, h_y, meta_reps, tight_reps);

    Ok(reports)
}

/// OpenCL device driver for the single-precision dot product.
#[cfg(feature = "opencl")]
pub fn ocl_sdot<C: Clock + ?Sized>(
    clock: &C,
    kernel_info: &DeviceKernel,
    h_x: &[f32],
    h_y: &[f32],
    meta_reps: u8,
    tight_reps: u16,
) -> Result<PerfReport> {
    use crate::kernels::device::ClDot;

    assert_eq!(h_x.len(), h_y.len());

    // Create OpenCL program-queue object
    let cl_dot = ClDot::new(kernel_info)?;
    info!(kernel = kernel_info.name(), "OpenCL program built");

    // Measure execution time of device kernel
    let measurement = measure(clock, meta_reps, tight_reps, || Ok(cl_dot.dot(h_x, h_y)?))?;
    debug!(
        mean = measurement.mean(),
        result = measurement.result,
        "OpenCL kernel profiled"
    );

    PerfReport::new(
        KernelVariant::Device(DeviceKernelVariant::OpenCl),
        h_x.len(),
        measurement,
    )
}

/// NVIDIA CUDA device driver for the single-precision dot product.
#[cfg(feature = "cuda")]
pub fn cuda_sdot<C: Clock + ?Sized>(
    clock: &C,
    kernel_info: &DeviceKernel,
    h_x: &[f32],
    h_y: &[f32],
    meta_reps: u8,
    tight_reps: u16,
) -> Result<PerfReport> {
    use crate::kernels::device::CudaDot;

    assert_eq!(h_x.len(), h_y.len());

    // Initialize CUDA context, module and stream
    let cuda_dot = CudaDot::new(kernel_info)?;
    info!(kernel = kernel_info.name(), "CUDA module loaded");

    // Measure execution time of kernel
    let measurement = measure(clock, meta_reps, tight_reps, || Ok(cuda_dot.dot(h_x, h_y)?))?;
    debug!(
        mean = measurement.mean(),
        result = measurement.result,
        "CUDA kernel profiled"
    );

    PerfReport::new(
        KernelVariant::Device(DeviceKernelVariant::Cuda),
        h_x.len(),
        measurement,
    )
}
