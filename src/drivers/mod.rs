//! Kernel drivers.
//!
//! This module provides the API for appropriately initializing and profiling the kernels, as well
//! as post-processing the results. It acts as a layer abstracting over the kernel's target: either
//! the host (CPU) or the device (GPU, FPGA, etc...).
//!
//! # High-level approach for kernel profiling
//! ## 1. Data initialization
//! For every requested vector length, two vectors are drawn from the same seeded random number
//! generator, in aligned memory. They are shared immutably by all kernel variants so the values
//! cannot impact the performance of the profiled implementation. Device drivers copy them to
//! device memory on every call.
//!
//! ## 2. Performance evaluation
//! This step consists in measuring the execution time of the chosen kernel. In order to get
//! an accurate evaluation of a kernel's performance, we repeat this process in a "meta
//! repetitions loop" (see [`crate::consts`] for the default amount of meta repetitions and
//! [`crate::cli`] for overriding the default from the command-line).
//!
//! When measuring kernels that operate on very few data, the execution time can be increased by
//! repeatedly calling the kernel in a tight loop and averaging the elapsed time over the number of
//! iterations of this loop.
//!
//! ## 3. Post-processing
//! This step consists in extracting performance metrics from the recorded execution times of the
//! kernel and information about the manipulated data, such as computational performance (in
//! GFLOP/s), memory bandwidth (in GiB/s) or arithmetic intensity (in FLOPs/Byte). Each kernel's
//! result is also checked against a double-precision reference.
//!
//! The resulting metrics are then outputted to `stdout`, or a file if specified.

mod device;
mod host;

use crate::{
    cli::{CliArgs, OutputFormat},
    consts::RESULT_TOLERANCE,
    error::{BenchError, Result},
    kernels::host::simd_support,
    perf_report::*,
    timer::{Clock, MonotonicClock},
    utils::*,
};

use tracing::{debug, info, warn};

use std::{
    fs::OpenOptions,
    io::{self, stdout, Write},
};

/// Driver function for the single-precision dot product. It runs every selected kernel variant
/// on each requested vector length and writes each report as soon as it is measured.
pub fn sdot(args: &CliArgs) -> Result<()> {
    let mut output: Box<dyn Write> = match args.output_file {
        Some(ref name) => Box::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(name)?,
        ),
        None => Box::new(stdout().lock()),
    };

    let mut writer = ReportWriter::new(&mut output, args.format);
    run(args, &MonotonicClock::new(), &mut writer)?;

    Ok(())
}

/// Reports of the kernels profiled on one requested vector length.
#[derive(Debug)]
pub struct LengthReports {
    pub nb_elems: usize,
    pub reports: Vec<PerfReport>,
}

/// Generates the data and profiles the selected kernels, timing them against `clock`.
///
/// Every report goes to `writer` right after its kernel has been measured, so a fatal error on a
/// later kernel keeps the timings already produced. The reports are also returned, grouped by
/// requested length in request order.
pub fn run<C: Clock + ?Sized>(
    args: &CliArgs,
    clock: &C,
    writer: &mut ReportWriter,
) -> Result<Vec<LengthReports>> {
    let host_kernels = args.host_kernels();

    // Reject every bad length before spending time on data generation
    let multiple = required_multiple(&host_kernels);
    for &len in &args.lengths {
        check_length(len, multiple)?;
    }

    info!(simd = simd_support(), "SIMD support detected");

    let mut rng = seeded_rng(args.seed);
    let mut groups = Vec::with_capacity(args.lengths.len());

    for &len in &args.lengths {
        info!("Generating {len} element vectors");
        writer.begin_length(len)?;
        let a = rand_vector(len, &mut rng)?;
        let b = rand_vector(len, &mut rng)?;
        let reference = reference_dot(&a, &b);

        let mut reports = Vec::new();
        for &variant in &host_kernels {
            info!(kernel = %variant, "Profiling host kernel");
            let report = host::sdot(
                clock,
                &a,
                &b,
                args.meta_repetitions,
                args.tight_loop_repetitions,
                args.prefetch_distance,
                variant,
            )?;
            debug!(
                min = report.min_time(),
                median = report.median_time(),
                max = report.max_time(),
                "{variant} profiled"
            );
            check_result(&report, reference);
            writer.write(&report)?;
            reports.push(report);
        }

        if !args.host_only {
            for report in device::sdot(
                clock,
                &a,
                &b,
                args.meta_repetitions,
                args.tight_loop_repetitions,
            )? {
                check_result(&report, reference);
                writer.write(&report)?;
                reports.push(report);
            }
        }

        groups.push(LengthReports {
            nb_elems: len,
            reports,
        });
    }

    Ok(groups)
}

/// Smallest length multiple satisfying every kernel of `kernels`.
pub fn required_multiple(kernels: &[HostKernelVariant]) -> usize {
    kernels
        .iter()
        .map(HostKernelVariant::required_multiple)
        .fold(1, lcm)
}

/// Checks that `len` is a multiple of `multiple`.
pub fn check_length(len: usize, multiple: usize) -> Result<()> {
    if len % multiple != 0 {
        return Err(BenchError::IndivisibleLength { len, multiple });
    }
    Ok(())
}

/// Warns when a kernel's result strays from the double-precision reference.
fn check_result(report: &PerfReport, reference: f64) {
    let diff = relative_difference(f64::from(report.result()), reference);
    if diff > RESULT_TOLERANCE {
        warn!(
            kernel = %report.variant(),
            result = report.result(),
            reference,
            "result differs from the reference by {diff:e}"
        );
    }
}

/// Incremental writer of the benchmark output.
///
/// In text format, every requested vector length opens with a line giving its number of
/// elements, followed by one line per kernel. In CSV format, the header is written once, before
/// the first row. The output is flushed after every line.
pub struct ReportWriter<'a> {
    output: &'a mut dyn Write,
    format: OutputFormat,
    header_written: bool,
}

impl<'a> ReportWriter<'a> {
    pub fn new(output: &'a mut dyn Write, format: OutputFormat) -> Self {
        Self {
            output,
            format,
            header_written: false,
        }
    }

    /// Starts the block of a new vector length.
    pub fn begin_length(&mut self, nb_elems: usize) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => {
                writeln!(self.output, "Generating {nb_elems} element vectors.")?;
            }
            OutputFormat::Csv if !self.header_written => {
                PerfReport::print_csv_header(self.output)?;
                self.header_written = true;
            }
            OutputFormat::Csv => return Ok(()),
        }
        self.output.flush()
    }

    /// Writes the report of one kernel.
    pub fn write(&mut self, report: &PerfReport) -> io::Result<()> {
        match self.format {
            OutputFormat::Text => report.print_text(self.output)?,
            OutputFormat::Csv => writeln!(self.output, "{report}")?,
        }
        self.output.flush()
    }
}
