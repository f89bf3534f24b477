//! Command-Line Interface related code.
//!
//! This module handles the parsing of CLI arguments using the [`clap`][1] crate.
//! It defines the availables runtime options. Every option has a default, so running without any
//! argument benchmarks all kernels on 128 MiB vectors.
//!
//! [1]: https://crates.io/crates/clap

use crate::{consts, perf_report::HostKernelVariant};

use clap::{Parser, ValueEnum};

use std::path::PathBuf;

/// Single-precision dot product micro-benchmarks.
///
/// Times a family of dot-product kernels over large random vectors: a naive scalar loop, software
/// prefetching, loop unrolling, 4-wide and 8-wide SIMD, vendor BLAS and GPU offload.
#[derive(Clone, Debug, Parser)]
#[command(version)]
pub struct CliArgs {
    /// Lengths of the vectors.
    #[arg(
        short,
        long,
        value_name = "LEN",
        num_args = 1..,
        default_values_t = [consts::VECTOR_LENGTH],
    )]
    pub lengths: Vec<usize>,

    /// Number of meta-repetitions (trials) for each kernel.
    #[arg(
        short,
        long,
        value_name = "META_REPS",
        default_value_t = consts::META_REPETITIONS,
        value_parser = clap::value_parser!(u8).range(2..u8::MAX.into()),
    )]
    pub meta_repetitions: u8,

    /// Number of repetitions of the tight loop.
    #[arg(
        short,
        long,
        value_name = "TIGHT_REPS",
        default_value_t = consts::TIGHT_LOOP_REPETITIONS,
        value_parser = clap::value_parser!(u16).range(1..u16::MAX.into()),
    )]
    pub tight_loop_repetitions: u16,

    /// Distance, in elements, of the software prefetch of the scalar prefetching kernel.
    #[arg(
        short,
        long,
        value_name = "ELEMS",
        default_value_t = consts::PREFETCH_DISTANCE,
    )]
    pub prefetch_distance: usize,

    /// Host kernels to benchmark, defaults to all of them.
    #[arg(short, long, value_enum, num_args = 1..)]
    pub kernels: Option<Vec<HostKernelVariant>>,

    /// Do not benchmark the device (GPU) kernels.
    #[arg(long)]
    pub host_only: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Output file, defaults to `stdout` if unspecified.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Seed for the random number generator (RNG).
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,
}

impl CliArgs {
    /// Host kernels to run, in registration order.
    pub fn host_kernels(&self) -> Vec<HostKernelVariant> {
        match &self.kernels {
            Some(selected) => HostKernelVariant::all()
                .iter()
                .copied()
                .filter(|v| selected.contains(v))
                .collect(),
            None => HostKernelVariant::all().to_vec(),
        }
    }
}

/// Available output formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One `label<TAB>seconds` line per kernel.
    Text,
    /// Full performance report as CSV.
    Csv,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_constants() {
        let args = CliArgs::try_parse_from(["sdot-bench"]).unwrap();
        assert_eq!(args.lengths, vec![33_554_432]);
        assert_eq!(args.meta_repetitions, 100);
        assert_eq!(args.tight_loop_repetitions, 1);
        assert_eq!(args.prefetch_distance, consts::PREFETCH_DISTANCE);
        assert_eq!(args.format, OutputFormat::Text);
        assert!(!args.host_only);
        assert_eq!(args.host_kernels(), HostKernelVariant::all());
    }

    #[test]
    fn kernel_selection_keeps_registration_order() {
        let args =
            CliArgs::try_parse_from(["sdot-bench", "-k", "simd8", "simple", "simd8-unrolled"])
                .unwrap();
        assert_eq!(
            args.host_kernels(),
            vec![
                HostKernelVariant::Simple,
                HostKernelVariant::Simd8,
                HostKernelVariant::Simd8Unrolled,
            ]
        );
    }

    #[test]
    fn multiple_lengths_and_csv() {
        let args =
            CliArgs::try_parse_from(["sdot-bench", "-l", "1024", "4096", "-f", "csv", "-s", "9"])
                .unwrap();
        assert_eq!(args.lengths, vec![1024, 4096]);
        assert_eq!(args.format, OutputFormat::Csv);
        assert_eq!(args.seed, Some(9));
    }

    #[test]
    fn single_meta_repetition_is_rejected() {
        assert!(CliArgs::try_parse_from(["sdot-bench", "-m", "1"]).is_err());
    }

    #[test]
    fn unknown_kernel_is_rejected() {
        assert!(CliArgs::try_parse_from(["sdot-bench", "-k", "simd16"]).is_err());
    }
}
