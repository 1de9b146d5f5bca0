//! Boron: the semantic core of a cross-compiler for 8-bit CPU targets.
//!
//! Takes a parsed program, resolves symbols, lays out memory banks, folds
//! compile-time constants, and drives a target-specific instruction
//! encoder over a seven-pass pipeline to a finished machine-code image.
//! `boron-core` holds the target-independent pipeline; `boron-gb` is the
//! Game Boy platform strategy.

pub use boron_core::{
    BuildError, BuildOutput, ast, bank, build, build_image, build_image_with_options, diag,
    driver, env, fold, fs, platform, program, resolve, span, visit,
};
pub use boron_gb as gb;
