use thiserror::Error;

use crate::ast::{Ast, NodeId};
use crate::build::{build, save};
use crate::diag::{Abort, Diagnostic, RenderOptions, render_diagnostics_with_options};
use crate::fs::FileSystem;
use crate::platform::Platform;
use crate::program::Program;
use crate::span::SourceMap;

#[derive(Debug, Clone)]
pub struct BuildOutput {
    /// The finished machine-code image: physical banks in declaration
    /// order, platform patch applied.
    pub image: Vec<u8>,
    pub log: Vec<String>,
}

#[derive(Debug, Error)]
pub enum BuildError {
    /// Normal compile failure; user errors are in `diagnostics`.
    #[error("compilation failed with {error_count} error(s)")]
    Failed {
        error_count: usize,
        diagnostics: Vec<Diagnostic>,
        rendered: String,
    },
    /// The pipeline contradicted itself (e.g. reservation and emission
    /// disagreed); a compiler bug, not a user error.
    #[error("internal consistency error detected during build")]
    Internal {
        diagnostics: Vec<Diagnostic>,
        rendered: String,
    },
}

pub fn build_image(
    ast: Ast,
    root: NodeId,
    platform: &dyn Platform,
    fs: &dyn FileSystem,
    source_map: &SourceMap,
) -> Result<BuildOutput, BuildError> {
    build_image_with_options(ast, root, platform, fs, source_map, RenderOptions::plain())
}

pub fn build_image_with_options(
    ast: Ast,
    root: NodeId,
    platform: &dyn Platform,
    fs: &dyn FileSystem,
    source_map: &SourceMap,
    options: RenderOptions,
) -> Result<BuildOutput, BuildError> {
    let mut program = Program::new(ast);
    match build(&mut program, root, platform, fs) {
        Ok(()) => {
            let image = save(&program, platform);
            Ok(BuildOutput {
                image,
                log: program.reporter.log_lines().to_vec(),
            })
        }
        Err(abort) => {
            let rendered = render_diagnostics_with_options(
                source_map,
                program.reporter.diagnostics(),
                options,
            );
            let error_count = program.reporter.error_count();
            let diagnostics = program.reporter.into_diagnostics();
            Err(match abort {
                Abort::Failed => BuildError::Failed {
                    error_count,
                    diagnostics,
                    rendered,
                },
                Abort::Internal => BuildError::Internal {
                    diagnostics,
                    rendered,
                },
            })
        }
    }
}
