//! Game Boy (SM83) platform strategy: builtin register symbols, byte
//! generation for the primitive statement kinds, and cartridge-header
//! checksum patching of the assembled image.

pub mod argument;
pub mod registers;

mod assign;
mod codegen;

use boron_core::ast::NodeId;
use boron_core::diag::Abort;
use boron_core::env::Definition;
use boron_core::platform::Platform;
use boron_core::program::Program;

pub use argument::{Argument, build_argument, build_indirection};
pub use registers::Register;

#[derive(Debug, Default)]
pub struct GameboyPlatform;

impl GameboyPlatform {
    pub fn new() -> Self {
        Self
    }
}

impl Platform for GameboyPlatform {
    fn builtins(&self) -> Vec<(String, Definition)> {
        registers::builtins()
    }

    fn generate_push(&self, program: &mut Program, stmt: NodeId) -> Result<Vec<u8>, Abort> {
        codegen::generate_push(program, stmt)
    }

    fn generate_jump(&self, program: &mut Program, stmt: NodeId) -> Result<Vec<u8>, Abort> {
        codegen::generate_jump(program, stmt)
    }

    fn generate_comparison(
        &self,
        program: &mut Program,
        stmt: NodeId,
    ) -> Result<Vec<u8>, Abort> {
        codegen::generate_comparison(program, stmt)
    }

    fn generate_assignment(
        &self,
        program: &mut Program,
        stmt: NodeId,
    ) -> Result<Vec<u8>, Abort> {
        assign::generate_assignment(program, stmt)
    }

    fn patch(&self, image: &mut Vec<u8>) {
        codegen::patch(image);
    }
}
