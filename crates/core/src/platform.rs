use crate::ast::NodeId;
use crate::diag::Abort;
use crate::env::Definition;
use crate::program::Program;

/// Target-specific strategy the orchestrator drives to turn primitive
/// statements into bytes. Any bytes, any length, any internal addressing
/// scheme are acceptable, with one hard requirement: for a given program
/// state, generated sizes must be identical between the reservation pass
/// and the emission pass. The orchestrator verifies this through label
/// addresses and treats a mismatch as an internal fault.
pub trait Platform {
    /// Predefined symbols (registers, flags) injected into the root
    /// environment at the start of a build.
    fn builtins(&self) -> Vec<(String, Definition)>;

    fn generate_push(&self, program: &mut Program, stmt: NodeId) -> Result<Vec<u8>, Abort>;

    fn generate_jump(&self, program: &mut Program, stmt: NodeId) -> Result<Vec<u8>, Abort>;

    fn generate_comparison(&self, program: &mut Program, stmt: NodeId)
    -> Result<Vec<u8>, Abort>;

    fn generate_assignment(&self, program: &mut Program, stmt: NodeId)
    -> Result<Vec<u8>, Abort>;

    /// Post-assembly fixup of the final image, e.g. checksum bytes at
    /// fixed offsets.
    fn patch(&self, image: &mut Vec<u8>);
}
