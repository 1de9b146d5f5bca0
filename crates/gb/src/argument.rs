use boron_core::ast::{InfixOp, NodeId, NodeKind, PostfixOp, PrefixOp};
use boron_core::diag::{Abort, Diagnostic};
use boron_core::env::{DefId, DefKind};
use boron_core::program::Program;
use boron_core::resolve::resolve_attribute;

use crate::registers::Register;

/// A statement operand classified into the shapes the SM83 instruction set
/// can address. Anything that is not a register form stays an expression
/// (`Immediate`) for the constant folder.
#[derive(Debug, Clone, PartialEq)]
pub enum Argument {
    Immediate(NodeId),
    Indirection(Box<Argument>),
    IndirectionInc(Box<Argument>),
    IndirectionDec(Box<Argument>),
    PositiveIndex { index: NodeId, base: Box<Argument> },
    NegativeIndex { index: NodeId, base: Box<Argument> },
    BitIndex { index: NodeId, base: Box<Argument> },
    Not(Box<Argument>),
    Negated(Box<Argument>),
    Swap(Box<Argument>),
    Pop,
    Register(Register),
}

impl Argument {
    pub fn describe(&self) -> String {
        match self {
            Argument::Immediate(_) => "immediate".to_string(),
            Argument::Indirection(base) => format!("'[{}]'", base.describe_bare()),
            Argument::IndirectionInc(base) => format!("'[{}++]'", base.describe_bare()),
            Argument::IndirectionDec(base) => format!("'[{}--]'", base.describe_bare()),
            Argument::PositiveIndex { base, .. } => {
                format!("'[index:{}]'", base.describe_bare())
            }
            Argument::NegativeIndex { base, .. } => {
                format!("'[-index:{}]'", base.describe_bare())
            }
            Argument::BitIndex { base, .. } => format!("'{}@bit'", base.describe_bare()),
            Argument::Not(base) => format!("'~{}'", base.describe_bare()),
            Argument::Negated(base) => format!("'-{}'", base.describe_bare()),
            Argument::Swap(base) => format!("'<>{}'", base.describe_bare()),
            Argument::Pop => "'pop'".to_string(),
            Argument::Register(register) => format!("'{}'", register.name()),
        }
    }

    fn describe_bare(&self) -> String {
        let described = self.describe();
        described.trim_matches('\'').to_string()
    }

    /// Index of an 8-bit register operand in the 8-wide opcode rows
    /// (b, c, d, e, h, l, [hl], a).
    pub fn register_index(&self) -> Option<u8> {
        match self {
            Argument::Register(Register::B) => Some(0),
            Argument::Register(Register::C) => Some(1),
            Argument::Register(Register::D) => Some(2),
            Argument::Register(Register::E) => Some(3),
            Argument::Register(Register::H) => Some(4),
            Argument::Register(Register::L) => Some(5),
            Argument::Indirection(base)
                if **base == Argument::Register(Register::HL) =>
            {
                Some(6)
            }
            Argument::Register(Register::A) => Some(7),
            _ => None,
        }
    }

    /// Index of a 16-bit pair operand in the 0x10-stride opcode columns.
    pub fn pair_index(&self) -> Option<u8> {
        match self {
            Argument::Register(Register::BC) => Some(0),
            Argument::Register(Register::DE) => Some(1),
            Argument::Register(Register::HL) => Some(2),
            Argument::Register(Register::SP) | Argument::Register(Register::AF) => Some(3),
            _ => None,
        }
    }

    pub fn pair_low_index(&self) -> Option<u8> {
        match self {
            Argument::Register(Register::BC) => Some(1),
            Argument::Register(Register::DE) => Some(3),
            Argument::Register(Register::HL) => Some(5),
            _ => None,
        }
    }

    pub fn pair_high_index(&self) -> Option<u8> {
        match self {
            Argument::Register(Register::BC) => Some(0),
            Argument::Register(Register::DE) => Some(2),
            Argument::Register(Register::HL) => Some(4),
            _ => None,
        }
    }

    /// Condition-code index used by conditional jump/call/return opcodes.
    pub fn flag_index(&self, negated: bool) -> Option<u8> {
        match self {
            Argument::Register(Register::Zero) => Some(if negated { 0 } else { 1 }),
            Argument::Register(Register::Carry) => Some(if negated { 2 } else { 3 }),
            _ => None,
        }
    }
}

pub(crate) fn builtin_register(program: &Program, def: DefId) -> Option<Register> {
    match program.symbols.def(def).kind {
        DefKind::Builtin { token } => Register::try_from(token).ok(),
        _ => None,
    }
}

/// Classify the operand inside an indirection bracket.
pub fn build_indirection(
    program: &mut Program,
    node: NodeId,
) -> Result<Option<Argument>, Abort> {
    let span = program.ast.span(node);
    match program.ast.kind(node).clone() {
        NodeKind::Attribute { .. } => {
            let Some(def) = resolve_attribute(program, node, false)? else {
                return Ok(None);
            };
            if let Some(register) = builtin_register(program, def) {
                return Ok(Some(Argument::Indirection(Box::new(Argument::Register(
                    register,
                )))));
            }
        }
        NodeKind::Prefix {
            op: PrefixOp::Indirection,
            ..
        } => {
            program.reporter.error(Diagnostic::error(
                span,
                "double-indirection is not supported on the gameboy",
            ))?;
            return Ok(None);
        }
        NodeKind::Postfix { op, operand } => {
            if let NodeKind::Attribute { .. } = program.ast.kind(operand)
                && let Some(def) = resolve_attribute(program, operand, false)?
                && builtin_register(program, def) == Some(Register::HL)
            {
                let base = Box::new(Argument::Register(Register::HL));
                return Ok(Some(match op {
                    PostfixOp::Inc => Argument::IndirectionInc(base),
                    PostfixOp::Dec => Argument::IndirectionDec(base),
                }));
            }
            program.reporter.error(Diagnostic::error(
                span,
                format!(
                    "operator {} on indirected operand is not supported (only '[hl{}]' is valid)",
                    op.name(),
                    op.name()
                ),
            ))?;
            return Ok(None);
        }
        NodeKind::Infix { ops, operands } if ops.first() == Some(&InfixOp::Colon) => {
            let base = operands[1];
            if let NodeKind::Attribute { .. } = program.ast.kind(base)
                && let Some(def) = resolve_attribute(program, base, false)?
            {
                if let Some(register) = builtin_register(program, def) {
                    let base = Box::new(Argument::Register(register));
                    if let NodeKind::Prefix {
                        op: PrefixOp::Neg,
                        operand,
                    } = *program.ast.kind(operands[0])
                    {
                        return Ok(Some(Argument::NegativeIndex {
                            index: operand,
                            base,
                        }));
                    }
                    return Ok(Some(Argument::PositiveIndex {
                        index: operands[0],
                        base,
                    }));
                }
            }
            program.reporter.error(Diagnostic::error(
                span,
                "index operator ':' must have register as a right-hand term",
            ))?;
            return Ok(None);
        }
        NodeKind::Pop => {
            program.reporter.error(Diagnostic::error(
                span,
                "'pop' is not allowed inside of indirection",
            ))?;
            return Ok(None);
        }
        _ => {}
    }
    Ok(Some(Argument::Indirection(Box::new(Argument::Immediate(
        node,
    )))))
}

/// Classify a statement operand.
pub fn build_argument(program: &mut Program, node: NodeId) -> Result<Option<Argument>, Abort> {
    match program.ast.kind(node).clone() {
        NodeKind::Attribute { .. } => {
            let Some(def) = resolve_attribute(program, node, false)? else {
                return Ok(None);
            };
            if let Some(register) = builtin_register(program, def) {
                return Ok(Some(Argument::Register(register)));
            }
        }
        NodeKind::Prefix { op, operand } => match op {
            PrefixOp::Indirection => return build_indirection(program, operand),
            PrefixOp::Swap => {
                let Some(inner) = build_argument(program, operand)? else {
                    return Ok(None);
                };
                return Ok(Some(Argument::Swap(Box::new(inner))));
            }
            PrefixOp::Not => {
                let Some(inner) = build_argument(program, operand)? else {
                    return Ok(None);
                };
                return Ok(Some(Argument::Not(Box::new(inner))));
            }
            PrefixOp::Neg => {
                let Some(inner) = build_argument(program, operand)? else {
                    return Ok(None);
                };
                return Ok(Some(Argument::Negated(Box::new(inner))));
            }
            _ => {}
        },
        NodeKind::Infix { ops, operands } if ops.first() == Some(&InfixOp::At) => {
            if let NodeKind::Attribute { .. } = program.ast.kind(operands[0])
                && let Some(def) = resolve_attribute(program, operands[0], false)?
                && let Some(register) = builtin_register(program, def)
            {
                return Ok(Some(Argument::BitIndex {
                    index: operands[1],
                    base: Box::new(Argument::Register(register)),
                }));
            }
        }
        NodeKind::Pop => return Ok(Some(Argument::Pop)),
        _ => {}
    }
    Ok(Some(Argument::Immediate(node)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boron_core::ast::Ast;
    use boron_core::span::{SourceId, Span};

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    fn program() -> Program {
        let mut program = Program::new(Ast::new());
        program.clear_environment(crate::registers::builtins());
        program
    }

    #[test]
    fn registers_classify_by_builtin_token() {
        let mut program = program();
        let node = program.ast.name("hl", span());
        let argument = build_argument(&mut program, node)
            .expect("no abort")
            .expect("classified");
        assert_eq!(argument, Argument::Register(Register::HL));
    }

    #[test]
    fn bracketed_register_becomes_indirection() {
        let mut program = program();
        let hl = program.ast.name("hl", span());
        let node = program.ast.prefix(PrefixOp::Indirection, hl, span());
        let argument = build_argument(&mut program, node)
            .expect("no abort")
            .expect("classified");
        assert_eq!(argument.register_index(), Some(6));
    }

    #[test]
    fn postfix_indirection_requires_hl() {
        let mut program = program();
        let hl = program.ast.name("hl", span());
        let inc = program.ast.postfix(PostfixOp::Inc, hl, span());
        let node = program.ast.prefix(PrefixOp::Indirection, inc, span());
        let argument = build_argument(&mut program, node)
            .expect("no abort")
            .expect("classified");
        assert!(matches!(argument, Argument::IndirectionInc(_)));

        let bc = program.ast.name("bc", span());
        let inc = program.ast.postfix(PostfixOp::Inc, bc, span());
        let node = program.ast.prefix(PrefixOp::Indirection, inc, span());
        let argument = build_argument(&mut program, node).expect("no abort");
        assert_eq!(argument, None);
        assert!(program.reporter.error_count() > 0);
    }

    #[test]
    fn non_register_operands_stay_immediate() {
        let mut program = program();
        let node = program.ast.number(42, span());
        let argument = build_argument(&mut program, node)
            .expect("no abort")
            .expect("classified");
        assert_eq!(argument, Argument::Immediate(node));
    }

    #[test]
    fn indexed_indirection_classifies_base_register() {
        let mut program = program();
        let offset = program.ast.number(0xFF00, span());
        let c = program.ast.name("c", span());
        let colon = program
            .ast
            .infix(vec![InfixOp::Colon], vec![offset, c], span());
        let node = program.ast.prefix(PrefixOp::Indirection, colon, span());
        let argument = build_argument(&mut program, node)
            .expect("no abort")
            .expect("classified");
        assert!(matches!(
            argument,
            Argument::PositiveIndex { index, base }
                if index == offset && *base == Argument::Register(Register::C)
        ));
    }
}
