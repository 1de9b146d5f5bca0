use boron_core::ast::{Branch, JumpKind, NodeId, NodeKind};
use boron_core::diag::{Abort, Diagnostic};
use boron_core::fold::{fold_bit_index, fold_relative_byte, fold_word};
use boron_core::program::Program;
use boron_core::resolve::resolve_attribute;

use crate::argument::{Argument, build_argument, builtin_register};
use crate::assign::generate_calculated_assignment;
use crate::registers::Register;

/// Resolve a `when` clause to the condition-code index used by the
/// conditional jump/call/return opcode rows (nz, z, nc, c).
pub(crate) fn resolve_jump_condition(
    program: &mut Program,
    condition: NodeId,
) -> Result<Option<u8>, Abort> {
    let NodeKind::JumpCondition {
        negated,
        flag,
        branch,
    } = program.ast.kind(condition).clone()
    else {
        return Ok(None);
    };
    let span = program.ast.span(condition);

    if let Some(attr) = flag {
        let register = match resolve_attribute(program, attr, false)? {
            Some(def) => builtin_register(program, def),
            None => return Ok(None),
        };
        let flag = match register {
            Some(register @ (Register::Carry | Register::Zero)) => {
                Argument::Register(register)
            }
            _ => {
                let full_name = match program.ast.kind(attr) {
                    NodeKind::Attribute { pieces } => pieces.join("."),
                    _ => String::new(),
                };
                program.reporter.error(Diagnostic::error(
                    span,
                    format!("unrecognized condition '{full_name}' used in 'when' clause"),
                ))?;
                return Ok(None);
            }
        };
        return Ok(flag.flag_index(negated));
    }

    if let Some(branch) = branch {
        let (register, negated) = match branch {
            Branch::Equal => (Register::Zero, negated),
            Branch::NotEqual => (Register::Zero, !negated),
            Branch::Less => (Register::Carry, negated),
            Branch::GreaterEqual => (Register::Carry, !negated),
            Branch::Greater | Branch::LessEqual => {
                program.reporter.error(Diagnostic::error(
                    span,
                    format!(
                        "comparison {} unsupported in 'when' clause",
                        branch.name()
                    ),
                ))?;
                return Ok(None);
            }
        };
        return Ok(Argument::Register(register).flag_index(negated));
    }

    Ok(None)
}

fn ensure_unconditional(
    program: &mut Program,
    condition: Option<NodeId>,
    context: &str,
    code: Vec<u8>,
) -> Result<Vec<u8>, Abort> {
    match condition {
        Some(condition) => {
            let span = program.ast.span(condition);
            program.reporter.error(Diagnostic::error(
                span,
                format!("'when' clause is not allowed for {context}"),
            ))?;
            Ok(Vec::new())
        }
        None => Ok(code),
    }
}

pub(crate) fn generate_push(program: &mut Program, stmt: NodeId) -> Result<Vec<u8>, Abort> {
    let NodeKind::Push { src, intermediary } = program.ast.kind(stmt).clone() else {
        return Ok(Vec::new());
    };
    let span = program.ast.span(stmt);

    let mut code = Vec::new();
    let argument = match intermediary {
        Some(intermediary) => {
            let Some(via) = build_argument(program, intermediary)? else {
                return Ok(Vec::new());
            };
            // 'push x via y' -> 'y = x; push y'
            code = generate_calculated_assignment(program, span, &via, src)?;
            via
        }
        None => {
            let Some(argument) = build_argument(program, src)? else {
                return Ok(Vec::new());
            };
            argument
        }
    };

    let opcode = match argument {
        Argument::Register(Register::AF) => 0xF5,
        Argument::Register(Register::BC) => 0xC5,
        Argument::Register(Register::DE) => 0xD5,
        Argument::Register(Register::HL) => 0xE5,
        other => {
            program.reporter.error(Diagnostic::error(
                program.ast.span(src),
                format!(
                    "cannot push operand {} in 'push' statement",
                    other.describe()
                ),
            ))?;
            return Ok(Vec::new());
        }
    };
    code.push(opcode);
    Ok(code)
}

pub(crate) fn generate_jump(program: &mut Program, stmt: NodeId) -> Result<Vec<u8>, Abort> {
    let NodeKind::Jump {
        kind,
        far,
        destination,
        condition,
        ..
    } = program.ast.kind(stmt).clone()
    else {
        return Ok(Vec::new());
    };
    let span = program.ast.span(stmt);

    match kind {
        JumpKind::Goto => {
            let Some(destination) = destination else {
                return Ok(Vec::new());
            };
            let Some(argument) = build_argument(program, destination)? else {
                return Ok(Vec::new());
            };
            match argument {
                Argument::Immediate(expr) => {
                    if far {
                        let finalized = program.finalized;
                        let address = fold_word(program, expr, finalized)?;
                        let low = (address.value & 0xFF) as u8;
                        let high = ((address.value >> 8) & 0xFF) as u8;
                        match condition {
                            Some(condition) => {
                                match resolve_jump_condition(program, condition)? {
                                    Some(index) => Ok(vec![0xC2 + index * 0x08, low, high]),
                                    None => Ok(Vec::new()),
                                }
                            }
                            None => Ok(vec![0xC3, low, high]),
                        }
                    } else {
                        let description = "relative jump";
                        let bank = program.check_bank(description, span)?;
                        let pc = program.bank_check_address(bank, description, span)?;
                        let finalized = program.finalized;
                        let offset = fold_relative_byte(
                            program,
                            destination,
                            "relative jump distance",
                            "rewrite the branch, shorten the gaps in your code, or add a '!' far indicator.",
                            pc + 2,
                            finalized,
                        )?;
                        let offset = (offset.value & 0xFF) as u8;
                        match condition {
                            Some(condition) => {
                                match resolve_jump_condition(program, condition)? {
                                    Some(index) => Ok(vec![0x20 + index * 0x08, offset]),
                                    None => Ok(Vec::new()),
                                }
                            }
                            None => Ok(vec![0x18, offset]),
                        }
                    }
                }
                Argument::Register(Register::HL) => {
                    if condition.is_none() {
                        Ok(vec![0xE9])
                    } else {
                        program.reporter.error(Diagnostic::error(
                            program.ast.span(destination),
                            "'goto hl' does not support 'when' clause",
                        ))?;
                        Ok(Vec::new())
                    }
                }
                _ => {
                    program.reporter.error(Diagnostic::error(
                        program.ast.span(destination),
                        "unsupported argument to 'goto'",
                    ))?;
                    Ok(Vec::new())
                }
            }
        }
        JumpKind::Call => {
            let Some(destination) = destination else {
                return Ok(Vec::new());
            };
            let Some(argument) = build_argument(program, destination)? else {
                return Ok(Vec::new());
            };
            match argument {
                Argument::Immediate(expr) => {
                    let finalized = program.finalized;
                    let address = fold_word(program, expr, finalized)?;
                    let low = (address.value & 0xFF) as u8;
                    let high = ((address.value >> 8) & 0xFF) as u8;
                    match condition {
                        Some(condition) => match resolve_jump_condition(program, condition)? {
                            Some(index) => Ok(vec![0xC4 + index * 0x08, low, high]),
                            None => Ok(Vec::new()),
                        },
                        None => Ok(vec![0xCD, low, high]),
                    }
                }
                _ => {
                    program.reporter.error(Diagnostic::error(
                        program.ast.span(destination),
                        "unsupported argument to 'call'",
                    ))?;
                    Ok(Vec::new())
                }
            }
        }
        JumpKind::Return => match condition {
            Some(condition) => match resolve_jump_condition(program, condition)? {
                Some(index) => Ok(vec![0xC0 + index * 0x08]),
                None => Ok(Vec::new()),
            },
            None => Ok(vec![0xC9]),
        },
        JumpKind::Resume => ensure_unconditional(program, condition, "'resume'", vec![0xD9]),
        JumpKind::Abort => ensure_unconditional(program, condition, "'abort'", vec![0x40]),
        JumpKind::Sleep => ensure_unconditional(program, condition, "'sleep'", vec![0x76]),
        JumpKind::Suspend => {
            ensure_unconditional(program, condition, "'suspend'", vec![0x10, 0x00])
        }
        JumpKind::Nop => ensure_unconditional(program, condition, "'nop'", vec![0x00]),
        _ => {
            program.reporter.error(Diagnostic::error(
                span,
                "instruction not supported",
            ))?;
            Ok(Vec::new())
        }
    }
}

pub(crate) fn generate_comparison(
    program: &mut Program,
    stmt: NodeId,
) -> Result<Vec<u8>, Abort> {
    let NodeKind::Comparison { left, right } = program.ast.kind(stmt).clone() else {
        return Ok(Vec::new());
    };
    let Some(left_arg) = build_argument(program, left)? else {
        return Ok(Vec::new());
    };

    match left_arg {
        Argument::Register(Register::A) => {
            let Some(right) = right else {
                // 'compare a' -> 'or a'
                return Ok(vec![0xB7]);
            };
            let Some(right_arg) = build_argument(program, right)? else {
                return Ok(Vec::new());
            };
            // 'compare a to expr' -> 'cp a, expr'
            match right_arg {
                Argument::Immediate(expr) => {
                    let finalized = program.finalized;
                    let value = fold_word(program, expr, finalized)?;
                    Ok(vec![0xFE, (value.value & 0xFF) as u8])
                }
                ref operand if operand.register_index().is_some() => {
                    let index = operand.register_index().expect("register operand");
                    Ok(vec![0xB8 + index])
                }
                Argument::Indirection(_) => {
                    program.reporter.error(Diagnostic::error(
                        program.ast.span(right),
                        "indirected operand in 'to' is not supported (only 'compare a to [hl]' is valid)",
                    ))?;
                    Ok(Vec::new())
                }
                _ => {
                    program.reporter.error(Diagnostic::error(
                        program.ast.span(right),
                        "unsupported operand in 'to' clause of 'compare a to ...'",
                    ))?;
                    Ok(Vec::new())
                }
            }
        }
        Argument::BitIndex { index, base } => {
            // 'compare r@i' -> 'bit r, i'
            if let Some(right) = right {
                program.reporter.error(Diagnostic::error(
                    program.ast.span(right),
                    "'to' clause is unsupported for 'compare ... @ ...'",
                ))?;
                return Ok(Vec::new());
            }
            let finalized = program.finalized;
            let bit = fold_bit_index(program, index, finalized)?;
            if !bit.full {
                return Ok(Vec::new());
            }
            let Some(register) = base.register_index() else {
                program.reporter.error(Diagnostic::error(
                    program.ast.span(left),
                    "unsupported operand on left-hand side of '@'",
                ))?;
                return Ok(Vec::new());
            };
            Ok(vec![0xCB, 0x40 + (bit.value as u8) * 0x08 + register])
        }
        _ => Ok(Vec::new()),
    }
}

/// Header and global checksums of the Game Boy cartridge header, written at
/// their fixed offsets. Images too small to carry a header are left alone.
pub(crate) fn patch(image: &mut Vec<u8>) {
    if image.len() <= 0x14F {
        return;
    }

    let mut header_sum: u8 = 0;
    for index in 0x134..=0x14C {
        header_sum = header_sum.wrapping_sub(image[index]).wrapping_sub(1);
    }
    image[0x14D] = header_sum;

    let mut global_sum: u16 = 0;
    for (index, &byte) in image.iter().enumerate() {
        if index != 0x14E && index != 0x14F {
            global_sum = global_sum.wrapping_add(u16::from(byte));
        }
    }
    image[0x14E] = (global_sum >> 8) as u8;
    image[0x14F] = (global_sum & 0xFF) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use boron_core::ast::Ast;
    use boron_core::bank::Bank;
    use boron_core::span::{SourceId, Span};

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    fn program() -> Program {
        let mut program = Program::new(Ast::new());
        program.clear_environment(crate::registers::builtins());
        program
    }

    fn with_active_bank(program: &mut Program, origin: u32) {
        let id = program.add_bank(Bank::new("test", true, 0x4000));
        program.switch_bank(id);
        program
            .bank_set_address(id, "test", origin, span())
            .expect("origin fits");
    }

    #[test]
    fn push_encodes_register_pairs() {
        let mut program = program();
        let af = program.ast.name("af", span());
        let stmt = program.ast.push(af, None, span());
        let code = generate_push(&mut program, stmt).expect("no abort");
        assert_eq!(code, vec![0xF5]);

        let hl = program.ast.name("hl", span());
        let stmt = program.ast.push(hl, None, span());
        let code = generate_push(&mut program, stmt).expect("no abort");
        assert_eq!(code, vec![0xE5]);
    }

    #[test]
    fn push_of_a_single_register_is_rejected() {
        let mut program = program();
        let b = program.ast.name("b", span());
        let stmt = program.ast.push(b, None, span());
        let code = generate_push(&mut program, stmt).expect("no abort");
        assert!(code.is_empty());
        assert!(
            program.reporter.diagnostics()[0]
                .message
                .contains("cannot push operand 'b'")
        );
    }

    #[test]
    fn far_goto_encodes_absolute_jump() {
        let mut program = program();
        let target = program.ast.number(0x1234, span());
        let stmt = program
            .ast
            .jump(JumpKind::Goto, true, Some(target), None, span());
        let code = generate_jump(&mut program, stmt).expect("no abort");
        assert_eq!(code, vec![0xC3, 0x34, 0x12]);
    }

    #[test]
    fn near_goto_encodes_relative_jump_from_pc() {
        let mut program = program();
        with_active_bank(&mut program, 0x0100);
        let target = program.ast.number(0x0100, span());
        let stmt = program
            .ast
            .jump(JumpKind::Goto, false, Some(target), None, span());
        let code = generate_jump(&mut program, stmt).expect("no abort");
        // Branch back to its own start: -2 from the following instruction.
        assert_eq!(code, vec![0x18, 0xFE]);
    }

    #[test]
    fn conditional_goto_uses_flag_index_rows() {
        let mut program = program();
        let target = program.ast.number(0x1234, span());
        let zero = program.ast.name("zero", span());
        let condition = program.ast.jump_condition(false, zero, span());
        let stmt = program
            .ast
            .jump(JumpKind::Goto, true, Some(target), Some(condition), span());
        let code = generate_jump(&mut program, stmt).expect("no abort");
        // z -> index 1 -> JP Z, nnnn.
        assert_eq!(code, vec![0xCA, 0x34, 0x12]);

        let target = program.ast.number(0x1234, span());
        let zero = program.ast.name("zero", span());
        let condition = program.ast.jump_condition(true, zero, span());
        let stmt = program
            .ast
            .jump(JumpKind::Goto, true, Some(target), Some(condition), span());
        let code = generate_jump(&mut program, stmt).expect("no abort");
        // ~z -> index 0 -> JP NZ, nnnn.
        assert_eq!(code, vec![0xC2, 0x34, 0x12]);
    }

    #[test]
    fn branch_conditions_map_to_flags() {
        let mut program = program();
        let target = program.ast.number(0x1234, span());
        let condition = program.ast.branch_condition(false, Branch::Less, span());
        let stmt = program
            .ast
            .jump(JumpKind::Call, false, Some(target), Some(condition), span());
        let code = generate_jump(&mut program, stmt).expect("no abort");
        // '<' -> carry set -> CALL C, nnnn.
        assert_eq!(code, vec![0xDC, 0x34, 0x12]);
    }

    #[test]
    fn return_and_friends_encode_fixed_opcodes() {
        let mut program = program();
        let ret = program.ast.jump(JumpKind::Return, false, None, None, span());
        assert_eq!(generate_jump(&mut program, ret).expect("no abort"), vec![0xC9]);

        let resume = program.ast.jump(JumpKind::Resume, false, None, None, span());
        assert_eq!(
            generate_jump(&mut program, resume).expect("no abort"),
            vec![0xD9]
        );

        let sleep = program.ast.jump(JumpKind::Sleep, false, None, None, span());
        assert_eq!(
            generate_jump(&mut program, sleep).expect("no abort"),
            vec![0x76]
        );

        let suspend = program.ast.jump(JumpKind::Suspend, false, None, None, span());
        assert_eq!(
            generate_jump(&mut program, suspend).expect("no abort"),
            vec![0x10, 0x00]
        );
    }

    #[test]
    fn compare_a_forms() {
        let mut program = program();
        let a = program.ast.name("a", span());
        let stmt = program.ast.comparison(a, None, span());
        assert_eq!(
            generate_comparison(&mut program, stmt).expect("no abort"),
            vec![0xB7]
        );

        let a = program.ast.name("a", span());
        let five = program.ast.number(5, span());
        let stmt = program.ast.comparison(a, Some(five), span());
        assert_eq!(
            generate_comparison(&mut program, stmt).expect("no abort"),
            vec![0xFE, 0x05]
        );

        let a = program.ast.name("a", span());
        let b = program.ast.name("b", span());
        let stmt = program.ast.comparison(a, Some(b), span());
        assert_eq!(
            generate_comparison(&mut program, stmt).expect("no abort"),
            vec![0xB8]
        );
    }

    #[test]
    fn compare_bit_index_encodes_bit_test() {
        let mut program = program();
        let b = program.ast.name("b", span());
        let three = program.ast.number(3, span());
        let at = program
            .ast
            .infix(vec![boron_core::ast::InfixOp::At], vec![b, three], span());
        let stmt = program.ast.comparison(at, None, span());
        // 'compare b@3' -> BIT 3, B.
        assert_eq!(
            generate_comparison(&mut program, stmt).expect("no abort"),
            vec![0xCB, 0x58]
        );
    }

    #[test]
    fn patch_writes_header_and_global_checksums() {
        let mut image = vec![0u8; 0x8000];
        patch(&mut image);

        let mut expected_header: u8 = 0;
        for _ in 0x134..=0x14C {
            expected_header = expected_header.wrapping_sub(1);
        }
        assert_eq!(image[0x14D], expected_header);

        let expected_global = u16::from(expected_header);
        assert_eq!(image[0x14E], (expected_global >> 8) as u8);
        assert_eq!(image[0x14F], (expected_global & 0xFF) as u8);
    }

    #[test]
    fn patch_leaves_short_images_alone() {
        let mut image = vec![1, 2];
        patch(&mut image);
        assert_eq!(image, vec![1, 2]);
    }
}
