use boron_core::ast::{InfixOp, NodeId, NodeKind, PostfixOp};
use boron_core::diag::{Abort, Diagnostic};
use boron_core::fold::{
    fold_bit, fold_bit_index, fold_byte, fold_signed_byte, fold_word, fold_word_bit_index,
    try_fold,
};
use boron_core::program::Program;
use boron_core::span::Span;

use crate::argument::{Argument, build_argument};
use crate::registers::Register;

fn operator_error(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    program.reporter.error(Diagnostic::error(
        span,
        format!(
            "infix operator {} cannot be used in assignment '=' to {}",
            op.name(),
            dest.describe()
        ),
    ))?;
    Ok(Vec::new())
}

fn operand_error(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    program.reporter.error(Diagnostic::error(
        span,
        format!(
            "{} cannot be operand of {} in assignment '=' to {}",
            operand.describe(),
            op.name(),
            dest.describe()
        ),
    ))?;
    Ok(Vec::new())
}

fn invalid_assignment_dest_error(
    program: &mut Program,
    dest: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    program.reporter.error(Diagnostic::error(
        span,
        format!("assignment '=' to {} is invalid", dest.describe()),
    ))?;
    Ok(Vec::new())
}

fn invalid_assignment_error(
    program: &mut Program,
    dest: &Argument,
    load: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    program.reporter.error(Diagnostic::error(
        span,
        format!(
            "invalid assignment '=' of {} to {}",
            dest.describe(),
            load.describe()
        ),
    ))?;
    Ok(Vec::new())
}

pub(crate) fn generate_assignment(
    program: &mut Program,
    stmt: NodeId,
) -> Result<Vec<u8>, Abort> {
    let NodeKind::Assignment {
        dest,
        intermediary,
        src,
        postfix,
    } = program.ast.kind(stmt).clone()
    else {
        return Ok(Vec::new());
    };
    let span = program.ast.span(stmt);

    let Some(src) = src else {
        return generate_postfix_assignment(program, dest, postfix);
    };
    let Some(dest_arg) = build_argument(program, dest)? else {
        return Ok(Vec::new());
    };

    match intermediary {
        Some(intermediary) => {
            let Some(via) = build_argument(program, intermediary)? else {
                return Ok(Vec::new());
            };
            // 'x = y via z' -> 'z = y; x = z'
            let mut code = generate_calculated_assignment(program, span, &via, src)?;
            code.extend(generate_calculated_assignment(
                program,
                span,
                &dest_arg,
                intermediary,
            )?);
            Ok(code)
        }
        None => generate_calculated_assignment(program, span, &dest_arg, src),
    }
}

fn generate_postfix_assignment(
    program: &mut Program,
    dest: NodeId,
    postfix: Option<PostfixOp>,
) -> Result<Vec<u8>, Abort> {
    let Some(op) = postfix else {
        return Ok(Vec::new());
    };
    let (operator_index, operator_name) = match op {
        PostfixOp::Inc => (0u8, "'++'"),
        PostfixOp::Dec => (1u8, "'--'"),
    };
    let span = program.ast.span(dest);
    let Some(dest_arg) = build_argument(program, dest)? else {
        return Ok(Vec::new());
    };

    if let Some(register) = dest_arg.register_index() {
        return Ok(vec![0x04 + operator_index + register * 0x08]);
    }
    if let Some(pair) = dest_arg.pair_index()
        && !matches!(dest_arg, Argument::Register(Register::AF))
    {
        return Ok(vec![0x03 + operator_index * 0x08 + pair * 0x10]);
    }

    program.reporter.error(Diagnostic::error(
        span,
        format!(
            "{} cannot be operand of {operator_name}",
            dest_arg.describe()
        ),
    ))?;
    Ok(Vec::new())
}

/// Assignment whose source may be a partially-constant infix chain: the
/// folded constant prefix loads as a literal, and only the operators after
/// the fold's `const_tail` generate runtime arithmetic.
pub(crate) fn generate_calculated_assignment(
    program: &mut Program,
    span: Span,
    dest: &Argument,
    src: NodeId,
) -> Result<Vec<u8>, Abort> {
    let NodeKind::Infix { ops, operands } = program.ast.kind(src).clone() else {
        return get_load(program, span, dest, src);
    };

    let finalized = program.finalized;
    let folded = try_fold(program, src, false, finalized)?;
    if !folded.full {
        return Ok(Vec::new());
    }

    let load_src = match folded.const_tail {
        None => operands[0],
        Some(tail) => {
            let tail_span = program.ast.span(tail);
            program.ast.number(folded.value, tail_span)
        }
    };
    let mut code = get_load(program, span, dest, load_src)?;

    let mut found = folded.const_tail.is_none() || folded.const_tail == Some(operands[0]);
    for (i, &op) in ops.iter().enumerate() {
        let node = operands[i + 1];
        if Some(node) == folded.const_tail {
            found = true;
        } else if found {
            let Some(operand) = build_argument(program, node)? else {
                return Ok(Vec::new());
            };
            if i == 0
                && patch_stack_pointer_load_offset(
                    program, op, dest, &operand, load_src, &mut code,
                )?
            {
                continue;
            }
            code.extend(get_modify(program, op, node, dest, &operand)?);
        }
    }
    Ok(code)
}

/// 'hl = sp + imm' collapses into the single 'ldhl sp, d' encoding by
/// rewriting the displacement byte the plain 'hl = sp' load just emitted.
fn patch_stack_pointer_load_offset(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    load_src: NodeId,
    code: &mut [u8],
) -> Result<bool, Abort> {
    if *dest != Argument::Register(Register::HL) {
        return Ok(false);
    }
    if !matches!(op, InfixOp::Add | InfixOp::Sub) {
        return Ok(false);
    }
    let Argument::Immediate(expr) = operand else {
        return Ok(false);
    };
    let Some(load) = build_argument(program, load_src)? else {
        return Ok(false);
    };
    if load != Argument::Register(Register::SP) {
        return Ok(false);
    }

    let finalized = program.finalized;
    let value = fold_signed_byte(program, *expr, op == InfixOp::Sub, finalized)?;
    if let Some(last) = code.last_mut() {
        *last = (value.value & 0xFF) as u8;
    }
    Ok(true)
}

fn get_modify(
    program: &mut Program,
    op: InfixOp,
    node: NodeId,
    dest: &Argument,
    operand: &Argument,
) -> Result<Vec<u8>, Abort> {
    use InfixOp::*;
    let span = program.ast.span(node);

    match dest {
        Argument::Register(Register::A) => match op {
            Add | AddC | Sub | SubC | And | Xor | Or => {
                accumulator_arithmetic(program, op, dest, operand, span)
            }
            ShiftL | ShiftR | ArithShiftL | ArithShiftR => {
                register_shift(program, op, dest, operand, span)
            }
            RotateL | RotateR | RotateLC | RotateRC => {
                accumulator_shift(program, op, dest, operand, span)
            }
            _ => operator_error(program, op, dest, span),
        },
        Argument::Register(
            Register::B | Register::C | Register::D | Register::E | Register::H | Register::L,
        ) => match op {
            RotateLC | RotateRC | RotateL | RotateR | ShiftL | ShiftR | ArithShiftL
            | ArithShiftR => register_shift(program, op, dest, operand, span),
            _ => operator_error(program, op, dest, span),
        },
        Argument::Indirection(base) => match **base {
            Argument::Register(Register::HL) => match op {
                RotateLC | RotateRC | RotateL | RotateR | ShiftL | ShiftR | ArithShiftL
                | ArithShiftR => register_shift(program, op, dest, operand, span),
                _ => operator_error(program, op, dest, span),
            },
            _ => operator_error(program, op, dest, span),
        },
        Argument::Register(Register::BC | Register::DE) => match op {
            ShiftL | ShiftR => pair_shift(program, op, dest, operand, span),
            _ => operator_error(program, op, dest, span),
        },
        Argument::Register(Register::HL) => match op {
            Add => {
                if matches!(operand, Argument::Immediate(_)) {
                    operand_error(program, op, dest, operand, span)
                } else {
                    highlow_arithmetic(program, op, dest, operand, span)
                }
            }
            Sub => operator_error(program, op, dest, span),
            ShiftL | ShiftR => pair_shift(program, op, dest, operand, span),
            _ => operator_error(program, op, dest, span),
        },
        Argument::Register(Register::SP) => match op {
            Add | Sub => stack_pointer_arithmetic(program, op, dest, operand, span),
            _ => operator_error(program, op, dest, span),
        },
        Argument::Register(Register::Carry) => match op {
            Xor => match operand {
                // 'carry ^= 1' -> 'ccf'; xor by zero is a no-op.
                Argument::Immediate(expr) => {
                    let finalized = program.finalized;
                    let bit = fold_bit(program, *expr, finalized)?;
                    if !bit.full {
                        return Ok(Vec::new());
                    }
                    Ok(if bit.value == 0 { Vec::new() } else { vec![0x3F] })
                }
                _ => operand_error(program, op, dest, operand, span),
            },
            _ => operator_error(program, op, dest, span),
        },
        _ => operand_error(program, op, dest, operand, span),
    }
}

fn accumulator_arithmetic(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    let operator_index: u8 = match op {
        InfixOp::Add => 0,
        InfixOp::AddC => 1,
        InfixOp::Sub => 2,
        InfixOp::SubC => 3,
        InfixOp::And => 4,
        InfixOp::Xor => 5,
        InfixOp::Or => 6,
        _ => return operator_error(program, op, dest, span),
    };

    match operand {
        Argument::Immediate(expr) => {
            let finalized = program.finalized;
            let value = fold_byte(program, *expr, finalized)?;
            Ok(vec![
                0xC6 + operator_index * 0x08,
                (value.value & 0xFF) as u8,
            ])
        }
        _ => match operand.register_index() {
            Some(register) => Ok(vec![0x80 + operator_index * 0x08 + register]),
            None => operand_error(program, op, dest, operand, span),
        },
    }
}

fn highlow_arithmetic(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    match operand.pair_index() {
        Some(pair) => Ok(vec![0x09 + pair * 0x10]),
        None => operand_error(program, op, dest, operand, span),
    }
}

fn stack_pointer_arithmetic(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    match operand {
        Argument::Immediate(expr) => {
            let finalized = program.finalized;
            let value = fold_signed_byte(program, *expr, op == InfixOp::Sub, finalized)?;
            Ok(vec![0xE8, (value.value & 0xFF) as u8])
        }
        _ => operand_error(program, op, dest, operand, span),
    }
}

fn accumulator_shift(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    let operator_index: u8 = match op {
        InfixOp::RotateLC => 0,
        InfixOp::RotateRC => 1,
        InfixOp::RotateL => 2,
        InfixOp::RotateR => 3,
        _ => return operator_error(program, op, dest, span),
    };
    match operand {
        Argument::Immediate(expr) => {
            let finalized = program.finalized;
            let count = fold_bit_index(program, *expr, finalized)?;
            if !count.full {
                return Ok(Vec::new());
            }
            Ok(vec![0x07 + operator_index * 0x08; count.value as usize])
        }
        _ => operand_error(program, op, dest, operand, span),
    }
}

fn register_shift_index(op: InfixOp) -> u8 {
    match op {
        InfixOp::RotateLC => 0,
        InfixOp::RotateRC => 1,
        InfixOp::RotateL => 2,
        InfixOp::RotateR => 3,
        InfixOp::ArithShiftL => 4,
        InfixOp::ArithShiftR => 5,
        // Logical shift left is arithmetic shift left.
        InfixOp::ShiftL => 4,
        InfixOp::ShiftR => 7,
        _ => unreachable!("operator is not a shift"),
    }
}

fn register_shift(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    let operator_index = register_shift_index(op);
    match operand {
        Argument::Immediate(expr) => {
            let finalized = program.finalized;
            let count = fold_bit_index(program, *expr, finalized)?;
            if !count.full {
                return Ok(Vec::new());
            }
            let register = dest.register_index().expect("shift destination is a register");
            let mut code = Vec::new();
            for _ in 0..count.value {
                code.extend([0xCB, operator_index * 0x08 + register]);
            }
            Ok(code)
        }
        _ => operand_error(program, op, dest, operand, span),
    }
}

fn pair_shift(
    program: &mut Program,
    op: InfixOp,
    dest: &Argument,
    operand: &Argument,
    span: Span,
) -> Result<Vec<u8>, Abort> {
    let low = dest.pair_low_index().expect("shift destination is a pair");
    let high = dest.pair_high_index().expect("shift destination is a pair");
    let step: [u8; 4] = match op {
        // sla low, rl high.
        InfixOp::ShiftL => [
            0xCB,
            register_shift_index(InfixOp::ShiftL) * 0x08 + low,
            0xCB,
            register_shift_index(InfixOp::RotateL) * 0x08 + high,
        ],
        // srl high, rr low.
        InfixOp::ShiftR => [
            0xCB,
            register_shift_index(InfixOp::ShiftR) * 0x08 + high,
            0xCB,
            register_shift_index(InfixOp::RotateR) * 0x08 + low,
        ],
        _ => return operator_error(program, op, dest, span),
    };

    match operand {
        Argument::Immediate(expr) => {
            let finalized = program.finalized;
            let count = fold_word_bit_index(program, *expr, finalized)?;
            if !count.full {
                return Ok(Vec::new());
            }
            let mut code = Vec::new();
            for _ in 0..count.value {
                code.extend(step);
            }
            Ok(code)
        }
        _ => operand_error(program, op, dest, operand, span),
    }
}

fn get_load(
    program: &mut Program,
    span: Span,
    dest: &Argument,
    load_src: NodeId,
) -> Result<Vec<u8>, Abort> {
    let Some(load) = build_argument(program, load_src)? else {
        return Ok(Vec::new());
    };
    get_prefix_load(program, span, dest, &load)
}

fn get_prefix_load(
    program: &mut Program,
    span: Span,
    dest: &Argument,
    load: &Argument,
) -> Result<Vec<u8>, Abort> {
    match load {
        // 'r = <>r' -> 'swap r'
        Argument::Swap(base) => match dest.register_index() {
            Some(register) => {
                let mut code = get_prefix_load(program, span, dest, base)?;
                code.extend([0xCB, 0x30 + register]);
                Ok(code)
            }
            None => Ok(Vec::new()),
        },
        // 'a = ~a' -> 'cpl'; 'carry = ~carry' -> 'ccf'
        Argument::Not(base) => match dest {
            Argument::Register(Register::A) => {
                let mut code = get_prefix_load(program, span, dest, base)?;
                code.push(0x2F);
                Ok(code)
            }
            Argument::Register(Register::Carry) => {
                let mut code = get_prefix_load(program, span, dest, base)?;
                code.push(0x3F);
                Ok(code)
            }
            _ => invalid_assignment_error(program, dest, load, span),
        },
        // 'a = -a' -> 'cpl; inc a'
        Argument::Negated(base) => match dest {
            Argument::Register(Register::A) => {
                let mut code = get_prefix_load(program, span, dest, base)?;
                code.extend([0x2F, 0x3C]);
                Ok(code)
            }
            _ => invalid_assignment_error(program, dest, load, span),
        },
        _ => get_base_load(program, span, dest, load),
    }
}

fn register_load_immediate(
    program: &mut Program,
    dest: &Argument,
    expr: NodeId,
) -> Result<Vec<u8>, Abort> {
    let finalized = program.finalized;
    let value = fold_byte(program, expr, finalized)?;
    let register = dest.register_index().expect("load destination is a register");
    Ok(vec![0x06 + register * 0x08, (value.value & 0xFF) as u8])
}

fn register_load_register(dest: &Argument, load: &Argument) -> Vec<u8> {
    let dest = dest.register_index().expect("load destination is a register");
    let load = load.register_index().expect("load source is a register");
    // Self-loads fold away entirely.
    if dest == load {
        Vec::new()
    } else {
        vec![0x40 + dest * 0x08 + load]
    }
}

fn pair_load_immediate(
    program: &mut Program,
    dest: &Argument,
    expr: NodeId,
) -> Result<Vec<u8>, Abort> {
    let finalized = program.finalized;
    let value = fold_word(program, expr, finalized)?;
    let pair = dest.pair_index().expect("load destination is a pair");
    Ok(vec![
        0x01 + pair * 0x10,
        (value.value & 0xFF) as u8,
        ((value.value >> 8) & 0xFF) as u8,
    ])
}

fn pair_load_pop(dest: &Argument) -> Vec<u8> {
    let pair = dest.pair_index().expect("pop destination is a pair");
    vec![0xC1 + pair * 0x10]
}

fn highlow_load_pair(load: &Argument) -> Vec<u8> {
    let pair = load.pair_index().expect("load source is a pair");
    // 'hl = rr' -> 'ld hl, 0x0000; add hl, rr'
    vec![0x21, 0x00, 0x00, 0x09 + pair * 0x10]
}

fn accumulator_load_indirect_immediate(
    program: &mut Program,
    expr: NodeId,
) -> Result<Vec<u8>, Abort> {
    let finalized = program.finalized;
    let value = fold_word(program, expr, finalized)?;
    // 'a = [0xFFnn]' -> 'ldh a, [nn]', else 'ld a, [nnnn]'.
    if (value.value & 0xFF00) == 0xFF00 {
        Ok(vec![0xF0, (value.value & 0xFF) as u8])
    } else {
        Ok(vec![
            0xFA,
            (value.value & 0xFF) as u8,
            ((value.value >> 8) & 0xFF) as u8,
        ])
    }
}

fn indirect_immediate_load_accumulator(
    program: &mut Program,
    expr: NodeId,
) -> Result<Vec<u8>, Abort> {
    let finalized = program.finalized;
    let value = fold_word(program, expr, finalized)?;
    // '[0xFFnn] = a' -> 'ldh [nn], a', else 'ld [nnnn], a'.
    if (value.value & 0xFF00) == 0xFF00 {
        Ok(vec![0xE0, (value.value & 0xFF) as u8])
    } else {
        Ok(vec![
            0xEA,
            (value.value & 0xFF) as u8,
            ((value.value >> 8) & 0xFF) as u8,
        ])
    }
}

fn get_base_load(
    program: &mut Program,
    span: Span,
    dest: &Argument,
    load: &Argument,
) -> Result<Vec<u8>, Abort> {
    use Register::*;

    match dest {
        Argument::Register(A) => match load {
            Argument::Immediate(expr) => register_load_immediate(program, dest, *expr),
            Argument::Register(A | B | C | D | E | H | L) => {
                Ok(register_load_register(dest, load))
            }
            Argument::Indirection(base) => match &**base {
                Argument::Immediate(expr) => {
                    accumulator_load_indirect_immediate(program, *expr)
                }
                // 'a = [bc]', 'a = [de]'
                Argument::Register(BC | DE) => {
                    let pair = base.pair_index().expect("pair base");
                    Ok(vec![0x0A + pair * 0x10])
                }
                // 'a = [hl]'
                Argument::Register(HL) => Ok(register_load_register(dest, load)),
                _ => invalid_assignment_error(program, dest, load, span),
            },
            // 'a = [hl++]', 'a = [hl--]'
            Argument::IndirectionInc(base) | Argument::IndirectionDec(base) => {
                match &**base {
                    Argument::Register(HL) => {
                        Ok(vec![if matches!(load, Argument::IndirectionInc(_)) {
                            0x2A
                        } else {
                            0x3A
                        }])
                    }
                    _ => invalid_assignment_error(program, dest, load, span),
                }
            }
            Argument::PositiveIndex { index, base } => {
                let finalized = program.finalized;
                let value = fold_word(program, *index, finalized)?;
                if value.value != 0xFF00 || **base != Argument::Register(C) {
                    invalid_assignment_error(program, dest, load, span)
                } else {
                    Ok(vec![0xF2])
                }
            }
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::Register(B | C | D | E | H | L) => match load {
            Argument::Immediate(expr) => register_load_immediate(program, dest, *expr),
            Argument::Register(A | B | C | D | E | H | L) => {
                Ok(register_load_register(dest, load))
            }
            Argument::Indirection(base) => match &**base {
                // 'r = [hl]'
                Argument::Register(HL) => Ok(register_load_register(dest, load)),
                _ => invalid_assignment_error(program, dest, load, span),
            },
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::Indirection(dest_base) => match &**dest_base {
            Argument::Immediate(expr) => match load {
                Argument::Register(A) => indirect_immediate_load_accumulator(program, *expr),
                _ => invalid_assignment_error(program, dest, load, span),
            },
            // '[bc] = a', '[de] = a'
            Argument::Register(BC | DE) => match load {
                Argument::Register(A) => {
                    let pair = dest_base.pair_index().expect("pair base");
                    Ok(vec![0x02 + pair * 0x10])
                }
                _ => invalid_assignment_error(program, dest, load, span),
            },
            Argument::Register(HL) => match load {
                // '[hl] = n'
                Argument::Immediate(expr) => register_load_immediate(program, dest, *expr),
                // '[hl] = r'
                Argument::Register(A | B | C | D | E | H | L) => {
                    Ok(register_load_register(dest, load))
                }
                Argument::Indirection(load_base) => match &**load_base {
                    // '[hl] = [hl]' folds away.
                    Argument::Register(HL) => Ok(Vec::new()),
                    _ => invalid_assignment_error(program, dest, load, span),
                },
                _ => invalid_assignment_error(program, dest, load, span),
            },
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::Register(AF) => match load {
            // 'af = pop'
            Argument::Pop => Ok(pair_load_pop(dest)),
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::Register(BC | DE | HL) => match load {
            Argument::Immediate(expr) => pair_load_immediate(program, dest, *expr),
            Argument::Pop => Ok(pair_load_pop(dest)),
            Argument::Register(SP) => {
                if *dest == Argument::Register(HL) {
                    // 'hl = sp' -> 'ldhl sp, 0'
                    Ok(vec![0xF8, 0x00])
                } else {
                    invalid_assignment_error(program, dest, load, span)
                }
            }
            Argument::Register(BC | DE | HL) => {
                if dest == load {
                    Ok(Vec::new())
                } else if *dest == Argument::Register(HL) {
                    Ok(highlow_load_pair(load))
                } else {
                    invalid_assignment_error(program, dest, load, span)
                }
            }
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::Register(SP) => match load {
            Argument::Immediate(expr) => pair_load_immediate(program, dest, *expr),
            Argument::Register(SP) => Ok(Vec::new()),
            // 'sp = hl'
            Argument::Register(HL) => Ok(vec![0xF9]),
            _ => invalid_assignment_error(program, dest, load, span),
        },
        // '[hl++] = a', '[hl--] = a'
        Argument::IndirectionInc(_) => match load {
            Argument::Register(A) => Ok(vec![0x22]),
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::IndirectionDec(_) => match load {
            Argument::Register(A) => Ok(vec![0x32]),
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::PositiveIndex { index, base } => {
            let finalized = program.finalized;
            let value = fold_word(program, *index, finalized)?;
            if value.value != 0xFF00 || **base != Argument::Register(C) {
                program.reporter.error(Diagnostic::error(
                    span,
                    "assignment '=' to indexed memory location other than '[0xFF00:c]' is invalid",
                ))?;
                return Ok(Vec::new());
            }
            match load {
                // '[0xFF00:c] = a' -> 'ldh [c], a'
                Argument::Register(A) => Ok(vec![0xE2]),
                _ => invalid_assignment_error(program, dest, load, span),
            }
        }
        Argument::BitIndex { index, base } => {
            let finalized = program.finalized;
            let bit = fold_bit_index(program, *index, finalized)?;
            if !bit.full {
                return Ok(Vec::new());
            }
            let Some(register) = base.register_index() else {
                return invalid_assignment_error(program, dest, load, span);
            };
            match load {
                // 'r@i = 0' -> 'res i, r'; 'r@i = 1' -> 'set i, r'
                Argument::Immediate(expr) => {
                    let value = fold_bit(program, *expr, finalized)?;
                    if !value.full {
                        return Ok(Vec::new());
                    }
                    let row = if value.value == 0 { 0x80 } else { 0xC0 };
                    Ok(vec![0xCB, row + (bit.value as u8) * 0x08 + register])
                }
                _ => invalid_assignment_error(program, dest, load, span),
            }
        }
        Argument::Register(Interrupt) => match load {
            // 'interrupt = 0' -> 'di'; 'interrupt = 1' -> 'ei'
            Argument::Immediate(expr) => {
                let finalized = program.finalized;
                let value = fold_bit(program, *expr, finalized)?;
                if !value.full {
                    return Ok(Vec::new());
                }
                Ok(vec![if value.value == 0 { 0xF3 } else { 0xFB }])
            }
            _ => invalid_assignment_error(program, dest, load, span),
        },
        Argument::Register(Carry) => match load {
            Argument::Immediate(expr) => {
                let finalized = program.finalized;
                let value = fold_bit(program, *expr, finalized)?;
                if !value.full {
                    return Ok(Vec::new());
                }
                // 'carry = 0' -> 'scf; ccf', 'carry = 1' -> 'scf'
                Ok(if value.value == 0 {
                    vec![0x37, 0x3F]
                } else {
                    vec![0x37]
                })
            }
            Argument::Register(Carry) => Ok(Vec::new()),
            _ => invalid_assignment_dest_error(program, dest, span),
        },
        Argument::Pop
        | Argument::Immediate(_)
        | Argument::Not(_)
        | Argument::Negated(_)
        | Argument::Swap(_)
        | Argument::NegativeIndex { .. }
        | Argument::Register(F | Zero) => invalid_assignment_dest_error(program, dest, span),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boron_core::ast::{Ast, PrefixOp};
    use boron_core::span::{SourceId, Span};

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    fn program() -> Program {
        let mut program = Program::new(Ast::new());
        program.clear_environment(crate::registers::builtins());
        program
    }

    fn assign(program: &mut Program, dest: NodeId, src: NodeId) -> Vec<u8> {
        let stmt = program.ast.assignment(dest, None, src, span());
        generate_assignment(program, stmt).expect("no abort")
    }

    #[test]
    fn register_loads_encode_ld_rows() {
        let mut program = program();
        let a = program.ast.name("a", span());
        let value = program.ast.number(0x12, span());
        assert_eq!(assign(&mut program, a, value), vec![0x3E, 0x12]);

        let b = program.ast.name("b", span());
        let c = program.ast.name("c", span());
        assert_eq!(assign(&mut program, b, c), vec![0x41]);

        // Self-load folds away.
        let d = program.ast.name("d", span());
        let d2 = program.ast.name("d", span());
        assert_eq!(assign(&mut program, d, d2), Vec::<u8>::new());
    }

    #[test]
    fn pair_loads_encode_immediates_and_pop() {
        let mut program = program();
        let hl = program.ast.name("hl", span());
        let value = program.ast.number(0x8000, span());
        assert_eq!(assign(&mut program, hl, value), vec![0x21, 0x00, 0x80]);

        let bc = program.ast.name("bc", span());
        let pop = program.ast.pop(span());
        assert_eq!(assign(&mut program, bc, pop), vec![0xC1]);

        let af = program.ast.name("af", span());
        let pop = program.ast.pop(span());
        assert_eq!(assign(&mut program, af, pop), vec![0xF1]);
    }

    #[test]
    fn high_page_indirection_uses_ldh() {
        let mut program = program();
        let a = program.ast.name("a", span());
        let address = program.ast.number(0xFF44, span());
        let load = program.ast.prefix(PrefixOp::Indirection, address, span());
        assert_eq!(assign(&mut program, a, load), vec![0xF0, 0x44]);

        let address = program.ast.number(0xC123, span());
        let dest = program.ast.prefix(PrefixOp::Indirection, address, span());
        let a = program.ast.name("a", span());
        assert_eq!(assign(&mut program, dest, a), vec![0xEA, 0x23, 0xC1]);
    }

    #[test]
    fn hl_increment_stores_accumulator() {
        let mut program = program();
        let hl = program.ast.name("hl", span());
        let inc = program.ast.postfix(PostfixOp::Inc, hl, span());
        let dest = program.ast.prefix(PrefixOp::Indirection, inc, span());
        let a = program.ast.name("a", span());
        assert_eq!(assign(&mut program, dest, a), vec![0x22]);
    }

    #[test]
    fn constant_prefix_splits_before_runtime_operand() {
        let mut program = program();
        // 'a = 2 + 3 + b' -> 'ld a, 5; add a, b'
        let two = program.ast.number(2, span());
        let three = program.ast.number(3, span());
        let b = program.ast.name("b", span());
        let chain = program.ast.infix(
            vec![InfixOp::Add, InfixOp::Add],
            vec![two, three, b],
            span(),
        );
        let a = program.ast.name("a", span());
        assert_eq!(assign(&mut program, a, chain), vec![0x3E, 0x05, 0x80]);
    }

    #[test]
    fn fully_runtime_chain_loads_first_operand() {
        let mut program = program();
        // 'a = b + 1' -> 'ld a, b; add a, 1'
        let b = program.ast.name("b", span());
        let one = program.ast.number(1, span());
        let chain = program
            .ast
            .infix(vec![InfixOp::Add], vec![b, one], span());
        let a = program.ast.name("a", span());
        assert_eq!(assign(&mut program, a, chain), vec![0x78, 0xC6, 0x01]);
    }

    #[test]
    fn postfix_assignments_encode_inc_dec() {
        let mut program = program();
        let a = program.ast.name("a", span());
        let stmt = program.ast.postfix_assignment(a, PostfixOp::Inc, span());
        assert_eq!(
            generate_assignment(&mut program, stmt).expect("no abort"),
            vec![0x3C]
        );

        let hl = program.ast.name("hl", span());
        let stmt = program.ast.postfix_assignment(hl, PostfixOp::Dec, span());
        assert_eq!(
            generate_assignment(&mut program, stmt).expect("no abort"),
            vec![0x2B]
        );
    }

    #[test]
    fn hl_from_stack_pointer_patches_displacement() {
        let mut program = program();
        // 'hl = sp + 4' -> 'ldhl sp, 4'
        let sp = program.ast.name("sp", span());
        let four = program.ast.number(4, span());
        let chain = program
            .ast
            .infix(vec![InfixOp::Add], vec![sp, four], span());
        let hl = program.ast.name("hl", span());
        assert_eq!(assign(&mut program, hl, chain), vec![0xF8, 0x04]);

        // 'hl = sp - 2' -> 'ldhl sp, -2'
        let sp = program.ast.name("sp", span());
        let two = program.ast.number(2, span());
        let chain = program
            .ast
            .infix(vec![InfixOp::Sub], vec![sp, two], span());
        let hl = program.ast.name("hl", span());
        assert_eq!(assign(&mut program, hl, chain), vec![0xF8, 0xFE]);
    }

    #[test]
    fn bit_assignment_encodes_set_and_res() {
        let mut program = program();
        let b = program.ast.name("b", span());
        let three = program.ast.number(3, span());
        let dest = program
            .ast
            .infix(vec![InfixOp::At], vec![b, three], span());
        let one = program.ast.number(1, span());
        // 'b@3 = 1' -> SET 3, B.
        assert_eq!(assign(&mut program, dest, one), vec![0xCB, 0xD8]);

        let b = program.ast.name("b", span());
        let three = program.ast.number(3, span());
        let dest = program
            .ast
            .infix(vec![InfixOp::At], vec![b, three], span());
        let zero = program.ast.number(0, span());
        // 'b@3 = 0' -> RES 3, B.
        assert_eq!(assign(&mut program, dest, zero), vec![0xCB, 0x98]);
    }

    #[test]
    fn interrupt_and_carry_flags_assign() {
        let mut program = program();
        let interrupt = program.ast.name("interrupt", span());
        let one = program.ast.number(1, span());
        assert_eq!(assign(&mut program, interrupt, one), vec![0xFB]);

        let interrupt = program.ast.name("interrupt", span());
        let zero = program.ast.number(0, span());
        assert_eq!(assign(&mut program, interrupt, zero), vec![0xF3]);

        let carry = program.ast.name("carry", span());
        let zero = program.ast.number(0, span());
        assert_eq!(assign(&mut program, carry, zero), vec![0x37, 0x3F]);
    }

    #[test]
    fn complement_and_swap_prefixes() {
        let mut program = program();
        // 'a = ~a' -> 'cpl'
        let a_src = program.ast.name("a", span());
        let not = program.ast.prefix(PrefixOp::Not, a_src, span());
        let a = program.ast.name("a", span());
        assert_eq!(assign(&mut program, a, not), vec![0x2F]);

        // 'a = <>a' -> 'swap a'
        let a_src = program.ast.name("a", span());
        let swap = program.ast.prefix(PrefixOp::Swap, a_src, span());
        let a = program.ast.name("a", span());
        assert_eq!(assign(&mut program, a, swap), vec![0xCB, 0x37]);
    }

    #[test]
    fn via_routes_through_intermediary() {
        let mut program = program();
        // 'b = 7 via a' -> 'ld a, 7; ld b, a'
        let b = program.ast.name("b", span());
        let a = program.ast.name("a", span());
        let seven = program.ast.number(7, span());
        let stmt = program.ast.assignment(b, Some(a), seven, span());
        assert_eq!(
            generate_assignment(&mut program, stmt).expect("no abort"),
            vec![0x3E, 0x07, 0x47]
        );
    }

    #[test]
    fn register_shifts_repeat_cb_rows() {
        let mut program = program();
        // 'b = b << 2' -> 'sla b; sla b'
        let b_src = program.ast.name("b", span());
        let two = program.ast.number(2, span());
        let chain = program
            .ast
            .infix(vec![InfixOp::ShiftL], vec![b_src, two], span());
        let b = program.ast.name("b", span());
        assert_eq!(
            assign(&mut program, b, chain),
            vec![0xCB, 0x20, 0xCB, 0x20]
        );
    }

    #[test]
    fn invalid_destinations_are_reported() {
        let mut program = program();
        let f = program.ast.name("f", span());
        let one = program.ast.number(1, span());
        assert_eq!(assign(&mut program, f, one), Vec::<u8>::new());
        assert!(
            program.reporter.diagnostics()[0]
                .message
                .contains("assignment '=' to 'f' is invalid")
        );
    }
}
