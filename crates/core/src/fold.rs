use rustc_hash::FxHashMap;

use crate::ast::{InfixOp, NodeId, NodeKind, PrefixOp, attribute_name};
use crate::diag::{Abort, Diagnostic};
use crate::env::DefKind;
use crate::program::Program;
use crate::resolve::resolve_attribute;
use crate::visit::{Visitor, traverse};

/// Upper bound of the compile-time integer domain.
pub const VALUE_MAX: u32 = 65535;

/// Stand-in value for expressions that did not resolve. The reservation
/// pass emits size-correct placeholder bytes from it; the emission pass
/// runs strict and never lets it reach the image.
pub const PLACEHOLDER: u32 = 0xCACA;

/// Outcome of folding one expression subtree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fold {
    /// Folded value, or [`PLACEHOLDER`] when unresolved.
    pub value: u32,
    /// Rightmost operand of the root infix chain up to which the
    /// expression is known constant. Code generation splits on this:
    /// the prefix becomes a literal, the rest runtime operations.
    pub const_tail: Option<NodeId>,
    /// Whether the whole root expression folded to a value.
    pub complete: bool,
    /// Strict success: no unresolved attribute, and under
    /// `runtime_forbidden + finalized` no incomplete result.
    pub full: bool,
}

struct FoldVisitor {
    values: FxHashMap<NodeId, u32>,
    completeness: FxHashMap<NodeId, bool>,
    const_tail: Option<NodeId>,
    runtime_forbidden: bool,
    root_forbidden: bool,
    finalized: bool,
    depth: u32,
    bad_attr: bool,
}

impl FoldVisitor {
    fn value_of(&self, node: NodeId) -> Option<u32> {
        self.values.get(&node).copied()
    }

    fn update_value(&mut self, node: NodeId, value: u32, complete: bool) {
        self.values.insert(node, value);
        self.completeness.insert(node, complete);
        if self.depth == 0 && complete {
            self.const_tail = Some(node);
        }
    }

    fn fold_infix(
        &mut self,
        program: &mut Program,
        node: NodeId,
        ops: &[InfixOp],
        operands: &[NodeId],
    ) -> Result<(), Abort> {
        let first = operands[0];
        let Some(mut a) = self.value_of(first) else {
            if self.depth == 0 {
                self.const_tail = None;
            }
            return Ok(());
        };
        self.update_value(node, a, false);

        for (i, &op) in ops.iter().enumerate() {
            let operand = operands[i + 1];
            let span = program.ast.span(operand);
            let Some(b) = self.value_of(operand) else {
                if self.depth == 0 {
                    self.const_tail = Some(operands[i]);
                }
                return Ok(());
            };

            a = match op {
                InfixOp::Add => {
                    if a + b > VALUE_MAX {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "addition yields result which will overflow outside of 0..65535",
                        ))?;
                        return Ok(());
                    }
                    a + b
                }
                InfixOp::Sub => {
                    if a < b {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "subtraction yields result which will overflow outside of 0..65535",
                        ))?;
                        return Ok(());
                    }
                    a - b
                }
                InfixOp::Mul => {
                    if b != 0 && a > VALUE_MAX / b {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "multiplication yields result which will overflow outside of 0..65535",
                        ))?;
                        return Ok(());
                    }
                    a * b
                }
                InfixOp::Div => {
                    if b == 0 {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "division by zero is undefined",
                        ))?;
                        return Ok(());
                    }
                    a / b
                }
                InfixOp::Mod => {
                    if b == 0 {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "modulo by zero is undefined",
                        ))?;
                        return Ok(());
                    }
                    a % b
                }
                InfixOp::ShiftL => {
                    if b > 15 || (a << b) > VALUE_MAX {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "logical shift left yields result which will overflow outside of 0..65535",
                        ))?;
                        return Ok(());
                    }
                    a << b
                }
                InfixOp::ShiftR => {
                    if b > 15 {
                        0
                    } else {
                        a >> b
                    }
                }
                InfixOp::And => a & b,
                InfixOp::Or => a | b,
                InfixOp::Xor => a ^ b,
                InfixOp::At => {
                    if b > 15 {
                        0
                    } else {
                        a & (1 << b)
                    }
                }
                InfixOp::AddC
                | InfixOp::SubC
                | InfixOp::ArithShiftL
                | InfixOp::ArithShiftR
                | InfixOp::RotateL
                | InfixOp::RotateR
                | InfixOp::RotateLC
                | InfixOp::RotateRC
                | InfixOp::Colon => {
                    // No compile-time meaning; the chain stays constant only
                    // up to the previous operand.
                    if self.runtime_forbidden {
                        program.reporter.error(Diagnostic::error(
                            span,
                            format!(
                                "infix operator {} cannot be used in constant expression",
                                op.name()
                            ),
                        ))?;
                    }
                    if self.depth == 0 {
                        self.const_tail = Some(operands[i]);
                    }
                    return Ok(());
                }
            };
            self.update_value(node, a, i == ops.len() - 1);
        }
        Ok(())
    }

    fn fold_prefix(
        &mut self,
        program: &mut Program,
        node: NodeId,
        op: PrefixOp,
        operand: NodeId,
    ) -> Result<(), Abort> {
        let span = program.ast.span(node);
        match op {
            PrefixOp::Low | PrefixOp::High | PrefixOp::Swap => {}
            PrefixOp::Grouping => {
                self.depth -= 1;
                if self.depth == 0 {
                    self.runtime_forbidden = self.root_forbidden;
                }
            }
            PrefixOp::Not | PrefixOp::Neg => {
                if self.runtime_forbidden {
                    program.reporter.error(Diagnostic::error(
                        span,
                        format!(
                            "prefix operator {} cannot be used in constant expression",
                            op.name()
                        ),
                    ))?;
                }
                return Ok(());
            }
            PrefixOp::Indirection => {
                self.depth -= 1;
                if self.runtime_forbidden {
                    program.reporter.error(Diagnostic::error(
                        span,
                        "indirection operator cannot be used in constant expression",
                    ))?;
                }
                return Ok(());
            }
        }

        let Some(r) = self.value_of(operand) else {
            return Ok(());
        };
        let value = match op {
            PrefixOp::Low => r & 0xFF,
            PrefixOp::High => (r >> 8) & 0xFF,
            PrefixOp::Swap => ((r & 0x0F0F) << 4) | ((r & 0xF0F0) >> 4),
            PrefixOp::Grouping => r,
            _ => unreachable!("handled above"),
        };
        self.update_value(node, value, true);
        Ok(())
    }

    fn fold_attribute(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        let Some(def) = resolve_attribute(program, node, false)? else {
            self.bad_attr = true;
            return Ok(());
        };

        match program.symbols.def(def).kind.clone() {
            DefKind::Const { value, env } => {
                let full_name = self.attribute_display(program, node);
                program.enter_inline(&format!("constant '{full_name}'"), node)?;
                program.enter_environment(env);
                let finalized = program.finalized;
                let folded = fold(program, value, finalized)?;
                program.leave_environment();
                program.leave_inline();
                if folded.full {
                    self.update_value(node, folded.value, true);
                    return Ok(());
                }
            }
            DefKind::Var {
                address: Some(address),
            }
            | DefKind::Label {
                address: Some(address),
            } => {
                self.update_value(node, address, true);
                return Ok(());
            }
            _ => {}
        }

        if self.runtime_forbidden && self.finalized {
            let full_name = self.attribute_display(program, node);
            program.reporter.error(Diagnostic::error(
                program.ast.span(node),
                format!("'{full_name}' was declared, but could not be evaluated"),
            ))?;
        }
        Ok(())
    }

    fn attribute_display(&self, program: &Program, node: NodeId) -> String {
        match program.ast.kind(node) {
            NodeKind::Attribute { pieces } => attribute_name(pieces),
            _ => String::new(),
        }
    }
}

impl Visitor for FoldVisitor {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        match program.ast.kind(node) {
            NodeKind::Prefix {
                op: PrefixOp::Grouping,
                ..
            } => {
                self.depth += 1;
                self.runtime_forbidden = false;
            }
            NodeKind::Prefix {
                op: PrefixOp::Indirection,
                ..
            } => {
                self.depth += 1;
            }
            _ => {}
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        match program.ast.kind(node).clone() {
            NodeKind::Number(value) => {
                self.update_value(node, value, true);
                Ok(())
            }
            NodeKind::Str(_) => {
                program.reporter.error(Diagnostic::error(
                    program.ast.span(node),
                    "string literal is not allowed here",
                ))?;
                Ok(())
            }
            NodeKind::Attribute { .. } => self.fold_attribute(program, node),
            NodeKind::Infix { ops, operands } => {
                self.fold_infix(program, node, &ops, &operands)
            }
            NodeKind::Prefix { op, operand } => self.fold_prefix(program, node, op, operand),
            NodeKind::Postfix { op, operand } => {
                if self.value_of(operand).is_some() && self.runtime_forbidden {
                    program.reporter.error(Diagnostic::error(
                        program.ast.span(node),
                        format!(
                            "postfix operator {} cannot be used in constant expression",
                            op.name()
                        ),
                    ))?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Fold an expression subtree, tolerating unresolved operands.
///
/// `runtime_forbidden` rejects operators with no compile-time meaning
/// (grouping parentheses suspend it for their nesting); `finalized` turns
/// any unresolved result into an error instead of a partial outcome.
pub fn try_fold(
    program: &mut Program,
    root: NodeId,
    runtime_forbidden: bool,
    finalized: bool,
) -> Result<Fold, Abort> {
    let mut visitor = FoldVisitor {
        values: FxHashMap::default(),
        completeness: FxHashMap::default(),
        const_tail: None,
        runtime_forbidden,
        root_forbidden: runtime_forbidden,
        finalized,
        depth: 0,
        bad_attr: false,
    };
    traverse(program, root, &mut visitor)?;

    let value = visitor.values.get(&root).copied();
    let complete = visitor.completeness.get(&root).copied().unwrap_or(false);
    let mut const_tail = visitor.const_tail;
    let mut full = true;
    if !complete && runtime_forbidden && finalized {
        program.reporter.error(Diagnostic::error(
            program.ast.span(root),
            "expression could not be resolved as a constant",
        ))?;
        const_tail = None;
        full = false;
    } else if visitor.bad_attr {
        const_tail = None;
        full = false;
    }

    Ok(Fold {
        value: value.unwrap_or(PLACEHOLDER),
        const_tail,
        complete,
        full,
    })
}

/// Strict fold: the whole expression must be compile-time constant.
pub fn fold(program: &mut Program, root: NodeId, finalized: bool) -> Result<Fold, Abort> {
    let mut folded = try_fold(program, root, true, finalized)?;
    folded.full = folded.full && folded.const_tail == Some(root);
    Ok(folded)
}

fn fold_bounded(
    program: &mut Program,
    root: NodeId,
    type_name: &str,
    limit: u32,
    finalized: bool,
) -> Result<Fold, Abort> {
    let mut folded = fold(program, root, finalized)?;
    if folded.full && folded.value > limit {
        program.reporter.error(Diagnostic::error(
            program.ast.span(root),
            format!(
                "value {} is outside of representable {type_name} range 0..{limit}",
                folded.value
            ),
        ))?;
        folded.full = false;
    }
    Ok(folded)
}

pub fn fold_bit(program: &mut Program, root: NodeId, finalized: bool) -> Result<Fold, Abort> {
    fold_bounded(program, root, "bit", 1, finalized)
}

pub fn fold_bit_index(
    program: &mut Program,
    root: NodeId,
    finalized: bool,
) -> Result<Fold, Abort> {
    fold_bounded(program, root, "bitwise index", 7, finalized)
}

pub fn fold_word_bit_index(
    program: &mut Program,
    root: NodeId,
    finalized: bool,
) -> Result<Fold, Abort> {
    fold_bounded(program, root, "bitwise index", 15, finalized)
}

pub fn fold_byte(program: &mut Program, root: NodeId, finalized: bool) -> Result<Fold, Abort> {
    fold_bounded(program, root, "8-bit", 255, finalized)
}

pub fn fold_word(program: &mut Program, root: NodeId, finalized: bool) -> Result<Fold, Abort> {
    fold_bounded(program, root, "16-bit", VALUE_MAX, finalized)
}

/// Fold to a signed 8-bit two's-complement byte; `negative` marks a value
/// the caller will subtract rather than add.
pub fn fold_signed_byte(
    program: &mut Program,
    root: NodeId,
    negative: bool,
    finalized: bool,
) -> Result<Fold, Abort> {
    let mut folded = fold_word(program, root, finalized)?;
    if folded.full {
        if !negative && folded.value <= 127 {
            // Already in range.
        } else if negative && folded.value <= 128 {
            folded.value = folded.value.wrapping_neg() & 0xFF;
        } else {
            let sign = if negative { "-" } else { "" };
            program.reporter.error(Diagnostic::error(
                program.ast.span(root),
                format!(
                    "value {sign}{} is outside of representable signed 8-bit range -128..127",
                    folded.value
                ),
            ))?;
            folded.full = false;
        }
    }
    Ok(folded)
}

/// Fold a branch target into a PC-relative displacement from `origin`
/// (the address just past the instruction).
pub fn fold_relative_byte(
    program: &mut Program,
    root: NodeId,
    description: &str,
    help: &str,
    origin: u32,
    finalized: bool,
) -> Result<Fold, Abort> {
    let mut folded = fold_word(program, root, finalized)?;
    if folded.full {
        let offset = folded.value as i64 - origin as i64;
        if (-128..=127).contains(&offset) {
            folded.value = (offset & 0xFF) as u32;
        } else {
            program.reporter.error(Diagnostic::error(
                program.ast.span(root),
                format!(
                    "{description} is outside of representable signed 8-bit range -128..127. {help} (from = {origin}, to = {}, (to - from) = {offset})",
                    folded.value
                ),
            ))?;
            folded.full = false;
        }
    }
    Ok(folded)
}

/// A storage specifier folded to a byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageFold {
    /// Total size in bytes (`count * unit`).
    pub size: u32,
    /// Unit width in bytes: 1 for `byte`, 2 for `word`.
    pub unit: u32,
    /// No size expression was given; size is one unit.
    pub sizeless: bool,
}

/// Fold a storage specifier. Sizes must resolve strictly whenever folded.
pub fn fold_storage(
    program: &mut Program,
    node: NodeId,
) -> Result<Option<StorageFold>, Abort> {
    let NodeKind::Storage { unit, size } = program.ast.kind(node).clone() else {
        return Ok(None);
    };
    let (count, sizeless) = match size {
        None => (1, true),
        Some(expr) => {
            let folded = fold(program, expr, true)?;
            if !folded.full {
                return Ok(None);
            }
            (folded.value, false)
        }
    };
    let unit = unit.width();
    Ok(Some(StorageFold {
        size: count * unit,
        unit,
        sizeless,
    }))
}

/// Fold one data item to its bytes: strings byte-wise (unit 1), numbers
/// range-checked to the unit width, words little-endian. Unresolved items
/// produce placeholder bytes of the right width until the build finalizes.
pub fn fold_data_expression(
    program: &mut Program,
    item: NodeId,
    unit: u32,
    finalized: bool,
) -> Result<Vec<u8>, Abort> {
    match unit {
        1 => {
            if let NodeKind::Str(text) = program.ast.kind(item) {
                return Ok(text.clone().into_bytes());
            }
            let folded = fold_byte(program, item, finalized)?;
            Ok(vec![(folded.value & 0xFF) as u8])
        }
        2 => {
            let folded = fold_word(program, item, finalized)?;
            Ok(vec![
                (folded.value & 0xFF) as u8,
                ((folded.value >> 8) & 0xFF) as u8,
            ])
        }
        _ => unreachable!("storage unit is one or two bytes"),
    }
}
