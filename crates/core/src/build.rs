use crate::ast::{BankKind, NodeId, NodeKind, attribute_name};
use crate::bank::Bank;
use crate::diag::{Abort, Diagnostic};
use crate::env::{DefKind, Definition};
use crate::fold;
use crate::fs::FileSystem;
use crate::platform::Platform;
use crate::program::Program;
use crate::resolve::resolve_attribute;
use crate::span::Span;
use crate::visit::{Visitor, traverse};

/// Banks live in their own namespace: the symbol key for bank `x` is
/// `"bank x"`, so a bank and a variable may share a name.
fn bank_symbol(name: &str) -> String {
    format!("bank {name}")
}

fn attribute_display(program: &Program, node: NodeId) -> String {
    match program.ast.kind(node) {
        NodeKind::Attribute { pieces } => attribute_name(pieces),
        _ => String::new(),
    }
}

/// Enter the environment replayed for this block, creating it on the first
/// pass that reaches it. A named block reuses its package's environment,
/// which is how `package foo ... end` occurring twice merges into one
/// persistent namespace.
fn block_pre(program: &mut Program, node: NodeId) -> Result<(), Abort> {
    let env = match program.next_node_environment(node) {
        Some(env) => env,
        None => {
            let named = match program.ast.kind(node) {
                NodeKind::Block {
                    name: Some(name), ..
                } => program.get(name, true),
                _ => None,
            };
            let package_env = named.and_then(|def| match program.symbols.def(def).kind {
                DefKind::Package { env } => Some(env),
                _ => None,
            });
            let env = match package_env {
                Some(env) => env,
                None => {
                    let parent = program.environment();
                    program.symbols.new_env(Some(parent))
                }
            };
            program.create_node_environment(node, env);
            env
        }
    };
    program.enter_environment(env);
    Ok(())
}

/// Leave the block scope; a named block binds (once) a package definition
/// wrapping it into the enclosing environment.
fn block_post(program: &mut Program, node: NodeId) -> Result<(), Abort> {
    let package_env = program.environment();
    program.leave_environment();

    let name = match program.ast.kind(node) {
        NodeKind::Block {
            name: Some(name), ..
        } => name.clone(),
        _ => return Ok(()),
    };
    let already_package = program
        .get(&name, true)
        .is_some_and(|def| matches!(program.symbols.def(def).kind, DefKind::Package { .. }));
    if !already_package {
        let span = program.ast.span(node);
        let def = program.symbols.define(Definition::new(
            span,
            DefKind::Package { env: package_env },
        ));
        program.put(&name, def)?;
    }
    Ok(())
}

/// `in bank, addr`: switch the active bank and optionally fix its origin.
fn relocation(program: &mut Program, node: NodeId) -> Result<(), Abort> {
    let NodeKind::Relocation { name, dest } = program.ast.kind(node).clone() else {
        return Ok(());
    };
    let span = program.ast.span(node);
    let description = "'in' statement";

    let mut address = None;
    if let Some(dest) = dest {
        let finalized = program.finalized;
        let folded = fold::fold(program, dest, finalized)?;
        if !folded.full {
            return Ok(());
        }
        address = Some(folded.value);
    }

    let bank = program
        .get(&bank_symbol(&name), false)
        .and_then(|def| match program.symbols.def(def).kind {
            DefKind::Bank { bank } => bank,
            _ => None,
        });
    match bank {
        Some(bank) => {
            program.switch_bank(bank);
            if let Some(address) = address {
                program.bank_set_address(bank, description, address, span)?;
            }
        }
        None => {
            program.reporter.error(Diagnostic::error(
                span,
                format!("unknown bank '{name}' referenced by {description}"),
            ))?;
        }
    }
    Ok(())
}

/// Two-phase discipline shared by every byte-producing statement: the
/// reservation pass sizes, the emission pass writes.
fn emit_or_reserve(
    program: &mut Program,
    description: &str,
    code: &[u8],
    span: Span,
) -> Result<(), Abort> {
    let bank = program.check_bank(description, span)?;
    if program.finalized {
        program.bank_write_physical(bank, code, span)
    } else {
        program.bank_reserve_physical(bank, description, code.len() as u32, span)
    }
}

/// Reservation records the label's address; emission recomputes it and
/// treats any disagreement as an internal fault: it means some statement
/// changed size between the passes.
fn label_decl(program: &mut Program, node: NodeId) -> Result<(), Abort> {
    let NodeKind::LabelDecl { name } = program.ast.kind(node).clone() else {
        return Ok(());
    };
    let span = program.ast.span(node);
    let description = "label declaration";

    let def = program
        .get(&name, false)
        .filter(|&def| matches!(program.symbols.def(def).kind, DefKind::Label { .. }));
    let Some(def) = def else {
        return Ok(());
    };

    let bank = program.check_bank(description, span)?;
    let address = program.bank_check_address(bank, description, span)?;

    if program.finalized {
        match program.symbols.def(def).kind {
            DefKind::Label {
                address: Some(recorded),
            } => {
                if recorded != address {
                    return Err(program.reporter.internal(Diagnostic::error(
                        span,
                        format!(
                            "internal error: label '{name}' moved between reservation and emission (was {recorded}, now {address})"
                        ),
                    )));
                }
            }
            _ => {
                return Err(program.reporter.internal(Diagnostic::error(
                    span,
                    format!(
                        "internal error: label '{name}' was never assigned an address during reservation"
                    ),
                )));
            }
        }
    } else if let DefKind::Label { address: slot } = &mut program.symbols.def_mut(def).kind {
        *slot = Some(address);
    }
    Ok(())
}

fn embed(program: &mut Program, node: NodeId, fs: &dyn FileSystem) -> Result<(), Abort> {
    let NodeKind::Embed { path, data } = program.ast.kind(node).clone() else {
        return Ok(());
    };
    let span = program.ast.span(node);
    let description = "'embed' statement";

    if program.finalized {
        let Some(data) = data else {
            return Err(program.reporter.internal(Diagnostic::error(
                span,
                format!("internal error: embed '{path}' has no cached contents at emission"),
            )));
        };
        let bank = program.check_bank(description, span)?;
        return program.bank_write_physical(bank, &data, span);
    }

    let Some(file) = fs.open(&path) else {
        return Err(program.reporter.fatal(Diagnostic::error(
            span,
            format!("could not embed file '{path}'"),
        )));
    };
    let bytes = file.read_binary().to_vec();
    let size = bytes.len() as u32;
    if let NodeKind::Embed { data, .. } = &mut program.ast.node_mut(node).kind {
        *data = Some(bytes);
    }
    let bank = program.check_bank(description, span)?;
    program.bank_reserve_physical(bank, description, size, span)
}

fn data(program: &mut Program, node: NodeId) -> Result<(), Abort> {
    let NodeKind::Data { storage, items } = program.ast.kind(node).clone() else {
        return Ok(());
    };
    let span = program.ast.span(node);
    let description = "inline data";

    let Some(st) = fold::fold_storage(program, storage)? else {
        return Ok(());
    };
    let finalized = program.finalized;
    let mut bytes = Vec::new();
    for item in items {
        bytes.extend(fold::fold_data_expression(program, item, st.unit, finalized)?);
    }

    if !st.sizeless {
        let declared = st.size as usize;
        if bytes.len() < declared {
            // Fill the unused section with the final byte of data.
            let pad = bytes.last().copied().unwrap_or(0);
            bytes.resize(declared, pad);
        } else if bytes.len() > declared {
            program.reporter.error(Diagnostic::error(
                span,
                format!(
                    "{description} is an {}-byte sequence, which is {} byte(s) over the declared {declared}-byte limit",
                    bytes.len(),
                    bytes.len() - declared
                ),
            ))?;
        }
    }

    emit_or_reserve(program, description, &bytes, span)
}

/// Pass 1: desugar structured statements and register early symbols.
struct DesugarPass;

impl Visitor for DesugarPass {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        if matches!(program.ast.kind(node), NodeKind::Block { .. }) {
            block_pre(program, node)?;
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        match program.ast.kind(node).clone() {
            NodeKind::Block { .. } => block_post(program, node),
            NodeKind::LetDecl { name, value } => {
                let span = program.ast.span(node);
                let env = program.environment();
                let def = program
                    .symbols
                    .define(Definition::new(span, DefKind::Const { value, env }));
                program.put(&name, def)
            }
            NodeKind::Conditional { .. } => {
                program.ast.expand_conditional(node);
                Ok(())
            }
            NodeKind::Loop { .. } => {
                program.ast.expand_loop(node);
                Ok(())
            }
            NodeKind::FuncDecl { name, .. } => {
                program.ast.expand_func_decl(node);
                let span = program.ast.span(node);
                let def = program
                    .symbols
                    .define(Definition::new(span, DefKind::Func { decl: node }));
                program.put(&name, def)
            }
            NodeKind::Unroll { count, .. } => {
                // The repetition count must resolve now, or the unroll is
                // left unexpanded and the error stands.
                let folded = fold::fold(program, count, true)?;
                if folded.full {
                    program.ast.expand_unroll(node, folded.value);
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Pass 2: validate loop control and desugar jumps.
struct LoopControlPass {
    depth: usize,
}

impl Visitor for LoopControlPass {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        match program.ast.kind(node) {
            NodeKind::Block { .. } => block_pre(program, node)?,
            NodeKind::Loop { .. } => self.depth += 1,
            _ => {}
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        use crate::ast::JumpKind::*;

        match program.ast.kind(node).clone() {
            NodeKind::Block { .. } => block_post(program, node),
            NodeKind::Loop { .. } => {
                self.depth -= 1;
                Ok(())
            }
            NodeKind::Jump {
                kind: kind @ (While | Until | Break | Continue),
                ..
            } => {
                if self.depth == 0 {
                    let span = program.ast.span(node);
                    program.reporter.error(Diagnostic::error(
                        span,
                        format!("'{}' used outside of a 'loop'", kind.name()),
                    ))?;
                } else {
                    program.ast.expand_jump(node);
                }
                Ok(())
            }
            NodeKind::Jump {
                kind: Call,
                destination: Some(destination),
                ..
            } if matches!(program.ast.kind(destination), NodeKind::Attribute { .. }) => {
                if let Some(def) = resolve_attribute(program, destination, true)?
                    && let DefKind::Func { decl } = program.symbols.def(def).kind
                    && matches!(
                        program.ast.kind(decl),
                        NodeKind::FuncDecl { inline: true, .. }
                    )
                {
                    let span = program.ast.span(node);
                    let full_name = attribute_display(program, destination);
                    program.reporter.error(Diagnostic::error(
                        span,
                        format!("call to inline function '{full_name}' must be 'inline call'"),
                    ))?;
                }
                Ok(())
            }
            NodeKind::Jump {
                kind: Inline,
                destination,
                ..
            } => {
                let span = program.ast.span(node);
                let target = destination
                    .filter(|&dest| matches!(program.ast.kind(dest), NodeKind::Attribute { .. }));
                let Some(target) = target else {
                    program.reporter.error(Diagnostic::error(
                        span,
                        "an inline call to a non-function really makes no sense",
                    ))?;
                    return Ok(());
                };
                if let Some(def) = resolve_attribute(program, target, false)? {
                    if let DefKind::Func { decl } = program.symbols.def(def).kind {
                        let inner = match program.ast.kind(decl) {
                            NodeKind::FuncDecl { inner, .. } => *inner,
                            _ => return Ok(()),
                        };
                        program.ast.expand_inline_jump(node, inner);
                    } else {
                        program.reporter.error(Diagnostic::error(
                            span,
                            "an inline call to a non-function really makes no sense",
                        ))?;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Pass 3: re-register all declarations against a fresh builtin root.
struct RegisterPass;

impl Visitor for RegisterPass {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        match program.ast.kind(node) {
            NodeKind::Block { .. } => block_pre(program, node)?,
            NodeKind::Jump {
                kind: crate::ast::JumpKind::Inline,
                ..
            } => program.enter_inline("'inline call'", node)?,
            _ => {}
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        let span = program.ast.span(node);
        match program.ast.kind(node).clone() {
            NodeKind::Block { .. } => block_post(program, node),
            NodeKind::Jump {
                kind: crate::ast::JumpKind::Inline,
                ..
            } => {
                program.leave_inline();
                Ok(())
            }
            NodeKind::LetDecl { name, value } => {
                // A let whose value names an existing symbol becomes a
                // transparent alias; anything else is a lazy constant.
                if matches!(program.ast.kind(value), NodeKind::Attribute { .. })
                    && let Some(target) = resolve_attribute(program, value, true)?
                {
                    let def = program
                        .symbols
                        .define(Definition::new(span, DefKind::Alias { target }));
                    return program.put(&name, def);
                }
                let env = program.environment();
                let def = program
                    .symbols
                    .define(Definition::new(span, DefKind::Const { value, env }));
                program.put(&name, def)
            }
            NodeKind::BankDecl { names, .. } => {
                for name in names {
                    let def = program
                        .symbols
                        .define(Definition::new(span, DefKind::Bank { bank: None }));
                    program.put(&bank_symbol(&name), def)?;
                }
                Ok(())
            }
            NodeKind::VarDecl { names, .. } => {
                for name in names {
                    let def = program
                        .symbols
                        .define(Definition::new(span, DefKind::Var { address: None }));
                    program.put(&name, def)?;
                }
                Ok(())
            }
            NodeKind::LabelDecl { name } => {
                let def = program
                    .symbols
                    .define(Definition::new(span, DefKind::Label { address: None }));
                program.put(&name, def)
            }
            _ => Ok(()),
        }
    }
}

/// Pass 4: fold bank sizes and materialize the banks.
struct BankPass;

impl Visitor for BankPass {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        if matches!(program.ast.kind(node), NodeKind::Block { .. }) {
            block_pre(program, node)?;
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        match program.ast.kind(node).clone() {
            NodeKind::Block { .. } => block_post(program, node),
            NodeKind::BankDecl { names, kind, size } => {
                let folded = fold::fold(program, size, true)?;
                if !folded.full {
                    return Ok(());
                }
                for name in names {
                    let def = program
                        .get(&bank_symbol(&name), false)
                        .filter(|&def| {
                            matches!(program.symbols.def(def).kind, DefKind::Bank { .. })
                        });
                    if let Some(def) = def {
                        let bank = Bank::new(name, kind == BankKind::Rom, folded.value);
                        let id = program.add_bank(bank);
                        if let DefKind::Bank { bank } = &mut program.symbols.def_mut(def).kind {
                            *bank = Some(id);
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Pass 5: assign variable addresses from the active bank's cursor.
struct VarAddressPass;

impl Visitor for VarAddressPass {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        if matches!(program.ast.kind(node), NodeKind::Block { .. }) {
            block_pre(program, node)?;
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        match program.ast.kind(node).clone() {
            NodeKind::Block { .. } => block_post(program, node),
            NodeKind::Relocation { .. } => relocation(program, node),
            NodeKind::VarDecl { names, storage } => {
                let span = program.ast.span(node);
                let description = "variable declaration";
                let Some(st) = fold::fold_storage(program, storage)? else {
                    return Ok(());
                };
                let bank = program.check_bank(description, span)?;
                for name in names {
                    let def = program.get(&name, false).filter(|&def| {
                        matches!(program.symbols.def(def).kind, DefKind::Var { .. })
                    });
                    let Some(def) = def else {
                        continue;
                    };
                    let address = program.bank_check_address(bank, description, span)?;
                    if let DefKind::Var { address: slot } =
                        &mut program.symbols.def_mut(def).kind
                    {
                        *slot = Some(address);
                    }
                    program.bank_reserve_virtual(bank, description, st.size, span)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Passes 6 and 7: size reservation, then byte emission. The handler set is
/// identical; `Program::finalized` decides whether generated code is
/// reserved or written.
struct CodegenPass<'a> {
    platform: &'a dyn Platform,
    fs: &'a dyn FileSystem,
}

impl Visitor for CodegenPass<'_> {
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        match program.ast.kind(node) {
            NodeKind::Block { .. } => block_pre(program, node)?,
            NodeKind::Jump {
                kind: crate::ast::JumpKind::Inline,
                ..
            } => program.enter_inline("'inline call'", node)?,
            _ => {}
        }
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        let span = program.ast.span(node);
        match program.ast.kind(node).clone() {
            NodeKind::Block { .. } => block_post(program, node),
            NodeKind::Relocation { .. } => relocation(program, node),
            NodeKind::Push { .. } => {
                let code = self.platform.generate_push(program, node)?;
                emit_or_reserve(program, "'push' statement", &code, span)
            }
            NodeKind::Jump { kind, .. } => {
                if kind == crate::ast::JumpKind::Inline {
                    program.leave_inline();
                    return Ok(());
                }
                let code = self.platform.generate_jump(program, node)?;
                let description = format!("'{}' statement", kind.name());
                emit_or_reserve(program, &description, &code, span)
            }
            NodeKind::Assignment { .. } => {
                let code = self.platform.generate_assignment(program, node)?;
                emit_or_reserve(program, "assignment", &code, span)
            }
            NodeKind::Comparison { .. } => {
                let code = self.platform.generate_comparison(program, node)?;
                emit_or_reserve(program, "comparison", &code, span)
            }
            NodeKind::LabelDecl { .. } => label_decl(program, node),
            NodeKind::Embed { .. } => embed(program, node, self.fs),
            NodeKind::Data { .. } => data(program, node),
            _ => Ok(()),
        }
    }
}

/// Drive the fixed sequence of seven whole-tree passes over `root`.
///
/// Each pass completes (including error verification) before the next
/// begins; scope-replay and bank cursors rewind in between. The
/// `finalized` flag flips exactly once, before the emission pass.
pub fn build(
    program: &mut Program,
    root: NodeId,
    platform: &dyn Platform,
    fs: &dyn FileSystem,
) -> Result<(), Abort> {
    program.clear_environment(platform.builtins());

    program.rewind();
    traverse(program, root, &mut DesugarPass)?;

    program.rewind();
    traverse(program, root, &mut LoopControlPass { depth: 0 })?;
    program.reporter.verify()?;

    program.clear_environment(platform.builtins());
    program.rewind();
    traverse(program, root, &mut RegisterPass)?;

    program.rewind();
    traverse(program, root, &mut BankPass)?;
    program.reporter.verify()?;

    program.rewind();
    traverse(program, root, &mut VarAddressPass)?;
    program.reporter.verify()?;

    program.rewind();
    traverse(program, root, &mut CodegenPass { platform, fs })?;
    program.reporter.verify()?;

    program.finalized = true;
    program.rewind();
    traverse(program, root, &mut CodegenPass { platform, fs })?;
    program.reporter.verify()?;

    Ok(())
}

/// Assemble the final image: every physical bank's buffer in declaration
/// order, then the platform's patch step.
pub fn save(program: &Program, platform: &dyn Platform) -> Vec<u8> {
    let mut image = program.assemble();
    platform.patch(&mut image);
    image
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, FuncKind, JumpKind, StorageUnit};
    use crate::env::EnvId;
    use crate::fs::MemoryFileSystem;
    use crate::span::{SourceId, Span};

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    struct NullPlatform;

    impl Platform for NullPlatform {
        fn builtins(&self) -> Vec<(String, Definition)> {
            Vec::new()
        }

        fn generate_push(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn generate_jump(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn generate_comparison(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn generate_assignment(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn patch(&self, _: &mut Vec<u8>) {}
    }

    /// Encodes a one-byte jump while reserving but a two-byte jump while
    /// emitting: the size instability the label re-check must catch.
    struct UnstablePlatform;

    impl Platform for UnstablePlatform {
        fn builtins(&self) -> Vec<(String, Definition)> {
            Vec::new()
        }

        fn generate_push(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn generate_jump(&self, program: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(if program.finalized {
                vec![0, 0]
            } else {
                vec![0]
            })
        }

        fn generate_comparison(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn generate_assignment(&self, _: &mut Program, _: NodeId) -> Result<Vec<u8>, Abort> {
            Ok(Vec::new())
        }

        fn patch(&self, _: &mut Vec<u8>) {}
    }

    fn run(program: &mut Program, root: NodeId) -> Result<(), Abort> {
        let fs = MemoryFileSystem::new();
        build(program, root, &NullPlatform, &fs)
    }

    struct CaptureEnvironments {
        seen: Vec<EnvId>,
    }

    impl Visitor for CaptureEnvironments {
        fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
            if matches!(program.ast.kind(node), NodeKind::Block { .. }) {
                block_pre(program, node)?;
                self.seen.push(program.environment());
            }
            Ok(true)
        }

        fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
            if matches!(program.ast.kind(node), NodeKind::Block { .. }) {
                block_post(program, node)?;
            }
            Ok(())
        }
    }

    #[test]
    fn scope_replay_yields_identical_environments_across_passes() {
        let mut ast = Ast::new();
        let inner = ast.block(None, Vec::new(), span());
        let root = ast.block(None, vec![inner], span());
        let mut program = Program::new(ast);
        program.clear_environment(Vec::new());

        let mut first = CaptureEnvironments { seen: Vec::new() };
        program.rewind();
        traverse(&mut program, root, &mut first).expect("no abort");

        let mut second = CaptureEnvironments { seen: Vec::new() };
        program.rewind();
        traverse(&mut program, root, &mut second).expect("no abort");

        assert_eq!(first.seen.len(), 2);
        assert_eq!(first.seen, second.seen);
    }

    #[test]
    fn two_byte_rom_with_literal_data_produces_exact_image() {
        let mut ast = Ast::new();
        let size = ast.number(2, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let label = ast.label_decl("start", span());
        let storage = ast.storage(StorageUnit::Byte, None, span());
        let one = ast.number(1, span());
        let two = ast.number(2, span());
        let data = ast.data(storage, vec![one, two], span());
        let root = ast.block(None, vec![bank, reloc, label, data], span());

        let mut program = Program::new(ast);
        run(&mut program, root).expect("clean build");
        assert_eq!(program.assemble(), vec![1, 2]);
    }

    #[test]
    fn label_addresses_resolve_to_bank_origin_plus_offset() {
        let mut ast = Ast::new();
        let size = ast.number(4, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0x0100, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let label = ast.label_decl("start", span());
        let byte_storage = ast.storage(StorageUnit::Byte, None, span());
        let one = ast.number(1, span());
        let two = ast.number(2, span());
        let bytes = ast.data(byte_storage, vec![one, two], span());
        // A word of data holding the label's own address proves resolution
        // agrees between passes.
        let word_storage = ast.storage(StorageUnit::Word, None, span());
        let reference = ast.name("start", span());
        let word = ast.data(word_storage, vec![reference], span());
        let root = ast.block(None, vec![bank, reloc, label, bytes, word], span());

        let mut program = Program::new(ast);
        run(&mut program, root).expect("clean build");
        assert_eq!(program.assemble(), vec![1, 2, 0x00, 0x01]);
    }

    #[test]
    fn unrolled_copies_replay_distinct_scopes_for_shared_blocks() {
        let mut ast = Ast::new();
        let label = ast.label_decl("x", span());
        let storage = ast.storage(StorageUnit::Byte, None, span());
        let five = ast.number(5, span());
        let data = ast.data(storage, vec![five], span());
        let shared = ast.block(None, vec![label, data], span());
        let body = ast.block(None, vec![shared], span());
        let count = ast.number(2, span());
        let unroll = ast.unroll(count, body, span());

        let size = ast.number(4, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let root = ast.block(None, vec![bank, reloc, unroll], span());

        let mut program = Program::new(ast);
        run(&mut program, root).expect("clean build");
        // The same label node registers once per copy, in its own scope.
        assert_eq!(program.assemble(), vec![5, 5, 0xFF, 0xFF]);
    }

    #[test]
    fn break_outside_a_loop_is_rejected() {
        let mut ast = Ast::new();
        let jump = ast.jump(JumpKind::Break, false, None, None, span());
        let root = ast.block(None, vec![jump], span());

        let mut program = Program::new(ast);
        assert_eq!(run(&mut program, root), Err(Abort::Failed));
        assert!(
            program
                .reporter
                .diagnostics()
                .iter()
                .any(|diag| diag.message.contains("'break' used outside of a 'loop'"))
        );
    }

    #[test]
    fn calling_an_inline_function_without_inline_is_rejected() {
        let mut ast = Ast::new();
        let inner = ast.block(None, Vec::new(), span());
        let func = ast.func_decl(FuncKind::Func, "helper", true, inner, span());
        let target = ast.name("helper", span());
        let call = ast.jump(JumpKind::Call, false, Some(target), None, span());
        let root = ast.block(None, vec![func, call], span());

        let mut program = Program::new(ast);
        assert_eq!(run(&mut program, root), Err(Abort::Failed));
        assert!(
            program
                .reporter
                .diagnostics()
                .iter()
                .any(|diag| diag.message.contains("must be 'inline call'"))
        );
    }

    #[test]
    fn self_inlining_function_aborts_with_cycle_error() {
        let mut ast = Ast::new();
        let target = ast.name("f", span());
        let call = ast.jump(JumpKind::Inline, false, Some(target), None, span());
        let inner = ast.block(None, vec![call], span());
        let func = ast.func_decl(FuncKind::Func, "f", false, inner, span());
        let root = ast.block(None, vec![func], span());

        let mut program = Program::new(ast);
        assert_eq!(run(&mut program, root), Err(Abort::Failed));
        assert!(
            program
                .reporter
                .diagnostics()
                .iter()
                .any(|diag| diag.message.contains("recursive cycle detected"))
        );
    }

    #[test]
    fn embedded_files_are_sized_then_written() {
        let mut ast = Ast::new();
        let size = ast.number(2, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let embed = ast.embed("tiles.bin", span());
        let root = ast.block(None, vec![bank, reloc, embed], span());

        let mut fs = MemoryFileSystem::new();
        fs.insert("tiles.bin", vec![9, 8]);
        let mut program = Program::new(ast);
        build(&mut program, root, &NullPlatform, &fs).expect("clean build");
        assert_eq!(program.assemble(), vec![9, 8]);
    }

    #[test]
    fn missing_embed_file_is_fatal() {
        let mut ast = Ast::new();
        let size = ast.number(2, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let embed = ast.embed("absent.bin", span());
        let root = ast.block(None, vec![bank, reloc, embed], span());

        let mut program = Program::new(ast);
        assert_eq!(run(&mut program, root), Err(Abort::Failed));
        assert!(
            program
                .reporter
                .diagnostics()
                .iter()
                .any(|diag| diag.message.contains("could not embed file 'absent.bin'"))
        );
    }

    #[test]
    fn declared_size_pads_with_final_byte_and_rejects_overrun() {
        let mut ast = Ast::new();
        let size = ast.number(4, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let declared = ast.number(3, span());
        let storage = ast.storage(StorageUnit::Byte, Some(declared), span());
        let seven = ast.number(7, span());
        let data = ast.data(storage, vec![seven], span());
        let root = ast.block(None, vec![bank, reloc, data], span());

        let mut program = Program::new(ast);
        run(&mut program, root).expect("clean build");
        assert_eq!(program.assemble(), vec![7, 7, 7, 0xFF]);

        let mut ast = Ast::new();
        let size = ast.number(4, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let declared = ast.number(1, span());
        let storage = ast.storage(StorageUnit::Byte, Some(declared), span());
        let one = ast.number(1, span());
        let two = ast.number(2, span());
        let data = ast.data(storage, vec![one, two], span());
        let root = ast.block(None, vec![bank, reloc, data], span());

        let mut program = Program::new(ast);
        assert_eq!(run(&mut program, root), Err(Abort::Failed));
        assert!(
            program
                .reporter
                .diagnostics()
                .iter()
                .any(|diag| diag.message.contains("1 byte(s) over the declared 1-byte limit"))
        );
    }

    #[test]
    fn size_unstable_codegen_is_a_fatal_internal_error() {
        let mut ast = Ast::new();
        let size = ast.number(16, span());
        let bank = ast.bank_decl(vec!["main".to_string()], BankKind::Rom, size, span());
        let origin = ast.number(0, span());
        let reloc = ast.relocation("main", Some(origin), span());
        let jump = ast.jump(JumpKind::Nop, false, None, None, span());
        let label = ast.label_decl("after", span());
        let root = ast.block(None, vec![bank, reloc, jump, label], span());

        let mut program = Program::new(ast);
        let fs = MemoryFileSystem::new();
        let result = build(&mut program, root, &UnstablePlatform, &fs);
        assert_eq!(result, Err(Abort::Internal));
        assert!(
            program
                .reporter
                .diagnostics()
                .iter()
                .any(|diag| diag.message.contains("moved between reservation and emission"))
        );
    }
}

