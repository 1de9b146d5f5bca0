use rustc_hash::{FxHashMap, FxHashSet};

use crate::ast::{Ast, NodeId};
use crate::bank::{Bank, BankId};
use crate::diag::{Abort, Diagnostic, Reporter};
use crate::env::{DefId, DefKind, Definition, EnvId, NodeScope, Symbols};
use crate::span::Span;

/// All mutable compile state, threaded explicitly through every pass.
///
/// Owns the AST (desugaring mutates it in place), the diagnostic sink, the
/// environment/definition arenas, the scope-replay table, the bank list,
/// and the inline-expansion guard. `rewind()` resets the replay cursors and
/// bank cursors between passes; `finalized` flips once, before the emission
/// pass, switching fold semantics from tolerant to strict.
#[derive(Debug)]
pub struct Program {
    pub ast: Ast,
    pub reporter: Reporter,
    pub symbols: Symbols,
    environment_stack: Vec<EnvId>,
    scopes: FxHashMap<NodeId, NodeScope>,
    banks: Vec<Bank>,
    active_bank: Option<BankId>,
    inline_stack: Vec<NodeId>,
    inline_active: FxHashSet<NodeId>,
    pub finalized: bool,
}

impl Program {
    pub fn new(ast: Ast) -> Self {
        Self {
            ast,
            reporter: Reporter::new(),
            symbols: Symbols::default(),
            environment_stack: Vec::new(),
            scopes: FxHashMap::default(),
            banks: Vec::new(),
            active_bank: None,
            inline_stack: Vec::new(),
            inline_active: FxHashSet::default(),
            finalized: false,
        }
    }

    /// Reset replay cursors, bank cursors, and the active bank so the next
    /// pass re-walks the tree from a clean slate.
    pub fn rewind(&mut self) {
        for scope in self.scopes.values_mut() {
            scope.rewind();
        }
        for bank in &mut self.banks {
            bank.rewind();
        }
        self.active_bank = None;
    }

    /// Rebuild the root environment from the platform's builtin symbols.
    /// The builtins are bound both at the root and inside a `builtin`
    /// package, so shadowed names stay reachable as `builtin.name`. All
    /// memoized node scopes are dropped; the passes after this rebuild
    /// them from scratch.
    pub fn clear_environment(&mut self, builtins: Vec<(String, Definition)>) {
        self.scopes.clear();

        let outer = self.symbols.new_env(None);
        let package_env = self.symbols.new_env(Some(outer));
        for (name, definition) in builtins {
            let def = self.symbols.define(definition);
            self.symbols.insert(outer, name.clone(), def);
            self.symbols.insert(package_env, name, def);
        }
        let package = self.symbols.define(Definition::new(
            Span::builtin(),
            DefKind::Package { env: package_env },
        ));
        self.symbols.insert(outer, "builtin", package);

        self.environment_stack = vec![package_env];
    }

    pub fn environment(&self) -> EnvId {
        *self
            .environment_stack
            .last()
            .expect("environment stack should never be empty during a build")
    }

    pub fn enter_environment(&mut self, env: EnvId) {
        self.environment_stack.push(env);
    }

    pub fn leave_environment(&mut self) {
        self.environment_stack.pop();
        assert!(
            !self.environment_stack.is_empty(),
            "environment stack underflow"
        );
    }

    /// Bind `name` in the current environment, reporting a redefinition
    /// error (pointing back at the previous definition) on collision.
    pub fn put(&mut self, name: &str, def: DefId) -> Result<(), Abort> {
        let env = self.environment();
        if let Err(existing) = self.symbols.try_put(env, name, def) {
            let span = self.symbols.def(def).span;
            let previous = self.symbols.def(existing).span;
            self.reporter.error(
                Diagnostic::error(span, format!("redefinition of symbol '{name}'"))
                    .with_label(previous, "previously defined here"),
            )?;
        }
        Ok(())
    }

    /// Look up in the current environment. Deep lookups climb parents;
    /// both dereference alias chains.
    pub fn get(&self, name: &str, shallow: bool) -> Option<DefId> {
        self.symbols.get(self.environment(), name, shallow)
    }

    // Scope replay.

    pub fn create_node_environment(&mut self, node: NodeId, env: EnvId) {
        self.scopes
            .entry(node)
            .and_modify(|scope| scope.add(env))
            .or_insert_with(|| NodeScope::new(env));
    }

    pub fn next_node_environment(&mut self, node: NodeId) -> Option<EnvId> {
        self.scopes.get_mut(&node).and_then(NodeScope::next)
    }

    // Banks.

    pub fn add_bank(&mut self, bank: Bank) -> BankId {
        let id = BankId(self.banks.len() as u32);
        self.banks.push(bank);
        id
    }

    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    pub fn bank(&self, id: BankId) -> &Bank {
        &self.banks[id.index()]
    }

    pub fn switch_bank(&mut self, id: BankId) {
        self.active_bank = Some(id);
    }

    /// The bank byte-consuming statements target. None before the first
    /// relocation statement, which is a fatal error.
    pub fn check_bank(&mut self, description: &str, span: Span) -> Result<BankId, Abort> {
        match self.active_bank {
            Some(id) => Ok(id),
            None => Err(self.reporter.fatal(Diagnostic::error(
                span,
                format!("{description} is not allowed before an 'in' statement"),
            ))),
        }
    }

    // Split-borrow helpers: bank operations that also need the reporter.

    pub fn bank_reserve_virtual(
        &mut self,
        id: BankId,
        description: &str,
        size: u32,
        span: Span,
    ) -> Result<(), Abort> {
        self.banks[id.index()].reserve_virtual(description, size, span, &mut self.reporter)
    }

    pub fn bank_reserve_physical(
        &mut self,
        id: BankId,
        description: &str,
        size: u32,
        span: Span,
    ) -> Result<(), Abort> {
        self.banks[id.index()].reserve_physical(description, size, span, &mut self.reporter)
    }

    pub fn bank_write_physical(
        &mut self,
        id: BankId,
        bytes: &[u8],
        span: Span,
    ) -> Result<(), Abort> {
        self.banks[id.index()].write_physical(bytes, span, &mut self.reporter)
    }

    pub fn bank_check_address(
        &mut self,
        id: BankId,
        description: &str,
        span: Span,
    ) -> Result<u32, Abort> {
        self.banks[id.index()].check_address(description, span, &mut self.reporter)
    }

    pub fn bank_set_address(
        &mut self,
        id: BankId,
        description: &str,
        dest: u32,
        span: Span,
    ) -> Result<(), Abort> {
        self.banks[id.index()].set_address(description, dest, span, &mut self.reporter)
    }

    // Inline-expansion guard.

    /// Mark `node` as being inlined. Re-entering a node already on the
    /// stack is unbounded recursion; the error reports the whole stack and
    /// the build aborts.
    pub fn enter_inline(&mut self, context: &str, node: NodeId) -> Result<(), Abort> {
        if self.inline_active.contains(&node) {
            let span = self.ast.span(node);
            let mut diagnostic = Diagnostic::error(
                span,
                format!("recursive cycle detected in {context}"),
            )
            .with_note("infinite recursion is unrecoverable");
            for (index, &entry) in self.inline_stack.iter().enumerate() {
                diagnostic = diagnostic.with_label(
                    self.ast.span(entry),
                    format!("inline stack entry #{index}"),
                );
            }
            return Err(self.reporter.fatal(diagnostic));
        }

        self.inline_active.insert(node);
        self.inline_stack.push(node);
        Ok(())
    }

    pub fn leave_inline(&mut self) {
        if let Some(node) = self.inline_stack.pop() {
            self.inline_active.remove(&node);
        }
    }

    /// Concatenate every physical bank's storage, in declaration order.
    /// The platform's patch step runs on top of this in the driver.
    pub fn assemble(&self) -> Vec<u8> {
        let mut buffer = Vec::new();
        for bank in &self.banks {
            bank.dump(&mut buffer);
        }
        buffer
    }
}
