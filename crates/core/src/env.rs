use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::ast::NodeId;
use crate::bank::BankId;
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnvId(u32);

impl EnvId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DefId(u32);

impl DefId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone)]
pub struct Definition {
    pub span: Span,
    pub kind: DefKind,
}

impl Definition {
    pub fn new(span: Span, kind: DefKind) -> Self {
        Self { span, kind }
    }

    /// A definition injected by the platform strategy, carrying an opaque
    /// token the strategy interprets (register and flag identities).
    pub fn builtin(token: u32) -> Self {
        Self {
            span: Span::builtin(),
            kind: DefKind::Builtin { token },
        }
    }
}

#[derive(Debug, Clone)]
pub enum DefKind {
    /// Transparent rename of another definition; lookups dereference it.
    Alias { target: DefId },
    Bank { bank: Option<BankId> },
    /// Compile-time constant, evaluated lazily in its defining environment.
    Const { value: NodeId, env: EnvId },
    Func { decl: NodeId },
    Label { address: Option<u32> },
    Package { env: EnvId },
    Var { address: Option<u32> },
    Builtin { token: u32 },
}

impl DefKind {
    pub fn name(&self) -> &'static str {
        match self {
            DefKind::Alias { .. } => "alias",
            DefKind::Bank { .. } => "bank",
            DefKind::Const { .. } => "constant",
            DefKind::Func { .. } => "function",
            DefKind::Label { .. } => "label",
            DefKind::Package { .. } => "package",
            DefKind::Var { .. } => "variable",
            DefKind::Builtin { .. } => "builtin",
        }
    }
}

#[derive(Debug, Default)]
struct EnvData {
    parent: Option<EnvId>,
    names: IndexMap<String, DefId>,
}

/// Environment and definition arenas. Scopes and definitions are created
/// during orchestration passes and live until the build ends, so plain
/// index handles are safe to hold across passes.
#[derive(Debug, Default)]
pub struct Symbols {
    envs: Vec<EnvData>,
    defs: Vec<Definition>,
}

impl Symbols {
    pub fn new_env(&mut self, parent: Option<EnvId>) -> EnvId {
        let id = EnvId(self.envs.len() as u32);
        self.envs.push(EnvData {
            parent,
            names: IndexMap::new(),
        });
        id
    }

    pub fn parent(&self, env: EnvId) -> Option<EnvId> {
        self.envs[env.index()].parent
    }

    pub fn define(&mut self, definition: Definition) -> DefId {
        let id = DefId(self.defs.len() as u32);
        self.defs.push(definition);
        id
    }

    pub fn def(&self, id: DefId) -> &Definition {
        &self.defs[id.index()]
    }

    pub fn def_mut(&mut self, id: DefId) -> &mut Definition {
        &mut self.defs[id.index()]
    }

    /// Insert a binding, failing with the already-bound definition on a
    /// shallow collision. The caller turns the collision into a
    /// redefinition diagnostic.
    pub fn try_put(&mut self, env: EnvId, name: &str, def: DefId) -> Result<(), DefId> {
        if let Some(existing) = self.get(env, name, true) {
            return Err(existing);
        }
        self.envs[env.index()].names.insert(name.to_string(), def);
        Ok(())
    }

    /// Insert without collision checking. Used for builtin injection.
    pub fn insert(&mut self, env: EnvId, name: impl Into<String>, def: DefId) {
        self.envs[env.index()].names.insert(name.into(), def);
    }

    /// Look a name up, climbing parents unless `shallow`, and dereference
    /// alias chains. A cycle of aliases behaves as an unresolved name.
    pub fn get(&self, env: EnvId, name: &str, shallow: bool) -> Option<DefId> {
        let mut scope = Some(env);
        while let Some(current) = scope {
            if let Some(&hit) = self.envs[current.index()].names.get(name) {
                return self.deref_alias(hit);
            }
            if shallow {
                return None;
            }
            scope = self.envs[current.index()].parent;
        }
        None
    }

    fn deref_alias(&self, def: DefId) -> Option<DefId> {
        let mut current = def;
        let mut seen = FxHashSet::default();
        while let DefKind::Alias { target } = self.def(current).kind {
            if !seen.insert(current) {
                return None;
            }
            current = target;
        }
        Some(current)
    }
}

/// The ordered, replayable sequence of environments one block-shaped node
/// has been assigned. The first pass that visits the block appends a fresh
/// environment; every later pass replays the same sequence in the same
/// order, so re-walking the tree observes exactly the scopes built before.
/// A block can appear more than once per pass (unroll copies and inline
/// call sites share statement identity), which is why this is a queue and
/// not a single slot.
#[derive(Debug, Default)]
pub struct NodeScope {
    environments: Vec<EnvId>,
    index: usize,
}

impl NodeScope {
    pub fn new(environment: EnvId) -> Self {
        Self {
            environments: vec![environment],
            index: 1,
        }
    }

    pub fn rewind(&mut self) {
        self.index = 0;
    }

    /// Append a fresh environment; the cursor moves past it so the current
    /// pass will not replay it.
    pub fn add(&mut self, environment: EnvId) {
        self.environments.push(environment);
        self.index = self.environments.len();
    }

    pub fn next(&mut self) -> Option<EnvId> {
        let env = self.environments.get(self.index).copied();
        if env.is_some() {
            self.index += 1;
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> Span {
        Span::builtin()
    }

    #[test]
    fn deep_lookup_climbs_parents() {
        let mut symbols = Symbols::default();
        let outer = symbols.new_env(None);
        let inner = symbols.new_env(Some(outer));
        let def = symbols.define(Definition::new(span(), DefKind::Label { address: None }));
        symbols.try_put(outer, "top", def).expect("fresh binding");

        assert_eq!(symbols.get(inner, "top", false), Some(def));
        assert_eq!(symbols.get(inner, "top", true), None);
    }

    #[test]
    fn shallow_collision_reports_existing_definition() {
        let mut symbols = Symbols::default();
        let env = symbols.new_env(None);
        let first = symbols.define(Definition::new(span(), DefKind::Label { address: None }));
        let second = symbols.define(Definition::new(span(), DefKind::Var { address: None }));
        symbols.try_put(env, "x", first).expect("fresh binding");

        assert_eq!(symbols.try_put(env, "x", second), Err(first));
    }

    #[test]
    fn alias_chains_dereference_to_final_definition() {
        let mut symbols = Symbols::default();
        let env = symbols.new_env(None);
        let target = symbols.define(Definition::new(span(), DefKind::Var { address: Some(3) }));
        let mid = symbols.define(Definition::new(span(), DefKind::Alias { target }));
        let top = symbols.define(Definition::new(span(), DefKind::Alias { target: mid }));
        symbols.try_put(env, "a", top).expect("fresh binding");

        assert_eq!(symbols.get(env, "a", false), Some(target));
    }

    #[test]
    fn alias_cycles_resolve_as_not_found() {
        let mut symbols = Symbols::default();
        let env = symbols.new_env(None);
        let first = symbols.define(Definition::new(span(), DefKind::Label { address: None }));
        let second = symbols.define(Definition::new(span(), DefKind::Alias { target: first }));
        // Rewrite the first into an alias of the second, closing the loop.
        symbols.def_mut(first).kind = DefKind::Alias { target: second };
        symbols.try_put(env, "a", first).expect("fresh binding");

        assert_eq!(symbols.get(env, "a", false), None);
    }

    #[test]
    fn node_scope_replays_in_insertion_order() {
        let mut symbols = Symbols::default();
        let first = symbols.new_env(None);
        let second = symbols.new_env(None);

        let mut scope = NodeScope::new(first);
        assert_eq!(scope.next(), None);
        scope.add(second);
        assert_eq!(scope.next(), None);

        scope.rewind();
        assert_eq!(scope.next(), Some(first));
        assert_eq!(scope.next(), Some(second));
        assert_eq!(scope.next(), None);
    }
}
