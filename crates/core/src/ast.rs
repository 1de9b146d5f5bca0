use crate::span::Span;

/// Process-unique identity of a node, valid for the lifetime of its [`Ast`].
/// Dense arena index, so per-node side tables can key on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Not,
    Neg,
    Low,
    High,
    Swap,
    Grouping,
    Indirection,
}

impl PrefixOp {
    pub fn name(self) -> &'static str {
        match self {
            PrefixOp::Not => "~",
            PrefixOp::Neg => "-",
            PrefixOp::Low => "<",
            PrefixOp::High => ">",
            PrefixOp::Swap => "<>",
            PrefixOp::Grouping => "(",
            PrefixOp::Indirection => "[",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostfixOp {
    Inc,
    Dec,
}

impl PostfixOp {
    pub fn name(self) -> &'static str {
        match self {
            PostfixOp::Inc => "++",
            PostfixOp::Dec => "--",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOp {
    At,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    AddC,
    SubC,
    ShiftL,
    ShiftR,
    RotateL,
    RotateR,
    RotateLC,
    RotateRC,
    ArithShiftL,
    ArithShiftR,
    Or,
    And,
    Xor,
    Colon,
}

impl InfixOp {
    pub fn name(self) -> &'static str {
        match self {
            InfixOp::At => "@",
            InfixOp::Add => "+",
            InfixOp::Sub => "-",
            InfixOp::Mul => "*",
            InfixOp::Div => "/",
            InfixOp::Mod => "%",
            InfixOp::AddC => "+#",
            InfixOp::SubC => "-#",
            InfixOp::ShiftL => "<<",
            InfixOp::ShiftR => ">>",
            InfixOp::RotateL => "<<<",
            InfixOp::RotateR => ">>>",
            InfixOp::RotateLC => "<<<#",
            InfixOp::RotateRC => ">>>#",
            InfixOp::ArithShiftL => "<<-",
            InfixOp::ArithShiftR => ">>-",
            InfixOp::Or => "|",
            InfixOp::And => "&",
            InfixOp::Xor => "^",
            InfixOp::Colon => ":",
        }
    }
}

/// Signed comparison branches usable in a `when` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Branch {
    Less,
    Greater,
    LessEqual,
    GreaterEqual,
    NotEqual,
    Equal,
}

impl Branch {
    pub fn name(self) -> &'static str {
        match self {
            Branch::Less => "<",
            Branch::Greater => ">",
            Branch::LessEqual => "<=",
            Branch::GreaterEqual => ">=",
            Branch::NotEqual => "!=",
            Branch::Equal => "==",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BankKind {
    Rom,
    Ram,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageUnit {
    Byte,
    Word,
}

impl StorageUnit {
    pub fn width(self) -> u32 {
        match self {
            StorageUnit::Byte => 1,
            StorageUnit::Word => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            StorageUnit::Byte => "byte",
            StorageUnit::Word => "word",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncKind {
    /// Plain function, terminated by an implicit `return`.
    Func,
    /// Cooperative task, terminated by an implicit `resume`.
    Task,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JumpKind {
    Goto,
    Call,
    Return,
    Resume,
    Sleep,
    Suspend,
    Nop,
    Abort,
    While,
    Until,
    Break,
    Continue,
    Inline,
}

impl JumpKind {
    pub fn name(self) -> &'static str {
        match self {
            JumpKind::Goto => "goto",
            JumpKind::Call => "call",
            JumpKind::Return => "return",
            JumpKind::Resume => "resume",
            JumpKind::Sleep => "sleep",
            JumpKind::Suspend => "suspend",
            JumpKind::Nop => "nop",
            JumpKind::Abort => "abort",
            JumpKind::While => "while",
            JumpKind::Until => "until",
            JumpKind::Break => "break",
            JumpKind::Continue => "continue",
            JumpKind::Inline => "inline",
        }
    }
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    // Expression leaves and operators.
    Number(u32),
    Str(String),
    Attribute {
        pieces: Vec<String>,
    },
    Prefix {
        op: PrefixOp,
        operand: NodeId,
    },
    /// Left-to-right chain: `operands.len() == ops.len() + 1`.
    Infix {
        ops: Vec<InfixOp>,
        operands: Vec<NodeId>,
    },
    Postfix {
        op: PostfixOp,
        operand: NodeId,
    },
    Pop,

    // Statements.
    Block {
        name: Option<String>,
        statements: Vec<NodeId>,
    },
    BankDecl {
        names: Vec<String>,
        kind: BankKind,
        size: NodeId,
    },
    VarDecl {
        names: Vec<String>,
        storage: NodeId,
    },
    Storage {
        unit: StorageUnit,
        size: Option<NodeId>,
    },
    LetDecl {
        name: String,
        value: NodeId,
    },
    LabelDecl {
        name: String,
    },
    FuncDecl {
        kind: FuncKind,
        name: String,
        inline: bool,
        /// The declared body block. Kept addressable after expansion so
        /// inline calls can substitute it at their call sites.
        inner: NodeId,
        /// Label + body + implicit terminator once expanded. Stays empty for
        /// inline functions, which are reached only through call sites.
        lowered: Vec<NodeId>,
        expanded: bool,
    },
    Conditional {
        trigger: NodeId,
        far: bool,
        prelude: Option<NodeId>,
        action: NodeId,
        alternative: Option<NodeId>,
    },
    Loop {
        body: NodeId,
        far: bool,
        expanded: bool,
    },
    Unroll {
        count: NodeId,
        body: NodeId,
        expanded: bool,
    },
    Jump {
        kind: JumpKind,
        far: bool,
        destination: Option<NodeId>,
        condition: Option<NodeId>,
        /// Callee body substituted at this call site by `inline call`
        /// expansion.
        inlining: Option<NodeId>,
    },
    /// Normalized `when` clause: either a named flag reference or a
    /// comparison branch, with a negation bit that composes by XOR when
    /// conditions wrap other conditions.
    JumpCondition {
        negated: bool,
        flag: Option<NodeId>,
        branch: Option<Branch>,
    },
    Push {
        src: NodeId,
        intermediary: Option<NodeId>,
    },
    /// `in bank, addr`: switch the active bank, optionally fixing its
    /// origin.
    Relocation {
        name: String,
        dest: Option<NodeId>,
    },
    Data {
        storage: NodeId,
        items: Vec<NodeId>,
    },
    Embed {
        path: String,
        /// File contents, read once during the reservation pass.
        data: Option<Vec<u8>>,
    },
    Assignment {
        dest: NodeId,
        intermediary: Option<NodeId>,
        /// `None` for postfix forms (`x++`, `x--`).
        src: Option<NodeId>,
        postfix: Option<PostfixOp>,
    },
    Comparison {
        left: NodeId,
        right: Option<NodeId>,
    },
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    pub span: Span,
}

impl Node {
    /// Child slots in declaration order. Traversal snapshots this before
    /// descending, so post-visit handlers may rewrite the arena freely.
    pub fn children(&self) -> Vec<NodeId> {
        match &self.kind {
            NodeKind::Number(_)
            | NodeKind::Str(_)
            | NodeKind::Attribute { .. }
            | NodeKind::Pop
            | NodeKind::LabelDecl { .. }
            | NodeKind::Embed { .. } => Vec::new(),
            NodeKind::Prefix { operand, .. } | NodeKind::Postfix { operand, .. } => {
                vec![*operand]
            }
            NodeKind::Infix { operands, .. } => operands.clone(),
            NodeKind::Block { statements, .. } => statements.clone(),
            NodeKind::BankDecl { size, .. } => vec![*size],
            NodeKind::VarDecl { storage, .. } => vec![*storage],
            NodeKind::Storage { size, .. } => size.iter().copied().collect(),
            NodeKind::LetDecl { value, .. } => vec![*value],
            NodeKind::FuncDecl {
                inner,
                lowered,
                expanded,
                ..
            } => {
                if *expanded {
                    lowered.clone()
                } else {
                    vec![*inner]
                }
            }
            NodeKind::Conditional {
                action,
                alternative,
                ..
            } => {
                let mut children = vec![*action];
                children.extend(alternative.iter().copied());
                children
            }
            NodeKind::Loop { body, .. } | NodeKind::Unroll { body, .. } => vec![*body],
            NodeKind::Jump {
                destination,
                condition,
                inlining,
                ..
            } => destination
                .iter()
                .chain(condition.iter())
                .chain(inlining.iter())
                .copied()
                .collect(),
            NodeKind::JumpCondition { flag, .. } => flag.iter().copied().collect(),
            NodeKind::Push { src, intermediary } => {
                let mut children = vec![*src];
                children.extend(intermediary.iter().copied());
                children
            }
            NodeKind::Relocation { dest, .. } => dest.iter().copied().collect(),
            NodeKind::Data { storage, items } => {
                let mut children = vec![*storage];
                children.extend(items.iter().copied());
                children
            }
            NodeKind::Assignment {
                dest,
                intermediary,
                src,
                ..
            } => {
                let mut children = vec![*dest];
                children.extend(intermediary.iter().copied());
                children.extend(src.iter().copied());
                children
            }
            NodeKind::Comparison { left, right } => {
                let mut children = vec![*left];
                children.extend(right.iter().copied());
                children
            }
        }
    }
}

/// Arena of AST nodes. Nodes are created once by the parser (or by the
/// one-shot desugaring transforms) and addressed by [`NodeId`]; a node's
/// identity never changes, even when desugaring rewrites its kind in place.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    nodes: Vec<Node>,
}

pub fn attribute_name(pieces: &[String]) -> String {
    pieces.join(".")
}

impl Ast {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn alloc(&mut self, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Node { kind, span });
        id
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.index()]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.index()].kind
    }

    pub fn span(&self, id: NodeId) -> Span {
        self.nodes[id.index()].span
    }

    // Builders. This is the construction surface the external parser
    // targets; the desugaring transforms below use the same calls.

    pub fn number(&mut self, value: u32, span: Span) -> NodeId {
        self.alloc(NodeKind::Number(value), span)
    }

    pub fn string(&mut self, value: impl Into<String>, span: Span) -> NodeId {
        self.alloc(NodeKind::Str(value.into()), span)
    }

    pub fn attribute(&mut self, pieces: Vec<String>, span: Span) -> NodeId {
        self.alloc(NodeKind::Attribute { pieces }, span)
    }

    pub fn name(&mut self, piece: impl Into<String>, span: Span) -> NodeId {
        self.attribute(vec![piece.into()], span)
    }

    pub fn prefix(&mut self, op: PrefixOp, operand: NodeId, span: Span) -> NodeId {
        self.alloc(NodeKind::Prefix { op, operand }, span)
    }

    pub fn infix(&mut self, ops: Vec<InfixOp>, operands: Vec<NodeId>, span: Span) -> NodeId {
        debug_assert_eq!(operands.len(), ops.len() + 1);
        self.alloc(NodeKind::Infix { ops, operands }, span)
    }

    pub fn postfix(&mut self, op: PostfixOp, operand: NodeId, span: Span) -> NodeId {
        self.alloc(NodeKind::Postfix { op, operand }, span)
    }

    pub fn pop(&mut self, span: Span) -> NodeId {
        self.alloc(NodeKind::Pop, span)
    }

    pub fn block(
        &mut self,
        name: Option<String>,
        statements: Vec<NodeId>,
        span: Span,
    ) -> NodeId {
        self.alloc(NodeKind::Block { name, statements }, span)
    }

    pub fn bank_decl(
        &mut self,
        names: Vec<String>,
        kind: BankKind,
        size: NodeId,
        span: Span,
    ) -> NodeId {
        self.alloc(NodeKind::BankDecl { names, kind, size }, span)
    }

    pub fn var_decl(&mut self, names: Vec<String>, storage: NodeId, span: Span) -> NodeId {
        self.alloc(NodeKind::VarDecl { names, storage }, span)
    }

    pub fn storage(&mut self, unit: StorageUnit, size: Option<NodeId>, span: Span) -> NodeId {
        self.alloc(NodeKind::Storage { unit, size }, span)
    }

    pub fn let_decl(&mut self, name: impl Into<String>, value: NodeId, span: Span) -> NodeId {
        self.alloc(
            NodeKind::LetDecl {
                name: name.into(),
                value,
            },
            span,
        )
    }

    pub fn label_decl(&mut self, name: impl Into<String>, span: Span) -> NodeId {
        self.alloc(NodeKind::LabelDecl { name: name.into() }, span)
    }

    pub fn func_decl(
        &mut self,
        kind: FuncKind,
        name: impl Into<String>,
        inline: bool,
        inner: NodeId,
        span: Span,
    ) -> NodeId {
        self.alloc(
            NodeKind::FuncDecl {
                kind,
                name: name.into(),
                inline,
                inner,
                lowered: Vec::new(),
                expanded: false,
            },
            span,
        )
    }

    pub fn conditional(
        &mut self,
        trigger: NodeId,
        far: bool,
        prelude: Option<NodeId>,
        action: NodeId,
        alternative: Option<NodeId>,
        span: Span,
    ) -> NodeId {
        self.alloc(
            NodeKind::Conditional {
                trigger,
                far,
                prelude,
                action,
                alternative,
            },
            span,
        )
    }

    pub fn loop_stmt(&mut self, body: NodeId, far: bool, span: Span) -> NodeId {
        self.alloc(
            NodeKind::Loop {
                body,
                far,
                expanded: false,
            },
            span,
        )
    }

    pub fn unroll(&mut self, count: NodeId, body: NodeId, span: Span) -> NodeId {
        self.alloc(
            NodeKind::Unroll {
                count,
                body,
                expanded: false,
            },
            span,
        )
    }

    pub fn jump(
        &mut self,
        kind: JumpKind,
        far: bool,
        destination: Option<NodeId>,
        condition: Option<NodeId>,
        span: Span,
    ) -> NodeId {
        self.alloc(
            NodeKind::Jump {
                kind,
                far,
                destination,
                condition,
                inlining: None,
            },
            span,
        )
    }

    /// Normalize a `when` clause around an existing condition, attribute, or
    /// wrapped condition. Negation composes by XOR.
    pub fn jump_condition(&mut self, negated: bool, condition: NodeId, span: Span) -> NodeId {
        let kind = match &self.node(condition).kind {
            NodeKind::JumpCondition {
                negated: inner,
                flag,
                branch,
            } => NodeKind::JumpCondition {
                negated: negated ^ *inner,
                flag: *flag,
                branch: *branch,
            },
            NodeKind::Attribute { .. } => NodeKind::JumpCondition {
                negated,
                flag: Some(condition),
                branch: None,
            },
            _ => panic!("jump condition must wrap a condition or a flag attribute"),
        };
        self.alloc(kind, span)
    }

    pub fn branch_condition(&mut self, negated: bool, branch: Branch, span: Span) -> NodeId {
        self.alloc(
            NodeKind::JumpCondition {
                negated,
                flag: None,
                branch: Some(branch),
            },
            span,
        )
    }

    pub fn push(&mut self, src: NodeId, intermediary: Option<NodeId>, span: Span) -> NodeId {
        self.alloc(NodeKind::Push { src, intermediary }, span)
    }

    pub fn relocation(
        &mut self,
        name: impl Into<String>,
        dest: Option<NodeId>,
        span: Span,
    ) -> NodeId {
        self.alloc(
            NodeKind::Relocation {
                name: name.into(),
                dest,
            },
            span,
        )
    }

    pub fn data(&mut self, storage: NodeId, items: Vec<NodeId>, span: Span) -> NodeId {
        self.alloc(NodeKind::Data { storage, items }, span)
    }

    pub fn embed(&mut self, path: impl Into<String>, span: Span) -> NodeId {
        self.alloc(
            NodeKind::Embed {
                path: path.into(),
                data: None,
            },
            span,
        )
    }

    pub fn assignment(
        &mut self,
        dest: NodeId,
        intermediary: Option<NodeId>,
        src: NodeId,
        span: Span,
    ) -> NodeId {
        self.alloc(
            NodeKind::Assignment {
                dest,
                intermediary,
                src: Some(src),
                postfix: None,
            },
            span,
        )
    }

    pub fn postfix_assignment(&mut self, dest: NodeId, op: PostfixOp, span: Span) -> NodeId {
        self.alloc(
            NodeKind::Assignment {
                dest,
                intermediary: None,
                src: None,
                postfix: Some(op),
            },
            span,
        )
    }

    pub fn comparison(&mut self, left: NodeId, right: Option<NodeId>, span: Span) -> NodeId {
        self.alloc(NodeKind::Comparison { left, right }, span)
    }

    // One-shot desugaring transforms. Each is applied by the orchestrator at
    // a fixed pass and is a no-op if reapplied.

    /// Rewrite a conditional into its primitive form, replacing the node's
    /// own kind with the lowered block:
    ///
    /// ```text
    /// prelude; goto $end when ~trigger; action; def $end:
    /// prelude; goto $else when ~trigger; action; goto $end;
    ///     def $else: alternative; def $end:
    /// ```
    pub fn expand_conditional(&mut self, id: NodeId) {
        let span = self.span(id);
        let NodeKind::Conditional {
            trigger,
            far,
            prelude,
            action,
            alternative,
        } = self.node(id).kind.clone()
        else {
            return;
        };

        let negated = self.jump_condition(true, trigger, span);
        let mut statements = Vec::new();
        statements.extend(prelude);

        if let Some(alternative) = alternative {
            let else_target = self.name("$else", span);
            let end_target = self.name("$end", span);
            let skip = self.jump(JumpKind::Goto, far, Some(else_target), Some(negated), span);
            let join = self.jump(JumpKind::Goto, far, Some(end_target), None, span);
            let else_label = self.label_decl("$else", span);
            let end_label = self.label_decl("$end", span);
            statements.extend([skip, action, join, else_label, alternative, end_label]);
        } else {
            let end_target = self.name("$end", span);
            let skip = self.jump(JumpKind::Goto, far, Some(end_target), Some(negated), span);
            let end_label = self.label_decl("$end", span);
            statements.extend([skip, action, end_label]);
        }

        self.node_mut(id).kind = NodeKind::Block {
            name: None,
            statements,
        };
    }

    /// Rewrite a loop body into `def $loop: body; goto $loop; def $end:`.
    /// A trailing bare `while`/`until` becomes a conditional `continue` and
    /// suppresses the unconditional back-jump.
    pub fn expand_loop(&mut self, id: NodeId) {
        let span = self.span(id);
        let NodeKind::Loop {
            body,
            far,
            expanded,
        } = self.node(id).kind.clone()
        else {
            return;
        };
        if expanded {
            return;
        }

        let tail = match &self.node(body).kind {
            NodeKind::Block { statements, .. } => statements.last().copied(),
            _ => None,
        };
        let mut tail_conditional = false;
        if let Some(tail) = tail {
            let jump = match &self.node(tail).kind {
                NodeKind::Jump {
                    kind,
                    far: tail_far,
                    condition,
                    ..
                } => Some((*kind, *tail_far, *condition)),
                _ => None,
            };
            let tail_span = self.span(tail);
            let replacement = match jump {
                // Tail 'while cond' -> 'continue when cond'.
                Some((JumpKind::While, tail_far, Some(condition))) => Some(self.jump(
                    JumpKind::Continue,
                    far || tail_far,
                    None,
                    Some(condition),
                    tail_span,
                )),
                // Tail 'until cond' -> 'continue when ~cond'.
                Some((JumpKind::Until, tail_far, Some(condition))) => {
                    let negated = self.jump_condition(true, condition, tail_span);
                    Some(self.jump(
                        JumpKind::Continue,
                        far || tail_far,
                        None,
                        Some(negated),
                        tail_span,
                    ))
                }
                _ => None,
            };
            if let Some(replacement) = replacement {
                tail_conditional = true;
                if let NodeKind::Block { statements, .. } = &mut self.node_mut(body).kind {
                    *statements.last_mut().expect("tail statement exists") = replacement;
                }
            }
        }

        let loop_label = self.label_decl("$loop", span);
        let mut statements = vec![loop_label, body];
        if !tail_conditional {
            let loop_target = self.name("$loop", span);
            statements.push(self.jump(JumpKind::Goto, far, Some(loop_target), None, span));
        }
        statements.push(self.label_decl("$end", span));
        let lowered = self.block(None, statements, span);

        if let NodeKind::Loop {
            body, expanded, ..
        } = &mut self.node_mut(id).kind
        {
            *body = lowered;
            *expanded = true;
        }
    }

    /// Duplicate the unroll body `times` times. The copies share their child
    /// statement nodes; scope replay keeps each visit's environment
    /// distinct.
    pub fn expand_unroll(&mut self, id: NodeId, times: u32) {
        let span = self.span(id);
        let NodeKind::Unroll {
            body, expanded, ..
        } = self.node(id).kind.clone()
        else {
            return;
        };
        if expanded {
            return;
        }

        let statements = match &self.node(body).kind {
            NodeKind::Block { statements, .. } => statements.clone(),
            _ => return,
        };
        let copies = (0..times)
            .map(|_| self.block(None, statements.clone(), span))
            .collect();
        let lowered = self.block(None, copies, span);

        if let NodeKind::Unroll {
            body, expanded, ..
        } = &mut self.node_mut(id).kind
        {
            *body = lowered;
            *expanded = true;
        }
    }

    /// Wrap a non-inline function as `def name: inner; return/resume`.
    /// Inline functions expose no lowered statements; their bodies are
    /// reached only through call-site substitution.
    pub fn expand_func_decl(&mut self, id: NodeId) {
        let span = self.span(id);
        let NodeKind::FuncDecl {
            kind,
            name,
            inline,
            inner,
            expanded,
            ..
        } = self.node(id).kind.clone()
        else {
            return;
        };
        if expanded {
            return;
        }

        let lowered = if inline {
            Vec::new()
        } else {
            let label = self.label_decl(name, span);
            let terminator = match kind {
                FuncKind::Func => JumpKind::Return,
                FuncKind::Task => JumpKind::Resume,
            };
            let terminator = self.jump(terminator, false, None, None, span);
            vec![label, inner, terminator]
        };

        if let NodeKind::FuncDecl {
            lowered: slot,
            expanded,
            ..
        } = &mut self.node_mut(id).kind
        {
            *slot = lowered;
            *expanded = true;
        }
    }

    /// Rewrite loop-control jumps into primitive gotos against the labels
    /// introduced by [`Ast::expand_loop`].
    pub fn expand_jump(&mut self, id: NodeId) {
        let span = self.span(id);
        let NodeKind::Jump {
            kind, condition, ..
        } = self.node(id).kind.clone()
        else {
            return;
        };

        let (target, condition) = match kind {
            JumpKind::Continue => ("$loop", condition),
            JumpKind::While => {
                let condition = condition.expect("while carries a condition");
                ("$end", Some(self.jump_condition(true, condition, span)))
            }
            JumpKind::Until | JumpKind::Break => ("$end", condition),
            _ => return,
        };
        let destination = self.name(target, span);

        if let NodeKind::Jump {
            kind,
            destination: dest_slot,
            condition: cond_slot,
            ..
        } = &mut self.node_mut(id).kind
        {
            *kind = JumpKind::Goto;
            *dest_slot = Some(destination);
            *cond_slot = condition;
        }
    }

    /// Store the callee body for substitution at this `inline call` site.
    pub fn expand_inline_jump(&mut self, id: NodeId, body: NodeId) {
        if let NodeKind::Jump { inlining, .. } = &mut self.node_mut(id).kind {
            *inlining = Some(body);
        }
    }
}
