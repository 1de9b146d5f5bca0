use crate::ast::NodeId;
use crate::diag::Abort;
use crate::program::Program;

/// Per-pass callbacks for the generic recursive walker. Passes differ only
/// in which callbacks they supply; the walker itself is reused unmodified
/// for every orchestration pass and for constant folding.
pub trait Visitor {
    /// Pre-visit. Returning `Ok(false)` vetoes descent into children.
    fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
        let _ = (program, node);
        Ok(true)
    }

    fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
        let _ = (program, node);
        Ok(())
    }
}

/// Walk `node` depth-first, following its declared child slots in order.
/// The child list is snapshotted before descent, so a post callback may
/// rewrite the arena (desugaring) without disturbing the walk in progress.
pub fn traverse<V: Visitor + ?Sized>(
    program: &mut Program,
    node: NodeId,
    visitor: &mut V,
) -> Result<(), Abort> {
    if visitor.pre(program, node)? {
        let children = program.ast.node(node).children();
        for child in children {
            traverse(program, child, visitor)?;
        }
    }
    visitor.post(program, node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Ast, NodeKind};
    use crate::span::{SourceId, Span};

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    struct CollectNumbers {
        seen: Vec<u32>,
        skip_blocks: bool,
    }

    impl Visitor for CollectNumbers {
        fn pre(&mut self, program: &mut Program, node: NodeId) -> Result<bool, Abort> {
            if self.skip_blocks
                && matches!(program.ast.kind(node), NodeKind::Block { .. })
            {
                return Ok(false);
            }
            Ok(true)
        }

        fn post(&mut self, program: &mut Program, node: NodeId) -> Result<(), Abort> {
            if let NodeKind::Number(value) = program.ast.kind(node) {
                self.seen.push(*value);
            }
            Ok(())
        }
    }

    #[test]
    fn visits_children_in_slot_order() {
        let mut ast = Ast::new();
        let one = ast.number(1, span());
        let two = ast.number(2, span());
        let sum = ast.infix(vec![crate::ast::InfixOp::Add], vec![one, two], span());
        let block = ast.block(None, vec![sum], span());
        let mut program = Program::new(ast);

        let mut visitor = CollectNumbers {
            seen: Vec::new(),
            skip_blocks: false,
        };
        traverse(&mut program, block, &mut visitor).expect("no abort");
        assert_eq!(visitor.seen, vec![1, 2]);
    }

    #[test]
    fn pre_visit_vetoes_descent() {
        let mut ast = Ast::new();
        let one = ast.number(1, span());
        let block = ast.block(None, vec![one], span());
        let mut program = Program::new(ast);

        let mut visitor = CollectNumbers {
            seen: Vec::new(),
            skip_blocks: true,
        };
        traverse(&mut program, block, &mut visitor).expect("no abort");
        assert!(visitor.seen.is_empty());
    }
}
