use crate::ast::{NodeId, NodeKind, attribute_name};
use crate::diag::{Abort, Diagnostic};
use crate::env::{DefId, DefKind};
use crate::program::Program;

/// Resolve a qualified attribute path (`a.b.c`) against the current
/// environment: the first segment is a deep lookup, every later segment a
/// shallow lookup inside the previous segment's package. Failures name the
/// longest resolvable prefix, unless `quiet`, in which case resolution
/// failure is silently `None` (used for speculative lookups, e.g. deciding
/// whether an lvalue aliases an existing symbol).
pub fn resolve_attribute(
    program: &mut Program,
    node: NodeId,
    quiet: bool,
) -> Result<Option<DefId>, Abort> {
    let NodeKind::Attribute { pieces } = program.ast.kind(node) else {
        return Ok(None);
    };
    let pieces = pieces.clone();
    let full_name = attribute_name(&pieces);
    let span = program.ast.span(node);

    let mut prev: Option<DefId> = None;
    for (index, piece) in pieces.iter().enumerate() {
        let def = match prev {
            None => program.get(piece, false),
            Some(prev) => match program.symbols.def(prev).kind {
                DefKind::Package { env } => program.symbols.get(env, piece, true),
                _ => {
                    if !quiet {
                        let prefix = attribute_name(&pieces[..index]);
                        program.reporter.error(Diagnostic::error(
                            span,
                            format!(
                                "attempt to get symbol '{full_name}', but '{prefix}' is not a package"
                            ),
                        ))?;
                    }
                    return Ok(None);
                }
            },
        };

        let Some(def) = def else {
            if !quiet {
                let partial = attribute_name(&pieces[..=index]);
                let message = if partial == full_name {
                    format!("reference to undeclared symbol '{partial}'")
                } else {
                    format!("reference to undeclared symbol '{partial}' (in '{full_name}')")
                };
                program.reporter.error(Diagnostic::error(span, message))?;
            }
            return Ok(None);
        };
        prev = Some(def);
    }
    Ok(prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Ast;
    use crate::env::Definition;
    use crate::span::{SourceId, Span};

    fn span() -> Span {
        Span::new(SourceId(0), 0, 1)
    }

    fn program_with_package() -> (Program, DefId) {
        let mut program = Program::new(Ast::new());
        program.clear_environment(Vec::new());

        let package_env = program.symbols.new_env(Some(program.environment()));
        let member = program
            .symbols
            .define(Definition::new(span(), DefKind::Var { address: Some(9) }));
        program.symbols.insert(package_env, "member", member);
        let package = program
            .symbols
            .define(Definition::new(span(), DefKind::Package { env: package_env }));
        program.put("pkg", package).expect("fresh binding");
        (program, member)
    }

    #[test]
    fn qualified_path_resolves_through_packages() {
        let (mut program, member) = program_with_package();
        let attr = program.ast.attribute(
            vec!["pkg".to_string(), "member".to_string()],
            span(),
        );

        let result = resolve_attribute(&mut program, attr, false).expect("no abort");
        assert_eq!(result, Some(member));
        assert_eq!(program.reporter.error_count(), 0);
    }

    #[test]
    fn missing_segment_names_the_longest_prefix() {
        let (mut program, _) = program_with_package();
        let attr = program.ast.attribute(
            vec!["pkg".to_string(), "absent".to_string()],
            span(),
        );

        let result = resolve_attribute(&mut program, attr, false).expect("no abort");
        assert_eq!(result, None);
        assert!(
            program.reporter.diagnostics()[0]
                .message
                .contains("'pkg.absent'")
        );
    }

    #[test]
    fn qualifying_through_a_non_package_is_an_error() {
        let (mut program, _) = program_with_package();
        let attr = program.ast.attribute(
            vec!["pkg".to_string(), "member".to_string(), "deeper".to_string()],
            span(),
        );

        let result = resolve_attribute(&mut program, attr, false).expect("no abort");
        assert_eq!(result, None);
        assert!(
            program.reporter.diagnostics()[0]
                .message
                .contains("'pkg.member' is not a package")
        );
    }

    #[test]
    fn quiet_mode_fails_silently() {
        let (mut program, _) = program_with_package();
        let attr = program.ast.name("absent", span());

        let result = resolve_attribute(&mut program, attr, true).expect("no abort");
        assert_eq!(result, None);
        assert_eq!(program.reporter.error_count(), 0);
    }
}
