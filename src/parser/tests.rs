//! Parser tests.

#[cfg(test)]
mod tests {
    use crate::ast::*;
    use crate::error::ParserError;
    use crate::lexer::Scanner;
    use crate::parser::Parser;

    fn parse(source: &str) -> Result<Program, ParserError> {
        let tokens = Scanner::new(source).scan_tokens()?;
        Parser::new(tokens).parse()
    }

    fn parse_stmt(source: &str) -> Stmt {
        parse(source).unwrap().statements.into_iter().next().unwrap()
    }

    fn parse_expr(source: &str) -> Expr {
        match parse_stmt(source).kind {
            StmtKind::Expression(expr) => expr,
            other => panic!("Expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_expr() {
        let expr = parse_expr("1 + 2");
        match expr.kind {
            ExprKind::Binary { operator, .. } => assert_eq!(operator, BinaryOp::Add),
            _ => panic!("Expected binary expression"),
        }
    }

    #[test]
    fn test_precedence() {
        // 1 + 2 * 3 should parse as 1 + (2 * 3)
        let expr = parse_expr("1 + 2 * 3");
        match expr.kind {
            ExprKind::Binary {
                operator: BinaryOp::Add,
                right,
                ..
            } => assert!(matches!(
                right.kind,
                ExprKind::Binary {
                    operator: BinaryOp::Multiply,
                    ..
                }
            )),
            _ => panic!("Expected add at top"),
        }
    }

    #[test]
    fn test_power_is_right_associative() {
        let expr = parse_expr("2 ** 3 ** 2");
        match expr.kind {
            ExprKind::Binary {
                operator: BinaryOp::Power,
                left,
                right,
            } => {
                assert_eq!(left.kind, ExprKind::Number(2.0));
                assert!(matches!(right.kind, ExprKind::Binary { .. }));
            }
            _ => panic!("Expected power"),
        }
    }

    #[test]
    fn test_coalescing_operators() {
        let expr = parse_expr("a ?? b ?! c");
        match expr.kind {
            ExprKind::Logical {
                operator: LogicalOp::ErrorCoalesce,
                left,
                ..
            } => assert!(matches!(
                left.kind,
                ExprKind::Logical {
                    operator: LogicalOp::Nullish,
                    ..
                }
            )),
            _ => panic!("Expected coalescing chain"),
        }
    }

    #[test]
    fn test_ternary_requires_else_branch() {
        assert!(parse("let x = a ? 1").is_err());
        let expr = parse_expr("a ? 1 : 2");
        assert!(matches!(expr.kind, ExprKind::Ternary { .. }));
    }

    #[test]
    fn test_call_with_named_arguments() {
        let expr = parse_expr("f(1, b: 2)");
        match expr.kind {
            ExprKind::Call { arguments, .. } => {
                assert!(matches!(arguments[0], Argument::Positional(_)));
                assert!(matches!(&arguments[1], Argument::Named(n) if n.name == "b"));
            }
            _ => panic!("Expected call"),
        }
    }

    #[test]
    fn test_named_argument_before_positional_is_rejected() {
        assert!(parse("f(a: 1, 2)").is_err());
    }

    #[test]
    fn test_function_literal_parameters() {
        let stmt = parse_stmt("let add = (a, b = 2, ...rest) => a + b");
        match stmt.kind {
            StmtKind::Declaration(Declaration {
                initializer: Some(init),
                ..
            }) => match init.kind {
                ExprKind::Function(func) => {
                    assert_eq!(func.name.as_deref(), Some("add"));
                    assert_eq!(func.params.len(), 3);
                    assert!(func.params[1].default_value.is_some());
                    assert!(func.params[2].is_rest);
                    assert_eq!(func.body.len(), 1);
                }
                _ => panic!("Expected function literal"),
            },
            _ => panic!("Expected declaration"),
        }
    }

    #[test]
    fn test_catch_all_must_be_last() {
        assert!(parse("let f = (...rest, a) => a").is_err());
    }

    #[test]
    fn test_typed_function() {
        let expr = parse_expr("(a :: number) :: [string] => { return a }");
        match expr.kind {
            ExprKind::Function(func) => {
                assert_eq!(func.params[0].type_annotation.as_ref().unwrap().to_string(), "number");
                assert_eq!(func.return_type.unwrap().to_string(), "[string]");
            }
            _ => panic!("Expected function literal"),
        }
    }

    #[test]
    fn test_single_parameter_arrow() {
        let expr = parse_expr("x => x * 2");
        assert!(matches!(expr.kind, ExprKind::Function(_)));
    }

    #[test]
    fn test_destructuring_patterns() {
        let stmt = parse_stmt("const [a, {b, c: [d]}] = value");
        match stmt.kind {
            StmtKind::Declaration(decl) => {
                assert_eq!(decl.kind, DeclKind::Const);
                assert_eq!(decl.pattern.names(), vec!["a", "b", "d"]);
            }
            _ => panic!("Expected declaration"),
        }
    }

    #[test]
    fn test_empty_pattern_is_rejected() {
        assert!(parse("let [] = x").is_err());
        assert!(parse("let {} = x").is_err());
    }

    #[test]
    fn test_invalid_assignment_target() {
        assert!(matches!(
            parse("1 = 2"),
            Err(ParserError::InvalidAssignmentTarget(_))
        ));
    }

    #[test]
    fn test_for_statement() {
        let stmt = parse_stmt("for ([1, 2], v, i) { print(v) }");
        match stmt.kind {
            StmtKind::For { value, index, .. } => {
                assert_eq!(value.as_deref(), Some("v"));
                assert_eq!(index.as_deref(), Some("i"));
            }
            _ => panic!("Expected for"),
        }
    }

    #[test]
    fn test_loop_statement() {
        let stmt = parse_stmt("loop (let i = 0, i < 3, i += 1) { }");
        match stmt.kind {
            StmtKind::Loop {
                init,
                condition,
                step,
                ..
            } => {
                assert!(init.is_some());
                assert!(condition.is_some());
                assert!(matches!(
                    step.unwrap().kind,
                    ExprKind::CompoundAssign { .. }
                ));
            }
            _ => panic!("Expected loop"),
        }
    }

    #[test]
    fn test_break_depth() {
        let program = parse("while (true) { break(2); continue }").unwrap();
        match &program.statements[0].kind {
            StmtKind::While { body, .. } => match &body.kind {
                StmtKind::Block(stmts) => {
                    assert_eq!(stmts[0].kind, StmtKind::Break(2));
                    assert_eq!(stmts[1].kind, StmtKind::Continue(1));
                }
                _ => panic!("Expected block"),
            },
            _ => panic!("Expected while"),
        }
    }

    #[test]
    fn test_import_forms() {
        let whole = parse_stmt("import utils from \"./utils.lm\"");
        assert!(matches!(
            whole.kind,
            StmtKind::Import(ImportDecl {
                binding: ImportBinding::Module(_),
                ..
            })
        ));
        let named = parse_stmt("import { a, b } from \"./utils.lm\"");
        match named.kind {
            StmtKind::Import(ImportDecl {
                binding: ImportBinding::Names(names),
                ..
            }) => assert_eq!(names.len(), 2),
            _ => panic!("Expected named import"),
        }
    }

    #[test]
    fn test_template_string() {
        let expr = parse_expr("`sum: ${1 + 2}`");
        match expr.kind {
            ExprKind::Template(segments) => {
                assert_eq!(segments.len(), 2);
                assert!(matches!(&segments[1], TemplateSegment::Expr(_)));
            }
            _ => panic!("Expected template"),
        }
    }

    #[test]
    fn test_newline_ends_call_chain() {
        let program = parse("let a = b\n(c)").unwrap();
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_object_literal_and_member_call() {
        let expr = parse_expr("x = {a: 1, \"b c\": 2, d}.a");
        match expr.kind {
            ExprKind::Assign { value, .. } => {
                assert!(matches!(value.kind, ExprKind::Member { .. }))
            }
            _ => panic!("Expected assignment"),
        }
    }

    #[test]
    fn test_function_literals_take_their_binding_name() {
        let name_of = |expr: &Expr| match &expr.kind {
            ExprKind::Function(func) => func.name.clone(),
            ExprKind::Call { arguments, .. } => match arguments.as_slice() {
                [Argument::Positional(Expr { kind: ExprKind::Function(func), .. })] => func.name.clone(),
                _ => panic!("Expected a single function argument"),
            },
            _ => panic!("Expected a function literal"),
        };

        match parse_stmt("const Point = class((x) => { return {x: x} })").kind {
            StmtKind::Declaration(decl) => {
                assert_eq!(name_of(decl.initializer.as_ref().unwrap()), Some("Point".to_string()))
            }
            other => panic!("Expected declaration, got {:?}", other),
        }
        match parse_expr("Shape = (w) => w").kind {
            ExprKind::Assign { value, .. } => assert_eq!(name_of(&value), Some("Shape".to_string())),
            other => panic!("Expected assignment, got {:?}", other),
        }
        match parse_expr("wrap(class((x) => x))").kind {
            ExprKind::Call { arguments, .. } => match arguments.as_slice() {
                [Argument::Positional(inner)] => assert_eq!(name_of(inner), None),
                _ => panic!("Expected one argument"),
            },
            other => panic!("Expected call, got {:?}", other),
        }
    }
}
