//! FILENAME: core/parser/src/tests.rs
//! PURPOSE: Consolidated unit tests for the parser crate.

use crate::ast::{BinaryOperator, Expression, UnaryOperator, Value};
use crate::lexer::Lexer;
use crate::parser::parse;
use crate::token::Token;

fn cell(col: &str, row: u32) -> Expression {
    Expression::CellRef {
        sheet: None,
        col: col.to_string(),
        row,
        col_absolute: false,
        row_absolute: false,
    }
}

fn num(n: f64) -> Expression {
    Expression::Literal(Value::Number(n))
}

// ========================================
// LEXER TESTS
// ========================================

#[test]
fn lexer_tokenizes_simple_math() {
    let mut lexer = Lexer::new("=1 + 2");

    assert_eq!(lexer.next_token(), Token::Equals);
    assert_eq!(lexer.next_token(), Token::Number(1.0));
    assert_eq!(lexer.next_token(), Token::Plus);
    assert_eq!(lexer.next_token(), Token::Number(2.0));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_keeps_dollar_markers_inside_identifiers() {
    let mut lexer = Lexer::new("$B$5+C$6");

    assert_eq!(lexer.next_token(), Token::Identifier("$B$5".to_string()));
    assert_eq!(lexer.next_token(), Token::Plus);
    assert_eq!(lexer.next_token(), Token::Identifier("C$6".to_string()));
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_reads_escaped_quotes_in_strings() {
    let mut lexer = Lexer::new("\"say \"\"hi\"\"\"");
    assert_eq!(lexer.next_token(), Token::String("say \"hi\"".to_string()));
}

#[test]
fn lexer_keeps_unicode_inside_strings() {
    let mut lexer = Lexer::new("A1=\"是\"");
    assert_eq!(lexer.next_token(), Token::Identifier("A1".to_string()));
    assert_eq!(lexer.next_token(), Token::Equals);
    assert_eq!(lexer.next_token(), Token::String("是".to_string()));
}

#[test]
fn lexer_reads_exponent_numbers() {
    let mut lexer = Lexer::new("1.5E3 2e-2");
    assert_eq!(lexer.next_token(), Token::Number(1500.0));
    assert_eq!(lexer.next_token(), Token::Number(0.02));
}

#[test]
fn lexer_tokenizes_comparison_operators() {
    let mut lexer = Lexer::new("< > <= >= <> =");

    assert_eq!(lexer.next_token(), Token::LessThan);
    assert_eq!(lexer.next_token(), Token::GreaterThan);
    assert_eq!(lexer.next_token(), Token::LessEqual);
    assert_eq!(lexer.next_token(), Token::GreaterEqual);
    assert_eq!(lexer.next_token(), Token::NotEqual);
    assert_eq!(lexer.next_token(), Token::Equals);
    assert_eq!(lexer.next_token(), Token::EOF);
}

#[test]
fn lexer_quoted_sheet_name() {
    let mut lexer = Lexer::new("'John''s Sheet'!A1");
    assert_eq!(
        lexer.next_token(),
        Token::QuotedIdentifier("John's Sheet".to_string())
    );
    assert_eq!(lexer.next_token(), Token::Exclamation);
    assert_eq!(lexer.next_token(), Token::Identifier("A1".to_string()));
}

// ========================================
// PARSER TESTS - LITERALS AND OPERATORS
// ========================================

#[test]
fn parser_parses_literals() {
    assert_eq!(parse("=42").unwrap(), num(42.0));
    assert_eq!(
        parse("=\"FF0000\"").unwrap(),
        Expression::Literal(Value::String("FF0000".to_string()))
    );
    assert_eq!(
        parse("TRUE").unwrap(),
        Expression::Literal(Value::Boolean(true))
    );
}

#[test]
fn parser_respects_precedence() {
    // 1 + 2 * 3 => 1 + (2 * 3)
    let expected = Expression::BinaryOp {
        left: Box::new(num(1.0)),
        op: BinaryOperator::Add,
        right: Box::new(Expression::BinaryOp {
            left: Box::new(num(2.0)),
            op: BinaryOperator::Multiply,
            right: Box::new(num(3.0)),
        }),
    };
    assert_eq!(parse("=1+2*3").unwrap(), expected);
}

#[test]
fn parser_comparison_binds_loosest() {
    let result = parse("=A1&\"x\"=\"yx\"").unwrap();
    match result {
        Expression::BinaryOp { op, left, .. } => {
            assert_eq!(op, BinaryOperator::Equal);
            assert!(matches!(
                *left,
                Expression::BinaryOp {
                    op: BinaryOperator::Concat,
                    ..
                }
            ));
        }
        other => panic!("Expected comparison, got {:?}", other),
    }
}

#[test]
fn parser_handles_unary_minus_and_percent() {
    assert_eq!(
        parse("=-5").unwrap(),
        Expression::UnaryOp {
            op: UnaryOperator::Negate,
            operand: Box::new(num(5.0)),
        }
    );
    assert_eq!(
        parse("=50%").unwrap(),
        Expression::UnaryOp {
            op: UnaryOperator::Percent,
            operand: Box::new(num(50.0)),
        }
    );
}

// ========================================
// PARSER TESTS - REFERENCES
// ========================================

#[test]
fn parser_parses_relative_cell_ref() {
    assert_eq!(parse("=c7").unwrap(), cell("C", 7));
}

#[test]
fn parser_parses_absolute_markers() {
    assert_eq!(
        parse("=$B$5").unwrap(),
        Expression::CellRef {
            sheet: None,
            col: "B".to_string(),
            row: 5,
            col_absolute: true,
            row_absolute: true,
        }
    );
    assert_eq!(
        parse("=B$5").unwrap(),
        Expression::CellRef {
            sheet: None,
            col: "B".to_string(),
            row: 5,
            col_absolute: false,
            row_absolute: true,
        }
    );
}

#[test]
fn parser_parses_range() {
    assert_eq!(
        parse("=C5:C9").unwrap(),
        Expression::Range {
            sheet: None,
            start: Box::new(cell("C", 5)),
            end: Box::new(cell("C", 9)),
        }
    );
}

#[test]
fn parser_parses_column_and_row_refs() {
    assert_eq!(
        parse("=A:$C").unwrap(),
        Expression::ColumnRef {
            sheet: None,
            start_col: "A".to_string(),
            end_col: "C".to_string(),
            start_absolute: false,
            end_absolute: true,
        }
    );
    assert_eq!(
        parse("=2:4").unwrap(),
        Expression::RowRef {
            sheet: None,
            start_row: 2,
            end_row: 4,
        }
    );
}

#[test]
fn parser_parses_sheet_qualified_refs() {
    match parse("='Q1 Sales'!B2").unwrap() {
        Expression::CellRef { sheet, col, row, .. } => {
            assert_eq!(sheet, Some("Q1 Sales".to_string()));
            assert_eq!(col, "B");
            assert_eq!(row, 2);
        }
        other => panic!("Expected cell ref, got {:?}", other),
    }

    match parse("=Data!A1:A3").unwrap() {
        Expression::Range { sheet, .. } => assert_eq!(sheet, Some("DATA".to_string())),
        other => panic!("Expected range, got {:?}", other),
    }
}

// ========================================
// PARSER TESTS - FUNCTIONS
// ========================================

#[test]
fn parser_parses_subtotal_call() {
    let expected = Expression::FunctionCall {
        name: "SUBTOTAL".to_string(),
        args: vec![
            num(9.0),
            Expression::Range {
                sheet: None,
                start: Box::new(cell("C", 5)),
                end: Box::new(cell("C", 9)),
            },
        ],
    };
    assert_eq!(parse("=SUBTOTAL(9,C5:C9)").unwrap(), expected);
}

#[test]
fn parser_parses_nested_if() {
    let result = parse("=IF(A1=\"yes\",\"FFFF00\",IF(A2>3,\"FF0000\",\"\"))").unwrap();
    match result {
        Expression::FunctionCall { name, args } => {
            assert_eq!(name, "IF");
            assert_eq!(args.len(), 3);
            assert!(matches!(&args[2], Expression::FunctionCall { name, .. } if name == "IF"));
        }
        other => panic!("Expected IF call, got {:?}", other),
    }
}

#[test]
fn parser_parses_empty_argument_list() {
    assert_eq!(
        parse("=NOW()").unwrap(),
        Expression::FunctionCall {
            name: "NOW".to_string(),
            args: vec![],
        }
    );
}

#[test]
fn calls_function_finds_nested_calls() {
    let expr = parse("=1+ROUND(SUBTOTAL(9,A1:A3),2)").unwrap();
    assert!(expr.calls_function("SUBTOTAL"));
    assert!(!expr.calls_function("SUM"));
}

// ========================================
// PARSER TESTS - ERRORS
// ========================================

#[test]
fn parser_rejects_empty_formula() {
    assert!(parse("=").is_err());
    assert!(parse("").is_err());
}

#[test]
fn parser_rejects_trailing_tokens() {
    assert!(parse("=1 2").is_err());
}

#[test]
fn parser_rejects_unclosed_call() {
    assert!(parse("=SUM(A1,A2").is_err());
}

#[test]
fn parser_rejects_bare_words() {
    let err = parse("=amount*2").unwrap_err();
    assert!(err.message.contains("AMOUNT"));
}

#[test]
fn parser_rejects_row_zero() {
    assert!(parse("=A0").is_err());
}
