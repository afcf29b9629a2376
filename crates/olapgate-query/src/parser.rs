//! Legacy query parser using chumsky.
//!
//! ```text
//! SELECT attrs FROM [db.]table
//!     [WHERE cond (AND cond)*]
//!     [GROUP BY ident (, ident)*]
//!     [ORDER BY ident [ASC|DESC] (, ...)*]
//!     [LIMIT n] [;]
//! ```
//!
//! Keywords are case-insensitive and reserved: they cannot be used as
//! attribute or table names.

use chumsky::extra;
use chumsky::prelude::*;
use olapgate_core::{ParseError, Position, QueryParser};

use crate::ast::{
    CompareOp, Condition, LegacyQuery, Literal, OrderBy, Projection, SortDirection, TableRef,
};

/// Extra type for parsers - uses Rich errors for better messages
pub type Extra<'src> = extra::Err<Rich<'src, char>>;

const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "GROUP", "ORDER", "BY", "LIMIT", "ASC", "DESC",
];

/// Parser for the legacy query language.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyParser;

impl QueryParser for LegacyParser {
    type Query = LegacyQuery;

    fn name(&self) -> &'static str {
        "legacy"
    }

    fn parse(&self, body: &[u8]) -> Result<LegacyQuery, ParseError> {
        let text =
            std::str::from_utf8(body).map_err(|e| ParseError::InvalidEncoding(e.to_string()))?;
        parse_query(text)
    }
}

/// Parse query text.
pub fn parse_query(input: &str) -> Result<LegacyQuery, ParseError> {
    if input.trim().is_empty() {
        return Err(ParseError::Empty);
    }

    query_parser()
        .parse(input)
        .into_result()
        .map_err(|errs| syntax_error(&errs, input))
}

// ============================================================================
// Primitive parsers
// ============================================================================

/// A run of word characters: alphanumeric + underscore
fn word<'src>() -> impl Parser<'src, &'src str, &'src str, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_alphanumeric() || *c == '_')
        .repeated()
        .at_least(1)
        .to_slice()
}

/// Identifier: a word that does not start with a digit and is not a keyword
fn ident<'src>() -> impl Parser<'src, &'src str, String, Extra<'src>> + Clone {
    word()
        .try_map(|s: &str, span| {
            if s.starts_with(|c: char| c.is_ascii_digit()) {
                Err(Rich::custom(
                    span,
                    format!("identifier '{}' cannot start with a digit", s),
                ))
            } else if RESERVED.iter().any(|k| k.eq_ignore_ascii_case(s)) {
                Err(Rich::custom(span, format!("unexpected keyword '{}'", s)))
            } else {
                Ok(s.to_string())
            }
        })
        .labelled("identifier")
}

/// Case-insensitive keyword matcher
fn kw<'src>(keyword: &'static str) -> impl Parser<'src, &'src str, (), Extra<'src>> + Clone {
    word()
        .try_map(move |s: &str, span| {
            if s.eq_ignore_ascii_case(keyword) {
                Ok(())
            } else {
                Err(Rich::custom(
                    span,
                    format!("expected keyword '{}'", keyword),
                ))
            }
        })
        .padded()
}

fn unsigned<'src>() -> impl Parser<'src, &'src str, u64, Extra<'src>> + Clone {
    any()
        .filter(|c: &char| c.is_ascii_digit())
        .repeated()
        .at_least(1)
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<u64>()
                .map_err(|_| Rich::custom(span, "integer overflow"))
        })
        .labelled("non-negative integer")
}

fn literal<'src>() -> impl Parser<'src, &'src str, Literal, Extra<'src>> + Clone {
    let int = just('-')
        .or_not()
        .then(
            any()
                .filter(|c: &char| c.is_ascii_digit())
                .repeated()
                .at_least(1),
        )
        .to_slice()
        .try_map(|s: &str, span| {
            s.parse::<i64>()
                .map(Literal::Int)
                .map_err(|_| Rich::custom(span, "integer overflow"))
        });

    let single_quoted = just('\'')
        .ignore_then(none_of("'").repeated().to_slice())
        .then_ignore(just('\''));
    let double_quoted = just('"')
        .ignore_then(none_of("\"").repeated().to_slice())
        .then_ignore(just('"'));
    let string = single_quoted
        .or(double_quoted)
        .map(|s: &str| Literal::Str(s.to_string()));

    choice((int, string)).labelled("literal")
}

// ============================================================================
// Clauses
// ============================================================================

fn projection<'src>() -> impl Parser<'src, &'src str, Projection, Extra<'src>> {
    let all = just('*').padded().to(Projection::All);
    let attributes = ident()
        .padded()
        .separated_by(just(',').padded())
        .at_least(1)
        .collect::<Vec<_>>()
        .map(Projection::Attributes);

    all.or(attributes).labelled("attribute list or *")
}

fn table_ref<'src>() -> impl Parser<'src, &'src str, TableRef, Extra<'src>> {
    ident()
        .then(just('.').ignore_then(ident()).or_not())
        .map(|(first, second)| match second {
            Some(table) => TableRef {
                database: Some(first),
                table,
            },
            None => TableRef {
                database: None,
                table: first,
            },
        })
        .padded()
        .labelled("table name")
}

fn condition<'src>() -> impl Parser<'src, &'src str, Condition, Extra<'src>> {
    // Longer operators first so `<=` is not read as `<`
    let op = choice((
        just("<=").to(CompareOp::Le),
        just(">=").to(CompareOp::Ge),
        just("<>").to(CompareOp::Ne),
        just("!=").to(CompareOp::Ne),
        just("=").to(CompareOp::Eq),
        just("<").to(CompareOp::Lt),
        just(">").to(CompareOp::Gt),
    ))
    .padded()
    .labelled("comparison operator");

    ident()
        .padded()
        .then(op)
        .then(literal().padded())
        .map(|((attribute, op), value)| Condition {
            attribute,
            op,
            value,
        })
        .labelled("condition like visits > 10")
}

fn where_clause<'src>() -> impl Parser<'src, &'src str, Vec<Condition>, Extra<'src>> {
    kw("WHERE").ignore_then(
        condition()
            .separated_by(kw("AND"))
            .at_least(1)
            .collect::<Vec<_>>(),
    )
}

fn group_by_clause<'src>() -> impl Parser<'src, &'src str, Vec<String>, Extra<'src>> {
    kw("GROUP").then(kw("BY")).ignore_then(
        ident()
            .padded()
            .separated_by(just(',').padded())
            .at_least(1)
            .collect::<Vec<_>>(),
    )
}

fn order_by_clause<'src>() -> impl Parser<'src, &'src str, Vec<OrderBy>, Extra<'src>> {
    let direction = choice((
        kw("ASC").to(SortDirection::Asc),
        kw("DESC").to(SortDirection::Desc),
    ))
    .or_not()
    .map(Option::unwrap_or_default);

    let item = ident()
        .padded()
        .then(direction)
        .map(|(attribute, direction)| OrderBy {
            attribute,
            direction,
        });

    kw("ORDER").then(kw("BY")).ignore_then(
        item.separated_by(just(',').padded())
            .at_least(1)
            .collect::<Vec<_>>(),
    )
}

fn limit_clause<'src>() -> impl Parser<'src, &'src str, u64, Extra<'src>> {
    kw("LIMIT").ignore_then(unsigned().padded())
}

fn query_parser<'src>() -> impl Parser<'src, &'src str, LegacyQuery, Extra<'src>> {
    kw("SELECT")
        .ignore_then(projection())
        .then_ignore(kw("FROM"))
        .then(table_ref())
        .then(where_clause().or_not())
        .then(group_by_clause().or_not())
        .then(order_by_clause().or_not())
        .then(limit_clause().or_not())
        .then_ignore(just(';').padded().or_not())
        .then_ignore(end())
        .map(
            |(((((projection, table), conditions), group_by), order_by), limit)| LegacyQuery {
                projection,
                table,
                conditions: conditions.unwrap_or_default(),
                group_by: group_by.unwrap_or_default(),
                order_by: order_by.unwrap_or_default(),
                limit,
            },
        )
}

// ============================================================================
// Error formatting
// ============================================================================

fn position_of(input: &str, offset: usize) -> Position {
    let before = input.get(..offset).unwrap_or(input);
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    Position {
        line: before.matches('\n').count() + 1,
        column: before[line_start..].chars().count() + 1,
    }
}

fn syntax_error(errs: &[Rich<'_, char>], input: &str) -> ParseError {
    let message = errs
        .iter()
        .map(|e| {
            let position = position_of(input, e.span().start);
            let found = e
                .found()
                .map_or("end of input".to_string(), |c| format!("'{}'", c));
            format!("{}: {} (found {})", position, e.reason(), found)
        })
        .collect::<Vec<_>>()
        .join("\n");

    ParseError::Syntax {
        message,
        position: errs.first().map(|e| position_of(input, e.span().start)),
    }
}
