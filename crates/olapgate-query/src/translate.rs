//! Legacy query to SQL translation.
//!
//! Renders a [`LegacyQuery`] as:
//!
//! ```text
//! SELECT <exprs> FROM <db>.<table> [WHERE ...] [GROUP BY ...] [ORDER BY ...] [LIMIT n] FORMAT <fmt>
//! ```
//!
//! Legacy attributes are looked up in an [`AttributeCatalog`]. Unknown
//! attributes pass through as column names; catalogued ones are replaced by
//! their expression and aliased back to the legacy name.

use once_cell::sync::Lazy;
use olapgate_core::{ExecutionContext, QueryTranslator, TranslationError};
use regex::Regex;
use std::collections::HashMap;

use crate::ast::{LegacyQuery, Literal, Projection};

static PLAIN_IDENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid identifier regex"));

/// Target expression for a legacy attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Attribute {
    expression: String,
    /// Function call expressions (`count()`, `sum(x)`) are aggregates.
    aggregate: bool,
}

/// Legacy attribute name to target expression mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeCatalog {
    attributes: HashMap<String, Attribute>,
}

impl AttributeCatalog {
    /// Catalog without any mapping: every attribute is a plain column.
    pub fn empty() -> Self {
        Self {
            attributes: HashMap::new(),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, expression: impl Into<String>) {
        let expression = expression.into();
        let aggregate = expression.trim_end().ends_with(')');
        self.attributes.insert(
            name.into(),
            Attribute {
                expression,
                aggregate,
            },
        );
    }

    pub fn with(mut self, name: impl Into<String>, expression: impl Into<String>) -> Self {
        self.insert(name, expression);
        self
    }

    pub fn expression(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(|a| a.expression.as_str())
    }

    pub fn is_aggregate(&self, name: &str) -> bool {
        self.attributes.get(name).is_some_and(|a| a.aggregate)
    }

    /// Column expression for `name`, without alias.
    fn column(&self, name: &str) -> String {
        self.expression(name)
            .map(str::to_string)
            .unwrap_or_else(|| quote_ident(name))
    }
}

impl Default for AttributeCatalog {
    /// The built-in attributes.
    fn default() -> Self {
        Self::empty().with("cnt", "count()")
    }
}

/// Renders legacy queries as SQL.
#[derive(Debug, Clone, Default)]
pub struct SqlTranslator {
    catalog: AttributeCatalog,
}

impl SqlTranslator {
    pub fn new(catalog: AttributeCatalog) -> Self {
        Self { catalog }
    }

    fn select_list(&self, projection: &Projection) -> String {
        match projection {
            Projection::All => "*".to_string(),
            Projection::Attributes(attributes) => attributes
                .iter()
                .map(|name| match self.catalog.expression(name) {
                    Some(expression) => format!("{} AS {}", expression, quote_ident(name)),
                    None => quote_ident(name),
                })
                .collect::<Vec<_>>()
                .join(", "),
        }
    }

    fn where_clause(&self, query: &LegacyQuery) -> Result<Option<String>, TranslationError> {
        if query.conditions.is_empty() {
            return Ok(None);
        }

        let mut parts = Vec::with_capacity(query.conditions.len());
        for condition in &query.conditions {
            if self.catalog.is_aggregate(&condition.attribute) {
                return Err(TranslationError::Unsupported(format!(
                    "aggregate attribute '{}' in WHERE",
                    condition.attribute
                )));
            }
            parts.push(format!(
                "{} {} {}",
                self.catalog.column(&condition.attribute),
                condition.op.as_sql(),
                render_literal(&condition.value)
            ));
        }
        Ok(Some(parts.join(" AND ")))
    }

    fn group_by_clause(&self, query: &LegacyQuery) -> Result<Option<String>, TranslationError> {
        if query.group_by.is_empty() {
            return Ok(None);
        }
        if query.projection == Projection::All {
            return Err(TranslationError::Unsupported(
                "SELECT * combined with GROUP BY".to_string(),
            ));
        }

        let mut keys = Vec::with_capacity(query.group_by.len());
        for name in &query.group_by {
            if self.catalog.is_aggregate(name) {
                return Err(TranslationError::Unsupported(format!(
                    "aggregate attribute '{}' in GROUP BY",
                    name
                )));
            }
            keys.push(self.catalog.column(name));
        }
        Ok(Some(keys.join(", ")))
    }

    fn order_by_clause(&self, query: &LegacyQuery) -> Result<Option<String>, TranslationError> {
        if query.order_by.is_empty() {
            return Ok(None);
        }

        let aggregating = !query.group_by.is_empty()
            || matches!(&query.projection, Projection::Attributes(attrs)
                if attrs.iter().any(|a| self.catalog.is_aggregate(a)));

        let mut items = Vec::with_capacity(query.order_by.len());
        for item in &query.order_by {
            let selected = query.projection.contains(&item.attribute);
            if aggregating && !selected && !query.group_by.contains(&item.attribute) {
                return Err(TranslationError::UnknownIdentifier(format!(
                    "'{}' in ORDER BY is neither selected nor grouped",
                    item.attribute
                )));
            }
            let key = if selected {
                quote_ident(&item.attribute)
            } else {
                self.catalog.column(&item.attribute)
            };
            items.push(format!("{} {}", key, item.direction.as_sql()));
        }
        Ok(Some(items.join(", ")))
    }

    fn effective_limit(
        &self,
        query: &LegacyQuery,
        ctx: &ExecutionContext,
    ) -> Result<Option<u64>, TranslationError> {
        let max = ctx.settings().max_result_rows;
        match query.limit {
            _ if max == 0 => Ok(query.limit),
            Some(limit) if limit > max => Err(TranslationError::LimitExceeded(format!(
                "LIMIT {} is above max_result_rows = {}",
                limit, max
            ))),
            Some(limit) => Ok(Some(limit)),
            None => Ok(Some(max)),
        }
    }
}

impl QueryTranslator<LegacyQuery> for SqlTranslator {
    fn name(&self) -> &'static str {
        "sql"
    }

    fn translate(
        &self,
        query: &LegacyQuery,
        ctx: &ExecutionContext,
    ) -> Result<String, TranslationError> {
        let settings = ctx.settings();
        let database = query
            .table
            .database
            .as_deref()
            .unwrap_or(&settings.database);

        let mut sql = format!(
            "SELECT {} FROM {}.{}",
            self.select_list(&query.projection),
            quote_ident(database),
            quote_ident(&query.table.table)
        );

        if let Some(conditions) = self.where_clause(query)? {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions);
        }
        if let Some(keys) = self.group_by_clause(query)? {
            sql.push_str(" GROUP BY ");
            sql.push_str(&keys);
        }
        if let Some(items) = self.order_by_clause(query)? {
            sql.push_str(" ORDER BY ");
            sql.push_str(&items);
        }
        if let Some(limit) = self.effective_limit(query, ctx)? {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        sql.push_str(" FORMAT ");
        sql.push_str(&settings.output_format);

        Ok(sql)
    }
}

/// Backtick-quote identifiers that are not plain words.
fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT_RE.is_match(name) {
        name.to_string()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

fn render_literal(literal: &Literal) -> String {
    match literal {
        Literal::Int(value) => value.to_string(),
        Literal::Str(value) => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_query;
    use olapgate_core::{GlobalContext, Identity};
    use std::net::{IpAddr, Ipv4Addr};
    use test_case::test_case;

    fn ctx() -> ExecutionContext {
        ExecutionContext::derive(
            &GlobalContext::default(),
            Identity::default(),
            IpAddr::V4(Ipv4Addr::LOCALHOST),
        )
        .unwrap()
    }

    fn translate(input: &str) -> Result<String, TranslationError> {
        SqlTranslator::default().translate(&parse_query(input).unwrap(), &ctx())
    }

    #[test]
    fn test_count_attribute() {
        assert_eq!(
            translate("SELECT cnt FROM table1").unwrap(),
            "SELECT count() AS cnt FROM default.table1 FORMAT TabSeparated"
        );
    }

    #[test]
    fn test_full_translation() {
        let sql = translate(
            "SELECT region, cnt FROM stats.hits WHERE region != 'eu' AND visits > 10 \
             GROUP BY region ORDER BY cnt DESC LIMIT 5",
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT region, count() AS cnt FROM stats.hits \
             WHERE region != 'eu' AND visits > 10 \
             GROUP BY region ORDER BY cnt DESC LIMIT 5 FORMAT TabSeparated"
        );
    }

    #[test]
    fn test_string_literal_is_escaped() {
        let sql = translate(r"SELECT a FROM t WHERE a = 'x\'").unwrap();
        assert!(sql.contains(r"WHERE a = 'x\\'"), "{}", sql);

        let sql = translate(r#"SELECT a FROM t WHERE a = "it's""#).unwrap();
        assert!(sql.contains(r"WHERE a = 'it\'s'"), "{}", sql);
    }

    #[test]
    fn test_context_database_and_format() {
        let mut ctx = ctx();
        ctx.settings_mut().database = "my-db".into();
        ctx.settings_mut().output_format = "JSONEachRow".into();
        let sql = SqlTranslator::default()
            .translate(&parse_query("SELECT a FROM t").unwrap(), &ctx)
            .unwrap();
        assert_eq!(sql, "SELECT a FROM `my-db`.t FORMAT JSONEachRow");
    }

    #[test]
    fn test_custom_catalog() {
        let translator =
            SqlTranslator::new(AttributeCatalog::default().with("users", "uniq(UserID)"));
        let sql = translator
            .translate(&parse_query("SELECT users FROM t").unwrap(), &ctx())
            .unwrap();
        assert_eq!(sql, "SELECT uniq(UserID) AS users FROM default.t FORMAT TabSeparated");
    }

    #[test_case("SELECT * FROM t GROUP BY a" ; "star with group by")]
    #[test_case("SELECT a FROM t WHERE cnt > 1" ; "aggregate in where")]
    #[test_case("SELECT a, cnt FROM t GROUP BY cnt" ; "aggregate in group by")]
    fn test_unsupported(input: &str) {
        assert!(matches!(translate(input), Err(TranslationError::Unsupported(_))));
    }

    #[test]
    fn test_order_by_unselected_in_grouped_query() {
        let err = translate("SELECT region, cnt FROM t GROUP BY region ORDER BY visits").unwrap_err();
        assert!(matches!(err, TranslationError::UnknownIdentifier(_)));
    }

    #[test]
    fn test_order_by_unselected_in_plain_query() {
        let sql = translate("SELECT a FROM t ORDER BY b DESC").unwrap();
        assert_eq!(sql, "SELECT a FROM default.t ORDER BY b DESC FORMAT TabSeparated");
    }

    #[test]
    fn test_max_result_rows() {
        let mut ctx = ctx();
        ctx.settings_mut().max_result_rows = 100;
        let translator = SqlTranslator::default();

        let sql = translator
            .translate(&parse_query("SELECT a FROM t").unwrap(), &ctx)
            .unwrap();
        assert!(sql.ends_with("LIMIT 100 FORMAT TabSeparated"));

        let sql = translator
            .translate(&parse_query("SELECT a FROM t LIMIT 7").unwrap(), &ctx)
            .unwrap();
        assert!(sql.ends_with("LIMIT 7 FORMAT TabSeparated"));

        let err = translator
            .translate(&parse_query("SELECT a FROM t LIMIT 101").unwrap(), &ctx)
            .unwrap_err();
        assert!(matches!(err, TranslationError::LimitExceeded(_)));
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("hits_v2"), "hits_v2");
        assert_eq!(quote_ident("my-db"), "`my-db`");
        assert_eq!(quote_ident("a`b"), "`a\\`b`");
    }
}
