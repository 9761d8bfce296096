use crate::error::Result;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

/// A boolean SQL fragment together with its positional parameters.
///
/// Fragments only ever use anonymous `?` placeholders, so composing them
/// keeps parameters in textual order.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlFilter {
    clause: String,
    params: Vec<Value>,
}

impl SqlFilter {
    pub fn new(clause: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            clause: clause.into(),
            params,
        }
    }

    pub fn raw(clause: impl Into<String>) -> Self {
        Self::new(clause, Vec::new())
    }

    pub fn always() -> Self {
        Self::raw("1 = 1")
    }

    pub fn never() -> Self {
        Self::raw("0 = 1")
    }

    pub fn is_always(&self) -> bool {
        self.clause == "1 = 1"
    }

    pub fn is_never(&self) -> bool {
        self.clause == "0 = 1"
    }

    pub fn clause(&self) -> &str {
        &self.clause
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn and(self, other: SqlFilter) -> SqlFilter {
        if self.is_always() || other.is_never() {
            return other;
        }
        if other.is_always() || self.is_never() {
            return self;
        }
        self.join("AND", other)
    }

    pub fn or(self, other: SqlFilter) -> SqlFilter {
        if self.is_never() || other.is_always() {
            return other;
        }
        if other.is_never() || self.is_always() {
            return self;
        }
        self.join("OR", other)
    }

    pub fn not(self) -> SqlFilter {
        if self.is_always() {
            return SqlFilter::never();
        }
        if self.is_never() {
            return SqlFilter::always();
        }
        SqlFilter::new(format!("NOT ({})", self.clause), self.params)
    }

    /// Conjunction of all filters; empty input is always true.
    pub fn all(filters: impl IntoIterator<Item = SqlFilter>) -> SqlFilter {
        filters.into_iter().fold(SqlFilter::always(), SqlFilter::and)
    }

    /// Disjunction of all filters; empty input is always false.
    pub fn any(filters: impl IntoIterator<Item = SqlFilter>) -> SqlFilter {
        filters.into_iter().fold(SqlFilter::never(), SqlFilter::or)
    }

    /// `column IN (...)`; an empty list never matches.
    pub fn in_list(column: &str, ids: &[i64]) -> SqlFilter {
        if ids.is_empty() {
            return SqlFilter::never();
        }
        let params = ids.iter().map(|id| Value::Integer(*id)).collect();
        SqlFilter::new(format!("{column} IN ({})", crate::db::placeholders(ids.len())), params)
    }

    fn join(mut self, op: &str, other: SqlFilter) -> SqlFilter {
        self.params.extend(other.params);
        SqlFilter {
            clause: format!("({}) {op} ({})", self.clause, other.clause),
            params: self.params,
        }
    }
}

/// Accumulates SQL text and its parameters in lockstep.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    sql: String,
    params: Vec<Value>,
}

impl QueryBuilder {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_filter(&mut self, filter: &SqlFilter) -> &mut Self {
        self.sql.push('(');
        self.sql.push_str(filter.clause());
        self.sql.push(')');
        self.params.extend(filter.params().iter().cloned());
        self
    }

    pub fn bind(&mut self, value: impl Into<Value>) -> &mut Self {
        self.sql.push('?');
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    pub fn query_map<T, F>(&self, conn: &Connection, map: F) -> Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        log::trace!("query: {}", self.sql);
        let mut stmt = conn.prepare(&self.sql)?;
        let rows = stmt.query_map(params_from_iter(self.params.iter()), map)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn execute(&self, conn: &Connection) -> Result<usize> {
        log::trace!("execute: {}", self.sql);
        Ok(conn.execute(&self.sql, params_from_iter(self.params.iter()))?)
    }
}

/// Escapes `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` pattern.
pub fn like_contains(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composition_keeps_params_in_order() {
        let a = SqlFilter::new("a.owner_id = ?", vec![Value::Integer(1)]);
        let b = SqlFilter::new("a.id IN (?, ?)", vec![Value::Integer(7), Value::Integer(8)]);
        let combined = a.or(b);
        assert_eq!(combined.clause(), "(a.owner_id = ?) OR (a.id IN (?, ?))");
        assert_eq!(
            combined.params(),
            &[Value::Integer(1), Value::Integer(7), Value::Integer(8)]
        );
    }

    #[test]
    fn constants_short_circuit() {
        let f = SqlFilter::raw("x = 1");
        assert_eq!(SqlFilter::always().and(f.clone()), f);
        assert!(SqlFilter::never().and(f.clone()).is_never());
        assert!(SqlFilter::always().or(f.clone()).is_always());
        assert!(SqlFilter::any(Vec::new()).is_never());
        assert!(SqlFilter::all(Vec::new()).is_always());
        assert!(SqlFilter::in_list("a.id", &[]).is_never());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_contains("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_contains("cat"), "%cat%");
    }
}
