//! PostgreSQL command syntax: double-quoted identifiers and `$n` placeholders.

use crate::core::traits::Dialect;

/// Syntax used by [`PostgresConnection`](super::PostgresConnection).
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Embedded quotes are doubled
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("${}", index)
    }

    /// Inserts fetch their key with `RETURNING`, written by the caller.
    fn default_identity_suffix(&self) -> &'static str {
        ""
    }

    fn supports_multi_statement(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.quote_ident("employees"), "\"employees\"");
        assert_eq!(dialect.quote_ident("a\"b"), "\"a\"\"b\"");
    }

    #[test]
    fn test_param_placeholder() {
        let dialect = PostgresDialect::new();
        assert_eq!(dialect.param_placeholder(1), "$1");
        assert_eq!(dialect.param_placeholder(3), "$3");
        assert!(dialect.default_identity_suffix().is_empty());
    }
}
