//! MySQL and MariaDB command syntax: backtick identifiers, positional `?`
//! placeholders and `LAST_INSERT_ID()` for generated keys.

use crate::core::traits::Dialect;

/// Syntax used by [`MysqlConnection`](super::MysqlConnection).
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // Embedded backticks are doubled
        format!("`{}`", name.replace('`', "``"))
    }

    fn param_placeholder(&self, _index: usize) -> String {
        "?".to_string()
    }

    fn numbered_placeholders(&self) -> bool {
        false
    }

    fn default_identity_suffix(&self) -> &'static str {
        "; SELECT LAST_INSERT_ID()"
    }

    fn supports_multi_statement(&self) -> bool {
        false
    }
}
