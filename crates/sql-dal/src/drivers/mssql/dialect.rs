//! SQL Server command syntax: bracket quoting, `@Pn` placeholders and
//! `SCOPE_IDENTITY()` for generated keys.

use crate::core::traits::Dialect;

/// T-SQL syntax used by [`MssqlConnection`](super::MssqlConnection).
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> String {
        // `]` inside a name is written twice
        format!("[{}]", name.replace(']', "]]"))
    }

    fn param_placeholder(&self, index: usize) -> String {
        format!("@P{}", index)
    }

    fn default_identity_suffix(&self) -> &'static str {
        "; SELECT SCOPE_IDENTITY()"
    }

    fn supports_multi_statement(&self) -> bool {
        true
    }
}
