//! T-SQL naming and type helpers used when building procedure batches

use sprocket_core::{DbType, Result, SprocketError};

/// Maximum number of parts in a SQL Server object name
/// (server.database.schema.object)
const MAX_NAME_PARTS: usize = 4;

/// SQL Server identifier length limit
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// MS SQL Server dialect helpers
#[derive(Debug, Clone, Copy, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    pub fn new() -> Self {
        Self
    }

    /// Quote an identifier using square brackets.
    ///
    /// Closing brackets are escaped by doubling them.
    ///
    /// # Example
    ///
    /// ```
    /// use sprocket_driver_mssql::MssqlDialect;
    ///
    /// let dialect = MssqlDialect::new();
    /// assert_eq!(dialect.quote_identifier("users"), "[users]");
    /// assert_eq!(dialect.quote_identifier("data]value"), "[data]]value]");
    /// ```
    pub fn quote_identifier(&self, ident: &str) -> String {
        let escaped = ident.replace(']', "]]");
        format!("[{}]", escaped)
    }

    /// Quote a possibly multi-part object name such as `dbo.sp_insert_customer`.
    ///
    /// Parts that are already bracketed are unwrapped first so that
    /// `[dbo].[proc]` and `dbo.proc` produce the same output.
    pub fn quote_object_name(&self, name: &str) -> Result<String> {
        let parts = split_object_name(name)?;
        if parts.len() > MAX_NAME_PARTS {
            return Err(SprocketError::ParameterContract(format!(
                "object name '{}' has more than {} parts",
                name, MAX_NAME_PARTS
            )));
        }
        Ok(parts
            .iter()
            .map(|p| self.quote_identifier(p))
            .collect::<Vec<_>>()
            .join("."))
    }

    /// Whether `name` (with or without a leading `@`) can be spliced into a
    /// batch as a parameter name
    pub fn is_valid_parameter_name(&self, name: &str) -> bool {
        let bare = name.strip_prefix('@').unwrap_or(name);
        !bare.is_empty()
            && bare.len() <= MAX_IDENTIFIER_LENGTH
            && !bare.starts_with(|c: char| c.is_ascii_digit())
            && bare
                .chars()
                .all(|c| c.is_alphanumeric() || matches!(c, '_' | '#' | '$'))
    }

    /// T-SQL type used to declare an output slot of `db_type`
    pub fn type_name(&self, db_type: DbType) -> &'static str {
        match db_type {
            DbType::Boolean => "BIT",
            DbType::TinyInt => "TINYINT",
            DbType::SmallInt => "SMALLINT",
            DbType::Int => "INT",
            DbType::BigInt => "BIGINT",
            DbType::Real => "REAL",
            DbType::Float => "FLOAT",
            DbType::Decimal => "DECIMAL(38, 10)",
            DbType::String => "NVARCHAR(MAX)",
            DbType::Binary => "VARBINARY(MAX)",
            DbType::Guid => "UNIQUEIDENTIFIER",
            DbType::Date => "DATE",
            DbType::Time => "TIME(7)",
            DbType::DateTime => "DATETIME2(7)",
            DbType::DateTimeOffset => "DATETIMEOFFSET(7)",
        }
    }
}

/// Split on dots outside of brackets, unwrapping bracketed parts
fn split_object_name(name: &str) -> Result<Vec<String>> {
    let invalid = || SprocketError::ParameterContract(format!("invalid object name '{}'", name));

    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = name.trim().chars().peekable();
    let mut bracketed = false;

    while let Some(c) = chars.next() {
        match c {
            '[' if !bracketed && current.is_empty() => bracketed = true,
            ']' if bracketed => {
                if chars.peek() == Some(&']') {
                    chars.next();
                    current.push(']');
                } else {
                    bracketed = false;
                }
            }
            '.' if !bracketed => {
                if current.trim().is_empty() {
                    return Err(invalid());
                }
                parts.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }

    if bracketed || current.trim().is_empty() {
        return Err(invalid());
    }
    parts.push(current);
    Ok(parts)
}
