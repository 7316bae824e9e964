//! Pre-execution safety check for SQL statements
//!
//! Runs on every statement before it reaches the store, compiler output
//! included. Fails closed: any match rejects the statement.

use regex::Regex;

use super::compiler::CompiledQuery;
use super::schema;
use crate::error::{ActionError, UnsafeReason};

/// (name reported to the caller, case-insensitive pattern)
const FORBIDDEN: &[(&str, &str)] = &[
    ("statement separator ';'", r";"),
    ("SQL comment", r"--|/\*|\*/"),
    (
        "OR tautology",
        r#"(?i)\bOR\s+(TRUE\b|NOT\s+FALSE\b|\d+\s*=\s*\d+|'[^']*'\s*=\s*'[^']*'|"[^"]*"\s*=\s*"[^"]*")"#,
    ),
    ("UNION SELECT", r"(?i)\bUNION\s+(ALL\s+)?SELECT\b"),
    ("INSERT", r"(?i)\bINSERT\b"),
    ("UPDATE", r"(?i)\bUPDATE\b"),
    ("DELETE", r"(?i)\bDELETE\b"),
    ("DROP", r"(?i)\bDROP\b"),
];

#[derive(Debug)]
pub struct QueryValidator {
    patterns: Vec<(&'static str, Regex)>,
    select: Regex,
}

impl QueryValidator {
    pub fn new() -> Result<Self, regex::Error> {
        let patterns = FORBIDDEN
            .iter()
            .map(|(name, pattern)| Ok((*name, Regex::new(pattern)?)))
            .collect::<Result<Vec<_>, regex::Error>>()?;

        Ok(Self {
            patterns,
            select: Regex::new(r"(?i)^\s*SELECT\b")?,
        })
    }

    /// Check a compiled query's table and statement text
    pub fn validate(&self, query: &CompiledQuery) -> Result<(), ActionError> {
        if schema::table(&query.table).is_none() {
            return Err(ActionError::UnsafeQuery(UnsafeReason::TableNotWhitelisted(
                query.table.clone(),
            )));
        }
        self.validate_statement(&query.statement)
    }

    /// Scan raw statement text
    pub fn validate_statement(&self, statement: &str) -> Result<(), ActionError> {
        if let Some((name, _)) = self.patterns.iter().find(|(_, re)| re.is_match(statement)) {
            return Err(ActionError::UnsafeQuery(UnsafeReason::ForbiddenPattern(
                name.to_string(),
            )));
        }
        if !self.select.is_match(statement) {
            return Err(ActionError::UnsafeQuery(UnsafeReason::NotSelect));
        }
        Ok(())
    }
}
