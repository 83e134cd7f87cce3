//! SQL parsing and allow-list logic.
//!
//! Uses sqlparser-rs with the SQLite dialect. Queries are walked recursively
//! so a data-modifying CTE hidden inside a SELECT is still caught.
//!
//! The parser does not know every SQLite construct (`LIMIT 5, 10`, `GLOB`,
//! `INDEXED BY`, ...). Text it cannot parse is classified from its tokens
//! instead, and only passed on when no write statement is found.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};
use sqlparser::dialect::SQLiteDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};

use super::{Admission, Rejection, StatementKind};

/// Parses statements and admits only a single read-only query.
#[derive(Debug)]
pub struct ReadOnlyGuard {
    dialect: SQLiteDialect,
}

impl Default for ReadOnlyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadOnlyGuard {
    /// Creates a new guard.
    pub fn new() -> Self {
        Self {
            dialect: SQLiteDialect {},
        }
    }

    /// Checks a SQL string before it reaches the store.
    ///
    /// Rejects multiple statements and anything classified as a write.
    /// Unparseable text without a write keyword is admitted as
    /// [`Admission::Unparsed`] so the store reports its own error.
    pub fn check(&self, sql: &str) -> Result<Admission, Rejection> {
        match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => match statements.as_slice() {
                [] => Err(Rejection::Empty),
                [statement] => {
                    let kind = classify_statement(statement);
                    if kind.is_read_only() {
                        Ok(Admission::ReadOnly(kind))
                    } else {
                        Err(Rejection::NotReadOnly(kind))
                    }
                }
                many => Err(Rejection::MultipleStatements(many.len())),
            },
            Err(e) => {
                self.check_tokens(sql)?;
                Ok(Admission::Unparsed(e.to_string()))
            }
        }
    }

    /// Lexical check for text the parser rejected.
    fn check_tokens(&self, sql: &str) -> Result<(), Rejection> {
        let Ok(tokens) = Tokenizer::new(&self.dialect, sql).tokenize() else {
            return Ok(());
        };

        let statements: Vec<&[Token]> = tokens
            .split(|t| *t == Token::SemiColon)
            .filter(|stmt| stmt.iter().any(|t| !matches!(t, Token::Whitespace(_))))
            .collect();

        match statements.as_slice() {
            [] => Err(Rejection::Empty),
            [statement] => match leading_kind(statement) {
                Some(kind) if !kind.is_read_only() => Err(Rejection::NotReadOnly(kind)),
                _ => Ok(()),
            },
            many => Err(Rejection::MultipleStatements(many.len())),
        }
    }
}

/// Unquoted words of a token run, uppercased, with their paren depth.
fn words(tokens: &[Token]) -> impl Iterator<Item = (usize, String)> + '_ {
    let mut depth = 0usize;
    tokens.iter().filter_map(move |token| match token {
        Token::LParen => {
            depth += 1;
            None
        }
        Token::RParen => {
            depth = depth.saturating_sub(1);
            None
        }
        Token::Word(word) if word.quote_style.is_none() => {
            Some((depth, word.value.to_ascii_uppercase()))
        }
        _ => None,
    })
}

/// Classifies a statement by its leading keyword.
///
/// `None` when the text does not start with a known keyword; such text is
/// left for the store to reject.
fn leading_kind(tokens: &[Token]) -> Option<StatementKind> {
    let (_, first) = words(tokens).next()?;
    let kind = match first.as_str() {
        "SELECT" | "VALUES" => StatementKind::Select,
        "EXPLAIN" => StatementKind::Explain,
        // The statement after the CTE list is the first top-level DML keyword
        "WITH" => words(tokens)
            .skip(1)
            .filter(|(depth, _)| *depth == 0)
            .find_map(|(_, word)| keyword_kind(&word))
            .unwrap_or(StatementKind::Select),
        other => keyword_kind(other)?,
    };
    Some(kind)
}

fn keyword_kind(word: &str) -> Option<StatementKind> {
    let kind = match word {
        "SELECT" | "VALUES" => StatementKind::Select,
        "INSERT" | "REPLACE" => StatementKind::Insert,
        "UPDATE" => StatementKind::Update,
        "DELETE" => StatementKind::Delete,
        "DROP" => StatementKind::Drop,
        "ALTER" => StatementKind::Alter,
        "CREATE" => StatementKind::Create,
        "PRAGMA" => StatementKind::Pragma,
        "ATTACH" | "DETACH" => StatementKind::Attach,
        "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" => {
            StatementKind::Transaction
        }
        "VACUUM" | "REINDEX" | "ANALYZE" => StatementKind::Maintenance,
        _ => return None,
    };
    Some(kind)
}

/// Classifies a single parsed statement.
fn classify_statement(statement: &Statement) -> StatementKind {
    match statement {
        // Query: may contain data-modifying CTEs, so recurse
        Statement::Query(query) => classify_query(query),
        Statement::Explain { statement, .. } => {
            // EXPLAIN in SQLite only reports the plan or bytecode
            match classify_statement(statement) {
                StatementKind::Other => StatementKind::Other,
                _ => StatementKind::Explain,
            }
        }

        Statement::Insert(_) => StatementKind::Insert,
        Statement::Update { .. } => StatementKind::Update,
        Statement::Delete(_) => StatementKind::Delete,
        Statement::Drop { .. } => StatementKind::Drop,
        Statement::AlterTable { .. } => StatementKind::Alter,
        Statement::CreateTable { .. }
        | Statement::CreateIndex { .. }
        | Statement::CreateView { .. } => StatementKind::Create,
        Statement::Pragma { .. } => StatementKind::Pragma,
        Statement::AttachDatabase { .. } => StatementKind::Attach,
        Statement::StartTransaction { .. }
        | Statement::Commit { .. }
        | Statement::Rollback { .. } => StatementKind::Transaction,

        _ => StatementKind::Other,
    }
}

/// Classifies a Query, returning the first non-read-only kind found.
fn classify_query(query: &Query) -> StatementKind {
    if let Some(with) = &query.with {
        for cte in &with.cte_tables {
            let kind = classify_query(&cte.query);
            if !kind.is_read_only() {
                return kind;
            }
        }
    }

    classify_set_expr(&query.body)
}

/// Classifies a SetExpr, detecting mutations and recursing into nested queries.
fn classify_set_expr(set_expr: &SetExpr) -> StatementKind {
    match set_expr {
        // Direct mutations in CTE bodies (wrapped as Statement)
        SetExpr::Delete(stmt) => classify_statement(stmt),
        SetExpr::Update(stmt) => classify_statement(stmt),
        SetExpr::Insert(stmt) => classify_statement(stmt),
        SetExpr::Merge(stmt) => classify_statement(stmt),

        SetExpr::Query(query) => classify_query(query),
        SetExpr::Select(select) => classify_select(select),

        // UNION, INTERSECT, EXCEPT
        SetExpr::SetOperation { left, right, .. } => {
            let left_kind = classify_set_expr(left);
            if !left_kind.is_read_only() {
                return left_kind;
            }
            classify_set_expr(right)
        }

        SetExpr::Values(_) | SetExpr::Table(_) => StatementKind::Select,
    }
}

/// Classifies a Select by checking its FROM clause for subqueries.
fn classify_select(select: &Select) -> StatementKind {
    select
        .from
        .iter()
        .map(classify_table_with_joins)
        .find(|kind| !kind.is_read_only())
        .unwrap_or(StatementKind::Select)
}

/// Classifies a TableWithJoins, checking the main relation and all joins.
fn classify_table_with_joins(twj: &TableWithJoins) -> StatementKind {
    std::iter::once(&twj.relation)
        .chain(twj.joins.iter().map(|join| &join.relation))
        .map(classify_table_factor)
        .find(|kind| !kind.is_read_only())
        .unwrap_or(StatementKind::Select)
}

/// Classifies a TableFactor, recursing into derived tables (subqueries).
fn classify_table_factor(factor: &TableFactor) -> StatementKind {
    match factor {
        TableFactor::Derived { subquery, .. } => classify_query(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => classify_table_with_joins(table_with_joins),
        _ => StatementKind::Select,
    }
}
