use std::collections::HashSet;

/// Passed through unchanged from a `ChangeLog` to every `ChangeSet` it
/// contains. Never inspected by the parser itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QuotingStrategy {
    #[default]
    LegacySql,
    QuoteAllObjects,
    QuoteOnlyReservedWords,
}

/// A single SQL change, whether the forward change or one rollback step.
#[derive(Debug, Clone)]
pub struct Change {
    pub sql: String,
    pub split_statements: bool,
    pub strip_comments: bool,
    pub end_delimiter: Option<String>,
}

impl Default for Change {
    fn default() -> Self {
        Self {
            sql: String::new(),
            split_statements: true,
            strip_comments: true,
            end_delimiter: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SqlCheckPrecondition {
    pub expected_result: String,
    pub sql: String,
}

#[derive(Debug, Clone)]
pub enum Precondition {
    SqlCheck(SqlCheckPrecondition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OnFailAction {
    Halt,
    Continue,
    MarkRan,
    Warn,
    Other(String),
}

impl OnFailAction {
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "HALT" => Self::Halt,
            "CONTINUE" => Self::Continue,
            "MARK_RAN" => Self::MarkRan,
            "WARN" => Self::Warn,
            other => Self::Other(other.to_string()),
        }
    }
}

impl Default for OnFailAction {
    fn default() -> Self {
        Self::Halt
    }
}

#[derive(Debug, Clone, Default)]
pub struct PreconditionContainer {
    pub on_fail: OnFailAction,
    pub on_error: OnFailAction,
    pub on_sql_output: Option<String>,
    pub on_update_sql: Option<String>,
    pub preconditions: Vec<Precondition>,
}

#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub id: String,
    pub author: String,
    pub logical_path: String,
    pub contexts: Option<String>,
    pub labels: Option<String>,
    pub dbms: Option<String>,
    pub run_with: Option<String>,
    pub run_with_spool_file: Option<String>,
    pub run_always: bool,
    pub run_on_change: bool,
    pub run_in_transaction: bool,
    pub fail_on_error: bool,
    pub ignore: bool,
    pub comments: Option<String>,
    pub valid_checksums: HashSet<String>,
    pub preconditions: Option<PreconditionContainer>,
    pub change: Change,
    pub rollback: Vec<Change>,
    pub quoting_strategy: QuotingStrategy,
}

/// A parsed changelog. Generic over the lifetime of an optional parent
/// changelog so the rollback resolver can walk a parent chain without
/// every `ChangeSet` carrying a back-pointer to its owner.
#[derive(Debug)]
pub struct ChangeLog<'p> {
    pub physical_path: String,
    pub logical_path: Option<String>,
    pub change_sets: Vec<ChangeSet>,
    pub parent: Option<&'p ChangeLog<'p>>,
    pub quoting_strategy: QuotingStrategy,
}

impl<'p> ChangeLog<'p> {
    pub fn new(physical_path: impl Into<String>, parent: Option<&'p ChangeLog<'p>>) -> Self {
        Self {
            physical_path: physical_path.into(),
            logical_path: None,
            change_sets: Vec::new(),
            parent,
            quoting_strategy: QuotingStrategy::default(),
        }
    }

    /// The logical path to resolve against: this changelog's own, else its
    /// physical path.
    pub fn effective_logical_path(&self) -> &str {
        self.logical_path.as_deref().unwrap_or(&self.physical_path)
    }

    pub fn find_change_set(&self, author: &str, id: &str) -> Option<&ChangeSet> {
        self.change_sets
            .iter()
            .find(|cs| cs.author == author && cs.id == id)
    }
}
