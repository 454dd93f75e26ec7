use crate::formatted::error::ChangeLogParseError;
use crate::formatted::model::{Change, PreconditionContainer};

/// Priority bump applied over the base priority of an unformatted parser
/// for the same file, so a caller's parser-selection factory prefers the
/// formatted-changelog reading whenever it declares support.
pub const PRIORITY_BUMP: i32 = 5;

/// Per-host-language directive syntax. Only `SqlDialect` is implemented;
/// the trait is the seam a future non-SQL formatted changelog (e.g. a
/// scripted NoSQL migration language) would plug into.
pub trait Dialect: Send + Sync {
    /// Name used in error messages, e.g. "SQL".
    fn label(&self) -> &str;

    /// File extensions (without the leading dot) this dialect claims,
    /// e.g. `["sql"]`.
    fn supported_extensions(&self) -> &[&str];

    /// True if `path`'s extension is one this dialect's directive grammar
    /// applies to.
    fn supports_extension(&self, path: &str) -> bool {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");
        self.supported_extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(ext))
    }

    /// Token that opens a single-line directive comment, e.g. "--".
    fn single_line_comment_token(&self) -> &str;

    /// The "one character short" token that should be rejected with a
    /// formatting error rather than silently accepted, e.g. "-".
    fn alt_single_line_comment_token(&self) -> &str;

    /// Token that opens a multi-line rollback block, e.g. "/*".
    fn start_multiline_comment_token(&self) -> &str;

    /// Token that closes a multi-line rollback block, e.g. "*/".
    fn end_multiline_comment_token(&self) -> &str;

    /// Example changeset directive line shown in formatting-error messages.
    fn example_changeset_directive(&self) -> &str;

    /// Documentation link shown in formatting-error messages.
    fn documentation_link(&self) -> &str;

    /// Build a fresh, empty `Change` with this dialect's defaults.
    fn new_change(&self) -> Change {
        Change::default()
    }

    /// True if `change`'s accumulated sequence looks like it needs the
    /// dialect's end-of-batch delimiter forced on it at EOF.
    fn is_end_delimiter(&self, change: &Change) -> bool {
        let trimmed = change.sql.trim_end();
        trimmed.ends_with("$$") || trimmed.ends_with("$BODY$")
    }

    fn forced_end_delimiter(&self) -> &str {
        "\n/$"
    }

    /// Parse the free-text remainder of a `preconditions` directive line
    /// into the container's on-fail/on-error/output-routing fields.
    fn parse_preconditions_header(
        &self,
        container: &mut PreconditionContainer,
        rest: &str,
        line: usize,
    ) -> Result<(), ChangeLogParseError>;
}

pub struct SqlDialect;

impl SqlDialect {
    pub const PRIORITY: i32 = PRIORITY_BUMP;
}

impl Dialect for SqlDialect {
    fn label(&self) -> &str {
        "SQL"
    }

    fn supported_extensions(&self) -> &[&str] {
        &["sql"]
    }

    fn single_line_comment_token(&self) -> &str {
        "--"
    }

    fn alt_single_line_comment_token(&self) -> &str {
        "-"
    }

    fn start_multiline_comment_token(&self) -> &str {
        "/*"
    }

    fn end_multiline_comment_token(&self) -> &str {
        "*/"
    }

    fn example_changeset_directive(&self) -> &str {
        "--changeset bob:1"
    }

    fn documentation_link(&self) -> &str {
        "https://docs.liquibase.com/concepts/changelogs/sql-format.html"
    }

    fn parse_preconditions_header(
        &self,
        container: &mut PreconditionContainer,
        rest: &str,
        line: usize,
    ) -> Result<(), ChangeLogParseError> {
        use crate::formatted::grammar::extract_attr;

        if let Some(v) = extract_attr(rest, "onFail") {
            container.on_fail = super::model::OnFailAction::parse(&v);
        }
        if let Some(v) = extract_attr(rest, "onError") {
            container.on_error = super::model::OnFailAction::parse(&v);
        }
        let on_sql_output = extract_attr(rest, "onSqlOutput");
        let on_update_sql = extract_attr(rest, "onUpdateSql");
        if on_sql_output.is_some() && on_update_sql.is_some() {
            return Err(ChangeLogParseError::semantic(
                line,
                "preconditions directive cannot set both onSqlOutput and onUpdateSql",
            ));
        }
        container.on_sql_output = on_sql_output;
        container.on_update_sql = on_update_sql;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatted::model::PreconditionContainer;

    #[test]
    fn supports_extension_is_case_insensitive() {
        assert!(SqlDialect.supports_extension("db/changelog.SQL"));
        assert!(SqlDialect.supports_extension("changelog.sql"));
        assert!(!SqlDialect.supports_extension("changelog.xml"));
    }

    #[test]
    fn preconditions_header_rejects_both_output_routes() {
        let mut container = PreconditionContainer::default();
        let err = SqlDialect
            .parse_preconditions_header(&mut container, "onSqlOutput:IGNORE onUpdateSql:FAIL", 1)
            .unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Semantic { .. }));
    }

    #[test]
    fn preconditions_header_parses_on_fail_and_on_error() {
        let mut container = PreconditionContainer::default();
        SqlDialect
            .parse_preconditions_header(&mut container, "onFail:MARK_RAN onError:WARN", 1)
            .unwrap();
        assert_eq!(container.on_fail, super::super::model::OnFailAction::MarkRan);
        assert_eq!(container.on_error, super::super::model::OnFailAction::Warn);
    }
}
