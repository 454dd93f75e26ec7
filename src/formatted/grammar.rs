use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};

use crate::formatted::dialect::Dialect;
use crate::formatted::error::ChangeLogParseError;

lazy_static! {
    static ref IGNORE_LINES_VALUE_RE: Regex = Regex::new(r"^(?i:start|end|\d+)$").unwrap();
    static ref SQL_CHECK_DOUBLE_RE: Regex =
        RegexBuilder::new(r#"^(?:expectedResult:)?"([^"]*)"\s+(.*)$"#)
            .build()
            .unwrap();
    static ref SQL_CHECK_SINGLE_RE: Regex =
        RegexBuilder::new(r"^(?:expectedResult:)?'([^']*)'\s+(.*)$")
            .build()
            .unwrap();
    static ref SQL_CHECK_BARE_RE: Regex =
        RegexBuilder::new(r"^(?:expectedResult:)?(\S+)\s+(.*)$")
            .build()
            .unwrap();
}

/// Kind of `ignoreLines` directive, before the parser decides how it
/// applies to the current state.
#[derive(Debug, Clone)]
pub enum IgnoreLinesKind {
    Count(usize),
    Start,
    End,
}

/// Attributes parsed off a `changeset` directive's trailing text.
#[derive(Debug, Clone, Default)]
pub struct ChangeSetAttrs {
    pub logical_file_path: Option<String>,
    pub context: Option<String>,
    pub context_filter: Option<String>,
    pub labels: Option<String>,
    pub dbms: Option<String>,
    pub run_with: Option<String>,
    pub run_with_spool_file: Option<String>,
    pub run_always: bool,
    pub run_on_change: bool,
    pub run_in_transaction: bool,
    pub fail_on_error: bool,
    pub ignore: bool,
    pub split_statements: Option<bool>,
    pub strip_comments: Option<bool>,
    pub end_delimiter: Option<String>,
    pub rollback_split_statements: Option<bool>,
    pub rollback_end_delimiter: Option<String>,
}

/// One classified line. Context-sensitivity (is this directive legal
/// here?) is applied by the parser state machine, not by classification.
#[derive(Debug, Clone)]
pub enum Directive {
    Header { logical_path: Option<String> },
    Property { fields: HashMap<String, String> },
    ChangeSet { author: String, id: String, attrs: ChangeSetAttrs },
    Rollback { text: String },
    RollbackMultiLineStart,
    Preconditions { rest: String },
    Precondition { name: String, body: String },
    Comment { text: String },
    ValidCheckSum { hash: String },
    IgnoreLines(IgnoreLinesKind),
    Body,
}

/// Regexes built once per dialect (its comment tokens are fixed for the
/// whole parse), plus the directive-priority dispatch order from the
/// grammar table: property, header, ignoreLines, changeset, rollback,
/// preconditions/precondition-*, comment, validCheckSum, then body.
pub struct DirectiveSet {
    header_re: Regex,
    property_re: Regex,
    changeset_re: Regex,
    rollback_re: Regex,
    rollback_ml_start_re: Regex,
    preconditions_re: Regex,
    precondition_re: Regex,
    comment_re: Regex,
    valid_checksum_re: Regex,
    ignore_lines_re: Regex,
    alt_header_re: Regex,
    alt_changeset_re: Regex,
}

impl DirectiveSet {
    pub fn new(dialect: &dyn Dialect) -> Self {
        let c = regex::escape(dialect.single_line_comment_token());
        let alt_c = regex::escape(dialect.alt_single_line_comment_token());
        let mls = regex::escape(dialect.start_multiline_comment_token());

        let build = |pat: &str| {
            RegexBuilder::new(pat)
                .case_insensitive(true)
                .build()
                .unwrap_or_else(|e| panic!("invalid directive regex {pat:?}: {e}"))
        };

        DirectiveSet {
            header_re: build(&format!(
                r"^\s*{c}\s*liquibase\s+formatted\s+(?P<dialect>\S+)(?:\s+logicalFilePath:(?P<logical>\S+))?\s*$"
            )),
            property_re: build(&format!(r"^\s*{c}\s*property\s+(?P<rest>.*)$")),
            changeset_re: build(&format!(
                r"^\s*{c}\s*changeset\s+(?P<author>[^\s:]+)\s*:\s*(?P<id>\S+)(?:\s+(?P<rest>.*))?$"
            )),
            rollback_re: build(&format!(r"^\s*{c}\s*rollback\s+(?P<text>.*)$")),
            rollback_ml_start_re: build(&format!(r"^\s*{mls}\s*liquibase\s+rollback\s*$")),
            preconditions_re: build(&format!(r"^\s*{c}\s*preconditions\s+(?P<rest>.*)$")),
            precondition_re: build(&format!(
                r"^\s*{c}\s*precondition-(?P<name>[\w-]+)\s+(?P<body>.*)$"
            )),
            comment_re: build(&format!(r"^\s*{c}\s*comment:\s*(?P<text>.*)$")),
            valid_checksum_re: build(&format!(r"^\s*{c}\s*validCheckSum:\s*(?P<hash>.*)$")),
            ignore_lines_re: build(&format!(r"^\s*{c}\s*ignoreLines:(?P<val>\S+)\s*$")),
            alt_header_re: build(&format!(r"^\s*{alt_c}\s*liquibase\s+formatted\s+\S+")),
            alt_changeset_re: build(&format!(r"^\s*{alt_c}\s*changeset\s+\S+")),
        }
    }

    /// Classify a raw line. `is_first_non_blank` gates header recognition,
    /// which only ever applies to the very first non-blank line of the
    /// stream.
    pub fn classify(
        &self,
        raw: &str,
        line: usize,
        is_first_non_blank: bool,
        dialect: &dyn Dialect,
    ) -> Result<Directive, ChangeLogParseError> {
        if is_first_non_blank {
            if let Some(caps) = self.header_re.captures(raw) {
                let logical_path = caps.name("logical").map(|m| m.as_str().to_string());
                return Ok(Directive::Header { logical_path });
            }
            if self.alt_header_re.is_match(raw) {
                return Err(unexpected_formatting(line, dialect));
            }
        }

        if let Some(caps) = self.property_re.captures(raw) {
            let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
            let mut fields = HashMap::new();
            for key in ["name", "value", "context", "labels", "dbms", "global"] {
                if let Some(v) = extract_attr(rest, key) {
                    fields.insert(key.to_string(), v);
                }
            }
            return Ok(Directive::Property { fields });
        }

        if let Some(caps) = self.ignore_lines_re.captures(raw) {
            let val = caps.name("val").unwrap().as_str();
            if !IGNORE_LINES_VALUE_RE.is_match(val) {
                return Err(ChangeLogParseError::semantic(
                    line,
                    format!("could not parse ignoreLines value '{val}'"),
                ));
            }
            let kind = match val.to_ascii_lowercase().as_str() {
                "start" => IgnoreLinesKind::Start,
                "end" => IgnoreLinesKind::End,
                n => IgnoreLinesKind::Count(n.parse().unwrap()),
            };
            return Ok(Directive::IgnoreLines(kind));
        }

        if let Some(caps) = self.changeset_re.captures(raw) {
            let author = caps.name("author").unwrap().as_str().to_string();
            let id = caps.name("id").unwrap().as_str().to_string();
            if !self.strict_changeset_matches(raw, &author, &id, dialect) {
                return Err(unexpected_formatting(line, dialect));
            }
            let rest = caps.name("rest").map(|m| m.as_str()).unwrap_or("");
            let attrs = parse_changeset_attrs(rest);
            return Ok(Directive::ChangeSet { author, id, attrs });
        }
        if self.alt_changeset_re.is_match(raw) {
            return Err(unexpected_formatting(line, dialect));
        }

        if self.rollback_ml_start_re.is_match(raw) {
            return Ok(Directive::RollbackMultiLineStart);
        }
        if let Some(caps) = self.rollback_re.captures(raw) {
            return Ok(Directive::Rollback {
                text: caps.name("text").unwrap().as_str().to_string(),
            });
        }

        if let Some(caps) = self.preconditions_re.captures(raw) {
            return Ok(Directive::Preconditions {
                rest: caps.name("rest").unwrap().as_str().to_string(),
            });
        }
        if let Some(caps) = self.precondition_re.captures(raw) {
            return Ok(Directive::Precondition {
                name: caps.name("name").unwrap().as_str().to_string(),
                body: caps.name("body").unwrap().as_str().to_string(),
            });
        }

        if let Some(caps) = self.comment_re.captures(raw) {
            return Ok(Directive::Comment {
                text: caps.name("text").unwrap().as_str().to_string(),
            });
        }
        if let Some(caps) = self.valid_checksum_re.captures(raw) {
            return Ok(Directive::ValidCheckSum {
                hash: caps.name("hash").unwrap().as_str().to_string(),
            });
        }

        Ok(Directive::Body)
    }

    pub fn is_ignore_lines_end(&self, raw: &str) -> bool {
        self.ignore_lines_re
            .captures(raw)
            .map(|c| c.name("val").unwrap().as_str().eq_ignore_ascii_case("end"))
            .unwrap_or(false)
    }

    /// Reject e.g. `--changeset bob :1` / `--changeset bob: 1` where
    /// whitespace sits around the separating colon.
    fn strict_changeset_matches(
        &self,
        raw: &str,
        author: &str,
        id: &str,
        dialect: &dyn Dialect,
    ) -> bool {
        let c = regex::escape(dialect.single_line_comment_token());
        let pat = format!(
            r"^\s*{c}\s*changeset\s+{}:{}(?:\s|$)",
            regex::escape(author),
            regex::escape(id)
        );
        RegexBuilder::new(&pat)
            .case_insensitive(true)
            .build()
            .map(|re| re.is_match(raw))
            .unwrap_or(false)
    }
}

fn unexpected_formatting(line: usize, dialect: &dyn Dialect) -> ChangeLogParseError {
    ChangeLogParseError::UnexpectedFormatting {
        line,
        dialect_label: dialect.label().to_string(),
        example: dialect.example_changeset_directive().to_string(),
        doc_link: dialect.documentation_link().to_string(),
    }
}

fn parse_changeset_attrs(rest: &str) -> ChangeSetAttrs {
    ChangeSetAttrs {
        logical_file_path: extract_attr(rest, "logicalFilePath"),
        context: extract_attr(rest, "context"),
        context_filter: extract_attr(rest, "contextFilter"),
        labels: extract_attr(rest, "labels"),
        dbms: extract_attr(rest, "dbms"),
        run_with: extract_attr(rest, "runWith"),
        run_with_spool_file: extract_attr(rest, "runWithSpoolFile"),
        run_always: extract_bool_attr(rest, "runAlways"),
        run_on_change: extract_bool_attr(rest, "runOnChange"),
        run_in_transaction: extract_attr(rest, "runInTransaction")
            .map(|v| parse_bool(&v))
            .unwrap_or(true),
        fail_on_error: extract_attr(rest, "failOnError")
            .map(|v| parse_bool(&v))
            .unwrap_or(true),
        ignore: extract_bool_attr(rest, "ignore"),
        split_statements: extract_attr(rest, "splitStatements").map(|v| parse_bool(&v)),
        strip_comments: extract_attr(rest, "stripComments").map(|v| parse_bool(&v)),
        end_delimiter: extract_attr(rest, "endDelimiter"),
        rollback_split_statements: extract_attr(rest, "rollbackSplitStatements")
            .map(|v| parse_bool(&v)),
        rollback_end_delimiter: extract_attr(rest, "rollbackEndDelimiter"),
    }
}

fn extract_bool_attr(rest: &str, key: &str) -> bool {
    extract_attr(rest, key).map(|v| parse_bool(&v)).unwrap_or(false)
}

fn parse_bool(v: &str) -> bool {
    v.eq_ignore_ascii_case("true")
}

/// Find `key:value` in free text, where value is either a bare word
/// (stops at whitespace) or a double-quoted string.
pub fn extract_attr(text: &str, key: &str) -> Option<String> {
    let pat = format!(r#"(?i)\b{}:(?:"([^"]*)"|(\S+))"#, regex::escape(key));
    let re = Regex::new(&pat).ok()?;
    let caps = re.captures(text)?;
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str().to_string())
}

/// Parse a `sql-check` precondition body: `<expectedResult> <sql>`, where
/// expectedResult may be bare, single- or double-quoted.
pub fn parse_sql_check_body(body: &str) -> Option<(String, String)> {
    if let Some(caps) = SQL_CHECK_DOUBLE_RE.captures(body) {
        return Some((caps[1].to_string(), caps[2].to_string()));
    }
    if let Some(caps) = SQL_CHECK_SINGLE_RE.captures(body) {
        return Some((caps[1].to_string(), caps[2].to_string()));
    }
    if let Some(caps) = SQL_CHECK_BARE_RE.captures(body) {
        return Some((caps[1].to_string(), caps[2].to_string()));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatted::dialect::SqlDialect;

    fn set() -> DirectiveSet {
        DirectiveSet::new(&SqlDialect)
    }

    #[test]
    fn classifies_header_with_logical_path() {
        let d = set()
            .classify(
                "-- liquibase formatted sql logicalFilePath:db/changelog.sql",
                1,
                true,
                &SqlDialect,
            )
            .unwrap();
        match d {
            Directive::Header { logical_path } => {
                assert_eq!(logical_path.as_deref(), Some("db/changelog.sql"));
            }
            other => panic!("expected Header, got {other:?}"),
        }
    }

    #[test]
    fn header_only_recognized_on_first_line() {
        let d = set()
            .classify("-- liquibase formatted sql", 2, false, &SqlDialect)
            .unwrap();
        assert!(matches!(d, Directive::Body));
    }

    #[test]
    fn classifies_changeset() {
        let d = set()
            .classify("--changeset bob:1 runAlways:true", 3, false, &SqlDialect)
            .unwrap();
        match d {
            Directive::ChangeSet { author, id, attrs } => {
                assert_eq!(author, "bob");
                assert_eq!(id, "1");
                assert!(attrs.run_always);
            }
            other => panic!("expected ChangeSet, got {other:?}"),
        }
    }

    #[test]
    fn rejects_whitespace_around_changeset_colon() {
        let err = set()
            .classify("--changeset bob : 1", 4, false, &SqlDialect)
            .unwrap_err();
        assert!(matches!(err, ChangeLogParseError::UnexpectedFormatting { .. }));
    }

    #[test]
    fn rejects_single_dash_changeset() {
        let err = set()
            .classify("-changeset bob:1", 5, false, &SqlDialect)
            .unwrap_err();
        assert!(matches!(err, ChangeLogParseError::UnexpectedFormatting { .. }));
    }

    #[test]
    fn ignore_lines_rejects_garbage_value() {
        let err = set()
            .classify("--ignoreLines:banana", 6, false, &SqlDialect)
            .unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Semantic { .. }));
    }

    #[test]
    fn sql_check_body_parses_all_three_quoting_styles() {
        assert_eq!(
            parse_sql_check_body("1 select count(*) from t"),
            Some(("1".to_string(), "select count(*) from t".to_string()))
        );
        assert_eq!(
            parse_sql_check_body("'1' select 1"),
            Some(("1".to_string(), "select 1".to_string()))
        );
        assert_eq!(
            parse_sql_check_body(r#""1" select 1"#),
            Some(("1".to_string(), "select 1".to_string()))
        );
    }
}
