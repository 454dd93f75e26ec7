use std::collections::HashSet;

use crate::formatted::dialect::Dialect;
use crate::formatted::error::ChangeLogParseError;
use crate::formatted::expand::ParameterExpander;
use crate::formatted::grammar::{
    ChangeSetAttrs, Directive, DirectiveSet, IgnoreLinesKind, parse_sql_check_body,
};
use crate::formatted::model::{
    Change, ChangeLog, ChangeSet, Precondition, PreconditionContainer, SqlCheckPrecondition,
};
use crate::formatted::rollback::{is_changeset_reference, is_not_required, RollbackResolver};
use crate::formatted::scanner::LineScanner;
use crate::resource::ResourceAccessor;

/// A changeset whose `changeset` directive has been seen but not yet
/// closed by the next `changeset`/EOF.
struct PendingChangeSet {
    cs: ChangeSet,
    body: String,
    rollback_buf: String,
    rollback_split_statements: Option<bool>,
    rollback_end_delimiter: Option<String>,
    line_no: usize,
}

enum IgnoreMode {
    Count(usize),
    UntilEnd,
}

/// Mirrors the spec's four named states; each variant carries whatever
/// data that state needs rather than stashing it in a parallel struct.
enum ParserState {
    BeforeFirstChangeSet,
    InChangeSet(PendingChangeSet),
    InMultiLineRollback(PendingChangeSet),
    InIgnoreBlock {
        remaining: IgnoreMode,
        resume: Box<ParserState>,
    },
}

/// Parse a formatted changelog from `path` via `accessor`, expanding
/// `${}` parameters with `expander` as they're encountered. `parent`, if
/// given, is consulted by rollback directives that reference a changeset
/// by id/author rather than supplying SQL directly.
pub fn parse<'p>(
    path: &str,
    dialect: &dyn Dialect,
    accessor: &dyn ResourceAccessor,
    expander: &mut dyn ParameterExpander,
    parent: Option<&'p ChangeLog<'p>>,
) -> Result<ChangeLog<'p>, ChangeLogParseError> {
    let stream = accessor
        .open(path)
        .map_err(|e| ChangeLogParseError::Io {
            message: e.to_string(),
        })?;
    let mut scanner = LineScanner::new(stream);
    let grammar = DirectiveSet::new(dialect);
    let mut changelog = ChangeLog::new(path, parent);
    let mut state = ParserState::BeforeFirstChangeSet;
    let mut seen_non_blank = false;

    while let Some((line_no, raw)) = scanner.read_line()? {
        let is_blank = raw.trim().is_empty();
        let is_first_non_blank = !seen_non_blank && !is_blank;
        if !is_blank {
            seen_non_blank = true;
        }
        state = step(
            state,
            line_no,
            &raw,
            is_first_non_blank,
            &mut changelog,
            dialect,
            &grammar,
            expander,
        )?;
    }

    finalize_at_eof(state, &mut changelog, dialect, expander)?;
    Ok(changelog)
}

/// Check whether `source`'s first non-blank line declares this dialect,
/// without otherwise parsing it.
pub fn supports(
    path: &str,
    accessor: &dyn ResourceAccessor,
    dialect: &dyn Dialect,
) -> Result<bool, ChangeLogParseError> {
    let stream = accessor
        .open(path)
        .map_err(|e| ChangeLogParseError::Io {
            message: e.to_string(),
        })?;
    let mut scanner = LineScanner::new(stream);
    let grammar = DirectiveSet::new(dialect);
    while let Some((line_no, raw)) = scanner.read_line()? {
        if raw.trim().is_empty() {
            continue;
        }
        return Ok(matches!(
            grammar.classify(&raw, line_no, true, dialect),
            Ok(Directive::Header { .. })
        ));
    }
    Ok(false)
}

#[allow(clippy::too_many_arguments)]
fn step(
    state: ParserState,
    line_no: usize,
    raw: &str,
    is_first_non_blank: bool,
    changelog: &mut ChangeLog,
    dialect: &dyn Dialect,
    grammar: &DirectiveSet,
    expander: &mut dyn ParameterExpander,
) -> Result<ParserState, ChangeLogParseError> {
    match state {
        ParserState::InIgnoreBlock {
            mut remaining,
            resume,
        } => match &mut remaining {
            IgnoreMode::Count(n) => {
                *n -= 1;
                if *n == 0 {
                    Ok(*resume)
                } else {
                    Ok(ParserState::InIgnoreBlock { remaining, resume })
                }
            }
            IgnoreMode::UntilEnd => {
                if grammar.is_ignore_lines_end(raw) {
                    Ok(*resume)
                } else {
                    Ok(ParserState::InIgnoreBlock { remaining, resume })
                }
            }
        },
        ParserState::InMultiLineRollback(mut pending) => {
            if let Some(content) = strip_multiline_close(raw, dialect.end_multiline_comment_token())
            {
                if !content.trim().is_empty() {
                    pending.rollback_buf.push_str(content);
                    pending.rollback_buf.push('\n');
                }
                Ok(ParserState::InChangeSet(pending))
            } else {
                pending.rollback_buf.push_str(raw);
                pending.rollback_buf.push('\n');
                Ok(ParserState::InMultiLineRollback(pending))
            }
        }
        ParserState::BeforeFirstChangeSet => {
            let directive = grammar.classify(raw, line_no, is_first_non_blank, dialect)?;
            apply_before_first(directive, line_no, changelog, dialect, expander)
        }
        ParserState::InChangeSet(pending) => {
            let directive = grammar.classify(raw, line_no, false, dialect)?;
            apply_in_change_set(directive, pending, line_no, raw, changelog, dialect, expander)
        }
    }
}

fn apply_before_first(
    directive: Directive,
    line_no: usize,
    changelog: &mut ChangeLog,
    dialect: &dyn Dialect,
    expander: &mut dyn ParameterExpander,
) -> Result<ParserState, ChangeLogParseError> {
    match directive {
        Directive::Header { logical_path } => {
            if let Some(lp) = logical_path {
                changelog.logical_path = Some(lp);
            }
            Ok(ParserState::BeforeFirstChangeSet)
        }
        Directive::Property { fields } => {
            register_property(&fields, changelog, expander, line_no)?;
            Ok(ParserState::BeforeFirstChangeSet)
        }
        Directive::IgnoreLines(kind) => {
            enter_ignore_block(kind, line_no, ParserState::BeforeFirstChangeSet)
        }
        Directive::ChangeSet { author, id, attrs } => {
            let pending = build_pending(author, id, attrs, line_no, changelog, dialect);
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::Comment { .. } => Err(ChangeLogParseError::structural(
            line_no,
            "comment directive outside a changeset",
        )),
        Directive::ValidCheckSum { .. } => Err(ChangeLogParseError::structural(
            line_no,
            "validCheckSum directive outside a changeset",
        )),
        Directive::Rollback { .. } | Directive::RollbackMultiLineStart => Err(
            ChangeLogParseError::structural(line_no, "rollback directive outside a changeset"),
        ),
        Directive::Preconditions { .. } | Directive::Precondition { .. } => Err(
            ChangeLogParseError::structural(line_no, "precondition directive outside a changeset"),
        ),
        Directive::Body => Ok(ParserState::BeforeFirstChangeSet),
    }
}

#[allow(clippy::too_many_arguments)]
fn apply_in_change_set(
    directive: Directive,
    mut pending: PendingChangeSet,
    line_no: usize,
    raw: &str,
    changelog: &mut ChangeLog,
    dialect: &dyn Dialect,
    expander: &mut dyn ParameterExpander,
) -> Result<ParserState, ChangeLogParseError> {
    match directive {
        Directive::Header { .. } | Directive::Body => {
            pending.body.push_str(raw);
            pending.body.push('\n');
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::Property { fields } => {
            register_property(&fields, changelog, expander, line_no)?;
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::IgnoreLines(kind) => {
            enter_ignore_block(kind, line_no, ParserState::InChangeSet(pending))
        }
        Directive::ChangeSet { author, id, attrs } => {
            finalize_changeset(pending, changelog, dialect, expander, false)?;
            let new_pending = build_pending(author, id, attrs, line_no, changelog, dialect);
            Ok(ParserState::InChangeSet(new_pending))
        }
        Directive::Rollback { text } => {
            pending.rollback_buf.push_str(&text);
            pending.rollback_buf.push('\n');
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::RollbackMultiLineStart => Ok(ParserState::InMultiLineRollback(pending)),
        Directive::Preconditions { rest } => {
            let mut container = pending.cs.preconditions.take().unwrap_or_default();
            dialect.parse_preconditions_header(&mut container, &rest, line_no)?;
            pending.cs.preconditions = Some(container);
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::Precondition { name, body } => {
            let mut container = pending.cs.preconditions.take().unwrap_or_default();
            match name.as_str() {
                "sql-check" => {
                    let (expected_result, sql) = parse_sql_check_body(&body).ok_or_else(|| {
                        ChangeLogParseError::semantic(
                            line_no,
                            format!("could not parse precondition-sql-check body '{body}'"),
                        )
                    })?;
                    container
                        .preconditions
                        .push(Precondition::SqlCheck(SqlCheckPrecondition {
                            expected_result,
                            sql,
                        }));
                }
                other => {
                    return Err(ChangeLogParseError::semantic(
                        line_no,
                        format!("unknown precondition type 'precondition-{other}'"),
                    ));
                }
            }
            pending.cs.preconditions = Some(container);
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::Comment { text } => {
            if text.trim().is_empty() {
                return Err(ChangeLogParseError::semantic(
                    line_no,
                    "comment directive requires non-empty text",
                ));
            }
            pending.cs.comments = Some(text);
            Ok(ParserState::InChangeSet(pending))
        }
        Directive::ValidCheckSum { hash } => {
            pending.cs.valid_checksums.insert(hash);
            Ok(ParserState::InChangeSet(pending))
        }
    }
}

fn enter_ignore_block(
    kind: IgnoreLinesKind,
    line_no: usize,
    resume: ParserState,
) -> Result<ParserState, ChangeLogParseError> {
    match kind {
        IgnoreLinesKind::Count(0) => Ok(resume),
        IgnoreLinesKind::Count(n) => Ok(ParserState::InIgnoreBlock {
            remaining: IgnoreMode::Count(n),
            resume: Box::new(resume),
        }),
        IgnoreLinesKind::Start => Ok(ParserState::InIgnoreBlock {
            remaining: IgnoreMode::UntilEnd,
            resume: Box::new(resume),
        }),
        IgnoreLinesKind::End => Err(ChangeLogParseError::structural(
            line_no,
            "ignoreLines:end with no matching ignoreLines:start",
        )),
    }
}

fn register_property(
    fields: &std::collections::HashMap<String, String>,
    changelog: &ChangeLog,
    expander: &mut dyn ParameterExpander,
    line_no: usize,
) -> Result<(), ChangeLogParseError> {
    let name = fields.get("name").ok_or_else(|| {
        ChangeLogParseError::semantic(line_no, "property directive requires name:")
    })?;
    let value = fields.get("value").ok_or_else(|| {
        ChangeLogParseError::semantic(line_no, "property directive requires value:")
    })?;
    let global = fields
        .get("global")
        .map(|v| v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    expander.register(
        name,
        value,
        fields.get("context").map(String::as_str),
        fields.get("labels").map(String::as_str),
        fields.get("dbms").map(String::as_str),
        global,
        changelog.effective_logical_path(),
    );
    Ok(())
}

fn build_pending(
    author: String,
    id: String,
    attrs: ChangeSetAttrs,
    line_no: usize,
    changelog: &ChangeLog,
    dialect: &dyn Dialect,
) -> PendingChangeSet {
    let logical_path = attrs
        .logical_file_path
        .clone()
        .unwrap_or_else(|| changelog.effective_logical_path().to_string());

    let mut change = dialect.new_change();
    change.split_statements = attrs.split_statements.unwrap_or(true);
    change.strip_comments = attrs.strip_comments.unwrap_or(true);
    change.end_delimiter = attrs.end_delimiter.clone();

    let cs = ChangeSet {
        id,
        author,
        logical_path,
        contexts: attrs.context_filter.or(attrs.context),
        labels: attrs.labels,
        dbms: attrs.dbms,
        run_with: attrs.run_with,
        run_with_spool_file: attrs.run_with_spool_file,
        run_always: attrs.run_always,
        run_on_change: attrs.run_on_change,
        run_in_transaction: attrs.run_in_transaction,
        fail_on_error: attrs.fail_on_error,
        ignore: attrs.ignore,
        comments: None,
        valid_checksums: HashSet::new(),
        preconditions: None,
        change,
        rollback: Vec::new(),
        quoting_strategy: changelog.quoting_strategy,
    };

    PendingChangeSet {
        cs,
        body: String::new(),
        rollback_buf: String::new(),
        rollback_split_statements: attrs.rollback_split_statements,
        rollback_end_delimiter: attrs.rollback_end_delimiter,
        line_no,
    }
}

fn finalize_changeset(
    mut pending: PendingChangeSet,
    changelog: &mut ChangeLog,
    dialect: &dyn Dialect,
    expander: &mut dyn ParameterExpander,
    is_eof: bool,
) -> Result<(), ChangeLogParseError> {
    let expanded = expander.expand(pending.body.trim(), changelog.effective_logical_path());
    if expanded.trim().is_empty() {
        return Err(ChangeLogParseError::semantic(
            pending.line_no,
            format!(
                "No {} for changeset {}::{}::{}",
                dialect.label(),
                changelog.physical_path,
                pending.cs.id,
                pending.cs.author
            ),
        ));
    }
    pending.cs.change.sql = expanded;
    if is_eof
        && pending.cs.change.end_delimiter.is_none()
        && dialect.is_end_delimiter(&pending.cs.change)
    {
        pending.cs.change.end_delimiter = Some(dialect.forced_end_delimiter().to_string());
    }

    let rollback_text = pending.rollback_buf.trim();
    if !rollback_text.is_empty() {
        let rollback_change = if is_not_required(rollback_text) {
            Change::default()
        } else if is_changeset_reference(rollback_text) {
            RollbackResolver::resolve_reference(rollback_text, changelog, pending.line_no)?
        } else {
            let expanded_rollback = expander.expand(rollback_text, changelog.effective_logical_path());
            finish_rollback_change(
                Change {
                    sql: expanded_rollback,
                    ..dialect.new_change()
                },
                &pending,
            )
        };
        pending.cs.rollback.push(rollback_change);
    }

    changelog.change_sets.push(pending.cs);
    Ok(())
}

fn finalize_at_eof(
    mut state: ParserState,
    changelog: &mut ChangeLog,
    dialect: &dyn Dialect,
    expander: &mut dyn ParameterExpander,
) -> Result<(), ChangeLogParseError> {
    loop {
        match state {
            ParserState::InIgnoreBlock { resume, .. } => state = *resume,
            ParserState::InMultiLineRollback(pending) => {
                return Err(ChangeLogParseError::structural(
                    pending.line_no,
                    "unterminated multi-line rollback block",
                ));
            }
            ParserState::InChangeSet(pending) => {
                return finalize_changeset(pending, changelog, dialect, expander, true);
            }
            ParserState::BeforeFirstChangeSet => return Ok(()),
        }
    }
}

fn finish_rollback_change(mut change: Change, pending: &PendingChangeSet) -> Change {
    change.split_statements = pending.rollback_split_statements.unwrap_or(true);
    if change.end_delimiter.is_none() {
        change.end_delimiter = pending.rollback_end_delimiter.clone();
    }
    change
}

fn strip_multiline_close<'a>(raw: &'a str, close_token: &str) -> Option<&'a str> {
    raw.find(close_token).map(|idx| &raw[..idx])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formatted::dialect::SqlDialect;
    use crate::formatted::expand::ParameterRegistry;
    use crate::resource::InMemoryResourceAccessor;

    fn parse_str(source: &str) -> Result<ChangeLog<'static>, ChangeLogParseError> {
        let accessor = InMemoryResourceAccessor::new().with("cl.sql", source);
        let mut expander = ParameterRegistry::new();
        parse("cl.sql", &SqlDialect, &accessor, &mut expander, None)
    }

    #[test]
    fn parses_single_changeset() {
        let cl = parse_str(
            "-- liquibase formatted sql\n--changeset bob:1\ncreate table t (id int);\n",
        )
        .unwrap();
        assert_eq!(cl.change_sets.len(), 1);
        assert_eq!(cl.change_sets[0].change.sql, "create table t (id int);");
    }

    #[test]
    fn parses_rollback_and_preconditions() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   --preconditions onFail:MARK_RAN\n\
                   --precondition-sql-check expectedResult:1 select 1\n\
                   create table t (id int);\n\
                   --rollback drop table t;\n";
        let cl = parse_str(src).unwrap();
        let cs = &cl.change_sets[0];
        assert_eq!(cs.rollback.len(), 1);
        assert_eq!(cs.rollback[0].sql, "drop table t;");
        let preconditions = cs.preconditions.as_ref().unwrap();
        assert_eq!(preconditions.on_fail, super::super::model::OnFailAction::MarkRan);
        assert_eq!(preconditions.preconditions.len(), 1);
    }

    #[test]
    fn multi_line_rollback_block() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   create table t (id int);\n\
                   /* liquibase rollback\n\
                   drop table t;\n\
                   */\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].rollback[0].sql, "drop table t;");
    }

    #[test]
    fn ignore_lines_count_skips_raw_lines() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   --ignoreLines:2\n\
                   this is skipped\n\
                   so is this\n\
                   create table t (id int);\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].change.sql, "create table t (id int);");
    }

    #[test]
    fn ignore_lines_block_skips_until_end() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   --ignoreLines:start\n\
                   skip 1\n\
                   skip 2\n\
                   --ignoreLines:end\n\
                   create table t (id int);\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].change.sql, "create table t (id int);");
    }

    #[test]
    fn empty_body_at_eof_errors() {
        let src = "-- liquibase formatted sql\n--changeset bob:1\n";
        let err = parse_str(src).unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Semantic { .. }));
    }

    #[test]
    fn empty_body_before_next_changeset_errors() {
        let src = "-- liquibase formatted sql\n--changeset bob:1\n--changeset bob:2\nselect 1;\n";
        let err = parse_str(src).unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Semantic { .. }));
    }

    #[test]
    fn comment_outside_changeset_errors() {
        let src = "-- liquibase formatted sql\n--comment: stray\n";
        let err = parse_str(src).unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Structural { .. }));
    }

    #[test]
    fn comment_sets_changeset_comments() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   --comment: add a table\n\
                   create table t (id int);\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].comments.as_deref(), Some("add a table"));
    }

    #[test]
    fn empty_comment_errors() {
        let src = "-- liquibase formatted sql\n--changeset bob:1\n--comment:\ncreate table t (id int);\n";
        let err = parse_str(src).unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Semantic { .. }));
    }

    #[test]
    fn unterminated_multiline_rollback_errors() {
        let src = "-- liquibase formatted sql\n--changeset bob:1\ncreate table t (id int);\n/* liquibase rollback\ndrop table t;\n";
        let err = parse_str(src).unwrap_err();
        assert!(matches!(err, ChangeLogParseError::Structural { .. }));
    }

    #[test]
    fn property_is_expanded_in_later_body() {
        let src = "-- liquibase formatted sql\n--property name:tbl value:accounts\n--changeset bob:1\ncreate table ${tbl} (id int);\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].change.sql, "create table accounts (id int);");
    }

    #[test]
    fn rollback_by_reference_resolves_to_original_change() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   create table t (id int);\n\
                   --changeset bob:2\n\
                   alter table t add column c int;\n\
                   --rollback changesetId:1 changesetAuthor:bob\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[1].rollback[0].sql, "create table t (id int);");
    }

    #[test]
    fn rollback_not_required_yields_single_empty_change() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   create table t (id int);\n\
                   --rollback not required\n";
        let cl = parse_str(src).unwrap();
        let cs = &cl.change_sets[0];
        assert_eq!(cs.rollback.len(), 1);
        assert_eq!(cs.rollback[0].sql, "");
    }

    #[test]
    fn multiple_rollback_lines_concatenate_into_one_change() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   create table t (id int);\n\
                   --rollback drop index ix_t;\n\
                   --rollback drop table t;\n";
        let cl = parse_str(src).unwrap();
        let cs = &cl.change_sets[0];
        assert_eq!(cs.rollback.len(), 1);
        assert_eq!(cs.rollback[0].sql, "drop index ix_t;\ndrop table t;");
    }

    #[test]
    fn eof_forces_end_delimiter_when_body_ends_in_dollar_quote() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   create function f() returns void as $$\nbegin\nend;\n$$;\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].change.end_delimiter.as_deref(), Some("\n/$"));
    }

    #[test]
    fn mid_file_changeset_boundary_does_not_force_end_delimiter() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1\n\
                   create function f() returns void as $$\nbegin\nend;\n$$;\n\
                   --changeset bob:2\n\
                   select 1;\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].change.end_delimiter, None);
    }

    #[test]
    fn context_filter_takes_precedence_over_legacy_context() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1 context:legacy contextFilter:preferred\n\
                   create table t (id int);\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].contexts.as_deref(), Some("preferred"));
    }

    #[test]
    fn legacy_context_used_when_context_filter_absent() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1 context:legacy\n\
                   create table t (id int);\n";
        let cl = parse_str(src).unwrap();
        assert_eq!(cl.change_sets[0].contexts.as_deref(), Some("legacy"));
    }

    #[test]
    fn rollback_end_delimiter_and_split_statements_apply_to_literal_rollback() {
        let src = "-- liquibase formatted sql\n\
                   --changeset bob:1 rollbackSplitStatements:false rollbackEndDelimiter:GO\n\
                   create table t (id int);\n\
                   --rollback drop table t;\n";
        let cl = parse_str(src).unwrap();
        let rollback = &cl.change_sets[0].rollback[0];
        assert!(!rollback.split_statements);
        assert_eq!(rollback.end_delimiter.as_deref(), Some("GO"));
    }
}
