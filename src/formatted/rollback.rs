use crate::formatted::error::ChangeLogParseError;
use crate::formatted::model::{Change, ChangeLog};

/// True when a (trimmed) rollback buffer is the "not required" marker
/// rather than literal SQL or a changeset reference.
pub fn is_not_required(text: &str) -> bool {
    text.to_ascii_lowercase().starts_with("not required")
}

/// True when a (trimmed) rollback buffer names another changeset rather
/// than carrying literal SQL.
pub fn is_changeset_reference(text: &str) -> bool {
    text.to_ascii_lowercase().contains("changesetid")
}

/// Resolves a rollback buffer that names another changeset, against the
/// current changelog and (if needed) the chain of parent changelogs.
///
/// Expected shape: `changesetId:ID changesetAuthor:AUTHOR
/// [changesetPath:PATH]`, fields in any order, separated by whitespace.
pub struct RollbackResolver;

impl RollbackResolver {
    pub fn resolve_reference(
        text: &str,
        current: &ChangeLog,
        line: usize,
    ) -> Result<Change, ChangeLogParseError> {
        let collapsed = text.replace(['\r', '\n'], " ");
        let (author, id, path) = parse_changeset_reference(&collapsed).ok_or_else(|| {
            ChangeLogParseError::semantic(
                line,
                "rollback changeset reference requires both changesetId: and changesetAuthor:",
            )
        })?;
        let path = path.unwrap_or_else(|| current.physical_path.clone());

        let mut cursor = Some(current);
        while let Some(changelog) = cursor {
            let owner_matches = changelog.physical_path == path;
            if let Some(cs) = changelog.change_sets.iter().find(|cs| {
                cs.author == author
                    && cs.id == id
                    && (owner_matches || cs.logical_path == path)
            }) {
                return Ok(cs.change.clone());
            }
            cursor = changelog.parent;
        }
        Err(ChangeLogParseError::semantic(
            line,
            format!("Change set {path}::{id}::{author} does not exist"),
        ))
    }
}

fn parse_changeset_reference(text: &str) -> Option<(String, String, Option<String>)> {
    let mut author = None;
    let mut id = None;
    let mut path = None;
    for token in text.split_whitespace() {
        if let Some(v) = token.strip_prefix("changesetAuthor:") {
            author = Some(v.to_string());
        } else if let Some(v) = token.strip_prefix("changesetId:") {
            id = Some(v.to_string());
        } else if let Some(v) = token.strip_prefix("changesetPath:") {
            path = Some(v.to_string());
        }
    }
    match (author, id) {
        (Some(a), Some(i)) => Some((a, i, path)),
        _ => None,
    }
}
