use thiserror::Error;

/// Everything that can go wrong while parsing a formatted changelog.
///
/// Variants carry only the context needed to format the message described
/// in the directive grammar: a line number where one exists, plus whatever
/// text is needed to reproduce the message verbatim.
#[derive(Debug, Error)]
pub enum ChangeLogParseError {
    #[error("IO error reading changelog: {message}")]
    Io { message: String },

    #[error(
        "\nUnexpected formatting at line {line}. Formatted {dialect_label} changelogs require known formats, such as '{example}'. Learn all the options at {doc_link}"
    )]
    UnexpectedFormatting {
        line: usize,
        dialect_label: String,
        example: String,
        doc_link: String,
    },

    #[error("{message}")]
    Semantic { line: usize, message: String },

    #[error("line {line}: {message}")]
    Structural { line: usize, message: String },
}

impl ChangeLogParseError {
    pub fn semantic(line: usize, message: impl Into<String>) -> Self {
        Self::Semantic {
            line,
            message: format!("line {line}: {}", message.into()),
        }
    }

    pub fn structural(line: usize, message: impl Into<String>) -> Self {
        Self::Structural {
            line,
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ChangeLogParseError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}
