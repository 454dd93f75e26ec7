//! formatted-changelog: a line-oriented parser for database
//! schema-migration scripts embedded as comments in a host language's
//! native source file (currently SQL).
//!
//! The parser consumes an opener (name -> byte stream), a
//! parameter-expansion context, and an optional parent changelog, and
//! produces an in-memory [`ChangeLog`] tree or a
//! [`ChangeLogParseError`]. It does not execute migrations, validate
//! SQL, or perform any I/O beyond reading the input stream.

pub mod config;
pub mod formatted;
pub mod resource;

pub use config::Config;
pub use formatted::{
    Change, ChangeLog, ChangeLogParseError, ChangeSet, Dialect, OnFailAction, ParameterExpander,
    ParameterRegistry, Precondition, PreconditionContainer, PropertyRecord, QuotingStrategy,
    SqlCheckPrecondition, SqlDialect, parse, supports, unresolved_tokens,
};
pub use resource::{FsResourceAccessor, InMemoryResourceAccessor, ResourceAccessor, ResourceError};
