use std::collections::HashMap;

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TOKEN_RE: Regex = Regex::new(r"\$\{([A-Za-z0-9_.]+)\}").unwrap();
}

/// External contract for `${name}` substitution. Implementations may
/// scope registered values however they like; the default
/// `ParameterRegistry` keeps one flat, global table.
pub trait ParameterExpander {
    /// Register a property, as parsed from a `property` directive.
    /// `context`/`labels`/`dbms` constrain when a scoped implementation
    /// would consider the property visible; `global` marks it visible
    /// across every changelog rather than just the one it was declared
    /// in. `scope` is the changelog's logical path the property was
    /// declared in. The default `ParameterRegistry` records all of these
    /// but only ever matches on `name` when expanding.
    #[allow(clippy::too_many_arguments)]
    fn register(
        &mut self,
        name: &str,
        value: &str,
        context: Option<&str>,
        labels: Option<&str>,
        dbms: Option<&str>,
        global: bool,
        scope: &str,
    );

    /// Substitute every `${name}` token in `text` with its registered
    /// value. Unresolved tokens are left as-is.
    fn expand(&self, text: &str, scope: &str) -> String;
}

/// Every `${name}` token still present in `text` after expansion, in
/// order of appearance. Used by callers that want to enforce a
/// fail-on-unresolved policy on top of the parser's own leave-as-is
/// contract.
pub fn unresolved_tokens(text: &str) -> Vec<String> {
    TOKEN_RE
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// A registered property and the metadata it was declared with. Only
/// `value` is consulted by `expand`; the rest is retained so a caller
/// inspecting the registry (or a future scoped expander) can see the full
/// `property` directive a value came from.
#[derive(Debug, Clone)]
pub struct PropertyRecord {
    pub value: String,
    pub context: Option<String>,
    pub labels: Option<String>,
    pub dbms: Option<String>,
    pub global: bool,
    pub scope: String,
}

/// Flat `${name}` -> value table, last registration wins.
#[derive(Default, Clone)]
pub struct ParameterRegistry {
    values: HashMap<String, PropertyRecord>,
}

impl ParameterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The full record behind a registered name, if any.
    pub fn record(&self, name: &str) -> Option<&PropertyRecord> {
        self.values.get(name)
    }
}

impl ParameterExpander for ParameterRegistry {
    fn register(
        &mut self,
        name: &str,
        value: &str,
        context: Option<&str>,
        labels: Option<&str>,
        dbms: Option<&str>,
        global: bool,
        scope: &str,
    ) {
        self.values.insert(
            name.to_string(),
            PropertyRecord {
                value: value.to_string(),
                context: context.map(str::to_string),
                labels: labels.map(str::to_string),
                dbms: dbms.map(str::to_string),
                global,
                scope: scope.to_string(),
            },
        );
    }

    fn expand(&self, text: &str, _scope: &str) -> String {
        TOKEN_RE
            .replace_all(text, |caps: &regex::Captures| {
                let name = &caps[1];
                self.values
                    .get(name)
                    .map(|record| record.value.clone())
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}
