use crate::error::ConflictError;
use crate::macros::error::MacroExpansionError;
use crate::macros::scanner;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Text matched by a macro alias
#[derive(Debug, Clone, Copy)]
pub struct MacroInvocation<'a> {
    /// Registered alias (lowercase)
    pub alias: &'a str,

    /// The full token as written in the query, without negation prefix
    pub token: &'a str,

    /// Remainder after a prefix alias such as `age:`; empty for exact aliases
    pub argument: &'a str,
}

/// Rewrites one matched token into query text
pub type ExpansionRule =
    Arc<dyn Fn(&MacroInvocation<'_>) -> anyhow::Result<String> + Send + Sync + 'static>;

/// Implemented by index types that declare query macros.
pub trait HasMacros: Send + Sync {
    /// Index type the macros are scoped to
    fn macro_index_type(&self) -> &str;

    /// Register this index type's macros
    fn configure_macros(&self, macros: &mut MacroScope<'_>) -> Result<(), ConflictError>;
}

struct MacroDefinition {
    alias: String,
    rule: ExpansionRule,
}

#[derive(Default)]
struct IndexMacros {
    exact: HashMap<String, Arc<MacroDefinition>>,
    /// Aliases ending in ':', longest first
    prefixes: Vec<Arc<MacroDefinition>>,
    /// Registration order, for listing
    order: Vec<String>,
}

impl IndexMacros {
    fn contains(&self, alias: &str) -> bool {
        self.exact.contains_key(alias) || self.prefixes.iter().any(|def| def.alias == alias)
    }

    fn insert(&mut self, definition: MacroDefinition) {
        let definition = Arc::new(definition);
        self.order.push(definition.alias.clone());

        if definition.alias.ends_with(':') {
            self.prefixes.push(definition);
            self.prefixes
                .sort_by(|a, b| b.alias.len().cmp(&a.alias.len()));
        } else {
            self.exact.insert(definition.alias.clone(), definition);
        }
    }

    /// Find the macro for a token, returning it and the argument text
    fn lookup<'t>(&self, token: &'t str) -> Option<(&MacroDefinition, &'t str)> {
        let lowered = token.to_lowercase();

        if let Some(definition) = self.exact.get(&lowered) {
            return Some((definition.as_ref(), ""));
        }

        // Compare the head in the token's own byte offsets; lowercasing can
        // change the length of individual characters
        self.prefixes.iter().find_map(|definition| {
            let split = definition.alias.len();
            let head = token.get(..split)?;
            let argument = token.get(split..)?;
            (head.to_lowercase() == definition.alias).then(|| (definition.as_ref(), argument))
        })
    }
}

/// Query macros keyed by index type and alias.
///
/// Populated during startup, then shared read-only behind an `Arc`.
#[derive(Default)]
pub struct MacroRegistry {
    by_index: HashMap<String, IndexMacros>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a macro for an index type.
    ///
    /// Aliases are matched case-insensitively. An alias ending in `:` matches
    /// any token starting with it and passes the remainder as the argument.
    pub fn register<F>(
        &mut self,
        index_type: &str,
        alias: &str,
        rule: F,
    ) -> Result<(), ConflictError>
    where
        F: Fn(&MacroInvocation<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.register_rule(index_type, alias, Arc::new(rule))
    }

    /// Register a macro that always expands to the same text
    pub fn register_replacement(
        &mut self,
        index_type: &str,
        alias: &str,
        replacement: impl Into<String>,
    ) -> Result<(), ConflictError> {
        let replacement = replacement.into();
        self.register(index_type, alias, move |_| Ok(replacement.clone()))
    }

    fn register_rule(
        &mut self,
        index_type: &str,
        alias: &str,
        rule: ExpansionRule,
    ) -> Result<(), ConflictError> {
        let alias = alias.trim().to_lowercase();
        let macros = self.by_index.entry(index_type.to_string()).or_default();

        if macros.contains(&alias) {
            return Err(ConflictError::DuplicateMacro {
                index_type: index_type.to_string(),
                alias,
            });
        }

        debug!(index_type = %index_type, alias = %alias, "Registered query macro");
        macros.insert(MacroDefinition { alias, rule });
        Ok(())
    }

    /// Let an index type register its macros
    pub fn configure(&mut self, source: &dyn HasMacros) -> Result<(), ConflictError> {
        let index_type = source.macro_index_type().to_string();
        let before = self.len_for(&index_type);

        let mut scope = MacroScope {
            registry: self,
            index_type: &index_type,
        };
        source.configure_macros(&mut scope)?;

        info!(
            index_type = %index_type,
            macros = self.len_for(&index_type) - before,
            "Configured query macros"
        );
        Ok(())
    }

    /// Rewrite every registered alias token in `raw` for `index_type`.
    ///
    /// Tokens inside quotes and unregistered tokens are copied verbatim. The
    /// output of a rule is never scanned again, so a rule that emits another
    /// alias does not trigger a second expansion.
    pub fn expand(&self, index_type: &str, raw: &str) -> Result<String, MacroExpansionError> {
        let Some(macros) = self.by_index.get(index_type) else {
            return Ok(raw.to_string());
        };

        let mut expanded = String::with_capacity(raw.len());
        let mut copied_to = 0;

        for token in scanner::tokens(raw) {
            if token.quoted {
                continue;
            }

            let text = token.text(raw);
            let (negation, body) = match text.strip_prefix('-') {
                Some(rest) if !rest.is_empty() => ("-", rest),
                _ => ("", text),
            };

            let Some((definition, argument)) = macros.lookup(body) else {
                continue;
            };

            let invocation = MacroInvocation {
                alias: &definition.alias,
                token: body,
                argument,
            };
            let replacement =
                (definition.rule)(&invocation).map_err(|err| MacroExpansionError {
                    index_type: index_type.to_string(),
                    alias: definition.alias.clone(),
                    token: body.to_string(),
                    message: format!("{err:#}"),
                })?;

            expanded.push_str(&raw[copied_to..token.start]);
            expanded.push_str(negation);
            expanded.push_str(&replacement);
            copied_to = token.end;
        }

        expanded.push_str(&raw[copied_to..]);
        Ok(expanded)
    }

    /// Aliases registered for an index type, in registration order
    pub fn aliases(&self, index_type: &str) -> Vec<&str> {
        self.by_index
            .get(index_type)
            .map(|macros| macros.order.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    fn len_for(&self, index_type: &str) -> usize {
        self.by_index
            .get(index_type)
            .map(|macros| macros.order.len())
            .unwrap_or(0)
    }

    /// Total number of macros across index types
    pub fn len(&self) -> usize {
        self.by_index.values().map(|macros| macros.order.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Registration handle scoped to one index type
pub struct MacroScope<'r> {
    registry: &'r mut MacroRegistry,
    index_type: &'r str,
}

impl MacroScope<'_> {
    pub fn index_type(&self) -> &str {
        self.index_type
    }

    pub fn register<F>(&mut self, alias: &str, rule: F) -> Result<&mut Self, ConflictError>
    where
        F: Fn(&MacroInvocation<'_>) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.registry.register(self.index_type, alias, rule)?;
        Ok(self)
    }

    pub fn replace(
        &mut self,
        alias: &str,
        replacement: impl Into<String>,
    ) -> Result<&mut Self, ConflictError> {
        self.registry
            .register_replacement(self.index_type, alias, replacement)?;
        Ok(self)
    }
}
