//! Compile-time substitution of global identifiers.
//!
//! `process.env.VITE_NHOST_REGION` -> `"eu-central-1"`. Only expressions are
//! replaced, and only when their root identifier is a global, so string
//! contents, comments, property keys and shadowed locals are left alone.

use std::collections::BTreeMap;
use std::ops::Range;
use std::path::Path;
use std::sync::LazyLock;

use oxc_allocator::Allocator;
use oxc_ast::ast::{Expression, IdentifierReference, ObjectProperty};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder};
use oxc_span::{GetSpan, SourceType};
use regex::Regex;

use crate::error::BundleError;
use crate::linker::apply_edits;
use crate::transform::{join_diagnostics, parse_options};

static KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_$][\w$]*(?:\.[A-Za-z_$][\w$]*)*$").expect("Invalid define key regex")
});

/// Values that can stand in any expression position without parentheses.
static ATOM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:[\w$.]+|"(?:[^"\\]|\\.)*")$"#).expect("Invalid define value regex")
});

/// A validated set of defines.
#[derive(Debug, Clone, Default)]
pub struct Defines {
    /// Dotted key -> replacement text
    entries: BTreeMap<String, String>,
}

impl Defines {
    /// Build defines from `key -> JavaScript literal` entries.
    pub fn new(entries: BTreeMap<String, String>) -> Result<Self, BundleError> {
        let mut replacements = BTreeMap::new();
        for (key, value) in entries {
            if !KEY_RE.is_match(&key) {
                return Err(BundleError::InvalidDefine {
                    key,
                    message: "key must be a dotted identifier".to_string(),
                });
            }
            let value = value.trim();
            if value.is_empty() {
                return Err(BundleError::InvalidDefine {
                    key,
                    message: "value must not be empty".to_string(),
                });
            }
            let replacement = if ATOM_RE.is_match(value) {
                value.to_string()
            } else {
                format!("({})", value)
            };
            replacements.insert(key, replacement);
        }

        Ok(Self {
            entries: replacements,
        })
    }

    /// Whether no substitutions are configured.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply all substitutions to the module `code` read from `path`.
    pub fn apply(&self, path: &Path, code: &str) -> Result<String, BundleError> {
        if self.is_empty() {
            return Ok(code.to_string());
        }

        let allocator = Allocator::default();
        let ret = Parser::new(&allocator, code, SourceType::mjs())
            .with_options(parse_options())
            .parse();
        if ret.panicked || !ret.errors.is_empty() {
            return Err(BundleError::Syntax {
                path: path.to_path_buf(),
                message: join_diagnostics(&ret.errors),
            });
        }

        let scoping = SemanticBuilder::new()
            .build(&ret.program)
            .semantic
            .into_scoping();

        let mut finder = DefineFinder {
            entries: &self.entries,
            scoping: &scoping,
            edits: Vec::new(),
        };
        finder.visit_program(&ret.program);

        Ok(apply_edits(code, finder.edits))
    }
}

/// Collects the expressions to replace.
struct DefineFinder<'d> {
    entries: &'d BTreeMap<String, String>,
    scoping: &'d Scoping,
    edits: Vec<(Range<usize>, String)>,
}

impl DefineFinder<'_> {
    /// Dotted form of a global identifier, `import.meta` or a static member
    /// chain rooted at either.
    fn dotted(&self, expr: &Expression) -> Option<String> {
        match expr {
            Expression::Identifier(id) => self.is_global(id).then(|| id.name.to_string()),
            Expression::MetaProperty(meta) => {
                Some(format!("{}.{}", meta.meta.name, meta.property.name))
            }
            Expression::StaticMemberExpression(member) if !member.optional => {
                let object = self.dotted(&member.object)?;
                Some(format!("{}.{}", object, member.property.name))
            }
            _ => None,
        }
    }

    fn is_global(&self, id: &IdentifierReference) -> bool {
        id.reference_id
            .get()
            .map_or(true, |r| self.scoping.get_reference(r).symbol_id().is_none())
    }

    fn replacement(&self, expr: &Expression) -> Option<String> {
        let key = self.dotted(expr)?;
        self.entries.get(&key).cloned()
    }
}

impl<'a> Visit<'a> for DefineFinder<'_> {
    fn visit_expression(&mut self, expr: &Expression<'a>) {
        // Outermost match wins, so `a.b.c` is preferred over `a.b`.
        if let Some(value) = self.replacement(expr) {
            let span = expr.span();
            self.edits
                .push((span.start as usize..span.end as usize, value));
            return;
        }
        walk::walk_expression(self, expr);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        // `{ __DEV__ }` has to keep its key.
        if let (true, Expression::Identifier(id)) = (prop.shorthand, &prop.value) {
            if let Some(value) = self.replacement(&prop.value) {
                self.edits.push((
                    id.span.start as usize..id.span.end as usize,
                    format!("{}: {}", id.name, value),
                ));
            }
            return;
        }
        walk::walk_object_property(self, prop);
    }
}

/// Encode a string as a JavaScript string literal.
pub fn string_literal(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}
