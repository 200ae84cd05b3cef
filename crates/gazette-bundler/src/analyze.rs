//! Module-level import/export analysis.
//!
//! Runs over transformed JavaScript and records every top-level module
//! statement along with the byte ranges the linker needs to rewrite it.

use std::collections::HashMap;
use std::ops::Range;
use std::path::Path;

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Argument, BindingPattern, BindingPatternKind, CallExpression, Declaration,
    ExportAllDeclaration, ExportDefaultDeclarationKind, ExportNamedDeclaration, Expression,
    IdentifierReference, ImportDeclaration, ImportDeclarationSpecifier, ModuleExportName,
    ObjectProperty, Statement,
};
use oxc_ast_visit::{walk, Visit};
use oxc_parser::Parser;
use oxc_semantic::{Scoping, SemanticBuilder, SymbolId};
use oxc_span::{GetSpan, SourceType, Span};

use crate::error::BundleError;
use crate::transform::{join_diagnostics, parse_options};

/// One binding introduced by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportBinding {
    Default(String),
    Named { imported: String, local: String },
    Namespace(String),
}

/// A top-level module statement and the ranges to rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleStatement {
    /// `import ... from "source"` or a bare `import "source"`
    Import {
        span: Range<usize>,
        source: String,
        bindings: Vec<ImportBinding>,
    },
    /// `export const a = 1`, `export function f() {}`
    ExportDeclaration {
        prefix: Range<usize>,
        names: Vec<String>,
    },
    /// `export default function App() {}`
    ExportDefaultNamed { prefix: Range<usize>, local: String },
    /// `export default <expression>` or an anonymous function/class
    ExportDefaultValue {
        prefix: Range<usize>,
        end: usize,
        terminated: bool,
    },
    /// `export { a, b as c }`
    ExportList {
        span: Range<usize>,
        specifiers: Vec<(String, String)>,
    },
    /// `export { a, b as c } from "source"`
    ReexportNamed {
        span: Range<usize>,
        source: String,
        specifiers: Vec<(String, String)>,
    },
    /// `export * from "source"` or `export * as ns from "source"`
    ReexportAll {
        span: Range<usize>,
        source: String,
        alias: Option<String>,
    },
}

impl ModuleStatement {
    /// Import source referenced by this statement, if any.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Import { source, .. }
            | Self::ReexportNamed { source, .. }
            | Self::ReexportAll { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// A CommonJS `require("...")` call with a literal argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequireCall {
    pub span: Range<usize>,
    pub specifier: String,
}

/// Syntactic position of a reference to an imported binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceUsage {
    Plain,
    /// `{ name }` object shorthand
    Shorthand,
    /// Called directly, `name(...)`
    Callee,
}

/// A use of a default or named import inside the module body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReference {
    pub span: Range<usize>,
    pub local: String,
    pub usage: ReferenceUsage,
}

/// Everything the linker needs to know about one module.
#[derive(Debug, Clone, Default)]
pub struct ModuleAnalysis {
    pub statements: Vec<ModuleStatement>,
    pub requires: Vec<RequireCall>,
    pub references: Vec<ImportReference>,
    pub hashbang: Option<Range<usize>>,
}

impl ModuleAnalysis {
    /// Whether the module uses ES module syntax.
    pub fn is_esm(&self) -> bool {
        !self.statements.is_empty()
    }

    /// Every specifier this module depends on, in source order, deduplicated.
    pub fn specifiers(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut ordered: Vec<(usize, &str)> = self
            .statements
            .iter()
            .filter_map(|s| s.source().map(|src| (s.start(), src)))
            .collect();
        ordered.extend(self.requires.iter().map(|r| (r.span.start, r.specifier.as_str())));
        ordered.sort_by_key(|(start, _)| *start);

        for (_, spec) in ordered {
            if !out.iter().any(|s| s == spec) {
                out.push(spec.to_string());
            }
        }
        out
    }
}

impl ModuleStatement {
    fn start(&self) -> usize {
        match self {
            Self::Import { span, .. }
            | Self::ExportList { span, .. }
            | Self::ReexportNamed { span, .. }
            | Self::ReexportAll { span, .. } => span.start,
            Self::ExportDeclaration { prefix, .. }
            | Self::ExportDefaultNamed { prefix, .. }
            | Self::ExportDefaultValue { prefix, .. } => prefix.start,
        }
    }
}

/// Analyze transformed JavaScript.
pub fn analyze(path: &Path, code: &str) -> Result<ModuleAnalysis, BundleError> {
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

    let program = ret.program;
    let mut analysis = ModuleAnalysis {
        hashbang: program.hashbang.as_ref().map(|h| range(h.span)),
        ..ModuleAnalysis::default()
    };

    for stmt in &program.body {
        if let Some(statement) = analyze_statement(stmt) {
            analysis.statements.push(statement);
        }
    }

    let scoping = SemanticBuilder::new().build(&program).semantic.into_scoping();
    let mut scanner = BodyScanner {
        scoping: &scoping,
        imports: imported_symbols(&program.body),
        requires: Vec::new(),
        references: Vec::new(),
    };
    scanner.visit_program(&program);

    analysis.requires = scanner.requires;
    analysis.references = scanner.references;
    Ok(analysis)
}

/// Default and named import bindings by symbol. Namespace objects are
/// already live and are left as plain variables.
fn imported_symbols(body: &[Statement]) -> HashMap<SymbolId, String> {
    let mut symbols = HashMap::new();
    for stmt in body {
        let Statement::ImportDeclaration(decl) = stmt else {
            continue;
        };
        for spec in decl.specifiers.iter().flatten() {
            let local = match spec {
                ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                ImportDeclarationSpecifier::ImportNamespaceSpecifier(_) => continue,
            };
            if let Some(symbol) = local.symbol_id.get() {
                symbols.insert(symbol, local.name.to_string());
            }
        }
    }
    symbols
}

/// Finds `require` calls and uses of imported bindings in the module body.
struct BodyScanner<'s> {
    scoping: &'s Scoping,
    imports: HashMap<SymbolId, String>,
    requires: Vec<RequireCall>,
    references: Vec<ImportReference>,
}

impl BodyScanner<'_> {
    fn symbol(&self, id: &IdentifierReference) -> Option<SymbolId> {
        let reference = id.reference_id.get()?;
        self.scoping.get_reference(reference).symbol_id()
    }

    fn record(&mut self, id: &IdentifierReference, usage: ReferenceUsage) -> bool {
        let Some(local) = self.symbol(id).and_then(|s| self.imports.get(&s).cloned()) else {
            return false;
        };
        self.references.push(ImportReference {
            span: range(id.span),
            local,
            usage,
        });
        true
    }

    /// `require("x")` where `require` is not declared in the module.
    fn require_call(&self, call: &CallExpression) -> Option<RequireCall> {
        let Expression::Identifier(callee) = &call.callee else {
            return None;
        };
        if callee.name != "require" || self.symbol(callee).is_some() {
            return None;
        }
        if call.arguments.len() != 1 {
            return None;
        }
        match call.arguments.first() {
            Some(Argument::StringLiteral(lit)) => Some(RequireCall {
                span: range(call.span),
                specifier: lit.value.to_string(),
            }),
            _ => None,
        }
    }
}

impl<'a> Visit<'a> for BodyScanner<'_> {
    // Module declarations are rewritten from `statements`.
    fn visit_import_declaration(&mut self, _decl: &ImportDeclaration<'a>) {}

    fn visit_export_all_declaration(&mut self, _decl: &ExportAllDeclaration<'a>) {}

    fn visit_export_named_declaration(&mut self, decl: &ExportNamedDeclaration<'a>) {
        if let Some(declaration) = &decl.declaration {
            self.visit_declaration(declaration);
        }
    }

    fn visit_identifier_reference(&mut self, id: &IdentifierReference<'a>) {
        self.record(id, ReferenceUsage::Plain);
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if let (true, Expression::Identifier(id)) = (prop.shorthand, &prop.value) {
            self.record(id, ReferenceUsage::Shorthand);
            return;
        }
        walk::walk_object_property(self, prop);
    }

    fn visit_call_expression(&mut self, call: &CallExpression<'a>) {
        if let Some(require) = self.require_call(call) {
            self.requires.push(require);
            return;
        }
        if let Expression::Identifier(callee) = &call.callee {
            if self.record(callee, ReferenceUsage::Callee) {
                self.visit_arguments(&call.arguments);
                return;
            }
        }
        walk::walk_call_expression(self, call);
    }
}

fn analyze_statement(stmt: &Statement) -> Option<ModuleStatement> {
    match stmt {
        Statement::ImportDeclaration(decl) => {
            let mut bindings = Vec::new();
            for spec in decl.specifiers.iter().flatten() {
                bindings.push(match spec {
                    ImportDeclarationSpecifier::ImportSpecifier(s) => ImportBinding::Named {
                        imported: export_name(&s.imported),
                        local: s.local.name.to_string(),
                    },
                    ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => {
                        ImportBinding::Default(s.local.name.to_string())
                    }
                    ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                        ImportBinding::Namespace(s.local.name.to_string())
                    }
                });
            }
            Some(ModuleStatement::Import {
                span: range(decl.span),
                source: decl.source.value.to_string(),
                bindings,
            })
        }

        Statement::ExportNamedDeclaration(decl) => {
            let specifiers: Vec<(String, String)> = decl
                .specifiers
                .iter()
                .map(|s| (export_name(&s.local), export_name(&s.exported)))
                .collect();

            if let Some(source) = &decl.source {
                return Some(ModuleStatement::ReexportNamed {
                    span: range(decl.span),
                    source: source.value.to_string(),
                    specifiers,
                });
            }

            match &decl.declaration {
                Some(declaration) => Some(ModuleStatement::ExportDeclaration {
                    prefix: decl.span.start as usize..declaration.span().start as usize,
                    names: declared_names(declaration),
                }),
                None => Some(ModuleStatement::ExportList {
                    span: range(decl.span),
                    specifiers,
                }),
            }
        }

        Statement::ExportDefaultDeclaration(decl) => {
            let inner = decl.declaration.span();
            let prefix = decl.span.start as usize..inner.start as usize;

            let named = match &decl.declaration {
                ExportDefaultDeclarationKind::FunctionDeclaration(func) => {
                    func.id.as_ref().map(|id| id.name.to_string())
                }
                ExportDefaultDeclarationKind::ClassDeclaration(class) => {
                    class.id.as_ref().map(|id| id.name.to_string())
                }
                _ => None,
            };

            Some(match named {
                Some(local) => ModuleStatement::ExportDefaultNamed { prefix, local },
                None => ModuleStatement::ExportDefaultValue {
                    prefix,
                    end: decl.span.end as usize,
                    terminated: decl.span.end > inner.end,
                },
            })
        }

        Statement::ExportAllDeclaration(decl) => Some(ModuleStatement::ReexportAll {
            span: range(decl.span),
            source: decl.source.value.to_string(),
            alias: decl.exported.as_ref().map(export_name),
        }),

        _ => None,
    }
}

fn declared_names(declaration: &Declaration) -> Vec<String> {
    let mut names = Vec::new();
    match declaration {
        Declaration::VariableDeclaration(var) => {
            for declarator in &var.declarations {
                collect_pattern_names(&declarator.id, &mut names);
            }
        }
        Declaration::FunctionDeclaration(func) => {
            if let Some(id) = &func.id {
                names.push(id.name.to_string());
            }
        }
        Declaration::ClassDeclaration(class) => {
            if let Some(id) = &class.id {
                names.push(id.name.to_string());
            }
        }
        _ => {}
    }
    names
}

fn collect_pattern_names(pattern: &BindingPattern, names: &mut Vec<String>) {
    match &pattern.kind {
        BindingPatternKind::BindingIdentifier(id) => names.push(id.name.to_string()),
        BindingPatternKind::ObjectPattern(obj) => {
            for prop in &obj.properties {
                collect_pattern_names(&prop.value, names);
            }
            if let Some(rest) = &obj.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::ArrayPattern(arr) => {
            for element in arr.elements.iter().flatten() {
                collect_pattern_names(element, names);
            }
            if let Some(rest) = &arr.rest {
                collect_pattern_names(&rest.argument, names);
            }
        }
        BindingPatternKind::AssignmentPattern(assign) => {
            collect_pattern_names(&assign.left, names)
        }
    }
}

fn export_name(name: &ModuleExportName) -> String {
    match name {
        ModuleExportName::IdentifierName(id) => id.name.to_string(),
        ModuleExportName::IdentifierReference(id) => id.name.to_string(),
        ModuleExportName::StringLiteral(lit) => lit.value.to_string(),
    }
}

fn range(span: Span) -> Range<usize> {
    span.start as usize..span.end as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn run(code: &str) -> ModuleAnalysis {
        analyze(&PathBuf::from("mod.js"), code).unwrap()
    }

    #[test]
    fn records_import_bindings() {
        let analysis = run("import React, { useState as useS, useEffect } from \"react\";\nimport * as api from \"./api\";\nimport \"./index.css\";\n");

        assert_eq!(analysis.statements.len(), 3);
        match &analysis.statements[0] {
            ModuleStatement::Import {
                source, bindings, ..
            } => {
                assert_eq!(source, "react");
                assert_eq!(
                    bindings,
                    &vec![
                        ImportBinding::Default("React".into()),
                        ImportBinding::Named {
                            imported: "useState".into(),
                            local: "useS".into()
                        },
                        ImportBinding::Named {
                            imported: "useEffect".into(),
                            local: "useEffect".into()
                        },
                    ]
                );
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            analysis.specifiers(),
            vec!["react".to_string(), "./api".to_string(), "./index.css".to_string()]
        );
    }

    #[test]
    fn records_export_prefixes() {
        let code = "export const a = 1, { b } = {};\nexport default function App() {}\n";
        let analysis = run(code);

        match &analysis.statements[0] {
            ModuleStatement::ExportDeclaration { prefix, names } => {
                assert_eq!(&code[prefix.clone()], "export ");
                assert_eq!(names, &vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected {:?}", other),
        }
        match &analysis.statements[1] {
            ModuleStatement::ExportDefaultNamed { prefix, local } => {
                assert_eq!(&code[prefix.clone()], "export default ");
                assert_eq!(local, "App");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn records_default_expressions() {
        let code = "export default 42;\n";
        let analysis = run(code);

        match &analysis.statements[0] {
            ModuleStatement::ExportDefaultValue {
                prefix, terminated, ..
            } => {
                assert_eq!(&code[prefix.clone()], "export default ");
                assert!(terminated);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn records_reexports() {
        let analysis = run("export * from \"./a\";\nexport * as b from \"./b\";\nexport { c as d } from \"./c\";\n");

        match &analysis.statements[1] {
            ModuleStatement::ReexportAll { source, alias, .. } => {
                assert_eq!(source, "./b");
                assert_eq!(alias.as_deref(), Some("b"));
            }
            other => panic!("unexpected {:?}", other),
        }
        match &analysis.statements[2] {
            ModuleStatement::ReexportNamed { specifiers, .. } => {
                assert_eq!(specifiers, &vec![("c".to_string(), "d".to_string())]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn commonjs_modules_are_not_esm() {
        let analysis = run("const x = require('./x');\nmodule.exports = x;\n");

        assert!(!analysis.is_esm());
        assert_eq!(analysis.specifiers(), vec!["./x".to_string()]);
    }

    #[test]
    fn finds_only_real_require_calls() {
        let code = "a.require('x'); require(\"y\"); myrequire('z');\nconst help = \"call require('nope') to load\"; // require('gone')\nfunction load(require) { return require('local'); }\n";
        let analysis = run(code);

        let specifiers: Vec<&str> = analysis.requires.iter().map(|r| r.specifier.as_str()).collect();
        assert_eq!(specifiers, vec!["y"]);
        assert_eq!(&code[analysis.requires[0].span.clone()], "require(\"y\")");
    }

    #[test]
    fn records_references_to_imports() {
        let code = "import App, { render as draw } from \"./app\";\nimport * as api from \"./api\";\ndraw({ App }, api);\nfunction shadow(App) { return App; }\nexport { draw };\n";
        let analysis = run(code);

        let found: Vec<(&str, &str, ReferenceUsage)> = analysis
            .references
            .iter()
            .map(|r| (&code[r.span.clone()], r.local.as_str(), r.usage))
            .collect();
        assert_eq!(
            found,
            vec![
                ("draw", "draw", ReferenceUsage::Callee),
                ("App", "App", ReferenceUsage::Shorthand),
            ]
        );
    }
}
