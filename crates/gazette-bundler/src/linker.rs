//! Rewrites analyzed modules into registry factories and assembles the bundle.
//!
//! Every module becomes `function (module, exports, require) { ... }` in a
//! registry array. Imports are lowered to `__require(id)` calls placed at the
//! top of the factory and their uses read through to the dependency's
//! exports. Exports become getters installed by `__export`.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::ops::Range;

use crate::analyze::{ImportBinding, ModuleAnalysis, ModuleStatement, ReferenceUsage};

/// Helpers shared by every module in the bundle.
pub const RUNTIME: &str = r#"var __gz_cache = {};
function __require(id) {
  var cached = __gz_cache[id];
  if (cached) return cached.exports;
  var factory = __gz_modules[id];
  if (typeof factory !== "function") throw new Error("Module not found: " + id);
  var module = __gz_cache[id] = { exports: {} };
  factory.call(module.exports, module, module.exports, __require);
  return module.exports;
}
function __export(target, all) {
  Object.defineProperty(target, "__esModule", { value: true });
  for (var name in all) Object.defineProperty(target, name, { get: all[name], enumerable: true });
}
function __default(mod) {
  return mod && mod.__esModule ? mod.default : mod;
}
function __reexport(target, source) {
  Object.keys(source).forEach(function (key) {
    if (key === "default" || key === "__esModule" || Object.prototype.hasOwnProperty.call(target, key)) return;
    Object.defineProperty(target, key, { get: function () { return source[key]; }, enumerable: true });
  });
  return target;
}
"#;

/// Local name holding an anonymous default export.
const DEFAULT_LOCAL: &str = "__gz_default";

/// Rewrite one analyzed ES or CommonJS module into a factory body.
///
/// `targets` maps each import specifier to the expression that produces the
/// dependency's exports (`__require(3)`, or an external namespace). Uses of
/// default and named imports are rewritten to read the dependency's exports
/// on every access, which keeps them live.
pub fn link_module(
    code: &str,
    analysis: &ModuleAnalysis,
    targets: &HashMap<String, String>,
) -> String {
    let mut edits: Vec<(Range<usize>, String)> = Vec::new();
    let mut prologue = String::new();
    let mut exports: Vec<(String, String)> = Vec::new();
    let mut namespaces = 0usize;
    // Imported local -> expression reading it from the dependency
    let mut imported: HashMap<&str, String> = HashMap::new();

    let target = |spec: &str| {
        targets
            .get(spec)
            .cloned()
            .unwrap_or_else(|| format!("__require({})", json(spec)))
    };

    if let Some(hashbang) = &analysis.hashbang {
        edits.push((hashbang.clone(), String::new()));
    }

    for statement in &analysis.statements {
        let ModuleStatement::Import {
            span,
            source,
            bindings,
        } = statement
        else {
            continue;
        };
        edits.push((span.clone(), String::new()));

        if bindings.is_empty() {
            let _ = writeln!(prologue, "{};", target(source));
            continue;
        }

        let ns = format!("__gz_{}", namespaces);
        namespaces += 1;
        let _ = writeln!(prologue, "var {} = {};", ns, target(source));

        for binding in bindings {
            match binding {
                ImportBinding::Default(local) => {
                    imported.insert(local, format!("__default({})", ns));
                }
                ImportBinding::Named { imported: name, local } if name == "default" => {
                    imported.insert(local, format!("__default({})", ns));
                }
                ImportBinding::Named { imported: name, local } => {
                    imported.insert(local, member(&ns, name));
                }
                ImportBinding::Namespace(local) => {
                    let _ = writeln!(prologue, "var {} = {};", local, ns);
                }
            }
        }
    }

    for statement in &analysis.statements {
        match statement {
            ModuleStatement::Import { .. } => {}

            ModuleStatement::ExportDeclaration { prefix, names } => {
                edits.push((prefix.clone(), String::new()));
                exports.extend(names.iter().map(|n| (n.clone(), n.clone())));
            }

            ModuleStatement::ExportDefaultNamed { prefix, local } => {
                edits.push((prefix.clone(), String::new()));
                exports.push(("default".to_string(), local.clone()));
            }

            ModuleStatement::ExportDefaultValue {
                prefix,
                end,
                terminated,
            } => {
                edits.push((prefix.clone(), format!("var {} = ", DEFAULT_LOCAL)));
                if !terminated {
                    edits.push((*end..*end, ";".to_string()));
                }
                exports.push(("default".to_string(), DEFAULT_LOCAL.to_string()));
            }

            ModuleStatement::ExportList { span, specifiers } => {
                edits.push((span.clone(), String::new()));
                exports.extend(specifiers.iter().map(|(local, exported)| {
                    let value = imported
                        .get(local.as_str())
                        .cloned()
                        .unwrap_or_else(|| local.clone());
                    (exported.clone(), value)
                }));
            }

            ModuleStatement::ReexportNamed {
                span,
                source,
                specifiers,
            } => {
                edits.push((span.clone(), String::new()));
                let ns = format!("__gz_{}", namespaces);
                namespaces += 1;
                let _ = writeln!(prologue, "var {} = {};", ns, target(source));

                for (name, exported) in specifiers {
                    let value = if name == "default" {
                        format!("__default({})", ns)
                    } else {
                        member(&ns, name)
                    };
                    exports.push((exported.clone(), value));
                }
            }

            ModuleStatement::ReexportAll {
                span,
                source,
                alias,
            } => {
                edits.push((span.clone(), String::new()));
                match alias {
                    Some(alias) => {
                        let ns = format!("__gz_{}", namespaces);
                        namespaces += 1;
                        let _ = writeln!(prologue, "var {} = {};", ns, target(source));
                        exports.push((alias.clone(), ns));
                    }
                    None => {
                        let _ =
                            writeln!(prologue, "__reexport(exports, {});", target(source));
                    }
                }
            }
        }
    }

    for reference in &analysis.references {
        let Some(value) = imported.get(reference.local.as_str()) else {
            continue;
        };
        let replacement = match reference.usage {
            ReferenceUsage::Plain => value.clone(),
            ReferenceUsage::Shorthand => format!("{}: {}", reference.local, value),
            // Called without the namespace as `this`.
            ReferenceUsage::Callee => format!("(0, {})", value),
        };
        edits.push((reference.span.clone(), replacement));
    }

    for call in &analysis.requires {
        if edits.iter().any(|(range, _)| overlaps(range, &call.span)) {
            continue;
        }
        edits.push((call.span.clone(), target(&call.specifier)));
    }

    let mut header = String::new();
    if analysis.is_esm() {
        header.push_str("\"use strict\";\n");
        header.push_str("__export(exports, {");
        for (i, (name, value)) in exports.iter().enumerate() {
            if i > 0 {
                header.push(',');
            }
            let _ = write!(header, "\n  {}: () => {}", json(name), value);
        }
        if !exports.is_empty() {
            header.push('\n');
        }
        header.push_str("});\n");
    }
    header.push_str(&prologue);

    let mut body = apply_edits(code, edits);
    body.insert_str(0, &header);
    body
}

/// Apply edits to `code`. An edit starting inside an earlier one is dropped.
pub(crate) fn apply_edits(code: &str, mut edits: Vec<(Range<usize>, String)>) -> String {
    edits.sort_by_key(|(range, _)| (range.start, range.end));

    let mut out = String::with_capacity(code.len());
    let mut cursor = 0;
    for (range, replacement) in edits {
        if range.start < cursor {
            continue;
        }
        out.push_str(&code[cursor..range.start]);
        out.push_str(&replacement);
        cursor = range.end;
    }
    out.push_str(&code[cursor..]);
    out
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Property access that stays valid for non-identifier export names.
fn member(object: &str, name: &str) -> String {
    let is_ident = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');

    if is_ident {
        format!("{}.{}", object, name)
    } else {
        format!("{}[{}]", object, json(name))
    }
}

fn json(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

/// One factory ready for assembly.
#[derive(Debug, Clone)]
pub struct Factory {
    /// Display name written as a comment above the factory
    pub label: String,
    pub body: String,
}

/// Layout of the assembled bundle.
#[derive(Debug, Clone)]
pub struct Assembly<'a> {
    pub factories: &'a [Factory],
    /// Modules evaluated before the entry
    pub preload: &'a [usize],
    pub entry: usize,
    /// External specifiers, indexed by their `__gz_extN` binding
    pub externals: &'a [String],
    /// Wrap everything in an immediately invoked function
    pub iife: bool,
}

/// Concatenate factories with the runtime into one script.
pub fn assemble(assembly: &Assembly<'_>) -> String {
    let mut out = String::new();

    for (i, spec) in assembly.externals.iter().enumerate() {
        let _ = writeln!(out, "import * as {} from {};", external_binding(i), json(spec));
    }

    if assembly.iife {
        out.push_str("(function () {\n");
    }

    out.push_str("var __gz_modules = [\n");
    for factory in assembly.factories {
        let _ = writeln!(out, "// {}", factory.label);
        out.push_str("function (module, exports, require) {\n");
        out.push_str(&factory.body);
        if !factory.body.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("},\n");
    }
    out.push_str("];\n");
    out.push_str(RUNTIME);

    for id in assembly.preload {
        let _ = writeln!(out, "__require({});", id);
    }
    let _ = writeln!(out, "__require({});", assembly.entry);

    if assembly.iife {
        out.push_str("})();\n");
    }
    out
}

/// Name of the namespace binding for the n-th external import.
pub fn external_binding(index: usize) -> String {
    format!("__gz_ext{}", index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyze::analyze;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn link(code: &str, targets: &[(&str, &str)]) -> String {
        let analysis = analyze(&PathBuf::from("mod.js"), code).unwrap();
        let targets = targets
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        link_module(code, &analysis, &targets)
    }

    #[test]
    fn lowers_imports_to_registry_lookups() {
        let out = link(
            "import React, { useState } from \"react\";\nimport \"./index.css\";\nuseState(React);\n",
            &[("react", "__require(1)"), ("./index.css", "__require(2)")],
        );

        assert!(out.starts_with("\"use strict\";\n__export(exports, {});\n"));
        assert!(out.contains("var __gz_0 = __require(1);\n"));
        assert!(out.contains("__require(2);\n"));
        assert!(!out.contains("import "));
        assert!(!out.contains("var React"));
        assert!(out.ends_with("\n(0, __gz_0.useState)(__default(__gz_0));\n"));
    }

    #[test]
    fn imported_bindings_stay_live() {
        let out = link(
            "import { count, inc } from \"./counter\";\nimport * as c from \"./counter\";\ninc();\nconst o = { count };\nconsole.log(count, c.count);\nexport { count as total };\n",
            &[("./counter", "__require(1)")],
        );

        assert!(out.contains("\"total\": () => __gz_0.count"));
        assert!(out.contains("var c = __gz_1;\n"));
        assert!(out.contains("(0, __gz_0.inc)();"));
        assert!(out.contains("const o = { count: __gz_0.count };"));
        assert!(out.contains("console.log(__gz_0.count, c.count);"));
        assert!(!out.contains("var count"));
    }

    #[test]
    fn leaves_shadowed_names_alone() {
        let out = link(
            "import { el } from \"./dom\";\nfunction f(el) { return el; }\nel;\n",
            &[("./dom", "__require(1)")],
        );

        assert!(out.contains("function f(el) { return el; }"));
        assert!(out.contains("\n__gz_0.el;"));
    }

    #[test]
    fn installs_export_getters() {
        let out = link(
            "export const a = 1;\nfunction b() {}\nexport { b as c };\nexport default 5;\n",
            &[],
        );

        assert!(out.contains("\"a\": () => a"));
        assert!(out.contains("\"c\": () => b"));
        assert!(out.contains("\"default\": () => __gz_default"));
        assert!(out.contains("const a = 1;"));
        assert!(out.contains("var __gz_default = 5;"));
        assert!(!out.contains("export "));
    }

    #[test]
    fn terminates_anonymous_default_functions() {
        let out = link("export default function () {}\n", &[]);

        assert!(out.contains("var __gz_default = function () {};"));
    }

    #[test]
    fn rewrites_reexports() {
        let out = link(
            "export * from \"./a\";\nexport { default as B } from \"./b\";\n",
            &[("./a", "__require(4)"), ("./b", "__require(5)")],
        );

        assert!(out.contains("__reexport(exports, __require(4));"));
        assert!(out.contains("\"B\": () => __default(__gz_0)"));
    }

    #[test]
    fn rewrites_commonjs_requires() {
        let out = link(
            "const x = require(\"./x\");\nmodule.exports = x;\n",
            &[("./x", "__require(7)")],
        );

        assert_eq!(out, "const x = __require(7);\nmodule.exports = x;\n");
    }

    #[test]
    fn quotes_non_identifier_names() {
        assert_eq!(member("ns", "a-b"), "ns[\"a-b\"]");
        assert_eq!(member("ns", "$ok"), "ns.$ok");
    }

    #[test]
    fn assembles_iife() {
        let factories = vec![Factory {
            label: "src/main.js".into(),
            body: "console.log(1);".into(),
        }];
        let out = assemble(&Assembly {
            factories: &factories,
            preload: &[],
            entry: 0,
            externals: &[],
            iife: true,
        });

        assert!(out.starts_with("(function () {\n"));
        assert!(out.contains("// src/main.js\nfunction (module, exports, require) {\nconsole.log(1);\n},"));
        assert!(out.trim_end().ends_with("__require(0);\n})();"));
    }
}
