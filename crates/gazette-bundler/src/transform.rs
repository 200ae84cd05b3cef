//! Source transform for script dialects using oxc.
//!
//! JSX is compiled with the automatic runtime and TypeScript syntax is
//! stripped. The result is plain ES module JavaScript, still containing its
//! `import`/`export` statements for the linker.

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::{Codegen, CodegenOptions};
use oxc_parser::{ParseOptions, Parser};
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{JsxRuntime, TransformOptions, Transformer};

use crate::error::BundleError;
use crate::loader::Loader;

/// Source type the parser should use for a loader.
pub fn source_type_for(loader: Loader) -> SourceType {
    match loader {
        Loader::Ts => SourceType::ts(),
        Loader::Tsx => SourceType::tsx(),
        Loader::Jsx => SourceType::jsx(),
        _ => SourceType::mjs(),
    }
}

/// Parser settings shared by every pass over module code. CommonJS files
/// may `return` at the top level.
pub(crate) fn parse_options() -> ParseOptions {
    ParseOptions {
        allow_return_outside_function: true,
        ..ParseOptions::default()
    }
}

/// Transform one script module to plain JavaScript.
pub fn transform_script(path: &Path, source: &str, loader: Loader) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, source, source_type_for(loader))
        .with_options(parse_options())
        .parse();

    if ret.panicked || !ret.errors.is_empty() {
        return Err(BundleError::Syntax {
            path: path.to_path_buf(),
            message: join_diagnostics(&ret.errors),
        });
    }

    let mut program = ret.program;

    // Plain JavaScript needs no transform, only normalized printing.
    if !loader.has_jsx() && !loader.is_typescript() {
        return Ok(Codegen::new().build(&program).code);
    }

    let semantic = SemanticBuilder::new().build(&program);
    if !semantic.errors.is_empty() {
        return Err(BundleError::Syntax {
            path: path.to_path_buf(),
            message: join_diagnostics(&semantic.errors),
        });
    }
    let scoping = semantic.semantic.into_scoping();

    let options = transform_options(loader);
    let ret = Transformer::new(&allocator, path, &options).build_with_scoping(scoping, &mut program);

    if !ret.errors.is_empty() {
        return Err(BundleError::Transform {
            path: path.to_path_buf(),
            message: join_diagnostics(&ret.errors),
        });
    }

    Ok(Codegen::new().build(&program).code)
}

/// Reprint a complete bundle with whitespace-level minification.
pub fn minify_script(name: &Path, code: &str, source_type: SourceType) -> Result<String, BundleError> {
    let allocator = Allocator::default();
    let ret = Parser::new(&allocator, code, source_type).parse();

    if ret.panicked || !ret.errors.is_empty() {
        return Err(BundleError::Transform {
            path: name.to_path_buf(),
            message: join_diagnostics(&ret.errors),
        });
    }

    let options = CodegenOptions {
        minify: true,
        ..CodegenOptions::default()
    };

    Ok(Codegen::new().with_options(options).build(&ret.program).code)
}

fn transform_options(loader: Loader) -> TransformOptions {
    let mut options = TransformOptions::default();
    options.jsx.jsx_plugin = loader.has_jsx();
    options.jsx.runtime = JsxRuntime::Automatic;
    options.jsx.development = false;
    options
}

pub(crate) fn join_diagnostics<D: std::fmt::Display>(errors: &[D]) -> String {
    if errors.is_empty() {
        return "parser aborted".to_string();
    }

    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}
