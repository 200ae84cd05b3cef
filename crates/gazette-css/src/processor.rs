//! Stylesheet processing chain: utility expansion, then vendor prefixing.

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::LazyLock;

use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::error::StyleError;
use crate::utilities::{parse_class, resolve, ClassName, BREAKPOINTS};

static TAILWIND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@tailwind\s+([\w-]+)\s*;").expect("Invalid @tailwind regex"));

static APPLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@apply\s+([^;{}]+?)\s*(?:;|(\}))").expect("Invalid @apply regex"));

/// Reset emitted for `@tailwind base;`.
const PREFLIGHT: &str = r#"*, ::before, ::after {
  box-sizing: border-box;
  border-width: 0;
  border-style: solid;
  border-color: #e5e7eb;
}
html {
  line-height: 1.5;
  -webkit-text-size-adjust: 100%;
  font-family: ui-sans-serif, system-ui, -apple-system, "Segoe UI", Roboto, "Helvetica Neue", Arial, sans-serif;
}
body {
  margin: 0;
  line-height: inherit;
}
h1, h2, h3, h4, h5, h6 {
  font-size: inherit;
  font-weight: inherit;
}
blockquote, dl, dd, h1, h2, h3, h4, h5, h6, hr, figure, p, pre {
  margin: 0;
}
a {
  color: inherit;
  text-decoration: inherit;
}
button, input, optgroup, select, textarea {
  font-family: inherit;
  font-size: 100%;
  line-height: inherit;
  color: inherit;
  margin: 0;
  padding: 0;
}
button, [role="button"] {
  cursor: pointer;
}
ol, ul {
  list-style: none;
  margin: 0;
  padding: 0;
}
img, svg, video, canvas, audio, iframe, embed, object {
  display: block;
  vertical-align: middle;
}
img, video {
  max-width: 100%;
  height: auto;
}
"#;

/// Browser versions used for vendor prefixing. Unset entries are not targeted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserTargets {
    pub chrome: Option<u32>,
    pub edge: Option<u32>,
    pub firefox: Option<u32>,
    pub safari: Option<u32>,
    pub ios_saf: Option<u32>,
}

impl Default for BrowserTargets {
    fn default() -> Self {
        Self {
            chrome: Some(87),
            edge: Some(88),
            firefox: Some(78),
            safari: Some(14),
            ios_saf: Some(14),
        }
    }
}

impl BrowserTargets {
    fn to_targets(&self) -> Targets {
        let version = |major: Option<u32>| major.map(|v| v << 16);
        Targets::from(Browsers {
            chrome: version(self.chrome),
            edge: version(self.edge),
            firefox: version(self.firefox),
            safari: version(self.safari),
            ios_saf: version(self.ios_saf),
            ..Browsers::default()
        })
    }
}

/// Processes stylesheet sources into deployable CSS.
#[derive(Debug, Clone, Default)]
pub struct StyleProcessor {
    targets: BrowserTargets,
    minify: bool,
    classes: BTreeSet<String>,
}

impl StyleProcessor {
    pub fn new(targets: BrowserTargets, minify: bool) -> Self {
        Self {
            targets,
            minify,
            classes: BTreeSet::new(),
        }
    }

    /// Utility classes found in content, emitted by `@tailwind utilities`.
    pub fn with_classes(mut self, classes: BTreeSet<String>) -> Self {
        self.classes = classes;
        self
    }

    /// Run the full chain over one stylesheet. `name` is used in errors.
    pub fn process(&self, name: &str, source: &str) -> Result<String, StyleError> {
        let expanded = self.expand(name, source)?;
        self.prefix(name, &expanded)
    }

    /// Expand `@tailwind` layers and `@apply` rules.
    pub fn expand(&self, name: &str, source: &str) -> Result<String, StyleError> {
        let mut keyframes: BTreeSet<&'static str> = BTreeSet::new();

        let applied = expand_apply(name, source, &mut keyframes)?;

        let mut error = None;
        let expanded = TAILWIND_RE.replace_all(&applied, |caps: &Captures| match &caps[1] {
            "base" => PREFLIGHT.to_string(),
            "components" => String::new(),
            "utilities" => self.utilities(&mut keyframes),
            other => {
                error.get_or_insert_with(|| StyleError::UnknownLayer {
                    name: name.to_string(),
                    layer: other.to_string(),
                });
                String::new()
            }
        });

        if let Some(e) = error {
            return Err(e);
        }

        let mut out = expanded.into_owned();
        for frames in keyframes {
            if !out.contains(frames) {
                out.push_str(frames);
            }
        }
        Ok(out)
    }

    /// Generate rules for all scanned classes: base rules first, then one
    /// media block per breakpoint.
    fn utilities(&self, keyframes: &mut BTreeSet<&'static str>) -> String {
        let parsed: Vec<ClassName<'_>> = self
            .classes
            .iter()
            .filter_map(|c| parse_class(c))
            .collect();

        let mut out = String::new();
        for class in parsed.iter().filter(|c| c.breakpoint.is_none()) {
            out.push_str(&class.render(""));
            keyframes.extend(class.utility.keyframes);
        }

        for (bp, width) in BREAKPOINTS {
            let group: Vec<&ClassName<'_>> = parsed
                .iter()
                .filter(|c| c.breakpoint.is_some_and(|(name, _)| name == *bp))
                .collect();
            if group.is_empty() {
                continue;
            }

            let _ = writeln!(out, "@media (min-width: {}px) {{", width);
            for class in group {
                out.push_str(&class.render("  "));
                keyframes.extend(class.utility.keyframes);
            }
            out.push_str("}\n");
        }
        out
    }

    /// Parse with lightningcss and print with vendor prefixes for the targets.
    pub fn prefix(&self, name: &str, css: &str) -> Result<String, StyleError> {
        let targets = self.targets.to_targets();

        let mut sheet = StyleSheet::parse(
            css,
            ParserOptions {
                filename: name.to_string(),
                ..ParserOptions::default()
            },
        )
        .map_err(|e| StyleError::Parse {
            name: name.to_string(),
            message: e.to_string(),
        })?;

        sheet
            .minify(MinifyOptions {
                targets,
                ..MinifyOptions::default()
            })
            .map_err(|e| StyleError::Transform {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let printed = sheet
            .to_css(PrinterOptions {
                minify: self.minify,
                targets,
                ..PrinterOptions::default()
            })
            .map_err(|e| StyleError::Transform {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        Ok(printed.code)
    }
}

/// Replace each `@apply a b c;` with the utilities' declarations.
fn expand_apply(
    name: &str,
    source: &str,
    keyframes: &mut BTreeSet<&'static str>,
) -> Result<String, StyleError> {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;

    for caps in APPLY_RE.captures_iter(source) {
        let (Some(whole), Some(list)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        out.push_str(&source[cursor..whole.start()]);

        let mut declarations = Vec::new();
        for class in list.as_str().split_whitespace() {
            let class = class.trim_end_matches("!important");
            let utility = resolve(class).ok_or_else(|| StyleError::UnknownUtility {
                name: name.to_string(),
                class: class.to_string(),
            })?;
            if utility.nested.is_some() {
                return Err(StyleError::UnknownUtility {
                    name: name.to_string(),
                    class: class.to_string(),
                });
            }
            keyframes.extend(utility.keyframes);
            declarations.extend(utility.declarations);
        }

        let rendered = declarations
            .iter()
            .map(|(property, value)| format!("{}: {};", property, value))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&rendered);

        // Keep a closing brace swallowed by an unterminated `@apply`.
        if caps.get(2).is_some() {
            out.push_str(" }");
        }
        cursor = whole.end();
    }

    out.push_str(&source[cursor..]);
    Ok(out)
}
