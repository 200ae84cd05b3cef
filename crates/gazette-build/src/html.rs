//! Entry HTML finalization.
//!
//! Rewrites the source HTML so it references the production bundle:
//!
//! - the development `<script src="/src/main.jsx">` becomes the bundle tag
//! - stylesheet links are inserted before `</head>`
//! - shim scripts are inserted right after `<body>`
//!
//! Everything injected carries a `data-gazette` marker and is stripped
//! before injecting again, so finalizing twice gives the same document.

use std::sync::LazyLock;

use minijinja::{context, Environment};
use regex::Regex;

use crate::error::{BuildError, FinalizeError};

static INJECTED_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<link\b[^>]*\sdata-gazette(?:\s[^>]*)?>\n?"#).expect("Invalid link regex")
});

static INJECTED_SHIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)\n?<script\b[^>]*\sdata-gazette-shim="[^"]*"[^>]*>.*?</script>"#)
        .expect("Invalid shim regex")
});

static SCRIPT_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<script\b([^>]*)>\s*</script>"#).expect("Invalid script regex")
});

static SRC_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("Invalid src regex")
});

static MARKER_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\sdata-gazette(?:\s|/|$)"#).expect("Invalid marker regex"));

static HEAD_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</head\s*>").expect("Invalid head regex"));

static BODY_OPEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<body\b[^>]*>").expect("Invalid body regex"));

static BODY_CLOSE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</body\s*>").expect("Invalid body regex"));

// Template names carry no `.html` suffix so minijinja leaves the output
// unescaped; attribute values go through the `attr` filter instead.
const LINK_TEMPLATE: &str = r#"<link rel="stylesheet" href="{{ href | attr }}" data-gazette>"#;

const SCRIPT_TEMPLATE: &str =
    r#"<script{% if module %} type="module"{% endif %} src="{{ src | attr }}" data-gazette></script>"#;

const SHIM_TEMPLATE: &str = r#"<script data-gazette-shim="{{ name | attr }}">{{ code }}</script>"#;

const JWT_DECODE_SHIM: &str = r#"
window.jwtDecode = function (token) {
  try {
    var base64 = token.split(".")[1].replace(/-/g, "+").replace(/_/g, "/");
    var json = decodeURIComponent(atob(base64).split("").map(function (c) {
      return "%" + ("00" + c.charCodeAt(0).toString(16)).slice(-2);
    }).join(""));
    return JSON.parse(json);
  } catch (e) {
    console.error("Error decoding token:", e);
    return {};
  }
};
window.jwt_decode = window.jwtDecode;
"#;

/// Code of a shim shipped with gazette.
pub fn builtin_shim(name: &str) -> Option<&'static str> {
    match name {
        "jwt-decode" => Some(JWT_DECODE_SHIM),
        _ => None,
    }
}

/// A shim ready for injection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShimScript {
    pub name: String,
    pub code: String,
}

impl ShimScript {
    /// Validate shim code. It must not be able to close its own `<script>`.
    pub fn new(name: &str, code: String) -> Result<Self, BuildError> {
        if code.to_ascii_lowercase().contains("</script") {
            return Err(BuildError::InvalidConfig(format!(
                "shim \"{}\" contains a closing script tag",
                name
            )));
        }
        if name.contains('"') {
            return Err(BuildError::InvalidConfig(format!(
                "shim name {:?} contains a quote",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            code,
        })
    }
}

/// The bundle's `<script>` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptTag {
    pub src: String,
    /// Emit `type="module"`
    pub module: bool,
}

/// What the finalizer injects into the document.
#[derive(Debug, Clone)]
pub struct HtmlPlan {
    /// Script `src` used during development, relative to the root
    pub entry_script: String,
    /// Stylesheet hrefs, in production order
    pub stylesheets: Vec<String>,
    pub script: ScriptTag,
    pub shims: Vec<ShimScript>,
}

/// Renders injected fragments and splices them into the document.
pub struct HtmlFinalizer {
    env: Environment<'static>,
}

impl HtmlFinalizer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_filter("attr", escape_attr);

        env.add_template("link", LINK_TEMPLATE)
            .expect("Failed to add link template");
        env.add_template("script", SCRIPT_TEMPLATE)
            .expect("Failed to add script template");
        env.add_template("shim", SHIM_TEMPLATE)
            .expect("Failed to add shim template");

        Self { env }
    }

    /// Produce the final document from the pristine source HTML.
    pub fn finalize(&self, html: &str, plan: &HtmlPlan) -> Result<String, FinalizeError> {
        let html = INJECTED_LINK_RE.replace_all(html, "");
        let mut html = INJECTED_SHIM_RE.replace_all(&html, "").into_owned();

        let script = self.render(
            "script",
            context! { src => &plan.script.src, module => plan.script.module },
        )?;
        html = replace_script(&html, &plan.entry_script, &script)?;

        if !plan.stylesheets.is_empty() {
            let head = HEAD_CLOSE_RE
                .find(&html)
                .ok_or(FinalizeError::MissingHead)?
                .start();

            let mut links = String::new();
            for href in &plan.stylesheets {
                links.push_str(&self.render("link", context! { href => href })?);
                links.push('\n');
            }
            html.insert_str(head, &links);
        }

        if !plan.shims.is_empty() {
            let body = BODY_OPEN_RE
                .find(&html)
                .ok_or(FinalizeError::MissingBody)?
                .end();

            let mut shims = String::new();
            for shim in &plan.shims {
                shims.push('\n');
                shims.push_str(&self.render(
                    "shim",
                    context! { name => &shim.name, code => &shim.code },
                )?);
            }
            html.insert_str(body, &shims);
        }

        Ok(html)
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String, FinalizeError> {
        self.env
            .get_template(name)
            .and_then(|t| t.render(ctx))
            .map_err(|e| FinalizeError::Template(e.to_string()))
    }
}

impl Default for HtmlFinalizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Swap the development script (or a previously injected bundle tag) for
/// `script`. Falls back to inserting before `</body>`.
fn replace_script(html: &str, entry_script: &str, script: &str) -> Result<String, FinalizeError> {
    let entry = normalize_src(entry_script);

    let target = SCRIPT_TAG_RE.captures_iter(html).find_map(|caps| {
        let whole = caps.get(0)?;
        let attrs = caps.get(1)?.as_str();
        let src = SRC_ATTR_RE
            .captures(attrs)
            .and_then(|s| s.get(1).or_else(|| s.get(2)))
            .map(|m| m.as_str())?;

        let injected = MARKER_ATTR_RE.is_match(attrs);
        (injected || normalize_src(src) == entry).then(|| whole.range())
    });

    let mut out = html.to_string();
    match target {
        Some(range) => out.replace_range(range, script),
        None => {
            let body = BODY_CLOSE_RE
                .find(&out)
                .ok_or(FinalizeError::MissingBody)?
                .start();
            out.insert_str(body, &format!("{}\n", script));
        }
    }
    Ok(out)
}

/// `/src/main.jsx`, `./src/main.jsx` and `src/main.jsx` are the same script.
fn normalize_src(src: &str) -> &str {
    let src = src.trim();
    let src = src.strip_prefix("./").unwrap_or(src);
    src.trim_start_matches('/')
}

fn escape_attr(value: String) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SOURCE: &str = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>News</title>
  </head>
  <body>
    <div id="root"></div>
    <script type="module" src="/src/main.jsx"></script>
  </body>
</html>
"#;

    fn plan() -> HtmlPlan {
        HtmlPlan {
            entry_script: "src/main.jsx".to_string(),
            stylesheets: vec!["/index.css".to_string(), "/assets/main.css".to_string()],
            script: ScriptTag {
                src: "/assets/main.js".to_string(),
                module: true,
            },
            shims: vec![ShimScript::new("jwt-decode", "window.x = 1;".to_string()).unwrap()],
        }
    }

    #[test]
    fn rewrites_entry_document() {
        let html = HtmlFinalizer::new().finalize(SOURCE, &plan()).unwrap();

        assert_eq!(
            html,
            r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <title>News</title>
  <link rel="stylesheet" href="/index.css" data-gazette>
<link rel="stylesheet" href="/assets/main.css" data-gazette>
</head>
  <body>
<script data-gazette-shim="jwt-decode">window.x = 1;</script>
    <div id="root"></div>
    <script type="module" src="/assets/main.js" data-gazette></script>
  </body>
</html>
"#
        );
    }

    #[test]
    fn finalizing_is_idempotent() {
        let finalizer = HtmlFinalizer::new();
        let plan = plan();

        let once = finalizer.finalize(SOURCE, &plan).unwrap();
        let twice = finalizer.finalize(&once, &plan).unwrap();

        assert_eq!(once, twice);
    }

    #[test]
    fn classic_scripts_omit_module_type() {
        let mut plan = plan();
        plan.script.module = false;

        let html = HtmlFinalizer::new().finalize(SOURCE, &plan).unwrap();

        assert!(html.contains(r#"<script src="/assets/main.js" data-gazette></script>"#));
        assert!(!html.contains("/src/main.jsx"));
    }

    #[test]
    fn inserts_script_when_no_dev_tag() {
        let source = "<html><head></head><body><p>hi</p></body></html>";
        let mut plan = plan();
        plan.stylesheets.clear();
        plan.shims.clear();

        let finalizer = HtmlFinalizer::new();
        let once = finalizer.finalize(source, &plan).unwrap();

        assert_eq!(
            once,
            "<html><head></head><body><p>hi</p><script type=\"module\" src=\"/assets/main.js\" data-gazette></script>\n</body></html>"
        );
        assert_eq!(finalizer.finalize(&once, &plan).unwrap(), once);
    }

    #[test]
    fn leaves_unrelated_scripts_alone() {
        let source = "<html><head></head><body><script src=\"/analytics.js\"></script><script type=\"module\" src=\"./src/main.jsx\"></script></body></html>";
        let mut plan = plan();
        plan.stylesheets.clear();
        plan.shims.clear();

        let html = HtmlFinalizer::new().finalize(source, &plan).unwrap();

        assert!(html.contains("<script src=\"/analytics.js\"></script>"));
        assert!(html.contains("src=\"/assets/main.js\""));
        assert!(!html.contains("main.jsx"));
    }

    #[test]
    fn missing_head_is_an_error() {
        let source = "<html><body><script src=\"/src/main.jsx\"></script></body></html>";

        let result = HtmlFinalizer::new().finalize(source, &plan());

        assert!(matches!(result, Err(FinalizeError::MissingHead)));
    }

    #[test]
    fn missing_body_is_an_error() {
        let source = "<html><head></head></html>";
        let mut plan = plan();
        plan.stylesheets.clear();

        let result = HtmlFinalizer::new().finalize(source, &plan);

        assert!(matches!(result, Err(FinalizeError::MissingBody)));
    }

    #[test]
    fn escapes_attribute_values() {
        let mut plan = plan();
        plan.stylesheets = vec!["/a.css?x=1&y=\"2\"".to_string()];
        plan.shims.clear();

        let html = HtmlFinalizer::new().finalize(SOURCE, &plan).unwrap();

        assert!(html.contains(r#"href="/a.css?x=1&amp;y=&quot;2&quot;""#));
    }

    #[test]
    fn shims_cannot_close_their_script() {
        let result = ShimScript::new("bad", "alert(1)</SCRIPT>".to_string());

        assert!(matches!(result, Err(BuildError::InvalidConfig(_))));
    }

    #[test]
    fn builtin_jwt_decode_shim() {
        assert!(builtin_shim("jwt-decode").unwrap().contains("window.jwt_decode"));
        assert!(builtin_shim("nope").is_none());
    }
}
