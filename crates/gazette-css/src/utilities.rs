//! Utility-class vocabulary.
//!
//! A class name such as `md:hover:bg-blue-500` is split into its variants
//! (`md`, `hover`) and a utility (`bg-blue-500`). Utilities resolve to a list
//! of declarations, optionally applied to a nested selector.

use std::fmt::Write as _;

/// Media breakpoints, in output order.
pub const BREAKPOINTS: &[(&str, u32)] = &[("sm", 640), ("md", 768), ("lg", 1024), ("xl", 1280)];

/// Keyframes required by `animate-spin`.
pub const SPIN_KEYFRAMES: &str = "@keyframes spin {\n  to {\n    transform: rotate(360deg);\n  }\n}\n";

/// Child selector used by the `space-x-*` and `space-y-*` utilities.
const SPACE_CHILDREN: &str = " > :not([hidden]) ~ :not([hidden])";

/// Resolved declarations for one utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utility {
    pub declarations: Vec<(&'static str, String)>,
    /// Appended to the class selector (`space-y-4`)
    pub nested: Option<&'static str>,
    /// Extra top-level rules the utility depends on
    pub keyframes: Option<&'static str>,
}

impl Utility {
    fn new(declarations: Vec<(&'static str, String)>) -> Self {
        Self {
            declarations,
            nested: None,
            keyframes: None,
        }
    }

    fn one(property: &'static str, value: impl Into<String>) -> Self {
        Self::new(vec![(property, value.into())])
    }
}

/// A class name split into variants and utility.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassName<'a> {
    pub class: &'a str,
    pub breakpoint: Option<(&'static str, u32)>,
    pub pseudo: Vec<&'static str>,
    pub utility: Utility,
}

/// Parse a full class name, including variants. Returns `None` for anything
/// outside the vocabulary.
pub fn parse_class(class: &str) -> Option<ClassName<'_>> {
    let mut parts: Vec<&str> = class.split(':').collect();
    let base = parts.pop()?;

    let mut breakpoint = None;
    let mut pseudo = Vec::new();
    for variant in parts {
        match variant {
            "hover" => pseudo.push(":hover"),
            "focus" => pseudo.push(":focus"),
            other => {
                let bp = BREAKPOINTS.iter().find(|(name, _)| *name == other)?;
                if breakpoint.is_some() {
                    return None;
                }
                breakpoint = Some(*bp);
            }
        }
    }

    Some(ClassName {
        class,
        breakpoint,
        pseudo,
        utility: resolve(base)?,
    })
}

impl ClassName<'_> {
    /// Render the rule for this class, without any media wrapper.
    pub fn render(&self, indent: &str) -> String {
        let mut selector = format!(".{}", escape_class(self.class));
        for pseudo in &self.pseudo {
            selector.push_str(pseudo);
        }
        if let Some(nested) = self.utility.nested {
            selector.push_str(nested);
        }

        let mut out = String::new();
        let _ = writeln!(out, "{}{} {{", indent, selector);
        for (property, value) in &self.utility.declarations {
            let _ = writeln!(out, "{}  {}: {};", indent, property, value);
        }
        let _ = writeln!(out, "{}}}", indent);
        out
    }
}

/// Escape a class name for use in a selector.
pub fn escape_class(class: &str) -> String {
    let mut out = String::with_capacity(class.len());
    for (i, c) in class.chars().enumerate() {
        match c {
            ':' | '/' | '.' | '[' | ']' | '%' | '#' | '(' | ')' | ',' => {
                out.push('\\');
                out.push(c);
            }
            '0'..='9' if i == 0 => {
                let _ = write!(out, "\\3{} ", c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Resolve a utility without variants.
pub fn resolve(name: &str) -> Option<Utility> {
    if let Some(u) = keyword(name) {
        return Some(u);
    }

    let (prefix, value) = split_utility(name)?;
    match prefix {
        "p" | "px" | "py" | "pt" | "pr" | "pb" | "pl" => box_side("padding", prefix, value),
        "m" | "mx" | "my" | "mt" | "mr" | "mb" | "ml" => box_side("margin", prefix, value),
        "space-x" => {
            let v = spacing(value)?;
            Some(Utility {
                declarations: vec![("margin-left", v)],
                nested: Some(SPACE_CHILDREN),
                keyframes: None,
            })
        }
        "space-y" => {
            let v = spacing(value)?;
            Some(Utility {
                declarations: vec![("margin-top", v)],
                nested: Some(SPACE_CHILDREN),
                keyframes: None,
            })
        }
        "gap" => spacing(value).map(|v| Utility::one("gap", v)),
        "gap-x" => spacing(value).map(|v| Utility::one("column-gap", v)),
        "gap-y" => spacing(value).map(|v| Utility::one("row-gap", v)),
        "w" => size(value, "100vw").map(|v| Utility::one("width", v)),
        "h" => size(value, "100vh").map(|v| Utility::one("height", v)),
        "min-h" => match value {
            "0" => Some(Utility::one("min-height", "0px")),
            "full" => Some(Utility::one("min-height", "100%")),
            "screen" => Some(Utility::one("min-height", "100vh")),
            _ => None,
        },
        "min-w" => match value {
            "0" => Some(Utility::one("min-width", "0px")),
            "full" => Some(Utility::one("min-width", "100%")),
            _ => None,
        },
        "max-w" => max_width(value).map(|v| Utility::one("max-width", v)),
        "top" | "right" | "bottom" | "left" => inset_value(value).map(|v| Utility::one(side_property(prefix), v)),
        "inset" => inset_value(value).map(|v| {
            Utility::new(vec![
                ("top", v.clone()),
                ("right", v.clone()),
                ("bottom", v.clone()),
                ("left", v),
            ])
        }),
        "inset-x" => inset_value(value).map(|v| Utility::new(vec![("left", v.clone()), ("right", v)])),
        "inset-y" => inset_value(value).map(|v| Utility::new(vec![("top", v.clone()), ("bottom", v)])),
        "z" => match value {
            "auto" => Some(Utility::one("z-index", "auto")),
            "0" | "10" | "20" | "30" | "40" | "50" => Some(Utility::one("z-index", value)),
            _ => None,
        },
        "opacity" => {
            let n: u32 = value.parse().ok()?;
            if n > 100 || n % 5 != 0 {
                return None;
            }
            Some(Utility::one("opacity", trim_number(n as f64 / 100.0)))
        }
        "grid-cols" => {
            let n: u32 = value.parse().ok()?;
            (1..=12).contains(&n).then(|| {
                Utility::one("grid-template-columns", format!("repeat({}, minmax(0, 1fr))", n))
            })
        }
        "col-span" => {
            if value == "full" {
                return Some(Utility::one("grid-column", "1 / -1"));
            }
            let n: u32 = value.parse().ok()?;
            (1..=12).contains(&n).then(|| Utility::one("grid-column", format!("span {} / span {}", n, n)))
        }
        "text" => font_size(value)
            .or_else(|| color(value).map(|c| Utility::one("color", c))),
        "bg" => color(value).map(|c| Utility::one("background-color", c)),
        "border" => border(value),
        "rounded" => radius(value).map(|v| Utility::one("border-radius", v)),
        "rounded-t" => radius(value).map(|v| {
            Utility::new(vec![
                ("border-top-left-radius", v.to_string()),
                ("border-top-right-radius", v.to_string()),
            ])
        }),
        "rounded-b" => radius(value).map(|v| {
            Utility::new(vec![
                ("border-bottom-right-radius", v.to_string()),
                ("border-bottom-left-radius", v.to_string()),
            ])
        }),
        "shadow" => shadow(value).map(|v| Utility::one("box-shadow", v)),
        "font" => font_weight(value).map(|v| Utility::one("font-weight", v)),
        "leading" => line_height(value).map(|v| Utility::one("line-height", v)),
        "tracking" => letter_spacing(value).map(|v| Utility::one("letter-spacing", v)),
        "items" => align(value, false).map(|v| Utility::one("align-items", v)),
        "self" => align(value, true).map(|v| Utility::one("align-self", v)),
        "justify" => justify(value).map(|v| Utility::one("justify-content", v)),
        "overflow" | "overflow-x" | "overflow-y" => match value {
            "auto" | "hidden" | "visible" | "scroll" => {
                let property = match prefix {
                    "overflow-x" => "overflow-x",
                    "overflow-y" => "overflow-y",
                    _ => "overflow",
                };
                Some(Utility::one(property, value))
            }
            _ => None,
        },
        "cursor" => match value {
            "auto" | "default" | "pointer" | "wait" | "text" | "move" | "not-allowed" => {
                Some(Utility::one("cursor", value))
            }
            _ => None,
        },
        "duration" => {
            let ms: u32 = value.parse().ok()?;
            Some(Utility::one("transition-duration", format!("{}ms", ms)))
        }
        _ => None,
    }
}

/// Utilities whose whole name is a keyword.
fn keyword(name: &str) -> Option<Utility> {
    let u = match name {
        "block" => Utility::one("display", "block"),
        "inline-block" => Utility::one("display", "inline-block"),
        "inline" => Utility::one("display", "inline"),
        "flex" => Utility::one("display", "flex"),
        "inline-flex" => Utility::one("display", "inline-flex"),
        "grid" => Utility::one("display", "grid"),
        "table" => Utility::one("display", "table"),
        "hidden" => Utility::one("display", "none"),
        "flex-row" => Utility::one("flex-direction", "row"),
        "flex-row-reverse" => Utility::one("flex-direction", "row-reverse"),
        "flex-col" => Utility::one("flex-direction", "column"),
        "flex-col-reverse" => Utility::one("flex-direction", "column-reverse"),
        "flex-wrap" => Utility::one("flex-wrap", "wrap"),
        "flex-nowrap" => Utility::one("flex-wrap", "nowrap"),
        "flex-1" => Utility::one("flex", "1 1 0%"),
        "flex-auto" => Utility::one("flex", "1 1 auto"),
        "flex-none" => Utility::one("flex", "none"),
        "flex-grow" => Utility::one("flex-grow", "1"),
        "flex-shrink-0" => Utility::one("flex-shrink", "0"),
        "static" | "fixed" | "absolute" | "relative" | "sticky" => Utility::one("position", name),
        "uppercase" => Utility::one("text-transform", "uppercase"),
        "lowercase" => Utility::one("text-transform", "lowercase"),
        "capitalize" => Utility::one("text-transform", "capitalize"),
        "italic" => Utility::one("font-style", "italic"),
        "not-italic" => Utility::one("font-style", "normal"),
        "underline" => Utility::one("text-decoration", "underline"),
        "line-through" => Utility::one("text-decoration", "line-through"),
        "no-underline" => Utility::one("text-decoration", "none"),
        "antialiased" => Utility::new(vec![
            ("-webkit-font-smoothing", "antialiased".into()),
            ("-moz-osx-font-smoothing", "grayscale".into()),
        ]),
        "whitespace-nowrap" => Utility::one("white-space", "nowrap"),
        "whitespace-pre-wrap" => Utility::one("white-space", "pre-wrap"),
        "break-words" => Utility::one("overflow-wrap", "break-word"),
        "truncate" => Utility::new(vec![
            ("overflow", "hidden".into()),
            ("text-overflow", "ellipsis".into()),
            ("white-space", "nowrap".into()),
        ]),
        "select-none" => Utility::one("user-select", "none"),
        "pointer-events-none" => Utility::one("pointer-events", "none"),
        "outline-none" => Utility::new(vec![
            ("outline", "2px solid transparent".into()),
            ("outline-offset", "2px".into()),
        ]),
        "object-cover" => Utility::one("object-fit", "cover"),
        "object-contain" => Utility::one("object-fit", "contain"),
        "transition" => Utility::new(vec![
            (
                "transition-property",
                "background-color, border-color, color, fill, stroke, opacity, box-shadow, transform".into(),
            ),
            ("transition-timing-function", "cubic-bezier(0.4, 0, 0.2, 1)".into()),
            ("transition-duration", "150ms".into()),
        ]),
        "transition-colors" => Utility::new(vec![
            ("transition-property", "background-color, border-color, color, fill, stroke".into()),
            ("transition-timing-function", "cubic-bezier(0.4, 0, 0.2, 1)".into()),
            ("transition-duration", "150ms".into()),
        ]),
        "animate-spin" => Utility {
            declarations: vec![("animation", "spin 1s linear infinite".into())],
            nested: None,
            keyframes: Some(SPIN_KEYFRAMES),
        },
        "container" => Utility::one("width", "100%"),
        "sr-only" => Utility::new(vec![
            ("position", "absolute".into()),
            ("width", "1px".into()),
            ("height", "1px".into()),
            ("padding", "0".into()),
            ("margin", "-1px".into()),
            ("overflow", "hidden".into()),
            ("clip", "rect(0, 0, 0, 0)".into()),
            ("white-space", "nowrap".into()),
            ("border-width", "0".into()),
        ]),
        _ => return None,
    };
    Some(u)
}

/// Split `px-4` into (`px`, `4`), `grid-cols-3` into (`grid-cols`, `3`),
/// `bg-blue-500` into (`bg`, `blue-500`).
fn split_utility(name: &str) -> Option<(&str, &str)> {
    const PREFIXES: &[&str] = &[
        "space-x", "space-y", "gap-x", "gap-y", "min-h", "min-w", "max-w", "inset-x", "inset-y",
        "grid-cols", "col-span", "rounded-t", "rounded-b", "overflow-x", "overflow-y",
    ];

    for prefix in PREFIXES {
        if let Some(rest) = name.strip_prefix(prefix) {
            if let Some(value) = rest.strip_prefix('-') {
                return Some((prefix, value));
            }
            if rest.is_empty() {
                return Some((prefix, ""));
            }
        }
    }

    match name.split_once('-') {
        Some((prefix, value)) => Some((prefix, value)),
        None => Some((name, "")),
    }
}

fn box_side(property: &'static str, prefix: &str, value: &str) -> Option<Utility> {
    let v = if value == "auto" && property == "margin" {
        "auto".to_string()
    } else {
        spacing(value)?
    };

    let sides: &[&'static str] = match (property, &prefix[1..]) {
        ("padding", "") => &["padding"],
        ("padding", "x") => &["padding-left", "padding-right"],
        ("padding", "y") => &["padding-top", "padding-bottom"],
        ("padding", "t") => &["padding-top"],
        ("padding", "r") => &["padding-right"],
        ("padding", "b") => &["padding-bottom"],
        ("padding", "l") => &["padding-left"],
        ("margin", "") => &["margin"],
        ("margin", "x") => &["margin-left", "margin-right"],
        ("margin", "y") => &["margin-top", "margin-bottom"],
        ("margin", "t") => &["margin-top"],
        ("margin", "r") => &["margin-right"],
        ("margin", "b") => &["margin-bottom"],
        ("margin", "l") => &["margin-left"],
        _ => return None,
    };

    Some(Utility::new(sides.iter().map(|s| (*s, v.clone())).collect()))
}

/// Spacing scale: `4` -> `1rem`, `px` -> `1px`.
fn spacing(value: &str) -> Option<String> {
    const SCALE: &[f64] = &[
        0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 14.0,
        16.0, 20.0, 24.0, 28.0, 32.0, 36.0, 40.0, 44.0, 48.0, 52.0, 56.0, 60.0, 64.0, 72.0, 80.0,
        96.0,
    ];

    match value {
        "0" => Some("0px".to_string()),
        "px" => Some("1px".to_string()),
        _ => {
            let n: f64 = value.parse().ok()?;
            SCALE
                .contains(&n)
                .then(|| format!("{}rem", trim_number(n * 0.25)))
        }
    }
}

fn size(value: &str, screen: &str) -> Option<String> {
    match value {
        "full" => Some("100%".to_string()),
        "screen" => Some(screen.to_string()),
        "auto" => Some("auto".to_string()),
        "min" => Some("min-content".to_string()),
        "max" => Some("max-content".to_string()),
        _ => {
            if let Some((a, b)) = value.split_once('/') {
                let a: f64 = a.parse().ok()?;
                let b: f64 = b.parse().ok()?;
                if b == 0.0 || a >= b {
                    return None;
                }
                return Some(format!("{}%", trim_number(a / b * 100.0)));
            }
            spacing(value)
        }
    }
}

fn max_width(value: &str) -> Option<&'static str> {
    Some(match value {
        "none" => "none",
        "xs" => "20rem",
        "sm" => "24rem",
        "md" => "28rem",
        "lg" => "32rem",
        "xl" => "36rem",
        "2xl" => "42rem",
        "3xl" => "48rem",
        "4xl" => "56rem",
        "5xl" => "64rem",
        "6xl" => "72rem",
        "7xl" => "80rem",
        "full" => "100%",
        "prose" => "65ch",
        _ => return None,
    })
}

fn side_property(side: &str) -> &'static str {
    match side {
        "top" => "top",
        "right" => "right",
        "bottom" => "bottom",
        _ => "left",
    }
}

fn inset_value(value: &str) -> Option<String> {
    match value {
        "auto" => Some("auto".to_string()),
        "full" => Some("100%".to_string()),
        _ => spacing(value),
    }
}

fn font_size(value: &str) -> Option<Utility> {
    let (size, line) = match value {
        "xs" => ("0.75rem", "1rem"),
        "sm" => ("0.875rem", "1.25rem"),
        "base" => ("1rem", "1.5rem"),
        "lg" => ("1.125rem", "1.75rem"),
        "xl" => ("1.25rem", "1.75rem"),
        "2xl" => ("1.5rem", "2rem"),
        "3xl" => ("1.875rem", "2.25rem"),
        "4xl" => ("2.25rem", "2.5rem"),
        "5xl" => ("3rem", "1"),
        "6xl" => ("3.75rem", "1"),
        "left" | "center" | "right" | "justify" => {
            return Some(Utility::one("text-align", value));
        }
        _ => return None,
    };
    Some(Utility::new(vec![
        ("font-size", size.to_string()),
        ("line-height", line.to_string()),
    ]))
}

fn font_weight(value: &str) -> Option<&'static str> {
    Some(match value {
        "thin" => "100",
        "light" => "300",
        "normal" => "400",
        "medium" => "500",
        "semibold" => "600",
        "bold" => "700",
        "extrabold" => "800",
        "black" => "900",
        _ => return None,
    })
}

fn line_height(value: &str) -> Option<&'static str> {
    Some(match value {
        "none" => "1",
        "tight" => "1.25",
        "snug" => "1.375",
        "normal" => "1.5",
        "relaxed" => "1.625",
        "loose" => "2",
        _ => return None,
    })
}

fn letter_spacing(value: &str) -> Option<&'static str> {
    Some(match value {
        "tighter" => "-0.05em",
        "tight" => "-0.025em",
        "normal" => "0em",
        "wide" => "0.025em",
        "wider" => "0.05em",
        "widest" => "0.1em",
        _ => return None,
    })
}

fn align(value: &str, allow_auto: bool) -> Option<&'static str> {
    Some(match value {
        "start" => "flex-start",
        "end" => "flex-end",
        "center" => "center",
        "baseline" => "baseline",
        "stretch" => "stretch",
        "auto" if allow_auto => "auto",
        _ => return None,
    })
}

fn justify(value: &str) -> Option<&'static str> {
    Some(match value {
        "start" => "flex-start",
        "end" => "flex-end",
        "center" => "center",
        "between" => "space-between",
        "around" => "space-around",
        "evenly" => "space-evenly",
        _ => return None,
    })
}

fn border(value: &str) -> Option<Utility> {
    let width = |w: &str| Utility::one("border-width", w);
    match value {
        "" => Some(width("1px")),
        "0" => Some(width("0px")),
        "2" => Some(width("2px")),
        "4" => Some(width("4px")),
        "8" => Some(width("8px")),
        "t" => Some(Utility::one("border-top-width", "1px")),
        "b" => Some(Utility::one("border-bottom-width", "1px")),
        "l" => Some(Utility::one("border-left-width", "1px")),
        "r" => Some(Utility::one("border-right-width", "1px")),
        "solid" | "dashed" | "dotted" | "none" => Some(Utility::one("border-style", value)),
        _ => color(value).map(|c| Utility::one("border-color", c)),
    }
}

fn radius(value: &str) -> Option<&'static str> {
    Some(match value {
        "" => "0.25rem",
        "none" => "0px",
        "sm" => "0.125rem",
        "md" => "0.375rem",
        "lg" => "0.5rem",
        "xl" => "0.75rem",
        "2xl" => "1rem",
        "3xl" => "1.5rem",
        "full" => "9999px",
        _ => return None,
    })
}

fn shadow(value: &str) -> Option<&'static str> {
    Some(match value {
        "sm" => "0 1px 2px 0 rgba(0, 0, 0, 0.05)",
        "" => "0 1px 3px 0 rgba(0, 0, 0, 0.1), 0 1px 2px 0 rgba(0, 0, 0, 0.06)",
        "md" => "0 4px 6px -1px rgba(0, 0, 0, 0.1), 0 2px 4px -1px rgba(0, 0, 0, 0.06)",
        "lg" => "0 10px 15px -3px rgba(0, 0, 0, 0.1), 0 4px 6px -2px rgba(0, 0, 0, 0.05)",
        "xl" => "0 20px 25px -5px rgba(0, 0, 0, 0.1), 0 10px 10px -5px rgba(0, 0, 0, 0.04)",
        "2xl" => "0 25px 50px -12px rgba(0, 0, 0, 0.25)",
        "inner" => "inset 0 2px 4px 0 rgba(0, 0, 0, 0.06)",
        "none" => "0 0 #0000",
        _ => return None,
    })
}

/// Palette lookup: `blue-500` -> `#3b82f6`.
pub fn color(value: &str) -> Option<&'static str> {
    match value {
        "white" => return Some("#ffffff"),
        "black" => return Some("#000000"),
        "transparent" => return Some("transparent"),
        "current" => return Some("currentColor"),
        _ => {}
    }

    let (hue, shade) = value.split_once('-')?;
    let shades: &[&'static str; 10] = match hue {
        "gray" => &[
            "#f9fafb", "#f3f4f6", "#e5e7eb", "#d1d5db", "#9ca3af", "#6b7280", "#4b5563", "#374151",
            "#1f2937", "#111827",
        ],
        "red" => &[
            "#fef2f2", "#fee2e2", "#fecaca", "#fca5a5", "#f87171", "#ef4444", "#dc2626", "#b91c1c",
            "#991b1b", "#7f1d1d",
        ],
        "yellow" => &[
            "#fffbeb", "#fef3c7", "#fde68a", "#fcd34d", "#fbbf24", "#f59e0b", "#d97706", "#b45309",
            "#92400e", "#78350f",
        ],
        "green" => &[
            "#ecfdf5", "#d1fae5", "#a7f3d0", "#6ee7b7", "#34d399", "#10b981", "#059669", "#047857",
            "#065f46", "#064e3b",
        ],
        "blue" => &[
            "#eff6ff", "#dbeafe", "#bfdbfe", "#93c5fd", "#60a5fa", "#3b82f6", "#2563eb", "#1d4ed8",
            "#1e40af", "#1e3a8a",
        ],
        "indigo" => &[
            "#eef2ff", "#e0e7ff", "#c7d2fe", "#a5b4fc", "#818cf8", "#6366f1", "#4f46e5", "#4338ca",
            "#3730a3", "#312e81",
        ],
        _ => return None,
    };

    let index = match shade {
        "50" => 0,
        "100" => 1,
        "200" => 2,
        "300" => 3,
        "400" => 4,
        "500" => 5,
        "600" => 6,
        "700" => 7,
        "800" => 8,
        "900" => 9,
        _ => return None,
    };
    Some(shades[index])
}

/// Shortest decimal rendering: `1.0` -> `1`, `0.125` -> `0.125`.
fn trim_number(n: f64) -> String {
    let s = format!("{:.6}", n);
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s.is_empty() || s == "-" {
        "0".to_string()
    } else {
        s.to_string()
    }
}
