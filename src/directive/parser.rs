//! Directive recognition over free-form model output.
//!
//! Two coordinate dialects are in circulation and may even be mixed inside one
//! reply:
//!
//! * box dialect: `click(start_box='(500,300)')`, coordinates on a 0–1000 grid
//! * legacy dialect: `click(812,436)`, coordinates in physical pixels
//!
//! Each dialect is a [`Strategy`]. Strategies scan the whole text independently;
//! the candidates are then merged by position so the output follows the text
//! character by character. At equal offsets the earlier strategy in
//! [`STRATEGIES`] wins, and a candidate overlapping an accepted one is dropped.

use once_cell::sync::Lazy;

use regex::{Captures, Regex};

use crate::directive::types::{Action, Directive, KeyCombo, Point, ScrollDirection};

/// Box value: optional quotes, optional `<|box_start|>` markers, `(..)` or `[..]`.
const BOX_VALUE: &str =
    r#"['"]?((?:<\|box_start\|>)?[\(\[][^\)\]]*[\)\]](?:<\|box_end\|>)?)['"]?"#;
const DIRECTION: &str = r#"direction\s*=\s*['"](up|down|left|right)['"]"#;

static BOX_COORDS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\(\[]\s*(\d+)\s*,\s*(\d+)\s*(?:,\s*(\d+)\s*,\s*(\d+)\s*)?[\)\]]")
        .expect("static regex")
});

static BOX_POINTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(click|left_double|right_single)\(\s*start_box\s*=\s*{BOX_VALUE}\s*\)"
    ))
    .expect("static regex")
});

static BOX_DRAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\bdrag\(\s*start_box\s*=\s*{BOX_VALUE}\s*,\s*end_box\s*=\s*{BOX_VALUE}\s*\)"
    ))
    .expect("static regex")
});

static BOX_SCROLL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\bscroll\(\s*start_box\s*=\s*{BOX_VALUE}\s*,\s*{DIRECTION}\s*\)"
    ))
    .expect("static regex")
});

static LEGACY_POINTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(click|left_double|right_single)\(\s*(\d+)\s*,\s*(\d+)\s*\)")
        .expect("static regex")
});

static LEGACY_DRAG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\bdrag[\(\[]\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)\s*,\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)\s*[\)\]]",
    )
    .expect("static regex")
});

static LEGACY_SCROLL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\bscroll\(\s*\(\s*(\d+)\s*,\s*(\d+)\s*\)\s*,\s*{DIRECTION}\s*\)"
    ))
    .expect("static regex")
});

static HOTKEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\bhotkey\(\s*key\s*=\s*['"]([^'"]+)['"]\s*\)"#).expect("static regex")
});

/// Escaped single- or double-quoted content first. When the model leaves an
/// apostrophe unescaped (`type(content='it's done')`) the last alternative takes
/// everything up to the first `'` that is followed by `)`.
static TYPE_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r#"\btype\(\s*content\s*=\s*"#,
        r#"(?:'((?:[^'\\]|\\.)*)'\s*\)"#,
        r#"|"((?:[^"\\]|\\.)*)"\s*\)"#,
        r#"|'(.*?)'\s*\))"#,
    ))
    .expect("static regex")
});

// Markers are plain substrings: no word boundary on purpose.
static MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"wait\(\)|call_user\(\)|finished\((?:\s*content\s*=\s*'(?:[^'\\]|\\.)*'\s*)?\)"#)
        .expect("static regex")
});

/// Which textual syntax produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    BoxDialect,
    LegacyDialect,
    Common,
}

/// Fixed priority order.
pub const STRATEGIES: [Strategy; 3] = [
    Strategy::BoxDialect,
    Strategy::LegacyDialect,
    Strategy::Common,
];

struct Candidate {
    start: usize,
    end: usize,
    priority: usize,
    action: Action,
}

impl Strategy {
    fn scan(self, text: &str, priority: usize, out: &mut Vec<Candidate>) {
        let mut push = |caps: &Captures<'_>, action: Option<Action>| {
            if let (Some(action), Some(m)) = (action, caps.get(0)) {
                out.push(Candidate { start: m.start(), end: m.end(), priority, action });
            }
        };
        match self {
            Strategy::BoxDialect => {
                for caps in BOX_POINTER.captures_iter(text) {
                    let action = parse_box(&caps[2]).map(|at| pointer_action(&caps[1], at));
                    push(&caps, action);
                }
                for caps in BOX_DRAG.captures_iter(text) {
                    let action = parse_box(&caps[1])
                        .zip(parse_box(&caps[2]))
                        .map(|(from, to)| Action::Drag { from, to });
                    push(&caps, action);
                }
                for caps in BOX_SCROLL.captures_iter(text) {
                    let action = parse_box(&caps[1])
                        .zip(ScrollDirection::from_name(&caps[2]))
                        .map(|(at, direction)| Action::Scroll { at, direction });
                    push(&caps, action);
                }
            }
            Strategy::LegacyDialect => {
                for caps in LEGACY_POINTER.captures_iter(text) {
                    let action = screen_point(&caps, 2).map(|at| pointer_action(&caps[1], at));
                    push(&caps, action);
                }
                for caps in LEGACY_DRAG.captures_iter(text) {
                    let action = screen_point(&caps, 1)
                        .zip(screen_point(&caps, 3))
                        .map(|(from, to)| Action::Drag { from, to });
                    push(&caps, action);
                }
                for caps in LEGACY_SCROLL.captures_iter(text) {
                    let action = screen_point(&caps, 1)
                        .zip(ScrollDirection::from_name(&caps[3]))
                        .map(|(at, direction)| Action::Scroll { at, direction });
                    push(&caps, action);
                }
            }
            Strategy::Common => {
                for caps in HOTKEY.captures_iter(text) {
                    let action = KeyCombo::parse(&caps[1]).map(|combo| Action::Hotkey { combo });
                    push(&caps, action);
                }
                for caps in TYPE_TEXT.captures_iter(text) {
                    let body = caps
                        .get(1)
                        .or_else(|| caps.get(2))
                        .or_else(|| caps.get(3))
                        .map_or("", |m| m.as_str());
                    let action = Some(Action::TypeText { content: unescape(body) });
                    push(&caps, action);
                }
                for caps in MARKER.captures_iter(text) {
                    let action = match &caps[0] {
                        "wait()" => Action::Wait,
                        "call_user()" => Action::CallUser,
                        _ => Action::Finished,
                    };
                    push(&caps, Some(action));
                }
            }
        }
    }
}

/// Extracts every directive in `text`, in textual order. Returns an empty list
/// when nothing actionable is present.
pub fn parse(text: &str) -> Vec<Directive> {
    let mut candidates = Vec::new();
    for (priority, strategy) in STRATEGIES.iter().enumerate() {
        strategy.scan(text, priority, &mut candidates);
    }
    candidates.sort_by_key(|c| (c.start, c.priority));

    let mut directives = Vec::with_capacity(candidates.len());
    let mut cursor = 0;
    for c in candidates {
        if c.start < cursor {
            tracing::trace!(start = c.start, action = c.action.name(), "overlapping candidate dropped");
            continue;
        }
        cursor = c.end;
        directives.push(Directive {
            ordinal: directives.len(),
            raw: text[c.start..c.end].to_string(),
            span: c.start..c.end,
            action: c.action,
        });
    }
    directives
}

/// True when `text` carries a `finished()` or `call_user()` marker.
pub fn contains_terminal(text: &str) -> bool {
    parse(text).iter().any(Directive::is_terminal)
}

fn pointer_action(name: &str, at: Point) -> Action {
    match name {
        "left_double" => Action::DoubleClick { at },
        "right_single" => Action::RightClick { at },
        _ => Action::Click { at },
    }
}

fn screen_point(caps: &Captures<'_>, first: usize) -> Option<Point> {
    let x = caps.get(first)?.as_str().parse().ok()?;
    let y = caps.get(first + 1)?.as_str().parse().ok()?;
    Some(Point::screen(x, y))
}

/// `(x,y)` → that point; `(x1,y1,x2,y2)` → centre of the box.
fn parse_box(value: &str) -> Option<Point> {
    let caps = BOX_COORDS.captures(value)?;
    let n = |i: usize| -> Option<u32> { caps.get(i)?.as_str().parse().ok() };
    let (x1, y1) = (n(1)?, n(2)?);
    match (n(3), n(4)) {
        (Some(x2), Some(y2)) => Some(Point::normalized(
            ((u64::from(x1) + u64::from(x2)) / 2) as u32,
            ((u64::from(y1) + u64::from(y2)) / 2) as u32,
        )),
        _ => Some(Point::normalized(x1, y1)),
    }
}

fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
