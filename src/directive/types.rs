use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Which coordinate system a point was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordSpace {
    /// Physical pixels (legacy dialect). Never normalized.
    Screen,
    /// 0–1000 virtual grid (box dialect).
    Normalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
    pub space: CoordSpace,
}

impl Point {
    pub fn screen(x: u32, y: u32) -> Self {
        Self { x, y, space: CoordSpace::Screen }
    }

    pub fn normalized(x: u32, y: u32) -> Self {
        Self { x, y, space: CoordSpace::Normalized }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "left" => Some(Self::Left),
            "right" => Some(Self::Right),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Modifier keys. Declaration order is the press order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Modifier {
    Meta,
    Alt,
    Control,
    Shift,
}

impl Modifier {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "command" | "cmd" | "meta" | "win" | "super" => Some(Self::Meta),
            "alt" | "option" | "opt" => Some(Self::Alt),
            "control" | "ctrl" => Some(Self::Control),
            "shift" => Some(Self::Shift),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Meta => "command",
            Self::Alt => "alt",
            Self::Control => "control",
            Self::Shift => "shift",
        }
    }
}

/// A parsed `hotkey(key='...')` combo: an ordered modifier set plus one base key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCombo {
    pub modifiers: Vec<Modifier>,
    /// Lower-cased name of the last token.
    pub key: String,
}

impl KeyCombo {
    /// Splits `command+shift+3` style text. Every token but the last that names
    /// a modifier joins the set; unknown leading tokens are dropped. A trailing
    /// `++` (or a lone `+`) names the plus key itself.
    pub fn parse(combo: &str) -> Option<Self> {
        let mut tokens: Vec<String> = combo.split('+').map(|t| t.trim().to_lowercase()).collect();
        if tokens.len() >= 2 && tokens[tokens.len() - 2..].iter().all(String::is_empty) {
            tokens.truncate(tokens.len() - 2);
            tokens.push("+".to_string());
        }
        tokens.retain(|t| !t.is_empty());
        let (key, leading) = tokens.split_last()?;
        let mut modifiers: Vec<Modifier> = leading
            .iter()
            .filter_map(|t| Modifier::from_name(t))
            .collect();
        modifiers.sort();
        modifiers.dedup();
        Some(Self { modifiers, key: key.clone() })
    }

    pub fn is(&self, modifiers: &[Modifier], key: &str) -> bool {
        self.modifiers == modifiers && self.key == key
    }
}

impl fmt::Display for KeyCombo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for m in &self.modifiers {
            write!(f, "{}+", m.as_str())?;
        }
        f.write_str(&self.key)
    }
}

/// Key identifiers understood by the input layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    Modifier(Modifier),
    Return,
    Tab,
    Escape,
    Backspace,
    Delete,
    Space,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    PageUp,
    PageDown,
    CapsLock,
    F(u8),
    Char(char),
}

impl KeyCode {
    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(m) = Modifier::from_name(name) {
            return Some(Self::Modifier(m));
        }
        let code = match name {
            "enter" | "return" => Self::Return,
            "tab" => Self::Tab,
            "esc" | "escape" => Self::Escape,
            "backspace" => Self::Backspace,
            "delete" | "del" => Self::Delete,
            "space" => Self::Space,
            "up" | "arrowup" => Self::Up,
            "down" | "arrowdown" => Self::Down,
            "left" | "arrowleft" => Self::Left,
            "right" | "arrowright" => Self::Right,
            "home" => Self::Home,
            "end" => Self::End,
            "pageup" | "page_up" => Self::PageUp,
            "pagedown" | "page_down" => Self::PageDown,
            "capslock" => Self::CapsLock,
            other => {
                let mut chars = other.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Self::Char(c),
                    (Some('f'), Some(_)) => {
                        let n: u8 = other[1..].parse().ok()?;
                        if (1..=20).contains(&n) {
                            Self::F(n)
                        } else {
                            return None;
                        }
                    }
                    _ => return None,
                }
            }
        };
        Some(code)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouseButton {
    Left,
    Right,
}

/// One operation a directive asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Click { at: Point },
    DoubleClick { at: Point },
    RightClick { at: Point },
    Drag { from: Point, to: Point },
    Hotkey { combo: KeyCombo },
    TypeText { content: String },
    Scroll { at: Point, direction: ScrollDirection },
    Wait,
    Finished,
    CallUser,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::DoubleClick { .. } => "left_double",
            Self::RightClick { .. } => "right_single",
            Self::Drag { .. } => "drag",
            Self::Hotkey { .. } => "hotkey",
            Self::TypeText { .. } => "type",
            Self::Scroll { .. } => "scroll",
            Self::Wait => "wait",
            Self::Finished => "finished",
            Self::CallUser => "call_user",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::CallUser)
    }
}

fn fmt_box(f: &mut fmt::Formatter<'_>, label: &str, p: &Point) -> fmt::Result {
    write!(f, "{label}='({},{})'", p.x, p.y)
}

fn escape_content(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out
}

/// Renders the directive text in the dialect matching its coordinate space.
impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Click { at } | Self::DoubleClick { at } | Self::RightClick { at } => {
                match at.space {
                    CoordSpace::Screen => write!(f, "{}({},{})", self.name(), at.x, at.y),
                    CoordSpace::Normalized => {
                        write!(f, "{}(", self.name())?;
                        fmt_box(f, "start_box", at)?;
                        f.write_str(")")
                    }
                }
            }
            Self::Drag { from, to } => {
                if from.space == CoordSpace::Screen && to.space == CoordSpace::Screen {
                    write!(f, "drag(({},{}),({},{}))", from.x, from.y, to.x, to.y)
                } else {
                    f.write_str("drag(")?;
                    fmt_box(f, "start_box", from)?;
                    f.write_str(", ")?;
                    fmt_box(f, "end_box", to)?;
                    f.write_str(")")
                }
            }
            Self::Hotkey { combo } => write!(f, "hotkey(key='{combo}')"),
            Self::TypeText { content } => write!(f, "type(content='{}')", escape_content(content)),
            Self::Scroll { at, direction } => match at.space {
                CoordSpace::Screen => write!(
                    f,
                    "scroll(({},{}), direction='{}')",
                    at.x,
                    at.y,
                    direction.as_str()
                ),
                CoordSpace::Normalized => {
                    f.write_str("scroll(")?;
                    fmt_box(f, "start_box", at)?;
                    write!(f, ", direction='{}')", direction.as_str())
                }
            },
            Self::Wait => f.write_str("wait()"),
            Self::Finished => f.write_str("finished()"),
            Self::CallUser => f.write_str("call_user()"),
        }
    }
}

/// A directive recognized in a message, with its source location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub action: Action,
    /// Exact matched text.
    pub raw: String,
    /// Position among the directives of the same message, starting at 0.
    pub ordinal: usize,
    /// Byte range of `raw` in the message.
    pub span: Range<usize>,
}

impl Directive {
    pub fn is_terminal(&self) -> bool {
        self.action.is_terminal()
    }
}
