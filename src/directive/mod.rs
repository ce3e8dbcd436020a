pub mod parser;
pub mod types;

pub use parser::{contains_terminal, parse};
pub use types::{Action, CoordSpace, Directive, KeyCode, KeyCombo, Modifier, MouseButton, Point, ScrollDirection};
