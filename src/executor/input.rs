// Physical input through enigo. `Enigo` is not safe to share across threads on
// every platform, so one dedicated thread owns it and serves requests in order.
use std::sync::mpsc as std_mpsc;

use async_trait::async_trait;
use enigo::{Axis, Button, Coordinate, Direction, Enigo, Key, Keyboard, Mouse, Settings};
use tokio::sync::oneshot;

use crate::directive::{KeyCode, Modifier, MouseButton, ScrollDirection};
use crate::errors::{PilotError, PilotResult};
use crate::perception::traits::DisplayInfo;
use crate::perception::types::Resolution;

/// Low-level input primitives. The executor decides what and when; implementors
/// only generate the OS events.
#[async_trait]
pub trait InputDriver: Send + Sync {
    async fn move_to(&self, x: i32, y: i32) -> PilotResult<()>;
    async fn click(&self, button: MouseButton) -> PilotResult<()>;
    async fn double_click(&self, button: MouseButton) -> PilotResult<()>;
    async fn press_button(&self, button: MouseButton) -> PilotResult<()>;
    async fn release_button(&self, button: MouseButton) -> PilotResult<()>;
    async fn press_key(&self, key: KeyCode) -> PilotResult<()>;
    async fn release_key(&self, key: KeyCode) -> PilotResult<()>;
    async fn type_text(&self, text: &str) -> PilotResult<()>;
    /// `amount` is in wheel notches.
    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> PilotResult<()>;
    async fn position(&self) -> PilotResult<(i32, i32)>;
}

#[derive(Debug)]
enum InputOp {
    MoveTo(i32, i32),
    Click(MouseButton),
    DoubleClick(MouseButton),
    Press(MouseButton),
    Release(MouseButton),
    KeyDown(KeyCode),
    KeyUp(KeyCode),
    Text(String),
    Scroll(ScrollDirection, i32),
    Location,
    MainDisplay,
}

enum InputReply {
    Done,
    Pair(i32, i32),
}

struct InputRequest {
    op: InputOp,
    reply: oneshot::Sender<PilotResult<InputReply>>,
}

/// Handle to the input thread. Cheap to share behind an `Arc`.
pub struct EnigoDriver {
    tx: std_mpsc::Sender<InputRequest>,
}

impl EnigoDriver {
    pub fn spawn() -> PilotResult<Self> {
        let (tx, rx) = std_mpsc::channel::<InputRequest>();
        std::thread::Builder::new()
            .name("deskpilot-input".into())
            .spawn(move || input_thread(rx))?;
        Ok(Self { tx })
    }

    async fn request(&self, op: InputOp) -> PilotResult<InputReply> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(InputRequest { op, reply })
            .map_err(|_| PilotError::Input("input thread has exited".into()))?;
        rx.await
            .map_err(|_| PilotError::Input("input thread dropped the request".into()))?
    }

    async fn done(&self, op: InputOp) -> PilotResult<()> {
        self.request(op).await.map(|_| ())
    }

    async fn pair(&self, op: InputOp) -> PilotResult<(i32, i32)> {
        match self.request(op).await? {
            InputReply::Pair(a, b) => Ok((a, b)),
            InputReply::Done => Err(PilotError::Input("unexpected reply from input thread".into())),
        }
    }
}

fn input_thread(rx: std_mpsc::Receiver<InputRequest>) {
    let mut enigo = match Enigo::new(&Settings::default()) {
        Ok(e) => Some(e),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise input simulator; input requests will fail");
            None
        }
    };

    while let Ok(req) = rx.recv() {
        let result = match enigo.as_mut() {
            Some(enigo) => perform(enigo, req.op),
            None => Err(PilotError::Input("input simulator unavailable".into())),
        };
        let _ = req.reply.send(result);
    }
    tracing::debug!("input thread exiting");
}

fn perform(enigo: &mut Enigo, op: InputOp) -> PilotResult<InputReply> {
    let err = |e: enigo::InputError| PilotError::Input(e.to_string());
    match op {
        InputOp::MoveTo(x, y) => enigo.move_mouse(x, y, Coordinate::Abs).map_err(err)?,
        InputOp::Click(b) => enigo.button(button(b), Direction::Click).map_err(err)?,
        InputOp::DoubleClick(b) => {
            enigo.button(button(b), Direction::Click).map_err(err)?;
            enigo.button(button(b), Direction::Click).map_err(err)?;
        }
        InputOp::Press(b) => enigo.button(button(b), Direction::Press).map_err(err)?,
        InputOp::Release(b) => enigo.button(button(b), Direction::Release).map_err(err)?,
        InputOp::KeyDown(k) => enigo.key(key(k)?, Direction::Press).map_err(err)?,
        InputOp::KeyUp(k) => enigo.key(key(k)?, Direction::Release).map_err(err)?,
        InputOp::Text(text) => enigo.text(&text).map_err(err)?,
        InputOp::Scroll(direction, amount) => {
            // enigo: positive length scrolls down / right.
            let (length, axis) = match direction {
                ScrollDirection::Up => (-amount, Axis::Vertical),
                ScrollDirection::Down => (amount, Axis::Vertical),
                ScrollDirection::Left => (-amount, Axis::Horizontal),
                ScrollDirection::Right => (amount, Axis::Horizontal),
            };
            enigo.scroll(length, axis).map_err(err)?
        }
        InputOp::Location => {
            let (x, y) = enigo.location().map_err(err)?;
            return Ok(InputReply::Pair(x, y));
        }
        InputOp::MainDisplay => {
            let (w, h) = enigo.main_display().map_err(err)?;
            return Ok(InputReply::Pair(w, h));
        }
    }
    Ok(InputReply::Done)
}

fn button(b: MouseButton) -> Button {
    match b {
        MouseButton::Left => Button::Left,
        MouseButton::Right => Button::Right,
    }
}

fn key(code: KeyCode) -> PilotResult<Key> {
    let k = match code {
        KeyCode::Modifier(Modifier::Meta) => Key::Meta,
        KeyCode::Modifier(Modifier::Alt) => Key::Alt,
        KeyCode::Modifier(Modifier::Control) => Key::Control,
        KeyCode::Modifier(Modifier::Shift) => Key::Shift,
        KeyCode::Return => Key::Return,
        KeyCode::Tab => Key::Tab,
        KeyCode::Escape => Key::Escape,
        KeyCode::Backspace => Key::Backspace,
        KeyCode::Delete => Key::Delete,
        KeyCode::Space => Key::Space,
        KeyCode::Up => Key::UpArrow,
        KeyCode::Down => Key::DownArrow,
        KeyCode::Left => Key::LeftArrow,
        KeyCode::Right => Key::RightArrow,
        KeyCode::Home => Key::Home,
        KeyCode::End => Key::End,
        KeyCode::PageUp => Key::PageUp,
        KeyCode::PageDown => Key::PageDown,
        KeyCode::CapsLock => Key::CapsLock,
        KeyCode::F(n) => function_key(n)?,
        KeyCode::Char(c) => Key::Unicode(c),
    };
    Ok(k)
}

fn function_key(n: u8) -> PilotResult<Key> {
    let k = match n {
        1 => Key::F1,
        2 => Key::F2,
        3 => Key::F3,
        4 => Key::F4,
        5 => Key::F5,
        6 => Key::F6,
        7 => Key::F7,
        8 => Key::F8,
        9 => Key::F9,
        10 => Key::F10,
        11 => Key::F11,
        12 => Key::F12,
        13 => Key::F13,
        14 => Key::F14,
        15 => Key::F15,
        16 => Key::F16,
        17 => Key::F17,
        18 => Key::F18,
        19 => Key::F19,
        20 => Key::F20,
        other => return Err(PilotError::Input(format!("no function key F{other}"))),
    };
    Ok(k)
}

#[async_trait]
impl InputDriver for EnigoDriver {
    async fn move_to(&self, x: i32, y: i32) -> PilotResult<()> {
        self.done(InputOp::MoveTo(x, y)).await
    }

    async fn click(&self, button: MouseButton) -> PilotResult<()> {
        self.done(InputOp::Click(button)).await
    }

    async fn double_click(&self, button: MouseButton) -> PilotResult<()> {
        self.done(InputOp::DoubleClick(button)).await
    }

    async fn press_button(&self, button: MouseButton) -> PilotResult<()> {
        self.done(InputOp::Press(button)).await
    }

    async fn release_button(&self, button: MouseButton) -> PilotResult<()> {
        self.done(InputOp::Release(button)).await
    }

    async fn press_key(&self, key: KeyCode) -> PilotResult<()> {
        self.done(InputOp::KeyDown(key)).await
    }

    async fn release_key(&self, key: KeyCode) -> PilotResult<()> {
        self.done(InputOp::KeyUp(key)).await
    }

    async fn type_text(&self, text: &str) -> PilotResult<()> {
        self.done(InputOp::Text(text.to_string())).await
    }

    async fn scroll(&self, direction: ScrollDirection, amount: i32) -> PilotResult<()> {
        self.done(InputOp::Scroll(direction, amount)).await
    }

    async fn position(&self) -> PilotResult<(i32, i32)> {
        self.pair(InputOp::Location).await
    }
}

/// The size enigo reports is in the same space `move_to` expects.
#[async_trait]
impl DisplayInfo for EnigoDriver {
    async fn screen_resolution(&self) -> PilotResult<Resolution> {
        let (w, h) = self.pair(InputOp::MainDisplay).await?;
        if w <= 0 || h <= 0 {
            return Err(PilotError::Input(format!("invalid display size {w}x{h}")));
        }
        Ok(Resolution::new(w as u32, h as u32))
    }
}
