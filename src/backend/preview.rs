//! Terminal preview backend using crossterm.
//!
//! Draws every LED as a true-color cell in an alternate screen, placed by
//! its layout rectangle. The screen is redrawn on each write batch. LEDs
//! that were never written are dark gray.

use std::collections::BTreeMap;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use crossterm::{
    cursor, event,
    style::{self, Color, Stylize},
    terminal, ExecutableCommand, QueueableCommand,
};
use keylight_core::{BackendError, LedBackend, LedColorUpdate, LedId, LedPosition, Rect, RgbColor};

/// Width of each key cell in characters.
const CELL_W: usize = 5;
/// Rows above the keyboard (title + blank line)
const HEADER_ROWS: u16 = 2;
/// Never-written keys
const DIM: Color = Color::Rgb {
    r: 40,
    g: 40,
    b: 40,
};

/// Raw mode + alternate screen for the lifetime of the guard.
pub struct TerminalGuard {
    _private: (),
}

impl TerminalGuard {
    pub fn enter() -> io::Result<Self> {
        terminal::enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout
            .execute(terminal::EnterAlternateScreen)?
            .execute(cursor::Hide)?;
        Ok(Self { _private: () })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let mut stdout = io::stdout();
        let _ = stdout.execute(cursor::Show);
        let _ = stdout.execute(terminal::LeaveAlternateScreen);
        let _ = terminal::disable_raw_mode();
    }
}

/// True if q, Esc or Ctrl-C was pressed. Never blocks.
pub fn quit_requested() -> io::Result<bool> {
    while event::poll(Duration::ZERO)? {
        if let event::Event::Key(key) = event::read()? {
            match key.code {
                event::KeyCode::Char('q') | event::KeyCode::Esc => return Ok(true),
                event::KeyCode::Char('c')
                    if key.modifiers.contains(event::KeyModifiers::CONTROL) =>
                {
                    return Ok(true)
                }
                _ => {}
            }
        }
    }
    Ok(false)
}

/// Screen placement of one LED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub id: LedId,
    pub col: u16,
    pub row: u16,
    pub width: u16,
}

/// Map LED rectangles onto a character grid. The narrowest key is one cell
/// wide and the shortest key one row tall.
pub fn layout_cells(layout: &[LedPosition]) -> Vec<Cell> {
    let Some(bounds) = Rect::enclosing(layout.iter().map(|l| l.rect)) else {
        return Vec::new();
    };
    let unit_w = layout
        .iter()
        .map(|l| l.rect.width)
        .filter(|w| *w > 0.0)
        .fold(f32::INFINITY, f32::min);
    let unit_h = layout
        .iter()
        .map(|l| l.rect.height)
        .filter(|h| *h > 0.0)
        .fold(f32::INFINITY, f32::min);
    let unit_w = if unit_w.is_finite() { unit_w } else { 1.0 };
    let unit_h = if unit_h.is_finite() { unit_h } else { 1.0 };

    layout
        .iter()
        .map(|l| {
            let col = ((l.rect.x - bounds.x) / unit_w).round() as u16;
            let row = ((l.rect.y - bounds.y) / unit_h).round() as u16;
            let keys_wide = (l.rect.width / unit_w).round().max(1.0) as u16;
            Cell {
                id: l.id,
                col: col * CELL_W as u16,
                row,
                width: keys_wide * CELL_W as u16,
            }
        })
        .collect()
}

pub struct PreviewBackend {
    layout: Vec<LedPosition>,
    cells: Vec<Cell>,
    colors: BTreeMap<LedId, RgbColor>,
    title: String,
    writes: u64,
    stdout: Stdout,
}

impl PreviewBackend {
    pub fn new(layout: Vec<LedPosition>, title: impl Into<String>) -> Self {
        let cells = layout_cells(&layout);
        Self {
            layout,
            cells,
            colors: BTreeMap::new(),
            title: title.into(),
            writes: 0,
            stdout: io::stdout(),
        }
    }

    fn draw(&mut self) -> io::Result<()> {
        self.stdout.queue(cursor::MoveTo(0, 0))?;
        self.stdout.queue(style::PrintStyledContent(
            format!(
                " {}  |  frame {:6}  |  q/Esc to quit ",
                self.title, self.writes
            )
            .with(Color::White)
            .on(Color::DarkGrey),
        ))?;

        for cell in &self.cells {
            let (fg, bg) = match self.colors.get(&cell.id) {
                Some(c) => {
                    let lum = (c.r as u16 + c.g as u16 + c.b as u16) / 3;
                    let fg = if lum > 128 { Color::Black } else { Color::White };
                    (fg, Color::Rgb { r: c.r, g: c.g, b: c.b })
                }
                None => (Color::DarkGrey, DIM),
            };
            self.stdout
                .queue(cursor::MoveTo(cell.col, cell.row + HEADER_ROWS))?;
            self.stdout.queue(style::PrintStyledContent(
                format!("{:^width$}", cell.id, width = cell.width as usize)
                    .with(fg)
                    .on(bg),
            ))?;
        }

        self.stdout.flush()
    }
}

impl LedBackend for PreviewBackend {
    fn led_layout(&mut self) -> Result<Vec<LedPosition>, BackendError> {
        Ok(self.layout.clone())
    }

    fn write_colors(&mut self, batch: &[LedColorUpdate]) -> Result<(), BackendError> {
        for update in batch {
            self.colors.insert(update.id, update.color());
        }
        self.writes += 1;
        self.draw()?;
        Ok(())
    }
}
