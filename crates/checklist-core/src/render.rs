use std::io::Write;

use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::view::{FilterMode, SortMode, VisibleTask};

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self { color: cfg.color()? })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks), fields(rows = tasks.len()))]
    pub fn print_task_table<W: Write>(
        &self,
        out: &mut W,
        tasks: &[VisibleTask],
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "No tasks.")?;
            return Ok(());
        }

        let rows: Vec<Row> = tasks
            .iter()
            .map(|task| {
                let text = if task.completed {
                    // 9 = strikethrough, 2 = dim
                    Cell::painted(self, &task.text, "2;9")
                } else {
                    Cell::plain(task.text.as_str())
                };
                [
                    Cell::plain(if task.selected { "[*]" } else { "[ ]" }),
                    Cell::plain(if task.completed { "[x]" } else { "[ ]" }),
                    Cell::painted(self, &task.id.to_string(), "33"),
                    text,
                ]
            })
            .collect();

        write_table(out, &rows)
    }

    pub fn print_status<W: Write>(
        &self,
        out: &mut W,
        sort: SortMode,
        filter: FilterMode,
        selected: usize,
    ) -> anyhow::Result<()> {
        writeln!(out, "sort: {sort}  filter: {filter}  selected: {selected}")?;
        Ok(())
    }

    pub fn print_confirmation<W: Write>(&self, out: &mut W, message: &str) -> anyhow::Result<()> {
        writeln!(out, "{} [y/N]", self.paint(message, "31"))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

const HEADERS: [&str; 4] = ["Sel", "Done", "ID", "Task"];

type Row = [Cell; 4];

/// Table cell whose display width is measured before any color codes are
/// added.
struct Cell {
    shown: String,
    width: usize,
}

impl Cell {
    fn plain(text: &str) -> Self {
        Self {
            shown: text.to_string(),
            width: text.width(),
        }
    }

    fn painted(renderer: &Renderer, text: &str, code: &str) -> Self {
        Self {
            shown: renderer.paint(text, code),
            width: text.width(),
        }
    }
}

fn write_table<W: Write>(out: &mut W, rows: &[Row]) -> anyhow::Result<()> {
    let mut widths = HEADERS.map(|header| header.width());
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.width);
        }
    }

    write_row(out, &HEADERS.map(Cell::plain), &widths)?;
    write_row(out, &widths.map(|width| Cell::plain(&"-".repeat(width))), &widths)?;
    for row in rows {
        write_row(out, row, &widths)?;
    }
    Ok(())
}

/// The last column is left unpadded so lines carry no trailing blanks.
fn write_row<W: Write>(out: &mut W, row: &Row, widths: &[usize; 4]) -> anyhow::Result<()> {
    let last = row.len() - 1;
    for (idx, (cell, width)) in row.iter().zip(widths).enumerate() {
        out.write_all(cell.shown.as_bytes())?;
        if idx < last {
            let pad = width.saturating_sub(cell.width) + 1;
            write!(out, "{:pad$}", "")?;
        }
    }
    writeln!(out)?;
    Ok(())
}
