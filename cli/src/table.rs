// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::borrow::Cow;
use std::fmt;

use colored::{Color, Colorize};
use unicode_width::UnicodeWidthStr;

use crate::util::OutputFormat;

pub trait TableColumn<T> {
    fn name(&self) -> Cow<'_, str>;

    fn format<'a>(&self, data: &'a T) -> Cow<'a, str>;

    fn padding_direction(&self) -> PaddingDirection {
        PaddingDirection::Left
    }

    fn color(&self, _data: &T) -> Option<Color> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddingDirection {
    Left,
    Right,
}

#[derive(Debug)]
pub struct Table<'a, C, T> {
    columns: &'a [C],
    data: &'a [T],
    format: OutputFormat,
}

impl<'a, C: TableColumn<T>, T> Table<'a, C, T> {
    pub const fn new(format: OutputFormat, columns: &'a [C], data: &'a [T]) -> Self {
        Self {
            columns,
            data,
            format,
        }
    }

    fn cells(&self) -> Vec<Vec<Cow<'a, str>>> {
        self.data
            .iter()
            .map(|row| self.columns.iter().map(|col| col.format(row)).collect())
            .collect()
    }

    fn fmt_table(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cells = self.cells();
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.name().width()).collect();
        for row in &cells {
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.width());
            }
        }

        let last = self.columns.len().saturating_sub(1);
        for (i, col) in self.columns.iter().enumerate() {
            let name = pad(&col.name(), widths[i], col.padding_direction(), i == last);
            write!(f, "{}", name.bold())?;
            write!(f, "{}", if i == last { "\n" } else { "  " })?;
        }

        for (row, data) in cells.iter().zip(self.data) {
            for (i, (col, cell)) in self.columns.iter().zip(row).enumerate() {
                let cell = pad(cell, widths[i], col.padding_direction(), i == last);
                match col.color(data) {
                    Some(color) => write!(f, "{}", cell.color(color))?,
                    None => write!(f, "{cell}")?,
                }
                write!(f, "{}", if i == last { "\n" } else { "  " })?;
            }
        }
        Ok(())
    }

    fn fmt_json(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = self
            .cells()
            .into_iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(col, cell)| (col.name().into_owned(), cell.into_owned().into()))
                    .collect()
            })
            .collect();

        let json = serde_json::to_string_pretty(&rows).map_err(|_| fmt::Error)?;
        writeln!(f, "{json}")
    }
}

impl<C: TableColumn<T>, T> fmt::Display for Table<'_, C, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.format {
            OutputFormat::Table => self.fmt_table(f),
            OutputFormat::Json => self.fmt_json(f),
        }
    }
}

fn pad(cell: &str, width: usize, direction: PaddingDirection, last: bool) -> String {
    let fill = " ".repeat(width.saturating_sub(cell.width()));
    match direction {
        PaddingDirection::Left if last => cell.to_string(), // no trailing spaces
        PaddingDirection::Left => format!("{cell}{fill}"),
        PaddingDirection::Right => format!("{fill}{cell}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Col(&'static str, PaddingDirection);

    impl TableColumn<(&'static str, u32)> for Col {
        fn name(&self) -> Cow<'_, str> {
            self.0.into()
        }

        fn format<'a>(&self, data: &'a (&'static str, u32)) -> Cow<'a, str> {
            match self.1 {
                PaddingDirection::Left => data.0.into(),
                PaddingDirection::Right => data.1.to_string().into(),
            }
        }

        fn padding_direction(&self) -> PaddingDirection {
            self.1
        }
    }

    fn columns() -> [Col; 2] {
        [
            Col("N", PaddingDirection::Right),
            Col("Name", PaddingDirection::Left),
        ]
    }

    #[test]
    fn table_pads_columns() {
        colored::control::set_override(false);
        let data = [("morning run", 7), ("ride", 12)];
        let columns = columns();
        let out = Table::new(OutputFormat::Table, &columns, &data).to_string();
        assert_eq!(out, " N  Name\n 7  morning run\n12  ride\n");
    }

    #[test]
    fn json_uses_column_names() {
        let data = [("ride", 12)];
        let columns = columns();
        let out = Table::new(OutputFormat::Json, &columns, &data).to_string();
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed, serde_json::json!([{ "N": "12", "Name": "ride" }]));
    }
}
