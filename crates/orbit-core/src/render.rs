use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use chrono::NaiveDate;
use unicode_width::UnicodeWidthStr;

use crate::advisor::Suggestion;
use crate::category::CategoryRegistry;
use crate::config::Config;
use crate::datetime::format_due;
use crate::stats::Stats;
use crate::task::Task;

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color_cfg = cfg.get("color").unwrap_or_else(|| "on".to_string());
        let color = match color_cfg.to_ascii_lowercase().as_str() {
            "on" | "yes" | "true" | "1" => true,
            "off" | "no" | "false" | "0" => false,
            other => return Err(anyhow!("invalid color setting: {other}")),
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    /// Rows are numbered from 1 in view order.
    #[tracing::instrument(skip_all, fields(count = tasks.len()))]
    pub fn write_task_table<W: Write>(
        &self,
        out: W,
        tasks: &[&Task],
        registry: &CategoryRegistry,
        today: NaiveDate,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "#".to_string(),
            "Done".to_string(),
            "Pri".to_string(),
            "Category".to_string(),
            "Due".to_string(),
            "Task".to_string(),
        ];

        let mut rows = Vec::with_capacity(tasks.len());
        for (idx, task) in tasks.iter().enumerate() {
            let category = registry.lookup(&task.category);
            let due = task.due_date.map(format_due).unwrap_or_default();
            let due = if task.is_overdue(today) {
                self.paint(&due, "31")
            } else {
                due
            };
            let text = if task.completed {
                self.paint(&task.text, "2")
            } else {
                task.text.clone()
            };

            rows.push(vec![
                self.paint(&(idx + 1).to_string(), "33"),
                if task.completed { "x" } else { " " }.to_string(),
                format!("{} {}", task.priority.glyph(), task.priority),
                format!("{} {}", category.icon, category.name),
                due,
                text,
            ]);
        }

        write_table(out, headers, rows)
    }

    pub fn write_task_line<W: Write>(
        &self,
        mut out: W,
        task: &Task,
        registry: &CategoryRegistry,
    ) -> anyhow::Result<()> {
        let category = registry.lookup(&task.category);
        let mark = if task.completed { "x" } else { " " };
        write!(
            out,
            "[{mark}] {} ({} {}, {})",
            task.text, category.icon, category.name, task.priority
        )?;
        if let Some(due) = task.due_date {
            write!(out, " due {}", format_due(due))?;
        }
        writeln!(out, "  id {}", task.id)?;
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn write_stats<W: Write>(&self, mut out: W, stats: &Stats) -> anyhow::Result<()> {
        writeln!(
            out,
            "Completion {}% ({} of {})",
            stats.completion_percent(),
            stats.completed,
            stats.total
        )?;
        writeln!(out, "Active     {}", stats.active)?;
        writeln!(out, "Completed  {}", stats.completed)?;
        writeln!(out)?;

        let headers = vec![
            "Category".to_string(),
            "Tasks".to_string(),
            "Share".to_string(),
        ];
        let rows = stats
            .by_category
            .iter()
            .map(|entry| {
                vec![
                    entry.name.clone(),
                    entry.count.to_string(),
                    format!("{}%", entry.share_percent(stats.total)),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn write_categories<W: Write>(
        &self,
        out: W,
        registry: &CategoryRegistry,
    ) -> anyhow::Result<()> {
        let headers = vec![
            "Id".to_string(),
            "Name".to_string(),
            "Icon".to_string(),
            "Color".to_string(),
        ];
        let rows = registry
            .list()
            .iter()
            .map(|cat| {
                vec![
                    cat.id.clone(),
                    cat.name.clone(),
                    cat.icon.clone(),
                    cat.color.clone(),
                ]
            })
            .collect();
        write_table(out, headers, rows)
    }

    pub fn write_suggestion<W: Write>(
        &self,
        mut out: W,
        suggestion: &Suggestion,
    ) -> anyhow::Result<()> {
        match suggestion {
            Suggestion::Empty => {}
            Suggestion::Ready(text) => writeln!(out, "💡 {}", self.paint(text, "36"))?,
            Suggestion::Unavailable => writeln!(out, "💡 {suggestion}")?,
        }
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for width in &widths {
        write!(writer, "{:-<width$} ", "", width = *width)?;
    }
    writeln!(writer)?;

    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}
