use std::fmt;
use std::str::FromStr;

use anyhow::anyhow;
use tracing::trace;

use crate::task::Task;

#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
)]
pub enum StatusFilter {
  #[default]
  All,
  Active,
  Completed
}

impl StatusFilter {
  pub fn admits(
    self,
    task: &Task
  ) -> bool {
    match self {
      | StatusFilter::All => true,
      | StatusFilter::Active => {
        !task.completed
      }
      | StatusFilter::Completed => {
        task.completed
      }
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      | StatusFilter::All => "all",
      | StatusFilter::Active => "active",
      | StatusFilter::Completed => {
        "completed"
      }
    }
  }
}

impl FromStr for StatusFilter {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    match s
      .trim()
      .to_ascii_lowercase()
      .as_str()
    {
      | "all" => Ok(StatusFilter::All),
      | "active" | "pending" => {
        Ok(StatusFilter::Active)
      }
      | "completed" | "done" => {
        Ok(StatusFilter::Completed)
      }
      | other => Err(anyhow!(
        "invalid status filter \
         `{other}`; expected \
         all|active|completed"
      ))
    }
  }
}

impl fmt::Display for StatusFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(
  Debug,
  Clone,
  Default,
  PartialEq,
  Eq,
)]
pub enum CategoryFilter {
  #[default]
  All,
  Only(String)
}

impl CategoryFilter {
  /// `"all"` selects every category;
  /// any other value is an exact id.
  pub fn parse(value: &str) -> Self {
    if value == "all" {
      CategoryFilter::All
    } else {
      CategoryFilter::Only(
        value.to_string()
      )
    }
  }

  pub fn admits(
    &self,
    task: &Task
  ) -> bool {
    match self {
      | CategoryFilter::All => true,
      | CategoryFilter::Only(id) => {
        task.category == *id
      }
    }
  }

  pub fn is_all(&self) -> bool {
    matches!(self, CategoryFilter::All)
  }
}

impl fmt::Display for CategoryFilter {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    match self {
      | CategoryFilter::All => {
        f.write_str("all")
      }
      | CategoryFilter::Only(id) => {
        f.write_str(id)
      }
    }
  }
}

fn admits(
  task: &Task,
  status: StatusFilter,
  category: &CategoryFilter
) -> bool {
  status.admits(task)
    && category.admits(task)
}

/// Tasks passing both filters, in
/// collection order.
#[tracing::instrument(skip(tasks))]
pub fn filter<'a>(
  tasks: &'a [Task],
  status: StatusFilter,
  category: &CategoryFilter
) -> Vec<&'a Task> {
  let out: Vec<&Task> = tasks
    .iter()
    .filter(|task| {
      admits(task, status, category)
    })
    .collect();
  trace!(
    total = tasks.len(),
    visible = out.len(),
    "filtered tasks"
  );
  out
}

/// Collection index of every visible
/// task, in view order. Entry `i` is
/// where view row `i` lives in the full
/// collection.
pub fn view_positions(
  tasks: &[Task],
  status: StatusFilter,
  category: &CategoryFilter
) -> Vec<usize> {
  tasks
    .iter()
    .enumerate()
    .filter(|(_, task)| {
      admits(task, status, category)
    })
    .map(|(idx, _)| idx)
    .collect()
}
