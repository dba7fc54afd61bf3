use serde::Serialize;

use crate::category::CategoryRegistry;
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub id: String,
    pub name: String,
    pub color: String,
    pub count: usize,
}

impl CategoryCount {
    /// Share of `total` taken by this category, rounded to a whole percent.
    pub fn share_percent(&self, total: usize) -> u32 {
        rounded_percent(self.count, total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub active: usize,
    pub by_category: Vec<CategoryCount>,
}

impl Stats {
    pub fn completion_percent(&self) -> u32 {
        rounded_percent(self.completed, self.total)
    }
}

/// Summarizes the whole collection. `by_category` follows registry order
/// and always has one entry per registered category.
#[tracing::instrument(skip_all)]
pub fn stats(tasks: &[Task], registry: &CategoryRegistry) -> Stats {
    let total = tasks.len();
    let completed = tasks.iter().filter(|task| task.completed).count();

    let by_category = registry
        .list()
        .iter()
        .map(|cat| CategoryCount {
            id: cat.id.clone(),
            name: cat.name.clone(),
            color: cat.color.clone(),
            count: tasks.iter().filter(|task| task.category == cat.id).count(),
        })
        .collect();

    Stats {
        total,
        completed,
        active: total - completed,
        by_category,
    }
}

// round(part / total * 100), half away from zero, in integers.
fn rounded_percent(part: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    let part = part as u128;
    let total = total as u128;
    ((part * 200 + total) / (total * 2)) as u32
}
