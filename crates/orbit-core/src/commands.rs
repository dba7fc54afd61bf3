use std::io::{
  self,
  Write
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  instrument,
  warn
};

use crate::cli::{
  Command,
  ViewArgs
};
use crate::config::Config;
use crate::datastore::KvStore;
use crate::datetime::{
  parse_due_expr,
  today_local
};
use crate::filter::{
  CategoryFilter,
  StatusFilter
};
use crate::render::Renderer;
use crate::session::Session;
use crate::task::{
  Priority,
  Task,
  TaskDraft,
  TaskId
};

/// Runs one CLI command against the
/// session and writes its output.
#[instrument(skip(
  session, cfg, renderer, command
))]
pub async fn dispatch<S: KvStore>(
  session: &mut Session<S>,
  cfg: &Config,
  renderer: &Renderer,
  command: Command
) -> anyhow::Result<()> {
  match command {
    | Command::Add {
      text,
      category,
      priority,
      due
    } => {
      cmd_add(
        session,
        cfg,
        renderer,
        text.join(" "),
        category,
        priority,
        due
      )
      .await
    }
    | Command::List {
      view
    } => cmd_list(session, renderer, view),
    | Command::Toggle {
      task,
      view
    } => cmd_toggle(session, &task, &view),
    | Command::Delete {
      task,
      view
    } => cmd_delete(session, &task, &view),
    | Command::Edit {
      task,
      view,
      text,
      set_category,
      priority,
      due,
      no_due
    } => {
      cmd_edit(
        session,
        &task,
        &view,
        EditFields {
          text,
          category: set_category,
          priority,
          due,
          no_due
        }
      )
    }
    | Command::Move {
      from,
      to,
      view
    } => {
      cmd_move(
        session, renderer, from, to,
        view
      )
    }
    | Command::Stats => {
      let stats = session.stats();
      renderer.write_stats(
        io::stdout().lock(),
        &stats
      )
    }
    | Command::Categories => {
      renderer.write_categories(
        io::stdout().lock(),
        session.registry()
      )
    }
    | Command::Ask {
      text
    } => {
      cmd_ask(
        session,
        renderer,
        &text.join(" ")
      )
      .await
    }
  }
}

struct EditFields {
  text:     Option<String>,
  category: Option<String>,
  priority: Option<String>,
  due:      Option<String>,
  no_due:   bool
}

/// Resolves a task reference against the
/// collection and the rows of the current
/// view (`rows[i]` is the collection index
/// of row `i + 1`).
///
/// An exact id wins. A number is a 1-based
/// row of the view; a number past the last
/// row is tried as an id prefix. Anything
/// else must be a unique id prefix.
pub fn resolve_task_ref(
  tasks: &[Task],
  rows: &[usize],
  token: &str
) -> anyhow::Result<TaskId> {
  let token = token.trim();
  if token.is_empty() {
    return Err(anyhow!(
      "task reference cannot be empty"
    ));
  }

  if let Some(task) = tasks
    .iter()
    .find(|task| task.id.as_str() == token)
  {
    return Ok(task.id.clone());
  }

  let row = token.parse::<usize>().ok();
  if let Some(task) = row
    .and_then(|row| row.checked_sub(1))
    .and_then(|idx| rows.get(idx))
    .and_then(|&idx| tasks.get(idx))
  {
    return Ok(task.id.clone());
  }

  let mut matches = tasks.iter().filter(
    |task| {
      task.id.as_str().starts_with(token)
    }
  );
  let first = matches.next().ok_or_else(
    || match row {
      | Some(row) => {
        anyhow!(
          "no task at row {row}; the \
           list shows {} rows",
          rows.len()
        )
      }
      | None => {
        anyhow!(
          "no task matches `{token}`"
        )
      }
    }
  )?;
  if matches.next().is_some() {
    return Err(anyhow!(
      "task reference `{token}` is \
       ambiguous"
    ));
  }
  Ok(first.id.clone())
}

fn apply_view<S: KvStore>(
  session: &mut Session<S>,
  view: &ViewArgs
) -> anyhow::Result<()> {
  let status: StatusFilter =
    view.status.parse()?;
  session.set_status_filter(status);
  session.set_category_filter(
    CategoryFilter::parse(&view.category)
  );
  Ok(())
}

fn resolve_in_view<S: KvStore>(
  session: &mut Session<S>,
  view: &ViewArgs,
  token: &str
) -> anyhow::Result<TaskId> {
  apply_view(session, view)?;
  resolve_task_ref(
    session.store().tasks(),
    &session.view_positions(),
    token
  )
}

fn parse_priority(
  priority: Option<String>
) -> anyhow::Result<Option<Priority>> {
  priority
    .map(|p| p.parse::<Priority>())
    .transpose()
}

fn parse_due(
  due: Option<String>
) -> anyhow::Result<
  Option<chrono::NaiveDate>
> {
  due
    .map(|expr| {
      parse_due_expr(&expr, today_local())
    })
    .transpose()
}

fn warn_unknown_category<S: KvStore>(
  session: &Session<S>,
  category: &str
) {
  if !session.registry().contains(category)
  {
    warn!(
      category,
      "category is not registered; it \
       will show as uncategorized"
    );
  }
}

#[instrument(skip(
  session, cfg, renderer, text
))]
async fn cmd_add<S: KvStore>(
  session: &mut Session<S>,
  cfg: &Config,
  renderer: &Renderer,
  text: String,
  category: Option<String>,
  priority: Option<String>,
  due: Option<String>
) -> anyhow::Result<()> {
  info!("command add");

  let category = category
    .unwrap_or_else(|| {
      cfg.default_category()
    });
  warn_unknown_category(
    session, &category
  );
  let draft =
    TaskDraft::new(text, category)
      .with_priority(
        parse_priority(priority)?
          .unwrap_or_default()
      )
      .with_due_date(parse_due(due)?);

  let Some(task) =
    session.add_task(draft)
  else {
    return Err(anyhow!(
      "task text cannot be empty"
    ));
  };

  {
    let mut out = io::stdout().lock();
    write!(out, "Created ")?;
    renderer.write_task_line(
      &mut out,
      &task,
      session.registry()
    )?;
  }

  for handle in
    session.take_pending_suggestions()
  {
    let suggestion = handle.wait().await;
    renderer.write_suggestion(
      io::stdout().lock(),
      &suggestion
    )?;
  }
  Ok(())
}

#[instrument(skip(session, renderer))]
fn cmd_list<S: KvStore>(
  session: &mut Session<S>,
  renderer: &Renderer,
  view: ViewArgs
) -> anyhow::Result<()> {
  info!("command list");

  apply_view(session, &view)?;

  let visible = session.visible_tasks();
  debug!(
    visible = visible.len(),
    total = session.store().len(),
    "rendering list"
  );
  if visible.is_empty() {
    println!("No matching tasks.");
    return Ok(());
  }
  renderer.write_task_table(
    io::stdout().lock(),
    &visible,
    session.registry(),
    today_local()
  )
}

#[instrument(skip(session, view))]
fn cmd_toggle<S: KvStore>(
  session: &mut Session<S>,
  token: &str,
  view: &ViewArgs
) -> anyhow::Result<()> {
  info!("command toggle");

  let id =
    resolve_in_view(session, view, token)?;
  if !session.toggle_task(&id) {
    return Err(anyhow!(
      "task {id} not found"
    ));
  }
  let completed = session
    .store()
    .get(&id)
    .map(|task| task.completed)
    .unwrap_or_default();
  println!(
    "Task {id} is now {}.",
    if completed {
      "completed"
    } else {
      "active"
    }
  );
  Ok(())
}

#[instrument(skip(session, view))]
fn cmd_delete<S: KvStore>(
  session: &mut Session<S>,
  token: &str,
  view: &ViewArgs
) -> anyhow::Result<()> {
  info!("command delete");

  let id =
    resolve_in_view(session, view, token)?;
  if !session.delete_task(&id) {
    return Err(anyhow!(
      "task {id} not found"
    ));
  }
  println!("Deleted task {id}.");
  Ok(())
}

#[instrument(skip(session, view, fields))]
fn cmd_edit<S: KvStore>(
  session: &mut Session<S>,
  token: &str,
  view: &ViewArgs,
  fields: EditFields
) -> anyhow::Result<()> {
  info!("command edit");

  let EditFields {
    text,
    category,
    priority,
    due,
    no_due
  } = fields;
  let id =
    resolve_in_view(session, view, token)?;
  let current = session
    .store()
    .get(&id)
    .cloned()
    .with_context(|| {
      format!("task {id} not found")
    })?;

  let category = category
    .unwrap_or(current.category);
  warn_unknown_category(
    session, &category
  );
  let due_date = if no_due {
    None
  } else {
    parse_due(due)?.or(current.due_date)
  };
  let draft = TaskDraft::new(
    text.unwrap_or(current.text),
    category
  )
  .with_priority(
    parse_priority(priority)?
      .unwrap_or(current.priority)
  )
  .with_due_date(due_date);

  if !session.edit_task(&id, draft) {
    return Err(anyhow!(
      "task {id} was not changed; task \
       text cannot be empty"
    ));
  }
  println!("Updated task {id}.");
  Ok(())
}

#[instrument(skip(session, renderer))]
fn cmd_move<S: KvStore>(
  session: &mut Session<S>,
  renderer: &Renderer,
  from: usize,
  to: usize,
  view: ViewArgs
) -> anyhow::Result<()> {
  info!("command move");

  apply_view(session, &view)?;

  let from_idx =
    from.checked_sub(1).ok_or_else(
      || anyhow!("positions start at 1")
    )?;
  let to_idx =
    to.checked_sub(1).ok_or_else(
      || anyhow!("positions start at 1")
    )?;

  if !session
    .move_in_view(from_idx, Some(to_idx))
  {
    let visible =
      session.visible_tasks().len();
    return Err(anyhow!(
      "cannot move {from} to {to}; the \
       list has {visible} rows"
    ));
  }

  renderer.write_task_table(
    io::stdout().lock(),
    &session.visible_tasks(),
    session.registry(),
    today_local()
  )
}

#[instrument(skip(
  session, renderer, text
))]
async fn cmd_ask<S: KvStore>(
  session: &Session<S>,
  renderer: &Renderer,
  text: &str
) -> anyhow::Result<()> {
  info!("command ask");

  let Some(handle) = session.ask(text) else {
    return Err(anyhow!(
      "nothing to ask; text is blank"
    ));
  };
  let suggestion = handle.wait().await;
  renderer.write_suggestion(
    io::stdout().lock(),
    &suggestion
  )
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use chrono::{
    NaiveDate,
    Utc
  };

  use super::*;
  use crate::advisor::{
    Advisor,
    CannedSuggestions
  };
  use crate::category::CategoryRegistry;
  use crate::datastore::MemoryKvStore;
  use crate::persistence::Persistence;
  use crate::session::AdvisoryPolicy;
  use crate::store::TaskStore;

  fn tasks() -> Vec<Task> {
    [
      ("a", "alpha-0001"),
      ("b", "bravo-0002"),
      ("c", "charlie-0003")
    ]
    .iter()
    .map(|(text, id)| {
      let mut task = Task::from_draft(
        TaskDraft::new(*text, "work"),
        Utc::now()
      );
      task.id = TaskId::from(*id);
      task
    })
    .collect()
  }

  fn all_rows(
    tasks: &[Task]
  ) -> Vec<usize> {
    (0..tasks.len()).collect()
  }

  fn session() -> Session<MemoryKvStore>
  {
    Session::new(
      TaskStore::open(Persistence::new(
        MemoryKvStore::new()
      )),
      CategoryRegistry::default(),
      Advisor::new(
        CannedSuggestions::default(),
        Duration::from_millis(500)
      ),
      AdvisoryPolicy::default()
    )
  }

  fn view(
    status: &str,
    category: &str
  ) -> ViewArgs {
    ViewArgs {
      status:   status.to_string(),
      category: category.to_string()
    }
  }

  fn texts(
    session: &Session<MemoryKvStore>
  ) -> Vec<String> {
    session
      .store()
      .tasks()
      .iter()
      .map(|task| task.text.clone())
      .collect()
  }

  async fn run(
    session: &mut Session<MemoryKvStore>,
    command: Command
  ) -> anyhow::Result<()> {
    dispatch(
      session,
      &Config::default(),
      &Renderer::plain(),
      command
    )
    .await
  }

  #[test]
  fn resolves_rows_and_ids() {
    let tasks = tasks();
    let rows = all_rows(&tasks);
    assert_eq!(
      resolve_task_ref(&tasks, &rows, "2")
        .expect("row"),
      tasks[1].id
    );
    assert_eq!(
      resolve_task_ref(
        &tasks,
        &rows,
        tasks[2].id.as_str()
      )
      .expect("full id"),
      tasks[2].id
    );
    assert_eq!(
      resolve_task_ref(
        &tasks, &rows, "alpha"
      )
      .expect("prefix"),
      tasks[0].id
    );
  }

  #[test]
  fn rows_follow_the_filtered_view() {
    let mut tasks = tasks();
    tasks[1].completed = true;
    let completed = view_rows(
      &tasks,
      StatusFilter::Completed
    );

    assert_eq!(
      resolve_task_ref(
        &tasks, &completed, "1"
      )
      .expect("row"),
      tasks[1].id
    );
    assert!(
      resolve_task_ref(
        &tasks, &completed, "2"
      )
      .is_err()
    );
  }

  fn view_rows(
    tasks: &[Task],
    status: StatusFilter
  ) -> Vec<usize> {
    crate::filter::view_positions(
      tasks,
      status,
      &CategoryFilter::All
    )
  }

  #[test]
  fn rejects_bad_references() {
    let tasks = tasks();
    let rows = all_rows(&tasks);
    for token in ["0", "4", "", "zz-nope"] {
      assert!(
        resolve_task_ref(
          &tasks, &rows, token
        )
        .is_err(),
        "token {token:?}"
      );
    }
  }

  #[test]
  fn numeric_ids_win_over_rows() {
    let mut tasks = tasks();
    tasks[0].id = TaskId::from("3");
    let rows = all_rows(&tasks);
    assert_eq!(
      resolve_task_ref(&tasks, &rows, "3")
        .expect("id"),
      TaskId::from("3")
    );
  }

  #[test]
  fn numeric_prefix_past_last_row_matches_id()
  {
    let mut tasks = tasks();
    tasks[2].id =
      TaskId::from("1700000000000");
    let rows = all_rows(&tasks);
    assert_eq!(
      resolve_task_ref(
        &tasks, &rows, "1700"
      )
      .expect("prefix"),
      TaskId::from("1700000000000")
    );
    assert_eq!(
      resolve_task_ref(&tasks, &rows, "1")
        .expect("row"),
      tasks[0].id
    );
  }

  #[tokio::test(start_paused = true)]
  async fn toggle_uses_rows_of_the_filtered_list()
  {
    let mut session = session();
    for text in ["Alpha", "Bravo"] {
      session
        .add_task(TaskDraft::new(
          text, "work"
        ))
        .expect("created");
    }
    let bravo =
      session.store().tasks()[1].id.clone();
    session.toggle_task(&bravo);

    run(&mut session, Command::Toggle {
      task: "1".to_string(),
      view: view("completed", "all")
    })
    .await
    .expect("toggle");

    let tasks = session.store().tasks();
    assert!(!tasks[0].completed);
    assert!(!tasks[1].completed);
  }

  #[tokio::test(start_paused = true)]
  async fn delete_uses_rows_of_the_filtered_list()
  {
    let mut session = session();
    for (text, category) in [
      ("Alpha", "work"),
      ("Bravo", "health"),
      ("Charlie", "health")
    ] {
      session.add_task(TaskDraft::new(
        text, category
      ));
    }

    run(&mut session, Command::Delete {
      task: "2".to_string(),
      view: view("all", "health")
    })
    .await
    .expect("delete");

    assert_eq!(
      texts(&session),
      vec!["Alpha", "Bravo"]
    );
  }

  #[tokio::test(start_paused = true)]
  async fn edit_keeps_unspecified_fields()
  {
    let mut session = session();
    let due = NaiveDate::from_ymd_opt(
      2026, 5, 4
    );
    session
      .add_task(
        TaskDraft::new("Stretch", "health")
          .with_due_date(due)
      )
      .expect("created");

    run(&mut session, Command::Edit {
      task:         "1".to_string(),
      view:         view("all", "all"),
      text:         None,
      set_category: None,
      priority:     Some(
        "high".to_string()
      ),
      due:          None,
      no_due:       false
    })
    .await
    .expect("edit");

    let task = &session.store().tasks()[0];
    assert_eq!(task.text, "Stretch");
    assert_eq!(task.category, "health");
    assert_eq!(task.due_date, due);
    assert_eq!(
      task.priority,
      Priority::High
    );

    run(&mut session, Command::Edit {
      task:         "1".to_string(),
      view:         view("all", "all"),
      text:         Some(
        "Stretch more".to_string()
      ),
      set_category: Some(
        "personal".to_string()
      ),
      priority:     None,
      due:          None,
      no_due:       true
    })
    .await
    .expect("edit");

    let task = &session.store().tasks()[0];
    assert_eq!(task.text, "Stretch more");
    assert_eq!(task.category, "personal");
    assert_eq!(task.due_date, None);
    assert_eq!(
      task.priority,
      Priority::High
    );
  }

  #[tokio::test(start_paused = true)]
  async fn move_takes_one_based_rows_under_a_filter()
  {
    let mut session = session();
    for (text, category) in [
      ("A", "work"),
      ("x", "personal"),
      ("B", "work"),
      ("C", "work")
    ] {
      session.add_task(TaskDraft::new(
        text, category
      ));
    }

    run(&mut session, Command::Move {
      from: 1,
      to:   3,
      view: view("all", "work")
    })
    .await
    .expect("move");

    assert_eq!(
      texts(&session),
      vec!["x", "B", "C", "A"]
    );

    assert!(
      run(&mut session, Command::Move {
        from: 0,
        to:   1,
        view: view("all", "work")
      })
      .await
      .is_err()
    );
    assert!(
      run(&mut session, Command::Move {
        from: 1,
        to:   4,
        view: view("all", "work")
      })
      .await
      .is_err()
    );
  }

  #[tokio::test(start_paused = true)]
  async fn add_waits_for_the_auto_suggestion()
  {
    let mut session = session();

    run(&mut session, Command::Add {
      text:     vec![
        "Plan".to_string(),
        "the".to_string(),
        "launch".to_string(),
      ],
      category: Some("work".to_string()),
      priority: Some("h".to_string()),
      due:      None
    })
    .await
    .expect("add");

    let task = &session.store().tasks()[0];
    assert_eq!(task.text, "Plan the launch");
    assert_eq!(
      task.priority,
      Priority::High
    );
    assert_eq!(
      session.advisor().requests_issued(),
      1
    );
    assert!(
      session.suggestion().text().is_some()
    );
    assert!(
      session
        .take_pending_suggestions()
        .is_empty()
    );
  }

  #[tokio::test(start_paused = true)]
  async fn blank_input_is_rejected() {
    let mut session = session();
    assert!(
      run(&mut session, Command::Add {
        text:     vec!["  ".to_string()],
        category: None,
        priority: None,
        due:      None
      })
      .await
      .is_err()
    );
    assert!(
      run(&mut session, Command::Ask {
        text: vec![" ".to_string()]
      })
      .await
      .is_err()
    );
    assert_eq!(
      session.advisor().requests_issued(),
      0
    );
  }
}
