use std::path::Path;

use anyhow::{Context, Result, bail};
use tasksift_app::{FilterRef, FilterService, ProjectConfig, apply_defaults, load_catalog};
use tasksift_core::{CriteriaCatalog, CriteriaList, CriterionKind};
use tasksift_store_sqlite::{NewTask, SavedFilter, SqliteStore, TaskRow};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};

use crate::{Command, FilterCommand, TaskCommand, tui};

mod criterion_arg;

pub use criterion_arg::{CriterionArg, build_list};

/// Open the project at `workdir` and run `command` against it.
pub fn execute(workdir: &Path, command: Command) -> Result<()> {
    let config = ProjectConfig::from_workdir(workdir)?;
    let database = config.database_path(workdir);
    let store = SqliteStore::open(&database)
        .with_context(|| format!("failed to open task database {}", database.display()))?;
    match command {
        Command::Tui { filter } => tui::run(store, &config, filter.as_deref()),
        other => {
            let mut session = Session { store, config };
            run(other, &mut session, OffsetDateTime::now_utc())
        }
    }
}

/// Store and configuration shared by the non-interactive commands.
pub struct Session {
    pub store: SqliteStore,
    pub config: ProjectConfig,
}

impl Session {
    fn catalog(&self) -> Result<CriteriaCatalog> {
        load_catalog(&self.store, &self.config)
    }

    fn list_from_args(&self, args: &[CriterionArg]) -> Result<CriteriaList> {
        build_list(args, &self.catalog()?, &self.config.editor)
    }

    fn load_filter(&mut self, raw: &str) -> Result<(SavedFilter, CriteriaList)> {
        let catalog = self.catalog()?;
        FilterService::new(&mut self.store).load(&FilterRef::parse(raw), &catalog)
    }
}

pub fn run(command: Command, session: &mut Session, now: OffsetDateTime) -> Result<()> {
    match command {
        Command::Task(task) => run_task(task, session, now),
        Command::Criteria => {
            for criterion in &session.catalog()? {
                println!("{}", describe_criterion(criterion));
            }
            Ok(())
        }
        Command::Filter(filter) => run_filter(filter, session, now),
        Command::Tui { .. } => bail!("the editor needs an interactive terminal"),
    }
}

fn run_task(command: TaskCommand, session: &mut Session, now: OffsetDateTime) -> Result<()> {
    match command {
        TaskCommand::Add {
            title,
            notes,
            importance,
            due,
            tags,
            list,
            parent,
            filter,
        } => {
            let mut task = NewTask {
                notes,
                ..NewTask::titled(title)
            };
            if let Some(raw) = filter {
                let (saved, _) = session.load_filter(&raw)?;
                apply_defaults(&mut task, &saved.values, now);
            }
            if let Some(importance) = importance {
                task.importance = Some(importance);
            }
            if let Some(raw) = due {
                task.due_date = Some(parse_due(&raw, now)?);
            }
            if list.is_some() {
                task.list = list;
            }
            if parent.is_some() {
                task.parent = parent;
            }
            for tag in tags {
                if !task.tags.contains(&tag) {
                    task.tags.push(tag);
                }
            }
            let id = session.store.insert_task(&task, now)?;
            println!("created task {id}: {}", task.title);
            Ok(())
        }
        TaskCommand::Ls {
            criteria,
            filter,
            limit,
        } => {
            let list = match filter {
                Some(raw) => session.load_filter(&raw)?.1,
                None => session.list_from_args(&criteria)?,
            };
            let limit = limit.unwrap_or(session.config.editor.preview_limit);
            let tasks = session.store.search(&list.to_predicate(now), limit)?;
            for task in &tasks {
                println!("{}", format_task(task));
            }
            Ok(())
        }
        TaskCommand::Done { id } => {
            session.store.complete_task(id, now)?;
            println!("completed task {id}");
            Ok(())
        }
    }
}

fn run_filter(command: FilterCommand, session: &mut Session, now: OffsetDateTime) -> Result<()> {
    match command {
        FilterCommand::Preview { criteria } => {
            let mut list = session.list_from_args(&criteria)?;
            list.recompute(&session.store, now)?;
            print_rows(&list);
            println!("\nWHERE{}", list.to_sql(now).trim_start_matches(" WHERE"));
            Ok(())
        }
        FilterCommand::Save { title, criteria } => {
            let list = session.list_from_args(&criteria)?;
            let saved = FilterService::new(&mut session.store).save(None, &title, &list, now)?;
            println!("saved filter {}: {}", saved.id.unwrap_or_default(), saved.title);
            Ok(())
        }
        FilterCommand::Show { filter } => {
            let (saved, mut list) = session.load_filter(&filter)?;
            list.recompute(&session.store, now)?;
            println!("{} (id {})", saved.title, saved.id.unwrap_or_default());
            print_rows(&list);
            if !saved.values.is_empty() {
                println!("\nnew tasks get:");
                for (field, value) in &saved.values {
                    println!("  {field} = {value}");
                }
            }
            Ok(())
        }
        FilterCommand::Ls => {
            for saved in FilterService::new(&mut session.store).list()? {
                println!("{:>4}  {}", saved.id.unwrap_or_default(), saved.title);
            }
            Ok(())
        }
        FilterCommand::Mv { filter, position } => {
            FilterService::new(&mut session.store).reorder(&FilterRef::parse(&filter), position)?;
            println!("moved {filter} to position {position}");
            Ok(())
        }
        FilterCommand::Rm { filter } => {
            let removed = FilterService::new(&mut session.store).delete(&FilterRef::parse(&filter))?;
            println!("deleted filter {}", removed.title);
            Ok(())
        }
        FilterCommand::Rename { filter, title } => {
            let renamed = FilterService::new(&mut session.store).rename(&FilterRef::parse(&filter), &title)?;
            println!("renamed filter {} to {}", renamed.id.unwrap_or_default(), renamed.title);
            Ok(())
        }
    }
}

/// RFC 3339 timestamp, or a relative token (`NOW`, `EOD`, `EOD+n`, `EOD-n`).
fn parse_due(raw: &str, now: OffsetDateTime) -> Result<OffsetDateTime> {
    if let Ok(at) = OffsetDateTime::parse(raw.trim(), &Rfc3339) {
        return Ok(at);
    }
    match tasksift_core::sql::resolve_option_value(raw, now) {
        tasksift_core::SqlValue::Integer(millis) => Ok(OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(millis)),
        _ => bail!("cannot parse due date `{raw}` (use RFC 3339 or EOD+n)"),
    }
}

fn describe_criterion(criterion: &tasksift_core::Criterion) -> String {
    let kind = match criterion.kind() {
        CriterionKind::Boolean { .. } => "boolean".to_owned(),
        CriterionKind::SingleSelect { options, .. } => format!("one of {}", option_values(options)),
        CriterionKind::MultiSelect { options, .. } => format!("any of {}", option_values(options)),
        CriterionKind::TextInput { .. } => "text".to_owned(),
    };
    format!("{:<14} {:<24} {kind}", criterion.identifier(), criterion.title())
}

fn option_values(options: &[tasksift_core::SelectOption]) -> String {
    let values: Vec<&str> = options.iter().map(|option| option.value.as_str()).collect();
    if values.is_empty() {
        "(none yet)".to_owned()
    } else {
        values.join(", ")
    }
}

fn print_rows(list: &CriteriaList) {
    for (index, row) in list.rows().iter().enumerate() {
        println!("{index:>3}  {:<48} {:>6}", row.describe(), row.counts.end);
    }
}

fn format_task(task: &TaskRow) -> String {
    let importance = match task.importance {
        0 => "!!!",
        1 => "!! ",
        2 => "!  ",
        _ => "   ",
    };
    let mut parts = vec![format!("{:>5} {importance} {}", task.id, task.title)];
    if task.due_date > 0 {
        let due = OffsetDateTime::UNIX_EPOCH + Duration::milliseconds(task.due_date);
        parts.push(format!(" due {}", due.date()));
    }
    if !task.list.is_empty() {
        parts.push(format!(" [{}]", task.list));
    }
    let mut line = parts.join(" ");
    for tag in &task.tags {
        line.push_str(" #");
        line.push_str(tag);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Cli;
    use clap::Parser;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

    fn session() -> Session {
        let store = SqliteStore::open_in_memory().unwrap_or_else(|err| panic!("store: {err}"));
        Session {
            store,
            config: ProjectConfig::default(),
        }
    }

    fn run_args(session: &mut Session, args: &[&str]) -> Result<()> {
        let cli = Cli::try_parse_from(std::iter::once("tasksift").chain(args.iter().copied()))?;
        run(cli.cmd, session, NOW)
    }

    #[test]
    fn task_add_merges_filter_defaults_and_flags() -> Result<()> {
        let mut session = session();
        run_args(&mut session, &["task", "add", "--title", "seed", "--list", "errands"])?;
        run_args(
            &mut session,
            &["filter", "save", "--title", "Errands", "-c", "list=errands", "-c", "importance=1"],
        )?;
        run_args(
            &mut session,
            &["task", "add", "--title", "Buy milk", "--filter", "Errands", "--tag", "shop", "--due", "EOD"],
        )?;

        let task = session.store.task(2)?.context("task 2")?;
        assert_eq!(task.list, "errands");
        assert_eq!(task.importance, 1);
        assert_eq!(task.tags, vec!["shop".to_owned()]);
        assert_eq!(task.due_date, tasksift_core::sql::epoch_millis(datetime!(2025-06-01 23:59:59.999 UTC)));
        Ok(())
    }

    #[test]
    fn filter_lifecycle() -> Result<()> {
        let mut session = session();
        run_args(&mut session, &["task", "add", "--title", "a", "--tag", "work"])?;
        run_args(&mut session, &["filter", "save", "--title", "Work", "-c", "tag_is=work"])?;
        run_args(&mut session, &["filter", "save", "--title", "Done", "-c", "or:completed"])?;
        run_args(&mut session, &["filter", "mv", "Done", "0"])?;
        run_args(&mut session, &["filter", "rename", "Work", "Office"])?;
        run_args(&mut session, &["filter", "show", "Office"])?;

        let titles: Vec<String> = FilterService::new(&mut session.store)
            .list()?
            .into_iter()
            .map(|filter| filter.title)
            .collect();
        assert_eq!(titles, vec!["Done".to_owned(), "Office".to_owned()]);

        run_args(&mut session, &["filter", "rm", "Done"])?;
        assert_eq!(FilterService::new(&mut session.store).list()?.len(), 1);
        Ok(())
    }

    #[test]
    fn save_rejects_duplicate_titles() -> Result<()> {
        let mut session = session();
        run_args(&mut session, &["filter", "save", "--title", "Mine", "-c", "completed"])?;
        let err = run_args(&mut session, &["filter", "save", "--title", "Mine", "-c", "hidden"])
            .err()
            .context("duplicate title should fail")?;
        assert!(err.to_string().contains("already exists"));
        Ok(())
    }

    #[test]
    fn due_accepts_rfc3339_and_tokens() -> Result<()> {
        assert_eq!(parse_due("2025-07-04T10:00:00Z", NOW)?, datetime!(2025-07-04 10:00 UTC));
        assert_eq!(parse_due("EOD+1", NOW)?, datetime!(2025-06-02 23:59:59.999 UTC));
        assert!(parse_due("tomorrow-ish", NOW).is_err());
        Ok(())
    }

    #[test]
    fn task_lines_show_due_list_and_tags() {
        let task = TaskRow {
            id: 7,
            title: "Call O'Brien".into(),
            notes: String::new(),
            importance: 0,
            due_date: tasksift_core::sql::epoch_millis(datetime!(2025-06-03 09:00 UTC)),
            hide_until: 0,
            completed: 0,
            list: "inbox".into(),
            parent: 0,
            tags: vec!["phone".into()],
        };
        assert_eq!(format_task(&task), "    7 !!! Call O'Brien  due 2025-06-03  [inbox] #phone");
    }
}
