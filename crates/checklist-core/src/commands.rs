use std::io::{BufRead, Write};

use anyhow::{Context, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::config::Config;
use crate::render::Renderer;
use crate::store::{DeleteTarget, Intent, Outcome, PendingDeletion, Store};
use crate::task::TaskId;
use crate::view::{FilterMode, SortMode};

pub fn known_command_names() -> Vec<&'static str> {
    vec![
        "add", "toggle", "done", "select", "delete", "sort", "filter", "list", "export", "help",
        "quit", "exit",
    ]
}

pub fn expand_command_abbrev<'a>(token: &'a str, known: &[&'a str]) -> Option<&'a str> {
    if known.contains(&token) {
        return Some(token);
    }

    let mut matches = known.iter().copied().filter(|name| name.starts_with(token));
    let first = matches.next()?;
    if matches.next().is_some() {
        None
    } else {
        Some(first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Line-oriented front end over a [`Store`].
pub struct Shell<W: Write> {
    store: Store,
    renderer: Renderer,
    confirm_deletes: bool,
    interactive: bool,
    out: W,
}

impl<W: Write> Shell<W> {
    pub fn new(cfg: &Config, out: W) -> anyhow::Result<Self> {
        let store = Store::new(cfg.sort_mode()?, cfg.filter_mode()?);
        Ok(Self {
            store,
            renderer: Renderer::new(cfg)?,
            confirm_deletes: cfg.confirm_deletes()?,
            interactive: false,
            out,
        })
    }

    pub fn with_store(store: Store, renderer: Renderer, confirm_deletes: bool, out: W) -> Self {
        Self {
            store,
            renderer,
            confirm_deletes,
            interactive: false,
            out,
        }
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Reads commands until end of input or `quit`. Command errors are
    /// reported and the loop continues; only I/O failures end it early.
    #[instrument(skip_all)]
    pub fn run<R: BufRead>(&mut self, input: R) -> anyhow::Result<()> {
        self.prompt()?;
        for line in input.lines() {
            let line = line.context("failed reading command input")?;

            let flow = if self.store.pending_deletion().is_pending() {
                self.answer_confirmation(&line)?;
                Flow::Continue
            } else {
                match self.execute_line(&line) {
                    Ok(flow) => flow,
                    Err(err) => {
                        warn!(error = %err, line = %line, "command failed");
                        writeln!(self.out, "error: {err:#}")?;
                        Flow::Continue
                    }
                }
            };

            if flow == Flow::Quit {
                info!("quit requested");
                break;
            }
            self.prompt()?;
        }

        if self.store.pending_deletion().is_pending() {
            debug!("input ended with a pending deletion; cancelling");
            self.store.cancel_delete();
        }
        self.out.flush()?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn execute_line(&mut self, line: &str) -> anyhow::Result<Flow> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(Flow::Continue);
        }

        let (token, rest) = match line.split_once(char::is_whitespace) {
            Some((token, rest)) => (token, rest.trim()),
            None => (line, ""),
        };
        let token = token.to_ascii_lowercase();
        let known = known_command_names();
        let command = expand_command_abbrev(&token, &known)
            .ok_or_else(|| anyhow!("unknown command: {token} (try `help`)"))?;

        debug!(command, args = %rest, "dispatching command");

        match command {
            "add" => self.cmd_add(rest),
            "toggle" | "done" => self.cmd_toggle(rest),
            "select" => self.cmd_select(rest),
            "delete" => self.cmd_delete(rest),
            "sort" => self.cmd_sort(rest),
            "filter" => self.cmd_filter(rest),
            "list" => self.cmd_list(),
            "export" => self.cmd_export(),
            "help" => self.cmd_help(),
            "quit" | "exit" => return Ok(Flow::Quit),
            other => Err(anyhow!("unknown command: {other}")),
        }?;

        Ok(Flow::Continue)
    }

    fn answer_confirmation(&mut self, line: &str) -> anyhow::Result<()> {
        let answer = line.trim().to_ascii_lowercase();
        let intent = if matches!(answer.as_str(), "y" | "yes" | "confirm") {
            Intent::ConfirmDelete
        } else {
            Intent::CancelDelete
        };
        let outcome = self.store.dispatch(intent);
        self.report(outcome)
    }

    fn cmd_add(&mut self, text: &str) -> anyhow::Result<()> {
        let outcome = self.store.dispatch(Intent::Add(text.to_string()));
        self.report(outcome)
    }

    fn cmd_toggle(&mut self, args: &str) -> anyhow::Result<()> {
        let id = parse_id(args, "toggle")?;
        let outcome = self.store.dispatch(Intent::ToggleComplete(id));
        self.report_for(id, outcome)
    }

    fn cmd_select(&mut self, args: &str) -> anyhow::Result<()> {
        let id = parse_id(args, "select")?;
        let outcome = self.store.dispatch(Intent::ToggleSelect(id));
        self.report_for(id, outcome)
    }

    fn cmd_delete(&mut self, args: &str) -> anyhow::Result<()> {
        let target = parse_delete_target(args)?;
        let outcome = self.store.dispatch(Intent::RequestDelete(target));

        match (target, &outcome) {
            (DeleteTarget::Task(id), Outcome::Ignored) => {
                writeln!(self.out, "No task {id}.")?;
                return Ok(());
            }
            (_, Outcome::ConfirmationRequested(_)) if !self.confirm_deletes => {
                debug!("confirmation disabled; deleting immediately");
                let outcome = self.store.dispatch(Intent::ConfirmDelete);
                return self.report(outcome);
            }
            _ => {}
        }

        self.report(outcome)
    }

    fn cmd_sort(&mut self, args: &str) -> anyhow::Result<()> {
        let mode: SortMode = require_arg(args, "sort")?.parse()?;
        let outcome = self.store.dispatch(Intent::SetSort(mode));
        self.report(outcome)
    }

    fn cmd_filter(&mut self, args: &str) -> anyhow::Result<()> {
        let mode: FilterMode = require_arg(args, "filter")?.parse()?;
        let outcome = self.store.dispatch(Intent::SetFilter(mode));
        self.report(outcome)
    }

    fn cmd_list(&mut self) -> anyhow::Result<()> {
        self.renderer.print_status(
            &mut self.out,
            self.store.sort_mode(),
            self.store.filter_mode(),
            self.store.selection_len(),
        )?;
        let visible = self.store.visible_tasks();
        self.renderer.print_task_table(&mut self.out, &visible)
    }

    fn cmd_export(&mut self) -> anyhow::Result<()> {
        let visible = self.store.visible_tasks();
        let json = serde_json::to_string_pretty(&visible)?;
        writeln!(self.out, "{json}")?;
        Ok(())
    }

    fn cmd_help(&mut self) -> anyhow::Result<()> {
        writeln!(
            self.out,
            "Commands: add <text>, toggle|done <id>, select <id>, \
             delete <id>|selected, sort <latest|oldest|completed_first|uncompleted_first>, \
             filter <all|active|completed>, list, export, help, quit"
        )?;
        Ok(())
    }

    fn report_for(&mut self, id: TaskId, outcome: Outcome) -> anyhow::Result<()> {
        if outcome == Outcome::Ignored {
            writeln!(self.out, "No task {id}.")?;
            return Ok(());
        }
        self.report(outcome)
    }

    fn report(&mut self, outcome: Outcome) -> anyhow::Result<()> {
        match outcome {
            Outcome::Added(id) => writeln!(self.out, "Created task {id}.")?,
            Outcome::Toggled { id, completed } => {
                let state = if completed { "completed" } else { "open" };
                writeln!(self.out, "Task {id} marked {state}.")?;
            }
            Outcome::Selected { id, selected } => {
                let state = if selected { "selected" } else { "deselected" };
                writeln!(self.out, "Task {id} {state}.")?;
            }
            Outcome::SortChanged(mode) => writeln!(self.out, "Sort: {mode}.")?,
            Outcome::FilterChanged(mode) => writeln!(self.out, "Filter: {mode}.")?,
            Outcome::ConfirmationRequested(pending) => {
                if pending == PendingDeletion::Bulk && !self.store.has_selection() {
                    writeln!(self.out, "No tasks selected.")?;
                }
                if let Some(message) = pending.message() {
                    self.renderer.print_confirmation(&mut self.out, message)?;
                }
            }
            Outcome::Deleted(removed) => {
                let noun = if removed.len() == 1 { "task" } else { "tasks" };
                writeln!(self.out, "Deleted {} {noun}.", removed.len())?;
            }
            Outcome::Cancelled => writeln!(self.out, "Deletion cancelled.")?,
            Outcome::Ignored => writeln!(self.out, "Nothing to add: task text is empty.")?,
        }
        Ok(())
    }

    fn prompt(&mut self) -> anyhow::Result<()> {
        if self.interactive {
            write!(self.out, "> ")?;
            self.out.flush()?;
        }
        Ok(())
    }
}

fn require_arg<'a>(args: &'a str, command: &str) -> anyhow::Result<&'a str> {
    let arg = args.trim();
    if arg.is_empty() {
        return Err(anyhow!("{command} requires an argument"));
    }
    Ok(arg)
}

fn parse_id(args: &str, command: &str) -> anyhow::Result<TaskId> {
    require_arg(args, command)?.parse()
}

fn parse_delete_target(args: &str) -> anyhow::Result<DeleteTarget> {
    let arg = require_arg(args, "delete")?;
    match arg.to_ascii_lowercase().as_str() {
        "selected" | "bulk" => Ok(DeleteTarget::Selected),
        _ => Ok(DeleteTarget::Task(arg.parse()?)),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::{Flow, Shell, expand_command_abbrev, known_command_names};
    use crate::render::Renderer;
    use crate::store::Store;

    fn shell(confirm: bool) -> Shell<Vec<u8>> {
        Shell::with_store(Store::default(), Renderer::plain(), confirm, Vec::new())
    }

    fn run(shell: &mut Shell<Vec<u8>>, script: &str) {
        shell.run(Cursor::new(script.to_string())).expect("run");
    }

    fn texts(shell: &Shell<Vec<u8>>) -> Vec<String> {
        shell
            .store()
            .visible_tasks()
            .into_iter()
            .map(|task| task.text)
            .collect()
    }

    #[test]
    fn abbreviations_resolve_only_when_unambiguous() {
        let known = known_command_names();
        assert_eq!(expand_command_abbrev("se", &known), Some("select"));
        assert_eq!(expand_command_abbrev("so", &known), Some("sort"));
        assert_eq!(expand_command_abbrev("de", &known), Some("delete"));
        assert_eq!(expand_command_abbrev("d", &known), None);
        assert_eq!(expand_command_abbrev("e", &known), None);
    }

    #[test]
    fn single_delete_waits_for_confirmation() {
        let mut sh = shell(true);
        run(&mut sh, "add Todo to Delete\ndelete 1\n");
        let out = String::from_utf8(sh.into_output()).expect("utf8");
        assert!(out.contains("Are you sure you want to delete this todo?"));

        let mut sh = shell(true);
        run(&mut sh, "add Todo to Delete\ndelete 1\nyes\n");
        assert!(texts(&sh).is_empty());
    }

    #[test]
    fn any_other_answer_cancels() {
        let mut sh = shell(true);
        run(&mut sh, "add keep me\ndelete 1\nwhat?\nlist\n");
        assert_eq!(texts(&sh), vec!["keep me"]);
        assert!(!sh.store().pending_deletion().is_pending());

        let out = String::from_utf8(sh.into_output()).expect("utf8");
        assert!(out.contains("Deletion cancelled."));
    }

    #[test]
    fn bulk_delete_removes_selected_only() {
        let mut sh = shell(true);
        run(
            &mut sh,
            "add Todo X\nadd Todo Y\nadd Todo Z\nselect 1\nselect 3\ndelete selected\ny\n",
        );
        assert_eq!(texts(&sh), vec!["Todo Y"]);
        assert_eq!(sh.store().selection_len(), 0);

        let out = String::from_utf8(sh.into_output()).expect("utf8");
        assert!(out.contains("Are you sure you want to delete selected todos?"));
        assert!(out.contains("Deleted 2 tasks."));
    }

    #[test]
    fn confirmation_can_be_disabled() {
        let mut sh = shell(false);
        run(&mut sh, "add a\nadd b\ndelete 2\nlist\n");
        assert_eq!(texts(&sh), vec!["a"]);
    }

    #[test]
    fn errors_do_not_stop_the_shell() {
        let mut sh = shell(true);
        run(&mut sh, "frobnicate\nsort sideways\ntoggle abc\nadd still here\n");
        assert_eq!(texts(&sh), vec!["still here"]);

        let out = String::from_utf8(sh.into_output()).expect("utf8");
        assert_eq!(out.matches("error:").count(), 3);
    }

    #[test]
    fn quit_stops_reading() {
        let mut sh = shell(true);
        run(&mut sh, "add one\nquit\nadd two\n");
        assert_eq!(texts(&sh), vec!["one"]);
        assert_eq!(sh.execute_line("exit").expect("exit"), Flow::Quit);
    }

    #[test]
    fn sort_and_filter_commands_drive_view() {
        let mut sh = shell(true);
        run(
            &mut sh,
            "add Todo A\nadd Todo B\nadd Todo C\ndone 2\nfilter active\nsort oldest\n",
        );
        assert_eq!(texts(&sh), vec!["Todo A", "Todo C"]);

        sh.execute_line("filter completed").expect("filter");
        assert_eq!(texts(&sh), vec!["Todo B"]);
    }

    #[test]
    fn export_prints_visible_view_as_json() {
        let mut sh = shell(true);
        run(&mut sh, "add first\nselect 1\nexport\n");
        let out = String::from_utf8(sh.into_output()).expect("utf8");
        let start = out.find('[').expect("json start");
        let rows: serde_json::Value = serde_json::from_str(&out[start..]).expect("json");
        assert_eq!(rows[0]["text"], "first");
        assert_eq!(rows[0]["selected"], true);
        assert_eq!(rows[0]["completed"], false);
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        let mut sh = shell(true);
        run(&mut sh, "\n# a comment\n   \nadd x\n");
        assert_eq!(texts(&sh), vec!["x"]);
    }
}
