use std::sync::Arc;

use anyhow::{Context, Result};
use tasksift_app::{EditorConfig, FilterEditor, FilterService, RecomputeOutcome};
use tasksift_core::{Combinator, CriteriaCatalog, CriteriaList, Criterion, Selection};
use tasksift_store_sqlite::{SavedFilter, SqliteStore};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Data side of the editor: the list being edited and its count refreshes.
///
/// Edits go through [`FilterEditor`] and are applied synchronously; each one
/// spawns a refresh on the runtime. `list` is a snapshot re-read after every
/// edit and whenever a refresh finishes.
pub(super) struct App {
    runtime: Handle,
    editor: FilterEditor,
    store: Arc<Mutex<SqliteStore>>,
    pub(super) catalog: CriteriaCatalog,
    editor_config: EditorConfig,
    pub(super) list: CriteriaList,
    pub(super) saved: Option<SavedFilter>,
    pending: Vec<JoinHandle<RecomputeOutcome>>,
}

impl App {
    pub(super) fn new(
        runtime: Handle,
        store: SqliteStore,
        catalog: CriteriaCatalog,
        editor_config: EditorConfig,
        initial: Option<(SavedFilter, CriteriaList)>,
    ) -> Self {
        let (saved, list) = initial.map_or_else(|| (None, CriteriaList::new()), |(saved, list)| (Some(saved), list));
        let mut app = Self {
            runtime,
            editor: FilterEditor::new(list.clone()),
            store: Arc::new(Mutex::new(store)),
            catalog,
            editor_config,
            list,
            saved,
            pending: Vec::new(),
        };
        app.spawn_refresh();
        app
    }

    pub(super) fn rows_len(&self) -> usize {
        self.list.rows().len()
    }

    pub(super) fn is_refreshing(&self) -> bool {
        !self.pending.is_empty()
    }

    pub(super) fn add(&mut self, criterion: Arc<Criterion>, selection: Selection) -> Result<()> {
        let combinator = self.editor_config.combinator_for_new_row(self.list.len());
        self.runtime
            .block_on(self.editor.add_criterion(criterion, selection, combinator))?;
        self.after_edit(true);
        Ok(())
    }

    pub(super) fn remove(&mut self, index: usize) -> Result<()> {
        self.runtime.block_on(self.editor.remove_at(index))?;
        self.after_edit(true);
        Ok(())
    }

    pub(super) fn cycle_combinator(&mut self, index: usize) -> Result<Combinator> {
        let next = self
            .list
            .rows()
            .get(index)
            .map_or(Combinator::Intersect, |row| row.combinator.next());
        self.runtime.block_on(self.editor.set_combinator(index, next))?;
        self.after_edit(true);
        Ok(next)
    }

    pub(super) fn set_selection(&mut self, index: usize, selection: Selection) -> Result<()> {
        self.runtime.block_on(self.editor.set_selection(index, selection))?;
        self.after_edit(true);
        Ok(())
    }

    /// Move a row; `refresh` is false while a drag is still in progress.
    pub(super) fn move_row(&mut self, from: usize, to: usize, refresh: bool) -> Result<()> {
        self.runtime.block_on(self.editor.move_to(from, to))?;
        self.after_edit(refresh);
        Ok(())
    }

    pub(super) fn refresh(&mut self) {
        self.spawn_refresh();
    }

    /// Collect finished refreshes; returns the error of a failed pass, if any.
    pub(super) fn poll_refreshes(&mut self) -> Option<String> {
        if !self.pending.iter().any(JoinHandle::is_finished) {
            return None;
        }
        let (finished, pending): (Vec<_>, Vec<_>) = self.pending.drain(..).partition(JoinHandle::is_finished);
        self.pending = pending;
        let mut failure = None;
        for handle in finished {
            match self.runtime.block_on(handle) {
                Ok(RecomputeOutcome::Failed(err)) => failure = Some(format!("count failed: {err:#}")),
                Ok(RecomputeOutcome::Applied | RecomputeOutcome::Stale) => {}
                Err(err) => failure = Some(format!("count task failed: {err}")),
            }
        }
        self.resnapshot();
        failure
    }

    /// Wait for every outstanding refresh.
    pub(super) fn settle(&mut self) -> Option<String> {
        let mut failure = None;
        for handle in std::mem::take(&mut self.pending) {
            if let Ok(RecomputeOutcome::Failed(err)) = self.runtime.block_on(handle) {
                failure = Some(format!("count failed: {err:#}"));
            }
        }
        self.resnapshot();
        failure
    }

    pub(super) fn save(&mut self, title: &str) -> Result<SavedFilter> {
        let id = self.saved.as_ref().and_then(|saved| saved.id);
        let now = OffsetDateTime::now_utc();
        let saved = {
            let mut store = self.store.blocking_lock();
            FilterService::new(&mut *store).save(id, title, &self.list, now)
        }
        .context("failed to save filter")?;
        self.saved = Some(saved.clone());
        Ok(saved)
    }

    fn after_edit(&mut self, refresh: bool) {
        self.resnapshot();
        if refresh {
            self.spawn_refresh();
        }
    }

    fn resnapshot(&mut self) {
        self.list = self.runtime.block_on(self.editor.snapshot());
    }

    fn spawn_refresh(&mut self) {
        let _guard = self.runtime.enter();
        let handle = self
            .editor
            .spawn_refresh(Arc::clone(&self.store), OffsetDateTime::now_utc());
        self.pending.push(handle);
    }
}
