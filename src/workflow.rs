use crate::browser::{recoverable, Browser, BrowserResult};
use crate::config::Config;
use crate::extract;
use crate::fetch::Fetch;
use crate::locate;
use crate::model::{
    CaptureOutcome, CapturedCase, CaseDetail, Document, DocumentKind, ListingRow,
};
use crate::paginate::{self, PageIndex};
use crate::sink::CaseSink;
use crate::util::{file_component, settle, unique_path};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use url::Url;

/// Request to stop the run. The batch checks it before each row starts,
/// never mid-row; interactive waits race it through [`AbortFlag::until_abort`].
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AbortInner>);

#[derive(Debug, Default)]
struct AbortInner {
    requested: AtomicBool,
    notify: Notify,
}

impl AbortFlag {
    pub fn request(&self) {
        self.0.requested.store(true, Ordering::SeqCst);
        self.0.notify.notify_waiters();
    }

    pub fn is_requested(&self) -> bool {
        self.0.requested.load(Ordering::SeqCst)
    }

    /// Resolves once an abort has been requested.
    pub async fn wait(&self) {
        loop {
            let notified = self.0.notify.notified();
            if self.is_requested() {
                return;
            }
            notified.await;
        }
    }

    /// Run `fut` unless an abort comes first. `None` means aborted.
    pub async fn until_abort<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_requested() {
            return None;
        }
        tokio::select! {
            _ = self.wait() => None,
            out = fut => Some(out),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    Aborted,
    SessionLost(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseRecord {
    pub case: CapturedCase,
    pub stored_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub cases: Vec<CaseRecord>,
    /// Serials that never reached a `CapturedCase` because the batch halted.
    pub unattempted: Vec<String>,
    pub halted: Option<HaltReason>,
}

impl BatchOutcome {
    pub fn completed(&self) -> usize {
        self.cases
            .iter()
            .filter(|r| r.case.outcome == CaptureOutcome::Completed)
            .count()
    }
}

struct SavedFile {
    path: PathBuf,
    document: Document,
}

/// Per-row states. Between rows the controller is idle.
enum CaptureState {
    RowSelected(ListingRow),
    DetailOpen(ListingRow),
    Extracted {
        row: ListingRow,
        detail: CaseDetail,
        snapshot: Option<SavedFile>,
        html: String,
        base_url: String,
    },
    Saved {
        row: ListingRow,
        detail: CaseDetail,
        snapshot: Option<SavedFile>,
        attachments: Vec<SavedFile>,
    },
    Returned(CapturedCase, Vec<Document>),
    SkippedNoAction(CapturedCase),
}

impl CaptureState {
    fn name(&self) -> &'static str {
        match self {
            CaptureState::RowSelected(_) => "RowSelected",
            CaptureState::DetailOpen(_) => "DetailOpen",
            CaptureState::Extracted { .. } => "Extracted",
            CaptureState::Saved { .. } => "Saved",
            CaptureState::Returned(..) => "Returned",
            CaptureState::SkippedNoAction(_) => "SkippedNoAction",
        }
    }
}

pub struct CaptureWorkflow<'a> {
    cfg: &'a Config,
    browser: &'a dyn Browser,
    fetcher: &'a dyn Fetch,
    sink: &'a mut dyn CaseSink,
    download_dir: PathBuf,
    debug_dir: Option<PathBuf>,
    abort: AbortFlag,
    pages: PageIndex,
}

impl<'a> CaptureWorkflow<'a> {
    pub fn new(
        cfg: &'a Config,
        browser: &'a dyn Browser,
        fetcher: &'a dyn Fetch,
        sink: &'a mut dyn CaseSink,
        download_dir: &Path,
    ) -> Self {
        Self {
            cfg,
            browser,
            fetcher,
            sink,
            download_dir: download_dir.to_path_buf(),
            debug_dir: None,
            abort: AbortFlag::default(),
            pages: PageIndex::default(),
        }
    }

    pub fn with_abort(mut self, abort: AbortFlag) -> Self {
        self.abort = abort;
        self
    }

    pub fn with_debug_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.debug_dir = dir;
        self
    }

    /// Where each serial was listed. Rows on another page than the one shown
    /// are paged back to before their control is looked up.
    pub fn with_page_index(mut self, pages: PageIndex) -> Self {
        self.pages = pages;
        self
    }

    /// Capture every row in order. Each row yields exactly one record unless
    /// the batch halts, in which case the rows left over are listed in
    /// `unattempted`.
    pub async fn run(&mut self, rows: Vec<ListingRow>) -> BatchOutcome {
        let total = rows.len();
        let mut outcome = BatchOutcome::default();
        let mut pending = rows.into_iter().enumerate();

        while let Some((i, row)) = pending.next() {
            if self.abort.is_requested() {
                warn!("abort requested; {} rows left", total - i);
                outcome.halted = Some(HaltReason::Aborted);
                outcome.unattempted.push(row.serial);
                outcome.unattempted.extend(pending.by_ref().map(|(_, r)| r.serial));
                break;
            }
            if i > 0 {
                settle(self.cfg.timing.between_rows_ms).await;
            }

            info!("row {}/{}: serial {}", i + 1, total, row.serial);
            let serial = row.serial.clone();
            match self.capture_row(row).await {
                Ok((case, documents)) => {
                    let stored_id = self.record(&case, &documents);
                    outcome.cases.push(CaseRecord { case, stored_id });
                }
                Err(e) => {
                    warn!("halting batch at serial {serial}: {e}");
                    outcome.halted = Some(HaltReason::SessionLost(e.to_string()));
                    outcome.unattempted.push(serial);
                    outcome.unattempted.extend(pending.by_ref().map(|(_, r)| r.serial));
                    break;
                }
            }
        }

        info!(
            "batch done: {} completed, {} failed, {} unattempted",
            outcome.completed(),
            outcome.cases.len() - outcome.completed(),
            outcome.unattempted.len()
        );
        outcome
    }

    /// Drive one row through the state machine. Only a fatal browser error
    /// escapes; everything else degrades inside the row.
    async fn capture_row(
        &self,
        row: ListingRow,
    ) -> BrowserResult<(CapturedCase, Vec<Document>)> {
        let mut state = CaptureState::RowSelected(row);
        loop {
            state = match state {
                CaptureState::RowSelected(row) => self.open_detail(row).await?,
                CaptureState::DetailOpen(row) => self.snapshot_and_extract(row).await?,
                CaptureState::Extracted {
                    row,
                    detail,
                    snapshot,
                    html,
                    base_url,
                } => {
                    let attachments = self.harvest_attachments(&row, &html, &base_url).await?;
                    CaptureState::Saved {
                        row,
                        detail,
                        snapshot,
                        attachments,
                    }
                }
                CaptureState::Saved {
                    row,
                    detail,
                    snapshot,
                    attachments,
                } => {
                    self.return_to_listing().await?;
                    finish(row, detail, snapshot, attachments)
                }
                CaptureState::Returned(case, documents) => return Ok((case, documents)),
                CaptureState::SkippedNoAction(case) => return Ok((case, Vec::new())),
            };
            debug!("-> {}", state.name());
        }
    }

    async fn open_detail(&self, row: ListingRow) -> BrowserResult<CaptureState> {
        self.seek_row_page(&row.serial).await?;
        let attempts = self.cfg.limits.locate_attempts.max(1);
        let intent = locate::action_control(&row.serial);
        for attempt in 1..=attempts {
            settle(self.cfg.timing.before_locate_ms).await;
            let Some(found) = intent.resolve(self.browser).await? else {
                debug!("{}: attempt {attempt}/{attempts} found nothing", intent.intent());
                continue;
            };
            if recoverable(self.browser.click(found.handle).await)?.is_none() {
                debug!("{}: click on attempt {attempt} did not land", intent.intent());
                continue;
            }
            settle(self.cfg.timing.after_click_ms).await;
            return Ok(CaptureState::DetailOpen(row));
        }

        warn!("serial {}: no action control found", row.serial);
        self.dump_listing(&row.serial).await?;
        Ok(CaptureState::SkippedNoAction(CapturedCase::failed_no_action(row)))
    }

    async fn seek_row_page(&self, serial: &str) -> BrowserResult<()> {
        if self.pages.page_count() < 2 {
            return Ok(());
        }
        let Some(target) = self.pages.page_of(serial) else {
            return Ok(());
        };
        let reached =
            paginate::seek_page(self.browser, &self.pages, target, self.cfg.timing.after_page_ms)
                .await?;
        if !reached {
            warn!("serial {serial}: could not return to listing page {target}");
        }
        Ok(())
    }

    async fn snapshot_and_extract(&self, row: ListingRow) -> BrowserResult<CaptureState> {
        let snapshot = match recoverable(self.browser.render_to_document().await)? {
            Some(bytes) => {
                let name = format!("serial_{}.pdf", file_component(&row.serial));
                self.save(&name, DocumentKind::Snapshot, bytes, false)
            }
            None => {
                warn!("serial {}: page snapshot failed", row.serial);
                None
            }
        };

        let html = recoverable(self.browser.page_source().await)?.unwrap_or_default();
        let detail = extract::case_detail(&extract::page_text(&html));
        if detail.is_empty() {
            warn!("serial {}: no case fields recognised on detail page", row.serial);
        }
        let base_url = recoverable(self.browser.current_url().await)?
            .unwrap_or_else(|| self.cfg.portal.url.clone());

        Ok(CaptureState::Extracted {
            row,
            detail,
            snapshot,
            html,
            base_url,
        })
    }

    async fn harvest_attachments(
        &self,
        row: &ListingRow,
        html: &str,
        base_url: &str,
    ) -> BrowserResult<Vec<SavedFile>> {
        let links = extract::document_links(html, base_url);
        if links.is_empty() {
            return Ok(Vec::new());
        }
        let cookies = recoverable(self.browser.cookies().await)?.unwrap_or_default();
        let timeout = self.cfg.limits.download_timeout();

        let mut saved = Vec::new();
        for link in links {
            match self.fetcher.get(&link, &cookies, timeout).await {
                Ok(bytes) => {
                    if let Some(s) =
                        self.save(&attachment_name(&link), DocumentKind::Attachment, bytes, true)
                    {
                        saved.push(s);
                    }
                }
                Err(e) => warn!("serial {}: skipping attachment {link}: {e:#}", row.serial),
            }
        }
        Ok(saved)
    }

    /// Back to the listing through an in-page control if there is one, else
    /// through browser history. Either way counts as success.
    async fn return_to_listing(&self) -> BrowserResult<()> {
        let back = locate::back_control();
        if let Some(found) = back.resolve(self.browser).await? {
            if recoverable(self.browser.click(found.handle).await)?.is_some() {
                debug!("returned via {}", found.strategy);
                settle(self.cfg.timing.after_back_ms).await;
                return Ok(());
            }
        }
        if let Err(e) = self.browser.history_back().await {
            if e.is_fatal() {
                return Err(e);
            }
            warn!("history back failed: {e}");
        }
        settle(self.cfg.timing.after_back_ms).await;
        Ok(())
    }

    fn save(
        &self,
        name: &str,
        kind: DocumentKind,
        bytes: Vec<u8>,
        fresh: bool,
    ) -> Option<SavedFile> {
        let path = if fresh {
            unique_path(&self.download_dir, name)
        } else {
            self.download_dir.join(name)
        };
        if let Err(e) = std::fs::write(&path, &bytes) {
            warn!("writing {}: {e}", path.display());
            return None;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| name.to_string());
        Some(SavedFile {
            path,
            document: Document {
                file_name,
                kind,
                bytes,
            },
        })
    }

    fn record(&mut self, case: &CapturedCase, documents: &[Document]) -> Option<String> {
        if case.outcome != CaptureOutcome::Completed {
            return None;
        }
        match self.sink.store(case, documents) {
            Ok(id) => {
                info!("serial {}: stored as {id}", case.row.serial);
                Some(id)
            }
            Err(e) => {
                warn!("serial {}: storing case failed: {e:#}", case.row.serial);
                None
            }
        }
    }

    async fn dump_listing(&self, serial: &str) -> BrowserResult<()> {
        if !self.cfg.debug.dump_page_on_failure {
            return Ok(());
        }
        let Some(dir) = &self.debug_dir else {
            return Ok(());
        };
        let Some(html) = recoverable(self.browser.page_source().await)? else {
            return Ok(());
        };
        let path = dir.join(format!("no_action_{}.html", file_component(serial)));
        if let Err(e) = std::fs::create_dir_all(dir).and_then(|_| std::fs::write(&path, html)) {
            warn!("writing {}: {e}", path.display());
        }
        Ok(())
    }
}

fn finish(
    row: ListingRow,
    detail: CaseDetail,
    snapshot: Option<SavedFile>,
    attachments: Vec<SavedFile>,
) -> CaptureState {
    let mut documents = Vec::with_capacity(attachments.len() + 1);
    let document_path = snapshot.map(|s| {
        documents.push(s.document);
        s.path
    });
    let attachment_paths = attachments
        .into_iter()
        .map(|s| {
            documents.push(s.document);
            s.path
        })
        .collect();
    let case = CapturedCase {
        row,
        detail,
        document_saved: document_path.is_some(),
        document_path,
        attachment_paths,
        outcome: CaptureOutcome::Completed,
    };
    CaptureState::Returned(case, documents)
}

/// Local file name for an attachment: the last path segment of its URL.
pub fn attachment_name(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segs| segs.next_back().map(str::to_string))
        })
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "file.pdf".to_string())
}
