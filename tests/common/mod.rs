#![allow(dead_code)]

use anyhow::{bail, Result};
use async_trait::async_trait;
use ecourts_capture::browser::{Browser, BrowserError, BrowserResult, By, ElementHandle};
use ecourts_capture::config::Config;
use ecourts_capture::dates::format_day_first;
use ecourts_capture::fetch::Fetch;
use ecourts_capture::locate::{
    ACTION_TRIGGERS, BACK_CONTROLS, ENCLOSING_ROW, KEY_CELL, NEXT_LINK_TEXT, PREV_LINK_TEXT,
    ROW_ACTION_TRIGGERS, ROW_LINKS, TABLE_ROWS,
};
use ecourts_capture::model::{CapturedCase, Document, ListingRow};
use ecourts_capture::sink::CaseSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use time::{Date, Month};

pub const PORTAL_URL: &str = "https://portal.test/cause_list";
pub const PDF_BYTES: &[u8] = b"%PDF-1.4 fake snapshot";
pub const CAPTCHA_BYTES: &[u8] = b"\x89PNG fake captcha";

pub fn test_config() -> Config {
    let mut cfg = Config::default().without_delays();
    cfg.portal.url = PORTAL_URL.to_string();
    cfg
}

pub fn date(year: i32, month: u8, day: u8) -> Date {
    Date::from_calendar_date(year, Month::try_from(month).unwrap(), day).unwrap()
}

/// CNR the fake detail page shows for `serial`.
pub fn cnr_for(serial: &str) -> String {
    format!("DLHC01{:010}", serial.parse::<u64>().unwrap_or(0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    View,
    Link(&'static str),
    Missing,
}

#[derive(Debug, Clone)]
pub struct FakeRow {
    pub serial: String,
    pub hearing: Date,
    pub action: Action,
}

pub fn row(serial: &str, hearing: Date) -> FakeRow {
    FakeRow {
        serial: serial.to_string(),
        hearing,
        action: Action::View,
    }
}

pub fn row_with(serial: &str, hearing: Date, action: Action) -> FakeRow {
    FakeRow {
        serial: serial.to_string(),
        hearing,
        action,
    }
}

/// A listing row as the workflow receives it, for tests that skip pagination.
pub fn listing_row(serial: &str, hearing: Date) -> ListingRow {
    ListingRow {
        serial: serial.to_string(),
        columns: vec![serial.to_string()],
        court_name: "District Court".to_string(),
        next_hearing_date: Some(hearing),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    CaptchaImage,
    CaptchaInput,
    Category,
    Trigger(String),
    Row(String),
    KeyCell(String),
    RowLink(String),
    Next,
    Prev,
    Back,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum View {
    Blank,
    Portal,
    Listing,
    Detail(String),
}

#[derive(Debug, Clone, Default)]
pub struct Stats {
    pub navigations: usize,
    pub next_clicks: usize,
    pub prev_clicks: usize,
    pub back_clicks: usize,
    pub history_backs: usize,
    pub opened: Vec<String>,
    pub typed: String,
    pub closed: bool,
}

struct State {
    pages: Vec<Vec<FakeRow>>,
    page: usize,
    view: View,
    handles: HashMap<u64, Node>,
    next_handle: u64,
    next_always_enabled: bool,
    back_link: bool,
    detached_triggers: bool,
    key_cells: bool,
    back_resets_page: bool,
    captcha_src: String,
    attachments: Vec<String>,
    lose_session_on: Option<String>,
    captcha_image_xpath: String,
    captcha_input_xpath: String,
    stats: Stats,
}

/// Scripted cause-list portal answering the locators the crate issues.
#[derive(Clone)]
pub struct FakePortal {
    state: Arc<Mutex<State>>,
}

impl FakePortal {
    pub fn new(pages: Vec<Vec<FakeRow>>) -> Self {
        let defaults = Config::default();
        Self {
            state: Arc::new(Mutex::new(State {
                pages,
                page: 0,
                view: View::Blank,
                handles: HashMap::new(),
                next_handle: 0,
                next_always_enabled: false,
                back_link: true,
                detached_triggers: false,
                key_cells: true,
                back_resets_page: false,
                captcha_src: "data:image/png;base64,AAAA".to_string(),
                attachments: Vec::new(),
                lose_session_on: None,
                captcha_image_xpath: defaults.portal.captcha_image_xpath,
                captcha_input_xpath: defaults.portal.captcha_input_xpath,
                stats: Stats::default(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    /// Start on the results table, as if the CAPTCHA was already solved.
    pub fn at_listing(self) -> Self {
        self.lock().view = View::Listing;
        self
    }

    pub fn without_back_link(self) -> Self {
        self.lock().back_link = false;
        self
    }

    pub fn next_always_enabled(self) -> Self {
        self.lock().next_always_enabled = true;
        self
    }

    /// Action triggers report no enclosing row.
    pub fn detached_triggers(self) -> Self {
        self.lock().detached_triggers = true;
        self
    }

    /// Rows expose no `td` cells to locators, as on a table of `th` rows.
    pub fn without_key_cells(self) -> Self {
        self.lock().key_cells = false;
        self
    }

    /// The back control lands on page 1 whatever page the row was on.
    pub fn back_resets_page(self) -> Self {
        self.lock().back_resets_page = true;
        self
    }

    pub fn captcha_src(self, src: &str) -> Self {
        self.lock().captcha_src = src.to_string();
        self
    }

    /// Links on every detail page; `{serial}` is replaced with the row serial.
    pub fn attachments(self, hrefs: &[&str]) -> Self {
        self.lock().attachments = hrefs.iter().map(|h| h.to_string()).collect();
        self
    }

    /// Opening this serial's detail view kills the session.
    pub fn lose_session_on(self, serial: &str) -> Self {
        self.lock().lose_session_on = Some(serial.to_string());
        self
    }

    pub fn stats(&self) -> Stats {
        self.lock().stats.clone()
    }

    pub fn node(&self, handle: ElementHandle) -> Option<Node> {
        self.lock().handles.get(&handle.0).cloned()
    }

    pub fn listing_html(&self) -> String {
        let st = self.lock();
        listing_html(&st.pages[st.page])
    }
}

impl State {
    fn set_view(&mut self, view: View) {
        self.view = view;
        self.handles.clear();
    }

    fn register(&mut self, node: Node) -> ElementHandle {
        self.next_handle += 1;
        self.handles.insert(self.next_handle, node);
        ElementHandle(self.next_handle)
    }

    fn node(&self, el: ElementHandle, op: &'static str) -> BrowserResult<Node> {
        self.handles
            .get(&el.0)
            .cloned()
            .ok_or(BrowserError::Stale(op))
    }

    fn rows(&self) -> &[FakeRow] {
        if self.view == View::Listing {
            &self.pages[self.page]
        } else {
            &[]
        }
    }

    fn row(&self, serial: &str) -> Option<&FakeRow> {
        self.rows().iter().find(|r| r.serial == serial)
    }

    fn has_next(&self) -> bool {
        self.view == View::Listing && (self.next_always_enabled || self.pages.len() > 1)
    }

    fn next_enabled(&self) -> bool {
        self.next_always_enabled || self.page + 1 < self.pages.len()
    }

    fn matches(&self, scope: Option<&Node>, by: &By) -> Vec<Node> {
        let xpath = match by {
            By::LinkText(t) if t == NEXT_LINK_TEXT && scope.is_none() => {
                return if self.has_next() { vec![Node::Next] } else { Vec::new() };
            }
            By::LinkText(t) if t == PREV_LINK_TEXT && scope.is_none() => {
                return if self.view == View::Listing && self.page > 0 {
                    vec![Node::Prev]
                } else {
                    Vec::new()
                };
            }
            By::XPath(x) => x.as_str(),
            _ => return Vec::new(),
        };
        match scope {
            None if xpath == ACTION_TRIGGERS => self
                .rows()
                .iter()
                .filter(|r| r.action == Action::View)
                .map(|r| Node::Trigger(r.serial.clone()))
                .collect(),
            None if xpath == TABLE_ROWS => self
                .rows()
                .iter()
                .map(|r| Node::Row(r.serial.clone()))
                .collect(),
            None if xpath == BACK_CONTROLS[0] => match self.view {
                View::Detail(_) if self.back_link => vec![Node::Back],
                _ => Vec::new(),
            },
            None if xpath == self.captcha_image_xpath && self.view == View::Portal => {
                vec![Node::CaptchaImage]
            }
            None if xpath == self.captcha_input_xpath && self.view == View::Portal => {
                vec![Node::CaptchaInput]
            }
            None if xpath == "//button[contains(., 'Civil')]" && self.view == View::Portal => {
                vec![Node::Category]
            }
            Some(Node::Trigger(s)) if xpath == ENCLOSING_ROW && !self.detached_triggers => {
                vec![Node::Row(s.clone())]
            }
            Some(Node::Row(s)) if xpath == KEY_CELL && self.key_cells => {
                vec![Node::KeyCell(s.clone())]
            }
            Some(Node::Row(s)) if xpath == ROW_ACTION_TRIGGERS => match self.row(s) {
                Some(r) if r.action == Action::View => vec![Node::Trigger(s.clone())],
                _ => Vec::new(),
            },
            Some(Node::Row(s)) if xpath == ROW_LINKS => match self.row(s).map(|r| r.action) {
                Some(Action::View) => vec![Node::Trigger(s.clone())],
                Some(Action::Link(_)) => vec![Node::RowLink(s.clone())],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }

    fn open_detail(&mut self, serial: String) -> BrowserResult<()> {
        if self.lose_session_on.as_deref() == Some(serial.as_str()) {
            return Err(BrowserError::session_lost("click", "invalid session id"));
        }
        self.stats.opened.push(serial.clone());
        self.set_view(View::Detail(serial));
        Ok(())
    }
}

fn row_text(r: &FakeRow) -> String {
    let action = match r.action {
        Action::View => "View",
        Action::Link(text) => text,
        Action::Missing => "",
    };
    format!(
        "{} CS/{}/2024 Next Hearing Date: {} {}",
        r.serial,
        r.serial,
        format_day_first(r.hearing),
        action
    )
    .trim()
    .to_string()
}

pub fn listing_html(rows: &[FakeRow]) -> String {
    let mut body = String::from(
        "<html><body><h2>District Court, Saket</h2><table>\
         <tr><th>Sr No</th><th>Case</th><th>Next Date</th><th></th></tr>",
    );
    for r in rows {
        let action = match r.action {
            Action::View => "<a href=\"#\">View</a>".to_string(),
            Action::Link(text) => format!("<a href=\"#\">{text}</a>"),
            Action::Missing => String::new(),
        };
        body.push_str(&format!(
            "<tr><td>{}</td><td>CS/{}/2024</td><td>Next Hearing Date: {}</td><td>{action}</td></tr>",
            r.serial,
            r.serial,
            format_day_first(r.hearing)
        ));
    }
    body.push_str("</table></body></html>");
    body
}

pub fn detail_html(serial: &str, attachments: &[String], back_link: bool) -> String {
    let links: String = attachments
        .iter()
        .map(|h| format!("<a href=\"{}\">Order</a> ", h.replace("{serial}", serial)))
        .collect();
    let back = if back_link { "<a href=\"#\">Back</a>" } else { "" };
    format!(
        "<html><head><script>var x = 'CS - Criminal';</script></head><body>\
         <h2>Case Status</h2><p>{links}</p><p>{back}</p><table>\
         <tr><td>Case Type</td><td>CS - Civil Suit</td></tr>\
         <tr><td>Filing Number</td><td>{serial}/2024</td></tr>\
         <tr><td>Filing Date</td><td>01-02-2024</td></tr>\
         <tr><td>Registration Number</td><td>R{serial}/2024</td></tr>\
         <tr><td>Registration Date</td><td>05-02-2024</td></tr>\
         <tr><td>CNR Number</td><td>{cnr} (Note the CNR number for future reference)</td></tr>\
         <tr><td>Court Number and Judge</td><td>2-District Judge</td></tr>\
         </table></body></html>",
        cnr = cnr_for(serial)
    )
}

#[async_trait]
impl Browser for FakePortal {
    async fn navigate(&self, _url: &str) -> BrowserResult<()> {
        let mut st = self.lock();
        st.stats.navigations += 1;
        st.page = 0;
        st.set_view(View::Portal);
        Ok(())
    }

    async fn find_elements(
        &self,
        scope: Option<ElementHandle>,
        by: &By,
    ) -> BrowserResult<Vec<ElementHandle>> {
        let mut st = self.lock();
        let scope = match scope {
            Some(el) => Some(st.node(el, "find")?),
            None => None,
        };
        let found = st.matches(scope.as_ref(), by);
        Ok(found.into_iter().map(|n| st.register(n)).collect())
    }

    async fn text(&self, el: ElementHandle) -> BrowserResult<String> {
        let st = self.lock();
        Ok(match st.node(el, "text")? {
            Node::Row(s) => st.row(&s).map(row_text).unwrap_or_default(),
            Node::KeyCell(s) => s,
            Node::Trigger(_) => "View".to_string(),
            Node::RowLink(s) => match st.row(&s).map(|r| r.action) {
                Some(Action::Link(text)) => text.to_string(),
                _ => String::new(),
            },
            Node::Next => "Next".to_string(),
            Node::Prev => "Previous".to_string(),
            Node::Back => "Back".to_string(),
            Node::Category => "Civil".to_string(),
            Node::CaptchaImage | Node::CaptchaInput => String::new(),
        })
    }

    async fn attribute(&self, el: ElementHandle, name: &str) -> BrowserResult<Option<String>> {
        let st = self.lock();
        Ok(match (st.node(el, "attribute")?, name) {
            (Node::CaptchaImage, "src") => Some(st.captcha_src.clone()),
            _ => None,
        })
    }

    async fn is_enabled(&self, el: ElementHandle) -> BrowserResult<bool> {
        let st = self.lock();
        Ok(match st.node(el, "is_enabled")? {
            Node::Next => st.next_enabled(),
            _ => true,
        })
    }

    async fn click(&self, el: ElementHandle) -> BrowserResult<()> {
        let mut st = self.lock();
        match st.node(el, "click")? {
            Node::Trigger(s) | Node::RowLink(s) => st.open_detail(s)?,
            Node::Next => {
                st.stats.next_clicks += 1;
                if st.page + 1 < st.pages.len() {
                    st.page += 1;
                }
                st.set_view(View::Listing);
            }
            Node::Prev => {
                st.stats.prev_clicks += 1;
                st.page = st.page.saturating_sub(1);
                st.set_view(View::Listing);
            }
            Node::Back => {
                st.stats.back_clicks += 1;
                if st.back_resets_page {
                    st.page = 0;
                }
                st.set_view(View::Listing);
            }
            Node::Category => {
                st.page = 0;
                st.set_view(View::Listing);
            }
            Node::CaptchaImage | Node::CaptchaInput | Node::Row(_) | Node::KeyCell(_) => {}
        }
        Ok(())
    }

    async fn clear(&self, el: ElementHandle) -> BrowserResult<()> {
        let mut st = self.lock();
        if st.node(el, "clear")? == Node::CaptchaInput {
            st.stats.typed.clear();
        }
        Ok(())
    }

    async fn send_keys(&self, el: ElementHandle, text: &str) -> BrowserResult<()> {
        let mut st = self.lock();
        if st.node(el, "send_keys")? == Node::CaptchaInput {
            st.stats.typed.push_str(text);
        }
        Ok(())
    }

    async fn element_screenshot(&self, el: ElementHandle) -> BrowserResult<Vec<u8>> {
        self.lock().node(el, "screenshot")?;
        Ok(CAPTCHA_BYTES.to_vec())
    }

    async fn current_url(&self) -> BrowserResult<String> {
        let st = self.lock();
        Ok(match &st.view {
            View::Blank => "about:blank".to_string(),
            View::Portal => PORTAL_URL.to_string(),
            View::Listing => format!("{PORTAL_URL}/results"),
            View::Detail(s) => format!("https://portal.test/case/{s}"),
        })
    }

    async fn page_source(&self) -> BrowserResult<String> {
        let st = self.lock();
        Ok(match &st.view {
            View::Blank => String::new(),
            View::Portal => "<html><body><img src=\"captcha.png\"/><input id=\"captcha\"/>\
                             <button>Civil</button></body></html>"
                .to_string(),
            View::Listing => listing_html(&st.pages[st.page]),
            View::Detail(s) => detail_html(s, &st.attachments, st.back_link),
        })
    }

    async fn render_to_document(&self) -> BrowserResult<Vec<u8>> {
        Ok(PDF_BYTES.to_vec())
    }

    async fn cookies(&self) -> BrowserResult<Vec<(String, String)>> {
        Ok(vec![("JSESSIONID".to_string(), "fake-session".to_string())])
    }

    async fn history_back(&self) -> BrowserResult<()> {
        let mut st = self.lock();
        st.stats.history_backs += 1;
        if matches!(st.view, View::Detail(_)) {
            st.set_view(View::Listing);
        }
        Ok(())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.lock().stats.closed = true;
        Ok(())
    }
}

/// Serves canned bodies by URL; anything else is an HTTP error.
#[derive(Clone, Default)]
pub struct FakeFetcher {
    bodies: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    requests: Arc<Mutex<Vec<(String, Vec<(String, String)>)>>>,
}

impl FakeFetcher {
    pub fn with(self, url: &str, body: &[u8]) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
        self
    }

    pub fn requests(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetch for FakeFetcher {
    async fn get(
        &self,
        url: &str,
        cookies: &[(String, String)],
        _timeout: Duration,
    ) -> Result<Vec<u8>> {
        self.requests
            .lock()
            .unwrap()
            .push((url.to_string(), cookies.to_vec()));
        match self.bodies.lock().unwrap().get(url) {
            Some(body) => Ok(body.clone()),
            None => bail!("GET {url}: HTTP 404"),
        }
    }
}

#[derive(Default)]
pub struct MemorySink {
    pub stored: Vec<(CapturedCase, Vec<Document>)>,
    pub fail: bool,
}

impl CaseSink for MemorySink {
    fn store(&mut self, case: &CapturedCase, documents: &[Document]) -> Result<String> {
        if self.fail {
            bail!("sink unavailable");
        }
        self.stored.push((case.clone(), documents.to_vec()));
        Ok(format!("mem-{}", self.stored.len()))
    }
}
