//! Ranked element-finding strategies for a DOM with no stable identity.
//!
//! Each intent is a list of strategies tried in order; the first hit wins and
//! a miss from all of them is a plain `None`. Strategies only look; the caller
//! clicks and waits.

use crate::browser::{recoverable, Browser, BrowserResult, By, ElementHandle};
use crate::config::Config;
use crate::extract::mentions_label;
use async_trait::async_trait;
use tracing::debug;

pub const ACTION_TRIGGERS: &str = "//a[contains(., 'View') or contains(., 'VIEW')]";
pub const ROW_ACTION_TRIGGERS: &str = ".//a[contains(., 'View') or contains(., 'VIEW')]";
pub const ENCLOSING_ROW: &str = "./ancestor::tr[1]";
pub const TABLE_ROWS: &str = "//tr";
pub const ROW_LINKS: &str = ".//a";
/// First cell of a listing row; it carries the serial.
pub const KEY_CELL: &str = "./td[1]";

pub const BACK_CONTROLS: [&str; 5] = [
    "//a[contains(., 'Back')]",
    "//button[contains(., 'Back')]",
    "//input[@value='Back']",
    "//a[contains(@href, 'javascript:history.back()')]",
    "//a[contains(@onclick, 'back')]",
];

pub const NEXT_LINK_TEXT: &str = "Next";
pub const NEXT_BY_CLASS: &str = "//a[contains(@class,'next') or contains(@aria-label,'Next')]";
pub const PREV_LINK_TEXT: &str = "Previous";
pub const PREV_BY_CLASS: &str =
    "//a[contains(@class,'prev') or contains(@aria-label,'Previous')]";

#[async_trait]
pub trait Strategy: Send + Sync {
    fn name(&self) -> &str;

    async fn locate(&self, browser: &dyn Browser) -> BrowserResult<Option<ElementHandle>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located {
    pub handle: ElementHandle,
    pub strategy: String,
}

/// Strategies for one intent, in priority order.
pub struct Ranked {
    intent: String,
    strategies: Vec<Box<dyn Strategy>>,
}

impl Ranked {
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            strategies: Vec::new(),
        }
    }

    pub fn then(mut self, strategy: impl Strategy + 'static) -> Self {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn intent(&self) -> &str {
        &self.intent
    }

    /// First element any strategy finds. Transient browser errors count as a
    /// miss for that strategy; only a lost session is returned as an error.
    pub async fn resolve(&self, browser: &dyn Browser) -> BrowserResult<Option<Located>> {
        for strategy in &self.strategies {
            match recoverable(strategy.locate(browser).await)? {
                Some(Some(handle)) => {
                    debug!("{}: found via {}", self.intent, strategy.name());
                    return Ok(Some(Located {
                        handle,
                        strategy: strategy.name().to_string(),
                    }));
                }
                _ => debug!("{}: {} found nothing", self.intent, strategy.name()),
            }
        }
        Ok(None)
    }
}

/// First element matching a fixed locator.
pub struct First {
    name: String,
    by: By,
}

impl First {
    pub fn new(name: impl Into<String>, by: By) -> Self {
        Self {
            name: name.into(),
            by,
        }
    }
}

#[async_trait]
impl Strategy for First {
    fn name(&self) -> &str {
        &self.name
    }

    async fn locate(&self, browser: &dyn Browser) -> BrowserResult<Option<ElementHandle>> {
        browser.find_element(None, &self.by).await
    }
}

/// Trimmed text of the row's first cell, or `None` when the row has none.
async fn key_cell(browser: &dyn Browser, row: ElementHandle) -> BrowserResult<Option<String>> {
    let cell = recoverable(browser.find_element(Some(row), &By::xpath(KEY_CELL)).await)?.flatten();
    let Some(cell) = cell else {
        return Ok(None);
    };
    Ok(recoverable(browser.text(cell).await)?.map(|t| t.trim().to_string()))
}

/// Whether `row` may belong to `label`: the label is a whole token of its
/// text, and a non-empty first cell does not name some other serial.
async fn row_claims(
    browser: &dyn Browser,
    row: ElementHandle,
    text: &str,
    label: &str,
) -> BrowserResult<bool> {
    if !mentions_label(text, label) {
        return Ok(false);
    }
    Ok(match key_cell(browser, row).await? {
        Some(key) if !key.is_empty() => key == label.trim(),
        _ => true,
    })
}

/// A control inside `row`: the action trigger, or with `any_link` set, any
/// link with visible text.
async fn control_in(
    browser: &dyn Browser,
    row: ElementHandle,
    any_link: bool,
) -> BrowserResult<Option<ElementHandle>> {
    if !any_link {
        return browser
            .find_element(Some(row), &By::xpath(ROW_ACTION_TRIGGERS))
            .await;
    }
    for link in browser.find_elements(Some(row), &By::xpath(ROW_LINKS)).await? {
        let text = recoverable(browser.text(link).await)?.unwrap_or_default();
        if !text.trim().is_empty() {
            return Ok(Some(link));
        }
    }
    Ok(None)
}

/// The row whose first cell is exactly the label, then the trigger inside it
/// or failing that any link.
pub struct ControlInKeyedRow {
    label: String,
}

#[async_trait]
impl Strategy for ControlInKeyedRow {
    fn name(&self) -> &str {
        "control-in-keyed-row"
    }

    async fn locate(&self, browser: &dyn Browser) -> BrowserResult<Option<ElementHandle>> {
        let label = self.label.trim();
        for row in browser.find_elements(None, &By::xpath(TABLE_ROWS)).await? {
            if key_cell(browser, row).await?.as_deref() != Some(label) {
                continue;
            }
            for any_link in [false, true] {
                if let Some(Some(control)) = recoverable(control_in(browser, row, any_link).await)? {
                    return Ok(Some(control));
                }
            }
        }
        Ok(None)
    }
}

/// Every action trigger on the page, kept only if its enclosing row mentions
/// the label.
pub struct TriggerInLabeledRow {
    label: String,
}

#[async_trait]
impl Strategy for TriggerInLabeledRow {
    fn name(&self) -> &str {
        "trigger-in-labeled-row"
    }

    async fn locate(&self, browser: &dyn Browser) -> BrowserResult<Option<ElementHandle>> {
        let triggers = browser
            .find_elements(None, &By::xpath(ACTION_TRIGGERS))
            .await?;
        for trigger in triggers {
            let row = recoverable(
                browser
                    .find_element(Some(trigger), &By::xpath(ENCLOSING_ROW))
                    .await,
            )?
            .flatten();
            let Some(row) = row else { continue };
            let Some(text) = recoverable(browser.text(row).await)? else {
                continue;
            };
            if row_claims(browser, row, &text, &self.label).await? {
                return Ok(Some(trigger));
            }
        }
        Ok(None)
    }
}

/// Rows mentioning the label, then a control inside the first such row that
/// has one. With `any_link` set, any link with visible text qualifies.
pub struct ControlInLabeledRow {
    label: String,
    any_link: bool,
}

#[async_trait]
impl Strategy for ControlInLabeledRow {
    fn name(&self) -> &str {
        if self.any_link {
            "any-link-in-labeled-row"
        } else {
            "trigger-inside-labeled-row"
        }
    }

    async fn locate(&self, browser: &dyn Browser) -> BrowserResult<Option<ElementHandle>> {
        for row in browser.find_elements(None, &By::xpath(TABLE_ROWS)).await? {
            let Some(text) = recoverable(browser.text(row).await)? else {
                continue;
            };
            if !row_claims(browser, row, &text, &self.label).await? {
                continue;
            }
            if let Some(Some(control)) = recoverable(control_in(browser, row, self.any_link).await)? {
                return Ok(Some(control));
            }
        }
        Ok(None)
    }
}

/// The control that opens the detail view for the row labelled `label`.
/// An exact first-cell match is preferred; token matches on the row text
/// only apply to rows whose first cell is missing or agrees.
pub fn action_control(label: &str) -> Ranked {
    Ranked::new(format!("action control for {label}"))
        .then(ControlInKeyedRow {
            label: label.to_string(),
        })
        .then(TriggerInLabeledRow {
            label: label.to_string(),
        })
        .then(ControlInLabeledRow {
            label: label.to_string(),
            any_link: false,
        })
        .then(ControlInLabeledRow {
            label: label.to_string(),
            any_link: true,
        })
}

/// An in-page control that returns from the detail view to the listing.
pub fn back_control() -> Ranked {
    let names = [
        "back-link",
        "back-button",
        "back-input",
        "history-back-href",
        "back-onclick",
    ];
    names
        .into_iter()
        .zip(BACK_CONTROLS)
        .fold(Ranked::new("back control"), |ranked, (name, xpath)| {
            ranked.then(First::new(name, By::xpath(xpath)))
        })
}

pub fn next_page() -> Ranked {
    Ranked::new("next page")
        .then(First::new("next-link-text", By::link_text(NEXT_LINK_TEXT)))
        .then(First::new("next-by-class", By::xpath(NEXT_BY_CLASS)))
}

pub fn previous_page() -> Ranked {
    Ranked::new("previous page")
        .then(First::new("previous-link-text", By::link_text(PREV_LINK_TEXT)))
        .then(First::new("previous-by-class", By::xpath(PREV_BY_CLASS)))
}

pub fn captcha_image(cfg: &Config) -> Ranked {
    Ranked::new("captcha image").then(First::new(
        "captcha-img",
        By::xpath(&cfg.portal.captcha_image_xpath),
    ))
}

pub fn captcha_input(cfg: &Config) -> Ranked {
    Ranked::new("captcha input").then(First::new(
        "captcha-input",
        By::xpath(&cfg.portal.captcha_input_xpath),
    ))
}

/// Button or input that picks a case category such as "Civil".
pub fn case_category(name: &str) -> Ranked {
    let lit = xpath_literal(name);
    Ranked::new(format!("case category {name}"))
        .then(First::new(
            "category-button",
            By::xpath(format!("//button[contains(., {lit})]")),
        ))
        .then(First::new(
            "category-input",
            By::xpath(format!("//input[@value={lit}]")),
        ))
}

/// Quote arbitrary text as an XPath 1.0 string literal.
pub fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        return format!("'{s}'");
    }
    if !s.contains('"') {
        return format!("\"{s}\"");
    }
    let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
    format!("concat({})", parts.join(", \"'\", "))
}
