use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORTAL_URL: &str = "https://services.ecourts.gov.in/ecourtindia_v6/?p=cause_list/index&app_token=999af70e3228e4c73736b14e53143cc8215edf44df7868a06331996cdf179d97#";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub portal: Portal,
    #[serde(default)]
    pub browser: Browser,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub timing: Timing,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub schedule: Schedule,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// Load the first candidate that exists. With none present the built-in
    /// defaults apply and no path is returned.
    pub fn load_first(candidates: &[PathBuf]) -> Result<(Self, Option<PathBuf>)> {
        match candidates.iter().find(|p| p.exists()) {
            Some(path) => Ok((Self::load(path)?, Some(path.clone()))),
            None => Ok((Self::default(), None)),
        }
    }

    /// Configuration with every settle delay set to zero, for offline runs.
    pub fn without_delays(mut self) -> Self {
        self.timing = Timing {
            after_click_ms: 0,
            before_locate_ms: 0,
            after_back_ms: 0,
            after_page_ms: 0,
            after_category_ms: 0,
            between_rows_ms: 0,
        };
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Global {
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Portal {
    pub url: String,
    pub captcha_image_xpath: String,
    pub captcha_input_xpath: String,
    /// Tried in order; the first control found is clicked.
    pub case_categories: Vec<String>,
}
impl Default for Portal {
    fn default() -> Self {
        Self {
            url: DEFAULT_PORTAL_URL.into(),
            captcha_image_xpath:
                "//img[contains(@src,'captcha') or contains(@id,'imgCaptcha') or @alt='Captcha']"
                    .into(),
            captcha_input_xpath: "//input[contains(@id,'captcha') or contains(@name,'captcha')]"
                .into(),
            case_categories: vec!["Civil".into(), "Criminal".into()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Browser {
    pub kind: String,
    /// Empty means the driver's default port on localhost.
    pub webdriver_url: String,
    pub headless: bool,
    pub extra_args: Vec<String>,
    pub user_agent: String,
}
impl Default for Browser {
    fn default() -> Self {
        Self {
            kind: "chrome".into(),
            webdriver_url: "".into(),
            headless: false,
            extra_args: Vec::new(),
            user_agent: "Mozilla/5.0".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Paths {
    pub out_dir: String,
    pub download_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            download_dir: "downloads".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timing {
    pub after_click_ms: u64,
    pub before_locate_ms: u64,
    pub after_back_ms: u64,
    pub after_page_ms: u64,
    pub after_category_ms: u64,
    pub between_rows_ms: u64,
}
impl Default for Timing {
    fn default() -> Self {
        Self {
            after_click_ms: 3000,
            before_locate_ms: 2000,
            after_back_ms: 2000,
            after_page_ms: 1500,
            after_category_ms: 2000,
            between_rows_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_pages: u32,
    pub locate_attempts: u32,
    pub download_timeout_seconds: u64,
    pub captcha_timeout_seconds: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_pages: 10,
            locate_attempts: 2,
            download_timeout_seconds: 30,
            captcha_timeout_seconds: 15,
        }
    }
}

impl Limits {
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_seconds.max(1))
    }

    pub fn captcha_timeout(&self) -> Duration {
        Duration::from_secs(self.captcha_timeout_seconds.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Schedule {
    /// Offset used to decide what "today" is. Falls back to the host's local
    /// offset when absent.
    pub utc_offset_minutes: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Output {
    pub write_report_json: bool,
    pub report_filename: String,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_report_json: true,
            report_filename: "report.json".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Debug {
    pub dump_effective_config: bool,
    pub dump_page_on_failure: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
            dump_page_on_failure: false,
        }
    }
}
