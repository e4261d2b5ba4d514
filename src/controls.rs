//! Harvest targets, pacing, and source connection controls.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::pacing::DelayPolicy;

/// Default number of records to collect before stopping.
pub const DEFAULT_TARGET: u64 = 19_900;
/// Default CSV destination.
pub const DEFAULT_OUTPUT: &str = "records.csv";
/// Default search endpoint base.
pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080/api";

/// Tunable knobs that bound a harvest run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HarvestControls {
    query: String,
    target: u64,
    output: PathBuf,
    delay: DelayPolicy,
    base_url: String,
    product: String,
    language: String,
    page_size: usize,
    cookies: PathBuf,
    request_timeout: Duration,
}

impl HarvestControls {
    /// Controls for `query` with every other knob at its default.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    /// Overrides the record target.
    pub fn with_target(mut self, target: u64) -> Self {
        self.target = target;
        self
    }

    /// Overrides the CSV destination.
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Overrides the politeness delay between pages.
    pub fn with_delay(mut self, delay: DelayPolicy) -> Self {
        self.delay = delay;
        self
    }

    /// Overrides the search endpoint base URL.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the requested page size.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Opaque query forwarded to the source.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Number of records after which the run stops.
    pub fn target(&self) -> u64 {
        self.target
    }

    /// CSV destination path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Delay policy applied before every page after the first.
    pub fn delay(&self) -> DelayPolicy {
        self.delay
    }

    /// Search endpoint base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Result ranking requested from the source.
    pub fn product(&self) -> &str {
        &self.product
    }

    /// Language tag sent with each request.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// Records requested per page.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Path to the saved-session cookie file.
    pub fn cookies(&self) -> &Path {
        &self.cookies
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

impl Default for HarvestControls {
    fn default() -> Self {
        Self {
            query: String::new(),
            target: DEFAULT_TARGET,
            output: PathBuf::from(DEFAULT_OUTPUT),
            delay: DelayPolicy::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            product: "Top".to_string(),
            language: "en-US".to_string(),
            page_size: 20,
            cookies: PathBuf::from("cookies.json"),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Command-line interface for the harvester.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "fastharvest",
    version,
    about = "Harvest paginated search results into a CSV file"
)]
pub struct Cli {
    /// Search query forwarded verbatim to the source
    #[arg(long, env = "FASTHARVEST_QUERY")]
    pub query: String,

    /// Stop once this many records have been processed
    #[arg(long, env = "FASTHARVEST_TARGET", default_value_t = DEFAULT_TARGET)]
    pub target: u64,

    /// CSV file to (re)create and append records to
    #[arg(long, env = "FASTHARVEST_OUTPUT", default_value = DEFAULT_OUTPUT)]
    pub output: PathBuf,

    /// Minimum seconds to wait before fetching each subsequent page
    #[arg(long, env = "FASTHARVEST_DELAY_MIN_SECS", default_value_t = 5)]
    pub delay_min_secs: u64,

    /// Maximum seconds to wait before fetching each subsequent page
    #[arg(long, env = "FASTHARVEST_DELAY_MAX_SECS", default_value_t = 10)]
    pub delay_max_secs: u64,

    /// Base URL of the search API
    #[arg(long, env = "FASTHARVEST_BASE_URL", default_value = DEFAULT_BASE_URL)]
    pub base_url: String,

    /// Result ranking to request (e.g. Top, Latest)
    #[arg(long, env = "FASTHARVEST_PRODUCT", default_value = "Top")]
    pub product: String,

    /// Accept-Language sent with each request
    #[arg(long, env = "FASTHARVEST_LANGUAGE", default_value = "en-US")]
    pub language: String,

    /// Records requested per page
    #[arg(long, env = "FASTHARVEST_PAGE_SIZE", default_value_t = 20)]
    pub page_size: usize,

    /// Saved session cookies (JSON object of name to value)
    #[arg(long, env = "FASTHARVEST_COOKIES", default_value = "cookies.json")]
    pub cookies: PathBuf,

    /// Seconds before an individual page request times out
    #[arg(long, env = "FASTHARVEST_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, env = "FASTHARVEST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Cli {
    /// Converts the parsed CLI into `HarvestControls`.
    pub fn build_controls(&self) -> HarvestControls {
        HarvestControls {
            query: self.query.clone(),
            target: self.target,
            output: self.output.clone(),
            delay: DelayPolicy::new(
                Duration::from_secs(self.delay_min_secs),
                Duration::from_secs(self.delay_max_secs),
            ),
            base_url: self.base_url.clone(),
            product: self.product.clone(),
            language: self.language.clone(),
            page_size: self.page_size.max(1),
            cookies: self.cookies.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs.max(1)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_control_defaults() {
        let cli = Cli::try_parse_from(["fastharvest", "--query", "lang:ar"]).expect("cli parses");
        assert_eq!(cli.build_controls(), HarvestControls::new("lang:ar"));
    }

    #[test]
    fn cli_overrides_flow_into_controls() {
        let cli = Cli::try_parse_from([
            "fastharvest",
            "--query",
            "(from:someone)",
            "--target",
            "10",
            "--delay-min-secs",
            "1",
            "--delay-max-secs",
            "2",
            "--output",
            "out/records.csv",
        ])
        .expect("cli parses");
        let controls = cli.build_controls();
        assert_eq!(controls.target(), 10);
        assert_eq!(controls.output(), Path::new("out/records.csv"));
        assert_eq!(controls.delay().min(), Duration::from_secs(1));
        assert_eq!(controls.delay().max(), Duration::from_secs(2));
    }

    #[test]
    fn query_is_required() {
        assert!(Cli::try_parse_from(["fastharvest"]).is_err());
    }
}
