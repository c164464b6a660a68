//! Test one or more sites

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Args;
use sitecheck_engine::playwright::check_playwright_installed;
use sitecheck_engine::{
    EngineConfig, HttpJudge, JsonFileSink, PlaywrightConfig, PlaywrightLauncher,
    SessionOrchestrator,
};
use tracing::{debug, info};

use crate::output::{print_summary, print_warning, OutputFormat};

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Site URLs to test
    pub urls: Vec<String>,

    /// Config file (missing file means defaults)
    #[arg(short, long, env = "SITECHECK_CONFIG", default_value = "sitecheck.toml")]
    pub config: PathBuf,

    /// Maximum link depth from the root page
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Maximum pages per site, root included
    #[arg(long)]
    pub max_pages: Option<usize>,

    /// Only test the root page
    #[arg(long)]
    pub no_crawl: bool,

    /// Exercise every element instead of a sample per category
    #[arg(long)]
    pub comprehensive: bool,

    /// Ask the judgment service to corroborate the verdict
    #[arg(long)]
    pub judge: bool,

    /// Sites tested at the same time
    #[arg(long, default_value_t = 1)]
    pub concurrency: usize,

    /// Browser engine (chromium, firefox, webkit)
    #[arg(long)]
    pub browser: Option<String>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Directory for per-site reports, screenshots, and results.json
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

impl RunArgs {
    /// Flags take precedence over the config file
    pub fn apply_overrides(&self, config: &mut EngineConfig) {
        if let Some(depth) = self.max_depth {
            config.crawl.max_depth = depth;
        }
        if let Some(pages) = self.max_pages {
            config.crawl.max_pages = pages;
        }
        if self.no_crawl {
            config.crawl.enabled = false;
        }
        if self.comprehensive {
            config.interaction.comprehensive = true;
        }
        if self.judge {
            config.judge.enabled = true;
        }
        if let Some(browser) = &self.browser {
            config.browser.browser = browser.clone();
        }
        if self.headed {
            config.browser.headless = false;
        }
    }

    pub fn load_config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::load(&self.config)
            .with_context(|| format!("loading {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        config.validate()?;
        Ok(config)
    }
}

/// Everything that can fail before the first site is tested
pub fn prepare(args: &RunArgs) -> Result<SessionOrchestrator> {
    if args.urls.is_empty() {
        bail!("no URLs given (usage: sitecheck <URL>...)");
    }

    let config = args.load_config()?;
    debug!(?config, "effective configuration");

    let browser = PlaywrightConfig::from_browser_config(&config.browser, config.timeouts.action_ms)?;
    check_playwright_installed(&browser)?;
    let launcher = Arc::new(PlaywrightLauncher::new(browser));

    let judge = if config.judge.enabled {
        let judge = HttpJudge::from_config(&config.judge, config.timeouts.judge())
            .context("judge enabled but not usable")?;
        info!("Judge enabled ({} via {})", config.judge.model, config.judge.api_url);
        Some(judge)
    } else {
        None
    };

    let sink = match &args.output {
        Some(dir) => Some(Arc::new(JsonFileSink::new(dir)?)),
        None => None,
    };

    let mut orchestrator = SessionOrchestrator::new(config, launcher);
    if let Some(judge) = judge {
        orchestrator = orchestrator.with_judge(Arc::new(judge));
    }
    if let Some(sink) = sink {
        orchestrator = orchestrator.with_sink(sink);
    }
    Ok(orchestrator)
}

/// Run the batch; `true` when every site passed
pub async fn execute(orchestrator: &SessionOrchestrator, args: &RunArgs) -> Result<bool> {
    if args.concurrency > 1 && !orchestrator.config().browser.headless {
        print_warning("Running headed browsers concurrently opens one window per site");
    }

    let summary = orchestrator.run_batch(&args.urls, args.concurrency).await;
    print_summary(&summary, args.format)?;
    Ok(summary.failed == 0)
}
