//! Result sinks

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sitecheck_common::{BatchSummary, SessionReport};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};

/// Receives every finished session and the batch summary
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn write_report(&self, report: &SessionReport) -> EngineResult<()>;

    async fn write_summary(&self, summary: &BatchSummary) -> EngineResult<()>;
}

/// Writes `<id>.json` and `<id>.png` per session plus `results.json`
pub struct JsonFileSink {
    dir: PathBuf,
}

impl JsonFileSink {
    pub fn new(dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| EngineError::Sink(format!("cannot create {}: {}", dir.display(), e)))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn report_path(&self, report: &SessionReport) -> PathBuf {
        self.dir.join(format!("{}.json", report.id))
    }

    pub fn screenshot_path(&self, report: &SessionReport) -> PathBuf {
        self.dir.join(format!("{}.png", report.id))
    }
}

#[async_trait]
impl ResultSink for JsonFileSink {
    async fn write_report(&self, report: &SessionReport) -> EngineResult<()> {
        let path = self.report_path(report);
        let json = serde_json::to_vec_pretty(report)?;
        tokio::fs::write(&path, json).await?;
        debug!("Wrote report {}", path.display());

        if let Some(png) = &report.screenshot {
            let path = self.screenshot_path(report);
            tokio::fs::write(&path, png).await?;
            debug!("Wrote screenshot {}", path.display());
        }
        Ok(())
    }

    async fn write_summary(&self, summary: &BatchSummary) -> EngineResult<()> {
        let path = self.dir.join("results.json");
        let json = serde_json::to_vec_pretty(summary)?;
        tokio::fs::write(&path, json).await?;
        info!("Results written to {}", path.display());
        Ok(())
    }
}
