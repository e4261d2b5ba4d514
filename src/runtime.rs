//! Application runner wiring controls, session, client, and sink together.

use anyhow::{Context, Result};
use tokio::runtime::Builder;
use tracing::{info, warn};

use crate::controls::{Cli, HarvestControls};
use crate::harvest::{HarvestSummary, Harvester};
use crate::pacing::{Pacer, TokioPacer};
use crate::sink::CsvSink;
use crate::source::{HttpSearchClient, Session, SourceClient};

/// Entry point used by the binary: runs one harvest on a current-thread runtime.
///
/// Ctrl-C during a fetch or a wait aborts the run with an error; rows already
/// written stay on disk.
pub fn run(cli: Cli) -> Result<HarvestSummary> {
    let controls = cli.build_controls();
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    rt.block_on(run_until_interrupted(&controls))
}

async fn run_until_interrupted(controls: &HarvestControls) -> Result<HarvestSummary> {
    tokio::select! {
        result = harvest(controls) => result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            anyhow::bail!("harvest interrupted")
        }
    }
}

/// Harvests from the HTTP search source described by `controls`.
pub async fn harvest(controls: &HarvestControls) -> Result<HarvestSummary> {
    let session = Session::from_cookie_file(controls.cookies())
        .context("failed to load saved session")?;
    if session.is_empty() {
        warn!(
            path = %controls.cookies().display(),
            "cookie file holds no cookies, requests go out unauthenticated"
        );
    } else {
        info!(cookies = session.len(), "loaded session");
    }
    let mut client = HttpSearchClient::from_controls(controls, &session)
        .context("failed to build search client")?;
    harvest_from(controls, &mut client, TokioPacer).await
}

/// Opens the CSV sink, runs the controller against `source`, and reports the outcome.
pub async fn harvest_from<C, P>(
    controls: &HarvestControls,
    source: &mut C,
    pacer: P,
) -> Result<HarvestSummary>
where
    C: SourceClient + ?Sized,
    P: Pacer,
{
    let sink = CsvSink::open(controls.output()).context("failed to prepare output file")?;
    info!(output = %sink.path().display(), query = controls.query(), "writing records");
    let mut harvester = Harvester::from_controls(controls, pacer);
    let summary = harvester.run(source, &sink).await?;
    summary.report();
    Ok(summary)
}
