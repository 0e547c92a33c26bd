//! `automemer scrape`: one ingestion pass, then exit.

use super::{open_stores, reddit_client};
use crate::config::Config;
use anyhow::{Context, Result};
use automemer_core::Ingestor;
use automemer_core::pipeline::{IngestProgress, ProgressFn};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;

pub async fn execute(config: &Config, progress: bool) -> Result<()> {
    let stores = open_stores(config)?;
    let source = Arc::new(reddit_client(config)?);

    let mut ingestor = Ingestor::new(
        source,
        stores.archive.clone(),
        stores.settings.clone(),
        stores.staging.clone(),
    );

    let bar = if progress {
        let bar = create_progress_bar()?;
        ingestor = ingestor.with_progress(progress_reporter(bar.clone()));
        Some(bar)
    } else {
        None
    };

    let result = ingestor.run().await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }
    let report = result.context("Ingestion failed")?;

    println!("{}", report);
    if !report.skipped_sources.is_empty() {
        println!("Skipped: {}", report.skipped_sources.join(", "));
    }
    println!("Archive now holds {} memes", stores.archive.count()?);
    Ok(())
}

/// A bar over the watched subs; its length is set once ingestion starts.
fn create_progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
            .template("{spinner:.green} [{bar:40.green/dim}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn progress_reporter(bar: ProgressBar) -> ProgressFn {
    Arc::new(move |event: IngestProgress<'_>| match event {
        IngestProgress::Started { sources } => bar.set_length(sources as u64),
        IngestProgress::Fetched { sub, posts } => {
            bar.set_message(format!("/r/{sub} ({posts} posts)"));
            bar.inc(1);
        }
        IngestProgress::Merging => bar.set_message("merging"),
    })
}
