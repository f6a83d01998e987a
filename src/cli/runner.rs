//! Runs one invocation: load config, build the finder, list and print tags

use crate::cli::args::Args;
use crate::config::FinderConfig;
use crate::finder::{FinderOptions, RegistryFinder};
use crate::registry::Registry;
use crate::tag::Tag;
use anyhow::{Context, Result, anyhow};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

const USER_AGENT: &str = concat!("container-tags/", env!("CARGO_PKG_VERSION"));

pub struct Runner {
    args: Args,
}

impl Runner {
    pub fn new(args: Args) -> Result<Self> {
        args.validate().map_err(|e| anyhow!(e))?;
        Ok(Self { args })
    }

    pub async fn run(&self) -> Result<()> {
        let config = FinderConfig::from_env(self.args.config.as_deref())?;
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .context("failed to build HTTP client")?;
        let finder = config.build_finder(&FinderOptions::with_client(Arc::new(client)))?;

        let cancel = CancellationToken::new();
        let timeout = self.args.timeout.or(config.timeout_secs).map(Duration::from_secs);
        let watchdog = tokio::spawn(cancel_on_signal_or_timeout(cancel.clone(), timeout));

        let result = self.list_all(&finder, &cancel, &mut std::io::stdout().lock()).await;
        watchdog.abort();
        result
    }

    async fn list_all(
        &self,
        finder: &RegistryFinder,
        cancel: &CancellationToken,
        out: &mut impl Write,
    ) -> Result<()> {
        let mut failures = 0;

        for reference in &self.args.references {
            match finder.list_tags_cancellable(reference, cancel).await {
                Ok(tags) => {
                    debug!(%reference, count = tags.len(), "listed tags");
                    self.render(out, reference, &tags)?;
                }
                Err(err) if err.is_cancelled() => {
                    return Err(anyhow!("cancelled while listing {reference}"));
                }
                Err(err) => {
                    error!(%reference, error = %err, "failed to list tags");
                    failures += 1;
                }
            }
        }

        match failures {
            0 => Ok(()),
            n => Err(anyhow!("{n} of {} references failed", self.args.references.len())),
        }
    }

    fn render(&self, out: &mut impl Write, reference: &str, tags: &[Tag]) -> Result<()> {
        if self.args.json {
            serde_json::to_writer(&mut *out, tags)?;
            writeln!(out)?;
            return Ok(());
        }

        let prefix = self.args.references.len() > 1;
        for tag in tags {
            if prefix {
                writeln!(out, "{reference}\t{}", tag.name())?;
            } else {
                writeln!(out, "{}", tag.name())?;
            }
        }
        Ok(())
    }
}

async fn cancel_on_signal_or_timeout(cancel: CancellationToken, timeout: Option<Duration>) {
    let deadline = async {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "unable to listen for shutdown signal");
                return;
            }
            warn!("interrupted, cancelling");
        }
        _ = deadline => warn!(?timeout, "deadline reached, cancelling"),
    }
    cancel.cancel();
}
