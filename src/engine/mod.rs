use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::mpsc;

use crate::config::{UpdateLevel, UpdaterConfig};
use crate::download::Downloader;
use crate::engine::models::{RunSummary, UpdatePlan};
use crate::engine::state::UpdateState;
use crate::error::UpdaterError;
use crate::networking::Fetcher;
use crate::storage::{self, StagingArea};
use crate::updater::{self, UpdatePaths};

pub mod models;
pub mod state;

/// Everything the engine needs from configuration.
#[derive(Clone, Debug)]
pub struct UpdateSettings {
    pub update_path: String,
    pub ignore_version: u32,
    pub level: UpdateLevel,
    pub download_timeout: Duration,
    pub require_complete: bool,
    pub staging_dir: PathBuf,
    pub application_home: PathBuf,
}

impl UpdateSettings {
    pub fn from_config(config: &UpdaterConfig, level: Option<UpdateLevel>) -> Self {
        Self {
            update_path: config.update.path.clone(),
            ignore_version: config.update.ignore_version,
            level: level.unwrap_or_else(|| config.level()),
            download_timeout: config.download_timeout(),
            require_complete: config.update.require_complete,
            staging_dir: config.staging_dir(),
            application_home: config.application_home(),
        }
    }
}

pub struct UpdateEngine<F> {
    pub state: UpdateState,
    fetcher: Arc<F>,
    paths: UpdatePaths,
    staging: StagingArea,
    live_root: PathBuf,
    ignore_version: u32,
    download_timeout: Duration,
    require_complete: bool,
    current_version: u32,
    latest_version: u32,
}

impl<F> UpdateEngine<F>
where
    F: Fetcher + 'static,
{
    pub fn new(fetcher: Arc<F>, settings: UpdateSettings, current_version: u32) -> Self {
        info!("engine: download path {}", settings.application_home.display());
        info!("engine: current version {current_version}");
        info!("engine: update level {}", settings.level);
        Self {
            state: UpdateState::Idle,
            fetcher,
            paths: UpdatePaths::new(&settings.update_path),
            staging: StagingArea::new(settings.staging_dir),
            live_root: settings.application_home,
            ignore_version: settings.ignore_version,
            download_timeout: settings.download_timeout,
            require_complete: settings.require_complete,
            current_version,
            latest_version: 0,
        }
    }

    pub fn plan(&self) -> UpdatePlan {
        UpdatePlan {
            current_version: self.current_version,
            latest_version: self.latest_version,
            ignored_version: self.ignore_version,
        }
    }

    /// Probe the server and report whether an update should be installed.
    pub async fn check_new_versions(&mut self, updates: &mpsc::UnboundedSender<UpdateState>) -> bool {
        info!("engine: checking for a new version");
        self.transition(UpdateState::Probing, updates);
        match updater::probe_latest_build(self.fetcher.as_ref(), &self.paths).await {
            Ok(latest) => {
                self.latest_version = latest;
                info!("engine: last version is {latest}");
            }
            Err(err) => {
                warn!("engine: cannot get last version, network problems probably ({err})");
            }
        }
        self.transition(UpdateState::Idle, updates);
        self.plan().should_update()
    }

    /// Harvest, download and install the changes up to the last probed version.
    ///
    /// Does not consult [`UpdatePlan::should_update`]; callers check first.
    pub async fn update(&mut self, updates: &mpsc::UnboundedSender<UpdateState>) -> UpdateState {
        if self.current_version == 0 {
            warn!("engine: current version is 0, the installed version cannot be determined");
            warn!("engine: update stopped");
            return self.stop("current version is unknown".into(), updates);
        }

        info!("engine: updating...");
        let mut summary = RunSummary::default();
        let prepared = storage::check_staging(self.staging.root(), &self.live_root)
            .and_then(|()| self.staging.prepare());
        if let Err(err) = prepared {
            warn!(
                "engine: staging directory {} unusable: {err}",
                self.staging.root().display()
            );
            summary.download_error = Some(err.to_string());
            return self.finish(summary, updates);
        }

        self.transition(
            UpdateState::Harvesting {
                from: self.current_version,
                to: self.latest_version,
            },
            updates,
        );
        let changes = updater::harvest_changes(
            self.fetcher.as_ref(),
            &self.paths,
            self.current_version,
            self.latest_version,
        )
        .await;
        summary.changes = changes.len();

        self.transition(
            UpdateState::Downloading {
                files: changes.len(),
            },
            updates,
        );
        let handle = Downloader::new(self.fetcher.clone(), self.staging.root()).spawn(changes);
        let report = match handle.wait(self.download_timeout).await {
            Ok(report) => report,
            Err(err) => {
                warn!("engine: download did not complete: {err}");
                summary.download_error = Some(err.to_string());
                return self.finish(summary, updates);
            }
        };
        let complete = report.is_complete();
        summary.download = Some(report);

        if self.require_complete && !complete {
            warn!("engine: some files failed to download, installation skipped");
            return self.finish(summary, updates);
        }

        self.transition(UpdateState::Installing, updates);
        let staging_root = self.staging.root().to_path_buf();
        let live_root = self.live_root.clone();
        let installed =
            tokio::task::spawn_blocking(move || storage::apply_staged(&staging_root, &live_root))
                .await
                .map_err(UpdaterError::from)
                .and_then(|result| result);
        match installed {
            Ok(report) => summary.install = Some(report),
            Err(err) => {
                warn!("engine: something went wrong replacing updated files: {err}");
                summary.install_error = Some(err.to_string());
            }
        }

        info!("engine: update completed");
        self.finish(summary, updates)
    }

    /// Probe, then run the pipeline when a newer build is available or `force` is set.
    pub async fn run_once(
        &mut self,
        force: bool,
        updates: &mpsc::UnboundedSender<UpdateState>,
    ) -> UpdateState {
        let available = self.check_new_versions(updates).await;
        if !available && !force {
            let reason = self.gate_reason();
            info!("engine: no update, {reason}");
            return self.stop(reason, updates);
        }
        self.update(updates).await
    }

    fn gate_reason(&self) -> String {
        let plan = self.plan();
        if plan.current_version == 0 {
            "current version is unknown".into()
        } else if plan.latest_version == 0 {
            "last version is unknown".into()
        } else if plan.latest_version == plan.ignored_version {
            format!("version {} is ignored", plan.latest_version)
        } else {
            format!(
                "version {} is up to date (last version {})",
                plan.current_version, plan.latest_version
            )
        }
    }

    fn stop(&mut self, reason: String, updates: &mpsc::UnboundedSender<UpdateState>) -> UpdateState {
        let state = UpdateState::GatedStop { reason };
        self.transition(state.clone(), updates);
        state
    }

    fn finish(
        &mut self,
        summary: RunSummary,
        updates: &mpsc::UnboundedSender<UpdateState>,
    ) -> UpdateState {
        let state = UpdateState::Done(summary);
        self.transition(state.clone(), updates);
        state
    }

    fn transition(&mut self, state: UpdateState, updates: &mpsc::UnboundedSender<UpdateState>) {
        debug!("engine: state {:?}", state);
        if state.is_terminal() {
            info!("engine: run finished");
        }
        self.state = state.clone();
        let _ = updates.send(state);
    }
}
