//! Job registry: the single entry point the CLI (or any future surface)
//! drives jobs through.
//!
//! Hands out opaque job ids, enforces one active scan per source, and
//! rejects bad input before a job id is ever issued.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::info;
use uuid::Uuid;

use crate::adapters::capture_screen::region_key;
use crate::adapters::decode_ffmpeg::require_readable_video;
use crate::adapters::exec_ffmpeg::FfmpegTrimmer;
use crate::adapters::fetch_ytdlp::YtDlpFetcher;
use crate::app::download_job::DownloadJobController;
use crate::app::scan_job::ScanJobController;
use crate::config::AppConfig;
use crate::domain::errors::DomainError;
use crate::domain::model::{ClipOutcome, DownloadProgress, ScanProgress};
use crate::engine::recorder::load_session;
use crate::engine::splitter::ClipSynthesizer;
use crate::ports::{MediaTrimmer, RemoteFetcher};

struct ScanEntry {
    controller: Arc<ScanJobController>,
    source_key: String,
}

pub struct JobRegistry {
    config: AppConfig,
    fetcher: Arc<dyn RemoteFetcher>,
    trimmer: Arc<dyn MediaTrimmer>,
    scans: Mutex<HashMap<Uuid, ScanEntry>>,
    downloads: Mutex<HashMap<Uuid, Arc<DownloadJobController>>>,
}

impl JobRegistry {
    pub fn new(
        config: AppConfig,
        fetcher: Arc<dyn RemoteFetcher>,
        trimmer: Arc<dyn MediaTrimmer>,
    ) -> Self {
        Self {
            config,
            fetcher,
            trimmer,
            scans: Mutex::new(HashMap::new()),
            downloads: Mutex::new(HashMap::new()),
        }
    }

    /// Registry wired to the real external tools.
    pub fn with_default_adapters(config: AppConfig) -> Result<Self, DomainError> {
        let fetcher = Arc::new(YtDlpFetcher::new()?);
        Ok(Self::new(config, fetcher, Arc::new(FfmpegTrimmer)))
    }

    /// Start a VOD scan (`Some(path)`) or live capture (`None`). At most one
    /// active scan per source; the input must exist before a job id is
    /// issued.
    pub fn start_scan(
        &self,
        vod_path: Option<&Path>,
        resume: bool,
    ) -> Result<(Uuid, Arc<ScanJobController>), DomainError> {
        let (source_key, canonical) = match vod_path {
            Some(path) => {
                let canonical = require_readable_video(path)?;
                (format!("vod:{}", canonical.display()), Some(canonical))
            }
            None => (region_key(&self.config.capture), None),
        };

        let mut scans = lock(&self.scans);
        scans.retain(|_, entry| !entry.controller.progress().state.is_terminal());
        if let Some(entry) = scans.values().find(|e| e.source_key == source_key) {
            let state = entry.controller.progress().state;
            return Err(DomainError::ScanConflict(format!(
                "{source_key} (currently {state})"
            )));
        }

        let controller = ScanJobController::start(self.config.clone(), canonical, resume);
        let job_id = Uuid::new_v4();
        info!("scan job {job_id} registered for {source_key}");
        scans.insert(
            job_id,
            ScanEntry {
                controller: Arc::clone(&controller),
                source_key,
            },
        );
        Ok((job_id, controller))
    }

    pub fn pause_scan(&self, job_id: Uuid) -> Result<(), DomainError> {
        self.scan(job_id)?.pause()
    }

    pub fn resume_scan(&self, job_id: Uuid) -> Result<(), DomainError> {
        self.scan(job_id)?.resume()
    }

    pub fn stop_scan(&self, job_id: Uuid) -> Result<(), DomainError> {
        self.scan(job_id)?.stop()
    }

    pub fn scan_progress(&self, job_id: Uuid) -> Result<ScanProgress, DomainError> {
        Ok(self.scan(job_id)?.progress())
    }

    fn scan(&self, job_id: Uuid) -> Result<Arc<ScanJobController>, DomainError> {
        lock(&self.scans)
            .get(&job_id)
            .map(|entry| Arc::clone(&entry.controller))
            .ok_or_else(|| DomainError::JobNotFound(job_id.to_string()))
    }

    /// Split a VOD into clips from a bookmark log.
    pub async fn split(
        &self,
        bookmarks: &Path,
        vod_path: &Path,
    ) -> Result<Vec<ClipOutcome>, DomainError> {
        let session = load_session(bookmarks)?;
        info!(
            "splitting session {} ({} events) against {}",
            session.session_id,
            session.events.len(),
            vod_path.display()
        );
        let synthesizer = ClipSynthesizer::new(Arc::clone(&self.trimmer), &self.config.split);
        synthesizer.split(vod_path, &session.events).await
    }

    /// Start a remote fetch. The URL is validated synchronously; invalid
    /// URLs never get a job id.
    pub fn start_download(
        &self,
        url: &str,
    ) -> Result<(Uuid, Arc<DownloadJobController>), DomainError> {
        if !self.fetcher.validate_url(url) {
            return Err(DomainError::InvalidUrl(url.to_string()));
        }
        let controller = DownloadJobController::start(
            Arc::clone(&self.fetcher),
            url.to_string(),
            self.config.download.recordings_dir.clone(),
        );
        let job_id = Uuid::new_v4();
        info!("download job {job_id} registered for {url}");
        lock(&self.downloads).insert(job_id, Arc::clone(&controller));
        Ok((job_id, controller))
    }

    pub fn download_progress(&self, job_id: Uuid) -> Result<DownloadProgress, DomainError> {
        Ok(self.download(job_id)?.progress())
    }

    pub fn cancel_download(&self, job_id: Uuid) -> Result<(), DomainError> {
        self.download(job_id)?.cancel();
        Ok(())
    }

    fn download(&self, job_id: Uuid) -> Result<Arc<DownloadJobController>, DomainError> {
        lock(&self.downloads)
            .get(&job_id)
            .map(Arc::clone)
            .ok_or_else(|| DomainError::JobNotFound(job_id.to_string()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
