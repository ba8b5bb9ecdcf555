//! Interactive scan workflow and the offline upload queue.
//!
//! ```text
//! Idle --set_image--> Selected --begin_analysis--> Loading --complete--> Result | Error
//!  ^                                                                      |
//!  +------------------------------ reset_analysis -------------------------+
//!                                  Error --retry--> Loading
//! ```
//!
//! Each `begin_analysis` bumps a generation counter and returns an
//! [`AnalysisTicket`]. Completions carrying an older generation are dropped,
//! so a slow first request cannot overwrite the answer to a newer one.

use std::sync::Arc;

use log::{debug, error, info, warn};
use serde::Serialize;

use crate::app_response::AppResponse;
use crate::clock::{Clock, MonotonicMillis};
use crate::observer::{SubscriptionId, Subscribers};
use crate::scan_model::{
    AnalysisOutcome, AnalysisResult, AnalysisTicket, AnalysisType, GeoPoint, PendingUpload,
    ScanState,
};
use crate::services::{AnalysisService, ServiceError};
use crate::storage::{read_json, write_json, KeyValueStore};

pub const PENDING_UPLOADS_KEY: &str = "pending_uploads";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub scan: ScanState,
    pub analysis_type: Option<AnalysisType>,
    pub pending_uploads: Vec<PendingUpload>,
}

pub struct ScanStore {
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    generation: u64,
    stamps: MonotonicMillis,
    session: ScanSession,
    subscribers: Subscribers<ScanSession>,
}

impl ScanStore {
    pub fn new(storage: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            storage,
            clock,
            generation: 0,
            stamps: MonotonicMillis::default(),
            session: ScanSession::default(),
            subscribers: Subscribers::new(),
        }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn state(&self) -> &ScanState {
        &self.session.scan
    }

    pub fn selected_image(&self) -> Option<&str> {
        self.session.scan.image()
    }

    pub fn analysis_type(&self) -> Option<AnalysisType> {
        self.session.analysis_type
    }

    pub fn result(&self) -> Option<&AnalysisResult> {
        self.session.scan.result()
    }

    pub fn error(&self) -> Option<&str> {
        self.session.scan.error()
    }

    pub fn is_loading(&self) -> bool {
        self.session.scan.is_loading()
    }

    pub fn pending_uploads(&self) -> &[PendingUpload] {
        &self.session.pending_uploads
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: Fn(&ScanSession) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    /// Selects a new image. Clears any previous result or error and
    /// supersedes a request still in flight.
    pub fn set_image(&mut self, uri: impl Into<String>) {
        self.generation += 1;
        self.session.scan = ScanState::Selected { image: uri.into() };
        self.notify();
    }

    pub fn set_analysis_type(&mut self, analysis_type: AnalysisType) {
        self.session.analysis_type = Some(analysis_type);
        self.notify();
    }

    /// Enters `Loading` for the selected image and returns the ticket the
    /// caller must complete with.
    pub fn begin_analysis(&mut self) -> Result<AnalysisTicket, AppResponse> {
        let image = self
            .selected_image()
            .map(str::to_string)
            .ok_or_else(|| AppResponse::BadRequest("No image selected".to_string()))?;

        self.generation += 1;
        self.session.scan = ScanState::Loading {
            image: image.clone(),
            generation: self.generation,
        };
        self.notify();

        Ok(AnalysisTicket {
            generation: self.generation,
            image,
            analysis_type: self.session.analysis_type,
        })
    }

    /// Same as [`ScanStore::begin_analysis`]; kept under the name the UI
    /// layer uses for flipping the spinner on.
    pub fn set_loading(&mut self) -> Result<AnalysisTicket, AppResponse> {
        self.begin_analysis()
    }

    /// Stores `result` unconditionally; loading and error are cleared.
    pub fn set_result(&mut self, result: AnalysisResult) {
        let image = self.selected_image().map(str::to_string);
        self.session.scan = ScanState::Result { image, result };
        self.notify();
    }

    pub fn set_error(&mut self, message: impl Into<String>) {
        let image = self.selected_image().map(str::to_string);
        self.session.scan = ScanState::Error { image, message: message.into() };
        self.notify();
    }

    /// Applies the outcome of the request identified by `ticket`. Returns
    /// `false` if the ticket is stale and the outcome was discarded.
    pub fn complete_analysis(
        &mut self,
        ticket: &AnalysisTicket,
        outcome: Result<AnalysisResult, String>,
    ) -> bool {
        let outcome = match outcome {
            Ok(result) => AnalysisOutcome::Success(result),
            Err(message) => AnalysisOutcome::Failed(message),
        };
        self.finish_analysis(ticket, outcome)
    }

    /// Like [`ScanStore::complete_analysis`], plus the offline case: the
    /// ticket's image is queued for upload even when the ticket is stale,
    /// and the session shows the offline error if the ticket is current.
    pub fn finish_analysis(&mut self, ticket: &AnalysisTicket, outcome: AnalysisOutcome) -> bool {
        if outcome == AnalysisOutcome::Offline {
            match ticket.analysis_type.or(self.session.analysis_type) {
                Some(analysis_type) => {
                    self.add_to_queue(ticket.image.clone(), analysis_type);
                }
                None => warn!("Offline scan of {} has no analysis type; not queued", ticket.image),
            }
        }

        if !self.is_current(ticket) {
            debug!(
                "Discarding stale analysis completion (ticket {}, current {})",
                ticket.generation, self.generation
            );
            return false;
        }

        match outcome {
            AnalysisOutcome::Success(result) => self.set_result(result),
            AnalysisOutcome::Failed(message) => self.set_error(message),
            AnalysisOutcome::Offline => self.set_error(ServiceError::Offline.to_string()),
        }
        true
    }

    fn is_current(&self, ticket: &AnalysisTicket) -> bool {
        matches!(
            self.session.scan,
            ScanState::Loading { generation, .. } if generation == ticket.generation
        )
    }

    /// Re-runs a failed analysis on the image that failed.
    pub fn retry(&mut self) -> Result<AnalysisTicket, AppResponse> {
        if matches!(self.session.scan, ScanState::Error { image: Some(_), .. }) {
            self.begin_analysis()
        } else {
            Err(AppResponse::BadRequest("Nothing to retry".to_string()))
        }
    }

    /// Back to `Idle`. The analysis type is kept; in-flight requests are
    /// superseded.
    pub fn reset_analysis(&mut self) {
        self.generation += 1;
        self.session.scan = ScanState::Idle;
        self.notify();
    }

    /// Runs one analysis end to end against `service`.
    ///
    /// When the service reports [`ServiceError::Offline`] the image is
    /// appended to the pending-upload queue before the error is shown.
    /// Returns whether the outcome was applied.
    pub fn run_analysis(
        &mut self,
        service: &dyn AnalysisService,
        location: Option<GeoPoint>,
    ) -> Result<bool, AppResponse> {
        let analysis_type = self
            .session
            .analysis_type
            .ok_or_else(|| AppResponse::BadRequest("No analysis type selected".to_string()))?;
        let ticket = self.begin_analysis()?;

        let outcome = match service.analyze(analysis_type, &ticket.image, location) {
            Ok(result) => AnalysisOutcome::Success(result),
            Err(ServiceError::Offline) => AnalysisOutcome::Offline,
            Err(e) => {
                warn!("{analysis_type} analysis failed: {e}");
                AnalysisOutcome::Failed(e.to_string())
            }
        };

        Ok(self.finish_analysis(&ticket, outcome))
    }

    pub fn add_to_queue(&mut self, image: impl Into<String>, analysis_type: AnalysisType) -> PendingUpload {
        let entry = PendingUpload {
            image: image.into(),
            analysis_type,
            timestamp: self.stamps.next(self.clock.now_ms()),
        };
        self.session.pending_uploads.push(entry.clone());
        info!("Queued {} scan for upload ({} pending)", analysis_type, self.session.pending_uploads.len());
        self.persist_queue();
        self.notify();
        entry
    }

    /// Replaces the in-memory queue with the persisted one, if any.
    pub fn load_pending_uploads(&mut self) {
        match read_json::<Vec<PendingUpload>>(self.storage.as_ref(), PENDING_UPLOADS_KEY) {
            Ok(Some(queue)) => {
                for entry in &queue {
                    self.stamps.observe(entry.timestamp);
                }
                self.session.pending_uploads = queue;
                self.notify();
            }
            Ok(None) => {}
            Err(e) => error!("Failed to load upload queue: {e}"),
        }
    }

    /// Removes the entry enqueued at `timestamp`.
    pub fn remove_from_queue(&mut self, timestamp: i64) -> bool {
        let before = self.session.pending_uploads.len();
        self.session.pending_uploads.retain(|entry| entry.timestamp != timestamp);
        let removed = self.session.pending_uploads.len() != before;
        self.persist_queue();
        self.notify();
        removed
    }

    fn persist_queue(&self) {
        if let Err(e) = write_json(self.storage.as_ref(), PENDING_UPLOADS_KEY, &self.session.pending_uploads) {
            error!("Failed to save upload queue: {e}");
        }
    }

    fn notify(&self) {
        self.subscribers.notify(&self.session);
    }
}
