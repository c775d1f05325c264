//! Pipeline orchestrator
//!
//! Moves every item of a batch through
//! `Ingested -> Normalized -> Resolved -> Enriched -> Scored -> Classified -> OutreachTriggered`.
//!
//! - Items run concurrently on a bounded worker pool; stages within an
//!   item run one after another
//! - Calls to a collaborator share that collaborator's concurrency gate
//! - Transient collaborator failures are retried with backoff; fatal input
//!   errors fail the item right away
//! - Every item has an overall timeout
//! - Cancellation is checked between stages, so a stage that started
//!   always finishes its store write
//! - A failing item never affects its siblings

use anyhow::Context;
use chrono::Utc;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use radar_core::{
    CandidateRecord, ExtractedAttributes, FailureReason, ItemStatus, Normalizer, PipelineError,
    PipelineRun, Profile, ProfileId, SourceRef, Stage,
};
use radar_engine::{
    EntityResolver, EnrichmentMerger, RingClassifier, ScoringEngine, SharedDispatcher,
    SharedEnricher, SharedProvider,
};
use radar_sources::SharedFetcher;

use crate::{retry, InMemoryProfileStore, PipelineConfig, RetryError, RetryPolicy, StageConfig};

/// Why an item stopped before succeeding
#[derive(Debug)]
enum Halt {
    Failed { reason: FailureReason, error: String },
    Skipped { status: ItemStatus, note: String },
    Cancelled,
}

impl Halt {
    fn failed(reason: FailureReason, error: impl Into<String>) -> Self {
        Halt::Failed {
            reason,
            error: error.into(),
        }
    }

    fn from_error<E: PipelineError>(error: E) -> Self {
        Halt::failed(error.reason(), error.to_string())
    }
}

impl<E: PipelineError> From<RetryError<E>> for Halt {
    fn from(err: RetryError<E>) -> Self {
        match err {
            RetryError::Exhausted { error, .. } => Halt::from_error(error),
            RetryError::Cancelled { .. } => Halt::Cancelled,
        }
    }
}

fn checkpoint(cancel: &CancellationToken) -> Result<(), Halt> {
    if cancel.is_cancelled() {
        Err(Halt::Cancelled)
    } else {
        Ok(())
    }
}

/// Run state shared by the items of one batch
struct RunTracker {
    run: Mutex<PipelineRun>,
}

impl RunTracker {
    fn new(run: PipelineRun) -> Self {
        Self {
            run: Mutex::new(run),
        }
    }

    fn start(&self, idx: usize) {
        self.run.lock().items[idx].status = ItemStatus::InProgress;
    }

    fn reach(&self, idx: usize, stage: Stage) {
        let mut run = self.run.lock();
        let item = &mut run.items[idx];
        item.stage_reached = stage;
        debug!("{} -> {}", item.input_ref, stage);
    }

    fn stage(&self, idx: usize) -> Stage {
        self.run.lock().items[idx].stage_reached
    }

    fn add_attempts(&self, idx: usize, attempts: u32) {
        self.run.lock().items[idx].attempts += attempts;
    }

    fn set_profile(&self, idx: usize, profile_id: ProfileId) {
        self.run.lock().items[idx].profile_id = Some(profile_id);
    }

    fn finish(&self, idx: usize, status: ItemStatus, error: Option<String>) {
        let mut run = self.run.lock();
        let item = &mut run.items[idx];
        item.status = status;
        item.error = error;
    }

    fn into_inner(self) -> PipelineRun {
        self.run.into_inner()
    }
}

/// Runs batches through the pipeline against one profile store
pub struct Pipeline {
    config: PipelineConfig,
    retry: RetryPolicy,
    normalizer: Normalizer,
    resolver: EntityResolver,
    merger: EnrichmentMerger,
    scoring: ScoringEngine,
    classifier: RingClassifier,
    fetcher: SharedFetcher,
    provider: Option<SharedProvider>,
    enrichers: Vec<SharedEnricher>,
    dispatcher: Option<SharedDispatcher>,
    store: Arc<InMemoryProfileStore>,
    gates: DashMap<String, Arc<Semaphore>>,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        stages: StageConfig,
        fetcher: SharedFetcher,
        store: Arc<InMemoryProfileStore>,
    ) -> Result<Self, anyhow::Error> {
        let normalizer =
            Normalizer::new(stages.normalizer).context("invalid registry number pattern")?;

        Ok(Self {
            retry: config.retry_policy(),
            config,
            normalizer,
            resolver: EntityResolver::new(stages.resolver),
            merger: EnrichmentMerger::new(stages.merge),
            scoring: ScoringEngine::new(&stages.scoring),
            classifier: RingClassifier::new(stages.classifier),
            fetcher,
            provider: None,
            enrichers: Vec::new(),
            dispatcher: None,
            store,
            gates: DashMap::new(),
        })
    }

    pub fn with_provider(mut self, provider: SharedProvider) -> Self {
        self.provider = Some(provider);
        self
    }

    pub fn with_enricher(mut self, enricher: SharedEnricher) -> Self {
        self.enrichers.push(enricher);
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: SharedDispatcher) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn store(&self) -> &Arc<InMemoryProfileStore> {
        &self.store
    }

    /// Process a batch to completion
    pub async fn run<S: AsRef<str>>(&self, input_refs: &[S]) -> PipelineRun {
        self.run_with_cancel(input_refs, &CancellationToken::new())
            .await
    }

    /// Process a batch until done or cancelled. Items that had not started
    /// stay `Pending`; items interrupted between stages stay `InProgress`.
    pub async fn run_with_cancel<S: AsRef<str>>(
        &self,
        input_refs: &[S],
        cancel: &CancellationToken,
    ) -> PipelineRun {
        let tracker = RunTracker::new(PipelineRun::new(
            input_refs.iter().map(|r| r.as_ref().to_string()),
        ));
        let workers = self.config.max_workers.max(1);
        info!("Processing {} items with {} workers", input_refs.len(), workers);

        stream::iter(input_refs.iter().enumerate())
            .map(|(idx, input_ref)| self.run_item(idx, input_ref.as_ref(), &tracker, cancel))
            .buffer_unordered(workers)
            .collect::<Vec<()>>()
            .await;

        let mut run = tracker.into_inner();
        run.cancelled = cancel.is_cancelled();
        run.complete();
        info!("Run {} finished: {}", run.run_id, run.summary());
        run
    }

    async fn run_item(
        &self,
        idx: usize,
        input_ref: &str,
        tracker: &RunTracker,
        cancel: &CancellationToken,
    ) {
        if cancel.is_cancelled() {
            return;
        }
        tracker.start(idx);

        let timeout = self.config.item_timeout();
        let outcome = match tokio::time::timeout(
            timeout,
            self.process_item(idx, input_ref, tracker, cancel),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(Halt::failed(
                FailureReason::Timeout,
                format!("item did not finish within {:?}", timeout),
            )),
        };

        match outcome {
            Ok(()) => {
                info!("{} succeeded at {}", input_ref, tracker.stage(idx));
                tracker.finish(idx, ItemStatus::Succeeded, None);
            }
            Err(Halt::Failed { reason, error }) => {
                let stage = tracker.stage(idx);
                warn!("{} failed after {} ({}): {}", input_ref, stage, reason, error);
                tracker.finish(idx, ItemStatus::Failed { stage, reason }, Some(error));
            }
            Err(Halt::Skipped { status, note }) => {
                info!("{} {}: {}", input_ref, status, note);
                tracker.finish(idx, status, Some(note));
            }
            Err(Halt::Cancelled) => {
                info!("{} stopped at {} by cancellation", input_ref, tracker.stage(idx));
            }
        }
    }

    fn gate(&self, collaborator: &str) -> Arc<Semaphore> {
        self.gates
            .entry(collaborator.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.config.limit_for(collaborator))))
            .clone()
    }

    /// Call a collaborator with retries, charging the attempts to the item
    async fn call<T, E, F, Fut>(
        &self,
        idx: usize,
        tracker: &RunTracker,
        cancel: &CancellationToken,
        collaborator: &str,
        op: F,
    ) -> Result<T, RetryError<E>>
    where
        E: PipelineError + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let gate = self.gate(collaborator);
        let result = retry(&self.retry, cancel, collaborator, Some(&gate), op).await;
        let attempts = match &result {
            Ok((_, attempts)) => *attempts,
            Err(err) => err.attempts(),
        };
        tracker.add_attempts(idx, attempts);
        result.map(|(value, _)| value)
    }

    async fn process_item(
        &self,
        idx: usize,
        input_ref: &str,
        tracker: &RunTracker,
        cancel: &CancellationToken,
    ) -> Result<(), Halt> {
        let source_ref: SourceRef = input_ref
            .parse()
            .map_err(|e: String| Halt::failed(FailureReason::MalformedInput, e))?;

        let fetcher = &self.fetcher;
        let raw = self
            .call(idx, tracker, cancel, fetcher.collaborator(&source_ref), || {
                fetcher.fetch(&source_ref)
            })
            .await?;
        checkpoint(cancel)?;

        let record = self.normalizer.normalize(&raw).map_err(Halt::from_error)?;
        let derived = self.provider_attributes(idx, tracker, cancel, &record).await?;
        let record = record.supersede(derived);
        tracker.reach(idx, Stage::Normalized);
        checkpoint(cancel)?;

        let resolver = &self.resolver;
        let store = self.store.as_ref();
        let resolution = retry(&self.retry, cancel, "resolve", None, || {
            resolver.resolve(&record, store)
        })
        .await
        .map(|(resolution, _)| resolution)?;
        tracker.set_profile(idx, resolution.profile_id);
        tracker.reach(idx, Stage::Resolved);
        debug!(
            "{} resolved to {} by {}",
            record.source_id(),
            resolution.profile_id,
            resolution.matched_by
        );
        checkpoint(cancel)?;

        // read-modify-write of one profile from here on
        let _guard = self.store.lock_profile(resolution.profile_id).await;
        let current = self.store.get(resolution.profile_id).ok_or_else(|| {
            Halt::failed(
                FailureReason::Store,
                format!("profile {} disappeared", resolution.profile_id),
            )
        })?;

        if !resolution.is_new
            && current.has_merged(record.source_id(), record.fingerprint())
            && self.fully_processed(&current)
        {
            return Err(Halt::Skipped {
                status: ItemStatus::SkippedDuplicate,
                note: format!("{} already merged into {}", record.source_id(), current.profile_id()),
            });
        }

        let merged = self.merger.merge(&current, &record);
        let profile = self.enrich(idx, tracker, cancel, merged.profile).await?;
        self.save(profile.clone())?;
        tracker.reach(idx, Stage::Enriched);
        checkpoint(cancel)?;

        let score = self
            .scoring
            .score(&profile, Utc::now())
            .map_err(|e| Halt::Skipped {
                status: ItemStatus::SkippedIncomplete,
                note: e.to_string(),
            })?;
        tracker.reach(idx, Stage::Scored);
        checkpoint(cancel)?;

        let classification = self.classifier.classify(&profile, &score);
        let mut profile = profile;
        profile.set_classification(
            classification.ring,
            score.quality_score,
            classification.confidence,
            classification.rationale.clone(),
        );
        self.save(profile.clone())?;
        tracker.reach(idx, Stage::Classified);
        debug!(
            "{} classified as {} (score {:.1}, confidence {:.2})",
            profile.profile_id(),
            classification.ring,
            score.quality_score,
            classification.confidence
        );
        checkpoint(cancel)?;

        let Some(dispatcher) = self.dispatcher.as_ref().filter(|_| self.config.dispatch_outreach)
        else {
            return Ok(());
        };
        if profile.outreach_sent() {
            return Ok(());
        }

        let ring = classification.ring;
        let target = &profile;
        let message = self
            .call(idx, tracker, cancel, dispatcher.name(), || {
                dispatcher.dispatch(target, ring)
            })
            .await?;
        profile.mark_outreach_sent();
        self.save(profile)?;
        tracker.reach(idx, Stage::OutreachTriggered);
        debug!("Outreach {} sent via {}", message.id, message.channel);
        Ok(())
    }

    /// Provider failures only cost signals
    async fn provider_attributes(
        &self,
        idx: usize,
        tracker: &RunTracker,
        cancel: &CancellationToken,
        record: &CandidateRecord,
    ) -> Result<ExtractedAttributes, Halt> {
        let Some(provider) = &self.provider else {
            return Ok(ExtractedAttributes::new());
        };
        if record.raw_text().trim().is_empty() {
            return Ok(ExtractedAttributes::new());
        }

        let text = record.raw_text();
        match self
            .call(idx, tracker, cancel, provider.name(), || provider.extract(text))
            .await
        {
            Ok(attributes) => Ok(attributes),
            Err(RetryError::Cancelled { .. }) => Err(Halt::Cancelled),
            Err(RetryError::Exhausted { error, .. }) => {
                warn!(
                    "Signal provider {} failed for {}: {}",
                    provider.name(),
                    record.source_id(),
                    error
                );
                Ok(ExtractedAttributes::new())
            }
        }
    }

    /// Layer enricher data onto the profile. Enrichment is best effort:
    /// a failing enricher leaves the profile as merged so far.
    async fn enrich(
        &self,
        idx: usize,
        tracker: &RunTracker,
        cancel: &CancellationToken,
        mut profile: Profile,
    ) -> Result<Profile, Halt> {
        for enricher in &self.enrichers {
            let target = &profile;
            let found = self
                .call(idx, tracker, cancel, enricher.name(), || enricher.enrich(target))
                .await;

            match found {
                Ok(Some(raw)) => match self.normalizer.normalize(&raw) {
                    Ok(extra) => profile = self.merger.merge(&profile, &extra).profile,
                    Err(e) => warn!("Enrichment from {} rejected: {}", enricher.name(), e),
                },
                Ok(None) => {}
                Err(RetryError::Cancelled { .. }) => return Err(Halt::Cancelled),
                Err(RetryError::Exhausted { error, .. }) => warn!(
                    "Enricher {} failed for {}: {}",
                    enricher.name(),
                    profile.profile_id(),
                    error
                ),
            }
        }
        Ok(profile)
    }

    /// Nothing left to do for a profile that saw this record before
    fn fully_processed(&self, profile: &Profile) -> bool {
        let dispatching = self.dispatcher.is_some() && self.config.dispatch_outreach;
        profile.ring().is_some() && (profile.outreach_sent() || !dispatching)
    }

    fn save(&self, profile: Profile) -> Result<(), Halt> {
        self.store.update(profile).map_err(Halt::from_error)
    }
}
