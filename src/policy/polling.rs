//! Scheduled version comparison.
//!
//! The service owns the cached version token. It is written by the startup
//! fetch, by the scheduled tick and by the invalidation listener, so it lives
//! in a single atomic. A tick only publishes its version if nobody else wrote
//! the token while its reload ran.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::policy::engine::PolicyEngine;
use crate::policy::errors::PolicyError;
use crate::policy::loader::{LoadReport, PolicyLoader};
use crate::policy::source::{SourceDescriptor, SourceKind, VersionSourceDescriptor};
use crate::policy::version::VersionChecker;
use crate::settings::Polling;

/// Shortest accepted polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Snapshot of the polling state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingState {
    pub cached_version: i64,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Polling is not armed
    Disabled,
    /// The version could not be read; nothing changed
    Skipped,
    /// A previous tick is still running
    Busy,
    Unchanged(i64),
    Reloaded {
        from: i64,
        to: i64,
        report: LoadReport,
    },
}

pub struct VersionPollingService {
    cached_version: AtomicI64,
    checker: Option<VersionChecker>,
    interval: Duration,
    loader: Arc<PolicyLoader>,
    engine: Arc<dyn PolicyEngine>,
    tick_lock: Mutex<()>,
}

impl VersionPollingService {
    /// Validate the polling configuration and arm the service, or return it
    /// disabled. Configuration problems are logged, never fatal: the initial
    /// load already succeeded and the listener still works without polling.
    pub async fn initialize(
        config: &Polling,
        loader: Arc<PolicyLoader>,
        engine: Arc<dyn PolicyEngine>,
        timeout: Duration,
    ) -> Self {
        tracing::info!("Initializing version polling");

        if !config.enabled {
            tracing::info!("Version polling is disabled");
            return Self::disabled(loader, engine);
        }

        let interval = match config.interval() {
            Some(interval) if interval >= MIN_POLL_INTERVAL => interval,
            Some(interval) => {
                tracing::error!(
                    ?interval,
                    minimum = ?MIN_POLL_INTERVAL,
                    "Polling interval is below the minimum, polling disabled"
                );
                return Self::disabled(loader, engine);
            }
            None => {
                tracing::info!("Polling interval not configured, polling disabled");
                return Self::disabled(loader, engine);
            }
        };

        let Some(raw_source) = config.version_source.as_deref() else {
            tracing::warn!("Version source not configured, polling disabled");
            return Self::disabled(loader, engine);
        };

        if matches!(
            SourceDescriptor::parse(loader.source()).map(|s| s.kind),
            Ok(SourceKind::File)
        ) {
            tracing::info!("Policy source is a static resource, polling not applicable");
            return Self::disabled(loader, engine);
        }

        let checker = VersionSourceDescriptor::parse(raw_source).and_then(|descriptor| {
            VersionChecker::from_descriptor(&descriptor, loader.sources(), timeout)
        });
        let checker = match checker {
            Ok(checker) => checker,
            Err(e) => {
                tracing::error!(
                    version_source = raw_source,
                    error = %e,
                    "Invalid version source, polling disabled"
                );
                return Self::disabled(loader, engine);
            }
        };

        if !checker.is_available().await {
            tracing::warn!(checker = %checker.description(), "Version checker is not available, polling disabled");
            return Self::disabled(loader, engine);
        }

        tracing::info!(
            ?interval,
            checker = %checker.description(),
            "Version polling enabled"
        );
        Self::with_checker(checker, interval, loader, engine)
    }

    pub fn disabled(loader: Arc<PolicyLoader>, engine: Arc<dyn PolicyEngine>) -> Self {
        Self {
            cached_version: AtomicI64::new(0),
            checker: None,
            interval: MIN_POLL_INTERVAL,
            loader,
            engine,
            tick_lock: Mutex::new(()),
        }
    }

    /// An armed service. No availability check is made.
    pub fn with_checker(
        checker: VersionChecker,
        interval: Duration,
        loader: Arc<PolicyLoader>,
        engine: Arc<dyn PolicyEngine>,
    ) -> Self {
        Self {
            cached_version: AtomicI64::new(0),
            checker: Some(checker),
            interval: interval.max(MIN_POLL_INTERVAL),
            loader,
            engine,
            tick_lock: Mutex::new(()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.checker.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cached_version(&self) -> i64 {
        self.cached_version.load(Ordering::SeqCst)
    }

    /// Overwrite the cached version without reloading.
    pub fn set_cached_version(&self, version: i64) {
        self.cached_version.store(version, Ordering::SeqCst);
        tracing::info!(version, "Cached policy version updated");
    }

    pub fn state(&self) -> PollingState {
        PollingState {
            cached_version: self.cached_version(),
            enabled: self.is_enabled(),
        }
    }

    pub fn loader(&self) -> &Arc<PolicyLoader> {
        &self.loader
    }

    pub fn engine(&self) -> &Arc<dyn PolicyEngine> {
        &self.engine
    }

    /// Establish the baseline version. Never triggers a reload.
    pub async fn load_initial_version(&self) {
        let Some(checker) = &self.checker else {
            return;
        };
        let version = checker.current_version().await.unwrap_or_default();
        self.set_cached_version(version);
        tracing::info!(version, "Loaded initial policy version");
    }

    /// One scheduled tick. A reload error is returned with the cached version
    /// untouched, so the mismatch is retried on the next tick. A tick that
    /// fires while another is still running is skipped.
    pub async fn check_version_and_reload(&self) -> Result<TickOutcome, PolicyError> {
        let Ok(_tick) = self.tick_lock.try_lock() else {
            tracing::debug!("Previous version check still running, skipping tick");
            return Ok(TickOutcome::Busy);
        };

        let Some(checker) = &self.checker else {
            return Ok(TickOutcome::Disabled);
        };

        let Some(current) = checker.current_version().await else {
            tracing::debug!(checker = %checker.description(), "Unable to read current policy version");
            return Ok(TickOutcome::Skipped);
        };

        let cached = self.cached_version();
        if current == cached {
            tracing::debug!(version = current, "No policy version change");
            return Ok(TickOutcome::Unchanged(current));
        }

        tracing::info!(from = cached, to = current, "Policy version change detected, reloading");
        let report = self.loader.load_policies(self.engine.as_ref()).await?;
        // A listener message may have set a newer token during the reload
        if let Err(latest) = self.cached_version.compare_exchange(
            cached,
            current,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            tracing::debug!(
                read = current,
                cached = latest,
                "Cached version changed during reload, keeping it"
            );
        }
        tracing::info!(version = current, rules = report.loaded, "Policy reload completed");

        Ok(TickOutcome::Reloaded {
            from: cached,
            to: current,
            report,
        })
    }
}
