//! Stage identity and the failure guard shared by every stage body.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertKind, Alerter};
use crate::error::{CacheError, ErrorKind};
use crate::metrics::MetricsCollector;

/// Pipeline stages. Each stage kind runs serialized with itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Bootstrap,
    Discover,
    Check,
    Submit,
    Poll,
    Finish,
    Clear,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Bootstrap,
        Stage::Discover,
        Stage::Check,
        Stage::Submit,
        Stage::Poll,
        Stage::Finish,
        Stage::Clear,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Bootstrap => "bootstrap",
            Stage::Discover => "discover",
            Stage::Check => "check",
            Stage::Submit => "submit",
            Stage::Poll => "poll",
            Stage::Finish => "finish",
            Stage::Clear => "clear",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logs, alerts and short-circuits a stage on collaborator failure.
///
/// ```rust,ignore
/// let guard = StageGuard::new(Stage::Discover, alerter);
/// let studies = guard
///     .check("list study entries", registry.list_study_entries(&filter).await)
///     .await?;
/// ```
pub struct StageGuard<'a> {
    stage: Stage,
    alerter: &'a dyn Alerter,
    metrics: MetricsCollector,
    started: Instant,
}

impl<'a> StageGuard<'a> {
    pub fn new(stage: Stage, alerter: &'a dyn Alerter) -> Self {
        Self {
            stage,
            alerter,
            metrics: MetricsCollector::new(),
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Passes `Ok` through; reports an `Err` and returns it as a `CacheError`.
    pub async fn check<T, E>(&self, context: &str, result: Result<T, E>) -> Result<T, CacheError>
    where
        E: Into<CacheError>,
    {
        match result {
            Ok(value) => Ok(value),
            Err(e) => {
                let err = e.into();
                self.report(context, &err).await;
                Err(err)
            }
        }
    }

    /// Logs and alerts an error without returning it.
    pub async fn report(&self, context: &str, err: &CacheError) {
        let kind = err.kind();
        tracing::error!(
            stage = self.stage.as_str(),
            kind = %kind,
            context = context,
            error = %err,
            "Stage operation failed"
        );
        let alert_kind = match kind {
            ErrorKind::Transient => AlertKind::Transient,
            ErrorKind::Integrity => AlertKind::Integrity,
        };
        self.alerter
            .alert(Alert::new(
                alert_kind,
                format!("{}: {}", self.stage, context),
                err.to_string(),
            ))
            .await;
    }

    /// Sends an alert attributed to this stage.
    pub async fn alert(&self, kind: AlertKind, message: impl Into<String>) {
        self.alerter
            .alert(Alert::new(kind, self.stage.as_str(), message))
            .await;
    }

    /// Records the stage run with an outcome label.
    pub fn finish(&self, outcome: &str) {
        self.metrics
            .record_stage(self.stage.as_str(), outcome, self.started.elapsed().as_secs_f64());
    }

    /// Records the stage run, deriving the outcome from a result.
    pub fn complete<T>(&self, result: &Result<T, CacheError>) {
        match result {
            Ok(_) => self.finish("success"),
            Err(e) => match e.kind() {
                ErrorKind::Transient => self.finish("transient"),
                ErrorKind::Integrity => self.finish("integrity"),
            },
        }
    }
}
