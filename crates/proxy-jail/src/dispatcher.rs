//! Single-consumer funnel in front of the [`Engine`].
//!
//! Request handlers submit bans and errors through one queue; a single
//! consumer task takes events in submission order and runs each to
//! completion before accepting the next. A submit call returns only once the
//! consumer has taken its event, so a slow backend or logger slows every
//! caller instead of racing them.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use proxy_jail_geo::{GeoLookup, GeoProvider, MaxMindDatabase};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::backend::BanBackend;
use crate::config::JailConfig;
use crate::engine::{Engine, Event};
use crate::error::{JailError, JailResult};
use crate::logger::BanLogger;
use crate::matcher::Whitelist;

/// Submissions the queue holds while the consumer is busy.
const SUBMIT_CAPACITY: usize = 1;

/// An event plus the signal that the consumer has taken it.
#[derive(Debug)]
struct Submission {
    event: Event,
    accepted: oneshot::Sender<()>,
}

/// Handle for submitting events to the engine.
///
/// Cheap to clone; every clone feeds the same consumer. The consumer stops
/// once every handle is dropped.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Submission>,
}

impl Dispatcher {
    /// Create a new builder.
    #[must_use]
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// Starts the consumer task for `engine`.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(engine: Engine, sweep_interval: Option<Duration>) -> Self {
        let (tx, rx) = mpsc::channel(SUBMIT_CAPACITY);

        tokio::spawn(run_consumer(engine, rx, sweep_interval));

        Self { tx }
    }

    /// Bans `ip` for `timeout_minutes` unless it is whitelisted.
    ///
    /// Waits until the consumer has taken the request.
    pub async fn ban_ip(
        &self,
        ip: IpAddr,
        timeout_minutes: u32,
        reason: impl Into<String>,
    ) -> JailResult<()> {
        self.submit(Event::Ban {
            ip,
            timeout_minutes,
            reason: reason.into(),
        })
        .await
    }

    /// Counts an error against `ip`, banning it once the policy's burst
    /// is exceeded. Whitelisted addresses are ignored.
    ///
    /// Waits until the consumer has taken the report.
    pub async fn log_ip_error(&self, ip: IpAddr, reason: impl Into<String>) -> JailResult<()> {
        self.submit(Event::Error {
            ip,
            reason: reason.into(),
        })
        .await
    }

    /// Blocking form of [`Dispatcher::ban_ip`] for threads outside the
    /// runtime. Panics if called from within an async context.
    pub fn blocking_ban_ip(
        &self,
        ip: IpAddr,
        timeout_minutes: u32,
        reason: impl Into<String>,
    ) -> JailResult<()> {
        self.blocking_submit(Event::Ban {
            ip,
            timeout_minutes,
            reason: reason.into(),
        })
    }

    /// Blocking form of [`Dispatcher::log_ip_error`] for threads outside
    /// the runtime. Panics if called from within an async context.
    pub fn blocking_log_ip_error(&self, ip: IpAddr, reason: impl Into<String>) -> JailResult<()> {
        self.blocking_submit(Event::Error {
            ip,
            reason: reason.into(),
        })
    }

    /// Whether the consumer has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn submit(&self, event: Event) -> JailResult<()> {
        let (accepted, taken) = oneshot::channel();
        self.tx
            .send(Submission { event, accepted })
            .await
            .map_err(|_| JailError::DispatcherClosed)?;
        taken.await.map_err(|_| JailError::DispatcherClosed)
    }

    fn blocking_submit(&self, event: Event) -> JailResult<()> {
        let (accepted, taken) = oneshot::channel();
        self.tx
            .blocking_send(Submission { event, accepted })
            .map_err(|_| JailError::DispatcherClosed)?;
        taken.blocking_recv().map_err(|_| JailError::DispatcherClosed)
    }
}

async fn next_sweep(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn run_consumer(
    mut engine: Engine,
    mut rx: mpsc::Receiver<Submission>,
    sweep_interval: Option<Duration>,
) {
    let mut sweep = sweep_interval.map(|period| {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        interval
    });

    info!("Dispatcher started");

    loop {
        let event = tokio::select! {
            submission = rx.recv() => match submission {
                Some(Submission { event, accepted }) => {
                    // The submitter may have given up waiting.
                    let _ = accepted.send(());
                    event
                }
                None => break,
            },
            () = next_sweep(sweep.as_mut()) => Event::Sweep,
        };

        // Backends, loggers and geo refreshes may block; keep them off the
        // async workers while still running one event at a time.
        let handled = tokio::task::spawn_blocking(move || {
            engine.process(event, Instant::now());
            engine
        })
        .await;

        engine = match handled {
            Ok(engine) => engine,
            Err(e) => {
                error!(error = %e, "Event processing failed, dispatcher stopping");
                return;
            }
        };
    }

    debug!(tracked = engine.tracked_count(), "Dispatcher stopped");
}

/// Builder for a running [`Dispatcher`].
#[derive(Default)]
pub struct DispatcherBuilder {
    config: JailConfig,
    backend: Option<Arc<dyn BanBackend>>,
    logger: Option<Arc<dyn BanLogger>>,
    geo: Option<Box<dyn GeoProvider>>,
}

impl DispatcherBuilder {
    /// Set the configuration.
    #[must_use]
    pub fn config(mut self, config: JailConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ban backend. Without one, bans are only logged.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn BanBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the ban logger. Required.
    #[must_use]
    pub fn logger(mut self, logger: Arc<dyn BanLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Use `geo` for enrichment instead of the configured database paths.
    #[must_use]
    pub fn geo(mut self, geo: impl GeoProvider + 'static) -> Self {
        self.geo = Some(Box::new(geo));
        self
    }

    /// Validates the configuration and builds the engine without starting
    /// a consumer.
    ///
    /// # Errors
    ///
    /// Returns `JailError::MissingLogger` without a logger, or the parse
    /// error of the first invalid whitelist rule.
    pub fn build_engine(self) -> JailResult<(Engine, Option<Duration>)> {
        let logger = self.logger.ok_or(JailError::MissingLogger)?;
        let whitelist = Whitelist::from_rules(&self.config.whitelist)?;

        let geo = match (self.geo, self.config.geo) {
            (Some(geo), _) => Some(geo),
            (None, Some(paths)) => {
                let lookup = GeoLookup::<MaxMindDatabase>::open_degraded(paths)
                    .with_check_interval(self.config.geo_check_interval);
                Some(Box::new(lookup) as Box<dyn GeoProvider>)
            }
            (None, None) => None,
        };

        debug!(
            rules = whitelist.len(),
            geo = geo.is_some(),
            backend = self.backend.is_some(),
            "Building ban engine"
        );

        let engine = Engine::new(whitelist, self.config.forgivable, self.backend, logger, geo);
        Ok((engine, self.config.sweep_interval))
    }

    /// Builds the engine and starts its consumer.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`DispatcherBuilder::build_engine`].
    pub fn build(self) -> JailResult<Dispatcher> {
        let (engine, sweep_interval) = self.build_engine()?;
        Ok(Dispatcher::spawn(engine, sweep_interval))
    }
}
