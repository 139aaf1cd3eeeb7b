// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Live event broadcasting to stream subscribers.
//!
//! # Architecture
//!
//! Producers never touch subscriber queues directly. Every event goes through
//! one bounded dispatch queue drained by a single task, which offers it to
//! each subscriber's own bounded queue:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          EventBroadcaster                           │
//! │                                                                     │
//! │  publish() ──try_send──> dispatch queue ──> dispatch task           │
//! │  heartbeat task ─────────────┘                    │                 │
//! │                                                   │ fan_out         │
//! │        ┌──────────────────────┬───────────────────┴───┐             │
//! │        ▼                      ▼                       ▼             │
//! │  ┌────────────┐        ┌────────────┐          ┌────────────┐       │
//! │  │ session 1  │        │ session 2  │   ...    │ session N  │       │
//! │  │ mpsc queue │        │ mpsc queue │          │ mpsc queue │       │
//! │  └────────────┘        └────────────┘          └────────────┘       │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A full dispatch queue drops the event at publish time. A full subscriber
//! queue drops the event for that subscriber only. Neither case blocks the
//! publisher or any other subscriber. Heartbeats use the same dispatch queue,
//! so a subscriber sees events in the order they were published.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use cronwatch_core::{SessionId, StreamEvent};

use crate::metrics::{BroadcasterMetrics, DropStage, EvictReason};
use crate::session::{SessionRegistry, SubscriberSession};

/// Default maximum number of concurrent subscribers.
pub const DEFAULT_MAX_SUBSCRIBERS: usize = 100;

/// Default capacity of the central dispatch queue.
pub const DEFAULT_DISPATCH_QUEUE_CAPACITY: usize = 256;

/// Default capacity of each subscriber queue.
pub const DEFAULT_SUBSCRIBER_QUEUE_CAPACITY: usize = 32;

/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default idle timeout in seconds.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 90;

/// Default maximum connection lifetime in seconds.
pub const DEFAULT_MAX_CONNECTION_SECS: u64 = 3600;

type Dispatch = mpsc::Sender<Arc<StreamEvent>>;

/// Configuration for the event broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
	/// When false, registration is refused and publishing is a no-op.
	pub enabled: bool,
	pub max_subscribers: usize,
	pub dispatch_queue_capacity: usize,
	pub subscriber_queue_capacity: usize,
	/// Interval between heartbeats and idle sweeps.
	pub heartbeat_interval: Duration,
	/// A subscriber that pulls nothing for this long is evicted.
	pub idle_timeout: Duration,
	/// Hard upper bound on one connection's lifetime.
	pub max_connection_duration: Duration,
}

impl Default for BroadcasterConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			max_subscribers: DEFAULT_MAX_SUBSCRIBERS,
			dispatch_queue_capacity: DEFAULT_DISPATCH_QUEUE_CAPACITY,
			subscriber_queue_capacity: DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
			heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
			idle_timeout: Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS),
			max_connection_duration: Duration::from_secs(DEFAULT_MAX_CONNECTION_SECS),
		}
	}
}

/// Fans job events out to every registered subscriber.
///
/// Construct with [`EventBroadcaster::start`], which spawns the dispatch and
/// heartbeat tasks on the current Tokio runtime. Call
/// [`EventBroadcaster::shutdown`] to stop them and close every session.
pub struct EventBroadcaster {
	config: BroadcasterConfig,
	registry: Arc<SessionRegistry>,
	dispatch: Dispatch,
	shutdown: CancellationToken,
	tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBroadcaster {
	/// Create a broadcaster and spawn its background tasks.
	///
	/// A disabled broadcaster spawns nothing.
	pub fn start(config: BroadcasterConfig, metrics: BroadcasterMetrics) -> Arc<Self> {
		let (dispatch, queue) = mpsc::channel(config.dispatch_queue_capacity.max(1));
		let registry = Arc::new(SessionRegistry::new(metrics));
		let shutdown = CancellationToken::new();

		let mut tasks = Vec::new();
		if config.enabled {
			tasks.push(tokio::spawn(dispatch_loop(
				Arc::clone(&registry),
				queue,
				shutdown.clone(),
			)));
			tasks.push(tokio::spawn(heartbeat_loop(
				Arc::clone(&registry),
				dispatch.clone(),
				config.heartbeat_interval,
				config.idle_timeout,
				shutdown.clone(),
			)));
			info!(
				max_subscribers = config.max_subscribers,
				dispatch_queue_capacity = config.dispatch_queue_capacity,
				subscriber_queue_capacity = config.subscriber_queue_capacity,
				heartbeat_secs = config.heartbeat_interval.as_secs(),
				"Event broadcaster started"
			);
		} else {
			info!("Event broadcaster disabled");
		}

		Arc::new(Self {
			config,
			registry,
			dispatch,
			shutdown,
			tasks: Mutex::new(tasks),
		})
	}

	pub fn is_enabled(&self) -> bool {
		self.config.enabled
	}

	pub fn config(&self) -> &BroadcasterConfig {
		&self.config
	}

	pub fn metrics(&self) -> &BroadcasterMetrics {
		self.registry.metrics()
	}

	/// Number of currently registered subscribers.
	pub fn subscriber_count(&self) -> usize {
		self.registry.len()
	}

	/// Register a new subscriber.
	///
	/// Returns `None` when the broadcaster is disabled, shutting down, or
	/// already at `max_subscribers`. Existing subscribers are unaffected.
	pub fn register(&self) -> Option<SubscriberSession> {
		if !self.config.enabled || self.shutdown.is_cancelled() {
			self.registry.metrics().subscriber_rejected();
			debug!("Subscription refused, broadcaster not accepting subscribers");
			return None;
		}

		let session = self.registry.insert(
			self.config.max_subscribers,
			self.config.subscriber_queue_capacity,
			self.shutdown.child_token(),
			self.config.max_connection_duration,
		);

		match &session {
			Some(session) => debug!(
				session_id = %session.id(),
				subscribers = self.registry.len(),
				"Subscriber registered"
			),
			None => {
				self.registry.metrics().subscriber_rejected();
				warn!(
					max_subscribers = self.config.max_subscribers,
					"Subscription refused, subscriber limit reached"
				);
			}
		}
		session
	}

	/// Remove a subscriber.
	///
	/// Safe to call more than once or concurrently; only the call that
	/// actually removed the session returns `true`.
	pub fn unregister(&self, id: SessionId) -> bool {
		self.registry.remove(id, None)
	}

	/// Queue an event for delivery to every subscriber.
	///
	/// Never blocks. Returns `false` if the event was dropped because the
	/// broadcaster is disabled, stopped, or its dispatch queue is full.
	pub fn publish(&self, event: StreamEvent) -> bool {
		if !self.config.enabled {
			return false;
		}
		enqueue(&self.dispatch, self.registry.metrics(), event)
	}

	/// Evict subscribers idle for longer than the configured timeout.
	///
	/// The heartbeat task runs this on every tick.
	pub fn sweep_idle(&self) -> usize {
		self.registry.sweep_idle(self.config.idle_timeout)
	}

	/// Stop the background tasks and close every session.
	#[instrument(skip(self))]
	pub async fn shutdown(&self) {
		self.shutdown.cancel();

		let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
		for task in tasks {
			if let Err(e) = task.await {
				warn!(error = %e, "Broadcaster task ended abnormally");
			}
		}

		let closed = self.registry.drain(EvictReason::Shutdown);
		info!(closed_sessions = closed, "Event broadcaster stopped");
	}
}

fn enqueue(dispatch: &Dispatch, metrics: &BroadcasterMetrics, event: StreamEvent) -> bool {
	let event_type = event.event_type();
	match dispatch.try_send(Arc::new(event)) {
		Ok(()) => {
			metrics.event_published();
			true
		}
		Err(TrySendError::Full(_)) => {
			metrics.event_dropped(DropStage::Dispatch);
			warn!(event_type, "Dispatch queue full, dropping event");
			false
		}
		Err(TrySendError::Closed(_)) => {
			debug!(event_type, "Broadcaster stopped, dropping event");
			false
		}
	}
}

async fn dispatch_loop(
	registry: Arc<SessionRegistry>,
	mut queue: mpsc::Receiver<Arc<StreamEvent>>,
	shutdown: CancellationToken,
) {
	loop {
		tokio::select! {
			biased;
			_ = shutdown.cancelled() => break,
			event = queue.recv() => match event {
				Some(event) => registry.fan_out(&event),
				None => break,
			},
		}
	}
	debug!("Dispatch loop stopped");
}

async fn heartbeat_loop(
	registry: Arc<SessionRegistry>,
	dispatch: Dispatch,
	period: Duration,
	idle_timeout: Duration,
	shutdown: CancellationToken,
) {
	let mut ticker = interval_at(Instant::now() + period, period);
	ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

	loop {
		tokio::select! {
			_ = shutdown.cancelled() => break,
			_ = ticker.tick() => {
				enqueue(&dispatch, registry.metrics(), StreamEvent::heartbeat());
				let evicted = registry.sweep_idle(idle_timeout);
				if evicted > 0 {
					info!(evicted, remaining = registry.len(), "Evicted idle subscribers");
				}
			}
		}
	}
	debug!("Heartbeat loop stopped");
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Utc;
	use cronwatch_core::{evaluate, Job, JobId, JobLifecycle};
	use std::collections::BTreeMap;
	use tokio::time::timeout;

	const WAIT: Duration = Duration::from_secs(2);

	fn config() -> BroadcasterConfig {
		BroadcasterConfig {
			heartbeat_interval: Duration::from_secs(3600),
			idle_timeout: Duration::from_secs(7200),
			..BroadcasterConfig::default()
		}
	}

	fn broadcaster(config: BroadcasterConfig) -> Arc<EventBroadcaster> {
		EventBroadcaster::start(config, BroadcasterMetrics::new().unwrap())
	}

	fn status_event(id: i64) -> StreamEvent {
		let now = Utc::now();
		let job = Job {
			id: JobId(id),
			name: format!("job-{id}"),
			host: "host".to_string(),
			key: format!("key-{id}"),
			labels: BTreeMap::new(),
			status: JobLifecycle::Active,
			automatic_failure_threshold: 3600,
			last_reported_at: now,
			created_at: now,
			updated_at: now,
		};
		StreamEvent::job_status_change(&job, evaluate(&job, None, now))
	}

	async fn next(session: &mut SubscriberSession) -> Arc<StreamEvent> {
		timeout(WAIT, session.recv())
			.await
			.expect("timed out waiting for event")
			.expect("session closed")
	}

	#[tokio::test]
	async fn every_subscriber_gets_each_event_once() {
		let b = broadcaster(config());
		let mut sessions: Vec<_> = (0..3).map(|_| b.register().unwrap()).collect();

		assert!(b.publish(status_event(7)));

		for session in &mut sessions {
			let event = next(session).await;
			assert_eq!(event.event_type(), "job-status-change");
			assert_eq!(event.job_id(), Some(JobId(7)));
			assert!(timeout(Duration::from_millis(50), session.recv()).await.is_err());
		}
		b.shutdown().await;
	}

	#[tokio::test]
	async fn subscriber_cap_rejects_without_disturbing_existing() {
		let b = broadcaster(BroadcasterConfig {
			max_subscribers: 2,
			..config()
		});
		let mut first = b.register().unwrap();
		let mut second = b.register().unwrap();
		assert!(b.register().is_none());
		assert_eq!(b.subscriber_count(), 2);

		b.publish(status_event(1));
		assert_eq!(next(&mut first).await.job_id(), Some(JobId(1)));
		assert_eq!(next(&mut second).await.job_id(), Some(JobId(1)));

		drop(second);
		assert_eq!(b.subscriber_count(), 1);
		assert!(b.register().is_some());
		b.shutdown().await;
	}

	#[tokio::test]
	async fn slow_subscriber_does_not_hold_back_others() {
		let b = broadcaster(BroadcasterConfig {
			subscriber_queue_capacity: 4,
			..config()
		});
		let mut fast = b.register().unwrap();
		let mut slow = b.register().unwrap();

		for id in 0..20 {
			assert!(b.publish(status_event(id)));
			assert_eq!(next(&mut fast).await.job_id(), Some(JobId(id)));
		}

		let mut received = 0;
		while timeout(Duration::from_millis(50), slow.recv()).await.is_ok() {
			received += 1;
		}
		assert_eq!(received, 4);
		assert_eq!(b.metrics().dropped(DropStage::Subscriber), 16);
		assert_eq!(b.subscriber_count(), 2);
		b.shutdown().await;
	}

	#[tokio::test]
	async fn full_dispatch_queue_drops_at_publish() {
		let b = broadcaster(BroadcasterConfig {
			dispatch_queue_capacity: 2,
			..config()
		});

		// The current-thread runtime has not polled the dispatch task yet.
		assert!(b.publish(status_event(1)));
		assert!(b.publish(status_event(2)));
		assert!(!b.publish(status_event(3)));
		assert_eq!(b.metrics().dropped(DropStage::Dispatch), 1);
		assert_eq!(b.metrics().published(), 2);
		b.shutdown().await;
	}

	#[tokio::test]
	async fn unregister_is_idempotent() {
		let b = broadcaster(config());
		let mut session = b.register().unwrap();
		let id = session.id();

		assert!(b.unregister(id));
		assert!(!b.unregister(id));
		assert_eq!(b.subscriber_count(), 0);
		assert!(session.recv().await.is_none());

		drop(session);
		assert_eq!(b.subscriber_count(), 0);
		b.shutdown().await;
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_unregister_removes_once() {
		let b = broadcaster(config());
		let session = b.register().unwrap();
		let id = session.id();

		let handles: Vec<_> = (0..8)
			.map(|_| {
				let b = Arc::clone(&b);
				tokio::spawn(async move { b.unregister(id) })
			})
			.collect();

		let mut removed = 0;
		for handle in handles {
			if handle.await.unwrap() {
				removed += 1;
			}
		}
		assert_eq!(removed, 1);
		drop(session);
		b.shutdown().await;
	}

	#[tokio::test]
	async fn heartbeat_follows_earlier_events() {
		let b = broadcaster(BroadcasterConfig {
			heartbeat_interval: Duration::from_millis(100),
			..config()
		});
		let mut session = b.register().unwrap();

		b.publish(status_event(1));
		assert_eq!(next(&mut session).await.event_type(), "job-status-change");
		assert_eq!(next(&mut session).await.event_type(), "heartbeat");
		b.shutdown().await;
	}

	#[tokio::test]
	async fn idle_subscriber_is_evicted() {
		let b = broadcaster(BroadcasterConfig {
			heartbeat_interval: Duration::from_millis(20),
			idle_timeout: Duration::from_millis(60),
			..config()
		});
		let mut session = b.register().unwrap();

		tokio::time::sleep(Duration::from_millis(300)).await;
		assert_eq!(b.subscriber_count(), 0);
		assert!(session.is_cancelled());
		assert!(session.recv().await.is_none());
		assert_eq!(b.metrics().evicted(EvictReason::Idle), 1);
		b.shutdown().await;
	}

	#[tokio::test]
	async fn active_subscriber_survives_sweep() {
		let b = broadcaster(BroadcasterConfig {
			idle_timeout: Duration::from_millis(200),
			..config()
		});
		let mut session = b.register().unwrap();

		for id in 0..3 {
			tokio::time::sleep(Duration::from_millis(100)).await;
			b.publish(status_event(id));
			next(&mut session).await;
			assert_eq!(b.sweep_idle(), 0);
		}
		assert_eq!(b.subscriber_count(), 1);
		b.shutdown().await;
	}

	#[tokio::test]
	async fn connection_lifetime_ends_session() {
		let b = broadcaster(BroadcasterConfig {
			max_connection_duration: Duration::from_millis(50),
			..config()
		});
		let mut session = b.register().unwrap();

		let ended = timeout(WAIT, session.recv()).await.unwrap();
		assert!(ended.is_none());
		drop(session);
		assert_eq!(b.subscriber_count(), 0);
		b.shutdown().await;
	}

	#[tokio::test]
	async fn shutdown_closes_sessions_and_refuses_new_ones() {
		let b = broadcaster(config());
		let mut a = b.register().unwrap();
		let mut c = b.register().unwrap();

		b.shutdown().await;

		assert!(timeout(WAIT, a.recv()).await.unwrap().is_none());
		assert!(timeout(WAIT, c.recv()).await.unwrap().is_none());
		assert_eq!(b.subscriber_count(), 0);
		assert!(b.register().is_none());
		assert!(!b.publish(status_event(1)));
		assert_eq!(b.metrics().evicted(EvictReason::Shutdown), 2);
	}

	#[tokio::test]
	async fn disabled_broadcaster_refuses_everything() {
		let b = broadcaster(BroadcasterConfig {
			enabled: false,
			..config()
		});
		assert!(!b.is_enabled());
		assert!(b.register().is_none());
		assert!(!b.publish(status_event(1)));
		b.shutdown().await;
	}
}
