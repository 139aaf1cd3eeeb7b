// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Subscriber sessions and the registry that owns them.
//!
//! A session is one open event stream. The registry keeps the sending half
//! of each session's bounded queue; the connection task owns the receiving
//! half through [`SubscriberSession`]. The registry lock is only held to
//! insert, remove or iterate, never across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use cronwatch_core::{SessionId, StreamEvent};

use crate::metrics::{BroadcasterMetrics, DropStage, EvictReason};

/// Registry-side state of one session.
struct SessionHandle {
	sender: mpsc::Sender<Arc<StreamEvent>>,
	cancel: CancellationToken,
	last_activity: Arc<AtomicU64>,
}

/// Map of live sessions guarded by a single mutex.
pub(crate) struct SessionRegistry {
	sessions: Mutex<HashMap<SessionId, SessionHandle>>,
	metrics: BroadcasterMetrics,
	epoch: Instant,
}

impl SessionRegistry {
	pub(crate) fn new(metrics: BroadcasterMetrics) -> Self {
		Self {
			sessions: Mutex::new(HashMap::new()),
			metrics,
			epoch: Instant::now(),
		}
	}

	fn lock(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
		self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn elapsed_ms(epoch: Instant) -> u64 {
		epoch.elapsed().as_millis() as u64
	}

	pub(crate) fn len(&self) -> usize {
		self.lock().len()
	}

	pub(crate) fn metrics(&self) -> &BroadcasterMetrics {
		&self.metrics
	}

	/// Allocate a session unless `max_sessions` are already registered.
	pub(crate) fn insert(
		self: &Arc<Self>,
		max_sessions: usize,
		queue_capacity: usize,
		cancel: CancellationToken,
		max_lifetime: Duration,
	) -> Option<SubscriberSession> {
		let id = SessionId::new();
		let (sender, receiver) = mpsc::channel(queue_capacity.max(1));
		let last_activity = Arc::new(AtomicU64::new(Self::elapsed_ms(self.epoch)));

		let count = {
			let mut sessions = self.lock();
			if sessions.len() >= max_sessions {
				return None;
			}
			sessions.insert(
				id,
				SessionHandle {
					sender,
					cancel: cancel.clone(),
					last_activity: Arc::clone(&last_activity),
				},
			);
			sessions.len()
		};
		self.metrics.set_subscribers(count);

		Some(SubscriberSession {
			id,
			receiver,
			cancel,
			last_activity,
			epoch: self.epoch,
			deadline: Instant::now() + max_lifetime,
			registry: Arc::downgrade(self),
		})
	}

	/// Remove a session, cancelling it and closing its queue.
	///
	/// Returns `true` only for the call that actually removed it.
	pub(crate) fn remove(&self, id: SessionId, reason: Option<EvictReason>) -> bool {
		let (handle, count) = {
			let mut sessions = self.lock();
			let handle = sessions.remove(&id);
			(handle, sessions.len())
		};

		let Some(handle) = handle else {
			return false;
		};
		self.metrics.set_subscribers(count);
		handle.cancel.cancel();
		drop(handle.sender);

		match reason {
			Some(reason) => {
				self.metrics.subscriber_evicted(reason);
				debug!(session_id = %id, reason = reason.as_str(), remaining = count, "Evicted subscriber");
			}
			None => debug!(session_id = %id, remaining = count, "Subscriber unregistered"),
		}
		true
	}

	/// Offer `event` to every session without blocking.
	///
	/// A full queue loses this event for that session only.
	pub(crate) fn fan_out(&self, event: &Arc<StreamEvent>) {
		let mut closed = Vec::new();
		{
			let sessions = self.lock();
			for (id, handle) in sessions.iter() {
				match handle.sender.try_send(Arc::clone(event)) {
					Ok(()) => self.metrics.event_delivered(),
					Err(TrySendError::Full(_)) => {
						self.metrics.event_dropped(DropStage::Subscriber);
						warn!(
							session_id = %id,
							event_type = event.event_type(),
							"Subscriber queue full, dropping event"
						);
					}
					Err(TrySendError::Closed(_)) => closed.push(*id),
				}
			}
		}

		for id in closed {
			self.remove(id, Some(EvictReason::Closed));
		}
	}

	/// Evict every session that has not pulled an event for `idle_timeout`.
	pub(crate) fn sweep_idle(&self, idle_timeout: Duration) -> usize {
		let now = Self::elapsed_ms(self.epoch);
		let limit = idle_timeout.as_millis() as u64;

		let stale: Vec<SessionId> = self
			.lock()
			.iter()
			.filter(|(_, h)| now.saturating_sub(h.last_activity.load(Ordering::Relaxed)) > limit)
			.map(|(id, _)| *id)
			.collect();

		stale
			.into_iter()
			.filter(|id| self.remove(*id, Some(EvictReason::Idle)))
			.count()
	}

	/// Remove every session.
	pub(crate) fn drain(&self, reason: EvictReason) -> usize {
		let handles: Vec<(SessionId, SessionHandle)> = self.lock().drain().collect();
		self.metrics.set_subscribers(0);

		for (id, handle) in &handles {
			handle.cancel.cancel();
			self.metrics.subscriber_evicted(reason);
			debug!(session_id = %id, reason = reason.as_str(), "Closed subscriber");
		}
		handles.len()
	}
}

/// One live subscriber connection.
///
/// Created by [`EventBroadcaster::register`](crate::EventBroadcaster::register).
/// Dropping the session unregisters it.
pub struct SubscriberSession {
	id: SessionId,
	receiver: mpsc::Receiver<Arc<StreamEvent>>,
	cancel: CancellationToken,
	last_activity: Arc<AtomicU64>,
	epoch: Instant,
	deadline: Instant,
	registry: Weak<SessionRegistry>,
}

impl std::fmt::Debug for SubscriberSession {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SubscriberSession")
			.field("id", &self.id)
			.field("cancelled", &self.cancel.is_cancelled())
			.finish()
	}
}

impl SubscriberSession {
	pub fn id(&self) -> SessionId {
		self.id
	}

	/// Wait for the next event.
	///
	/// Returns `None` once the session is cancelled (eviction, shutdown or
	/// unregister) or its connection lifetime has run out.
	pub async fn recv(&mut self) -> Option<Arc<StreamEvent>> {
		let event = tokio::select! {
			biased;
			_ = self.cancel.cancelled() => None,
			_ = tokio::time::sleep_until(self.deadline) => {
				debug!(session_id = %self.id, "Subscriber connection lifetime reached");
				self.cancel.cancel();
				None
			}
			event = self.receiver.recv() => event,
		};

		if event.is_some() {
			self.touch();
		}
		event
	}

	/// Mark the session as active now.
	pub fn touch(&self) {
		self.last_activity.store(
			SessionRegistry::elapsed_ms(self.epoch),
			Ordering::Relaxed,
		);
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

impl Drop for SubscriberSession {
	fn drop(&mut self) {
		if let Some(registry) = self.registry.upgrade() {
			registry.remove(self.id, None);
		}
	}
}
