// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Self-metrics of the event broadcaster.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Where an event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropStage {
	/// Central dispatch queue was full at publish time.
	Dispatch,
	/// One subscriber's queue was full during fan-out.
	Subscriber,
}

impl DropStage {
	fn as_str(self) -> &'static str {
		match self {
			Self::Dispatch => "dispatch",
			Self::Subscriber => "subscriber",
		}
	}
}

/// Why a subscriber was removed by the broadcaster rather than by its own
/// connection closing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictReason {
	Idle,
	Closed,
	Shutdown,
}

impl EvictReason {
	pub fn as_str(self) -> &'static str {
		match self {
			Self::Idle => "idle",
			Self::Closed => "closed",
			Self::Shutdown => "shutdown",
		}
	}
}

/// Prometheus counters and gauges for the broadcaster.
///
/// Handles are cheap clones sharing the same underlying series.
#[derive(Clone)]
pub struct BroadcasterMetrics {
	registry: Registry,

	events_published: IntCounter,
	events_delivered: IntCounter,
	events_dropped: IntCounterVec,
	subscribers: IntGauge,
	subscribers_rejected: IntCounter,
	subscribers_evicted: IntCounterVec,
}

impl BroadcasterMetrics {
	pub fn new() -> prometheus::Result<Self> {
		let registry = Registry::new();

		let events_published = IntCounter::with_opts(Opts::new(
			"cronwatch_events_published_total",
			"Total events accepted onto the dispatch queue",
		))?;
		registry.register(Box::new(events_published.clone()))?;

		let events_delivered = IntCounter::with_opts(Opts::new(
			"cronwatch_events_delivered_total",
			"Total events enqueued for a subscriber",
		))?;
		registry.register(Box::new(events_delivered.clone()))?;

		let events_dropped = IntCounterVec::new(
			Opts::new("cronwatch_events_dropped_total", "Total events dropped"),
			&["stage"],
		)?;
		registry.register(Box::new(events_dropped.clone()))?;

		let subscribers = IntGauge::with_opts(Opts::new(
			"cronwatch_subscribers",
			"Currently registered event stream subscribers",
		))?;
		registry.register(Box::new(subscribers.clone()))?;

		let subscribers_rejected = IntCounter::with_opts(Opts::new(
			"cronwatch_subscribers_rejected_total",
			"Subscriptions refused because the broadcaster was disabled or full",
		))?;
		registry.register(Box::new(subscribers_rejected.clone()))?;

		let subscribers_evicted = IntCounterVec::new(
			Opts::new(
				"cronwatch_subscribers_evicted_total",
				"Subscribers removed by the broadcaster",
			),
			&["reason"],
		)?;
		registry.register(Box::new(subscribers_evicted.clone()))?;

		Ok(Self {
			registry,
			events_published,
			events_delivered,
			events_dropped,
			subscribers,
			subscribers_rejected,
			subscribers_evicted,
		})
	}

	pub fn event_published(&self) {
		self.events_published.inc();
	}

	pub fn event_delivered(&self) {
		self.events_delivered.inc();
	}

	pub fn event_dropped(&self, stage: DropStage) {
		self.events_dropped.with_label_values(&[stage.as_str()]).inc();
	}

	pub fn set_subscribers(&self, count: usize) {
		self.subscribers.set(count as i64);
	}

	pub fn subscriber_rejected(&self) {
		self.subscribers_rejected.inc();
	}

	pub fn subscriber_evicted(&self, reason: EvictReason) {
		self
			.subscribers_evicted
			.with_label_values(&[reason.as_str()])
			.inc();
	}

	pub fn dropped(&self, stage: DropStage) -> u64 {
		self.events_dropped.with_label_values(&[stage.as_str()]).get()
	}

	pub fn evicted(&self, reason: EvictReason) -> u64 {
		self
			.subscribers_evicted
			.with_label_values(&[reason.as_str()])
			.get()
	}

	pub fn published(&self) -> u64 {
		self.events_published.get()
	}

	/// Encode every series in text exposition format.
	pub fn gather(&self) -> prometheus::Result<String> {
		let encoder = TextEncoder::new();
		let mut buffer = Vec::new();
		encoder.encode(&self.registry.gather(), &mut buffer)?;
		String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
	}
}
