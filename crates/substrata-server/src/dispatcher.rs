//! Broadcast dispatcher: fans a `(world_name, event)` out to
//! every subscriber of that world exactly once, applying the slow-subscriber
//! policy (coalesce same-UID updates, then mark lagged) when a subscriber's
//! queue is full. Grounded in `replicate-server::instance::InstanceManager`'s
//! `DashMap`-per-key pattern, adapted to hold per-world subscriber lists.

use std::{
	collections::VecDeque,
	sync::{
		atomic::{AtomicU64, Ordering},
		Arc, Mutex,
	},
};

use dashmap::DashMap;
use substrata_common::ids::{ClientAvatarId, WorldObjectUid};

use crate::protocol::ServerMessage;

/// Queue depth beyond which the slow-subscriber policy kicks in.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub enum Event {
	ObjectUpdated { uid: WorldObjectUid, msg: ServerMessage },
	ObjectDestroyed { uid: WorldObjectUid },
	AvatarUpdated { avatar_id: ClientAvatarId, msg: ServerMessage },
	AvatarDead { avatar_id: ClientAvatarId },
	Chat { sender: ClientAvatarId, text: String },
	/// Told to a lagged subscriber instead of resuming delta delivery
	/// immediately; the connection handler must respond by sending a full
	/// snapshot of the world before processing further queued events.
	ResyncRequired,
}

#[derive(Debug)]
struct SubscriberInner {
	queue: Mutex<VecDeque<Event>>,
	lagged: std::sync::atomic::AtomicBool,
}

/// A subscriber's handle into the dispatcher. Cloning shares the same
/// underlying queue; the connection worker is the sole consumer.
#[derive(Debug, Clone)]
pub struct Subscriber(Arc<SubscriberInner>);

impl Subscriber {
	fn new() -> Self {
		Self(Arc::new(SubscriberInner {
			queue: Mutex::new(VecDeque::new()),
			lagged: std::sync::atomic::AtomicBool::new(false),
		}))
	}

	/// Pops the next queued event, if any. The connection worker calls this
	/// from its own suspension point (a timed wait), never holding any other
	/// lock while doing so.
	pub fn try_recv(&self) -> Option<Event> {
		self.0.queue.lock().unwrap().pop_front()
	}

	pub fn is_lagged(&self) -> bool {
		self.0.lagged.load(Ordering::Acquire)
	}

	pub fn clear_lagged(&self) {
		self.0.lagged.store(false, Ordering::Release);
	}

	fn enqueue(&self, event: Event) {
		let mut q = self.0.queue.lock().unwrap();
		if q.len() < SUBSCRIBER_QUEUE_CAPACITY {
			q.push_back(event);
			return;
		}

		// Coalesce: if the incoming event is an ObjectUpdated for a UID
		// already queued, replace that entry with the latest value instead
		// of growing the queue further.
		if let Event::ObjectUpdated { uid, .. } = &event {
			if let Some(slot) = q.iter_mut().find(|e| matches!(e, Event::ObjectUpdated { uid: existing, .. } if existing == uid)) {
				*slot = event;
				return;
			}
		}

		// Still full after coalescing: mark lagged and schedule a resync,
		// dropping this event (the snapshot will supersede it).
		self.0.lagged.store(true, Ordering::Release);
		q.push_back(Event::ResyncRequired);
	}
}

#[derive(Debug, Default)]
struct WorldSubscribers {
	next_id: AtomicU64,
	subscribers: DashMap<u64, Subscriber>,
}

/// Owns every world's subscriber list. One instance shared across all
/// connection workers via `Arc`.
#[derive(Debug, Default)]
pub struct Dispatcher {
	worlds: DashMap<String, Arc<WorldSubscribers>>,
}

/// A live subscription; dropping it unsubscribes.
pub struct Subscription {
	dispatcher: Arc<Dispatcher>,
	world: String,
	id: u64,
	pub handle: Subscriber,
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.dispatcher.unsubscribe(&self.world, self.id);
	}
}

impl Dispatcher {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Subscribes to `world`'s events, creating the world's subscriber list
	/// if this is its first subscriber.
	pub fn subscribe(self: &Arc<Self>, world: &str) -> Subscription {
		let entry = self.worlds.entry(world.to_string()).or_default().clone();
		let id = entry.next_id.fetch_add(1, Ordering::Relaxed);
		let handle = Subscriber::new();
		entry.subscribers.insert(id, handle.clone());
		Subscription {
			dispatcher: self.clone(),
			world: world.to_string(),
			id,
			handle,
		}
	}

	fn unsubscribe(&self, world: &str, id: u64) {
		if let Some(subs) = self.worlds.get(world) {
			subs.subscribers.remove(&id);
		}
	}

	/// Publishes `event` to every current subscriber of `world`. Short,
	/// lock-free at the dispatcher level beyond the `DashMap` shard lock;
	/// each subscriber's own queue lock is held only for the enqueue.
	pub fn publish(&self, world: &str, event: Event) {
		let Some(subs) = self.worlds.get(world) else {
			return;
		};
		for sub in subs.subscribers.iter() {
			sub.value().enqueue(event.clone());
		}
	}

	pub fn subscriber_count(&self, world: &str) -> usize {
		self.worlds.get(world).map(|s| s.subscribers.len()).unwrap_or(0)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn publish_reaches_all_subscribers_of_a_world() {
		let dispatcher = Dispatcher::new();
		let sub_a = dispatcher.subscribe("w");
		let sub_b = dispatcher.subscribe("w");

		dispatcher.publish("w", Event::ObjectDestroyed { uid: WorldObjectUid(1) });

		assert!(matches!(sub_a.handle.try_recv(), Some(Event::ObjectDestroyed { .. })));
		assert!(matches!(sub_b.handle.try_recv(), Some(Event::ObjectDestroyed { .. })));
	}

	#[test]
	fn publish_does_not_cross_worlds() {
		let dispatcher = Dispatcher::new();
		let sub = dispatcher.subscribe("world-a");
		dispatcher.publish("world-b", Event::ObjectDestroyed { uid: WorldObjectUid(1) });
		assert!(sub.handle.try_recv().is_none());
	}

	#[test]
	fn dropping_subscription_unsubscribes() {
		let dispatcher = Dispatcher::new();
		{
			let _sub = dispatcher.subscribe("w");
			assert_eq!(dispatcher.subscriber_count("w"), 1);
		}
		assert_eq!(dispatcher.subscriber_count("w"), 0);
	}

	#[test]
	fn full_queue_coalesces_repeated_updates_for_same_uid() {
		let dispatcher = Dispatcher::new();
		let sub = dispatcher.subscribe("w");
		for i in 0..SUBSCRIBER_QUEUE_CAPACITY {
			dispatcher.publish(
				"w",
				Event::ObjectUpdated {
					uid: WorldObjectUid(1),
					msg: ServerMessage::ObjectUpdated {
						uid: WorldObjectUid(1),
						pos: substrata_common::geom::Vec3d::new(i as f64, 0.0, 0.0),
						rot: Default::default(),
					},
				},
			);
		}
		// queue is now exactly full; one more update for the same UID coalesces
		// in place rather than growing the queue or lagging the subscriber.
		dispatcher.publish(
			"w",
			Event::ObjectUpdated {
				uid: WorldObjectUid(1),
				msg: ServerMessage::ObjectUpdated {
					uid: WorldObjectUid(1),
					pos: substrata_common::geom::Vec3d::new(999.0, 0.0, 0.0),
					rot: Default::default(),
				},
			},
		);
		assert!(!sub.handle.is_lagged());
	}

	#[test]
	fn full_queue_of_distinct_events_marks_lagged() {
		let dispatcher = Dispatcher::new();
		let sub = dispatcher.subscribe("w");
		for uid in 0..SUBSCRIBER_QUEUE_CAPACITY as u64 {
			dispatcher.publish("w", Event::ObjectDestroyed { uid: WorldObjectUid(uid) });
		}
		dispatcher.publish("w", Event::ObjectDestroyed { uid: WorldObjectUid(9999) });
		assert!(sub.handle.is_lagged());
	}
}
