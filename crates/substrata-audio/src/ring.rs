//! Fixed-capacity interleaved-stereo ring buffer shared between the
//! producer task and the hardware-facing callback. The
//! callback side never blocks: a shortfall is filled with silence rather
//! than waiting on the producer.

use std::{collections::VecDeque, sync::Mutex};

pub struct RingBuffer {
	capacity: usize,
	buf: Mutex<VecDeque<f32>>,
}

impl RingBuffer {
	pub fn new(capacity: usize) -> Self {
		Self {
			capacity,
			buf: Mutex::new(VecDeque::with_capacity(capacity)),
		}
	}

	pub fn len(&self) -> usize {
		self.buf.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn capacity(&self) -> usize {
		self.capacity
	}

	/// Pushes as many samples from `samples` as fit without exceeding
	/// capacity; returns the number actually pushed.
	pub fn push(&self, samples: &[f32]) -> usize {
		let mut buf = self.buf.lock().unwrap();
		let room = self.capacity.saturating_sub(buf.len());
		let n = samples.len().min(room);
		buf.extend(samples[..n].iter().copied());
		n
	}

	/// Fills `out` by popping samples; any shortfall is filled with silence.
	/// This is the hardware-callback side and must never block or acquire
	/// any lock beyond this one.
	pub fn pop_into(&self, out: &mut [f32]) {
		let mut buf = self.buf.lock().unwrap();
		for slot in out.iter_mut() {
			*slot = buf.pop_front().unwrap_or(0.0);
		}
	}
}
