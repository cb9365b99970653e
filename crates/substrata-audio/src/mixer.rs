//! Audio mixer & streamer: a producer task that wakes on a
//! 1 ms tick and tops up a hardware-facing ring buffer by pulling from each
//! active source, resampling to the mixer rate, panning through a small
//! spatial model, and summing into an interleaved stereo frame.
//!
//! Grounded in the producer/consumer split `replicate-server` uses for its
//! outbound network buffers — a dedicated task feeding a bounded queue that
//! a latency-sensitive consumer only ever pops from, never blocks on.

use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex,
};

use tracing::{instrument, trace};

use crate::resampler::Resampler;
use crate::ring::RingBuffer;

pub const MIXER_SAMPLE_RATE: u32 = 48_000;

/// A source's position relative to the listener, already in the listener's
/// local frame. Used only for simple equal-power stereo panning.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelativePosition {
	pub right: f32,
	pub forward: f32,
}

impl RelativePosition {
	/// Equal-power pan gains `(left, right)` from the horizontal bearing.
	/// Directly ahead or behind pans centre; hard left/right approaches
	/// silence on the opposite channel.
	fn pan_gains(self) -> (f32, f32) {
		let mag = (self.right * self.right + self.forward * self.forward).sqrt();
		if mag < f32::EPSILON {
			return (std::f32::consts::FRAC_1_SQRT_2, std::f32::consts::FRAC_1_SQRT_2);
		}
		let theta = (self.right / mag).clamp(-1.0, 1.0).asin(); // [-pi/2, pi/2]
		let pan = (theta / std::f32::consts::FRAC_PI_2).clamp(-1.0, 1.0); // -1 left .. 1 right
		let angle = (pan + 1.0) * std::f32::consts::FRAC_PI_4; // [0, pi/2]
		(angle.cos(), angle.sin())
	}
}

enum SourceKind {
	/// A fixed sample buffer played with a floating-point read index, so
	/// pitch-shifted playback is just a non-1.0 step per mixed sample.
	Static { samples: Arc<Vec<f32>>, pos: f64, pitch: f64 },
	/// A live-filling queue (e.g. decoded voice audio); underflow is padded
	/// with silence rather than stalling the mixer.
	Streaming { queue: Arc<Mutex<std::collections::VecDeque<f32>>> },
}

pub struct Source {
	kind: SourceKind,
	resampler: Resampler,
	position: RelativePosition,
	source_rate: u32,
}

impl Source {
	pub fn new_static(samples: Arc<Vec<f32>>, source_rate: u32, pitch: f64, position: RelativePosition) -> Self {
		Self {
			kind: SourceKind::Static { samples, pos: 0.0, pitch },
			resampler: Resampler::new(source_rate, MIXER_SAMPLE_RATE),
			position,
			source_rate,
		}
	}

	pub fn new_streaming(queue: Arc<Mutex<std::collections::VecDeque<f32>>>, source_rate: u32, position: RelativePosition) -> Self {
		Self {
			kind: SourceKind::Streaming { queue },
			resampler: Resampler::new(source_rate, MIXER_SAMPLE_RATE),
			position,
			source_rate,
		}
	}

	/// Jumps playback to an approximate position. For a static
	/// source this is exact; for a streaming source it drops queued samples
	/// up to the target and is only as accurate as the producer's fill rate.
	pub fn seek_approx(&mut self, target: std::time::Duration) {
		match &mut self.kind {
			SourceKind::Static { samples, pos, .. } => {
				*pos = crate::decoder::seek_approx(target, self.source_rate, samples.len()) as f64;
			}
			SourceKind::Streaming { queue } => {
				let mut q = queue.lock().unwrap();
				let drop_n = crate::decoder::seek_approx(target, self.source_rate, q.len()).min(q.len());
				q.drain(..drop_n);
			}
		}
	}

	/// Pulls `n` source-rate mono samples for this source, zero-padding on
	/// underflow for streaming sources and looping the floating-point index
	/// for static ones.
	fn pull_source_samples(&mut self, n: usize) -> Vec<f32> {
		match &mut self.kind {
			SourceKind::Static { samples, pos, pitch } => {
				let mut out = Vec::with_capacity(n);
				for _ in 0..n {
					let i = *pos as usize;
					out.push(if samples.is_empty() { 0.0 } else { samples[i % samples.len()] });
					*pos += *pitch;
				}
				out
			}
			SourceKind::Streaming { queue } => {
				let mut q = queue.lock().unwrap();
				let mut out = Vec::with_capacity(n);
				for _ in 0..n {
					out.push(q.pop_front().unwrap_or(0.0));
				}
				out
			}
		}
	}

	/// Mono samples at the mixer rate, after per-source resampling.
	fn mixer_rate_samples(&mut self, dest_n: usize) -> Vec<f32> {
		let needed = self.resampler.num_src_samples_needed(dest_n);
		let src = self.pull_source_samples(needed);
		self.resampler.process(&src, dest_n)
	}
}

/// Owns the set of active sources and the hardware-facing ring buffer.
/// `run_producer` is spawned as its own task; the audio callback instead
/// calls [`MixerStreamer::pop_hardware_frames`] directly, never touching the
/// world-state mutex.
/// Samples of hardware output discarded at startup.
const WARM_UP_SAMPLES: usize = MIXER_SAMPLE_RATE as usize * 2; // 1s, stereo

pub struct MixerStreamer {
	sources: Mutex<Vec<Source>>,
	ring: Arc<RingBuffer>,
	frames_per_buffer: usize,
	die: Arc<AtomicBool>,
	warm_up_remaining: std::sync::atomic::AtomicUsize,
}

impl MixerStreamer {
	pub fn new(frames_per_buffer: usize) -> Self {
		Self {
			sources: Mutex::new(Vec::new()),
			ring: Arc::new(RingBuffer::new(4 * frames_per_buffer * 2 * 2)),
			frames_per_buffer,
			die: Arc::new(AtomicBool::new(false)),
			warm_up_remaining: std::sync::atomic::AtomicUsize::new(WARM_UP_SAMPLES),
		}
	}

	pub fn add_source(&self, source: Source) {
		self.sources.lock().unwrap().push(source);
	}

	pub fn signal_die(&self) {
		self.die.store(true, Ordering::Release);
	}

	/// One production step: mixes `self.frames_per_buffer` stereo frames
	/// from every active source and pushes them onto the ring, until the
	/// ring holds at least `4 * frames_per_buffer * 2` samples (~20ms at
	/// 48kHz).
	#[instrument(skip(self))]
	fn produce_until_target(&self) {
		let target = 4 * self.frames_per_buffer * 2;
		while self.ring.len() < target {
			let mut interleaved = vec![0.0f32; self.frames_per_buffer * 2];
			{
				let mut sources = self.sources.lock().unwrap();
				for source in sources.iter_mut() {
					let mono = source.mixer_rate_samples(self.frames_per_buffer);
					let (gain_l, gain_r) = source.position.pan_gains();
					for (i, sample) in mono.iter().enumerate() {
						interleaved[i * 2] += sample * gain_l;
						interleaved[i * 2 + 1] += sample * gain_r;
					}
				}
			}
			for s in interleaved.iter_mut() {
				*s = s.clamp(-1.0, 1.0);
			}
			let pushed = self.ring.push(&interleaved);
			if pushed < interleaved.len() {
				trace!("ring buffer full, dropping tail of this frame");
				break;
			}
		}
	}

	/// Runs the producer loop: wakes on a 1ms tick, tops up the ring, and
	/// exits once `die` is observed. Drains nothing else — the ring buffer
	/// itself is the only owned resource and it is fine to leave populated.
	pub async fn run_producer(self: Arc<Self>) {
		let mut interval = tokio::time::interval(std::time::Duration::from_millis(1));
		loop {
			interval.tick().await;
			if self.die.load(Ordering::Acquire) {
				return;
			}
			self.produce_until_target();
		}
	}

	/// The hardware callback's only operation: pop already-mixed frames,
	/// padding any shortfall with silence. Never blocks on the producer.
	/// Discards mixed output during the warm-up period instead of handing
	/// it to the hardware (see [`WARM_UP_SAMPLES`]).
	pub fn pop_hardware_frames(&self, out: &mut [f32]) {
		self.ring.pop_into(out);
		let remaining = self.warm_up_remaining.load(Ordering::Acquire);
		if remaining > 0 {
			let discard = remaining.min(out.len());
			out[..discard].fill(0.0);
			self.warm_up_remaining.fetch_sub(discard, Ordering::AcqRel);
		}
	}

	pub fn ring(&self) -> &Arc<RingBuffer> {
		&self.ring
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn centred_source_pans_equally() {
		let pos = RelativePosition { right: 0.0, forward: 1.0 };
		let (l, r) = pos.pan_gains();
		assert!((l - r).abs() < 1e-5);
	}

	#[test]
	fn hard_right_source_silences_left_channel() {
		let pos = RelativePosition { right: 1.0, forward: 0.0 };
		let (l, r) = pos.pan_gains();
		assert!(l < 0.01);
		assert!(r > 0.9);
	}

	#[test]
	fn static_source_produces_samples_at_mixer_rate() {
		let samples = Arc::new(vec![1.0f32; 1000]);
		let mut source = Source::new_static(samples, MIXER_SAMPLE_RATE, 1.0, RelativePosition::default());
		let out = source.mixer_rate_samples(128);
		assert_eq!(out.len(), 128);
	}

	#[test]
	fn streaming_source_underflow_pads_with_silence() {
		let queue = Arc::new(Mutex::new(std::collections::VecDeque::new()));
		queue.lock().unwrap().extend([1.0, 1.0]);
		let mut source = Source::new_streaming(queue, MIXER_SAMPLE_RATE, RelativePosition::default());
		let out = source.mixer_rate_samples(8);
		assert_eq!(out.len(), 8);
		assert!(out.iter().skip(2).all(|&s| s == 0.0));
	}

	#[tokio::test]
	async fn produce_until_target_fills_ring_to_target_depth() {
		let mixer = MixerStreamer::new(128);
		mixer.add_source(Source::new_static(Arc::new(vec![0.5f32; 4096]), MIXER_SAMPLE_RATE, 1.0, RelativePosition::default()));
		mixer.produce_until_target();
		assert!(mixer.ring().len() >= 4 * 128 * 2);
	}

	#[test]
	fn pop_hardware_frames_never_panics_on_empty_ring() {
		let mixer = MixerStreamer::new(64);
		let mut out = vec![0.0f32; 128];
		mixer.pop_hardware_frames(&mut out);
		assert!(out.iter().all(|&s| s == 0.0));
	}

	#[test]
	fn warm_up_period_discards_early_output() {
		let mixer = MixerStreamer::new(128);
		mixer.ring().push(&vec![1.0f32; 256]);
		let mut out = vec![0.0f32; 256];
		mixer.pop_hardware_frames(&mut out);
		assert!(out.iter().all(|&s| s == 0.0));
	}

	#[test]
	fn seek_approx_advances_static_source_position() {
		let samples = Arc::new((0..48_000).map(|i| i as f32).collect::<Vec<_>>());
		let mut source = Source::new_static(samples, MIXER_SAMPLE_RATE, 1.0, RelativePosition::default());
		source.seek_approx(std::time::Duration::from_millis(500));
		let out = source.pull_source_samples(1);
		assert_eq!(out[0], 24_000.0);
	}

	#[test]
	fn output_after_warm_up_period_passes_through() {
		let mixer = MixerStreamer::new(128);
		mixer.warm_up_remaining.store(0, Ordering::Relaxed);
		mixer.ring().push(&[1.0f32; 4]);
		let mut out = vec![0.0f32; 4];
		mixer.pop_hardware_frames(&mut out);
		assert!(out.iter().all(|&s| s == 1.0));
	}
}
