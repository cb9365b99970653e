//! Streaming-source seek support: streaming-mp3 seek-to-time uses a coarse
//! approximate heuristic, since the exact mapping from wall-clock time to
//! file byte offset is not available without decoding the bitstream. Kept
//! as a documented heuristic rather than a real mp3 bitstream seek, since
//! no decoding dependency is part of the teacher's stack.

/// Maps a seek target to an approximate sample index for a streaming
/// source, assuming constant bitrate. Not an exact seek.
pub fn seek_approx(target: std::time::Duration, sample_rate: u32, total_samples: usize) -> usize {
	let target_sample = (target.as_secs_f64() * sample_rate as f64).round() as usize;
	target_sample.min(total_samples)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn seek_approx_scales_by_sample_rate() {
		assert_eq!(seek_approx(std::time::Duration::from_secs(1), 48_000, 1_000_000), 48_000);
	}

	#[test]
	fn seek_approx_clamps_to_total_samples() {
		assert_eq!(seek_approx(std::time::Duration::from_secs(100), 48_000, 1_000), 1_000);
	}
}
