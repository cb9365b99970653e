//! Audio mixer/streamer and resampler. Simulates the
//! client-side audio pipeline's concurrency shape (a 1ms-tick producer task
//! feeding a hardware-facing ring buffer) without binding to a real audio
//! device, since this workspace has no such dependency — exercised purely
//! as a scheduling/mixing illustration and by the voice relay's resampling
//! needs.

pub mod decoder;
pub mod mixer;
pub mod resampler;
pub mod ring;
