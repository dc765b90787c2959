//! DSP — pure Rust tone synthesis for exercise playback.
//!
//! Every tone goes through the same chain the browser build used with
//! WebAudio nodes (oscillator, peaking biquad, gain automation, stereo
//! panner), so offline renders, device playback and the WASM build sound
//! the same.

pub mod analysis;
pub mod chain;
pub mod envelope;
pub mod filter;
pub mod mixer;
pub mod oscillator;
pub mod panner;
pub mod renderer;

pub use chain::{EqBand, SignalChain, ToneSpec, render_tone};
pub use mixer::{AudioBuffer, Mixer};
pub use oscillator::Waveform;
