pub mod config;
pub mod dsp;
pub mod error;
pub mod exercise;
pub mod pitch;
pub mod playback;
pub mod profile;
pub mod runner;
pub mod scoring;
pub mod service;

use wasm_bindgen::prelude::*;

use crate::dsp::AudioBuffer;
use crate::error::{AudioError, InvalidExerciseSpec};
use crate::exercise::{ExerciseSpec, UserAnswer};
use crate::scoring::ValidationResult;

pub use crate::config::Config;
pub use crate::exercise::{Difficulty, ExerciseKind};
pub use crate::playback::{PlaybackOutcome, PlaybackSession};
pub use crate::runner::ExerciseRunner;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Score `answer` against a checked exercise, message included.
pub fn validate(spec: &ExerciseSpec, answer: &UserAnswer) -> Result<ValidationResult, InvalidExerciseSpec> {
    spec.check()?;
    spec.kind.profile().verdict(spec, answer)
}

/// Render the exercise audio offline, gaps included.
pub fn render_exercise(spec: &ExerciseSpec, sample_rate: u32) -> Result<AudioBuffer, AudioError> {
    let plan = spec
        .check()
        .and_then(|_| spec.kind.profile().plan(spec))
        .map_err(|e| AudioError::InvalidSignal(e.to_string()))?;
    plan.render(sample_rate)
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

/// WASM-exposed: return the eartrainer-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: score an answer with the same engine guest mode uses.
/// Takes an `ExerciseSpec` and a `UserAnswer` as JS objects.
#[wasm_bindgen]
pub fn validate_answer(exercise: JsValue, answer: JsValue) -> Result<JsValue, JsValue> {
    let spec: ExerciseSpec = serde_wasm_bindgen::from_value(exercise).map_err(js_error)?;
    let answer: UserAnswer = serde_wasm_bindgen::from_value(answer).map_err(js_error)?;
    let result = validate(&spec, &answer).map_err(js_error)?;
    serde_wasm_bindgen::to_value(&result).map_err(js_error)
}

/// WASM-exposed: render an exercise to interleaved stereo f32 samples for
/// AudioWorklet playback.
#[wasm_bindgen]
pub fn render_exercise_samples(exercise: JsValue, sample_rate: u32) -> Result<Vec<f32>, JsValue> {
    let spec: ExerciseSpec = serde_wasm_bindgen::from_value(exercise).map_err(js_error)?;
    Ok(render_exercise(&spec, sample_rate).map_err(js_error)?.samples)
}

/// WASM-exposed: render an exercise to a WAV byte array.
#[wasm_bindgen]
pub fn render_exercise_wav(exercise: JsValue, sample_rate: u32) -> Result<Vec<u8>, JsValue> {
    let spec: ExerciseSpec = serde_wasm_bindgen::from_value(exercise).map_err(js_error)?;
    let buffer = render_exercise(&spec, sample_rate).map_err(js_error)?;
    Ok(dsp::renderer::render_wav(&buffer))
}
