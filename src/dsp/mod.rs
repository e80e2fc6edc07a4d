pub mod tone_detector;

pub use tone_detector::{ToneTemplate, TuningFork};
