//! Stage results and collaborator ports.
//!
//! A stage is one discrete unit of pipeline work. Stage handlers live in
//! [`crate::pipeline`]; this module holds what they produce
//! ([`StageResult`]) and what they call ([`ports`]).

pub mod ports;
mod result;

pub use ports::{
    MediaEditor, MediaGenerator, NoOpNotifier, Notifier, Publisher, QualityScorer,
    SpeechSynthesizer, StagePorts, SynthesizedAudio, TextGenerator,
};
pub use result::StageResult;
