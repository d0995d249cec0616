//! Voice synthesis: envelopes, voices, the voice pool and channel state.
//!
//! These types are driven by [`crate::stream::Stream`], which owns one
//! [`VoiceAllocator`] and [`CHANNEL_COUNT`] [`Channel`]s per stream.

pub mod allocator;
pub mod channel;
pub mod envelope;
pub mod voice;

pub use allocator::VoiceAllocator;
pub use channel::{Channel, ControlChange, CHANNEL_COUNT, DRUM_CHANNEL, PITCH_WHEEL_CENTER};
pub use envelope::{Envelope, EnvelopeStage};
pub use voice::Voice;
