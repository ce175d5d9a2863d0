//! Real-time mixing engine for trackmix.
//!
//! The engine thread owns an [`AudioEngine`]: it receives commands, renders
//! audio on demand for the output device, and publishes time-stamped
//! telemetry that control threads read against the device's play clock.

mod amplify;
mod clock;
mod convert;
mod device;
mod engine;
mod error;
mod mixer;
pub mod mixers;
mod player;
mod rt;
mod scope;
mod sync;
mod telemetry;
mod thread;
mod time_queue;

pub use amplify::{amplify, integer_headroom};
pub use clock::{EngineClock, MIN_PITCHBEND};
pub use convert::ConversionPlan;
pub use device::{DeviceContext, OutputDevice, PlayClock};
pub use engine::{AudioEngine, EngineSettings, EngineState, Flow, MixMode, PlayMode, CLIP_SMEAR_UPDATES};
pub use error::{DeviceError, FormatError, ScopeAllocError};
pub use mixer::{AccumBuffer, AccumDomain, ChannelStatus, Mixer, SampleBuf};
pub use player::{NoteRequest, PatternRequest, Player, Position, SampleTrigger};
pub use rt::promote_current_thread;
pub use scope::{Endpoint, ScopeRing};
pub use sync::Synchronizer;
pub use telemetry::{PositionEvent, PositionSnapshot, Telemetry};
pub use thread::{run, spawn_engine_thread};
pub use time_queue::TimeQueue;
