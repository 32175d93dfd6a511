pub mod audio;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod messages;
pub mod project;
pub mod session;
pub mod stats;

pub use audio::transport::{PlaybackRequest, TransportAction, TransportEvent, TransportOrchestrator};
pub use clock::{Frame, FrameClock};
pub use config::EngineConfig;
pub use error::{Result, TapeError};
pub use session::Session;
