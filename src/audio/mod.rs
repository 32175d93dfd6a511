pub mod bridge;
pub mod buffer;
pub mod capture;
pub mod click;
pub mod engine;
pub mod mixer;
pub mod playback;
pub mod recorder;
pub mod transport;
