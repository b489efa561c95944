pub mod play;
pub mod queue;
pub mod skip;
pub mod stop;

pub mod audio_sources;
pub mod utils;
