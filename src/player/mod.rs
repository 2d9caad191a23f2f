//! Player module - everything between a queued track and a running player
//!
//! - `selector`: choosing a stream variant
//! - `args`: player identity, capabilities and command lines
//! - `input_conf`: key-mapping file with our exit codes
//! - `status`: progress monitoring over a socket or scraped output
//! - `preload`: early resolution of the next track
//! - `driver`: launching, supervising and retrying the player

mod args;
mod driver;
mod input_conf;
mod preload;
mod selector;
mod status;

pub use driver::{PlayOutcome, PlayerDriver};
pub use preload::{PreloadRegistry, Preloader};
#[cfg(test)]
pub(crate) use selector::{Selection, select};

#[cfg(all(test, unix))]
pub(crate) use driver::tests as driver_tests;
