//! Command-line front end for the updraft updater and publisher.

pub mod logging;
pub mod progress;
