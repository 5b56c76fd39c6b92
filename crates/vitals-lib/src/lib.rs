pub mod config;
pub mod detectors;
pub mod fetch;
pub mod io;
pub mod patient;
pub mod plot;
pub mod sequence;
pub mod signal;
pub mod store;
pub mod window;

pub use config::*;
pub use detectors::*;
pub use fetch::*;
pub use signal::*;
pub use window::*;
