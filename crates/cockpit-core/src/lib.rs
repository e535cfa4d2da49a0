pub mod cockpit;
pub mod config;
pub mod correlator;
pub mod error;
pub mod event_bus;
pub mod gateway;
pub mod poller;
pub mod sandbox;
pub mod session;

pub use cockpit::*;
pub use config::*;
pub use correlator::*;
pub use error::*;
pub use event_bus::*;
pub use gateway::*;
pub use poller::*;
pub use sandbox::*;
pub use session::*;
