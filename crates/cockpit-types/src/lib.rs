pub mod conversation;
pub mod feed;
pub mod liveness;
pub mod panel;
pub mod run;
pub mod sandbox;

pub use conversation::*;
pub use feed::*;
pub use liveness::*;
pub use panel::*;
pub use run::*;
pub use sandbox::*;
