pub mod client;
pub mod contact;
pub mod dedup;
pub mod rate_limit;
pub mod watch;

pub use client::*;
pub use contact::*;
pub use dedup::*;
pub use rate_limit::*;
pub use watch::*;
