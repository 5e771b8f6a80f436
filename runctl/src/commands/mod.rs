pub mod events;
pub mod restart;
pub mod start;
pub mod status;
pub mod stop;
