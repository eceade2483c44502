pub mod backup;
pub mod config;
pub mod error;
pub mod naming;
pub mod notification;
pub mod pipeline;
pub mod prelude;
pub mod storage;
