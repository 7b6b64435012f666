//! I/O helpers: configuration, the page collaborator, status reporting and
//! the study log stores.

pub mod config;
pub mod init;
pub mod page;
pub mod reporter;
pub mod seen_store;
pub mod sheet;
pub mod study_feed;
