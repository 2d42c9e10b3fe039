//! A fixed set of bank accounts, shared by concurrent workers doing
//! transfers and balance reads.
//!
//! The interesting part lives in [`ledger`]: how a transfer reserves two
//! accounts without deadlocking, how transfers wait on each other, and how a
//! transfer interrupted halfway is rolled back.

pub mod config;
pub mod error_handler;
pub mod generate;
pub mod input;
pub mod ledger;
pub mod output;
pub mod run;
