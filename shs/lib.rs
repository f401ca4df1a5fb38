#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

pub mod formula;
pub mod panel;
pub mod query;
pub mod sql;
pub mod store;
pub mod taxonomy;
pub mod types;

#[path = "../session/mod.rs"]
pub mod session;

#[path = "../geo/mod.rs"]
pub mod geo;

#[path = "../shared/config.rs"]
pub mod config;
