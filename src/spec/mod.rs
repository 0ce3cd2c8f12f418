//! Specification loader: reads `clients.json` and the per-type schema
//! documents and materialises tag trees for PLCs and robots (spec §4.4).

pub mod config;
pub mod plc;
pub mod robot;
