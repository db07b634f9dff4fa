#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]
pub mod config;
pub mod dataset;
pub mod io;
pub mod labels;
pub mod linalg;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod projection;
pub mod reduce;
pub mod score;
pub mod selector;
pub mod types;
