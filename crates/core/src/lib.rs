#![deny(warnings)]

pub mod asr;
pub mod config;
pub mod decode;
pub mod emotion;
pub mod features;
pub mod pipeline;
pub mod util;
