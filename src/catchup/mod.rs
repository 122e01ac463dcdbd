pub mod audit;
pub mod clipboard;
pub mod config;
pub mod generate;
pub mod parse;
pub mod paths;
pub mod prompt;
pub mod resolve;
pub mod session;
pub mod transcript;
pub mod util;
