pub mod alias;
pub mod cli;
pub mod decode;
pub mod error;
pub mod escape;
pub mod extract;
pub mod format;
pub mod passes;
pub mod pipeline;
pub mod resolve;
