pub mod discovery;
pub mod engine;
pub mod fixgen;
pub mod key_index;
pub mod monitoring;
pub mod run;
pub mod sampling;
pub mod stream;
