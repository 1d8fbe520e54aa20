#[macro_use]
extern crate log;

#[macro_use]
extern crate serde_derive;

pub mod clock;
pub mod config;
pub mod errors;
pub mod keys;
pub mod model;
pub mod processor;
pub mod queue;
pub mod s3;
pub mod sqs;
pub mod store;
pub mod transform;
pub mod work;
