// Library for tests to access modules

pub mod aggregator;
pub mod barrier;
pub mod collector;
pub mod config;
pub mod directory;
pub mod models;
pub mod presenter;
pub mod rates;
pub mod sampler;
