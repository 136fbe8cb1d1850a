// Infrastructure for Probecraft: thread pool, atomic output, input decoding.

pub mod concurrency;
pub mod unit_loader;
pub mod writer;
