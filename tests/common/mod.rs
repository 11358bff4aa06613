pub mod fixtures;
pub mod mocks;

#[allow(unused_imports)]
pub use fixtures::{link, temp_store, MIB};
#[allow(unused_imports)]
pub use mocks::{FailingStore, FakeFetcher, FakeSink, Sent};
