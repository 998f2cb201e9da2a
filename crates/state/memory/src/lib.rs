mod store;

pub use store::MemoryDealStore;
