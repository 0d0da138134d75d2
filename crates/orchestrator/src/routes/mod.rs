pub mod ops;
pub mod sagas;
