mod schema;
mod store;

pub use store::{BlogQuery, OrderBy, Store};
