pub mod auth;
pub mod query;
pub mod timefmt;

pub use auth::{Actor, ActorRole};
pub use query::{Pagination, SortDirection};
