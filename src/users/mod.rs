#[cfg(test)]
pub mod memory;
mod repo;
mod repo_types;

pub use repo::{PgUserStore, StoreError, UniqueField, UserStore};
pub use repo_types::{ContactDetails, NewUser, Role, User, UserProfile};
