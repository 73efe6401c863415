pub mod auth;
pub mod gc;
pub mod ledger;
pub mod npm;
pub mod package;
pub mod user;
pub mod webhook;

pub use auth::*;
pub use gc::*;
pub use ledger::*;
pub use npm::*;
pub use package::*;
pub use user::*;
pub use webhook::*;
