pub mod chat;
pub mod health;
pub mod history;
pub(crate) mod response;
pub mod session;
