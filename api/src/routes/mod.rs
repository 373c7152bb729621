pub mod ask;
pub mod chat;
pub mod documents;
pub mod query;
pub mod system;
pub mod vectorstores;
