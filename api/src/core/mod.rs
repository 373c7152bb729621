pub mod app_state;
pub mod category;
pub mod http;
