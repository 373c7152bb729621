pub mod chat_route;
