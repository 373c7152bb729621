pub mod health_route;
pub mod models_route;
