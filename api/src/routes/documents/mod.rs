pub mod documents_response;
pub mod process_route;
pub mod upload_route;
