/// Middleware modules for the API server
///
/// - `request_id`: request correlation IDs for logs and error bodies
///
/// Bearer authentication lives in `modelgate_shared::auth::middleware`.

pub mod request_id;
