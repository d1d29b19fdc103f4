pub mod connection;
pub mod request;
pub mod response;

pub use connection::Connection;
pub use request::{HttpRequest, Method, ParseError, ParsingState};
pub use response::HttpResponse;
