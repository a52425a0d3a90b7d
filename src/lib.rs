pub mod config;
pub mod context;
pub mod engine;
pub mod envelope;
pub mod exception;
pub mod middleware;
pub mod param;
pub mod request;
pub mod response;
pub mod router;
pub mod template;
pub mod util;

pub use config::Config;
pub use context::{Context, HandlerFunc};
pub use engine::Engine;
pub use envelope::{ResponseCode, H};
pub use exception::Exception;
pub use param::{HttpEncoding, HttpRequestMethod, HttpVersion};
pub use request::Request;
pub use response::ResponseWriter;
pub use router::{Route, Router, StaticRouter};
pub use template::HtmlTemplates;
pub use util::StatusPage;
