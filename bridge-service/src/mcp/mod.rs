pub mod server;
pub mod session;
pub mod tools;

pub use server::McpServer;
pub use session::SessionRegistry;
