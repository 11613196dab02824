pub mod access;
pub mod error;
pub mod notion;
pub mod oauth;

pub use access::{AccessResolver, PageAccess};
pub use error::ServiceError;
pub use notion::{DocumentStore, NotionClient, ParentKind, ParentRef};
pub use oauth::{AuthenticatedUser, OAuthService};
