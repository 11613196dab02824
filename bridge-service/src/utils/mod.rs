pub mod notion_url;
pub mod password;
