//! docqa UI crate - the embedded chat page.
//!
//! The page is a single HTML file with inline CSS and JavaScript, embedded at
//! compile time so the binary needs no asset directory at runtime. It talks
//! to the JSON API served by `docqa-api`.

pub mod chat;

pub use chat::{CHAT_HTML, PAGE_TITLE};
