/// Heading and `<title>` of the chat page.
pub const PAGE_TITLE: &str = "Chatbot for Research Work Support";

/// The self-contained chat page served from `/ui`.
///
/// Renders the transcript of the selected session as user/assistant bubbles
/// and posts new questions to `/chat`. The session id field defaults to
/// `default_session`; changing it switches to (or creates) another session.
pub const CHAT_HTML: &str = include_str!("../assets/chat.html");
