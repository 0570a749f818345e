//! # forge_stream
//!
//! Turns a streamed model response into build actions.
//!
//! Two layers live here:
//!
//! - **SSE decoding**: raw transport bytes become text deltas
//!   ([`SseDecoder`])
//! - **Tag parsing**: text deltas become artifact, action and free-text
//!   events ([`StreamParser`], [`StreamSession`])
//!
//! Parsing is chunk-boundary independent: feeding a response in one piece
//! or one character at a time yields the same events.
//!
//! # Example
//!
//! ```rust
//! use forge_stream::{ActionKind, StreamSession};
//!
//! let mut session = StreamSession::begin("msg-1");
//! let mut out = session.push("<artifact id=\"app\"><action type=\"sh");
//! out.extend(session.push("ell\">npm install</action></artifact>"));
//! out.extend(session.finish());
//!
//! let action = out.actions().next().unwrap();
//! assert_eq!(action.kind, ActionKind::Shell { command: "npm install".into() });
//! ```

pub mod action;
pub mod error;
pub mod parser;
pub mod rate_limit;
pub mod sse;

pub use action::{ActionKind, ActionType, BuildAction};
pub use error::{StreamError, StreamResult};
pub use parser::{
    finalize_content, unescape_template_literals, ParseEvent, ParseOutput, ParserState,
    StreamParser, StreamSession, DEFAULT_ARTIFACT_TITLE,
};
pub use rate_limit::{Clock, RateLimiter, SystemClock};
pub use sse::{decode_line, SseDecoder, SseEvent};
