//! Incremental parser for artifact/action markup in a generation stream.
//!
//! The model answers with free text interleaved with markup such as:
//!
//! ```text
//! <artifact id="todo-app" title="Todo App">
//!   <action type="file" path="src/App.tsx">...</action>
//!   <action type="shell">npm install</action>
//! </artifact>
//! ```
//!
//! Chunks arrive in arbitrary sizes and may cut a tag anywhere, including
//! inside an attribute value. Bytes that could still turn out to be the start
//! of a tag are held back in a pending buffer until the next chunk decides
//! them. Tag names match case-insensitively.
//!
//! Nesting is fixed at two levels. A second `<artifact>` inside an open
//! artifact is skipped as filler, and an `<action>` inside an open action is
//! plain content, because only `</action>` is looked for there.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::action::{ActionKind, ActionType, BuildAction};

const ARTIFACT_OPEN: &str = "<artifact";
const ARTIFACT_CLOSE: &str = "</artifact>";
const ACTION_OPEN: &str = "<action";
const ACTION_CLOSE: &str = "</action>";

/// Title used when an artifact tag has none.
pub const DEFAULT_ARTIFACT_TITLE: &str = "Untitled";

/// Something the parser recognized in the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ParseEvent {
    /// Free text outside any artifact.
    Text(String),
    ArtifactOpen {
        id: String,
        title: String,
    },
    /// An action tag was opened; its content is still arriving.
    ActionOpen {
        artifact_id: String,
        action_type: ActionType,
        path: Option<String>,
    },
    ActionComplete(BuildAction),
    ArtifactClose {
        id: String,
    },
}

/// Events produced by one call into the parser.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParseOutput {
    pub events: Vec<ParseEvent>,
}

impl ParseOutput {
    /// Concatenated free text.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .filter_map(|e| match e {
                ParseEvent::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Completed actions, in stream order.
    pub fn actions(&self) -> impl Iterator<Item = &BuildAction> {
        self.events.iter().filter_map(|e| match e {
            ParseEvent::ActionComplete(action) => Some(action),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Append another output, merging adjacent text.
    pub fn extend(&mut self, other: ParseOutput) {
        for event in other.events {
            match event {
                ParseEvent::Text(text) => self.push_text(&text),
                other => self.events.push(other),
            }
        }
    }

    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(ParseEvent::Text(last)) = self.events.last_mut() {
            last.push_str(text);
        } else {
            self.events.push(ParseEvent::Text(text.to_string()));
        }
    }
}

#[derive(Debug, Clone)]
struct OpenArtifact {
    id: String,
}

#[derive(Debug, Clone)]
struct OpenAction {
    action_type: ActionType,
    path: Option<String>,
    content: String,
}

/// Parse state of one stream.
#[derive(Debug, Default)]
pub struct ParserState {
    artifact: Option<OpenArtifact>,
    action: Option<OpenAction>,
    pending: String,
    artifacts_seen: usize,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inside_artifact(&self) -> bool {
        self.artifact.is_some()
    }

    pub fn inside_action(&self) -> bool {
        self.action.is_some()
    }

    /// Input held back because it may be the start of a tag.
    pub fn pending(&self) -> &str {
        &self.pending
    }

    /// Consume one chunk.
    pub fn feed(&mut self, chunk: &str) -> ParseOutput {
        let mut out = ParseOutput::default();
        let mut buf = std::mem::take(&mut self.pending);
        buf.push_str(chunk);
        // ASCII lowering keeps byte offsets identical to `buf`.
        let lower = buf.to_ascii_lowercase();
        let mut cursor = 0;

        while cursor < buf.len() {
            if let Some(mut action) = self.action.take() {
                match find_marker(&lower, cursor, ACTION_CLOSE) {
                    Some(end) => {
                        action.content.push_str(&buf[cursor..end]);
                        cursor = end + ACTION_CLOSE.len();
                        self.complete_action(action, &mut out);
                    }
                    None => {
                        let hold = partial_marker_start(&lower, cursor, &[ACTION_CLOSE])
                            .unwrap_or(buf.len());
                        action.content.push_str(&buf[cursor..hold]);
                        self.action = Some(action);
                        self.pending = buf[hold..].to_string();
                        return out;
                    }
                }
            } else if self.artifact.is_some() {
                let open = find_tag_open(&lower, cursor, ACTION_OPEN);
                let close = find_marker(&lower, cursor, ARTIFACT_CLOSE);
                match (open, close) {
                    (_, Some(close)) if open.map_or(true, |open| close < open) => {
                        skip_filler(&buf[cursor..close]);
                        cursor = close + ARTIFACT_CLOSE.len();
                        if let Some(artifact) = self.artifact.take() {
                            debug!(artifact_id = %artifact.id, "Artifact closed");
                            out.events.push(ParseEvent::ArtifactClose { id: artifact.id });
                        }
                    }
                    (Some(open), _) => {
                        skip_filler(&buf[cursor..open]);
                        let attrs_start = open + ACTION_OPEN.len();
                        let Some(end) = find_tag_end(&buf, attrs_start) else {
                            self.pending = buf[open..].to_string();
                            return out;
                        };
                        let attrs = parse_attributes(&buf[attrs_start..end]);
                        cursor = end + 1;
                        self.open_action(&attrs, &mut out);
                    }
                    _ => {
                        let hold =
                            partial_marker_start(&lower, cursor, &[ACTION_OPEN, ARTIFACT_CLOSE])
                                .unwrap_or(buf.len());
                        skip_filler(&buf[cursor..hold]);
                        self.pending = buf[hold..].to_string();
                        return out;
                    }
                }
            } else {
                match find_tag_open(&lower, cursor, ARTIFACT_OPEN) {
                    Some(open) => {
                        out.push_text(&buf[cursor..open]);
                        let attrs_start = open + ARTIFACT_OPEN.len();
                        let Some(end) = find_tag_end(&buf, attrs_start) else {
                            self.pending = buf[open..].to_string();
                            return out;
                        };
                        let attrs = parse_attributes(&buf[attrs_start..end]);
                        cursor = end + 1;
                        self.open_artifact(&attrs, &mut out);
                    }
                    None => {
                        let hold = partial_marker_start(&lower, cursor, &[ARTIFACT_OPEN])
                            .unwrap_or(buf.len());
                        out.push_text(&buf[cursor..hold]);
                        self.pending = buf[hold..].to_string();
                        return out;
                    }
                }
            }
        }

        out
    }

    /// End of stream. Deferred bytes outside an artifact are released as
    /// text; an action that never closed is dropped.
    pub fn finish(&mut self) -> ParseOutput {
        let mut out = ParseOutput::default();
        let pending = std::mem::take(&mut self.pending);

        if let Some(action) = self.action.take() {
            warn!(
                action_type = %action.action_type,
                path = ?action.path,
                bytes = action.content.len() + pending.len(),
                "Stream ended inside an unterminated action; dropping it"
            );
        } else if self.artifact.is_none() {
            out.push_text(&pending);
        }

        if let Some(artifact) = self.artifact.take() {
            warn!(artifact_id = %artifact.id, "Stream ended inside an open artifact");
        }
        out
    }

    fn open_artifact(&mut self, attrs: &HashMap<String, String>, out: &mut ParseOutput) {
        self.artifacts_seen += 1;
        let id = attrs
            .get("id")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| format!("artifact-{}", self.artifacts_seen));
        let title = attrs
            .get("title")
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_ARTIFACT_TITLE.to_string());

        debug!(artifact_id = %id, title = %title, "Artifact opened");
        self.artifact = Some(OpenArtifact { id: id.clone() });
        out.events.push(ParseEvent::ArtifactOpen { id, title });
    }

    fn open_action(&mut self, attrs: &HashMap<String, String>, out: &mut ParseOutput) {
        let action_type = ActionType::from_attr(attrs.get("type").map(|s| s.as_str()));
        let path = attrs
            .get("path")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        let artifact_id = self
            .artifact
            .as_ref()
            .map(|a| a.id.clone())
            .unwrap_or_default();

        trace!(%action_type, ?path, "Action opened");
        out.events.push(ParseEvent::ActionOpen {
            artifact_id,
            action_type,
            path: path.clone(),
        });
        self.action = Some(OpenAction {
            action_type,
            path,
            content: String::new(),
        });
    }

    fn complete_action(&mut self, action: OpenAction, out: &mut ParseOutput) {
        let content = finalize_content(action.action_type, &action.content);
        let kind = match action.action_type {
            ActionType::Shell => ActionKind::Shell { command: content },
            ActionType::File => match action.path {
                Some(path) => ActionKind::File { path, content },
                None => {
                    warn!("Dropping file action without a path attribute");
                    return;
                }
            },
        };

        let action = BuildAction {
            artifact_id: self.artifact.as_ref().map(|a| a.id.clone()),
            kind,
        };
        debug!(action = %action.description(), "Action complete");
        out.events.push(ParseEvent::ActionComplete(action));
    }
}

/// Explicit handle for one stream. Dropping it discards the state.
#[derive(Debug, Default)]
pub struct StreamSession {
    id: String,
    state: ParserState,
}

impl StreamSession {
    pub fn begin(id: impl Into<String>) -> Self {
        let id = id.into();
        debug!(stream_id = %id, "Stream session started");
        Self {
            id,
            state: ParserState::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> &ParserState {
        &self.state
    }

    pub fn push(&mut self, chunk: &str) -> ParseOutput {
        self.state.feed(chunk)
    }

    /// Close the session, flushing whatever it was still holding.
    pub fn finish(mut self) -> ParseOutput {
        debug!(stream_id = %self.id, "Stream session finished");
        self.state.finish()
    }
}

/// Parser for many concurrent streams, keyed by stream id.
///
/// State is created lazily on the first chunk of a stream. Owners must call
/// [`StreamParser::finish`] or [`StreamParser::reset`] once a stream ends or
/// is abandoned; [`StreamSession`] is the self-cleaning alternative.
#[derive(Debug, Default)]
pub struct StreamParser {
    streams: HashMap<String, ParserState>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk of `stream_id`. Chunks must arrive in order.
    pub fn parse(&mut self, stream_id: &str, chunk: &str) -> ParseOutput {
        self.streams
            .entry(stream_id.to_string())
            .or_default()
            .feed(chunk)
    }

    /// Flush and drop a finished stream.
    pub fn finish(&mut self, stream_id: &str) -> ParseOutput {
        match self.streams.remove(stream_id) {
            Some(mut state) => state.finish(),
            None => ParseOutput::default(),
        }
    }

    /// Drop one stream's state, or every stream when `stream_id` is `None`.
    pub fn reset(&mut self, stream_id: Option<&str>) {
        match stream_id {
            Some(id) => {
                self.streams.remove(id);
            }
            None => self.streams.clear(),
        }
    }

    pub fn active_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn state(&self, stream_id: &str) -> Option<&ParserState> {
        self.streams.get(stream_id)
    }
}

/// Trim, normalize the trailing newline of files, and undo over-escaped
/// template literal syntax.
pub fn finalize_content(action_type: ActionType, raw: &str) -> String {
    let mut content = unescape_template_literals(raw.trim());
    if action_type == ActionType::File {
        content.push('\n');
    }
    content
}

/// `\$\{` and `\${` become `${`, `` \` `` becomes `` ` ``.
pub fn unescape_template_literals(text: &str) -> String {
    text.replace("\\$\\{", "${")
        .replace("\\${", "${")
        .replace("\\`", "`")
}

fn skip_filler(filler: &str) {
    if filler.trim().is_empty() {
        return;
    }
    if filler.to_ascii_lowercase().contains(ARTIFACT_OPEN) {
        warn!("Ignoring nested artifact tag inside an open artifact");
    } else {
        trace!(bytes = filler.len(), "Skipping text between actions");
    }
}

fn find_marker(lower: &str, from: usize, marker: &str) -> Option<usize> {
    lower[from..].find(marker).map(|i| from + i)
}

/// Find an opening tag name, rejecting longer names such as `<actions`.
/// A marker at the very end of the buffer counts; the next chunk decides.
fn find_tag_open(lower: &str, from: usize, marker: &str) -> Option<usize> {
    let mut search = from;
    while let Some(found) = find_marker(lower, search, marker) {
        let after = found + marker.len();
        match lower.as_bytes().get(after) {
            None => return Some(found),
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(found),
            Some(_) => search = after,
        }
    }
    None
}

/// Index of the `>` closing a tag, ignoring any inside double quotes.
fn find_tag_end(buf: &str, from: usize) -> Option<usize> {
    let mut in_quotes = false;
    for (i, b) in buf.as_bytes()[from..].iter().enumerate() {
        match b {
            b'"' => in_quotes = !in_quotes,
            b'>' if !in_quotes => return Some(from + i),
            _ => {}
        }
    }
    None
}

/// Start of a strict prefix of any marker that runs to the end of `lower`.
fn partial_marker_start(lower: &str, from: usize, markers: &[&str]) -> Option<usize> {
    let longest = markers.iter().map(|m| m.len()).max()?;
    let window = lower.len().saturating_sub(longest - 1).max(from);
    (window..lower.len()).find(|&i| {
        lower.is_char_boundary(i) && markers.iter().any(|m| m.starts_with(&lower[i..]))
    })
}

/// Parse `key="value"` pairs. Keys are lowercased; values are taken verbatim.
fn parse_attributes(raw: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let Ok(re) = Regex::new(r#"([A-Za-z_][\w:-]*)\s*=\s*"([^"]*)""#) else {
        return attrs;
    };
    for caps in re.captures_iter(raw) {
        attrs
            .entry(caps[1].to_ascii_lowercase())
            .or_insert_with(|| caps[2].to_string());
    }
    attrs
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = concat!(
        "Here is your app.\n",
        "<artifact id=\"todo\" title=\"Todo > App\">\n",
        "  <action type=\"file\" path=\"src/App.tsx\">\n",
        "export const App = () => <div>{`Hi ${name}`}</div>;\n",
        "  </action>\n",
        "  <ACTION type=\"shell\">\n",
        "npm install\n",
        "  </Action>\n",
        "</artifact>\n",
        "Enjoy < your > app!",
    );

    fn feed_all(chunks: &[&str]) -> ParseOutput {
        let mut session = StreamSession::begin("test");
        let mut out = ParseOutput::default();
        for chunk in chunks {
            out.extend(session.push(chunk));
        }
        out.extend(session.finish());
        out
    }

    #[test]
    fn test_parse_whole_stream() {
        let out = feed_all(&[SAMPLE]);

        assert_eq!(
            out.events[1],
            ParseEvent::ArtifactOpen {
                id: "todo".to_string(),
                title: "Todo > App".to_string(),
            }
        );
        let actions: Vec<_> = out.actions().cloned().collect();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0].kind,
            ActionKind::File {
                path: "src/App.tsx".to_string(),
                content: "export const App = () => <div>{`Hi ${name}`}</div>;\n".to_string(),
            }
        );
        assert_eq!(
            actions[1].kind,
            ActionKind::Shell {
                command: "npm install".to_string()
            }
        );
        assert_eq!(actions[1].artifact_id.as_deref(), Some("todo"));
        assert_eq!(out.text(), "Here is your app.\n\nEnjoy < your > app!");
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let whole = feed_all(&[SAMPLE]);

        for split in 1..SAMPLE.len() {
            if !SAMPLE.is_char_boundary(split) {
                continue;
            }
            let (a, b) = SAMPLE.split_at(split);
            assert_eq!(feed_all(&[a, b]), whole, "split at byte {}", split);
        }

        let chars: Vec<String> = SAMPLE.chars().map(|c| c.to_string()).collect();
        let pieces: Vec<&str> = chars.iter().map(|s| s.as_str()).collect();
        assert_eq!(feed_all(&pieces), whole);
    }

    #[test]
    fn test_unescapes_template_literals() {
        let out = feed_all(&[
            "<artifact id=\"a\" title=\"t\"><action type=\"file\" path=\"greet.js\">",
            "\\`Hello \\${name}\\`",
            "</action></artifact>",
        ]);
        let action = out.actions().next().unwrap();
        assert_eq!(
            action.kind,
            ActionKind::File {
                path: "greet.js".to_string(),
                content: "`Hello ${name}`\n".to_string(),
            }
        );
    }

    #[test]
    fn test_defaults_for_missing_attributes() {
        let out = feed_all(&["<artifact><action path=\"a.txt\">x</action></artifact>"]);
        assert_eq!(
            out.events[0],
            ParseEvent::ArtifactOpen {
                id: "artifact-1".to_string(),
                title: DEFAULT_ARTIFACT_TITLE.to_string(),
            }
        );
        assert_eq!(
            out.events[1],
            ParseEvent::ActionOpen {
                artifact_id: "artifact-1".to_string(),
                action_type: ActionType::File,
                path: Some("a.txt".to_string()),
            }
        );
    }

    #[test]
    fn test_file_action_without_path_is_dropped() {
        let out = feed_all(&["<artifact id=\"a\"><action>orphan</action></artifact>"]);
        assert_eq!(out.actions().count(), 0);
        assert!(matches!(out.events.last(), Some(ParseEvent::ArtifactClose { .. })));
    }

    #[test]
    fn test_nested_opens_are_not_tags() {
        let out = feed_all(&[
            "<artifact id=\"outer\">",
            "<artifact id=\"inner\">",
            "<action type=\"shell\"><action type=\"shell\">ls</action>",
            "</artifact>",
        ]);
        let opens = out
            .events
            .iter()
            .filter(|e| matches!(e, ParseEvent::ArtifactOpen { .. }))
            .count();
        assert_eq!(opens, 1);
        let action = out.actions().next().unwrap();
        assert_eq!(
            action.kind,
            ActionKind::Shell {
                command: "<action type=\"shell\">ls".to_string()
            }
        );
    }

    #[test]
    fn test_pending_buffer_holds_partial_marker() {
        let mut state = ParserState::new();
        let out = state.feed("hello <arti");
        assert_eq!(out.text(), "hello ");
        assert_eq!(state.pending(), "<arti");

        let out = state.feed("cles are great");
        assert_eq!(out.text(), "<articles are great");
        assert_eq!(state.pending(), "");
    }

    #[test]
    fn test_longer_tag_names_are_text() {
        let out = feed_all(&["<artifacts>not markup</artifacts>"]);
        assert_eq!(out.text(), "<artifacts>not markup</artifacts>");
        assert_eq!(out.actions().count(), 0);
    }

    #[test]
    fn test_finish_flushes_pending_text() {
        let mut session = StreamSession::begin("s");
        let out = session.push("trailing <art");
        assert_eq!(out.text(), "trailing ");
        assert_eq!(session.finish().text(), "<art");
    }

    #[test]
    fn test_unterminated_action_is_dropped_on_finish() {
        let mut session = StreamSession::begin("s");
        session.push("<artifact id=\"a\"><action type=\"shell\">npm ins");
        assert!(session.state().inside_action());
        assert!(session.finish().is_empty());
    }

    #[test]
    fn test_keyed_parser_isolates_streams() {
        let mut parser = StreamParser::new();
        parser.parse("m1", "<artifact id=\"one\"><action type=\"shell\">ech");
        parser.parse("m2", "plain text");
        assert_eq!(parser.active_streams(), 2);

        let out = parser.parse("m1", "o hi</action></artifact>");
        assert_eq!(out.actions().next().unwrap().description(), "Run echo hi");
        assert!(!parser.state("m1").unwrap().inside_artifact());

        parser.reset(Some("m1"));
        assert_eq!(parser.active_streams(), 1);
        parser.reset(None);
        assert_eq!(parser.active_streams(), 0);
    }

    #[test]
    fn test_attribute_parsing() {
        let attrs = parse_attributes(r#" type="file"  PATH = "src/a b.ts" extra="1""#);
        assert_eq!(attrs.get("type").map(String::as_str), Some("file"));
        assert_eq!(attrs.get("path").map(String::as_str), Some("src/a b.ts"));
        assert_eq!(attrs.len(), 3);
    }
}
