use bytes::{BufMut, Bytes, BytesMut};
use core::fmt;

/// Answer to anything the node does not understand.
pub const UNKNOWN_COMMAND: &str =
    "# Unknown command. Try cap, list, nodes, config, fetch, version or quit";
pub const UNKNOWN_SERVICE: &str = "# Unknown service";
pub const BAD_EXIT: &str = "# Bad exit";
pub const TIMED_OUT: &str = "# Timed out";

/// Line closing a multi-line answer.
pub const TERMINATOR: &str = ".";

/// One command line sent by a poller.
///
/// | Command              | Answer                                  |
/// | -------------------- | --------------------------------------- |
/// | `version`            | one line                                |
/// | `nodes`              | host name, then `.`                     |
/// | `list [node]`        | plugin names on one line                |
/// | `cap [caps...]`      | `cap multigraph [spool]`                |
/// | `config <plugin>`    | plugin output, then `.`                 |
/// | `fetch <plugin>`     | plugin output, then `.`                 |
/// | `spoolfetch <arg>`   | spoolfetch helper output, then `.`      |
/// | `quit` or `.`        | closes the session                      |
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Version,
    Nodes,
    List(Option<String>),
    Cap(Vec<String>),
    Config(String),
    Fetch(String),
    Spoolfetch(String),
    Quit,
    /// A blank line; ignored.
    Empty,
    Unknown(String),
}

impl Request {
    /// Parses one line, without its terminator. Command words are matched
    /// case-insensitively; arguments are kept verbatim.
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Request::Empty;
        };
        let argument = words.next().map(str::to_string);

        match command.to_ascii_lowercase().as_str() {
            "version" => Request::Version,
            "nodes" => Request::Nodes,
            "list" => Request::List(argument),
            "cap" => Request::Cap(argument.into_iter().chain(words.map(str::to_string)).collect()),
            "config" => Request::Config(argument.unwrap_or_default()),
            "fetch" => Request::Fetch(argument.unwrap_or_default()),
            "spoolfetch" => match argument {
                Some(argument) => Request::Spoolfetch(argument),
                None => Request::Unknown(line.trim().to_string()),
            },
            "quit" | "." => Request::Quit,
            _ => Request::Unknown(line.trim().to_string()),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Request::Version => write!(f, "version"),
            Request::Nodes => write!(f, "nodes"),
            Request::List(None) => write!(f, "list"),
            Request::List(Some(node)) => write!(f, "list {}", node),
            Request::Cap(caps) if caps.is_empty() => write!(f, "cap"),
            Request::Cap(caps) => write!(f, "cap {}", caps.join(" ")),
            Request::Config(plugin) => write!(f, "config {}", plugin),
            Request::Fetch(plugin) => write!(f, "fetch {}", plugin),
            Request::Spoolfetch(arg) => write!(f, "spoolfetch {}", arg),
            Request::Quit => write!(f, "quit"),
            Request::Empty => Ok(()),
            Request::Unknown(line) => write!(f, "{}", line),
        }
    }
}

/// Bytes of one answer, built line by line.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Response {
    buffer: BytesMut,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `text` and a newline.
    pub fn line(mut self, text: &str) -> Self {
        self.buffer.put(text.as_bytes());
        self.buffer.put_u8(b'\n');
        self
    }

    /// Appends program output verbatim, completing a last unterminated line.
    pub fn output(mut self, bytes: &[u8]) -> Self {
        self.buffer.put(bytes);
        if bytes.last().is_some_and(|b| *b != b'\n') {
            self.buffer.put_u8(b'\n');
        }
        self
    }

    /// Closes a multi-line answer.
    pub fn end(self) -> Self {
        self.line(TERMINATOR)
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands() {
        assert_eq!(Request::parse("version"), Request::Version);
        assert_eq!(Request::parse("NODES"), Request::Nodes);
        assert_eq!(Request::parse("list"), Request::List(None));
        assert_eq!(
            Request::parse("list node1"),
            Request::List(Some("node1".to_string()))
        );
        assert_eq!(
            Request::parse("cap multigraph dirtyconfig"),
            Request::Cap(vec!["multigraph".to_string(), "dirtyconfig".to_string()])
        );
        assert_eq!(
            Request::parse("  fetch   if1sec  "),
            Request::Fetch("if1sec".to_string())
        );
        assert_eq!(Request::parse("config"), Request::Config(String::new()));
        assert_eq!(
            Request::parse("spoolfetch 1700000000"),
            Request::Spoolfetch("1700000000".to_string())
        );
        assert_eq!(Request::parse("."), Request::Quit);
        assert_eq!(Request::parse("quit"), Request::Quit);
        assert_eq!(Request::parse(""), Request::Empty);
        assert_eq!(Request::parse("   "), Request::Empty);
    }

    #[test]
    fn unknown_commands_keep_their_text() {
        assert_eq!(
            Request::parse("spoolfetch"),
            Request::Unknown("spoolfetch".to_string())
        );
        assert_eq!(
            Request::parse("help me"),
            Request::Unknown("help me".to_string())
        );
    }

    #[test]
    fn builds_multi_line_answers() {
        let response = Response::new()
            .output(b"load.value 1\nother.value 2")
            .line(BAD_EXIT)
            .end();

        assert_eq!(
            &response.freeze()[..],
            b"load.value 1\nother.value 2\n# Bad exit\n.\n"
        );
    }

    #[test]
    fn empty_output_adds_nothing() {
        let response = Response::new().output(b"");
        assert!(response.is_empty());
        assert_eq!(&Response::new().end().freeze()[..], b".\n");
    }
}
