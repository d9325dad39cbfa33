use derive_more::Display;

use crate::errors::Error;

/// What a log message is about.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Display)]
pub enum MessageKind {
    Error,
    Warning,
    AstInitial,
    AstFinal,
    IrInitial,
    IrFinal,
    Asm,
    Info,
}

/// One diagnostic or debug-dump message.
#[derive(Clone, Debug, Display)]
#[display("[{kind}] {line}:{column} {body}")]
pub struct Message {
    pub kind: MessageKind,
    pub line: u32,
    pub column: u32,
    pub body: String,
}

impl Message {
    pub fn new(kind: MessageKind, line: u32, column: u32, body: impl Into<String>) -> Self {
        Self {
            kind,
            line,
            column,
            body: body.into(),
        }
    }
}

/// Sink for diagnostics and stage dumps.
pub trait OutputLog {
    fn log(&mut self, message: Message);
}

/// An `OutputLog` that collects messages in memory.
#[derive(Debug, Default)]
pub struct BufferedLog {
    pub messages: Vec<Message>,
}

impl BufferedLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_kind(&self, kind: MessageKind) -> impl Iterator<Item = &Message> {
        self.messages.iter().filter(move |m| m.kind == kind)
    }
}

impl OutputLog for BufferedLog {
    fn log(&mut self, message: Message) {
        self.messages.push(message);
    }
}

/// Resolves byte positions into line/column pairs and delivers source
/// diagnostics to the attached log before the error code propagates.
pub struct ErrorReporter<'a> {
    body: &'a str,
    log: Option<&'a mut dyn OutputLog>,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(body: &'a str, log: Option<&'a mut dyn OutputLog>) -> Self {
        Self { body, log }
    }

    /// 1-based line, column counted back to the previous newline.
    /// Out-of-range positions report (0, 0).
    pub fn line_and_column(&self, position: u32) -> (u32, u32) {
        let bytes = self.body.as_bytes();
        let mut p = position as usize;
        if p >= bytes.len() {
            return (0, 0);
        }

        let mut column = 0u32;
        loop {
            if bytes[p] == b'\n' {
                break;
            }
            column += 1;
            if p == 0 {
                break;
            }
            p -= 1;
        }

        let mut line = 1u32;
        while p > 0 {
            if bytes[p] == b'\n' {
                line += 1;
            }
            p -= 1;
        }

        (line, column)
    }

    /// Logs the message (when a log is attached) and hands the code back so
    /// call sites can write `return Err(reporter.on_error(...))`.
    pub fn on_error(&mut self, error: Error, position: u32, message: impl Into<String>) -> Error {
        let (line, column) = self.line_and_column(position);
        if let Some(log) = self.log.as_deref_mut() {
            log.log(Message::new(MessageKind::Error, line, column, message));
        }
        error
    }

    pub fn on_warning(&mut self, position: u32, message: impl Into<String>) {
        let (line, column) = self.line_and_column(position);
        if let Some(log) = self.log.as_deref_mut() {
            log.log(Message::new(MessageKind::Warning, line, column, message));
        }
    }

    pub fn info(&mut self, kind: MessageKind, body: impl Into<String>) {
        if let Some(log) = self.log.as_deref_mut() {
            log.log(Message::new(kind, 0, 0, body));
        }
    }

    pub fn has_log(&self) -> bool {
        self.log.is_some()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let body = "ab\ncdef\ng";
        let reporter = ErrorReporter::new(body, None);
        assert_eq!(reporter.line_and_column(0), (1, 1));
        assert_eq!(reporter.line_and_column(4), (2, 2));
        assert_eq!(reporter.line_and_column(8), (3, 1));
        assert_eq!(reporter.line_and_column(100), (0, 0));
    }

    #[test]
    fn test_error_is_logged_and_returned() {
        let body = "x\ny";
        let mut log = BufferedLog::new();
        let mut reporter = ErrorReporter::new(body, Some(&mut log));
        let code = reporter.on_error(Error::SymbolNotDefined, 2, "unknown symbol 'y'");
        assert_eq!(code, Error::SymbolNotDefined);
        assert_eq!(log.messages.len(), 1);
        assert_eq!(log.messages[0].kind, MessageKind::Error);
        assert_eq!(log.messages[0].line, 2);
    }
}
