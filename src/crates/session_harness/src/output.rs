/// Separator placed between a failure message and the captured output.
pub const COMMANDS_SEPARATOR: &str = "\n\nCommands:\n";

/// Command output captured during a single example.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputBuffer {
    text: String,
}

impl OutputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    /// Record one command invocation and everything it printed.
    pub fn record_command(&mut self, command: &str, stdout: &str, stderr: &str) {
        self.text.push_str("$ ");
        self.text.push_str(command);
        self.text.push('\n');
        for stream in [stdout, stderr] {
            if stream.is_empty() {
                continue;
            }
            self.text.push_str(stream);
            if !stream.ends_with('\n') {
                self.text.push('\n');
            }
        }
    }

    /// Take the buffer contents with surrounding whitespace stripped, leaving it empty.
    pub fn take_trimmed(&mut self) -> String {
        let text = std::mem::take(&mut self.text);
        text.trim().to_string()
    }
}

/// Append captured output to a failure message. Empty output leaves the message unchanged.
pub fn annotate_failure(message: &str, output: &str) -> String {
    if output.is_empty() {
        return message.to_string();
    }
    format!("{message}{COMMANDS_SEPARATOR}{output}")
}
