use std::io::IsTerminal;
use thiserror::Error;

#[cfg(feature = "tracing_debug")]
use tracing::debug;

#[derive(Debug, Error)]
#[error("Render error: {0}")]
pub(crate) struct RenderError(pub(crate) String);

/// Lays out `left | middle | right` rows, with the left column right-aligned and the middle wrapped.
#[derive(Debug)]
pub(crate) struct ColumnRenderer {
    padding: usize,
    left: usize,
    middle: usize,
}

// We'll target 95% of the total width, to ensure the renderer doesn't literally use the full space.
const TARGET_TOTAL_FACTOR: f64 = 0.95;

// Let's assume the average word length is 5.
// Then 17 is a good minimum, because it allows precisely 3 words with a space between them.
pub(crate) const MINIMUM_MIDDLE_WIDTH: usize = 17;
pub(crate) const INDENT: usize = 2;

impl ColumnRenderer {
    pub(crate) fn new(padding: usize, left: usize, middle: usize) -> Result<Self, RenderError> {
        if padding < 1 {
            return Err(RenderError(format!("padding must be at least 1, got {padding}")));
        }

        if left < 1 {
            return Err(RenderError(format!("left must be at least 1, got {left}")));
        }

        // So we can hyphenate.
        if middle < 2 {
            return Err(RenderError(format!("middle must be at least 2, got {middle}")));
        }

        Ok(Self {
            padding,
            left,
            middle,
        })
    }

    /// Produce a renderer whose middle column fits within `total` (when known), using the widest `middle` that does.
    pub(crate) fn guided(
        padding: usize,
        left: usize,
        middle: usize,
        right: usize,
        total: Option<usize>,
    ) -> Result<Self, RenderError> {
        let mut non_middle = INDENT + left + padding;

        if right > 0 {
            non_middle += padding + right;
        }

        let guided_middle = std::cmp::max(middle, MINIMUM_MIDDLE_WIDTH);
        let selected = match total {
            None => guided_middle,
            Some(total) => {
                let target = (total as f64 * TARGET_TOTAL_FACTOR) as usize;

                if guided_middle + non_middle <= target {
                    guided_middle
                } else if non_middle < total {
                    std::cmp::max(total - non_middle, MINIMUM_MIDDLE_WIDTH)
                } else {
                    MINIMUM_MIDDLE_WIDTH
                }
            }
        };

        #[cfg(feature = "tracing_debug")]
        {
            debug!("Columns {non_middle} within {total:?}.  Selecting middle: {selected}.");
        }

        ColumnRenderer::new(padding, left, selected)
    }

    pub(crate) fn render(&self, left: &str, middle: &str, right: Option<&str>) -> Vec<String> {
        let padding = " ".repeat(self.padding);
        let parts = chunk(middle, self.middle);
        let first = parts.first().map(String::as_str).unwrap_or("");
        let mut line = format!(
            "{indent}{left:>width$}{padding}",
            indent = " ".repeat(INDENT),
            width = self.left
        );

        match right {
            Some(right) => line.push_str(&format!(
                "{first:<middle$}{padding}{right}",
                middle = self.middle
            )),
            None => line.push_str(first),
        }

        let hanging = " ".repeat(INDENT + self.left + self.padding);
        let mut out = vec![line.trim_end().to_string()];
        out.extend(parts.iter().skip(1).map(|part| format!("{hanging}{part}")));
        out
    }
}

fn chunk(paragraph: &str, width: usize) -> Vec<String> {
    let mut lines = Vec::default();
    let mut current = String::default();

    for word in paragraph.split_whitespace() {
        if current.is_empty() {
            hyphenate(width, &mut lines, &mut current, word);
        } else if current.chars().count() + word.chars().count() < width {
            current.push(' ');
            current.push_str(word);
        } else {
            lines.push(std::mem::take(&mut current));
            hyphenate(width, &mut lines, &mut current, word);
        }
    }

    if !current.is_empty() {
        lines.push(current);
    }

    lines
}

fn hyphenate(width: usize, lines: &mut Vec<String>, current: &mut String, word: &str) {
    let chars: Vec<char> = word.chars().collect();
    let increment = width - 1;
    let mut left = 0;

    while chars.len() - left > width {
        let piece: String = chars[left..left + increment].iter().collect();
        lines.push(format!("{piece}-"));
        left += increment;
    }

    current.extend(&chars[left..]);
}

/// Where command output goes.
pub trait UserInterface {
    /// Print to standard output.
    fn print(&self, message: String);

    /// Print to standard error.
    fn print_error(&self, message: String);

    /// Whether ANSI styling should be used.
    fn is_styled(&self) -> bool {
        false
    }
}

/// The process's standard output & error.
#[derive(Debug, Default)]
pub struct ConsoleInterface {}

impl UserInterface for ConsoleInterface {
    fn print(&self, message: String) {
        println!("{message}");
    }

    fn print_error(&self, message: String) {
        eprintln!("{message}");
    }

    fn is_styled(&self) -> bool {
        std::io::stdout().is_terminal()
    }
}

#[cfg(any(test, feature = "unit_test"))]
pub use self::util::InMemoryInterface;

#[cfg(any(test, feature = "unit_test"))]
mod util {
    use super::UserInterface;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Collects output in memory.
    /// Clones share the same buffers, so a clone may be handed to the command under test.
    #[derive(Debug, Clone, Default)]
    pub struct InMemoryInterface {
        out: Rc<RefCell<Vec<String>>>,
        err: Rc<RefCell<Vec<String>>>,
    }

    impl UserInterface for InMemoryInterface {
        fn print(&self, message: String) {
            self.out.borrow_mut().push(message);
        }

        fn print_error(&self, message: String) {
            self.err.borrow_mut().push(message);
        }
    }

    impl InMemoryInterface {
        /// Everything printed to standard output, one message per line.
        pub fn stdout(&self) -> String {
            self.out.borrow().join("\n")
        }

        /// Everything printed to standard error, one message per line.
        pub fn stderr(&self) -> String {
            self.err.borrow().join("\n")
        }
    }
}
