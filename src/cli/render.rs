//! Terminal rendering for one-shot CLI invocations.
//!
//! The studio redraws its whole view after every change; a terminal can only
//! append. [`TerminalSink`] keeps what it has already printed for each output
//! that started loading during this process and writes only the difference.

use std::collections::HashMap;
use std::io::Write;
use std::sync::{Mutex, PoisonError};

use crate::core::constants::{GENERATING_TEXT, PLACEHOLDER_IMAGE_REF};
use crate::core::output::OutputItem;
use crate::core::studio::{RenderSink, StudioView};

#[derive(Debug, PartialEq, Eq)]
enum Delta<'a> {
    Nothing,
    Append(&'a str),
    /// The text no longer extends what was printed (e.g. an error replaced a
    /// partial answer).
    Replace(&'a str),
}

fn text_delta<'a>(printed: &str, current: &'a str) -> Delta<'a> {
    if current == printed {
        Delta::Nothing
    } else if let Some(rest) = current.strip_prefix(printed) {
        Delta::Append(rest)
    } else {
        Delta::Replace(current)
    }
}

#[derive(Default)]
struct Tracked {
    /// Outputs still loading, with the text printed so far.
    live: HashMap<String, String>,
}

pub struct TerminalSink {
    out: Mutex<Box<dyn Write + Send>>,
    tracked: Mutex<Tracked>,
}

impl TerminalSink {
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            tracked: Mutex::new(Tracked::default()),
        }
    }

    fn render_output(&self, tracked: &mut Tracked, out: &mut dyn Write, item: &OutputItem) {
        if item.loading && !tracked.live.contains_key(&item.id) {
            tracked.live.insert(item.id.clone(), String::new());
        }
        let Some(printed) = tracked.live.get_mut(&item.id) else {
            return;
        };

        let visible = if item.text == GENERATING_TEXT {
            ""
        } else {
            item.text.as_str()
        };
        let written = match text_delta(printed, visible) {
            Delta::Nothing => Ok(()),
            Delta::Append(rest) => write!(out, "{rest}"),
            Delta::Replace(text) if printed.is_empty() => write!(out, "{text}"),
            Delta::Replace(text) => write!(out, "\n{text}"),
        };
        if written.is_err() {
            return;
        }
        *printed = visible.to_string();

        if !item.loading {
            let _ = writeln!(out);
            if let Some(image_ref) = item.image_ref.as_deref() {
                if image_ref != PLACEHOLDER_IMAGE_REF {
                    let _ = writeln!(
                        out,
                        "🖼  Image ready in output {id}; save it with `promptdeck save-image {id}`",
                        id = item.id
                    );
                }
            }
            tracked.live.remove(&item.id);
        }
    }
}

impl RenderSink for TerminalSink {
    fn redraw(&self, view: &StudioView<'_>) {
        let mut tracked = self.tracked.lock().unwrap_or_else(PoisonError::into_inner);
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        for item in view.outputs {
            self.render_output(&mut tracked, out.as_mut(), item);
        }
        let _ = out.flush();
    }
}
