use std::fs::{File, OpenOptions};
use std::io::Write;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;

pub const DEBUG_ENV: &str = "SHORTS_TUI_DEBUG";
pub const DEBUG_LOG_ENV: &str = "SHORTS_TUI_DEBUG_LOG";

pub fn debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var(DEBUG_ENV)
            .map(|val| is_truthy(&val))
            .unwrap_or(false)
    })
}

fn is_truthy(raw: &str) -> bool {
    let trimmed = raw.trim();
    !(trimmed.is_empty()
        || trimmed.eq_ignore_ascii_case("0")
        || trimmed.eq_ignore_ascii_case("false")
        || trimmed.eq_ignore_ascii_case("no")
        || trimmed.eq_ignore_ascii_case("off"))
}

fn debug_writer() -> Option<&'static Mutex<File>> {
    static WRITER: OnceCell<Option<Mutex<File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            std::env::var(DEBUG_LOG_ENV).ok().and_then(|path| {
                OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .map(Mutex::new)
                    .ok()
            })
        })
        .as_ref()
}

/// Writes one line to the debug log. The UI owns the terminal, so without
/// `SHORTS_TUI_DEBUG_LOG` the line goes to stderr and is only useful when
/// stderr is redirected.
pub fn debug_log(message: impl AsRef<str>) {
    if !debug_enabled() {
        return;
    }
    let stamp = chrono::Utc::now().format("%H:%M:%S%.3f");
    if let Some(writer) = debug_writer() {
        let mut file = writer.lock();
        let _ = writeln!(file, "{stamp} {}", message.as_ref());
        return;
    }
    eprintln!("{stamp} {}", message.as_ref());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
        assert!(is_truthy(" TRUE "));
        assert!(!is_truthy(""));
        assert!(!is_truthy("off"));
        assert!(!is_truthy("False"));
    }
}
