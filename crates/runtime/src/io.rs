//! Console I/O helpers
//!
//! Output goes straight to stdout and is flushed per call so traced runs
//! and reference runs interleave identically. Input reads from a
//! redirectable source so the driver's `--stdin-from` can swap in a
//! file before execution starts.

use crate::strings::{string_intern, string_value};
use crate::trap::{TrapClass, rt_trap_class};
use std::fs::File;
use std::io::{BufRead, BufReader, Write as _};
use std::sync::Mutex;

static INPUT: Mutex<Option<Box<dyn BufRead + Send>>> = Mutex::new(None);

/// Redirect `rt_input_str` to a file (driver `--stdin-from`).
pub fn set_input_file(path: &str) -> Result<(), String> {
    let file = File::open(path).map_err(|e| format!("cannot open '{path}': {e}"))?;
    tracing::debug!(path, "redirecting runtime input");
    *INPUT.lock().unwrap() = Some(Box::new(BufReader::new(file)));
    Ok(())
}

/// Restore reading from the process stdin.
pub fn reset_input() {
    *INPUT.lock().unwrap() = None;
}

fn read_line_from_source() -> Result<Option<String>, String> {
    let mut guard = INPUT.lock().unwrap();
    let mut line = String::new();
    let read = match guard.as_mut() {
        Some(reader) => reader.read_line(&mut line),
        None => std::io::stdin().lock().read_line(&mut line),
    };
    match read {
        Ok(0) => Ok(None),
        Ok(_) => {
            while line.ends_with('\n') || line.ends_with('\r') {
                line.pop();
            }
            Ok(Some(line))
        }
        Err(e) => Err(e.to_string()),
    }
}

/// Read one line from the configured source; `Ok(None)` at end of input.
pub fn input_line() -> Result<Option<String>, String> {
    read_line_from_source()
}

fn flush_stdout() {
    let _ = std::io::stdout().flush();
}

/// Print an integer with no trailing separator.
#[unsafe(no_mangle)]
pub extern "C" fn rt_print_i64(value: i64) {
    print!("{value}");
    flush_stdout();
}

/// Print a float using the shortest representation that reads back
/// exactly.
#[unsafe(no_mangle)]
pub extern "C" fn rt_print_f64(value: f64) {
    print!("{value}");
    flush_stdout();
}

#[unsafe(no_mangle)]
pub extern "C" fn rt_print_bool(value: bool) {
    print!("{}", if value { "true" } else { "false" });
    flush_stdout();
}

#[unsafe(no_mangle)]
pub extern "C" fn rt_print_str(handle: u64) {
    print!("{}", string_value(handle));
    flush_stdout();
}

/// Terminate the current output line.
#[unsafe(no_mangle)]
pub extern "C" fn rt_print_nl() {
    println!();
    flush_stdout();
}

/// Read one line from the input source; end-of-input traps with EOF
/// semantics unless a hook downgrades it.
#[unsafe(no_mangle)]
pub extern "C" fn rt_input_str() -> u64 {
    match read_line_from_source() {
        Ok(Some(line)) => string_intern(line),
        Ok(None) => {
            rt_trap_class(TrapClass::Eof, "input past end of stream");
            crate::strings::EMPTY_HANDLE
        }
        Err(msg) => {
            rt_trap_class(TrapClass::IoError, &msg);
            crate::strings::EMPTY_HANDLE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write as _;

    #[test]
    #[serial]
    fn test_input_redirection_reads_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "first").unwrap();
        writeln!(file, "second").unwrap();
        set_input_file(file.path().to_str().unwrap()).unwrap();

        let a = rt_input_str();
        let b = rt_input_str();
        assert_eq!(string_value(a), "first");
        assert_eq!(string_value(b), "second");
        reset_input();
    }

    #[test]
    #[serial]
    fn test_missing_input_file_is_an_error() {
        assert!(set_input_file("/nonexistent/input.txt").is_err());
    }

    #[test]
    #[serial]
    fn test_eof_reaches_trap_hook() {
        let file = tempfile::NamedTempFile::new().unwrap();
        set_input_file(file.path().to_str().unwrap()).unwrap();

        let seen = std::sync::Arc::new(Mutex::new(None));
        let sink = seen.clone();
        crate::trap::set_trap_hook(Box::new(move |class, _| {
            *sink.lock().unwrap() = Some(class);
        }));
        let handle = rt_input_str();
        crate::trap::clear_trap_hook();
        reset_input();

        assert_eq!(handle, crate::strings::EMPTY_HANDLE);
        assert_eq!(*seen.lock().unwrap(), Some(TrapClass::Eof));
    }
}
