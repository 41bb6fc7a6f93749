// console.rs — console output path
//
// Everything the engine reports to the operator goes through con_printf.
// con_dprintf is the developer channel and stays silent unless developer
// mode is on. A redirect buffer lets callers (and tests) capture output
// instead of writing it to stdout.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

static DEVELOPER: AtomicBool = AtomicBool::new(false);

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

/// Enable or disable developer output. Wired to the "developer" cvar.
pub fn set_developer(on: bool) {
    DEVELOPER.store(on, Ordering::Relaxed);
}

pub fn developer() -> bool {
    DEVELOPER.load(Ordering::Relaxed)
}

/// Begin capturing con_printf output into a buffer.
pub fn con_begin_redirect() {
    let mut buf = RD_BUFFER.lock().unwrap();
    *buf = Some(String::new());
}

/// Stop capturing and return everything printed since the redirect began.
pub fn con_end_redirect() -> Option<String> {
    let mut buf = RD_BUFFER.lock().unwrap();
    buf.take()
}

/// General-purpose print function. Appends to the redirect buffer if one
/// is active, otherwise writes to stdout.
pub fn con_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock().unwrap();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}

/// Developer-only print. Only emits when developer mode is active.
pub fn con_dprintf(msg: &str) {
    if !developer() {
        return;
    }
    con_printf(msg);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Single test because the redirect buffer is process-global.
    #[test]
    fn test_redirect_and_developer_gate() {
        con_begin_redirect();
        con_printf("hello ");
        con_printf("world\n");
        let captured = con_end_redirect().unwrap();
        assert_eq!(captured, "hello world\n");

        con_begin_redirect();
        set_developer(false);
        con_dprintf("hidden\n");
        set_developer(true);
        con_dprintf("shown\n");
        set_developer(false);
        let captured = con_end_redirect().unwrap();
        assert_eq!(captured, "shown\n");
    }
}
