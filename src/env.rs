use std::{cell::RefCell, ffi::OsStr, str::FromStr};

use crate::runtime::DEFAULT_RAM_CELLS;

#[derive(Clone, Copy)]
struct Env {
    trace_enabled: bool,
    ram_cells: usize,
}

thread_local! {
    /// Must only be mutated within `set_env`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read `STACKVM_TRACE` and `STACKVM_RAM` once at startup.
pub fn init() {
    let value = Env {
        trace_enabled: var_is("STACKVM_TRACE", "1"),
        ram_cells: var_parse("STACKVM_RAM").unwrap_or(DEFAULT_RAM_CELLS),
    };
    set_env(value);
}

pub fn is_trace_enabled() -> bool {
    with_env(|env| env.trace_enabled)
}

pub fn ram_cells() -> usize {
    with_env(|env| env.ram_cells)
}

fn set_env(value: Env) {
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}

fn var_is(name: impl AsRef<OsStr>, value: impl AsRef<str>) -> bool {
    std::env::var(name.as_ref()).is_ok_and(|v| v == value.as_ref())
}

/// Parsed value of a variable. Unset or unparsable values fall back to the default.
fn var_parse<T: FromStr>(name: impl AsRef<OsStr>) -> Option<T> {
    std::env::var(name.as_ref()).ok()?.trim().parse().ok()
}
