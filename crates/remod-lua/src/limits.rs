//! Bounds on library functions that run without reaching the VM hook.
//!
//! The instruction hook only fires between Lua instructions. Two things
//! escape it: finalizers (`__gc`), which Lua runs with hooks disabled and
//! also while the state is closing, and C library functions such as the
//! string pattern matchers, which can backtrack for a very long time inside
//! a single call. Finalizers are refused outright; the string functions are
//! wrapped so a call whose worst case is unbounded fails up front.

use mlua::{Function, Lua, MultiValue, Table, Value};

/// Largest subject a pattern function accepts.
pub const MAX_SUBJECT_BYTES: usize = 16 << 20;

/// Longest accepted pattern.
pub const MAX_PATTERN_BYTES: usize = 512;

/// Most backtracking repetitions (`*`, `+`, `-`) in one pattern.
pub const MAX_REPETITIONS: usize = 8;

/// Budget for `subject_len ^ (repetitions - 1)`, the rough worst case of a
/// pattern with two or more nested backtracking points.
const BACKTRACK_BUDGET: f64 = 1e9;

/// Largest string `string.rep` may build.
pub const MAX_REP_BYTES: usize = 16 << 20;

/// Installs the guarded `setmetatable` and hardens the shared string
/// library. Must run before the library is copied into an environment.
pub(crate) fn install(lua: &Lua, env: &Table) -> mlua::Result<()> {
    let string: Table = lua.globals().get("string")?;
    // The string metatable indexes this same table, so `s:find(..)` is
    // covered too.
    for (name, pattern_arg) in [("find", 1), ("match", 1), ("gmatch", 1), ("gsub", 1)] {
        wrap(lua, &string, name, move |args| check_pattern_call(name, args, pattern_arg))?;
    }
    wrap(lua, &string, "rep", check_rep)?;

    let setmetatable: Function = lua.globals().get("setmetatable")?;
    let guarded = lua.create_function(move |_, (target, metatable): (Value, Value)| {
        if let Value::Table(mt) = &metatable {
            if !matches!(mt.raw_get::<Value>("__gc")?, Value::Nil) {
                return Err(mlua::Error::RuntimeError(
                    "__gc metamethods are not allowed".into(),
                ));
            }
        }
        setmetatable.call::<Value>((target, metatable))
    })?;
    env.set("setmetatable", guarded)
}

fn wrap<C>(lua: &Lua, library: &Table, name: &str, check: C) -> mlua::Result<()>
where
    C: Fn(&[Value]) -> Result<(), String> + Send + 'static,
{
    let original: Function = library.raw_get(name)?;
    let wrapped = lua.create_function(move |_, args: MultiValue| {
        let values: Vec<Value> = args.iter().cloned().collect();
        check(&values).map_err(mlua::Error::RuntimeError)?;
        original.call::<MultiValue>(args)
    })?;
    library.raw_set(name, wrapped)
}

fn byte_len(value: Option<&Value>) -> usize {
    match value {
        Some(Value::String(s)) => s.as_bytes().len(),
        _ => 0,
    }
}

fn check_pattern_call(name: &str, args: &[Value], pattern_arg: usize) -> Result<(), String> {
    // string.find(s, p, init, plain)
    if name == "find" && matches!(args.get(3), Some(v) if !matches!(v, Value::Nil | Value::Boolean(false)))
    {
        return Ok(());
    }
    let subject = byte_len(args.first());
    if subject > MAX_SUBJECT_BYTES {
        return Err(format!(
            "string.{name}: subject of {subject} bytes exceeds {MAX_SUBJECT_BYTES}"
        ));
    }
    let Some(Value::String(pattern)) = args.get(pattern_arg) else {
        return Ok(());
    };
    let pattern = pattern.as_bytes();
    if pattern.len() > MAX_PATTERN_BYTES {
        return Err(format!(
            "string.{name}: pattern of {} bytes exceeds {MAX_PATTERN_BYTES}",
            pattern.len()
        ));
    }
    let repetitions = count_repetitions(&pattern);
    if repetitions > MAX_REPETITIONS || !within_backtrack_budget(subject, repetitions) {
        return Err(format!(
            "string.{name}: pattern too complex ({repetitions} repetitions over {subject} bytes)"
        ));
    }
    Ok(())
}

fn within_backtrack_budget(subject: usize, repetitions: usize) -> bool {
    if repetitions < 2 {
        return true;
    }
    let exponent = i32::try_from(repetitions - 1).unwrap_or(i32::MAX);
    (subject.max(1) as f64).powi(exponent) <= BACKTRACK_BUDGET
}

/// Counts `*`, `+` and `-` outside character classes and escapes.
fn count_repetitions(pattern: &[u8]) -> usize {
    let mut count = 0;
    let mut i = 0;
    while i < pattern.len() {
        match pattern[i] {
            b'%' => i += 2,
            b'[' => {
                i += 1;
                if pattern.get(i) == Some(&b'^') {
                    i += 1;
                }
                // A leading `]` is part of the set.
                if pattern.get(i) == Some(&b']') {
                    i += 1;
                }
                while i < pattern.len() && pattern[i] != b']' {
                    i += if pattern[i] == b'%' { 2 } else { 1 };
                }
                i += 1;
            }
            b'*' | b'+' | b'-' if i > 0 => {
                count += 1;
                i += 1;
            }
            _ => i += 1,
        }
    }
    count
}

fn check_rep(args: &[Value]) -> Result<(), String> {
    let times = match args.get(1) {
        Some(Value::Integer(n)) => *n,
        Some(Value::Number(n)) => *n as i64,
        _ => return Ok(()),
    };
    let Ok(times) = usize::try_from(times) else {
        return Ok(());
    };
    let piece = byte_len(args.first());
    let separator = byte_len(args.get(2));
    let total = piece
        .checked_mul(times)
        .and_then(|n| n.checked_add(separator.checked_mul(times.saturating_sub(1))?));
    match total {
        Some(total) if total <= MAX_REP_BYTES => Ok(()),
        _ => Err(format!("string.rep: result would exceed {MAX_REP_BYTES} bytes")),
    }
}
