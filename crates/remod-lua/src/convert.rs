//! Conversions between Lua values and host types.

use mlua::{Function, Lua, LuaSerdeExt, MultiValue, SerializeOptions, Value};
use parking_lot::Mutex;
use remod_types::SafeArgumentRecord;
use std::path::PathBuf;
use std::sync::Arc;

/// Renders console arguments the way a script author expects to read them:
/// strings verbatim, tables as JSON when possible, anything else through
/// `tostring`.
pub(crate) fn display_values(lua: &Lua, values: &MultiValue, separator: &str) -> mlua::Result<String> {
    let mut parts = Vec::with_capacity(values.len());
    for value in values.iter() {
        parts.push(display_value(lua, value)?);
    }
    Ok(parts.join(separator))
}

pub(crate) fn display_value(lua: &Lua, value: &Value) -> mlua::Result<String> {
    match value {
        Value::String(s) => Ok(String::from_utf8_lossy(&s.as_bytes()).into_owned()),
        Value::Table(_) => match lua.from_value::<serde_json::Value>(value.clone()) {
            Ok(json) => Ok(json.to_string()),
            Err(_) => lua_tostring(lua, value),
        },
        _ => lua_tostring(lua, value),
    }
}

fn lua_tostring(lua: &Lua, value: &Value) -> mlua::Result<String> {
    let tostring: Function = lua.globals().get("tostring")?;
    tostring.call::<String>(value.clone())
}

/// JSON null decodes to `nil` rather than a sentinel.
fn plain_options() -> SerializeOptions {
    SerializeOptions::new()
        .serialize_none_to_null(false)
        .serialize_unit_to_null(false)
}

/// Builder for the `json` module.
pub(crate) fn json_module(lua: &Lua) -> mlua::Result<Value> {
    let module = lua.create_table()?;
    module.set(
        "encode",
        lua.create_function(|lua, value: Value| {
            let json: serde_json::Value = lua.from_value(value)?;
            Ok(json.to_string())
        })?,
    )?;
    module.set(
        "decode",
        lua.create_function(|lua, text: String| {
            let json: serde_json::Value = serde_json::from_str(&text)
                .map_err(|e| mlua::Error::RuntimeError(format!("invalid JSON: {e}")))?;
            lua.to_value_with(&json, plain_options())
        })?,
    )?;
    Ok(Value::Table(module))
}

/// Hands the argument record to the transformation as a plain table.
pub(crate) fn args_value(lua: &Lua, args: &SafeArgumentRecord) -> mlua::Result<Value> {
    lua.to_value_with(&args.merged(), plain_options())
}

/// Converts any host value to a Lua value.
pub(crate) fn to_lua<T: serde::Serialize>(lua: &Lua, value: &T) -> mlua::Result<Value> {
    lua.to_value_with(value, plain_options())
}

/// Files a transformation asked to create through `api.create_file`.
#[derive(Clone, Default)]
pub(crate) struct CreatedFiles(Arc<Mutex<Vec<(PathBuf, String)>>>);

impl CreatedFiles {
    /// The Lua-facing `create_file(path, data)` function.
    pub(crate) fn function(&self, lua: &Lua) -> mlua::Result<Function> {
        let files = self.clone();
        lua.create_function(move |_, (path, data): (String, String)| {
            if path.is_empty() {
                return Err(mlua::Error::RuntimeError(
                    "create_file: path must not be empty".into(),
                ));
            }
            files.0.lock().push((PathBuf::from(path), data));
            Ok(())
        })
    }

    pub(crate) fn take(&self) -> Vec<(PathBuf, String)> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use remod_types::RawValue;

    #[test]
    fn display_mixes_kinds() {
        let lua = Lua::new();
        let values = MultiValue::from_iter([
            Value::String(lua.create_string("s").expect("str")),
            Value::Integer(7),
            Value::Boolean(false),
            Value::Nil,
        ]);
        assert_eq!(display_values(&lua, &values, " ").expect("display"), "s 7 false nil");
    }

    #[test]
    fn json_round_trips_null_to_nil() {
        let lua = Lua::new();
        lua.globals()
            .set("json", json_module(&lua).expect("module"))
            .expect("set");
        let (kind, encoded): (String, String) = lua
            .load(r#"local v = json.decode('{"a": null, "b": [1, 2]}'); return type(v.a), json.encode(v.b)"#)
            .eval()
            .expect("eval");
        assert_eq!(kind, "nil");
        assert_eq!(encoded, "[1,2]");
    }

    #[test]
    fn json_decode_rejects_garbage() {
        let lua = Lua::new();
        lua.globals()
            .set("json", json_module(&lua).expect("module"))
            .expect("set");
        let err = lua.load("return json.decode('{')").exec().expect_err("garbage");
        assert!(err.to_string().contains("invalid JSON"), "{err}");
    }

    #[test]
    fn args_become_flat_table() {
        let lua = Lua::new();
        let raw = RawValue::map([
            ("type", RawValue::string("State")),
            ("strict", RawValue::Bool(true)),
        ]);
        let args = SafeArgumentRecord::validate(&raw).expect("valid");
        lua.globals()
            .set("args", args_value(&lua, &args).expect("args"))
            .expect("set");
        let (ty, strict): (String, bool) =
            lua.load("return args.type, args.strict").eval().expect("eval");
        assert_eq!(ty, "State");
        assert!(strict);
    }

    #[test]
    fn created_files_collects_in_order() {
        let lua = Lua::new();
        let created = CreatedFiles::default();
        lua.globals()
            .set("create_file", created.function(&lua).expect("fn"))
            .expect("set");
        lua.load(r#"create_file("a.ts", "1"); create_file("b.ts", "2")"#)
            .exec()
            .expect("exec");
        assert_eq!(
            created.take(),
            vec![
                (PathBuf::from("a.ts"), "1".to_string()),
                (PathBuf::from("b.ts"), "2".to_string())
            ]
        );
        assert!(created.take().is_empty());
        assert!(lua.load(r#"create_file("", "x")"#).exec().is_err());
    }
}
