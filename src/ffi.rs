// ABOUTME: Dynamic builtin-pack loader: reads the two-symbol export
// protocol from a shared object and marshals scalar values across the ABI

use crate::value::Value;
use libloading::{Library, Symbol};
use std::cell::RefCell;
use std::ffi::{c_char, CStr};

pub const RAW_UNIT: u32 = 0;
pub const RAW_CHAR: u32 = 1;
pub const RAW_INT: u32 = 2;
pub const RAW_FLOAT: u32 = 3;

/// Scalar value crossing the pack ABI. The tag selects which payload
/// field is meaningful.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawValue {
    pub tag: u32,
    pub char_value: u8,
    pub int_value: i64,
    pub float_value: f64,
}

impl RawValue {
    pub fn unit() -> RawValue {
        RawValue {
            tag: RAW_UNIT,
            char_value: 0,
            int_value: 0,
            float_value: 0.0,
        }
    }
}

/// Entry point exported by a pack. Returns false to signal failure;
/// the interpreter surfaces that as an eval error.
pub type RawBuiltinFn =
    unsafe extern "C" fn(args: *const RawValue, argc: usize, result: *mut RawValue) -> bool;

/// One record of the pack's `exported_functions` array.
#[repr(C)]
pub struct BuiltinSpec {
    pub name: *const c_char,
    pub func: RawBuiltinFn,
    pub arity: usize,
}

#[derive(Debug)]
pub struct LoadedBuiltin {
    pub name: String,
    pub arity: usize,
    pub func: RawBuiltinFn,
}

thread_local! {
    /// Loaded packs stay resident for the session so the function
    /// pointers handed out below remain valid.
    static LOADED_PACKS: RefCell<Vec<Library>> = const { RefCell::new(Vec::new()) };
}

/// Load a pack and read its `exported_functions` /
/// `exported_functions_count` symbols.
pub fn load_pack(path: &str) -> Result<Vec<LoadedBuiltin>, String> {
    // SAFETY: loading and symbol reads follow the documented pack
    // protocol; the library handle is retained for the session below,
    // keeping the entry function pointers valid.
    unsafe {
        let lib = Library::new(path).map_err(|e| e.to_string())?;

        let (count, first) = {
            let count: Symbol<usize> = lib
                .get(b"exported_functions_count\0")
                .map_err(|e| e.to_string())?;
            let entries: Symbol<BuiltinSpec> = lib
                .get(b"exported_functions\0")
                .map_err(|e| e.to_string())?;
            (*count, &*entries as *const BuiltinSpec)
        };

        let mut loaded = Vec::with_capacity(count);
        for i in 0..count {
            let spec = &*first.add(i);
            if spec.name.is_null() {
                return Err(format!("{path}: entry {i} has no name"));
            }
            let name = CStr::from_ptr(spec.name).to_string_lossy().into_owned();
            loaded.push(LoadedBuiltin {
                name,
                arity: spec.arity,
                func: spec.func,
            });
        }

        LOADED_PACKS.with(|packs| packs.borrow_mut().push(lib));
        Ok(loaded)
    }
}

/// Scalar values cross the ABI; anything else stays host-side.
pub fn marshal(value: &Value) -> Option<RawValue> {
    let mut raw = RawValue::unit();
    match value {
        Value::Unit => {}
        Value::Char(c) => {
            raw.tag = RAW_CHAR;
            raw.char_value = (*c as u32) as u8;
        }
        Value::Int(n) => {
            raw.tag = RAW_INT;
            raw.int_value = *n;
        }
        Value::Float(f) => {
            raw.tag = RAW_FLOAT;
            raw.float_value = *f;
        }
        _ => return None,
    }
    Some(raw)
}

pub fn unmarshal(raw: &RawValue) -> Value {
    match raw.tag {
        RAW_CHAR => Value::Char(raw.char_value as char),
        RAW_INT => Value::Int(raw.int_value),
        RAW_FLOAT => Value::Float(raw.float_value),
        _ => Value::Unit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marshal_scalars() {
        let raw = marshal(&Value::Int(42)).unwrap();
        assert_eq!(raw.tag, RAW_INT);
        assert!(matches!(unmarshal(&raw), Value::Int(42)));

        let raw = marshal(&Value::Char('x')).unwrap();
        assert!(matches!(unmarshal(&raw), Value::Char('x')));

        let raw = marshal(&Value::Float(2.5)).unwrap();
        assert!(matches!(unmarshal(&raw), Value::Float(f) if f == 2.5));

        let raw = marshal(&Value::Unit).unwrap();
        assert!(matches!(unmarshal(&raw), Value::Unit));
    }

    #[test]
    fn test_marshal_rejects_compound_values() {
        use crate::value::List;
        assert!(marshal(&Value::List(List::new())).is_none());
        assert!(marshal(&Value::Null).is_none());
    }

    #[test]
    fn test_load_pack_missing_file() {
        let err = load_pack("/nonexistent/builtins.so").unwrap_err();
        assert!(!err.is_empty());
    }
}
