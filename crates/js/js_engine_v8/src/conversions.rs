//! Type conversions between JSValue and V8 values.

use js::JSValue;
use v8::{Boolean, Local, Number, String as V8String, Value};

/// Collect V8 callback arguments into engine-agnostic `JSValue`s.
#[inline]
pub(crate) fn collect_js_args<'s, 'i>(
    scope: &mut v8::PinScope<'s, 'i>,
    args: &v8::FunctionCallbackArguments,
) -> Vec<JSValue> {
    let length = args.length();
    let start: i32 = 0;
    (start..length)
        .map(|index| local_to_jsvalue(scope, args.get(index)))
        .collect()
}

/// Convert a V8 value into a `JSValue`; anything that is not a primitive
/// crosses as its `String(value)` form.
#[inline]
pub(crate) fn local_to_jsvalue(
    scope: &mut v8::PinScope<'_, '_>,
    value: Local<'_, Value>,
) -> JSValue {
    if value.is_undefined() {
        return JSValue::Undefined;
    }
    if value.is_null() {
        return JSValue::Null;
    }
    if value.is_boolean() {
        return JSValue::Boolean(value.boolean_value(scope));
    }
    if value.is_number() {
        return JSValue::Number(value.number_value(scope).unwrap_or(f64::NAN));
    }
    let stringified = value.to_string(scope).map_or_else(
        || String::from("undefined"),
        |val_str| val_str.to_rust_string_lossy(scope),
    );
    JSValue::String(stringified)
}

/// Convert a `JSValue` into a V8 `Local<Value>`.
#[inline]
pub(crate) fn jsvalue_to_local<'s, 'i>(
    scope: &mut v8::PinScope<'s, 'i>,
    value: JSValue,
) -> Local<'s, Value> {
    match value {
        JSValue::Undefined => v8::undefined(scope).into(),
        JSValue::Null => v8::null(scope).into(),
        JSValue::Boolean(boolean_value) => Boolean::new(scope, boolean_value).into(),
        JSValue::Number(number_value) => Number::new(scope, number_value).into(),
        JSValue::String(string_value) => V8String::new(scope, string_value.as_str())
            .map_or_else(|| v8::undefined(scope).into(), Into::into),
    }
}
