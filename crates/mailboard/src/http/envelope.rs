//! Response envelope normalization
//!
//! The API wraps payloads as `{ "data": ... }` on most routes but not all,
//! and field names arrive in camelCase or snake_case depending on the model
//! that produced them. Lookups here walk an explicit priority list and
//! report a missing field instead of guessing.

use serde_json::Value;

use crate::session::User;

/// Priority order for the access token in auth responses
pub const ACCESS_TOKEN_PATHS: &[&[&str]] = &[
    &["data", "accessToken"],
    &["data", "access_token"],
    &["accessToken"],
    &["access_token"],
];

/// Sign-in responses additionally accept a bare `token` field
const SIGN_IN_TOKEN_PATHS: &[&[&str]] = &[
    &["data", "accessToken"],
    &["data", "access_token"],
    &["accessToken"],
    &["access_token"],
    &["data", "token"],
    &["token"],
];

/// A required field was absent from every candidate location
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Field not found in response: {0}")]
pub struct FieldNotFound(pub &'static str);

/// The payload of an envelope: `.data` when present and non-null, else the root
pub fn payload(value: &Value) -> &Value {
    match value.get("data") {
        Some(data) if !data.is_null() => data,
        _ => value,
    }
}

/// Follow a key path through nested objects
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// First non-empty string found at any of the paths, in order
pub fn first_string<'a>(value: &'a Value, paths: &[&[&str]]) -> Option<&'a str> {
    paths
        .iter()
        .filter_map(|path| lookup(value, path))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
}

/// First present, non-null value for any of the keys on one object
pub fn first_field<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|key| value.get(key))
        .find(|v| !v.is_null())
}

/// Extract the access token from a refresh response
pub fn extract_access_token(value: &Value) -> Result<String, FieldNotFound> {
    first_string(value, ACCESS_TOKEN_PATHS)
        .map(str::to_string)
        .ok_or(FieldNotFound("access_token"))
}

/// Extract the access token from a login/register/google response
pub fn extract_sign_in_token(value: &Value) -> Result<String, FieldNotFound> {
    first_string(value, SIGN_IN_TOKEN_PATHS)
        .map(str::to_string)
        .ok_or(FieldNotFound("access_token"))
}

/// Extract the signed-in user from a sign-in response (`data.user`, `user`)
pub fn extract_user(value: &Value) -> Option<User> {
    [&["data", "user"][..], &["user"][..]]
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(parse_user)
}

/// Extract the profile from `/auth/me` (`data.user`, `data`, `user`, root)
pub fn extract_profile(value: &Value) -> Option<User> {
    [&["data", "user"][..], &["data"][..], &["user"][..], &[][..]]
        .iter()
        .filter_map(|path| lookup(value, path))
        .find_map(parse_user)
}

fn parse_user(value: &Value) -> Option<User> {
    if !value.is_object() {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

/// Items of a list payload: the payload itself when it is an array, else the
/// first array found under one of `keys`
pub fn list_items<'a>(value: &'a Value, keys: &[&str]) -> &'a [Value] {
    let data = payload(value);
    if let Some(items) = data.as_array() {
        return items;
    }
    keys.iter()
        .filter_map(|key| data.get(key))
        .find_map(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
