//! Purpose: Resolve `${NAME}` and `%%NAME%%` placeholders in user-supplied literals.
//! Exports: `VariableSpace`, `Variables`.
//! Role: Substitution collaborator handed to the boundary resolver.
//! Invariants: Unknown placeholders are left verbatim; substitution is a single pass.
use std::collections::BTreeMap;
use std::ffi::OsString;

pub trait VariableSpace {
    fn substitute(&self, input: &str) -> String;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Variables {
    values: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the process environment; entries that are not valid UTF-8 are skipped.
    pub fn from_env() -> Self {
        Self::from_os_pairs(std::env::vars_os())
    }

    fn from_os_pairs(pairs: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        Self {
            values: pairs
                .into_iter()
                .filter_map(|(name, value)| {
                    Some((name.into_string().ok()?, value.into_string().ok()?))
                })
                .collect(),
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

impl VariableSpace for Variables {
    fn substitute(&self, input: &str) -> String {
        let mut out = String::with_capacity(input.len());
        let mut rest = input;
        while !rest.is_empty() {
            let next = [("${", "}"), ("%%", "%%")]
                .into_iter()
                .filter_map(|(open, close)| rest.find(open).map(|at| (at, open, close)))
                .min_by_key(|(at, _, _)| *at);
            let Some((at, open, close)) = next else {
                break;
            };
            out.push_str(&rest[..at]);
            let after_open = &rest[at + open.len()..];
            match after_open.find(close) {
                Some(end) => {
                    let name = &after_open[..end];
                    match self.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            out.push_str(open);
                            out.push_str(name);
                            out.push_str(close);
                        }
                    }
                    rest = &after_open[end + close.len()..];
                }
                None => {
                    out.push_str(open);
                    rest = after_open;
                }
            }
        }
        out.push_str(rest);
        out
    }
}
