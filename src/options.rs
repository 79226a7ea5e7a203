//! Typed option bag handed to drivers
//!
//! An [`OptionBag`] holds four disjoint categories of options: booleans,
//! integers, strings and string lists. Every setter clears the name from the
//! other categories, so a name lives in at most one category and the last
//! categorized write wins.

use std::collections::HashMap;

use crate::proto;

/// A single option value, tagged by category
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OptionValue {
    /// Boolean option
    Bool(bool),
    /// 64-bit signed integer option
    Int(i64),
    /// String option
    String(String),
    /// Ordered list of strings
    StringSlice(Vec<String>),
}

/// Typed container of configuration values consumed by one driver call
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OptionBag {
    bool_options: HashMap<String, bool>,
    int_options: HashMap<String, i64>,
    string_options: HashMap<String, String>,
    string_slice_options: HashMap<String, Vec<String>>,
}

impl OptionBag {
    /// Create an empty bag
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a boolean option, removing the name from every other category
    pub fn set_bool(&mut self, name: impl Into<String>, value: bool) {
        let name = name.into();
        self.clear(&name);
        self.bool_options.insert(name, value);
    }

    /// Set an integer option, removing the name from every other category
    pub fn set_int(&mut self, name: impl Into<String>, value: i64) {
        let name = name.into();
        self.clear(&name);
        self.int_options.insert(name, value);
    }

    /// Set a string option, removing the name from every other category
    pub fn set_string(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.clear(&name);
        self.string_options.insert(name, value.into());
    }

    /// Set a string-list option, removing the name from every other category
    pub fn set_string_slice(&mut self, name: impl Into<String>, value: Vec<String>) {
        let name = name.into();
        self.clear(&name);
        self.string_slice_options.insert(name, value);
    }

    /// Look up a boolean option
    pub fn bool(&self, name: &str) -> Option<bool> {
        self.bool_options.get(name).copied()
    }

    /// Look up an integer option
    pub fn int(&self, name: &str) -> Option<i64> {
        self.int_options.get(name).copied()
    }

    /// Look up a string option
    pub fn string(&self, name: &str) -> Option<&str> {
        self.string_options.get(name).map(String::as_str)
    }

    /// Look up a string-list option
    pub fn string_slice(&self, name: &str) -> Option<&[String]> {
        self.string_slice_options.get(name).map(Vec::as_slice)
    }

    /// Look up an option in whichever category holds it
    pub fn get(&self, name: &str) -> Option<OptionValue> {
        if let Some(v) = self.bool(name) {
            return Some(OptionValue::Bool(v));
        }
        if let Some(v) = self.int(name) {
            return Some(OptionValue::Int(v));
        }
        if let Some(v) = self.string(name) {
            return Some(OptionValue::String(v.to_string()));
        }
        self.string_slice(name)
            .map(|v| OptionValue::StringSlice(v.to_vec()))
    }

    /// All boolean options
    pub fn bool_options(&self) -> &HashMap<String, bool> {
        &self.bool_options
    }

    /// All integer options
    pub fn int_options(&self) -> &HashMap<String, i64> {
        &self.int_options
    }

    /// All string options
    pub fn string_options(&self) -> &HashMap<String, String> {
        &self.string_options
    }

    /// All string-list options
    pub fn string_slice_options(&self) -> &HashMap<String, Vec<String>> {
        &self.string_slice_options
    }

    /// Total number of options across all categories
    pub fn len(&self) -> usize {
        self.bool_options.len()
            + self.int_options.len()
            + self.string_options.len()
            + self.string_slice_options.len()
    }

    /// Returns true if no option is set
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn clear(&mut self, name: &str) {
        self.bool_options.remove(name);
        self.int_options.remove(name);
        self.string_options.remove(name);
        self.string_slice_options.remove(name);
    }
}

impl From<OptionBag> for proto::DriverOptions {
    fn from(bag: OptionBag) -> Self {
        Self {
            bool_options: bag.bool_options,
            string_options: bag.string_options,
            int_options: bag.int_options,
            string_slice_options: bag
                .string_slice_options
                .into_iter()
                .map(|(k, value)| (k, proto::StringSlice { value }))
                .collect(),
        }
    }
}

impl From<proto::DriverOptions> for OptionBag {
    /// Rebuild a bag from the wire; names repeated across maps keep the
    /// string-list, string, integer, boolean precedence of the last write.
    fn from(opts: proto::DriverOptions) -> Self {
        let mut bag = OptionBag::new();
        for (k, v) in opts.bool_options {
            bag.set_bool(k, v);
        }
        for (k, v) in opts.int_options {
            bag.set_int(k, v);
        }
        for (k, v) in opts.string_options {
            bag.set_string(k, v);
        }
        for (k, v) in opts.string_slice_options {
            bag.set_string_slice(k, v.value);
        }
        bag
    }
}

/// Type tag of a driver flag
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlagType {
    /// String option
    String,
    /// Integer option
    Int,
    /// Boolean option
    Bool,
    /// String-list option
    StringSlice,
}

impl FlagType {
    /// Wire representation of the tag
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Bool => "bool",
            Self::StringSlice => "stringSlice",
        }
    }
}

impl std::fmt::Display for FlagType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlagType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "bool" => Ok(Self::Bool),
            "stringSlice" => Ok(Self::StringSlice),
            _ => Err(crate::Error::config(format!(
                "invalid flag type: {s}, expected one of: string, int, bool, stringSlice"
            ))),
        }
    }
}

/// Build a flag descriptor
pub fn flag(type_: FlagType, usage: impl Into<String>) -> proto::Flag {
    proto::Flag {
        r#type: type_.to_string(),
        usage: usage.into(),
        value: String::new(),
    }
}
