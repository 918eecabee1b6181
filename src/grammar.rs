//! User-input grammar (spec component H).
//!
//! Splits a REPL command line into positional arguments against a static
//! arity descriptor, and parses the breakpoint mini-language
//! (`file:line[, condition]` or `file:function[, condition]`). The original
//! tool derived argument arity from `inspect.signature` on each `do_*`
//! method; this client declares it explicitly instead, since reflection has
//! no equivalent here.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::Error;

/// Describes how many positional words a command accepts: `required` must
/// all be present, `optional` may be omitted (filled with `None`), and at
/// most one trailing `repeated` field swallows every remaining word as one
/// string (used by `delete`, whose argument is a space-separated id list).
#[derive(Debug, Clone, Copy)]
pub struct ArgSpec {
    pub required: usize,
    pub optional: usize,
    pub repeated: bool,
}

impl ArgSpec {
    pub const fn new(required: usize, optional: usize, repeated: bool) -> Self {
        ArgSpec {
            required,
            optional,
            repeated,
        }
    }
}

/// Split `line` (already separated from the command name) into fields per
/// `spec`. Fields beyond `required + optional` are only allowed when
/// `repeated` is set, in which case they're rejoined into the last field.
pub fn split_args(line: &str, spec: ArgSpec) -> Result<Vec<Option<String>>, Error> {
    let words: Vec<&str> = line.split_whitespace().collect();
    if words.len() < spec.required {
        return Err(Error::ArgumentError(format!(
            "expected at least {} argument(s), got {}",
            spec.required,
            words.len()
        )));
    }
    let max = spec.required + spec.optional;
    if words.len() > max && !spec.repeated {
        return Err(Error::ArgumentError(format!(
            "expected at most {max} argument(s), got {}",
            words.len()
        )));
    }
    let mut out: Vec<Option<String>> = Vec::with_capacity(max);
    if spec.repeated && words.len() > max && max > 0 {
        for w in &words[..max - 1] {
            out.push(Some((*w).to_string()));
        }
        out.push(Some(words[max - 1..].join(" ")));
    } else if spec.repeated && max == 0 {
        if !words.is_empty() {
            out.push(Some(words.join(" ")));
        }
    } else {
        for w in &words {
            out.push(Some((*w).to_string()));
        }
        while out.len() < max {
            out.push(None);
        }
    }
    Ok(out)
}

/// A parsed breakpoint location from the mini-language
/// `filename:line[, condition]` or `filename:function[, condition]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BreakpointSpec {
    pub filename: String,
    pub line: Option<u32>,
    pub function: Option<String>,
    pub condition: Option<String>,
}

fn breakpoint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([^:]+):(?:(\d+)|([^,]+))(?:, ?(.*))?$").expect("static regex is valid")
    })
}

/// Parse a breakpoint location string. `line` and `function` are mutually
/// exclusive; exactly one is set on success.
pub fn parse_breakpoint(input: &str) -> Result<BreakpointSpec, Error> {
    let caps = breakpoint_regex()
        .captures(input.trim())
        .ok_or_else(|| Error::ArgumentError(format!("cannot parse breakpoint location: {input}")))?;
    let filename = caps[1].to_string();
    let line = caps.get(2).map(|m| m.as_str().parse().unwrap());
    let function = caps.get(3).map(|m| m.as_str().trim().to_string());
    let condition = caps.get(4).map(|m| m.as_str().to_string());
    Ok(BreakpointSpec {
        filename,
        line,
        function,
        condition,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_args_fills_missing_optionals_with_none() {
        let out = split_args("main.py", ArgSpec::new(1, 2, false)).unwrap();
        assert_eq!(out, vec![Some("main.py".to_string()), None, None]);
    }

    #[test]
    fn split_args_rejects_too_few_required() {
        assert!(split_args("", ArgSpec::new(1, 0, false)).is_err());
    }

    #[test]
    fn split_args_rejects_extra_words_without_repeated() {
        assert!(split_args("1 2 3", ArgSpec::new(1, 0, false)).is_err());
    }

    #[test]
    fn split_args_joins_trailing_repeated_field() {
        let out = split_args("1 2 3", ArgSpec::new(0, 0, true)).unwrap();
        assert_eq!(out, vec![Some("1 2 3".to_string())]);
    }

    #[test]
    fn parse_breakpoint_with_line_number() {
        let spec = parse_breakpoint("main.py:42").unwrap();
        assert_eq!(spec.filename, "main.py");
        assert_eq!(spec.line, Some(42));
        assert_eq!(spec.function, None);
        assert_eq!(spec.condition, None);
    }

    #[test]
    fn parse_breakpoint_with_function_and_condition() {
        let spec = parse_breakpoint("main.py:my_func, x > 0").unwrap();
        assert_eq!(spec.filename, "main.py");
        assert_eq!(spec.line, None);
        assert_eq!(spec.function.as_deref(), Some("my_func"));
        assert_eq!(spec.condition.as_deref(), Some("x > 0"));
    }

    #[test]
    fn parse_breakpoint_rejects_missing_colon() {
        assert!(parse_breakpoint("main.py").is_err());
    }
}
