// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.

//! Flat `key = value` text format with a single `[Config]` section

use std::fmt::Write as _;
use tracing::warn;

use super::record::{coerce, field_spec, ConfigRecord, ConfigValue, SECTION};
use crate::error::ConfigError;

/// Render every field of the record.
pub fn render(record: &ConfigRecord) -> String {
    let mut out = format!("[{}]\n", SECTION);
    for (key, value) in record.iter() {
        let _ = writeln!(out, "{} = {}", key, render_value(value));
    }
    out
}

/// Render one value as it appears after `=`
pub fn render_value(value: &ConfigValue) -> String {
    match value {
        ConfigValue::Bool(true) => "True".to_string(),
        ConfigValue::Bool(false) => "False".to_string(),
        ConfigValue::Int(n) => n.to_string(),
        ConfigValue::Str(s) if needs_quotes(s) => quote(s),
        ConfigValue::Str(s) => s.clone(),
    }
}

/// Reserved characters, whitespace and anything that would coerce to a
/// non-string on reload force quoting.
fn needs_quotes(s: &str) -> bool {
    s.chars().any(|c| {
        c.is_whitespace() || c.is_control() || matches!(c, '#' | ';' | '=' | ':' | '"')
    }) || !matches!(coerce(s), ConfigValue::Str(_))
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\u{{{:x}}}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn unquote(raw: &str, line: usize) -> Result<String, ConfigError> {
    let parse_err = |message: &str| ConfigError::Parse { line, message: message.to_string() };

    let mut chars = raw.chars().skip(1);
    let mut out = String::new();
    loop {
        match chars.next() {
            None => return Err(parse_err("unterminated quoted value")),
            Some('"') => break,
            Some('\\') => match chars.next() {
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some('u') => {
                    if chars.next() != Some('{') {
                        return Err(parse_err("malformed unicode escape"));
                    }
                    let hex: String = chars.by_ref().take_while(|c| *c != '}').collect();
                    let c = u32::from_str_radix(&hex, 16)
                        .ok()
                        .and_then(char::from_u32)
                        .ok_or_else(|| parse_err("invalid unicode escape"))?;
                    out.push(c);
                }
                _ => return Err(parse_err("invalid escape sequence")),
            },
            Some(c) => out.push(c),
        }
    }
    if chars.any(|c| !c.is_whitespace()) {
        return Err(parse_err("trailing characters after quoted value"));
    }
    Ok(out)
}

fn parse_value(raw: &str, line: usize) -> Result<ConfigValue, ConfigError> {
    if raw.starts_with('"') {
        unquote(raw, line).map(ConfigValue::Str)
    } else {
        Ok(coerce(raw))
    }
}

/// Parse the flat format on top of the documented defaults. Fields absent from
/// the text keep their default; unknown keys and foreign sections are skipped
/// with a warning.
pub fn parse(text: &str) -> Result<ConfigRecord, ConfigError> {
    let mut record = ConfigRecord::default();
    let mut section: Option<String> = None;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw_line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if let Some(rest) = trimmed.strip_prefix('[') {
            let name = rest.strip_suffix(']').ok_or_else(|| ConfigError::Parse {
                line,
                message: "unterminated section header".to_string(),
            })?;
            section = Some(name.trim().to_string());
            continue;
        }

        let Some(current) = section.as_deref() else {
            return Err(ConfigError::Parse {
                line,
                message: "entry before section header".to_string(),
            });
        };

        let (key, raw_value) = trimmed.split_once('=').ok_or_else(|| ConfigError::Parse {
            line,
            message: format!("expected `key = value`, found `{}`", trimmed),
        })?;
        let key = key.trim();
        let value = parse_value(raw_value.trim(), line)?;

        if current != SECTION {
            warn!("Skipping `{}` in unknown section [{}]", key, current);
            continue;
        }
        if field_spec(key).is_none() {
            warn!("Skipping unknown config field `{}` on line {}", key, line);
            continue;
        }
        record.set(key, value)?;
    }

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::record::field;

    #[test]
    fn test_render_tokens() {
        assert_eq!(render_value(&ConfigValue::Bool(true)), "True");
        assert_eq!(render_value(&ConfigValue::Bool(false)), "False");
        assert_eq!(render_value(&ConfigValue::Int(-3)), "-3");
        assert_eq!(render_value(&ConfigValue::Str("person".into())), "person");
        assert_eq!(render_value(&ConfigValue::Str("a b".into())), "\"a b\"");
        assert_eq!(render_value(&ConfigValue::Str("x=1".into())), "\"x=1\"");
        assert_eq!(render_value(&ConfigValue::Str("12".into())), "\"12\"");
        assert_eq!(render_value(&ConfigValue::Str("True".into())), "\"True\"");
    }

    #[test]
    fn test_round_trip_typed_values() {
        let mut record = ConfigRecord::default();
        record.set(field::HAS_NEGATE, ConfigValue::Bool(true)).unwrap();
        record.set(field::NUMBER_1, ConfigValue::Int(5)).unwrap();
        record.set(field::COMMAND, ConfigValue::Str("a b".into())).unwrap();
        record
            .set(field::NEGATE_COMMAND, ConfigValue::Str("tab\there \"q\" #;:\u{1}".into()))
            .unwrap();

        let parsed = parse(&render(&record)).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.get(field::HAS_NEGATE), Some(&ConfigValue::Bool(true)));
        assert_eq!(parsed.get(field::NUMBER_1), Some(&ConfigValue::Int(5)));
        assert_eq!(parsed.get(field::COMMAND), Some(&ConfigValue::Str("a b".into())));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let parsed = parse("[Config]\nnumber_2 = 4\n# comment\n\nfuture_field = 1\n").unwrap();
        assert_eq!(parsed.get_int(field::NUMBER_2), 4);
        assert_eq!(parsed.get_str(field::COMMAND), "");
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("yolo_model = x\n"), Err(ConfigError::Parse { line: 1, .. })));
        assert!(matches!(
            parse("[Config]\ncommand = \"open\n"),
            Err(ConfigError::Parse { line: 2, .. })
        ));
        assert!(matches!(parse("[Config]\nnonsense\n"), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            parse("[Config]\nhas_negate = maybe\n"),
            Err(ConfigError::UnsupportedValueType { .. })
        ));
    }
}
