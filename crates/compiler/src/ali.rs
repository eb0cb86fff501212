//! `.ali` interface files.
//!
//! One stub per compiled unit, ASCII and line-oriented:
//!
//! ```text
//! V 1.0
//! Unit store
//! W text_io 1722470400
//! D text_io
//! X STORE_S2E1__PUSH.1.4f2a.9c31.77aa i64 void
//! H OVERFLOW
//! E 3
//! ```
//!
//! Reading a stub imports each `X` line as an external symbol with the listed
//! signature, so callers resolve across units without seeing the bodies.

use std::fmt::Write as _;

#[derive(Debug, Clone, PartialEq)]
pub struct AliExport {
    pub mangled: String,
    /// `void`, `i64`, `double`, or `ptr`.
    pub ret: String,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AliUnit {
    pub name: String,
    /// Withed units with source mtimes (seconds).
    pub withs: Vec<(String, u64)>,
    pub deps: Vec<String>,
    pub exports: Vec<AliExport>,
    pub exceptions: Vec<String>,
    pub elab_count: u32,
}

const VERSION_LINE: &str = "V 1.0";

pub fn write_ali(unit: &AliUnit) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", VERSION_LINE);
    let _ = writeln!(out, "Unit {}", unit.name);
    for (name, mtime) in &unit.withs {
        let _ = writeln!(out, "W {} {}", name, mtime);
    }
    for dep in &unit.deps {
        let _ = writeln!(out, "D {}", dep);
    }
    for export in &unit.exports {
        let _ = write!(out, "X {} {}", export.mangled, export.ret);
        for arg in &export.args {
            let _ = write!(out, " {}", arg);
        }
        let _ = writeln!(out);
    }
    for exc in &unit.exceptions {
        let _ = writeln!(out, "H {}", exc);
    }
    let _ = writeln!(out, "E {}", unit.elab_count);
    out
}

fn valid_kind(kind: &str) -> bool {
    matches!(kind, "void" | "i64" | "double" | "ptr")
}

pub fn parse_ali(text: &str) -> Result<AliUnit, String> {
    let mut lines = text.lines().enumerate();
    match lines.next() {
        Some((_, line)) if line.trim() == VERSION_LINE => {}
        Some((_, line)) => return Err(format!("bad .ali version line: '{}'", line)),
        None => return Err("empty .ali file".to_string()),
    }
    let mut unit = AliUnit::default();
    for (lineno, line) in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        let tag = fields.next().unwrap_or("");
        match tag {
            "Unit" => {
                unit.name = fields
                    .next()
                    .ok_or_else(|| format!("line {}: Unit needs a name", lineno + 1))?
                    .to_string();
            }
            "W" => {
                let name = fields
                    .next()
                    .ok_or_else(|| format!("line {}: W needs a unit name", lineno + 1))?;
                let mtime = fields
                    .next()
                    .and_then(|m| m.parse::<u64>().ok())
                    .unwrap_or(0);
                unit.withs.push((name.to_string(), mtime));
            }
            "D" => {
                let name = fields
                    .next()
                    .ok_or_else(|| format!("line {}: D needs a package name", lineno + 1))?;
                unit.deps.push(name.to_string());
            }
            "X" => {
                let mangled = fields
                    .next()
                    .ok_or_else(|| format!("line {}: X needs a symbol", lineno + 1))?
                    .to_string();
                let ret = fields
                    .next()
                    .ok_or_else(|| format!("line {}: X needs a return kind", lineno + 1))?
                    .to_string();
                if !valid_kind(&ret) {
                    return Err(format!("line {}: bad return kind '{}'", lineno + 1, ret));
                }
                let mut args = Vec::new();
                for arg in fields {
                    if !valid_kind(arg) {
                        return Err(format!("line {}: bad arg kind '{}'", lineno + 1, arg));
                    }
                    args.push(arg.to_string());
                }
                unit.exports.push(AliExport { mangled, ret, args });
            }
            "H" => {
                let name = fields
                    .next()
                    .ok_or_else(|| format!("line {}: H needs an exception name", lineno + 1))?;
                unit.exceptions.push(name.to_string());
            }
            "E" => {
                unit.elab_count = fields
                    .next()
                    .and_then(|c| c.parse::<u32>().ok())
                    .unwrap_or(0);
            }
            other => {
                return Err(format!("line {}: unknown record '{}'", lineno + 1, other));
            }
        }
    }
    if unit.name.is_empty() {
        return Err("missing Unit line".to_string());
    }
    Ok(unit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AliUnit {
        AliUnit {
            name: "store".to_string(),
            withs: vec![("text_io".to_string(), 1722470400)],
            deps: vec!["text_io".to_string()],
            exports: vec![
                AliExport {
                    mangled: "STORE_S2E1__PUSH.1.4f2a.9c31.77aa".to_string(),
                    ret: "void".to_string(),
                    args: vec!["i64".to_string()],
                },
                AliExport {
                    mangled: "STORE_S2E2__TOP.0.1111.2222.3333".to_string(),
                    ret: "i64".to_string(),
                    args: vec![],
                },
            ],
            exceptions: vec!["OVERFLOW".to_string()],
            elab_count: 3,
        }
    }

    #[test]
    fn test_round_trip() {
        let unit = sample();
        let text = write_ali(&unit);
        assert!(text.starts_with("V 1.0\nUnit store\n"));
        let parsed = parse_ali(&text).expect("parse failed");
        assert_eq!(parsed, unit);
    }

    #[test]
    fn test_writer_is_line_oriented() {
        let text = write_ali(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "V 1.0");
        assert_eq!(lines[1], "Unit store");
        assert_eq!(lines[2], "W text_io 1722470400");
        assert_eq!(lines.last().copied(), Some("E 3"));
    }

    #[test]
    fn test_bad_version_rejected() {
        assert!(parse_ali("V 9.9\nUnit x\nE 0\n").is_err());
        assert!(parse_ali("").is_err());
    }

    #[test]
    fn test_bad_kind_rejected() {
        let text = "V 1.0\nUnit x\nX sym i32\nE 0\n";
        let err = parse_ali(text).unwrap_err();
        assert!(err.contains("bad return kind"), "got {}", err);
    }

    #[test]
    fn test_missing_unit_rejected() {
        assert!(parse_ali("V 1.0\nE 0\n").is_err());
    }
}
