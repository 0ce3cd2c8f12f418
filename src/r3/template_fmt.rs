//! Hand-rolled `{name}` placeholder substitution.
//!
//! Mirrors `fmt::format(fmt::runtime(template), fmt::arg(...))` from
//! `examples/original_source/include/robot.h`'s `format_read_command` /
//! `format_write_command` / `format_name`. Rust has no runtime-format
//! equivalent of `fmt::runtime`, so this module enumerates the fixed
//! placeholder set the spec names (`{i}`, `{i16}`, `{j}`, `{i1}`, `{i2}`,
//! `{i3}`, `{first16}`, `{last16}`, `{value}`) instead of accepting
//! arbitrary names, per design note §9.

/// Replace every `{name}` occurrence in `template` with its substitution.
/// Unrecognized placeholders are left untouched (the caller controls
/// `subs` and knows which placeholders a given template may use).
pub fn render(template: &str, subs: &[(&str, String)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        rest = &rest[open..];
        match rest.find('}') {
            Some(close) => {
                let name = &rest[1..close];
                match subs.iter().find(|(key, _)| *key == name) {
                    Some((_, value)) => out.push_str(value),
                    None => out.push_str(&rest[..=close]),
                }
                rest = &rest[close + 1..];
            }
            None => {
                out.push_str(rest);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Build the outgoing command line and its response-match pattern for a
/// read/write template, per spec §4.3: the command is
/// `"{mecha};{slot};{body}"` with `{i}`, `{i16} = 16*(id-1)`, `{j}`
/// substituted into `body`; the match pattern substitutes `{i}`, `{i1} =
/// id-1`, `{i2} = 2*(id-1)`, `{i3} = 3*(id-1)`.
pub fn format_command(body: &str, mecha_no: i64, task_slot_no: i64, id: i64, j: i64) -> String {
    let rendered_body = render(
        body,
        &[
            ("i", id.to_string()),
            ("i16", (16 * (id - 1)).to_string()),
            ("j", j.to_string()),
        ],
    );
    format!("{mecha_no};{task_slot_no};{rendered_body}")
}

pub fn format_match(pattern: &str, id: i64) -> String {
    render(
        pattern,
        &[
            ("i", id.to_string()),
            ("i1", (id - 1).to_string()),
            ("i2", (2 * (id - 1)).to_string()),
            ("i3", (3 * (id - 1)).to_string()),
        ],
    )
}

/// Format a write command's body, substituting `{i}`, `{i16}` and the
/// value itself into `{value}`.
pub fn format_write_command(body: &str, mecha_no: i64, task_slot_no: i64, id: i64, value: &str) -> String {
    let rendered_body = render(
        body,
        &[
            ("i", id.to_string()),
            ("i16", (16 * (id - 1)).to_string()),
            ("value", value.to_string()),
        ],
    );
    format!("{mecha_no};{task_slot_no};{rendered_body}")
}

/// Format a node display name, substituting `{i}`, `{first16} =
/// 16*(id-1)`, `{last16} = 16*id - 1`.
pub fn format_name(name: &str, id: i64) -> String {
    render(
        name,
        &[
            ("i", id.to_string()),
            ("first16", (16 * (id - 1)).to_string()),
            ("last16", (16 * id - 1).to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_fixed_placeholders() {
        assert_eq!(
            render("VAL{i}", &[("i", "2".to_string())]),
            "VAL2"
        );
    }

    #[test]
    fn leaves_unknown_placeholders_untouched() {
        assert_eq!(render("{unknown}", &[("i", "1".to_string())]), "{unknown}");
    }

    #[test]
    fn format_command_matches_scenario_4() {
        // Template "1;1;VAL{i}" outgoing line for id=2 is "1;1;VAL2".
        assert_eq!(format_command("VAL{i}", 1, 1, 2, 0), "1;1;VAL2");
    }

    #[test]
    fn format_match_substitutes_offsets() {
        assert_eq!(
            format_match("VAL=(-?\\d+\\.\\d+)", 2),
            "VAL=(-?\\d+\\.\\d+)"
        );
        assert_eq!(format_match("{i1},{i2},{i3}", 2), "1,2,3");
    }

    #[test]
    fn format_name_substitutes_block_offsets() {
        assert_eq!(format_name("Axis{first16}-{last16}", 2), "Axis16-31");
    }
}
