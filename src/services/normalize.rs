/// Pairs leading/trailing newlines of a submitted translation with the
/// source message and drops carriage returns a browser added.
///
/// Applying it to its own output is a no-op.
pub fn fix_nls(source: &str, candidate: &str) -> String {
    if source.is_empty() || candidate.is_empty() {
        return candidate.to_string();
    }

    let mut out = if candidate.contains('\r') && !source.contains('\r') {
        candidate.replace('\r', "")
    } else {
        candidate.to_string()
    };

    let src_starts = source.starts_with('\n');
    if src_starts && !out.starts_with('\n') {
        out.insert(0, '\n');
    } else if !src_starts && out.starts_with('\n') {
        out = out.trim_start().to_string();
    }

    if out.is_empty() {
        return out;
    }

    let src_ends = source.ends_with('\n');
    if src_ends && !out.ends_with('\n') {
        out.push('\n');
    } else if !src_ends && out.ends_with('\n') {
        out = out.trim_end().to_string();
    }

    out
}
