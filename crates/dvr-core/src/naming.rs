//! Output filename derivation.
//!
//! Derives a local output name from the page or asset URL, sanitized to
//! ASCII so the name can later appear in the multiplexer's concat list
//! without escaping.

/// Default stem when the URL yields nothing usable.
const DEFAULT_STEM: &str = "video";

/// Sanitizes a candidate filename for Linux, restricted to ASCII.
///
/// - Replaces NUL, `/`, `\`, control characters, spaces, single quotes, and
///   any non-ASCII character with `_`
/// - Collapses consecutive underscores, trims leading/trailing `_`/`.`/space
/// - Caps length at 255 bytes (NAME_MAX)
pub fn sanitize_ascii_filename(name: &str) -> String {
    const NAME_MAX: usize = 255;

    let mut out = String::with_capacity(name.len());
    let mut prev_underscore = false;
    for c in name.chars() {
        let ok = c.is_ascii()
            && !c.is_ascii_control()
            && !matches!(c, '/' | '\\' | '\'' | ' ' | '\t');
        let mapped = if ok { c } else { '_' };
        if mapped == '_' {
            if !prev_underscore {
                out.push('_');
            }
            prev_underscore = true;
        } else {
            out.push(mapped);
            prev_underscore = false;
        }
    }

    let trimmed = out.trim_matches(|c| c == '.' || c == '_' || c == ' ');
    if trimmed.len() > NAME_MAX {
        // ASCII by construction, so any byte index is a char boundary.
        trimmed[..NAME_MAX].to_string()
    } else {
        trimmed.to_string()
    }
}

/// Last path segment of `url` with its extension removed; filename stem
/// candidate. `None` when the URL does not parse or has a bare path.
pub fn stem_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .next_back()?;
    let stem = match segment.rsplit_once('.') {
        Some((base, _ext)) if !base.is_empty() => base,
        _ => segment,
    };
    if stem.is_empty() || stem == "." || stem == ".." {
        return None;
    }
    Some(stem.to_string())
}

/// Output filename for a grabbed page: URL stem (or "video"), sanitized,
/// with an `.mp4` extension.
pub fn output_name(page_url: &str) -> String {
    let raw = stem_from_url(page_url).unwrap_or_else(|| DEFAULT_STEM.to_string());
    let stem = sanitize_ascii_filename(&raw);
    let stem = if stem.is_empty() { DEFAULT_STEM } else { &stem };
    format!("{stem}.mp4")
}
