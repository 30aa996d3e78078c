//! Base-name allocation: sanitize a proposed name and disambiguate it
//! against the names already used in a tab.

use std::collections::BTreeSet;

use crate::sync::error::SyncError;
use crate::sync::formats::{self, FileFormat};

/// Name assigned to items that arrive without one.
const DEFAULT_BASE_NAME: &str = "copyq_0000";

/// Highest value the disambiguation counter may reach.
const COUNTER_CEILING: u32 = 99_999;

/// Allocates a unique base name.
///
/// The proposed name is sanitized, then numerically extended until it does
/// not collide with `used`. The accepted name is added to `used` before it
/// is returned, so repeated calls with the same proposal yield distinct
/// names. Fails with [`SyncError::NameExhausted`] once the counter hits its
/// ceiling.
pub fn unique_name(
    proposed: &str,
    used: &mut BTreeSet<String>,
    user_formats: &[FileFormat],
) -> Result<String, SyncError> {
    let mut name = sanitize(proposed);
    if name.is_empty() {
        name = DEFAULT_BASE_NAME.to_string();
    }

    if !used.contains(&name) {
        used.insert(name.clone());
        return Ok(name);
    }

    let (mut base, mut ext) = split_extension(&name, user_formats);
    if base.ends_with('.') {
        base.pop();
        ext.insert(0, '.');
    }

    let (mut counter, width) = match trailing_digits(&base) {
        Some((digits, value)) => {
            let width = digits;
            base.truncate(base.len() - width);
            (value, width)
        }
        None => {
            base.push('-');
            (0, 0)
        }
    };

    loop {
        if counter >= COUNTER_CEILING {
            return Err(SyncError::NameExhausted);
        }
        counter += 1;
        let candidate = format!("{base}{counter:0width$}{ext}");
        if !used.contains(&candidate) {
            used.insert(candidate.clone());
            return Ok(candidate);
        }
    }
}

/// Replaces path separators and a leading dot with `_`, strips CR and LF.
fn sanitize(name: &str) -> String {
    let mut out: String = name
        .chars()
        .filter(|c| *c != '\n' && *c != '\r')
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    if out.starts_with('.') {
        out.replace_range(0..1, "_");
    }
    out
}

/// Splits a name into `(base, extension)`.
///
/// The extension is the longest registered suffix (user or built-in) that
/// matches, else everything from the final dot on, else empty.
fn split_extension(name: &str, user_formats: &[FileFormat]) -> (String, String) {
    let ext = formats::known_extensions(user_formats)
        .into_iter()
        .filter(|ext| !ext.is_empty() && name.ends_with(ext))
        .max_by_key(|ext| ext.len())
        .map(str::to_string)
        .or_else(|| name.rfind('.').map(|i| name[i..].to_string()))
        .unwrap_or_default();
    (name[..name.len() - ext.len()].to_string(), ext)
}

/// Number of trailing ASCII digits and their parsed value, if any.
fn trailing_digits(base: &str) -> Option<(usize, u32)> {
    let digits = base
        .bytes()
        .rev()
        .take_while(u8::is_ascii_digit)
        .count();
    if digits == 0 {
        return None;
    }
    // Longer runs than the ceiling's width cannot be a counter we produced;
    // saturate rather than fail on parse.
    let value = base[base.len() - digits..].parse::<u32>().unwrap_or(COUNTER_CEILING);
    Some((digits, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alloc(proposed: &str, used: &[&str]) -> Result<String, SyncError> {
        let mut set: BTreeSet<String> = used.iter().map(|s| (*s).to_string()).collect();
        unique_name(proposed, &mut set, &[])
    }

    #[test]
    fn empty_name_gets_default() {
        assert_eq!(alloc("", &[]).unwrap(), "copyq_0000");
    }

    #[test]
    fn default_name_collision_extends_counter() {
        assert_eq!(alloc("", &["copyq_0000"]).unwrap(), "copyq_0001");
    }

    #[test]
    fn unsafe_characters_are_replaced() {
        assert_eq!(alloc("a/b\\c", &[]).unwrap(), "a_b_c");
        assert_eq!(alloc(".hidden", &[]).unwrap(), "_hidden");
        assert_eq!(alloc("li\nne\r", &[]).unwrap(), "line");
    }

    #[test]
    fn collision_preserves_extension() {
        assert_eq!(alloc("foo.txt", &["foo.txt"]).unwrap(), "foo-1.txt");
    }

    #[test]
    fn collision_preserves_counter_width() {
        assert_eq!(alloc("foo001.txt", &["foo001.txt"]).unwrap(), "foo002.txt");
        assert_eq!(
            alloc("foo001.txt", &["foo001.txt", "foo002.txt"]).unwrap(),
            "foo003.txt"
        );
    }

    #[test]
    fn trailing_dot_moves_to_extension() {
        assert_eq!(alloc("odd..txt", &["odd..txt"]).unwrap(), "odd-1..txt");
    }

    #[test]
    fn user_extension_splits_name() {
        let mut format = FileFormat {
            extensions: vec![".tar.gz".into()],
            item_mime: "application/gzip".into(),
            icon: String::new(),
        };
        format.normalize();
        let mut used: BTreeSet<String> = ["dump.tar.gz".to_string()].into();
        assert_eq!(
            unique_name("dump.tar.gz", &mut used, &[format]).unwrap(),
            "dump-1.tar.gz"
        );
    }

    #[test]
    fn counter_exhaustion_fails() {
        let mut used: BTreeSet<String> = (1..=99_999).map(|i| format!("x-{i}")).collect();
        used.insert("x".to_string());
        assert!(matches!(
            unique_name("x", &mut used, &[]),
            Err(SyncError::NameExhausted)
        ));
    }

    #[test]
    fn accepted_names_never_repeat() {
        let mut used = BTreeSet::new();
        let a = unique_name("note", &mut used, &[]).unwrap();
        let b = unique_name("note", &mut used, &[]).unwrap();
        let c = unique_name("note", &mut used, &[]).unwrap();
        assert_eq!(a, "note");
        assert_eq!(b, "note-1");
        assert_eq!(c, "note-2");
    }
}
