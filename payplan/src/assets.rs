use anyhow::{Context, Result};
use std::{
    borrow::Cow,
    fs,
    path::Path,
};

/// === Embedded canon schedules ===
pub const STANDARD_TOML_NAME: &str = "standard.toml";
pub const STANDARD_TOML: &str = include_str!("../assets/standard.toml");

/// Return the embedded text for a known schedule, if any.
pub fn default_schedule_text(name: &str) -> Option<&'static str> {
    match name {
        STANDARD_TOML_NAME => Some(STANDARD_TOML),
        _ => None,
    }
}

/// Seed missing default schedules into a destination directory (idempotent).
/// Returns a list of files that were created.
pub fn write_default_schedules(dir: impl AsRef<Path>) -> Result<Vec<String>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("create_dir_all({:?})", dir))?;

    let mut created = Vec::new();
    for (name, text) in [(STANDARD_TOML_NAME, STANDARD_TOML)] {
        let path = dir.join(name);
        if !path.exists() {
            fs::write(&path, text).with_context(|| format!("write {:?}", path))?;
            created.push(name.to_string());
        }
    }
    Ok(created)
}

/// Read a schedule file, comparing it against the embedded canon when one exists.
///
/// - Digest match: the file is returned.
/// - Mismatch while `locked`: the file is overwritten with the embedded copy,
///   which is returned.
/// - Mismatch while unlocked: the local edit is returned as-is.
/// - Missing file with a known embedded copy: the copy is written (best effort)
///   and returned.
/// - Unknown name: the file is read as-is; a missing unknown file is an error.
pub fn read_verified_or_embedded(path: &Path, name: &str, locked: bool) -> Result<Cow<'static, str>> {
    let embedded_opt = default_schedule_text(name);

    if path.exists() {
        let file_bytes = fs::read(path).with_context(|| format!("read {:?}", path))?;
        let Some(embedded) = embedded_opt else {
            return Ok(Cow::Owned(String::from_utf8_lossy(&file_bytes).into_owned()));
        };
        if blake3::hash(&file_bytes) == blake3::hash(embedded.as_bytes()) {
            return Ok(Cow::Borrowed(embedded));
        }
        if locked {
            fs::write(path, embedded).with_context(|| format!("restore embedded {:?}", path))?;
            return Ok(Cow::Borrowed(embedded));
        }
        return Ok(Cow::Owned(String::from_utf8_lossy(&file_bytes).into_owned()));
    }

    match embedded_opt {
        Some(embedded) => {
            if let Some(dir) = path.parent() {
                fs::create_dir_all(dir).ok();
            }
            let _ = fs::write(path, embedded);
            Ok(Cow::Borrowed(embedded))
        }
        None => anyhow::bail!("schedule {:?} not found and no embedded copy named {name}", path),
    }
}
