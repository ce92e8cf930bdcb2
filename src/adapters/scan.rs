//! Directory listing with natural ordering.
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use walkdir::WalkDir;

use crate::{Error, Result};

/// A set of file name suffixes, each starting with `.`, e.g. `.nii.gz`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionSpec {
    extensions: Vec<String>,
}

impl ExtensionSpec {
    /// Build from one or more extensions; a missing leading `.` is added.
    ///
    /// Fails with [`Error::InvalidExtensionSpec`] for an empty list, an empty extension, or one
    /// containing a path separator.
    pub fn new<S: AsRef<str>>(extensions: impl IntoIterator<Item = S>) -> Result<Self> {
        let mut normalized = Vec::new();
        for ext in extensions {
            let ext = ext.as_ref().trim();
            let bare = ext.strip_prefix('.').unwrap_or(ext);
            if bare.is_empty() || bare.contains(['/', '\\']) {
                return Err(Error::InvalidExtensionSpec(ext.to_string()));
            }
            normalized.push(format!(".{bare}"));
        }
        if normalized.is_empty() {
            return Err(Error::InvalidExtensionSpec(String::new()));
        }
        Ok(Self {
            extensions: normalized,
        })
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    /// The first extension `name` ends with.
    pub fn matching(&self, name: &str) -> Option<&str> {
        self.extensions
            .iter()
            .map(String::as_str)
            .find(|ext| name.len() > ext.len() && name.ends_with(ext))
    }
}

impl FromStr for ExtensionSpec {
    type Err = Error;

    /// Comma-separated extensions, e.g. `"nii.gz,.nii"`.
    fn from_str(s: &str) -> Result<Self> {
        Self::new(s.split(','))
    }
}

/// List the files directly inside `dir`, in natural order.
///
/// With `extensions`, only names ending in one of them are listed. Without `with_extension`
/// the matched extension is stripped, or everything from the first `.` if no filter was given.
/// With `with_path` the entries are joined to `dir`.
pub fn list_files(
    dir: impl AsRef<Path>,
    extensions: Option<&ExtensionSpec>,
    with_path: bool,
    with_extension: bool,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut names = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(name) = entry.file_name().to_str() else {
            log::warn!("skipping non-UTF-8 file name {:?}", entry.file_name());
            continue;
        };
        let stem = match extensions {
            Some(spec) => match spec.matching(name) {
                Some(_) if with_extension => name,
                Some(ext) => &name[..name.len() - ext.len()],
                None => continue,
            },
            None if with_extension => name,
            None => name.split('.').next().unwrap_or(name),
        };
        names.push(stem.to_string());
    }
    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names
        .into_iter()
        .map(|name| {
            if with_path {
                dir.join(name)
            } else {
                PathBuf::from(name)
            }
        })
        .collect())
}

/// List the subdirectories of `dir`, in natural order, as full paths.
pub fn list_dirs(dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in WalkDir::new(dir.as_ref()).min_depth(1).max_depth(1) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }
    dirs.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));
    Ok(dirs)
}

/// Compare strings treating runs of ASCII digits as numbers, so `img2` sorts before `img10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut a = a.chars().peekable();
    let mut b = b.chars().peekable();
    loop {
        match (a.peek().copied(), b.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let x = take_digits(&mut a);
                let y = take_digits(&mut b);
                let xs = x.trim_start_matches('0');
                let ys = y.trim_start_matches('0');
                let ord = xs
                    .len()
                    .cmp(&ys.len())
                    .then_with(|| xs.cmp(ys))
                    .then_with(|| x.len().cmp(&y.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                a.next();
                b.next();
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(c) = chars.next_if(char::is_ascii_digit) {
        digits.push(c);
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn natural_order() {
        let mut names = vec!["img10", "img2", "img1", "img02b", "a"];
        names.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(names, vec!["a", "img1", "img2", "img02b", "img10"]);
    }

    #[test]
    fn extension_spec_normalizes() {
        let spec: ExtensionSpec = "nii.gz, .nii".parse().unwrap();
        assert_eq!(spec.extensions(), &[".nii.gz", ".nii"]);
        assert_eq!(spec.matching("brain.nii.gz"), Some(".nii.gz"));
        assert_eq!(spec.matching("brain.npy"), None);
    }

    #[test]
    fn invalid_extension_spec() {
        assert!(matches!(
            "".parse::<ExtensionSpec>(),
            Err(Error::InvalidExtensionSpec(_))
        ));
        assert!(matches!(
            ExtensionSpec::new(["nii", "a/b"]),
            Err(Error::InvalidExtensionSpec(_))
        ));
        assert!(matches!(
            ExtensionSpec::new(Vec::<String>::new()),
            Err(Error::InvalidExtensionSpec(_))
        ));
    }
}
