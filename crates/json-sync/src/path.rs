//! Immutable slash-separated locations.
//!
//! A [`Path`] shares its segment storage between all of its suffixes:
//! [`Path::pop_front`] only advances a cursor, so walking a path from the
//! root down never copies segments.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::Arc;

use crate::error::SyncError;
use crate::util::name_compare;
use crate::validation;

#[derive(Clone)]
pub struct Path {
    pieces: Arc<[String]>,
    offset: usize,
}

impl Path {
    /// The root location `/`.
    pub fn root() -> Self {
        Path { pieces: Arc::from(Vec::<String>::new()), offset: 0 }
    }

    /// Splits `path` on `/`, dropping empty segments. No validation.
    pub fn new(path: &str) -> Self {
        Self::from_segments(path.split('/').filter(|s| !s.is_empty()))
    }

    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pieces: Vec<String> = segments.into_iter().map(Into::into).collect();
        Path { pieces: Arc::from(pieces), offset: 0 }
    }

    /// Parses and validates a user-supplied path string.
    ///
    /// A leading `.info` segment is accepted; anywhere else the characters
    /// `. # $ [ ]` and ASCII control characters are rejected.
    pub fn parse(path: &str) -> Result<Self, SyncError> {
        validation::validate_root_path_string(path)?;
        Ok(Self::new(path))
    }

    pub fn segments(&self) -> &[String] {
        &self.pieces[self.offset..]
    }

    pub fn front(&self) -> Option<&str> {
        self.segments().first().map(String::as_str)
    }

    pub fn back(&self) -> Option<&str> {
        self.segments().last().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pieces.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The path without its first segment. The root stays the root.
    pub fn pop_front(&self) -> Path {
        Path {
            pieces: Arc::clone(&self.pieces),
            offset: (self.offset + 1).min(self.pieces.len()),
        }
    }

    pub fn parent(&self) -> Option<Path> {
        if self.is_empty() {
            return None;
        }
        let segs = self.segments();
        Some(Self::from_segments(segs[..segs.len() - 1].iter().cloned()))
    }

    /// Appends `child`, which may itself contain `/` separators.
    pub fn child(&self, child: &str) -> Path {
        let mut pieces: Vec<String> = self.segments().to_vec();
        pieces.extend(child.split('/').filter(|s| !s.is_empty()).map(str::to_owned));
        Path { pieces: Arc::from(pieces), offset: 0 }
    }

    pub fn join(&self, other: &Path) -> Path {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut pieces: Vec<String> = self.segments().to_vec();
        pieces.extend(other.segments().iter().cloned());
        Path { pieces: Arc::from(pieces), offset: 0 }
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &Path) -> bool {
        let ours = self.segments();
        let theirs = other.segments();
        ours.len() <= theirs.len() && ours.iter().zip(theirs).all(|(a, b)| a == b)
    }

    /// The suffix of `inner` below `outer`.
    ///
    /// # Panics
    ///
    /// If `outer` does not contain `inner`.
    pub fn relative(outer: &Path, inner: &Path) -> Path {
        assert!(outer.contains(inner), "{inner} is not contained in {outer}");
        Path { pieces: Arc::clone(&inner.pieces), offset: inner.offset + outer.len() }
    }

    pub fn is_info(&self) -> bool {
        self.front() == Some(".info")
    }
}

impl Default for Path {
    fn default() -> Self {
        Self::root()
    }
}

impl FromStr for Path {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Path::parse(s)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::new(s)
    }
}

impl PartialEq for Path {
    fn eq(&self, other: &Self) -> bool {
        self.segments() == other.segments()
    }
}

impl Eq for Path {}

impl Hash for Path {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.segments().hash(state);
    }
}

impl Ord for Path {
    /// Segment-wise [`name_compare`], shorter prefix first.
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.segments().iter().zip(other.segments()) {
            match name_compare(a, b) {
                Ordering::Equal => {}
                unequal => return unequal,
            }
        }
        self.len().cmp(&other.len())
    }
}

impl PartialOrd for Path {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("/");
        }
        for seg in self.segments() {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Path({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pop_front_shares_storage() {
        let p = Path::new("/a/b/c");
        let rest = p.pop_front();
        assert_eq!(rest, Path::new("b/c"));
        assert!(Arc::ptr_eq(&p.pieces, &rest.pieces));
        assert_eq!(rest.pop_front().pop_front().pop_front(), Path::root());
    }

    #[test]
    fn relative_and_contains() {
        let outer = Path::new("a/b");
        let inner = Path::new("a/b/c/d");
        assert!(outer.contains(&inner));
        assert!(!inner.contains(&outer));
        assert!(outer.contains(&outer));
        assert_eq!(Path::relative(&outer, &inner), Path::new("c/d"));
        assert_eq!(Path::relative(&inner, &inner), Path::root());
    }

    #[test]
    fn ordering_uses_name_order() {
        let mut paths = vec![Path::new("a/10"), Path::new("a/b"), Path::new("a/2"), Path::new("a")];
        paths.sort();
        let shown: Vec<String> = paths.iter().map(ToString::to_string).collect();
        assert_eq!(shown, vec!["/a", "/a/2", "/a/10", "/a/b"]);
    }

    #[test]
    fn display_and_parent() {
        assert_eq!(Path::root().to_string(), "/");
        assert_eq!(Path::new("x//y/").to_string(), "/x/y");
        assert_eq!(Path::new("x/y").parent(), Some(Path::new("x")));
        assert_eq!(Path::root().parent(), None);
        assert_eq!(Path::new("x").child("y/z"), Path::new("x/y/z"));
    }

    #[test]
    fn parse_rejects_bad_characters() {
        assert!(Path::parse("/a/b").is_ok());
        assert!(Path::parse("/.info/connected").is_ok());
        assert!(Path::parse("/a/.info").is_err());
        assert!(Path::parse("/a#b").is_err());
        assert!(Path::parse("/a[0]").is_err());
    }
}
