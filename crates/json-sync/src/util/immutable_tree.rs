//! Persistent tree keyed by [`Path`] segments with an optional value at
//! every location.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::path::Path;

#[derive(Clone, Debug)]
pub struct ImmutableTree<T> {
    value: Option<T>,
    children: Arc<BTreeMap<String, ImmutableTree<T>>>,
}

impl<T> Default for ImmutableTree<T> {
    fn default() -> Self {
        ImmutableTree { value: None, children: Arc::new(BTreeMap::new()) }
    }
}

impl<T: Clone> ImmutableTree<T> {
    pub fn new(value: Option<T>) -> Self {
        ImmutableTree { value, children: Arc::new(BTreeMap::new()) }
    }

    pub fn leaf(value: T) -> Self {
        Self::new(Some(value))
    }

    pub fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none() && self.children.is_empty()
    }

    pub fn children(&self) -> impl Iterator<Item = (&String, &ImmutableTree<T>)> {
        self.children.iter()
    }

    pub fn child(&self, name: &str) -> Option<&ImmutableTree<T>> {
        self.children.get(name)
    }

    /// The tree rooted at `path`, if anything is stored there or below.
    pub fn subtree(&self, path: &Path) -> Option<&ImmutableTree<T>> {
        let mut node = self;
        for seg in path.segments() {
            node = node.children.get(seg)?;
        }
        Some(node)
    }

    /// Like [`subtree`](Self::subtree) but yields an empty tree when absent.
    pub fn subtree_or_empty(&self, path: &Path) -> ImmutableTree<T> {
        self.subtree(path).cloned().unwrap_or_default()
    }

    pub fn get(&self, path: &Path) -> Option<&T> {
        self.subtree(path).and_then(|t| t.value.as_ref())
    }

    /// Mutable access to the value at `path`, copying shared nodes on the way.
    pub fn get_mut(&mut self, path: &Path) -> Option<&mut T> {
        let mut node = self;
        for seg in path.segments() {
            node = Arc::make_mut(&mut node.children).get_mut(seg)?;
        }
        node.value.as_mut()
    }

    pub fn value_mut(&mut self) -> Option<&mut T> {
        self.value.as_mut()
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut ImmutableTree<T>> {
        Arc::make_mut(&mut self.children).get_mut(name)
    }

    pub fn children_mut(&mut self) -> impl Iterator<Item = (&String, &mut ImmutableTree<T>)> {
        Arc::make_mut(&mut self.children).iter_mut()
    }

    /// Mutable access to the value at `path`, storing `f()` there first if
    /// the location holds nothing.
    pub fn get_or_insert_with(&mut self, path: &Path, f: impl FnOnce() -> T) -> &mut T {
        let mut node = self;
        for seg in path.segments() {
            node = Arc::make_mut(&mut node.children).entry(seg.clone()).or_default();
        }
        node.value.get_or_insert_with(f)
    }

    /// Returns a copy with `value` stored at `path`.
    pub fn set(&self, path: &Path, value: T) -> Self {
        match path.front() {
            None => ImmutableTree { value: Some(value), children: Arc::clone(&self.children) },
            Some(front) => {
                let child = self.children.get(front).cloned().unwrap_or_default();
                let child = child.set(&path.pop_front(), value);
                self.with_child(front, child)
            }
        }
    }

    /// Returns a copy with the value at `path` removed, pruning any
    /// locations left with neither value nor children.
    pub fn remove(&self, path: &Path) -> Self {
        match path.front() {
            None => {
                if self.children.is_empty() {
                    ImmutableTree::default()
                } else {
                    ImmutableTree { value: None, children: Arc::clone(&self.children) }
                }
            }
            Some(front) => match self.children.get(front) {
                None => self.clone(),
                Some(child) => {
                    let child = child.remove(&path.pop_front());
                    if child.is_empty() {
                        let mut children = (*self.children).clone();
                        children.remove(front);
                        ImmutableTree { value: self.value.clone(), children: Arc::new(children) }
                    } else {
                        self.with_child(front, child)
                    }
                }
            },
        }
    }

    /// Returns a copy with the whole subtree at `path` replaced by `tree`.
    pub fn set_tree(&self, path: &Path, tree: ImmutableTree<T>) -> Self {
        match path.front() {
            None => tree,
            Some(front) => {
                let child = self.children.get(front).cloned().unwrap_or_default();
                let child = child.set_tree(&path.pop_front(), tree);
                if child.is_empty() {
                    let mut children = (*self.children).clone();
                    children.remove(front);
                    ImmutableTree { value: self.value.clone(), children: Arc::new(children) }
                } else {
                    self.with_child(front, child)
                }
            }
        }
    }

    fn with_child(&self, name: &str, child: ImmutableTree<T>) -> Self {
        let mut children = (*self.children).clone();
        children.insert(name.to_owned(), child);
        ImmutableTree { value: self.value.clone(), children: Arc::new(children) }
    }

    /// Shallowest value on the way from the root to `path` (inclusive),
    /// with its location relative to this tree.
    pub fn find_root_most_value_and_path(&self, path: &Path) -> Option<(Path, &T)> {
        self.find_root_most_matching_path_and_value(path, |_| true)
    }

    pub fn find_root_most_matching_path_and_value(
        &self,
        path: &Path,
        mut predicate: impl FnMut(&T) -> bool,
    ) -> Option<(Path, &T)> {
        let mut node = self;
        let segs = path.segments();
        for depth in 0..=segs.len() {
            if let Some(value) = node.value.as_ref().filter(|v| predicate(v)) {
                return Some((Path::from_segments(segs[..depth].iter().cloned()), value));
            }
            match segs.get(depth) {
                Some(seg) => node = node.children.get(seg)?,
                None => break,
            }
        }
        None
    }

    /// Calls `f` with each value from the root down to `path` (inclusive)
    /// until it returns `Some`.
    pub fn find_on_path<R>(&self, path: &Path, mut f: impl FnMut(&Path, &T) -> Option<R>) -> Option<R> {
        let mut node = self;
        let segs = path.segments();
        for depth in 0..=segs.len() {
            if let Some(value) = node.value.as_ref() {
                let at = Path::from_segments(segs[..depth].iter().cloned());
                if let Some(found) = f(&at, value) {
                    return Some(found);
                }
            }
            match segs.get(depth) {
                Some(seg) => node = node.children.get(seg)?,
                None => break,
            }
        }
        None
    }

    /// Calls `f` with each value strictly above `path`, root first.
    pub fn foreach_on_path(&self, path: &Path, mut f: impl FnMut(&Path, &T)) {
        let mut node = self;
        let segs = path.segments();
        for depth in 0..segs.len() {
            if let Some(value) = node.value.as_ref() {
                f(&Path::from_segments(segs[..depth].iter().cloned()), value);
            }
            match node.children.get(&segs[depth]) {
                Some(child) => node = child,
                None => return,
            }
        }
    }

    /// Post-order walk over every stored value, children before parents.
    pub fn foreach(&self, mut f: impl FnMut(&Path, &T)) {
        self.foreach_inner(&Path::root(), &mut f);
    }

    fn foreach_inner(&self, at: &Path, f: &mut impl FnMut(&Path, &T)) {
        for (name, child) in self.children.iter() {
            child.foreach_inner(&at.child(name), f);
        }
        if let Some(value) = self.value.as_ref() {
            f(at, value);
        }
    }

    /// Calls `f` with each immediate child that holds a value.
    pub fn foreach_child(&self, mut f: impl FnMut(&str, &T)) {
        for (name, child) in self.children.iter() {
            if let Some(value) = child.value.as_ref() {
                f(name, value);
            }
        }
    }

    /// Bottom-up fold: `f` receives each location, its value and the
    /// folded results of its children.
    pub fn fold<A>(&self, mut f: impl FnMut(&Path, Option<&T>, Vec<(String, A)>) -> A) -> A {
        self.fold_inner(&Path::root(), &mut f)
    }

    fn fold_inner<A>(
        &self,
        at: &Path,
        f: &mut impl FnMut(&Path, Option<&T>, Vec<(String, A)>) -> A,
    ) -> A {
        let folded = self
            .children
            .iter()
            .map(|(name, child)| (name.clone(), child.fold_inner(&at.child(name), f)))
            .collect();
        f(at, self.value.as_ref(), folded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> Path {
        Path::new(s)
    }

    #[test]
    fn set_get_remove_prunes() {
        let t = ImmutableTree::default().set(&p("a/b/c"), 1).set(&p("a"), 2);
        assert_eq!(t.get(&p("a/b/c")), Some(&1));
        assert_eq!(t.get(&p("a")), Some(&2));
        assert_eq!(t.get(&p("a/b")), None);
        let t2 = t.remove(&p("a/b/c"));
        assert!(t2.subtree(&p("a/b")).is_none());
        assert_eq!(t2.get(&p("a")), Some(&2));
        assert!(t2.remove(&p("a")).is_empty());
        assert_eq!(t.get(&p("a/b/c")), Some(&1));
    }

    #[test]
    fn root_most_value() {
        let t = ImmutableTree::default().set(&p("a/b"), "ab").set(&p("a/b/c/d"), "abcd");
        let (at, v) = t.find_root_most_value_and_path(&p("a/b/c/d/e")).unwrap();
        assert_eq!((at, *v), (p("a/b"), "ab"));
        assert!(t.find_root_most_value_and_path(&p("a/x")).is_none());
        let (at, _) = t
            .find_root_most_matching_path_and_value(&p("a/b/c/d"), |v| v.len() > 2)
            .unwrap();
        assert_eq!(at, p("a/b/c/d"));
    }

    #[test]
    fn foreach_on_path_excludes_target() {
        let t = ImmutableTree::default().set(&Path::root(), 0).set(&p("a"), 1).set(&p("a/b"), 2);
        let mut seen = Vec::new();
        t.foreach_on_path(&p("a/b"), |at, v| seen.push((at.to_string(), *v)));
        assert_eq!(seen, vec![("/".to_string(), 0), ("/a".to_string(), 1)]);
    }

    #[test]
    fn foreach_is_post_order() {
        let t = ImmutableTree::default().set(&p("a"), 1).set(&p("a/b"), 2).set(&p("c"), 3);
        let mut seen = Vec::new();
        t.foreach(|_, v| seen.push(*v));
        assert_eq!(seen, vec![2, 1, 3]);
    }

    #[test]
    fn get_mut_copies_on_write() {
        let original = ImmutableTree::default().set(&p("a/b"), 1);
        let mut copy = original.clone();
        *copy.get_mut(&p("a/b")).unwrap() = 5;
        assert_eq!(original.get(&p("a/b")), Some(&1));
        assert_eq!(copy.get(&p("a/b")), Some(&5));
    }

    #[test]
    fn get_or_insert_creates_path() {
        let mut t: ImmutableTree<i32> = ImmutableTree::default();
        *t.get_or_insert_with(&p("x/y"), || 1) += 1;
        assert_eq!(*t.get_or_insert_with(&p("x/y"), || 10), 2);
        assert_eq!(t.get(&p("x")), None);
    }

    #[test]
    fn fold_counts_values() {
        let t = ImmutableTree::default().set(&p("a"), 1).set(&p("a/b"), 2).set(&p("c/d"), 3);
        let total = t.fold(|_, v, kids| v.copied().unwrap_or(0) + kids.into_iter().map(|(_, n)| n).sum::<i32>());
        assert_eq!(total, 6);
    }
}
