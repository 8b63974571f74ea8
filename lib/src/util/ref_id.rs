use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::ops::Deref;

/// Handle into an arena whose identity is its address, not the data behind it
///
/// Class graph entries are arena allocated and never move during a run, so two handles are the
/// same class or method exactly when they point to the same allocation.
#[derive(Debug)]
pub struct RefId<'a, T>(pub &'a T);

impl<'a, T> RefId<'a, T> {
    fn address(self) -> *const T {
        self.0
    }
}

impl<'a, T> Clone for RefId<'a, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, T> Copy for RefId<'a, T> {}

impl<'a, T> Hash for RefId<'a, T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address().hash(state)
    }
}

impl<'a, T> PartialEq for RefId<'a, T> {
    fn eq(&self, other: &Self) -> bool {
        self.address() == other.address()
    }
}

impl<'a, T> Eq for RefId<'a, T> {}

impl<'a, T> PartialOrd for RefId<'a, T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a, T> Ord for RefId<'a, T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.address().cmp(&other.address())
    }
}

impl<'a, T> Deref for RefId<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn identity_ignores_contents() {
        let first = String::from("java/lang/Object");
        let second = first.clone();
        assert_ne!(RefId(&first), RefId(&second));
        assert_eq!(RefId(&first), RefId(&first));
        assert_eq!(RefId(&second).len(), 16);
    }
}
