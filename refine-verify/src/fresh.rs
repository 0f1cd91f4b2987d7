#![forbid(unsafe_code)]

use std::collections::BTreeMap;

/// Run-wide fresh name supply: `_<tag><n>`, one counter per tag.
#[derive(Clone, Debug, Default)]
pub struct FreshNames {
    next: BTreeMap<char, usize>,
}

impl FreshNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, tag: char) -> String {
        let counter = self.next.entry(tag).or_insert(0);
        let name = format!("_{tag}{counter}");
        *counter += 1;
        name
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn counters_are_per_tag() {
        let mut names = FreshNames::new();
        assert_eq!(names.next('i'), "_i0");
        assert_eq!(names.next('i'), "_i1");
        assert_eq!(names.next('b'), "_b0");
        assert_eq!(names.next('i'), "_i2");
        assert_eq!(names.next('a'), "_a0");
    }

    proptest! {
        #[test]
        fn nth_request_gets_index_n(tags in prop::collection::vec(prop::sample::select(vec!['i', 'b', 'a', 'p']), 0..64)) {
            let mut names = FreshNames::new();
            let mut seen = std::collections::BTreeSet::new();
            let mut expected: BTreeMap<char, usize> = BTreeMap::new();
            for tag in tags {
                let n = expected.entry(tag).or_insert(0);
                let name = names.next(tag);
                prop_assert_eq!(&name, &format!("_{tag}{n}"));
                prop_assert!(seen.insert(name));
                *n += 1;
            }
        }
    }
}
