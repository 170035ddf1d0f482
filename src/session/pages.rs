use crate::error::{BotError, Result};

/// Pages in creation order with a pointer to the active one
#[derive(Debug, Clone)]
pub struct PageStack<P> {
    pages: Vec<P>,
    current: Option<usize>,
}

impl<P> PageStack<P> {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            current: None,
        }
    }

    /// Add a page and make it current
    pub fn push(&mut self, page: P) -> &P {
        self.pages.push(page);
        let index = self.pages.len() - 1;
        self.current = Some(index);
        &self.pages[index]
    }

    /// The active page, falling back to the most recent one
    pub fn current(&self) -> Option<&P> {
        self.current
            .and_then(|i| self.pages.get(i))
            .or_else(|| self.pages.last())
    }

    pub fn current_index(&self) -> Option<usize> {
        match self.current {
            Some(i) if i < self.pages.len() => Some(i),
            _ => self.pages.len().checked_sub(1),
        }
    }

    /// Make the page at `index` current; negative indices count from the end
    pub fn select(&mut self, index: i64) -> Result<&P> {
        let len = self.pages.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        if resolved < 0 || resolved >= len {
            return Err(BotError::Resolution(format!(
                "page index {} out of range ({} page(s) open)",
                index, len
            )));
        }
        let resolved = resolved as usize;
        self.current = Some(resolved);
        Ok(&self.pages[resolved])
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &P> {
        self.pages.iter()
    }
}

impl<P> Default for PageStack<P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_makes_current() {
        let mut pages = PageStack::new();
        assert!(pages.current().is_none());
        pages.push("a");
        pages.push("b");
        assert_eq!(pages.current(), Some(&"b"));
        assert_eq!(pages.current_index(), Some(1));
    }

    #[test]
    fn test_select_with_negative_index() {
        let mut pages = PageStack::new();
        for p in ["a", "b", "c"] {
            pages.push(p);
        }
        assert_eq!(pages.select(0).unwrap(), &"a");
        assert_eq!(pages.current(), Some(&"a"));
        assert_eq!(pages.select(-1).unwrap(), &"c");
        assert_eq!(pages.select(-3).unwrap(), &"a");
    }

    #[test]
    fn test_select_out_of_range() {
        let mut pages = PageStack::new();
        pages.push("a");
        assert!(matches!(pages.select(1), Err(BotError::Resolution(_))));
        assert!(matches!(pages.select(-2), Err(BotError::Resolution(_))));
        // Current page unchanged after a bad select
        assert_eq!(pages.current(), Some(&"a"));

        let mut empty: PageStack<&str> = PageStack::new();
        assert!(empty.select(-1).is_err());
    }
}
