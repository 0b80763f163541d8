use crate::parse_count;

/// Values that count as "nothing found" for a fallback strategy.
pub trait Blank {
    fn is_blank(&self) -> bool;
}

impl Blank for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl Blank for u64 {
    fn is_blank(&self) -> bool {
        *self == 0
    }
}

pub type Strategy<C, V> = Box<dyn Fn(&C) -> Option<V> + Send + Sync>;

/// Ordered list of extraction strategies for one field.
///
/// Strategies run left to right; the first non-blank result wins.
pub struct FallbackChain<C, V> {
    strategies: Vec<Strategy<C, V>>,
}

impl<C, V: Blank> FallbackChain<C, V> {
    pub fn new() -> Self {
        Self {
            strategies: Vec::new(),
        }
    }

    pub fn then<F>(mut self, strategy: F) -> Self
    where
        F: Fn(&C) -> Option<V> + Send + Sync + 'static,
    {
        self.strategies.push(Box::new(strategy));
        self
    }

    pub fn resolve(&self, cursor: &C) -> Option<V> {
        self.strategies
            .iter()
            .filter_map(|strategy| strategy(cursor))
            .find(|value| !value.is_blank())
    }

    pub fn resolve_or_default(&self, cursor: &C) -> V
    where
        V: Default,
    {
        self.resolve(cursor).unwrap_or_default()
    }
}

impl<C> FallbackChain<C, String> {
    /// Trims every strategy result so blank padding never wins.
    pub fn then_text<F>(self, strategy: F) -> Self
    where
        F: Fn(&C) -> Option<String> + Send + Sync + 'static,
    {
        self.then(move |cursor| strategy(cursor).map(|s| s.trim().to_string()))
    }
}

impl<C> FallbackChain<C, u64> {
    /// Adds a strategy that reads a count string and parses it; a zero
    /// parse falls through to the next strategy.
    pub fn then_count<F>(self, strategy: F) -> Self
    where
        F: Fn(&C) -> Option<String> + Send + Sync + 'static,
    {
        self.then(move |cursor| strategy(cursor).map(|s| parse_count(&s)))
    }
}

impl<C, V: Blank> Default for FallbackChain<C, V> {
    fn default() -> Self {
        Self::new()
    }
}
