use std::{collections::BTreeMap, fmt};

///
/// ErrorTree
///
/// Accumulates validation messages by route (`models.Images.relations.Tags`)
/// so that one pass reports every problem instead of the first.
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorTree {
    messages: Vec<String>,
    children: BTreeMap<String, Self>,
}

impl ErrorTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message at this level.
    pub fn add(&mut self, message: impl ToString) {
        self.messages.push(message.to_string());
    }

    /// Record a message under a child route.
    pub fn add_for(&mut self, route: &str, message: impl ToString) {
        self.children
            .entry(route.to_string())
            .or_default()
            .add(message);
    }

    /// Attach another tree under `route`; empty trees are dropped.
    pub fn merge_for(&mut self, route: &str, other: Self) {
        if other.is_empty() {
            return;
        }
        let child = self.children.entry(route.to_string()).or_default();
        child.messages.extend(other.messages);
        for (key, tree) in other.children {
            child.merge_for(&key, tree);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.children.values().all(Self::is_empty)
    }

    /// Total number of messages, including every child route.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len() + self.children.values().map(Self::len).sum::<usize>()
    }

    /// `(route, message)` pairs in route order; routes are dot-joined.
    #[must_use]
    pub fn flatten(&self) -> Vec<(String, String)> {
        let mut out = Vec::with_capacity(self.len());
        self.flatten_into("", &mut out);

        out
    }

    fn flatten_into(&self, prefix: &str, out: &mut Vec<(String, String)>) {
        for message in &self.messages {
            out.push((prefix.to_string(), message.clone()));
        }
        for (key, child) in &self.children {
            let route = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            child.flatten_into(&route, out);
        }
    }

    /// `Ok(())` when nothing was recorded.
    pub fn result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ErrorTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (route, message)) in self.flatten().into_iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            if route.is_empty() {
                write!(f, "{message}")?;
            } else {
                write!(f, "{route}: {message}")?;
            }
        }

        Ok(())
    }
}

impl std::error::Error for ErrorTree {}

/// Push a formatted message onto an [`ErrorTree`].
#[macro_export]
macro_rules! err {
    ($errs:expr, $($arg:tt)*) => {
        $errs.add(format!($($arg)*))
    };
}

///
/// TESTS
///
