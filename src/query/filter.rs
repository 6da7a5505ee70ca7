// src/query/filter.rs
//
// Predicates and set-based mutations over an entity type.

use std::fmt;
use std::sync::Arc;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T) + Send + Sync>;

/// A predicate selecting entities of type `T`.
pub struct Filter<T> {
    predicate: Predicate<T>,
}

impl<T: 'static> Filter<T> {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// A filter matching every entity.
    pub fn all() -> Self {
        Self::new(|_| true)
    }

    pub fn and(self, other: Filter<T>) -> Self {
        Self::new(move |entity| self.matches(entity) && other.matches(entity))
    }

    pub fn or(self, other: Filter<T>) -> Self {
        Self::new(move |entity| self.matches(entity) || other.matches(entity))
    }

    pub fn negate(self) -> Self {
        Self::new(move |entity| !self.matches(entity))
    }
}

impl<T> Filter<T> {
    pub fn matches(&self, entity: &T) -> bool {
        (self.predicate)(entity)
    }
}

impl<T> Clone for Filter<T> {
    fn clone(&self) -> Self {
        Self {
            predicate: Arc::clone(&self.predicate),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filter(..)")
    }
}

/// Property assignments applied by a set-based update.
///
/// ```ignore
/// let mutation = Mutation::new()
///     .set(|w: &mut Widget| w.price_cents = 0)
///     .set(|w: &mut Widget| w.discontinued = true);
/// ```
pub struct Mutation<T> {
    setters: Vec<Setter<T>>,
}

impl<T> Mutation<T> {
    pub fn new() -> Self {
        Self {
            setters: Vec::new(),
        }
    }

    pub fn set<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut T) + Send + Sync + 'static,
    {
        self.setters.push(Arc::new(setter));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.setters.is_empty()
    }

    pub fn len(&self) -> usize {
        self.setters.len()
    }

    /// Apply every setter in declaration order.
    pub fn apply(&self, target: &mut T) {
        for setter in &self.setters {
            setter(target);
        }
    }
}

impl<T> Default for Mutation<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Mutation<T> {
    fn clone(&self) -> Self {
        Self {
            setters: self.setters.clone(),
        }
    }
}

impl<T> fmt::Debug for Mutation<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mutation")
            .field("setters", &self.setters.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_combinators() {
        let even = Filter::new(|n: &i32| n % 2 == 0);
        let positive = Filter::new(|n: &i32| *n > 0);

        let both = even.clone().and(positive.clone());
        assert!(both.matches(&4));
        assert!(!both.matches(&-4));
        assert!(!both.matches(&3));

        let either = even.clone().or(positive);
        assert!(either.matches(&-4));
        assert!(either.matches(&3));
        assert!(!either.matches(&-3));

        let odd = even.negate();
        assert!(odd.matches(&3));
        assert!(Filter::<i32>::all().matches(&-7));
    }

    // Callers generic over any `T` (no `'static` bound) can still evaluate.
    fn count_matching<T>(rows: &[T], filter: &Filter<T>) -> usize {
        rows.iter().filter(|row| filter.matches(row)).count()
    }

    #[test]
    fn test_matches_is_usable_from_unbounded_generics() {
        let long = Filter::new(|s: &String| s.len() > 3);
        let rows = vec!["gear".to_string(), "nut".to_string(), "bolts".to_string()];
        assert_eq!(count_matching(&rows, &long), 2);
    }

    #[test]
    fn test_mutation_applies_setters_in_order() {
        let mutation = Mutation::new().set(|s: &mut String| s.push('a')).set(|s: &mut String| s.push('b'));
        let mut value = String::new();
        mutation.apply(&mut value);

        assert_eq!(value, "ab");
        assert_eq!(mutation.len(), 2);
        assert!(Mutation::<String>::new().is_empty());
    }
}
