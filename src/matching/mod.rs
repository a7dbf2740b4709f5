//! Header matchers and routing rules.
//!
//! A [`HeaderMatcher`] is a pure predicate over a request's [`HeaderSet`],
//! used to decide routing eligibility. Two variants exist:
//!
//! - [`HeaderMatcher::AnyOf`] — the named header is present and its value is
//!   one of a configured set (exact-match routing on a discrete value domain,
//!   e.g. tenant id).
//! - [`HeaderMatcher::AtLeast`] — at least `count` header entries satisfy an
//!   inner per-entry [`HeaderCondition`] ("at least N of these signals
//!   present").
//!
//! Matchers compose through [`RoutingTable`] configuration only: an ordered
//! list of [`RoutingRule`]s evaluated first-true-wins, each mapping to a
//! worker pool. Matching has no side effects.

use crate::protocol::HeaderSet;

/// A per-entry predicate, the inner condition of [`HeaderMatcher::AtLeast`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HeaderCondition {
    name: String,
    value: Option<String>,
}

impl HeaderCondition {
    /// Satisfied by any entry with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: None,
        }
    }

    /// Satisfied by an entry with the given name and exact value.
    pub fn equals(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: Some(value.into()),
        }
    }

    /// Evaluates the condition against a single header entry.
    pub fn matches_entry(&self, name: &str, value: &str) -> bool {
        name == self.name && self.value.as_deref().map_or(true, |v| v == value)
    }
}

/// A predicate over a request's header set.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeaderMatcher {
    /// True iff the named header is present and its value is in `values`.
    AnyOf {
        /// Header name to look up.
        name: String,
        /// Acceptable values.
        values: Vec<String>,
    },
    /// True iff at least `count` entries satisfy `condition`.
    /// `count == 0` is trivially true.
    AtLeast {
        /// Minimum number of satisfying entries.
        count: usize,
        /// The per-entry condition being counted.
        condition: HeaderCondition,
    },
}

impl HeaderMatcher {
    /// Builds an [`HeaderMatcher::AnyOf`] matcher.
    pub fn any_of(
        name: impl Into<String>,
        values: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::AnyOf {
            name: name.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds an [`HeaderMatcher::AtLeast`] matcher.
    pub fn at_least(count: usize, condition: HeaderCondition) -> Self {
        Self::AtLeast { count, condition }
    }

    /// Evaluates the predicate. Pure and side-effect-free.
    pub fn matches(&self, headers: &HeaderSet) -> bool {
        match self {
            HeaderMatcher::AnyOf { name, values } => headers
                .get_all(name)
                .any(|v| values.iter().any(|accepted| accepted == v)),
            HeaderMatcher::AtLeast { count, condition } => {
                headers
                    .iter()
                    .filter(|(k, v)| condition.matches_entry(k, v))
                    .count()
                    >= *count
            }
        }
    }
}

/// One routing rule: a matcher deciding eligibility and the pool it routes to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoutingRule {
    /// Rule name, for logs.
    pub name: String,
    /// The eligibility predicate.
    pub matcher: HeaderMatcher,
    /// Worker pool that matched requests are dispatched to.
    pub pool: String,
}

impl RoutingRule {
    /// Builds a rule.
    pub fn new(
        name: impl Into<String>,
        matcher: HeaderMatcher,
        pool: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            matcher,
            pool: pool.into(),
        }
    }
}

/// An ordered rule list with an optional default pool.
///
/// Rules are evaluated in configuration order, first-true-wins; a request
/// matching no rule falls through to the default pool, or is rejected when
/// none is configured.
#[derive(Clone, Debug, Default)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
    default_pool: Option<String>,
}

impl RoutingTable {
    /// Builds a table from ordered rules and an optional fallback pool.
    pub fn new(rules: Vec<RoutingRule>, default_pool: Option<String>) -> Self {
        Self {
            rules,
            default_pool,
        }
    }

    /// Resolves the target pool for a request, along with the matched rule
    /// name (`None` for the default pool).
    pub fn route(&self, headers: &HeaderSet) -> Option<(&str, Option<&str>)> {
        for rule in &self.rules {
            if rule.matcher.matches(headers) {
                return Some((rule.pool.as_str(), Some(rule.name.as_str())));
            }
        }
        self.default_pool.as_deref().map(|pool| (pool, None))
    }

    /// The configured rules, in evaluation order.
    pub fn rules(&self) -> &[RoutingRule] {
        &self.rules
    }
}
