//! Composable event filters.
//!
//! Filters are boolean predicates over an [`Event`], combined with
//! [`EventFilter::and`], [`EventFilter::or`], and [`EventFilter::negate`].

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::Event;

/// A composable predicate over events.
#[derive(Debug, Clone)]
pub enum EventFilter {
    /// Matches events whose type is one of the listed types.
    Types(Vec<String>),
    /// Matches events from a particular agent. A `None` field matches any
    /// value.
    Agent {
        /// Required agent id.
        id: Option<Uuid>,
        /// Required agent name.
        name: Option<String>,
    },
    /// Matches events with the error flag set.
    Errors,
    /// Matches events within a time window. Bounds are inclusive; `None`
    /// leaves the side open.
    Time {
        /// Events at or after this instant.
        after: Option<DateTime<Utc>>,
        /// Events at or before this instant.
        before: Option<DateTime<Utc>>,
    },
    /// All inner filters must match.
    All(Vec<EventFilter>),
    /// At least one inner filter must match.
    Any(Vec<EventFilter>),
    /// The inner filter must not match.
    Not(Box<EventFilter>),
}

impl EventFilter {
    /// Filter on a set of event types.
    #[must_use]
    pub fn types<I, S>(types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Types(types.into_iter().map(Into::into).collect())
    }

    /// Filter on agent id and/or name.
    #[must_use]
    pub fn agent(id: Option<Uuid>, name: Option<&str>) -> Self {
        Self::Agent {
            id,
            name: name.map(String::from),
        }
    }

    /// Filter on the error flag.
    #[must_use]
    pub const fn errors() -> Self {
        Self::Errors
    }

    /// Filter on a time window.
    #[must_use]
    pub const fn time(after: Option<DateTime<Utc>>, before: Option<DateTime<Utc>>) -> Self {
        Self::Time { after, before }
    }

    /// Combine with another filter; both must match.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match self {
            Self::All(mut filters) => {
                filters.push(other);
                Self::All(filters)
            }
            first => Self::All(vec![first, other]),
        }
    }

    /// Combine with another filter; either may match.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match self {
            Self::Any(mut filters) => {
                filters.push(other);
                Self::Any(filters)
            }
            first => Self::Any(vec![first, other]),
        }
    }

    /// Invert the filter.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }

    /// Evaluate the filter against an event.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            Self::Types(types) => types.iter().any(|t| *t == event.event_type),
            Self::Agent { id, name } => {
                id.is_none_or(|id| id == event.agent_id)
                    && name.as_deref().is_none_or(|n| n == event.agent_name)
            }
            Self::Errors => event.is_error,
            Self::Time { after, before } => {
                after.is_none_or(|a| event.timestamp >= a)
                    && before.is_none_or(|b| event.timestamp <= b)
            }
            Self::All(filters) => filters.iter().all(|f| f.matches(event)),
            Self::Any(filters) => filters.iter().any(|f| f.matches(event)),
            Self::Not(filter) => !filter.matches(event),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentIdentity, AgentKind};
    use crate::error::AgentError;
    use chrono::Duration;

    fn identity() -> AgentIdentity {
        AgentIdentity::new("worker", AgentKind::Llm)
    }

    #[test]
    fn type_filter_matches_listed_types() {
        let filter = EventFilter::types(["agent.start", "agent.complete"]);
        let id = identity();
        assert!(filter.matches(&Event::agent_start(&id)));
        assert!(filter.matches(&Event::agent_complete(&id)));
        assert!(!filter.matches(&Event::message(&id, "hi")));
    }

    #[test]
    fn agent_filter_matches_by_name_or_id() {
        let id = identity();
        let event = Event::agent_start(&id);

        assert!(EventFilter::agent(Some(id.id), None).matches(&event));
        assert!(EventFilter::agent(None, Some("worker")).matches(&event));
        assert!(!EventFilter::agent(None, Some("other")).matches(&event));
        assert!(!EventFilter::agent(Some(uuid::Uuid::new_v4()), Some("worker")).matches(&event));
    }

    #[test]
    fn error_filter_matches_only_errors() {
        let id = identity();
        let filter = EventFilter::errors();
        assert!(filter.matches(&Event::agent_error(&id, &AgentError::provider("x"))));
        assert!(!filter.matches(&Event::agent_start(&id)));
    }

    #[test]
    fn time_filter_bounds_are_inclusive() {
        let id = identity();
        let event = Event::agent_start(&id);
        let at = event.timestamp;

        assert!(EventFilter::time(Some(at), Some(at)).matches(&event));
        assert!(!EventFilter::time(Some(at + Duration::seconds(1)), None).matches(&event));
        assert!(!EventFilter::time(None, Some(at - Duration::seconds(1))).matches(&event));
    }

    #[test]
    fn combinators_compose() {
        let id = identity();
        let error_event = Event::agent_error(&id, &AgentError::provider("x"));
        let start_event = Event::agent_start(&id);

        let filter = EventFilter::agent(None, Some("worker"))
            .and(EventFilter::errors());
        assert!(filter.matches(&error_event));
        assert!(!filter.matches(&start_event));

        let either = EventFilter::types(["agent.start"]).or(EventFilter::errors());
        assert!(either.matches(&start_event));
        assert!(either.matches(&error_event));

        let negated = EventFilter::errors().negate();
        assert!(negated.matches(&start_event));
        assert!(!negated.matches(&error_event));
    }
}
