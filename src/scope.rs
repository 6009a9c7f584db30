//! Scope validation and merging
//!
//! A scope is a string of whitespace-separated tokens, or the sentinel `*`
//! meaning "all scopes". Callers may never request the wildcard themselves;
//! it only ever appears on internal clients and subjects.

use std::collections::BTreeSet;

/// The "all scopes" sentinel.
pub const WILDCARD: &str = "*";

fn tokens(scope: &str) -> BTreeSet<&str> {
    scope.split_whitespace().collect()
}

fn intersect(a: &str, b: &str) -> String {
    let left = tokens(a);
    let right = tokens(b);
    left.intersection(&right)
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Validate a requested scope against a client's scope.
///
/// A wildcard client accepts anything except the wildcard itself; otherwise
/// every requested token must appear in the client's scope.
pub fn validate(client_scope: &str, requested: &str) -> bool {
    if requested.trim() == WILDCARD {
        return false;
    }
    if client_scope == WILDCARD {
        return true;
    }
    let allowed = tokens(client_scope);
    let requested = tokens(requested);
    !requested.is_empty() && requested.is_subset(&allowed)
}

/// Resolve the scope granted to an issued token.
///
/// `request_scope` must already have passed [`validate`]; an unvalidated
/// request scope makes the result meaningless and callers must treat it as a
/// protocol error upstream.
pub fn merge(subject_scope: &str, request_scope: Option<&str>, client_scope: &str) -> String {
    match request_scope {
        Some(requested) => {
            if requested == WILDCARD {
                subject_scope.to_string()
            } else if subject_scope == WILDCARD {
                requested.to_string()
            } else {
                intersect(subject_scope, requested)
            }
        }
        None => {
            if client_scope == WILDCARD {
                subject_scope.to_string()
            } else if subject_scope == WILDCARD {
                client_scope.to_string()
            } else {
                intersect(subject_scope, client_scope)
            }
        }
    }
}

/// True when every token of `narrow` appears in `wide`. A wildcard `wide`
/// covers everything.
pub fn is_subset(narrow: &str, wide: &str) -> bool {
    if wide == WILDCARD {
        return true;
    }
    tokens(narrow).is_subset(&tokens(wide))
}
