use crate::controllers::fullhybrid::refs::ResolvedParent;
use itertools::Itertools;

fn is_wildcard(hostname: &str) -> bool {
    hostname.starts_with("*.")
}

/// `*.example.com` matches any hostname with at least one more label in front
/// of `.example.com`.
fn wildcard_matches(wildcard: &str, hostname: &str) -> bool {
    let suffix = &wildcard[1..];
    hostname.len() > suffix.len() && hostname.ends_with(suffix)
}

fn intersect(listener: &str, route: &str) -> Option<String> {
    match (is_wildcard(listener), is_wildcard(route)) {
        (false, false) => (listener == route).then(|| route.to_string()),
        (true, false) => wildcard_matches(listener, route).then(|| route.to_string()),
        (false, true) => wildcard_matches(route, listener).then(|| listener.to_string()),
        (true, true) => {
            let (longer, shorter) = if listener.len() >= route.len() {
                (listener, route)
            } else {
                (route, listener)
            };
            (longer == shorter || wildcard_matches(shorter, &longer[2..]))
                .then(|| longer.to_string())
        }
    }
}

/// Hostnames a route is served under through one listener. An unset or empty
/// value on either side does not constrain the other; when neither side
/// constrains, `fallback` is used. A wildcard cannot address an upstream, so
/// a wildcard result is replaced by `fallback` too.
fn listener_hostnames(
    listener: Option<&str>,
    route_hostnames: &[String],
    fallback: &str,
) -> Vec<String> {
    let hostnames = match (listener.filter(|h| !h.is_empty()), route_hostnames.is_empty()) {
        (None, true) => vec![fallback.to_string()],
        (None, false) => route_hostnames.to_vec(),
        (Some(listener), true) => vec![listener.to_string()],
        (Some(listener), false) => route_hostnames
            .iter()
            .filter_map(|route| intersect(listener, route))
            .collect(),
    };

    hostnames
        .into_iter()
        .map(|hostname| {
            if is_wildcard(&hostname) {
                fallback.to_string()
            } else {
                hostname
            }
        })
        .collect()
}

/// Hostnames across every listener the route attaches to, sorted and without
/// repeats. A route with no resolvable parent is treated as attached to an
/// unconstrained listener.
pub fn resolve_hostnames(
    parents: &[ResolvedParent],
    route_hostnames: &[String],
    fallback: &str,
) -> Vec<String> {
    if parents.is_empty() {
        return listener_hostnames(None, route_hostnames, fallback);
    }

    parents
        .iter()
        .flat_map(|parent| {
            parent
                .gateway
                .spec
                .listeners
                .iter()
                .filter(|listener| {
                    parent
                        .section_name
                        .as_deref()
                        .is_none_or(|section| section == listener.name)
                })
                .flat_map(|listener| {
                    listener_hostnames(listener.hostname.as_deref(), route_hostnames, fallback)
                })
                .collect_vec()
        })
        .sorted()
        .dedup()
        .collect()
}
