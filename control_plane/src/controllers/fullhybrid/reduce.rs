use itertools::Itertools;
use ko_api::conditions::{Condition, is_condition_true};
use ko_api::constants::PROGRAMMED_CONDITION;
use kube::api::DynamicObject;

pub type ReduceFn = fn(&[DynamicObject]) -> Vec<DynamicObject>;

fn is_programmed(object: &DynamicObject) -> bool {
    object
        .data
        .get("status")
        .and_then(|status| status.get("conditions"))
        .and_then(|conditions| serde_json::from_value::<Vec<Condition>>(conditions.clone()).ok())
        .is_some_and(|conditions| is_condition_true(&conditions, PROGRAMMED_CONDITION))
}

fn same_object(a: &DynamicObject, b: &DynamicObject) -> bool {
    a.metadata.uid == b.metadata.uid && a.metadata.name == b.metadata.name
}

/// Deletes every candidate that is not `Programmed`, unless none of them are.
pub fn keep_programmed(candidates: &[DynamicObject]) -> Vec<DynamicObject> {
    let (programmed, rest): (Vec<_>, Vec<_>) =
        candidates.iter().partition(|object| is_programmed(object));
    if programmed.is_empty() {
        return vec![];
    }
    rest.into_iter().cloned().collect()
}

/// Keeps the most recently created candidate. Equal timestamps fall back to
/// the greatest name so the outcome does not depend on list order.
pub fn keep_youngest(candidates: &[DynamicObject]) -> Vec<DynamicObject> {
    let Some(youngest) = candidates.iter().position_max_by(|a, b| {
        (&a.metadata.creation_timestamp, &a.metadata.name)
            .cmp(&(&b.metadata.creation_timestamp, &b.metadata.name))
    }) else {
        return vec![];
    };

    candidates
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != youngest)
        .map(|(_, object)| object.clone())
        .collect()
}

/// Runs `reducers` over `candidates` and returns everything they marked for
/// deletion.
pub fn apply_reducers(
    candidates: Vec<DynamicObject>,
    reducers: &[ReduceFn],
) -> Vec<DynamicObject> {
    let mut survivors = candidates;
    let mut to_delete = vec![];

    for reduce in reducers {
        if survivors.len() <= 1 {
            break;
        }
        let doomed = reduce(&survivors);
        survivors.retain(|object| !doomed.iter().any(|d| same_object(d, object)));
        to_delete.extend(doomed);
    }

    to_delete
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn candidate(name: &str, created: &str, programmed: Option<&str>) -> DynamicObject {
        let mut object = json!({
            "apiVersion": "configuration.konghq.com/v1alpha1",
            "kind": "KongService",
            "metadata": {
                "name": name,
                "namespace": "default",
                "uid": format!("uid-{name}"),
                "creationTimestamp": created
            },
            "spec": { "host": "echo.default.svc.cluster.local", "port": 80 }
        });
        if let Some(status) = programmed {
            object["status"] = json!({
                "conditions": [{ "type": "Programmed", "status": status }]
            });
        }
        serde_json::from_value(object).expect("valid candidate")
    }

    fn names(objects: &[DynamicObject]) -> Vec<String> {
        objects
            .iter()
            .filter_map(|object| object.metadata.name.clone())
            .sorted()
            .collect()
    }

    fn kong_service_reducers() -> Vec<ReduceFn> {
        vec![keep_programmed, keep_youngest]
    }

    #[rstest]
    #[case(vec!["a", "b", "c"])]
    #[case(vec!["c", "a", "b"])]
    #[case(vec!["b", "c", "a"])]
    fn test_programmed_candidate_survives_in_any_order(#[case] order: Vec<&str>) {
        let all = [
            candidate("a", "2024-01-01T00:00:01Z", None),
            candidate("b", "2024-01-01T00:00:02Z", Some("True")),
            candidate("c", "2024-01-01T00:00:03Z", Some("False")),
        ];
        let candidates: Vec<_> = order
            .iter()
            .filter_map(|name| {
                all.iter()
                    .find(|object| object.metadata.name.as_deref() == Some(*name))
                    .cloned()
            })
            .collect();

        let deleted = apply_reducers(candidates, &kong_service_reducers());

        assert_eq!(names(&deleted), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_youngest_survives_without_programmed() {
        let candidates = vec![
            candidate("new", "2024-01-01T00:00:09Z", None),
            candidate("old", "2024-01-01T00:00:01Z", Some("False")),
            candidate("mid", "2024-01-01T00:00:05Z", None),
        ];

        let deleted = apply_reducers(candidates, &kong_service_reducers());

        assert_eq!(names(&deleted), vec!["mid".to_string(), "old".to_string()]);
    }

    #[test]
    fn test_youngest_of_several_programmed_survives() {
        let candidates = vec![
            candidate("a", "2024-01-01T00:00:01Z", Some("True")),
            candidate("b", "2024-01-01T00:00:02Z", Some("True")),
            candidate("c", "2024-01-01T00:00:03Z", None),
        ];

        let deleted = apply_reducers(candidates, &kong_service_reducers());

        assert_eq!(names(&deleted), vec!["a".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_keep_youngest_breaks_ties_by_name() {
        let candidates = vec![
            candidate("b", "2024-01-01T00:00:01Z", None),
            candidate("a", "2024-01-01T00:00:01Z", None),
        ];

        assert_eq!(names(&keep_youngest(&candidates)), vec!["a".to_string()]);
    }

    #[test]
    fn test_keep_programmed_deletes_nothing_without_programmed() {
        let candidates = vec![
            candidate("a", "2024-01-01T00:00:01Z", None),
            candidate("b", "2024-01-01T00:00:02Z", Some("Unknown")),
        ];

        assert!(keep_programmed(&candidates).is_empty());
    }

    #[test]
    fn test_single_candidate_is_never_reduced() {
        let candidates = vec![candidate("a", "2024-01-01T00:00:01Z", None)];
        assert!(apply_reducers(candidates, &kong_service_reducers()).is_empty());
    }
}
