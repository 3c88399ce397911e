use serde_json::{Map, Value};

/// One step of a path from an object root down to a reference value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

/// A reference found in an object: the path to the reference value, the
/// reference property's name, and the identifier it currently holds.  The
/// path lets a caller replace the value with [`set_at_path`] without holding
/// a mutable handle into the object.
#[derive(Debug, Clone)]
pub struct RefSite {
    pub path: Vec<PathStep>,
    pub prop: String,
    pub id: String,
}

/// Find all reference properties of an object as (property name, id) pairs.
/// List-valued `_refs` properties yield one pair per element.
pub fn find_references(obj: &Map<String, Value>) -> Vec<(String, String)> {
    find_reference_sites(obj)
        .into_iter()
        .map(|site| (site.prop, site.id))
        .collect()
}

/// Find all reference properties of an object, with assignment paths.
pub fn find_reference_sites(obj: &Map<String, Value>) -> Vec<RefSite> {
    let mut sites = Vec::new();
    let is_observed_data = obj.get("type").and_then(Value::as_str) == Some("observed-data");

    for (prop, value) in obj {
        if prop.ends_with("_ref") {
            if let Some(id) = value.as_str() {
                sites.push(RefSite {
                    path: vec![PathStep::Key(prop.clone())],
                    prop: prop.clone(),
                    id: id.to_string(),
                });
            }
        } else if prop.ends_with("_refs") {
            if let Some(list) = value.as_array() {
                for (idx, entry) in list.iter().enumerate() {
                    if let Some(id) = entry.as_str() {
                        sites.push(RefSite {
                            path: vec![PathStep::Key(prop.clone()), PathStep::Index(idx)],
                            prop: prop.clone(),
                            id: id.to_string(),
                        });
                    }
                }
            }
        } else if !(is_observed_data && prop == "objects") {
            // The observed-data "objects" property holds an inner SCO graph
            // whose references must never be mixed with the outer graph.
            if let Value::Object(nested) = value {
                for mut site in find_reference_sites(nested) {
                    site.path.insert(0, PathStep::Key(prop.clone()));
                    sites.push(site);
                }
            }
        }
    }

    sites
}

/// Replace the value at the given path with `new_value`.  Returns false if
/// the path no longer resolves (e.g. the property was removed).
pub fn set_at_path(obj: &mut Map<String, Value>, path: &[PathStep], new_value: Value) -> bool {
    match path {
        [] => false,
        [PathStep::Key(key)] => {
            obj.insert(key.clone(), new_value);
            true
        }
        [PathStep::Key(key), rest @ ..] => match obj.get_mut(key) {
            Some(value) => set_in_value(value, rest, new_value),
            None => false,
        },
        [PathStep::Index(_), ..] => false,
    }
}

fn set_in_value(value: &mut Value, path: &[PathStep], new_value: Value) -> bool {
    match (path, value) {
        ([PathStep::Key(key)], Value::Object(map)) => {
            map.insert(key.clone(), new_value);
            true
        }
        ([PathStep::Index(idx)], Value::Array(list)) => match list.get_mut(*idx) {
            Some(slot) => {
                *slot = new_value;
                true
            }
            None => false,
        },
        ([PathStep::Key(key), rest @ ..], Value::Object(map)) => match map.get_mut(key) {
            Some(inner) => set_in_value(inner, rest, new_value),
            None => false,
        },
        ([PathStep::Index(idx), rest @ ..], Value::Array(list)) => match list.get_mut(*idx) {
            Some(inner) => set_in_value(inner, rest, new_value),
            None => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn as_map(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn finds_singular_list_and_nested_references() {
        let obj = as_map(json!({
            "type": "network-traffic",
            "src_ref": "ipv4-addr--1",
            "encapsulates_refs": ["network-traffic--2", "network-traffic--3"],
            "extensions": {"socket-ext": {"owner_ref": "user-account--4"}}
        }));

        let mut refs = find_references(&obj);
        refs.sort();
        assert_eq!(
            refs,
            vec![
                ("encapsulates_refs".to_string(), "network-traffic--2".to_string()),
                ("encapsulates_refs".to_string(), "network-traffic--3".to_string()),
                ("owner_ref".to_string(), "user-account--4".to_string()),
                ("src_ref".to_string(), "ipv4-addr--1".to_string()),
            ]
        );
    }

    #[test]
    fn observed_data_objects_subtree_is_skipped() {
        let obj = as_map(json!({
            "type": "observed-data",
            "object_refs": ["file--1"],
            "objects": {"0": {"inner_ref": "file--9"}}
        }));
        let refs = find_references(&obj);
        assert_eq!(refs, vec![("object_refs".to_string(), "file--1".to_string())]);
    }

    #[test]
    fn set_at_path_replaces_list_element() {
        let mut obj = as_map(json!({"contains_refs": ["file--1", "file--2"]}));
        let sites = find_reference_sites(&obj);
        assert_eq!(sites.len(), 2);

        assert!(set_at_path(&mut obj, &sites[1].path, json!("file--new")));
        assert_eq!(obj["contains_refs"][1], json!("file--new"));
    }
}
