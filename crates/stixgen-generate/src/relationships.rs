use std::collections::HashMap;
use std::sync::LazyLock;

/// One legal SRO edge: source type, relationship type, target type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    pub src_type: &'static str,
    pub rel_type: &'static str,
    pub target_type: &'static str,
}

// Summary of defined SROs: how STIX types are allowed to relate to each
// other, and via which relationship types.  Maps a relationship source type
// to relationship types to legal target types, which keeps source and
// relationship types unrepeated.  "related-to" is omitted; the STIX
// generator special-cases it as the universal fallback.
static RELATIONSHIPS: &[(&str, &[(&str, &[&str])])] = &[
    (
        "attack-pattern",
        &[
            ("delivers", &["malware"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["malware", "tool"]),
        ],
    ),
    (
        "campaign",
        &[
            ("attributed-to", &["intrusion-set", "threat-actor"]),
            ("compromises", &["infrastructure"]),
            ("originates-from", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
        ],
    ),
    (
        "course-of-action",
        &[
            ("investigates", &["indicator"]),
            (
                "mitigates",
                &["attack-pattern", "indicator", "malware", "tool", "vulnerability"],
            ),
        ],
    ),
    ("identity", &[("located-at", &["location"])]),
    (
        "indicator",
        &[
            (
                "indicates",
                &[
                    "attack-pattern",
                    "campaign",
                    "infrastructure",
                    "intrusion-set",
                    "malware",
                    "threat-actor",
                    "tool",
                ],
            ),
            ("based-on", &["observed-data"]),
        ],
    ),
    (
        "infrastructure",
        &[
            (
                "communicates-with",
                &["infrastructure", "ipv4-addr", "ipv6-addr", "domain-name", "url"],
            ),
            (
                "consists-of",
                &[
                    "infrastructure",
                    "observed-data",
                    // all generatable SCO types
                    "artifact",
                    "autonomous-system",
                    "directory",
                    "domain-name",
                    "email-addr",
                    "email-message",
                    "file",
                    "ipv4-addr",
                    "ipv6-addr",
                    "mac-addr",
                    "mutex",
                    "network-traffic",
                    "process",
                    "software",
                    "url",
                    "user-account",
                    "windows-registry-key",
                    "x509-certificate",
                ],
            ),
            ("controls", &["infrastructure", "malware"]),
            ("delivers", &["malware"]),
            ("has", &["vulnerability"]),
            ("hosts", &["tool", "malware"]),
            ("located-at", &["location"]),
            ("uses", &["infrastructure"]),
        ],
    ),
    (
        "intrusion-set",
        &[
            ("attributed-to", &["threat-actor"]),
            ("compromises", &["infrastructure"]),
            ("hosts", &["infrastructure"]),
            ("owns", &["infrastructure"]),
            ("originates-from", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
        ],
    ),
    (
        "malware",
        &[
            ("authored-by", &["threat-actor", "intrusion-set"]),
            ("beacons-to", &["infrastructure"]),
            ("exfiltrate-to", &["infrastructure"]),
            ("communicates-with", &["ipv4-addr", "ipv6-addr", "domain-name", "url"]),
            ("controls", &["malware"]),
            ("downloads", &["malware", "tool", "file"]),
            ("drops", &["malware", "tool", "file"]),
            ("exploits", &["vulnerability"]),
            ("originates-from", &["location"]),
            ("targets", &["identity", "infrastructure", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
            ("variant-of", &["malware"]),
        ],
    ),
    (
        "malware-analysis",
        &[
            ("characterizes", &["malware"]),
            ("analysis-of", &["malware"]),
            ("static-analysis-of", &["malware"]),
            ("dynamic-analysis-of", &["malware"]),
        ],
    ),
    (
        "threat-actor",
        &[
            ("attributed-to", &["identity"]),
            ("compromises", &["infrastructure"]),
            ("hosts", &["infrastructure"]),
            ("owns", &["infrastructure"]),
            ("impersonates", &["identity"]),
            ("located-at", &["location"]),
            ("targets", &["identity", "location", "vulnerability"]),
            ("uses", &["attack-pattern", "infrastructure", "malware", "tool"]),
        ],
    ),
    (
        "tool",
        &[
            ("delivers", &["malware"]),
            ("drops", &["malware"]),
            ("has", &["vulnerability"]),
            ("targets", &["identity", "infrastructure", "location", "vulnerability"]),
        ],
    ),
];

// Every source type also gets derived-from and duplicate-of edges to its
// own type; adding them programmatically keeps the table above terse.
const COMMON_SELF_RELATIONSHIPS: &[&str] = &["derived-from", "duplicate-of"];

/// Edges indexed by the type of the node they can connect to, at either
/// end.  A self-edge (equal endpoint types) is indexed once per endpoint
/// role, matching how mixed-type edges weight their two endpoints.
static RELATIONSHIPS_BY_ENDPOINT_TYPE: LazyLock<HashMap<&'static str, Vec<Relationship>>> =
    LazyLock::new(|| {
        let mut index: HashMap<&'static str, Vec<Relationship>> = HashMap::new();
        let mut add = |endpoint: &'static str, rel: Relationship| {
            index.entry(endpoint).or_default().push(rel);
        };

        for &(src_type, rel_info) in RELATIONSHIPS {
            for &(rel_type, target_types) in rel_info {
                for &target_type in target_types {
                    let rel = Relationship {
                        src_type,
                        rel_type,
                        target_type,
                    };
                    add(src_type, rel);
                    add(target_type, rel);
                }
            }
            for &rel_type in COMMON_SELF_RELATIONSHIPS {
                let rel = Relationship {
                    src_type,
                    rel_type,
                    target_type: src_type,
                };
                add(src_type, rel);
                add(src_type, rel);
            }
        }

        index
    });

/// All edges that can connect a node of the given type, at either end.
pub fn relationships_for_endpoint(endpoint_type: &str) -> &'static [Relationship] {
    RELATIONSHIPS_BY_ENDPOINT_TYPE
        .get(endpoint_type)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_index_covers_both_roles() {
        let for_location = relationships_for_endpoint("location");
        assert!(!for_location.is_empty());
        // location never appears as a source in the table
        assert!(for_location.iter().all(|rel| rel.target_type == "location"));

        let for_malware = relationships_for_endpoint("malware");
        assert!(for_malware.iter().any(|rel| rel.src_type == "malware"));
        assert!(for_malware.iter().any(|rel| rel.target_type == "malware"));
    }

    #[test]
    fn common_self_relationships_are_added() {
        let for_tool = relationships_for_endpoint("tool");
        assert!(
            for_tool
                .iter()
                .any(|rel| rel.rel_type == "derived-from" && rel.target_type == "tool")
        );
    }

    #[test]
    fn unknown_types_have_no_edges() {
        // x509-certificate appears only in infrastructure consists-of
        assert!(!relationships_for_endpoint("x509-certificate").is_empty());
        assert!(relationships_for_endpoint("sighting").is_empty());
    }
}
