use fake::Fake;
use fake::faker::company::en::CompanyName;
use fake::faker::filesystem::en::FileName;
use fake::faker::internet::en::{FreeEmail, IPv4, IPv6, MACAddress, Username};
use fake::faker::lorem::en::{Sentence, Word, Words};
use fake::faker::name::en::{FirstName, LastName, Name};
use rand::RngCore;
use rand::seq::IndexedRandom;
use serde_json::{Map, Value};

use stixgen_core::error::ErrorKind;
use stixgen_core::{Result, SEMANTIC_PROPERTY_NAME, ValueConstraint};

use crate::object::ObjectGenerator;
use crate::semantics::SemanticsProvider;

const SEMANTICS: &[&str] = &[
    "name",
    "first-name",
    "last-name",
    "user-name",
    "free-email",
    "word",
    "words",
    "sentence",
    "company-name",
    "domain",
    "url",
    "ipv4",
    "ipv6",
    "mac-address",
    "file-name",
];

const TLDS: &[&str] = &["com", "net", "org", "io"];

/// Fake-data semantics backed by the `fake` crate.  Extra spec properties
/// are consumed as arguments where a semantic takes any (e.g. "count" for
/// `words`).
#[derive(Default)]
pub struct FakerSemantics;

impl FakerSemantics {
    pub fn new() -> Self {
        Self
    }
}

impl SemanticsProvider for FakerSemantics {
    fn semantics(&self) -> Vec<&'static str> {
        SEMANTICS.to_vec()
    }

    fn create_semantic(
        &self,
        spec: &Map<String, Value>,
        _generator: &ObjectGenerator,
        _constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let name = spec
            .get(SEMANTIC_PROPERTY_NAME)
            .and_then(Value::as_str)
            .unwrap_or_default();

        let value = match name {
            "name" => Value::String(Name().fake_with_rng(rng)),
            "first-name" => Value::String(FirstName().fake_with_rng(rng)),
            "last-name" => Value::String(LastName().fake_with_rng(rng)),
            "user-name" => Value::String(Username().fake_with_rng(rng)),
            "free-email" => Value::String(FreeEmail().fake_with_rng(rng)),
            "word" => Value::String(Word().fake_with_rng(rng)),
            "words" => {
                let count = spec.get("count").and_then(Value::as_u64).unwrap_or(3) as usize;
                let words: Vec<String> = Words(count..count + 1).fake_with_rng(rng);
                Value::Array(words.into_iter().map(Value::String).collect())
            }
            "sentence" => Value::String(Sentence(4..10).fake_with_rng(rng)),
            "company-name" => Value::String(CompanyName().fake_with_rng(rng)),
            "domain" => Value::String(random_domain(rng)),
            "url" => {
                let path: String = Word().fake_with_rng(rng);
                Value::String(format!("https://{}/{path}", random_domain(rng)))
            }
            "ipv4" => Value::String(IPv4().fake_with_rng(rng)),
            "ipv6" => Value::String(IPv6().fake_with_rng(rng)),
            "mac-address" => Value::String(MACAddress().fake_with_rng(rng)),
            "file-name" => Value::String(FileName().fake_with_rng(rng)),
            other => return Err(ErrorKind::UnknownSemantic(other.to_string()).into()),
        };

        Ok(value)
    }
}

fn random_domain(rng: &mut dyn RngCore) -> String {
    let word: String = Word().fake_with_rng(rng);
    let tld = TLDS.choose(rng).copied().unwrap_or("com");
    format!("{}.{tld}", word.to_lowercase())
}
