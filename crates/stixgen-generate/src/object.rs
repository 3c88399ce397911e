use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};
use serde_json::{Map, Value};
use tracing::warn;

use stixgen_core::error::ErrorKind;
use stixgen_core::spec::string_array;
use stixgen_core::{
    GenerationError, JsonType, PresenceCoconstraint, PresenceMode, Result, SpecRegistry,
    SpecShape, ValueCoconstraint, ValueConstraint, classify, is_ref_prop, spec_type,
};

use crate::config::ObjectGeneratorConfig;
use crate::semantics::{FakerSemantics, SemanticsProvider, StixSemantics};

/// Generates JSON values from declarative specifications.
///
/// Specs are looked up by name in the registry or passed in directly.  The
/// registry and semantics map are shared, so cloning a generator (e.g. to
/// run one with a different config) is cheap.
#[derive(Clone)]
pub struct ObjectGenerator {
    specs: Arc<SpecRegistry>,
    semantics: Arc<HashMap<String, Arc<dyn SemanticsProvider>>>,
    config: ObjectGeneratorConfig,
}

impl ObjectGenerator {
    /// Build a generator over a registry and a set of semantics providers.
    /// If two providers supply the same semantic name, the first wins.
    pub fn new(
        specs: Arc<SpecRegistry>,
        providers: Vec<Arc<dyn SemanticsProvider>>,
        config: ObjectGeneratorConfig,
    ) -> Self {
        let mut semantics: HashMap<String, Arc<dyn SemanticsProvider>> = HashMap::new();
        for provider in providers {
            for name in provider.semantics() {
                semantics
                    .entry(name.to_string())
                    .or_insert_with(|| Arc::clone(&provider));
            }
        }
        Self {
            specs,
            semantics: Arc::new(semantics),
            config,
        }
    }

    /// Build a generator over the bundled registry for a STIX version, with
    /// the built-in semantics providers and optional caller spec overrides.
    pub fn builtin(
        config: ObjectGeneratorConfig,
        extra_specs: Option<&Value>,
        stix_version: &str,
    ) -> Result<Self> {
        let registry = SpecRegistry::builtin(stix_version, extra_specs)?;
        let providers: Vec<Arc<dyn SemanticsProvider>> =
            vec![Arc::new(StixSemantics), Arc::new(FakerSemantics::new())];
        Ok(Self::new(Arc::new(registry), providers, config))
    }

    pub fn config(&self) -> &ObjectGeneratorConfig {
        &self.config
    }

    /// A generator sharing this one's registry and semantics but running
    /// with a different config.
    pub fn with_config(&self, config: ObjectGeneratorConfig) -> Self {
        Self {
            specs: Arc::clone(&self.specs),
            semantics: Arc::clone(&self.semantics),
            config,
        }
    }

    /// Names of the specs this generator can generate.
    pub fn spec_names(&self) -> impl Iterator<Item = &str> {
        self.specs.names()
    }

    /// Generate a value from a named spec.
    pub fn generate(&self, spec_name: &str, rng: &mut dyn RngCore) -> Result<Value> {
        self.generate_named(spec_name, None, &mut Vec::new(), None, rng)
    }

    /// Generate a value from a named spec, with an expected type, a stack of
    /// enclosing spec names for reference-loop detection, and an optional
    /// value constraint derived from a co-constraint.
    pub fn generate_named(
        &self,
        spec_name: &str,
        expected_type: Option<JsonType>,
        name_stack: &mut Vec<String>,
        constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        if let Some(pos) = name_stack.iter().position(|name| name == spec_name) {
            let mut cycle = name_stack[pos..].to_vec();
            cycle.push(spec_name.to_string());
            return Err(GenerationError::new(ErrorKind::CyclicSpecReference { cycle })
                .with_name_stack(name_stack));
        }

        let Some(spec) = self.specs.get(spec_name) else {
            return Err(GenerationError::new(ErrorKind::SpecNotFound(spec_name.to_string()))
                .with_name_stack(name_stack));
        };

        name_stack.push(spec_name.to_string());
        match self.generate_from_spec_full(spec, expected_type, name_stack, constraint, rng) {
            Ok(value) => {
                name_stack.pop();
                Ok(value)
            }
            Err(err) => {
                let err = err.with_name_stack(name_stack);
                name_stack.pop();
                Err(err)
            }
        }
    }

    /// Generate a value from a spec that need not exist under any name in
    /// the registry.
    pub fn generate_from_spec(&self, spec: &Value, rng: &mut dyn RngCore) -> Result<Value> {
        self.generate_from_spec_full(spec, None, &mut Vec::new(), None, rng)
    }

    pub fn generate_from_spec_full(
        &self,
        spec: &Value,
        expected_type: Option<JsonType>,
        name_stack: &mut Vec<String>,
        constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let declared = spec_type(spec)?;
        let shape = classify(spec)?;

        // Reference specs delegate the expected-type check to the spec they
        // name, so that a reference cycle is diagnosed as a cycle rather
        // than as a type mismatch partway around it.
        if !matches!(shape, SpecShape::Ref(_))
            && let Some(expected) = expected_type
            && declared != expected
        {
            return Err(ErrorKind::TypeMismatch {
                expected,
                actual: declared,
            }
            .into());
        }
        let type_label = match shape {
            SpecShape::Semantic(name) => name,
            _ => declared.as_str(),
        };

        let result = match (shape, spec.as_object()) {
            (SpecShape::Literal, _) => Ok(spec.clone()),
            (SpecShape::Const(value), _) => Ok(value.clone()),
            (SpecShape::Semantic(name), Some(map)) => {
                self.generate_semantic(name, map, declared, constraint, rng)
            }
            (SpecShape::Ref(target), _) => {
                self.generate_named(target, Some(declared), name_stack, constraint, rng)
            }
            (SpecShape::OneOf(one_of), _) => {
                self.generate_one_of(one_of, declared, name_stack, constraint, rng)
            }
            (SpecShape::Plain(_), Some(map)) => match declared {
                JsonType::Object => self.generate_object(map, name_stack, rng),
                JsonType::Array => self.generate_array(map, name_stack, rng),
                JsonType::String => self.generate_string(map, rng),
                JsonType::Integer => self.generate_integer(map, rng),
                JsonType::Number => self.generate_number(map, rng),
                JsonType::Boolean => Ok(Value::Bool(rng.random_bool(0.5))),
                JsonType::Null => Ok(Value::Null),
            },
            _ => Err(GenerationError::invalid_spec(
                "expected an object specification",
            )),
        };

        result.map_err(|err| err.with_spec_type(type_label))
    }

    fn generate_semantic(
        &self,
        name: &str,
        spec: &Map<String, Value>,
        declared: JsonType,
        constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let provider = self
            .semantics
            .get(name)
            .ok_or_else(|| GenerationError::new(ErrorKind::UnknownSemantic(name.to_string())))?;

        let value = provider.create_semantic(spec, self, constraint, rng)?;

        let actual = JsonType::of_value(&value);
        if actual != declared {
            return Err(ErrorKind::SemanticTypeMismatch {
                semantic: name.to_string(),
                expected: declared,
                actual,
            }
            .into());
        }
        Ok(value)
    }

    fn generate_one_of(
        &self,
        one_of: &Value,
        declared: JsonType,
        name_stack: &mut Vec<String>,
        constraint: Option<&ValueConstraint>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let (choices, weights): (&Vec<Value>, Option<Vec<f64>>) = match one_of {
            Value::Array(list) => (list, None),
            Value::Object(map) => {
                let choices = map.get("choices").and_then(Value::as_array).ok_or_else(|| {
                    GenerationError::invalid_spec("oneOf object form requires a \"choices\" array")
                })?;
                let weights = match map.get("weights") {
                    None => None,
                    Some(Value::Array(raw)) => {
                        let mut parsed = Vec::with_capacity(raw.len());
                        for weight in raw {
                            parsed.push(weight.as_f64().ok_or_else(|| {
                                GenerationError::invalid_spec("oneOf weights must be numbers")
                            })?);
                        }
                        Some(parsed)
                    }
                    Some(_) => {
                        return Err(GenerationError::invalid_spec(
                            "oneOf weights must be an array of numbers",
                        ));
                    }
                };
                if let Some(weights) = &weights {
                    if weights.len() != choices.len() {
                        return Err(GenerationError::invalid_spec(
                            "oneOf weights length must match choices",
                        ));
                    }
                    if weights.iter().any(|w| *w < 0.0) {
                        return Err(GenerationError::invalid_spec(
                            "oneOf weights must be non-negative",
                        ));
                    }
                    if weights.iter().all(|w| *w == 0.0) {
                        return Err(GenerationError::invalid_spec(
                            "oneOf weights must not all be zero",
                        ));
                    }
                }
                (choices, weights)
            }
            _ => {
                return Err(GenerationError::invalid_spec(
                    "oneOf must be an array of specs or a {choices, weights} object",
                ));
            }
        };

        if choices.is_empty() {
            return Err(GenerationError::invalid_spec(
                "oneOf requires at least one choice",
            ));
        }

        let index = match &weights {
            Some(weights) => WeightedIndex::new(weights)
                .map_err(|e| GenerationError::invalid_spec(format!("invalid oneOf weights: {e}")))?
                .sample(rng),
            None => rng.random_range(0..choices.len()),
        };

        self.generate_from_spec_full(&choices[index], Some(declared), name_stack, constraint, rng)
    }

    fn generate_object(
        &self,
        spec: &Map<String, Value>,
        name_stack: &mut Vec<String>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let mut gen_object = match spec.get("import") {
            Some(Value::String(import_name)) => {
                match self.generate_named(import_name, Some(JsonType::Object), name_stack, None, rng)? {
                    Value::Object(base) => base,
                    _ => {
                        return Err(GenerationError::invalid_spec(
                            "imported spec did not produce an object",
                        ));
                    }
                }
            }
            Some(_) => {
                return Err(GenerationError::invalid_spec(
                    "\"import\" must be a spec name",
                ));
            }
            None => Map::new(),
        };

        let names_to_include = self.properties_to_include(spec, rng)?;

        if !names_to_include.is_empty() {
            let coconstraints = value_coconstraints(spec)?;

            // If there were names to include, properties must be defined.
            let prop_specs = spec.get("properties").and_then(Value::as_object).ok_or_else(
                || GenerationError::invalid_spec("object spec has no \"properties\""),
            )?;

            for prop_name in &names_to_include {
                let constraint = constraint_for(prop_name, &coconstraints, &gen_object);
                let prop_spec = prop_specs.get(prop_name).ok_or_else(|| {
                    GenerationError::invalid_spec(format!(
                        "no specification for property '{prop_name}'"
                    ))
                })?;

                let value = self.generate_from_spec_full(
                    prop_spec,
                    None,
                    name_stack,
                    constraint.as_ref(),
                    rng,
                )?;
                gen_object.insert(prop_name.clone(), value);
            }
        }

        Ok(Value::Object(gen_object))
    }

    /// Determine which properties to include, from required/optional choices
    /// and any presence co-constraints.
    fn properties_to_include(
        &self,
        spec: &Map<String, Value>,
        rng: &mut dyn RngCore,
    ) -> Result<BTreeSet<String>> {
        let empty = Map::new();
        let prop_specs = spec
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(&empty);

        let required = string_array(spec, "required")?;
        let optional = string_array(spec, "optional")?;
        if required.is_some() && optional.is_some() {
            return Err(GenerationError::invalid_spec(
                "\"required\" and \"optional\" can't both be present",
            ));
        }
        let required: Option<BTreeSet<String>> = required.map(|names| names.into_iter().collect());
        // With neither given, all properties/groups are required.
        let optional: Option<BTreeSet<String>> = match (&required, optional) {
            (None, None) => Some(BTreeSet::new()),
            (_, names) => names.map(|names| names.into_iter().collect()),
        };

        let (groups, dependencies) = presence_coconstraints(spec)?;

        let defined_props: BTreeSet<String> = prop_specs.keys().cloned().collect();
        let defined_groups: BTreeSet<String> = groups.keys().cloned().collect();
        let grouped: BTreeSet<String> = groups
            .values()
            .flat_map(|group| group.property_names.iter().cloned())
            .collect();

        // Everything in required/optional must be defined, and grouped
        // properties must be referenced via their group.
        let req_or_opt: BTreeSet<String> = required
            .clone()
            .or_else(|| optional.clone())
            .unwrap_or_default();
        let undefined: Vec<String> = req_or_opt
            .iter()
            .filter(|name| !defined_props.contains(*name) && !defined_groups.contains(*name))
            .cloned()
            .collect();
        if !undefined.is_empty() {
            return Err(ErrorKind::UndefinedProperty { names: undefined }.into());
        }

        let grouped_references: Vec<&String> =
            req_or_opt.iter().filter(|name| grouped.contains(*name)).collect();
        if !grouped_references.is_empty() {
            return Err(GenerationError::invalid_spec(format!(
                "Property(s) are grouped and cannot be referenced individually: {}",
                grouped_references
                    .iter()
                    .map(|name| name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        // Ungrouped properties and group names form the pool one can mark
        // required or optional.
        let name_pool: BTreeSet<String> = defined_props
            .difference(&grouped)
            .cloned()
            .chain(defined_groups.iter().cloned())
            .collect();

        let effectively_optional: BTreeSet<String> = match &optional {
            Some(names) => names.clone(),
            None => match &required {
                Some(required) => name_pool.difference(required).cloned().collect(),
                None => BTreeSet::new(),
            },
        };

        let mut names_to_include: BTreeSet<String> = match &required {
            Some(names) => names.clone(),
            None => name_pool.difference(&effectively_optional).cloned().collect(),
        };

        for name in &effectively_optional {
            let can_include = if self.config.minimize_ref_properties {
                if let Some(group) = groups.get(name) {
                    group.can_satisfy_without_refs()
                } else {
                    !is_ref_prop(name)
                }
            } else {
                true
            };

            if can_include && rng.random::<f64>() < self.config.optional_property_probability {
                names_to_include.insert(name.clone());
            }
        }

        // Dependencies force-include the listed names.
        for (dep_key, dep_names) in &dependencies {
            if names_to_include.contains(dep_key) {
                names_to_include.extend(dep_names.iter().cloned());
            }
        }

        // Expand group names into member properties per their co-constraints.
        let mut expanded = BTreeSet::new();
        for name in &names_to_include {
            match groups.get(name) {
                Some(group) => expanded.extend(group.choose_properties(
                    self.config.optional_property_probability,
                    self.config.minimize_ref_properties,
                    rng,
                )),
                None => {
                    expanded.insert(name.clone());
                }
            }
        }

        Ok(expanded)
    }

    fn generate_array(
        &self,
        spec: &Map<String, Value>,
        name_stack: &mut Vec<String>,
        rng: &mut dyn RngCore,
    ) -> Result<Value> {
        let item_spec = spec.get("items").ok_or_else(|| {
            GenerationError::invalid_spec("array specification requires \"items\"")
        })?;

        let (min_items, max_items) = length_bounds(
            spec,
            "minItems",
            "maxItems",
            self.config.array_length_min,
            self.config.array_length_max,
        )?;

        let length = rng.random_range(min_items..=max_items);
        let mut array = Vec::with_capacity(length as usize);
        for _ in 0..length {
            array.push(self.generate_from_spec_full(item_spec, None, name_stack, None, rng)?);
        }
        Ok(Value::Array(array))
    }

    fn generate_string(&self, spec: &Map<String, Value>, rng: &mut dyn RngCore) -> Result<Value> {
        let (min_length, max_length) = length_bounds(
            spec,
            "minLength",
            "maxLength",
            self.config.string_length_min,
            self.config.string_length_max,
        )?;

        let chars: Vec<char> = self.config.string_chars.chars().collect();
        if chars.is_empty() && max_length > 0 {
            return Err(GenerationError::invalid_spec("string_chars must not be empty"));
        }

        let length = rng.random_range(min_length..=max_length);
        let mut out = String::with_capacity(length as usize);
        for _ in 0..length {
            if let Some(c) = chars.choose(rng) {
                out.push(*c);
            }
        }
        Ok(Value::String(out))
    }

    fn generate_integer(&self, spec: &Map<String, Value>, rng: &mut dyn RngCore) -> Result<Value> {
        let bounds = self.numeric_bounds(spec)?;

        // Bounds need not be expressed as integers; reduce to an inclusive
        // integer interval.
        let min = if bounds.min.fract() == 0.0 {
            bounds.min as i64 + i64::from(bounds.min_exclusive)
        } else {
            bounds.min.ceil() as i64
        };
        let max = if bounds.max.fract() == 0.0 {
            bounds.max as i64 - i64::from(bounds.max_exclusive)
        } else {
            bounds.max.floor() as i64
        };

        if min > max {
            return Err(GenerationError::invalid_spec(
                "no integers exist in the specified interval",
            ));
        }

        Ok(Value::from(rng.random_range(min..=max)))
    }

    fn generate_number(&self, spec: &Map<String, Value>, rng: &mut dyn RngCore) -> Result<Value> {
        let bounds = self.numeric_bounds(spec)?;

        let n = match (bounds.min_exclusive, bounds.max_exclusive) {
            (true, true) => random_open(bounds.min, bounds.max, rng),
            (true, false) => random_half_open_lower(bounds.min, bounds.max, rng),
            (false, true) => random_half_open_upper(bounds.min, bounds.max, rng),
            (false, false) => random_closed(bounds.min, bounds.max, rng),
        };

        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| GenerationError::invalid_spec("generated number is not finite"))
    }

    fn numeric_bounds(&self, spec: &Map<String, Value>) -> Result<NumericBounds> {
        if spec.contains_key("minimum") && spec.contains_key("exclusiveMinimum") {
            return Err(GenerationError::invalid_spec(
                "minimum and exclusiveMinimum can't both be present",
            ));
        }
        if spec.contains_key("maximum") && spec.contains_key("exclusiveMaximum") {
            return Err(GenerationError::invalid_spec(
                "maximum and exclusiveMaximum can't both be present",
            ));
        }

        let min_given =
            spec.contains_key("minimum") || spec.contains_key("exclusiveMinimum");
        let max_given =
            spec.contains_key("maximum") || spec.contains_key("exclusiveMaximum");
        // User bounds could be out of order w.r.t. defaults, so one-sided
        // bounds are rejected rather than mixed with defaults.
        if min_given != max_given {
            return Err(GenerationError::invalid_spec(
                "can't give minimum without a maximum, or vice versa",
            ));
        }

        let number = |key: &str| -> Result<Option<f64>> {
            match spec.get(key) {
                None => Ok(None),
                Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                    GenerationError::invalid_spec(format!("{key} must be a number"))
                }),
            }
        };

        let (min, min_exclusive) = if let Some(value) = number("minimum")? {
            (value, false)
        } else if let Some(value) = number("exclusiveMinimum")? {
            (value, true)
        } else {
            (self.config.number_min, self.config.is_number_min_exclusive)
        };

        let (max, max_exclusive) = if let Some(value) = number("maximum")? {
            (value, false)
        } else if let Some(value) = number("exclusiveMaximum")? {
            (value, true)
        } else {
            (self.config.number_max, self.config.is_number_max_exclusive)
        };

        if min > max {
            return Err(GenerationError::invalid_spec(
                "minimum can't be greater than maximum",
            ));
        }
        if min == max && (min_exclusive || max_exclusive) {
            return Err(GenerationError::invalid_spec(
                "In an open or half-open interval, minimum must be strictly less than maximum",
            ));
        }

        Ok(NumericBounds {
            min,
            min_exclusive,
            max,
            max_exclusive,
        })
    }
}

struct NumericBounds {
    min: f64,
    min_exclusive: bool,
    max: f64,
    max_exclusive: bool,
}

fn length_bounds(
    spec: &Map<String, Value>,
    min_key: &str,
    max_key: &str,
    default_min: i64,
    default_max: i64,
) -> Result<(i64, i64)> {
    let has_min = spec.contains_key(min_key);
    let has_max = spec.contains_key(max_key);
    if has_min != has_max {
        return Err(GenerationError::invalid_spec(format!(
            "Specification must include both or neither of the properties: {min_key}, {max_key}"
        )));
    }

    let read = |key: &str, default: i64| -> Result<i64> {
        match spec.get(key) {
            None => Ok(default),
            Some(value) => value.as_i64().ok_or_else(|| {
                GenerationError::invalid_spec(format!("{key} must be an integer"))
            }),
        }
    };
    let min = read(min_key, default_min)?;
    let max = read(max_key, default_max)?;

    if min > max {
        return Err(GenerationError::invalid_spec(format!(
            "{min_key} must be less than or equal to {max_key}"
        )));
    }
    if min < 0 || max < 0 {
        return Err(GenerationError::invalid_spec(format!(
            "{min_key} and {max_key} must be non-negative"
        )));
    }
    Ok((min, max))
}

/// Parse and sanity-check the value co-constraints of an object spec.
fn value_coconstraints(spec: &Map<String, Value>) -> Result<Vec<ValueCoconstraint>> {
    let Some(raw) = spec.get("value-coconstraints") else {
        return Ok(Vec::new());
    };
    let expressions = raw.as_array().ok_or_else(|| {
        GenerationError::invalid_spec("\"value-coconstraints\" must be an array of expressions")
    })?;

    let empty = Map::new();
    let prop_specs = spec
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut coconstraints = Vec::with_capacity(expressions.len());
    for expression in expressions {
        let text = expression.as_str().ok_or_else(|| {
            GenerationError::invalid_spec("value co-constraints must be expression strings")
        })?;
        let coconstraint = ValueCoconstraint::parse(text)?;

        for side in [&coconstraint.left, &coconstraint.right] {
            if !prop_specs.contains_key(side) {
                return Err(ErrorKind::ValueCoconstraint {
                    expr: text.to_string(),
                    reason: format!("Property '{side}' undefined in specification"),
                }
                .into());
            }
        }
        coconstraints.push(coconstraint);
    }

    let mut occurrence_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for coconstraint in &coconstraints {
        *occurrence_counts.entry(&coconstraint.left).or_insert(0) += 1;
        *occurrence_counts.entry(&coconstraint.right).or_insert(0) += 1;
    }
    let repeated: Vec<&str> = occurrence_counts
        .iter()
        .filter(|(_, count)| **count > 1)
        .map(|(name, _)| *name)
        .collect();
    if !repeated.is_empty() {
        warn!(
            properties = %repeated.join(", "),
            "properties are referenced in more than one value co-constraint; \
             only the first such co-constraint will be consulted"
        );
    }

    Ok(coconstraints)
}

/// Derive a constraint for a property from the first co-constraint that
/// involves it, if the other side has already been generated.
fn constraint_for(
    prop_name: &str,
    coconstraints: &[ValueCoconstraint],
    generated: &Map<String, Value>,
) -> Option<ValueConstraint> {
    for coconstraint in coconstraints {
        if coconstraint.involves(prop_name) {
            let other = coconstraint.other(prop_name);
            return generated
                .get(other)
                .map(|value| coconstraint.constraint_given(other, value));
        }
    }
    None
}

/// Validate the presence co-constraints of an object spec, returning the
/// group constraints and dependency map.  Validation is eager; it runs even
/// when no group ends up selected.
fn presence_coconstraints(
    spec: &Map<String, Value>,
) -> Result<(
    BTreeMap<String, PresenceCoconstraint>,
    BTreeMap<String, Vec<String>>,
)> {
    let empty = Map::new();
    let presence = match spec.get("presence-coconstraints") {
        None => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(GenerationError::invalid_spec(
                "\"presence-coconstraints\" must be an object",
            ));
        }
    };
    let prop_specs = spec
        .get("properties")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let groups = group_coconstraints(presence, prop_specs)?;
    let dependencies = dependency_coconstraints(presence, &groups, prop_specs)?;
    Ok((groups, dependencies))
}

fn group_coconstraints(
    presence: &Map<String, Value>,
    prop_specs: &Map<String, Value>,
) -> Result<BTreeMap<String, PresenceCoconstraint>> {
    let group_specs: BTreeMap<String, Vec<String>> = match presence.get("property-groups") {
        None => BTreeMap::new(),
        Some(Value::Object(map)) => {
            let mut parsed = BTreeMap::new();
            for (group_name, members) in map {
                let members = string_array_value(members).ok_or_else(|| {
                    GenerationError::new(ErrorKind::InvalidPropertyGroup {
                        group: group_name.clone(),
                        reason: "group must be an array of property names".to_string(),
                    })
                })?;
                parsed.insert(group_name.clone(), members);
            }
            parsed
        }
        Some(_) => {
            return Err(ErrorKind::PresenceCoconstraint(
                "\"property-groups\" must be an object".to_string(),
            )
            .into());
        }
    };

    for (group_name, members) in &group_specs {
        if members.is_empty() {
            return Err(ErrorKind::InvalidPropertyGroup {
                group: group_name.clone(),
                reason: "group can't be empty".to_string(),
            }
            .into());
        }
        if prop_specs.contains_key(group_name) {
            return Err(ErrorKind::InvalidPropertyGroup {
                group: group_name.clone(),
                reason: "group name conflicts with a property name".to_string(),
            }
            .into());
        }
        let undefined: BTreeSet<&str> = members
            .iter()
            .filter(|member| !prop_specs.contains_key(*member))
            .map(String::as_str)
            .collect();
        if !undefined.is_empty() {
            return Err(ErrorKind::InvalidPropertyGroup {
                group: group_name.clone(),
                reason: format!(
                    "undefined property(s): {}",
                    undefined.into_iter().collect::<Vec<_>>().join(", ")
                ),
            }
            .into());
        }
    }

    // All groups must be pairwise disjoint.
    let group_names: Vec<&String> = group_specs.keys().collect();
    for i in 0..group_names.len() {
        for j in (i + 1)..group_names.len() {
            let first: BTreeSet<&String> = group_specs[group_names[i]].iter().collect();
            let overlap: Vec<&str> = group_specs[group_names[j]]
                .iter()
                .filter(|member| first.contains(member))
                .map(String::as_str)
                .collect();
            if !overlap.is_empty() {
                return Err(ErrorKind::InvalidPropertyGroup {
                    group: group_names[j].clone(),
                    reason: format!(
                        "overlaps with group \"{}\".  Overlapping properties: {}",
                        group_names[i],
                        overlap.join(", ")
                    ),
                }
                .into());
            }
        }
    }

    let all_groups: BTreeSet<String> =
        string_array(presence, "all")?.unwrap_or_default().into_iter().collect();
    let one_groups: BTreeSet<String> =
        string_array(presence, "one")?.unwrap_or_default().into_iter().collect();
    let at_least_one_groups: BTreeSet<String> = string_array(presence, "at-least-one")?
        .unwrap_or_default()
        .into_iter()
        .collect();

    for group_name in all_groups.iter().chain(&one_groups).chain(&at_least_one_groups) {
        if !group_specs.contains_key(group_name) {
            return Err(ErrorKind::PresenceCoconstraint(format!(
                "Group not found: {group_name}"
            ))
            .into());
        }
    }

    // No group may be assigned more than one constraint type.
    let mut conflicts: BTreeSet<&String> = BTreeSet::new();
    conflicts.extend(all_groups.intersection(&one_groups));
    conflicts.extend(all_groups.intersection(&at_least_one_groups));
    conflicts.extend(one_groups.intersection(&at_least_one_groups));
    if !conflicts.is_empty() {
        return Err(ErrorKind::PresenceCoconstraint(format!(
            "Property group(s) have conflicting co-constraints: {}",
            conflicts
                .iter()
                .map(|name| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))
        .into());
    }

    // Every group must be explicitly assigned a constraint type.
    let unassigned: Vec<&str> = group_specs
        .keys()
        .filter(|name| {
            !all_groups.contains(*name)
                && !one_groups.contains(*name)
                && !at_least_one_groups.contains(*name)
        })
        .map(String::as_str)
        .collect();
    if !unassigned.is_empty() {
        return Err(ErrorKind::PresenceCoconstraint(format!(
            "Property group(s) were not assigned co-constraint types: {}",
            unassigned.join(", ")
        ))
        .into());
    }

    // Length-1 groups are validated above but otherwise ignored; using the
    // property directly accomplishes the same thing.
    let mut groups = BTreeMap::new();
    for (group_name, members) in group_specs {
        if members.len() == 1 {
            continue;
        }
        let mode = if one_groups.contains(&group_name) {
            PresenceMode::One
        } else if all_groups.contains(&group_name) {
            PresenceMode::All
        } else {
            PresenceMode::AtLeastOne
        };
        groups.insert(group_name, PresenceCoconstraint::new(members, mode));
    }

    Ok(groups)
}

fn dependency_coconstraints(
    presence: &Map<String, Value>,
    groups: &BTreeMap<String, PresenceCoconstraint>,
    prop_specs: &Map<String, Value>,
) -> Result<BTreeMap<String, Vec<String>>> {
    let deps_spec = match presence.get("dependencies") {
        None => return Ok(BTreeMap::new()),
        Some(Value::Object(map)) => map,
        Some(_) => {
            return Err(ErrorKind::PresenceCoconstraint(
                "\"dependencies\" must be an object".to_string(),
            )
            .into());
        }
    };

    let grouped: BTreeSet<&str> = groups
        .values()
        .flat_map(|group| group.property_names.iter().map(String::as_str))
        .collect();
    let is_group_or_prop =
        |name: &str| prop_specs.contains_key(name) || groups.contains_key(name);

    let mut dependencies = BTreeMap::new();
    for (key_name, dep_list) in deps_spec {
        if !is_group_or_prop(key_name) {
            return Err(ErrorKind::PresenceCoconstraint(format!(
                "Unrecognized group or property: {key_name}"
            ))
            .into());
        }
        if grouped.contains(key_name.as_str()) {
            return Err(ErrorKind::PresenceCoconstraint(format!(
                "Property \"{key_name}\" is grouped and cannot be referenced individually"
            ))
            .into());
        }

        let dep_names = string_array_value(dep_list).ok_or_else(|| {
            GenerationError::invalid_spec("dependency values must be arrays of names")
        })?;

        for name in &dep_names {
            if !is_group_or_prop(name) {
                return Err(ErrorKind::PresenceCoconstraint(format!(
                    "Unrecognized group or property: {name}"
                ))
                .into());
            }
            if grouped.contains(name.as_str()) {
                return Err(ErrorKind::PresenceCoconstraint(format!(
                    "Property \"{name}\" is grouped and cannot be referenced individually"
                ))
                .into());
            }
            // Only the direct key/value overlap is checked here, not
            // transitive cycles through several entries.
            if deps_spec.contains_key(name) {
                return Err(ErrorKind::PresenceCoconstraint(format!(
                    "Dependency key can't also occur in a dependency value: {name}"
                ))
                .into());
            }
        }

        dependencies.insert(key_name.clone(), dep_names);
    }

    Ok(dependencies)
}

fn string_array_value(value: &Value) -> Option<Vec<String>> {
    let array = value.as_array()?;
    let mut out = Vec::with_capacity(array.len());
    for entry in array {
        out.push(entry.as_str()?.to_string());
    }
    Some(out)
}

fn random_half_open_upper(min: f64, exclusive_max: f64, rng: &mut dyn RngCore) -> f64 {
    min + (exclusive_max - min) * rng.random::<f64>()
}

fn random_half_open_lower(exclusive_min: f64, max: f64, rng: &mut dyn RngCore) -> f64 {
    // Sample the opposite openness and "flip" it: [a,b) becomes (-b,-a],
    // then shift back to the proper endpoints.
    exclusive_min + max - random_half_open_upper(exclusive_min, max, rng)
}

fn random_closed(min: f64, max: f64, rng: &mut dyn RngCore) -> f64 {
    rng.random_range(min..=max)
}

fn random_open(exclusive_min: f64, exclusive_max: f64, rng: &mut dyn RngCore) -> f64 {
    // Split the open interval at its midpoint into two half-open samples
    // joined at a closed boundary.  The midpoint is slightly more likely
    // than other points, so this is not truly uniform; kept as an accepted
    // approximation.
    let mid = (exclusive_min + exclusive_max) / 2.0;
    if rng.random::<f64>() < 0.5 {
        random_half_open_lower(exclusive_min, mid, rng)
    } else {
        random_half_open_upper(mid, exclusive_max, rng)
    }
}
